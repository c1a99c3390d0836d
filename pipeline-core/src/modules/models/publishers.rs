use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvertiseOptions {
    pub topic: String,
    pub schema_name: String,
    pub options: Option<serde_json::Map<String, serde_json::Value>>,
}

impl AdvertiseOptions {
    pub fn new(topic: impl Into<String>, schema_name: impl Into<String>) -> Self {
        AdvertiseOptions {
            topic: topic.into(),
            schema_name: schema_name.into(),
            options: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishPayload {
    pub topic: String,
    pub msg: serde_json::Value,
}
