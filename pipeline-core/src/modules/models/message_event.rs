use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::models::time::Time;

pub type MessagePayload = Arc<serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEvent {
    pub topic: String,
    pub schema_name: String,
    pub receive_time: Time,
    pub message: MessagePayload,
    pub size_in_bytes: usize,
    // Set on events produced by a message converter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_message_event: Option<Arc<MessageEvent>>,
}

impl MessageEvent {
    pub fn new(
        topic: impl Into<String>,
        schema_name: impl Into<String>,
        receive_time: Time,
        message: serde_json::Value,
    ) -> Self {
        let size_in_bytes = message.to_string().len();
        MessageEvent {
            topic: topic.into(),
            schema_name: schema_name.into(),
            receive_time,
            message: Arc::new(message),
            size_in_bytes,
            original_message_event: None,
        }
    }

    pub fn converted(&self, schema_name: &str, message: serde_json::Value) -> Self {
        MessageEvent {
            topic: self.topic.clone(),
            schema_name: schema_name.to_string(),
            receive_time: self.receive_time,
            message: Arc::new(message),
            size_in_bytes: self.size_in_bytes,
            original_message_event: Some(Arc::new(self.clone())),
        }
    }
}
