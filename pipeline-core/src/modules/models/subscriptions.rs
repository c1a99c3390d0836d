use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PreloadType {
    #[default]
    Partial,
    Full,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscribePayload {
    pub topic: String,
    // Target schema to convert messages of this topic into
    pub convert_to: Option<String>,
    pub preload_type: PreloadType,
    // Message field slice; `None` means every field
    pub fields: Option<BTreeSet<String>>,
}

impl SubscribePayload {
    pub fn new(topic: impl Into<String>) -> Self {
        SubscribePayload {
            topic: topic.into(),
            convert_to: None,
            preload_type: PreloadType::Partial,
            fields: None,
        }
    }

    pub fn converted(topic: impl Into<String>, convert_to: impl Into<String>) -> Self {
        SubscribePayload {
            convert_to: Some(convert_to.into()),
            ..SubscribePayload::new(topic)
        }
    }

    pub fn with_preload_type(mut self, preload_type: PreloadType) -> Self {
        self.preload_type = preload_type;
        self
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }
}
