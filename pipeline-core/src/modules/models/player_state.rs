use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use serde::{Deserialize, Serialize};

use crate::models::{message_event::MessageEvent, time::Time};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerPresence {
    #[default]
    NotPresent,
    Initializing,
    Present,
    Reconnecting,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProblemSeverity {
    Error,
    Warn,
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerProblem {
    pub severity: ProblemSeverity,
    pub message: String,
    pub error: Option<String>,
    pub tip: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub name: String,
    pub schema_name: String,
    // Extra schemas this topic can be viewed as through registered converters
    #[serde(default)]
    pub converted_schema_names: Option<Vec<String>>,
}

impl Topic {
    pub fn new(name: impl Into<String>, schema_name: impl Into<String>) -> Self {
        Topic {
            name: name.into(),
            schema_name: schema_name.into(),
            converted_schema_names: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDefinitionField {
    pub name: String,
    pub type_name: String,
    pub is_array: bool,
    pub is_complex: bool,
}

pub type Datatypes = BTreeMap<String, Vec<MessageDefinitionField>>;
pub type Parameters = HashMap<String, serde_json::Value>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageBlock {
    pub messages_by_topic: BTreeMap<String, Vec<MessageEvent>>,
    pub size_in_bytes: usize,
}

/// Preloaded messages split into fixed time blocks. `None` entries are blocks
/// that have not been loaded yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockCache {
    pub blocks: Vec<Option<MessageBlock>>,
    pub start_time: Time,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Progress {
    pub fully_loaded_fraction_ranges: Option<Vec<(f64, f64)>>,
    pub message_cache: Option<Arc<BlockCache>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerStateActiveData {
    pub messages: Arc<Vec<MessageEvent>>,
    pub total_bytes_received: u64,
    pub start_time: Time,
    pub end_time: Time,
    pub current_time: Time,
    pub is_playing: bool,
    pub speed: f64,
    pub repeat_enabled: bool,
    // Incremented by the player on every seek
    pub last_seek_time: u64,
    pub topics: Arc<Vec<Topic>>,
    pub datatypes: Arc<Datatypes>,
    pub parameters: Option<Arc<Parameters>>,
}

impl Default for PlayerStateActiveData {
    fn default() -> Self {
        PlayerStateActiveData {
            messages: Arc::new(Vec::new()),
            total_bytes_received: 0,
            start_time: Time::default(),
            end_time: Time::default(),
            current_time: Time::default(),
            is_playing: false,
            speed: 1.0,
            repeat_enabled: false,
            last_seek_time: 0,
            topics: Arc::new(Vec::new()),
            datatypes: Arc::new(Datatypes::new()),
            parameters: None,
        }
    }
}

/// One immutable snapshot emitted by a player. Every tick produces a new one;
/// collections shared with the previous tick keep the same `Arc`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlayerState {
    pub presence: PlayerPresence,
    pub progress: Progress,
    pub capabilities: Arc<Vec<String>>,
    pub profile: Option<String>,
    pub player_id: String,
    pub name: Option<String>,
    pub problems: Vec<PlayerProblem>,
    pub active_data: Option<PlayerStateActiveData>,
}

impl PlayerState {
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }

    pub fn messages(&self) -> Option<&Arc<Vec<MessageEvent>>> {
        self.active_data.as_ref().map(|active_data| &active_data.messages)
    }
}
