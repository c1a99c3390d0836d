pub mod builder;

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use crate::{
    message_converters::RegisteredConverter,
    models::{
        message_event::MessageEvent,
        player_state::{Parameters, PlayerState, Topic},
        subscriptions::SubscribePayload,
        time::Time,
    },
};

pub use builder::RenderStateBuilder;

pub type GlobalVariables = HashMap<String, serde_json::Value>;
pub type AppSettings = HashMap<String, serde_json::Value>;

/// Fields of [`RenderState`] a consumer declares interest in. Undeclared fields
/// are never computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchedField {
    DidSeek,
    Parameters,
    Variables,
    Topics,
    CurrentFrame,
    AllFrames,
    CurrentTime,
    StartTime,
    EndTime,
    PreviewTime,
    ColorScheme,
    AppSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorScheme {
    Light,
    Dark,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoverValueType {
    PlaybackSeconds,
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HoverValue {
    pub component_id: String,
    pub value_type: HoverValueType,
    // Seconds since the player's start time for playback hovers
    pub value: f64,
}

#[derive(Debug, Clone, Default)]
pub struct RenderState {
    pub did_seek: Option<bool>,
    pub parameters: Option<Arc<Parameters>>,
    pub variables: Option<Arc<GlobalVariables>>,
    pub topics: Option<Arc<Vec<Topic>>>,
    pub current_frame: Option<Arc<Vec<MessageEvent>>>,
    pub all_frames: Option<Arc<Vec<MessageEvent>>>,
    pub current_time: Option<Time>,
    pub start_time: Option<Time>,
    pub end_time: Option<Time>,
    pub preview_time: Option<f64>,
    pub color_scheme: Option<ColorScheme>,
    pub app_settings: Option<Arc<AppSettings>>,
}

pub struct RenderStateInput<'a> {
    pub watched_fields: &'a HashSet<WatchedField>,
    pub player_state: Option<&'a PlayerState>,
    // Messages delivered to this consumer in the current tick
    pub current_frame: Option<&'a Arc<Vec<MessageEvent>>>,
    pub global_variables: &'a Arc<GlobalVariables>,
    pub hover_value: Option<&'a HoverValue>,
    pub sorted_topics: &'a Arc<Vec<Topic>>,
    pub subscriptions: &'a [SubscribePayload],
    pub message_converters: Option<&'a Arc<Vec<RegisteredConverter>>>,
    pub color_scheme: Option<ColorScheme>,
    pub app_settings: Option<&'a Arc<AppSettings>>,
}
