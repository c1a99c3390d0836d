use std::{collections::HashMap, fmt, sync::Arc};

use pipeline_core::{
    constants::player_capabilities::{PLAYBACK_CONTROL, SET_SPEED},
    models::{
        message_event::MessageEvent,
        player_state::{Datatypes, PlayerState, Topic},
        publishers::AdvertiseOptions,
        subscriptions::SubscribePayload,
        time::Time,
    },
    player::Player,
};

pub type PlaybackCommand = Arc<dyn Fn() + Send + Sync>;
pub type TimeCommand = Arc<dyn Fn(Time) + Send + Sync>;
pub type SpeedCommand = Arc<dyn Fn(f64) + Send + Sync>;
pub type RepeatCommand = Arc<dyn Fn(bool) + Send + Sync>;

/// Player methods gated by advertised capabilities. A `None` handle means the
/// player cannot perform that operation right now.
#[derive(Clone, Default)]
pub struct PlaybackControls {
    pub start_playback: Option<PlaybackCommand>,
    pub pause_playback: Option<PlaybackCommand>,
    pub seek_playback: Option<TimeCommand>,
    pub set_playback_speed: Option<SpeedCommand>,
    pub play_until: Option<TimeCommand>,
    pub enable_repeat_playback: Option<RepeatCommand>,
}

impl PlaybackControls {
    pub(crate) fn bind(player: &Arc<dyn Player>, capabilities: &[String]) -> Self {
        let has = |capability: &str| capabilities.iter().any(|c| c == capability);
        let mut controls = PlaybackControls::default();

        if has(PLAYBACK_CONTROL) {
            let p = player.clone();
            controls.start_playback = Some(Arc::new(move || p.start_playback()));
            let p = player.clone();
            controls.pause_playback = Some(Arc::new(move || p.pause_playback()));
            let p = player.clone();
            controls.seek_playback = Some(Arc::new(move |time: Time| p.seek_playback(time)));
            let p = player.clone();
            controls.play_until = Some(Arc::new(move |time: Time| p.play_until(time)));
            let p = player.clone();
            controls.enable_repeat_playback = Some(Arc::new(move |enable: bool| p.enable_repeat_playback(enable)));
        }
        if has(SET_SPEED) {
            let p = player.clone();
            controls.set_playback_speed = Some(Arc::new(move |speed: f64| p.set_playback_speed(speed)));
        }

        controls
    }
}

impl fmt::Debug for PlaybackControls {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackControls")
            .field("start_playback", &self.start_playback.is_some())
            .field("pause_playback", &self.pause_playback.is_some())
            .field("seek_playback", &self.seek_playback.is_some())
            .field("set_playback_speed", &self.set_playback_speed.is_some())
            .field("play_until", &self.play_until.is_some())
            .field("enable_repeat_playback", &self.enable_repeat_playback.is_some())
            .finish()
    }
}

pub type MessageEventsBySubscriberId = HashMap<String, Arc<Vec<MessageEvent>>>;

/// Immutable view of the pipeline published after every mutation. Consumers
/// may hold on to it across frames.
#[derive(Debug, Clone)]
pub struct MessagePipelineContext {
    pub player_state: Arc<PlayerState>,
    pub sorted_topics: Arc<Vec<Topic>>,
    pub datatypes: Arc<Datatypes>,
    pub subscriptions: Arc<Vec<SubscribePayload>>,
    pub publishers: Arc<Vec<AdvertiseOptions>>,
    pub message_events_by_subscriber_id: Arc<MessageEventsBySubscriberId>,
    pub playback: PlaybackControls,
}

impl MessagePipelineContext {
    pub(crate) fn new(subscriptions: Arc<Vec<SubscribePayload>>) -> Self {
        MessagePipelineContext {
            player_state: Arc::new(PlayerState::default()),
            sorted_topics: Arc::new(Vec::new()),
            datatypes: Arc::new(Datatypes::new()),
            subscriptions,
            publishers: Arc::new(Vec::new()),
            message_events_by_subscriber_id: Arc::new(HashMap::new()),
            playback: PlaybackControls::default(),
        }
    }

    pub fn message_events(&self, subscriber_id: &str) -> Option<&Arc<Vec<MessageEvent>>> {
        self.message_events_by_subscriber_id.get(subscriber_id)
    }
}
