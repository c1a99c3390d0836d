pub mod asset;
pub mod message_event;
pub mod player_state;
pub mod publishers;
pub mod subscriptions;
pub mod time;
