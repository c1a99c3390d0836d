// Capabilities a player may advertise in `PlayerState::capabilities`
pub mod player_capabilities {
    pub const PLAYBACK_CONTROL: &str = "playbackControl";
    pub const SET_SPEED: &str = "setSpeed";
    pub const ADVERTISE: &str = "advertise";
    pub const ASSETS: &str = "assets";
    pub const CALL_SERVICES: &str = "callServices";
    pub const SET_PARAMETERS: &str = "setParameters";
}

pub const S3_SCHEME: &str = "s3";
pub const PACKAGE_SCHEME: &str = "package";
