use std::time::Duration;

pub struct MessagePipelineConfig {
    pub log_level: String,
    pub command_buffer_size: usize,
    // Render opportunity granted to consumers between player ticks
    pub frame_interval: Duration,
    // Watchdog for pause tokens; `None` waits indefinitely
    pub pause_frame_timeout: Option<Duration>,
    pub credential_expire_duration: Duration,
    pub asset_cache_capacity: usize,
    pub asset_cache_ttl: Duration,
    pub can_fetch_package_urls: bool,
    pub worker_batch_size: usize,
}

impl MessagePipelineConfig {
    pub fn new() -> MessagePipelineConfig {
        MessagePipelineConfig {
            log_level: "INFO".to_string(),
            command_buffer_size: 1024,
            frame_interval: Duration::from_millis(16),
            pause_frame_timeout: None,
            credential_expire_duration: Duration::from_secs(60 * 60),
            asset_cache_capacity: 256,
            asset_cache_ttl: Duration::from_secs(10 * 60),
            can_fetch_package_urls: false,
            worker_batch_size: 1024,
        }
    }
}

impl Default for MessagePipelineConfig {
    fn default() -> Self {
        Self::new()
    }
}
