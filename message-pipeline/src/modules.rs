pub mod asset_fetcher;
pub mod config;
pub mod frame_pacer;
pub mod logging;
pub mod message_pipeline;
pub mod worker_iterable_source;
