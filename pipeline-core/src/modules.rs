pub mod asset_cache_repository;
pub mod constants;
pub mod error;
pub mod http_client_repository;
pub mod iterable_source;
pub mod message_converters;
pub mod message_pipeline_repository;
pub mod models;
pub mod object_storage_repository;
pub mod player;
pub mod render_state;
pub mod security_token_repository;
pub mod subscriptions;
