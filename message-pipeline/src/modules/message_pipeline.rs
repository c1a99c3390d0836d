pub(crate) mod commands;
pub mod context;
pub(crate) mod listener;
pub(crate) mod manager;
pub mod store;
pub(crate) mod wrapper;
