pub mod app;
pub mod config;
pub mod credentials;
pub mod domain;
pub mod error;
pub mod fetcher;
pub mod output;
pub mod queue;
pub mod sidecar;
pub mod slot;
pub mod store;
pub mod template;
pub mod transfer;
pub mod transport;
