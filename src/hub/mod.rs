pub mod client;
pub mod keys;
pub mod service;
pub mod types;

pub use client::UpstreamClient;
pub use keys::ResourceKey;
pub use service::EventHub;
