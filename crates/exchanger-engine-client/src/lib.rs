//! HTTP client for the BPMN process engine's External Task REST surface.

pub mod client;
pub mod error;

pub use client::{EngineClient, TopicSubscription};
pub use error::EngineClientError;
