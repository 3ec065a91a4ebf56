//! HTTP client for the downstream work-management system, including its
//! `imena.camunda.*` extension methods (spec §6).

pub mod client;
pub mod error;

pub use client::{
    Attachment, DiagramProperty, DownstreamClient, ResponsibleInfo, TaskCreateRequest, TaskDependency,
    TaskParameter, TaskResult, UserFieldDescriptor,
};
pub use error::DownstreamClientError;
