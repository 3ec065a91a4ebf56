//! Caches BPMN process-definition XML, parsed into per-activity metadata
//! (spec §4.4), behind the engine client so repeated task-creator and
//! worker lookups don't refetch the same diagram.

pub mod cache;
pub mod error;
pub mod parser;

pub use cache::BpmnCache;
pub use error::BpmnCacheError;
pub use parser::parse_bpmn_xml;
