//! TTL-bounded cache of parsed BPMN metadata, keyed by process definition
//! id (spec §4.4). Lookups that miss coalesce into a single XML fetch via
//! `moka`'s `get_with`; failures are cached too, for a shorter window, so
//! a broken process definition doesn't get re-fetched on every task.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use exchanger_engine_client::EngineClient;
use exchanger_shared::config::CacheConfig;
use exchanger_shared::DiagramElementMetadata;
use moka::future::Cache;
use moka::Expiry;

use crate::error::BpmnCacheError;
use crate::parser::parse_bpmn_xml;

type CacheValue = Result<Arc<HashMap<String, DiagramElementMetadata>>, String>;

struct VaryingTtl {
    positive: Duration,
    negative: Duration,
}

impl Expiry<String, CacheValue> for VaryingTtl {
    fn expire_after_create(&self, _key: &String, value: &CacheValue, _created_at: std::time::Instant) -> Option<Duration> {
        Some(match value {
            Ok(_) => self.positive,
            Err(_) => self.negative,
        })
    }
}

#[derive(Clone)]
pub struct BpmnCache {
    engine: EngineClient,
    cache: Cache<String, CacheValue>,
}

impl BpmnCache {
    pub fn new(engine: EngineClient, config: &CacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_entries)
            .expire_after(VaryingTtl {
                positive: Duration::from_secs(config.ttl_seconds),
                negative: Duration::from_secs(config.negative_ttl_seconds),
            })
            .build();
        Self { engine, cache }
    }

    /// Looks up a single activity's metadata, fetching and parsing the
    /// owning process definition's XML on a cache miss.
    pub async fn get_element(
        &self,
        process_definition_id: &str,
        activity_id: &str,
    ) -> Result<DiagramElementMetadata, BpmnCacheError> {
        let elements = self.get_process_metadata(process_definition_id).await?;
        elements
            .get(activity_id)
            .cloned()
            .ok_or_else(|| BpmnCacheError::ActivityNotFound {
                process_definition_id: process_definition_id.to_string(),
                activity_id: activity_id.to_string(),
            })
    }

    pub async fn get_process_metadata(
        &self,
        process_definition_id: &str,
    ) -> Result<Arc<HashMap<String, DiagramElementMetadata>>, BpmnCacheError> {
        let key = process_definition_id.to_string();
        let engine = self.engine.clone();
        let fetch_key = key.clone();
        let value = self
            .cache
            .get_with(key, async move {
                match engine.get_process_xml(&fetch_key).await {
                    Ok(xml) => match parse_bpmn_xml(&xml) {
                        Ok(map) => Ok(Arc::new(map)),
                        Err(e) => Err(e.to_string()),
                    },
                    Err(e) => Err(e.to_string()),
                }
            })
            .await;
        value.map_err(BpmnCacheError::Cached)
    }

    pub fn invalidate(&self, process_definition_id: &str) {
        self.cache.invalidate(process_definition_id);
    }
}
