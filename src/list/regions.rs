//! Region catalog
//!
//! Regions per vendor are effectively static for a session, so they are
//! roll-fetched once and served from a [`RequestCache`]. Concurrent lookups
//! for the same vendor share one fetch.

use super::cache::{CacheKey, CachePolicy, RequestCache};
use super::roll::{roll_fetch_all, RollOptions};
use crate::api::ApiClient;
use crate::error::ListResult;
use crate::filter::{FilterSet, Operator, Rule, ValueAliases};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub region_id: String,
    #[serde(default)]
    pub region_name: Option<String>,
    #[serde(default)]
    pub vendor: Option<String>,
}

impl Region {
    /// Name shown to users, falling back to the id
    pub fn display_name(&self) -> &str {
        self.region_name.as_deref().unwrap_or(&self.region_id)
    }
}

pub struct RegionCatalog {
    client: ApiClient,
    cache: RequestCache<Arc<Vec<Region>>>,
    options: RollOptions,
}

impl RegionCatalog {
    pub fn new(client: ApiClient, policy: CachePolicy) -> Self {
        Self {
            client,
            cache: RequestCache::new(policy),
            options: RollOptions::default(),
        }
    }

    pub fn with_roll_options(mut self, options: RollOptions) -> Self {
        self.options = options;
        self
    }

    /// All regions of `vendor`
    pub async fn list(&self, vendor: &str) -> ListResult<Arc<Vec<Region>>> {
        let url = self.client.regions_url(vendor)?;
        let (key, filter) = self.request_key(vendor)?;

        let transport = self.client.transport();
        let options = self.options.clone();
        self.cache
            .get_or_fetch(key, move || async move {
                roll_fetch_all::<Region>(&*transport, &url, &filter, &options)
                    .await
                    .map(|regions| {
                        tracing::debug!("Loaded {} regions", regions.len());
                        Arc::new(regions)
                    })
            })
            .await
    }

    /// Region id for a display name (or an id, which maps to itself)
    pub async fn region_id_for(&self, vendor: &str, name: &str) -> ListResult<Option<String>> {
        let regions = self.list(vendor).await?;
        Ok(regions
            .iter()
            .find(|r| r.region_id == name || r.region_name.as_deref() == Some(name))
            .map(|r| r.region_id.clone()))
    }

    /// Alias table for the `region` field: display name to region id
    pub async fn aliases(&self, vendor: &str) -> ListResult<ValueAliases> {
        let regions = self.list(vendor).await?;
        let mut aliases = ValueAliases::new();
        aliases.extend(
            "region",
            regions
                .iter()
                .filter_map(|r| r.region_name.clone().map(|name| (name, json!(r.region_id)))),
        );
        Ok(aliases)
    }

    /// Forget the regions of `vendor`
    pub fn invalidate(&self, vendor: &str) -> ListResult<()> {
        let (key, _) = self.request_key(vendor)?;
        self.cache.invalidate(&key);
        Ok(())
    }

    fn request_key(&self, vendor: &str) -> ListResult<(CacheKey, FilterSet)> {
        let filter = FilterSet::and(vec![Rule::leaf("vendor", Operator::Eq, vendor)]);
        let key = CacheKey::new(&json!({
            "vendor": vendor,
            "filter": filter,
            "limit": self.options.limit,
        }))?;
        Ok((key, filter))
    }
}
