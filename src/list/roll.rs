//! Roll-Fetch-All
//!
//! Collects an entire filtered result set: one count request, then
//! `ceil(count / limit)` detail pages. Pages are issued with bounded
//! concurrency and concatenated in page order.

use super::page::{list_body, PageParams, ResponsePaths, DEFAULT_PAGE_LIMIT};
use crate::api::Transport;
use crate::error::{ListError, ListResult};
use crate::filter::FilterSet;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

#[derive(Debug, Clone)]
pub struct RollOptions {
    pub limit: u64,
    /// Refuse result sets larger than this
    pub max_records: Option<u64>,
    /// Detail pages in flight at once
    pub concurrency: usize,
    pub paths: ResponsePaths,
    pub extension: Map<String, Value>,
}

impl Default for RollOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            max_records: None,
            concurrency: 1,
            paths: ResponsePaths::default(),
            extension: Map::new(),
        }
    }
}

impl RollOptions {
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_max_records(mut self, max_records: u64) -> Self {
        self.max_records = Some(max_records);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }
}

/// Fetch every record matching `filter` from `url`.
///
/// A failing page aborts the whole fetch with [`ListError::PartialResult`]
/// naming the page; records of pages that did succeed are not returned.
pub async fn roll_fetch_all<T>(
    transport: &dyn Transport,
    url: &str,
    filter: &FilterSet,
    options: &RollOptions,
) -> ListResult<Vec<T>>
where
    T: DeserializeOwned,
{
    let limit = options.limit.max(1);

    let count_body = list_body(filter, &PageParams::count_only(), &options.extension)?;
    let response = transport.post(url, &count_body).await?;
    let count = options.paths.count_from(&response)?;

    if let Some(cap) = options.max_records {
        if count > cap {
            return Err(ListError::ResultTruncated { count, cap });
        }
    }

    let pages = count.div_ceil(limit);
    tracing::debug!("Roll fetching {} records in {} pages from {}", count, pages, url);

    let batches: Vec<Vec<T>> = stream::iter(0..pages)
        .map(|page| async move {
            fetch_page::<T>(transport, url, filter, options, page * limit, limit)
                .await
                .map_err(|err| ListError::PartialResult {
                    page,
                    source: Box::new(err),
                })
        })
        .buffered(options.concurrency.max(1))
        .try_collect()
        .await?;

    let records: Vec<T> = batches.into_iter().flatten().collect();
    if records.len() as u64 != count {
        tracing::debug!("Roll fetch got {} records, count said {}", records.len(), count);
    }
    Ok(records)
}

async fn fetch_page<T: DeserializeOwned>(
    transport: &dyn Transport,
    url: &str,
    filter: &FilterSet,
    options: &RollOptions,
    start: u64,
    limit: u64,
) -> ListResult<Vec<T>> {
    let body = list_body(filter, &PageParams::details(start, limit, None), &options.extension)?;
    let response = transport.post(url, &body).await?;
    options.paths.details_from(&response)
}
