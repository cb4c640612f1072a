//! In-memory transport for unit tests

use crate::api::Transport;
use crate::error::{ListError, ListResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Method;
use serde_json::{json, Value};
use std::time::Duration;

/// Serves `total` numbered items from any list URL.
///
/// Detail items are `{"id": n, "tag": <value of the first filter rule>}` so
/// tests can tell which filter produced a page.
pub(crate) struct MockTransport {
    total: Mutex<u64>,
    delay: Duration,
    slow: Mutex<Option<(Value, Duration)>>,
    fail_start: Mutex<Option<u64>>,
    fail_count: Mutex<bool>,
    requests: Mutex<Vec<Value>>,
}

impl MockTransport {
    pub(crate) fn new(total: u64) -> Self {
        Self {
            total: Mutex::new(total),
            delay: Duration::from_millis(5),
            slow: Mutex::new(None),
            fail_start: Mutex::new(None),
            fail_count: Mutex::new(false),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn set_total(&self, total: u64) {
        *self.total.lock() = total;
    }

    /// Requests whose first rule has `value` take `delay` longer
    pub(crate) fn slow_for(&self, value: Value, delay: Duration) {
        *self.slow.lock() = Some((value, delay));
    }

    pub(crate) fn fail_at_start(&self, start: Option<u64>) {
        *self.fail_start.lock() = start;
    }

    pub(crate) fn fail_count(&self, fail: bool) {
        *self.fail_count.lock() = fail;
    }

    pub(crate) fn requests(&self) -> Vec<Value> {
        self.requests.lock().clone()
    }

    pub(crate) fn detail_requests(&self) -> Vec<Value> {
        self.requests()
            .into_iter()
            .filter(|r| r["page"]["count"] == json!(false))
            .collect()
    }

    pub(crate) fn count_requests(&self) -> usize {
        self.requests()
            .iter()
            .filter(|r| r["page"]["count"] == json!(true))
            .count()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn request(&self, _method: Method, _url: &str, body: Option<&Value>) -> ListResult<Value> {
        let body = body.cloned().unwrap_or(Value::Null);
        self.requests.lock().push(body.clone());

        let tag = body["filter"]["rules"][0]["value"].clone();
        let extra = match &*self.slow.lock() {
            Some((value, delay)) if *value == tag => *delay,
            _ => Duration::ZERO,
        };
        tokio::time::sleep(self.delay + extra).await;

        let total = *self.total.lock();
        let page = &body["page"];
        if page["count"] == json!(true) {
            if *self.fail_count.lock() {
                return Err(ListError::transport(Some(500), "count failed"));
            }
            return Ok(json!({"data": {"count": total, "details": []}}));
        }

        let start = page["start"].as_u64().unwrap_or(0);
        let limit = page["limit"].as_u64().unwrap_or(0);
        if *self.fail_start.lock() == Some(start) {
            return Err(ListError::transport(Some(502), "bad gateway"));
        }

        let details: Vec<Value> = (start..total.min(start.saturating_add(limit)))
            .map(|id| json!({"id": id, "tag": tag}))
            .collect();
        Ok(json!({"data": {"details": details}}))
    }
}
