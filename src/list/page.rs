//! Pagination state and list request payloads

use super::sort::{SortOrder, SortState};
use crate::error::{ListError, ListResult};
use crate::filter::FilterSet;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

/// Default page size
pub const DEFAULT_PAGE_LIMIT: u64 = 50;

/// Window of the current list view.
///
/// `count` is only authoritative after a count call has completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageState {
    pub start: u64,
    pub limit: u64,
    pub count: u64,
}

impl PageState {
    pub fn new(limit: u64) -> Self {
        Self {
            start: 0,
            limit: limit.max(1),
            count: 0,
        }
    }

    /// Zero-based page index of `start`
    pub fn page_index(&self) -> u64 {
        self.start / self.limit
    }

    /// Number of pages needed to cover `count`
    pub fn page_count(&self) -> u64 {
        self.count.div_ceil(self.limit)
    }
}

impl Default for PageState {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_LIMIT)
    }
}

/// `page` object of a list request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageParams {
    pub start: u64,
    pub limit: u64,
    pub count: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<SortOrder>,
}

impl PageParams {
    /// Detail page: returns `details` only
    pub fn details(start: u64, limit: u64, sort: Option<&SortState>) -> Self {
        Self {
            start,
            limit,
            count: false,
            sort: sort.map(|s| s.field.clone()),
            order: sort.map(|s| s.order),
        }
    }

    /// Count query: not limited by pagination, never sorted
    pub fn count_only() -> Self {
        Self {
            start: 0,
            limit: 0,
            count: true,
            sort: None,
            order: None,
        }
    }
}

#[derive(Serialize)]
struct ListBody<'a> {
    filter: &'a FilterSet,
    page: &'a PageParams,
    #[serde(flatten)]
    extension: &'a Map<String, Value>,
}

/// Build `{ filter, page, ...extension }`
pub fn list_body(filter: &FilterSet, page: &PageParams, extension: &Map<String, Value>) -> ListResult<Value> {
    serde_json::to_value(ListBody {
        filter,
        page,
        extension,
    })
    .map_err(ListError::from)
}

/// Where list responses keep their items and total
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponsePaths {
    pub details: String,
    pub count: String,
}

impl Default for ResponsePaths {
    fn default() -> Self {
        Self {
            details: "data.details".to_string(),
            count: "data.count".to_string(),
        }
    }
}

impl ResponsePaths {
    pub fn details_from<T: DeserializeOwned>(&self, response: &Value) -> ListResult<Vec<T>> {
        extract_details(response, &self.details)
    }

    pub fn count_from(&self, response: &Value) -> ListResult<u64> {
        extract_count(response, &self.count)
    }
}

/// Follow a dot-notation path; numeric segments index arrays
pub fn lookup<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    if path.is_empty() {
        return Some(value);
    }

    let mut current = value;
    for part in path.split('.') {
        current = match part.parse::<usize>() {
            Ok(idx) if current.is_array() => current.get(idx)?,
            _ => current.get(part)?,
        };
    }
    Some(current)
}

/// Items at `path`; a missing or null path means an empty page
pub fn extract_details<T: DeserializeOwned>(response: &Value, path: &str) -> ListResult<Vec<T>> {
    match lookup(response, path) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| serde_json::from_value(item.clone()).map_err(ListError::from))
            .collect(),
        Some(other) => Err(ListError::Decode(format!(
            "expected an array at '{}', found {}",
            path,
            type_name(other)
        ))),
    }
}

/// Total at `path`; a missing or null path counts as zero
pub fn extract_count(response: &Value, path: &str) -> ListResult<u64> {
    match lookup(response, path) {
        None | Some(Value::Null) => Ok(0),
        Some(Value::Number(n)) => n
            .as_u64()
            .ok_or_else(|| ListError::Decode(format!("count at '{}' is not a non-negative integer", path))),
        Some(other) => Err(ListError::Decode(format!(
            "expected a number at '{}', found {}",
            path,
            type_name(other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
