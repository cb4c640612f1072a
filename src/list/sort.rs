//! Sort Controller
//!
//! Tracks the current sort column. Clearing the sort in the UI restores the
//! configured default, so a list is always sorted by something.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(format!("unknown sort order '{}'", other)),
        }
    }
}

/// Direction reported by a table header click
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
    /// The user cleared sorting on the column
    None,
}

impl SortDirection {
    /// Parse table widget values: `asc`, `desc`, anything else (`null`, `""`) clears
    pub fn from_widget(value: Option<&str>) -> Self {
        match value.map(str::to_ascii_lowercase).as_deref() {
            Some("asc") => Self::Asc,
            Some("desc") => Self::Desc,
            _ => Self::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortState {
    pub field: String,
    pub order: SortOrder,
}

impl SortState {
    pub fn new(field: impl Into<String>, order: SortOrder) -> Self {
        Self {
            field: field.into(),
            order,
        }
    }
}

impl Default for SortState {
    fn default() -> Self {
        Self::new("created_at", SortOrder::Desc)
    }
}

#[derive(Debug, Clone)]
pub struct SortController {
    default: SortState,
    current: SortState,
}

impl SortController {
    pub fn new(default: SortState) -> Self {
        Self {
            current: default.clone(),
            default,
        }
    }

    pub fn current(&self) -> &SortState {
        &self.current
    }

    pub fn default_sort(&self) -> &SortState {
        &self.default
    }

    /// Apply a header click; `SortDirection::None` restores the default
    pub fn set_sort(&mut self, field: &str, direction: SortDirection) {
        self.current = match direction {
            SortDirection::Asc => SortState::new(field, SortOrder::Asc),
            SortDirection::Desc => SortState::new(field, SortOrder::Desc),
            SortDirection::None => self.default.clone(),
        };
    }

    pub fn reset(&mut self) {
        self.current = self.default.clone();
    }
}

impl Default for SortController {
    fn default() -> Self {
        Self::new(SortState::default())
    }
}
