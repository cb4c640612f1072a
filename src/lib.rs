//! cloudlist
//!
//! Data-fetching and filter-composition engine for paginated list endpoints
//! of a cloud resource management API.
//!
//! # Module Structure
//!
//! - [`api`] - HTTP transport, base URL and business/resource scope
//! - [`filter`] - rule tree, property metadata, condition compiler, composer
//! - [`list`] - paginated list controller, roll fetch, request cache
//! - [`config`] - persistent user configuration
//! - [`error`] - the engine error type

pub mod api;
pub mod config;
pub mod error;
pub mod filter;
pub mod list;

#[cfg(test)]
mod testing;

pub use error::{format_api_error, ListError, ListResult};
