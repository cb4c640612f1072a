//! List fetching
//!
//! Everything that talks to list endpoints: the paginated controller behind
//! table views, full-result roll fetching and the request cache used for
//! lookup catalogs.
//!
//! # Architecture
//!
//! - [`page`] - page state, request bodies, response extraction
//! - [`sort`] - current/default sort column
//! - [`controller`] - paginated list with scroll append and refresh
//! - [`roll`] - fetch an entire result set page by page
//! - [`cache`] - keyed result cache with in-flight request coalescing
//! - [`regions`] - cached region catalog per vendor
//!
//! # Example
//!
//! ```ignore
//! use cloudlist::list::{ListController, ListOptions, LoadMode};
//!
//! async fn first_page(client: &cloudlist::api::ApiClient) -> cloudlist::ListResult<()> {
//!     let list = ListController::<serde_json::Value>::new(client.transport(), client.list_url("cvms")?, ListOptions::default());
//!     list.load(&[], LoadMode::Replace).await?;
//!     println!("{} of {}", list.list().len(), list.count());
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod controller;
pub mod page;
pub mod regions;
pub mod roll;
pub mod sort;

pub use cache::{CacheKey, CachePolicy, RequestCache};
pub use controller::{ListController, ListOptions, LoadMode};
pub use page::{PageParams, PageState, ResponsePaths, DEFAULT_PAGE_LIMIT};
pub use regions::{Region, RegionCatalog};
pub use roll::{roll_fetch_all, RollOptions};
pub use sort::{SortController, SortDirection, SortOrder, SortState};
