//! Backend API interaction module
//!
//! # Module Structure
//!
//! - [`http`] - the [`Transport`](http::Transport) seam and its reqwest implementation
//! - [`client`] - base URL and scope handling for list and entity endpoints
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use cloudlist::api::{ApiClient, ApiScope, HttpTransport};
//!
//! fn example() -> cloudlist::ListResult<()> {
//!     let transport = Arc::new(HttpTransport::new()?);
//!     let client = ApiClient::new(transport, "https://hcm.example.com", ApiScope::Business(2))?;
//!     let url = client.list_url("cvms")?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod http;

pub use client::{ApiClient, ApiScope};
pub use http::{HttpTransport, Transport};
