//! API Client
//!
//! Pairs a [`Transport`] with a base URL and the scope (global resource view
//! or one business) that list endpoints are resolved under.

use super::http::Transport;
use crate::error::{ListError, ListResult};
use serde_json::Value;
use std::sync::Arc;
use url::Url;

/// Where list requests are routed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiScope {
    /// Resource management view, all businesses
    Resource,
    /// Business view, restricted to one business id
    Business(u64),
}

#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    base_url: Url,
    pub scope: ApiScope,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(transport: Arc<dyn Transport>, base_url: &str, scope: ApiScope) -> ListResult<Self> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| ListError::InvalidConfig(format!("invalid base url '{base_url}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ListError::InvalidConfig(format!(
                "base url '{base_url}' cannot carry a path"
            )));
        }
        // Url::join drops the last segment unless the path ends with '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            transport,
            base_url,
            scope,
        })
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    /// Switch between resource and business scope
    pub fn switch_scope(&mut self, scope: ApiScope) {
        self.scope = scope;
    }

    fn join(&self, path: &str) -> ListResult<String> {
        self.base_url
            .join(path)
            .map(String::from)
            .map_err(|e| ListError::InvalidConfig(format!("invalid path '{path}': {e}")))
    }

    fn scoped_path(&self, resource: &str) -> String {
        let resource = urlencoding::encode(resource);
        match self.scope {
            ApiScope::Resource => format!("api/v1/cloud/{resource}"),
            ApiScope::Business(biz_id) => format!("api/v1/cloud/bizs/{biz_id}/{resource}"),
        }
    }

    /// List endpoint for a resource type, e.g. `cvms` or `load_balancers`
    pub fn list_url(&self, resource: &str) -> ListResult<String> {
        self.join(&format!("{}/list", self.scoped_path(resource)))
    }

    /// Single entity endpoint
    pub fn entity_url(&self, resource: &str, id: &str) -> ListResult<String> {
        self.join(&format!(
            "{}/{}",
            self.scoped_path(resource),
            urlencoding::encode(id)
        ))
    }

    /// Region catalog endpoint for one vendor
    pub fn regions_url(&self, vendor: &str) -> ListResult<String> {
        self.join(&format!(
            "api/v1/cloud/vendors/{}/regions/list",
            urlencoding::encode(vendor)
        ))
    }

    /// Fetch one entity (`GET`), unwrapping the `data` envelope
    pub async fn get_entity(&self, resource: &str, id: &str) -> ListResult<Value> {
        let url = self.entity_url(resource, id)?;
        let response = self.transport.get(&url).await?;
        match response {
            Value::Object(mut map) => Ok(map.remove("data").unwrap_or(Value::Null)),
            _ => Err(ListError::Decode(format!("unexpected response from {url}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use reqwest::Method;

    struct NullTransport;

    #[async_trait]
    impl Transport for NullTransport {
        async fn request(&self, _: Method, _: &str, _: Option<&Value>) -> ListResult<Value> {
            Ok(Value::Null)
        }
    }

    fn client(base: &str, scope: ApiScope) -> ApiClient {
        ApiClient::new(Arc::new(NullTransport), base, scope).unwrap()
    }

    #[test]
    fn test_resource_scope_list_url() {
        let c = client("https://hcm.example.com", ApiScope::Resource);
        assert_eq!(
            c.list_url("cvms").unwrap(),
            "https://hcm.example.com/api/v1/cloud/cvms/list"
        );
    }

    #[test]
    fn test_business_scope_keeps_base_path() {
        let c = client("https://example.com/console", ApiScope::Business(42));
        assert_eq!(
            c.list_url("load_balancers").unwrap(),
            "https://example.com/console/api/v1/cloud/bizs/42/load_balancers/list"
        );
    }

    #[test]
    fn test_entity_url_encodes_id() {
        let c = client("http://localhost:8080/", ApiScope::Resource);
        assert_eq!(
            c.entity_url("vpcs", "a b").unwrap(),
            "http://localhost:8080/api/v1/cloud/vpcs/a%20b"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let err = ApiClient::new(Arc::new(NullTransport), "not a url", ApiScope::Resource);
        assert!(matches!(err, Err(ListError::InvalidConfig(_))));
    }
}
