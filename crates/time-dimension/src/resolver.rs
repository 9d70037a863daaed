//! Time dimension resolution against a WMS capabilities endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Request};
use tracing::{debug, instrument, warn};

use crate::capabilities::parse_capabilities;
use crate::dimension::TimeDimension;
use crate::error::{DimensionError, DimensionResult};

/// Default timeout for a single capabilities request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Source of capabilities documents.
///
/// Implemented over HTTP for production and by in-memory fixtures in tests.
#[async_trait]
pub trait CapabilitiesSource: Send + Sync {
    /// Fetch a capabilities document scoped to `layer_name`.
    async fn fetch_capabilities(&self, base_url: &str, layer_name: &str) -> DimensionResult<String>;
}

/// Capabilities over HTTP using reqwest.
#[derive(Debug, Clone)]
pub struct HttpCapabilitiesSource {
    client: Client,
}

impl HttpCapabilitiesSource {
    pub fn new(timeout: Duration) -> DimensionResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// GetCapabilities request restricted to one layer to keep the payload small.
    pub fn capabilities_request(&self, base_url: &str, layer_name: &str) -> DimensionResult<Request> {
        let request = self
            .client
            .get(base_url)
            .query(&[
                ("SERVICE", "WMS"),
                ("VERSION", "1.3.0"),
                ("REQUEST", "GetCapabilities"),
                ("LAYERS", layer_name),
            ])
            .build()?;
        Ok(request)
    }
}

#[async_trait]
impl CapabilitiesSource for HttpCapabilitiesSource {
    async fn fetch_capabilities(&self, base_url: &str, layer_name: &str) -> DimensionResult<String> {
        let request = self.capabilities_request(base_url, layer_name)?;
        let url = request.url().to_string();
        let response = self.client.execute(request).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DimensionError::HttpStatus {
                status: status.as_u16(),
                url,
            });
        }

        Ok(response.text().await?)
    }
}

/// Resolves a layer's advertised time axis into ordered timestamps.
///
/// Stateless: nothing is cached between calls.
#[derive(Debug, Clone)]
pub struct TimeDimensionResolver<S> {
    source: S,
}

impl TimeDimensionResolver<HttpCapabilitiesSource> {
    /// Resolver over HTTP with the default request timeout.
    pub fn http() -> DimensionResult<Self> {
        Ok(Self::new(HttpCapabilitiesSource::new(DEFAULT_TIMEOUT)?))
    }
}

impl<S: CapabilitiesSource> TimeDimensionResolver<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Fetch and expand the TIME dimension of `layer_name`.
    #[instrument(skip(self))]
    pub async fn resolve(&self, layer_name: &str, capabilities_base_url: &str) -> DimensionResult<TimeDimension> {
        let xml = self
            .source
            .fetch_capabilities(capabilities_base_url, layer_name)
            .await
            .map_err(|e| {
                warn!(error = %e, code = e.code(), "Capabilities request failed");
                e
            })?;

        let dimension = parse_capabilities(&xml, layer_name)?;
        if dimension.is_empty() {
            return Err(DimensionError::MissingTimeDimension {
                layer: layer_name.to_string(),
            });
        }

        debug!(
            frames = dimension.len(),
            default = ?dimension.default,
            "Resolved time dimension"
        );
        Ok(dimension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(base_url: &str, layer_name: &str) -> String {
        let source = HttpCapabilitiesSource::new(DEFAULT_TIMEOUT).unwrap();
        source.capabilities_request(base_url, layer_name).unwrap().url().to_string()
    }

    #[test]
    fn test_capabilities_url_plain() {
        assert_eq!(
            url("https://example.com/wms", "radar"),
            "https://example.com/wms?SERVICE=WMS&VERSION=1.3.0&REQUEST=GetCapabilities&LAYERS=radar"
        );
    }

    #[test]
    fn test_capabilities_url_existing_query() {
        assert_eq!(
            url("https://example.com/ows?map=wx", "sat"),
            "https://example.com/ows?map=wx&SERVICE=WMS&VERSION=1.3.0&REQUEST=GetCapabilities&LAYERS=sat"
        );
        assert_eq!(
            url("https://example.com/ows?", "sat"),
            "https://example.com/ows?SERVICE=WMS&VERSION=1.3.0&REQUEST=GetCapabilities&LAYERS=sat"
        );
    }

    #[test]
    fn test_capabilities_url_encodes_layer_name() {
        let request = url("https://example.com/wms", "obs&fcst #2");
        assert!(request.ends_with("&LAYERS=obs%26fcst+%232"));

        let source = HttpCapabilitiesSource::new(DEFAULT_TIMEOUT).unwrap();
        let request = source.capabilities_request("https://example.com/wms", "obs&fcst #2").unwrap();
        let layers: Vec<_> = request
            .url()
            .query_pairs()
            .filter(|(name, _)| name == "LAYERS")
            .map(|(_, value)| value.into_owned())
            .collect();
        assert_eq!(layers, vec!["obs&fcst #2".to_string()]);
    }

    #[test]
    fn test_invalid_base_url_is_an_error() {
        let source = HttpCapabilitiesSource::new(DEFAULT_TIMEOUT).unwrap();
        assert!(source.capabilities_request("not a url", "radar").is_err());
    }
}
