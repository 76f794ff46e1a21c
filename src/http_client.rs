//! HTTP transport used by the step executor.

use crate::config::ExecutorOptions;
use crate::error::TransportError;
use crate::model::{Request, RequestResult};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use tracing::debug;

/// Sends one request and returns the raw response.
///
/// Implementations must be safe to share between concurrently running
/// scenarios and must not retry on their own.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn send(&self, request: &Request) -> Result<RequestResult, TransportError>;
}

/// [`HttpClient`] backed by a single shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: Client,
}

impl ReqwestClient {
    pub fn new(options: &ExecutorOptions) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(options.request_timeout).build()?;
        Ok(Self { client })
    }
}

/// Case-insensitive method lookup. A blank method means GET.
fn parse_method(method: &str) -> Result<Method, TransportError> {
    let method = method.trim();
    if method.is_empty() {
        return Ok(Method::GET);
    }
    Method::from_bytes(method.to_uppercase().as_bytes())
        .map_err(|_| TransportError::InvalidMethod(method.to_string()))
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn send(&self, request: &Request) -> Result<RequestResult, TransportError> {
        let method = parse_method(&request.method)?;

        let mut headers = HeaderMap::new();
        for header in &request.headers {
            let name = HeaderName::from_bytes(header.name.as_bytes()).map_err(|e| {
                TransportError::Other(format!("invalid header name '{}': {e}", header.name))
            })?;
            let value = HeaderValue::from_str(&header.value).map_err(|e| {
                TransportError::Other(format!("invalid value for header '{}': {e}", header.name))
            })?;
            headers.insert(name, value);
        }

        debug!("Sending {} request to {}", method, request.url);
        let mut builder = self.client.request(method, &request.url).headers(headers);
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();
        debug!("Received response with status: {}", status);

        Ok(RequestResult {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_method_defaults_to_get() {
        assert_eq!(parse_method("").unwrap(), Method::GET);
        assert_eq!(parse_method("  \t").unwrap(), Method::GET);
    }

    #[test]
    fn test_method_is_case_insensitive() {
        assert_eq!(parse_method("post").unwrap(), Method::POST);
        assert_eq!(parse_method(" Delete ").unwrap(), Method::DELETE);
    }

    #[test]
    fn test_invalid_method() {
        let err = parse_method("BAD METHOD").unwrap_err();
        assert_eq!(err.to_string(), "invalid HTTP method 'BAD METHOD'");
    }

    #[tokio::test]
    async fn test_send_rejects_invalid_method_before_connecting() {
        let client = ReqwestClient::new(&ExecutorOptions::default()).unwrap();
        let request = Request {
            method: "GE T".to_string(),
            url: "http://127.0.0.1:9/unused".to_string(),
            headers: vec![],
            body: String::new(),
        };

        let err = client.send(&request).await.unwrap_err();
        assert!(matches!(err, TransportError::InvalidMethod(ref m) if m == "GE T"));
    }
}
