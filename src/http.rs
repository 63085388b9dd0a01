//! HTTP client construction for the chat service.

use reqwest::{Client, RequestBuilder};
use std::collections::HashMap;
use tracing::warn;

use crate::options::ClientOptions;

/// Build a configured HTTP client from client options.
///
/// An unparsable proxy URL is logged and skipped.
///
/// # Example
/// ```ignore
/// let client = build_http_client(&options)?;
/// ```
pub fn build_http_client(options: &ClientOptions) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder();

    if let Some(timeout) = options.timeout {
        builder = builder.timeout(timeout);
    }

    if let Some(proxy_url) = &options.proxy {
        match reqwest::Proxy::all(proxy_url) {
            Ok(proxy) => builder = builder.proxy(proxy),
            Err(e) => warn!(proxy = %proxy_url, error = %e, "ignoring invalid proxy"),
        }
    }

    builder.build()
}

/// Add extra headers to a request if specified in client options.
pub fn add_extra_headers(
    mut request: RequestBuilder,
    extra_headers: &Option<HashMap<String, String>>,
) -> RequestBuilder {
    if let Some(headers) = extra_headers {
        for (key, value) in headers {
            request = request.header(key, value);
        }
    }
    request
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_build_http_client() {
        let options = ClientOptions::default().with_timeout(Duration::from_secs(30));

        let client = build_http_client(&options);
        assert!(client.is_ok());
    }

    #[test]
    fn test_build_http_client_with_proxy() {
        let options = ClientOptions::default().with_proxy("http://proxy.example.com:8080".to_string());

        let client = build_http_client(&options);
        assert!(client.is_ok());
    }

    #[test]
    fn test_extra_headers_applied() {
        let options = ClientOptions::default().with_header("x-client".to_string(), "test".to_string());
        let client = build_http_client(&options).unwrap();

        let request = add_extra_headers(client.get("http://localhost/"), &options.extra_headers)
            .build()
            .unwrap();
        assert_eq!(request.headers()["x-client"], "test");
    }
}
