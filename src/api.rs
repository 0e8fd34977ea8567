use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use log::{debug, info, warn};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use serde_json::Value;

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::token::{EntraIdTokenProvider, TokenSource};

/// HTTP methods the caller knows how to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiMethod {
    Get,
    Post,
}

impl ApiMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiMethod::Get => "GET",
            ApiMethod::Post => "POST",
        }
    }
}

impl fmt::Display for ApiMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(ApiMethod::Get),
            "POST" => Ok(ApiMethod::Post),
            _ => Err(Error::UnsupportedMethod(s.to_string())),
        }
    }
}

/// One call against the downstream API.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub endpoint: String,
    pub method: ApiMethod,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: ApiMethod::Get,
            body: None,
        }
    }

    pub fn post(endpoint: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: ApiMethod::Post,
            body,
        }
    }
}

/// Sends bearer-authenticated JSON requests to a single base URL.
///
/// The client keeps one [`TokenSource`] for its whole lifetime, so a token
/// obtained for the first call is reused by later ones while it stays valid.
pub struct ApiClient {
    http: Client,
    base_url: String,
    tokens: Arc<dyn TokenSource>,
}

impl ApiClient {
    pub fn new(config: &ClientConfig, tokens: Arc<dyn TokenSource>) -> Result<Self> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            tokens,
        })
    }

    /// Builds a client backed by an [`EntraIdTokenProvider`] for `config.credentials`.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let tokens = Arc::new(EntraIdTokenProvider::new(config.credentials.clone()));
        Self::new(config, tokens)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full URL for `endpoint`. The base URL and endpoint are joined verbatim.
    pub fn url_for(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    /// Calls `endpoint` with `method` ("GET" or "POST", any case).
    ///
    /// # Errors
    ///
    /// [`Error::UnsupportedMethod`] is returned before a token is requested or
    /// anything is sent. A non-2xx answer becomes [`Error::HttpStatus`].
    pub async fn call_vm_api(
        &self,
        endpoint: &str,
        method: &str,
        body: Option<Value>,
    ) -> Result<Value> {
        let method: ApiMethod = method.parse()?;
        self.send(&ApiRequest {
            endpoint: endpoint.to_string(),
            method,
            body,
        })
        .await
    }

    /// `GET endpoint`, the usual way the API is called.
    pub async fn get(&self, endpoint: &str) -> Result<Value> {
        self.send(&ApiRequest::get(endpoint)).await
    }

    pub async fn post(&self, endpoint: &str, body: Value) -> Result<Value> {
        self.send(&ApiRequest::post(endpoint, Some(body))).await
    }

    pub async fn send(&self, request: &ApiRequest) -> Result<Value> {
        let access_token = self.tokens.get_access_token().await?;
        let url = self.url_for(&request.endpoint);

        let builder = match request.method {
            ApiMethod::Get => self.http.get(&url),
            ApiMethod::Post => self.http.post(&url),
        }
        .bearer_auth(&access_token)
        .header(CONTENT_TYPE, "application/json")
        .header(ACCEPT, "application/json");

        // Headers go first so `json` does not add a second Content-Type.
        let builder = match (request.method, &request.body) {
            (ApiMethod::Post, Some(body)) => builder.json(body),
            (ApiMethod::Get, Some(_)) => {
                warn!("Ignoring request body for GET {}", url);
                builder
            }
            (_, None) => builder,
        };

        info!("Calling VM API: {} {}", request.method, url);
        let response = builder.send().await?;

        let status = response.status();
        info!("Response: {}", status);
        let text = response.text().await?;

        if !status.is_success() {
            debug!("Error body: {}", text);
            return Err(Error::HttpStatus {
                status,
                url,
                body: text,
            });
        }

        Ok(serde_json::from_str(&text)?)
    }
}

/// One-shot call: builds a fresh token provider and client, then calls `endpoint`.
///
/// Nothing is cached between invocations. Hold on to an [`ApiClient`] when
/// several calls should share a token.
pub async fn call_vm_api(
    config: &ClientConfig,
    endpoint: &str,
    method: &str,
    body: Option<Value>,
) -> Result<Value> {
    ApiClient::from_config(config)?
        .call_vm_api(endpoint, method, body)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials;

    #[test]
    fn methods_parse_case_insensitively() {
        assert_eq!("get".parse::<ApiMethod>().unwrap(), ApiMethod::Get);
        assert_eq!("Post".parse::<ApiMethod>().unwrap(), ApiMethod::Post);
    }

    #[test]
    fn other_methods_are_unsupported() {
        for method in ["PUT", "DELETE", "PATCH", ""] {
            let err = method.parse::<ApiMethod>().unwrap_err();
            assert!(matches!(err, Error::UnsupportedMethod(ref m) if m == method));
        }
    }

    #[test]
    fn url_is_base_plus_endpoint() {
        let config = ClientConfig::new(
            Credentials::new("t", "c", "s"),
            "https://vm.example.com",
        );
        let client = ApiClient::from_config(&config).unwrap();
        assert_eq!(
            client.url_for("/api/hello"),
            "https://vm.example.com/api/hello"
        );
    }

    #[test]
    fn request_constructors_set_method() {
        assert_eq!(ApiRequest::get("/api/time").method, ApiMethod::Get);
        let post = ApiRequest::post("/api/hello", Some(serde_json::json!({"name": "vm"})));
        assert_eq!(post.method, ApiMethod::Post);
        assert!(post.body.is_some());
    }
}
