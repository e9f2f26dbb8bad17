use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use reqwest_middleware::ClientWithMiddleware;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{retry, ApiError, ClientOptions, Payload, Result};

/// JSON HTTP client bound to one base URL.
///
/// Every request goes through a single pooled transport session with
/// status-based retries. The session is released by [`ApiClient::close`],
/// by dropping the client, or at the end of [`ApiClient::scoped`].
pub struct ApiClient {
    session: RwLock<Option<ClientWithMiddleware>>,
    base_url: String,
    headers: HeaderMap,
    options: ClientOptions,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers: Vec<(&str, &str)> = self
            .headers
            .keys()
            .map(|name| (name.as_str(), "<redacted>"))
            .collect();
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("headers", &headers)
            .field("options", &self.options)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl ApiClient {
    /// Creates a client with no extra headers and default options.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_config(base_url, None, ClientOptions::default())
    }

    /// Creates a client with headers sent on every request and explicit options.
    ///
    /// Fails with [`ApiError::Config`] when `base_url` is empty or a header
    /// name or value is not valid HTTP.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use std::collections::HashMap;
    /// use api_client_bench::{ApiClient, ClientOptions};
    ///
    /// let headers = HashMap::from([("accept".to_owned(), "application/json".to_owned())]);
    /// let client = ApiClient::with_config(
    ///     "https://jsonplaceholder.typicode.com",
    ///     Some(headers),
    ///     ClientOptions::default(),
    /// )
    /// .expect("valid configuration");
    /// ```
    pub fn with_config(
        base_url: impl Into<String>,
        headers: Option<HashMap<String, String>>,
        options: ClientOptions,
    ) -> Result<Self> {
        let base_url = base_url.into();
        if base_url.trim().is_empty() {
            return Err(ApiError::Config("base URL must not be empty".to_owned()));
        }
        let headers = header_map(headers.unwrap_or_default())?;
        let session = build_session(&options)?;

        Ok(Self {
            session: RwLock::new(Some(session)),
            base_url,
            headers,
            options,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Full request URL: the endpoint appended verbatim to the base URL.
    pub fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    pub async fn get(&self, endpoint: &str) -> Result<Value> {
        self.send(Method::GET, endpoint, Payload::Empty).await
    }

    /// Like [`ApiClient::get`], decoding into a caller-chosen type.
    pub async fn get_as<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        self.send(Method::GET, endpoint, Payload::Empty).await
    }

    pub async fn post(&self, endpoint: &str, data: impl Into<Payload>) -> Result<Value> {
        self.send(Method::POST, endpoint, data.into()).await
    }

    pub async fn put(&self, endpoint: &str, data: impl Into<Payload>) -> Result<Value> {
        self.send(Method::PUT, endpoint, data.into()).await
    }

    pub async fn delete(&self, endpoint: &str) -> Result<Value> {
        self.send(Method::DELETE, endpoint, Payload::Empty).await
    }

    /// Releases the transport session and its pooled connections.
    ///
    /// Calling it again is a no-op. Requests already in flight finish on
    /// their own handle; new requests fail with [`ApiError::Closed`].
    pub fn close(&self) {
        let session = self
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        #[cfg(feature = "tracing")]
        {
            if session.is_some() {
                tracing::debug!(base_url = %self.base_url, "client session closed");
            }
        }

        drop(session);
    }

    pub fn is_closed(&self) -> bool {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Runs `body` with a shared handle to this client and closes the client
    /// afterwards, whether `body` succeeded or failed.
    ///
    /// The handle is an [`Arc`] so the body can hand clones to spawned tasks.
    /// If `body` panics the client is still closed when the last handle drops.
    pub async fn scoped<T, F, Fut>(self, body: F) -> Result<T>
    where
        F: FnOnce(Arc<ApiClient>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let client = Arc::new(self);
        let outcome = body(Arc::clone(&client)).await;
        client.close();
        outcome
    }

    fn session(&self) -> Result<ClientWithMiddleware> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(ApiError::Closed)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        payload: Payload,
    ) -> Result<T> {
        let http = self.session()?;
        let url = self.endpoint_url(endpoint);

        #[cfg(feature = "tracing")]
        tracing::debug!(%method, %url, "sending request");

        let request = http
            .request(method, url.as_str())
            .headers(self.headers.clone());
        let request = match payload {
            Payload::Empty => request,
            Payload::Json(value) => request.json(&value),
            Payload::Form(pairs) => request.form(&pairs),
        };

        let response = request.send().await.map_err(ApiError::Transport)?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| ApiError::Transport(err.into()))?;

        if status.is_client_error() || status.is_server_error() {
            return Err(ApiError::Http {
                status: status.as_u16(),
                url,
                body,
            });
        }

        decode_body(&body)
    }
}

impl Drop for ApiClient {
    fn drop(&mut self) {
        self.close();
    }
}

/// Decodes a JSON response body. An empty body decodes as JSON `null`.
pub(crate) fn decode_body<T: DeserializeOwned>(body: &str) -> Result<T> {
    let text = if body.trim().is_empty() { "null" } else { body };
    serde_json::from_str(text)
        .map_err(|err| ApiError::Decode(format!("invalid response JSON: {err}; body: {body}")))
}

fn build_session(options: &ClientOptions) -> Result<ClientWithMiddleware> {
    let mut builder = reqwest::Client::builder();
    if let Some(timeout_ms) = options.timeout_ms {
        builder = builder.timeout(Duration::from_millis(timeout_ms));
    }
    let http = builder
        .build()
        .map_err(|err| ApiError::Transport(err.into()))?;
    Ok(retry::with_retries(http, options))
}

fn header_map(headers: HashMap<String, String>) -> Result<HeaderMap> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|err| ApiError::Config(format!("invalid header name '{name}': {err}")))?;
        let value = HeaderValue::from_str(&value)
            .map_err(|err| ApiError::Config(format!("invalid value for header '{name}': {err}")))?;
        map.insert(name, value);
    }
    Ok(map)
}
