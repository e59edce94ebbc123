//! Typed, blocking REST client.
//!
//! # Design
//! `RestClient` owns one shared `JsonCodec`, one `Transport` and an optional
//! base URL, all fixed at construction. Verb methods take `&self`, so a
//! client can sit behind an `Arc` and serve many threads at once without
//! locking. Every call is split the same way: `build_request` turns the
//! arguments into an `HttpRequest`, the transport performs the exchange, and
//! `parse_response` maps the `HttpResponse` through a response descriptor.
//! Both halves are public, so binding and decoding can be exercised without
//! a network.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::codec::{JsonCodec, SerializationPolicy};
use crate::config::{ClientConfig, DEFAULT_TIMEOUT, DEFAULT_WORKER_THREADS};
use crate::error::RestError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse, RequestHeaders};
use crate::naming::NamingConvention;
use crate::response::{Discard, ListOf, ResponseDescriptor, ResponseType};
use crate::transport::{Call, CallState, Transport, TransportOptions};

const JSON_CONTENT_TYPE: &str = "application/json";

/// Client handle: shared codec, response timeout and pooled transport.
///
/// Construction is the only place configuration is read or validated. The
/// policy and timeout cannot change afterwards.
#[derive(Debug)]
pub struct RestClient {
    codec: Arc<JsonCodec>,
    transport: Transport,
    base_url: Option<Url>,
}

impl RestClient {
    /// Default policy (as-declared names, tolerant, ISO dates) and the
    /// default timeout.
    pub fn new() -> Result<Self, RestError> {
        Self::builder().build()
    }

    /// Tolerant policy with ISO dates and the given naming convention.
    pub fn with_naming(naming: NamingConvention, timeout: Duration) -> Result<Self, RestError> {
        let policy = SerializationPolicy::builder().naming(naming).build()?;
        Self::with_policy(policy, timeout)
    }

    pub fn with_policy(policy: SerializationPolicy, timeout: Duration) -> Result<Self, RestError> {
        Self::builder().policy(policy).timeout(timeout).build()
    }

    /// Uses a codec built elsewhere. The same `Arc` may back several clients.
    pub fn with_codec(codec: Arc<JsonCodec>, timeout: Duration) -> Result<Self, RestError> {
        Self::builder().codec(codec).timeout(timeout).build()
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, RestError> {
        let mut builder = Self::builder()
            .policy(config.policy()?)
            .timeout(config.timeout())
            .worker_threads(config.worker_threads);
        if let Some(connect_timeout) = config.connect_timeout() {
            builder = builder.connect_timeout(connect_timeout);
        }
        if let Some(base_url) = &config.base_url {
            builder = builder.base_url(base_url);
        }
        builder.build()
    }

    pub fn builder() -> RestClientBuilder {
        RestClientBuilder::new()
    }

    pub fn codec(&self) -> &Arc<JsonCodec> {
        &self.codec
    }

    pub fn policy(&self) -> &SerializationPolicy {
        self.codec.policy()
    }

    pub fn timeout(&self) -> Duration {
        self.transport.timeout()
    }

    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    pub fn get<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: Option<&RequestHeaders>,
        response_type: ResponseType<T>,
    ) -> Result<T, RestError> {
        self.send(HttpMethod::Get, url, headers, None::<&()>, response_type)
    }

    pub fn get_list<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: Option<&RequestHeaders>,
        list: ListOf<T>,
    ) -> Result<Vec<T>, RestError> {
        self.send(HttpMethod::Get, url, headers, None::<&()>, list)
    }

    pub fn post<B, T>(
        &self,
        url: &str,
        body: &B,
        headers: Option<&RequestHeaders>,
        response_type: ResponseType<T>,
    ) -> Result<T, RestError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(HttpMethod::Post, url, headers, Some(body), response_type)
    }

    pub fn post_list<B, T>(
        &self,
        url: &str,
        body: &B,
        headers: Option<&RequestHeaders>,
        list: ListOf<T>,
    ) -> Result<Vec<T>, RestError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(HttpMethod::Post, url, headers, Some(body), list)
    }

    pub fn put<B, T>(
        &self,
        url: &str,
        body: &B,
        headers: Option<&RequestHeaders>,
        response_type: ResponseType<T>,
    ) -> Result<T, RestError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(HttpMethod::Put, url, headers, Some(body), response_type)
    }

    pub fn put_list<B, T>(
        &self,
        url: &str,
        body: &B,
        headers: Option<&RequestHeaders>,
        list: ListOf<T>,
    ) -> Result<Vec<T>, RestError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(HttpMethod::Put, url, headers, Some(body), list)
    }

    pub fn patch<B, T>(
        &self,
        url: &str,
        body: &B,
        headers: Option<&RequestHeaders>,
        response_type: ResponseType<T>,
    ) -> Result<T, RestError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(HttpMethod::Patch, url, headers, Some(body), response_type)
    }

    pub fn patch_list<B, T>(
        &self,
        url: &str,
        body: &B,
        headers: Option<&RequestHeaders>,
        list: ListOf<T>,
    ) -> Result<Vec<T>, RestError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(HttpMethod::Patch, url, headers, Some(body), list)
    }

    /// Sends a DELETE and ignores whatever body comes back.
    pub fn delete(&self, url: &str, headers: Option<&RequestHeaders>) -> Result<(), RestError> {
        self.send(HttpMethod::Delete, url, headers, None::<&()>, Discard)
    }

    /// Sends a DELETE and decodes the response body with `descriptor`.
    pub fn delete_for<D: ResponseDescriptor>(
        &self,
        url: &str,
        headers: Option<&RequestHeaders>,
        descriptor: D,
    ) -> Result<D::Output, RestError> {
        self.send(HttpMethod::Delete, url, headers, None::<&()>, descriptor)
    }

    /// Performs one exchange and decodes it with `descriptor`.
    ///
    /// Blocks the calling thread until the response is decoded, the response
    /// timeout elapses, or the transport fails.
    pub fn send<B, D>(
        &self,
        method: HttpMethod,
        url: &str,
        headers: Option<&RequestHeaders>,
        body: Option<&B>,
        descriptor: D,
    ) -> Result<D::Output, RestError>
    where
        B: Serialize + ?Sized,
        D: ResponseDescriptor,
    {
        let request = self.build_request(method, url, headers, body)?;
        let mut call = Call::new(method);
        let response = self.transport.execute(request, &mut call)?;

        let outcome = self.parse_response(&response, &descriptor);
        let state = match &outcome {
            Ok(_) => CallState::Decoded,
            Err(RestError::Status { .. }) => CallState::Rejected,
            Err(_) => CallState::DecodeFailed,
        };
        call.advance(state);
        debug!(
            call_id = %call.id(),
            %method,
            url,
            status = response.status,
            expected = %descriptor.describe(),
            outcome = ?state,
            elapsed_ms = call.elapsed().as_millis() as u64,
            "call finished"
        );
        outcome
    }

    /// Resolves the URL, merges headers and encodes the body with the
    /// client's policy. Requests with a body always carry
    /// `Content-Type: application/json`, replacing any caller value.
    pub fn build_request<B>(
        &self,
        method: HttpMethod,
        url: &str,
        headers: Option<&RequestHeaders>,
        body: Option<&B>,
    ) -> Result<HttpRequest, RestError>
    where
        B: Serialize + ?Sized,
    {
        let url = self.resolve_url(url)?;
        let mut header_map = headers
            .map(|h| h.as_header_map().clone())
            .unwrap_or_default();

        let body = match body {
            Some(body) => {
                let encoded = self.codec.encode(body).map_err(RestError::Encode)?;
                header_map.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
                Some(encoded)
            }
            None => None,
        };

        Ok(HttpRequest {
            method,
            url,
            headers: header_map,
            body,
        })
    }

    /// Maps a response through `descriptor`. Any non-2xx status is a
    /// `Status` error carrying the body as text.
    pub fn parse_response<D: ResponseDescriptor>(
        &self,
        response: &HttpResponse,
        descriptor: &D,
    ) -> Result<D::Output, RestError> {
        if !response.is_success() {
            return Err(RestError::Status {
                status: response.status,
                body: String::from_utf8_lossy(&response.body).into_owned(),
            });
        }
        descriptor.decode(&self.codec, &response.body)
    }

    fn resolve_url(&self, url: &str) -> Result<Url, RestError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(RestError::invalid_request("URL must not be empty"));
        }
        if is_absolute(url) {
            return Url::parse(url)
                .map_err(|e| RestError::invalid_request(format!("invalid URL `{url}`: {e}")));
        }
        let base = self.base_url.as_ref().ok_or_else(|| {
            RestError::invalid_request(format!("relative URL `{url}` needs a base URL"))
        })?;
        // The base path always ends in `/`, so joining appends to it.
        base.join(url.trim_start_matches('/'))
            .map_err(|e| RestError::invalid_request(format!("invalid URL `{url}`: {e}")))
    }
}

fn is_absolute(url: &str) -> bool {
    let lower = url.get(..8).unwrap_or(url).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Step-by-step construction of a [`RestClient`].
#[derive(Debug, Clone)]
pub struct RestClientBuilder {
    policy: Option<SerializationPolicy>,
    codec: Option<Arc<JsonCodec>>,
    timeout: Duration,
    connect_timeout: Option<Duration>,
    base_url: Option<String>,
    worker_threads: usize,
}

impl Default for RestClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RestClientBuilder {
    pub fn new() -> Self {
        Self {
            policy: None,
            codec: None,
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: None,
            base_url: None,
            worker_threads: DEFAULT_WORKER_THREADS,
        }
    }

    /// Ignored when a codec is supplied with [`codec`](Self::codec).
    pub fn policy(mut self, policy: SerializationPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn codec(mut self, codec: Arc<JsonCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Response timeout applied to every call.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = Some(connect_timeout);
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads;
        self
    }

    pub fn build(self) -> Result<RestClient, RestError> {
        let base_url = self.base_url.as_deref().map(parse_base_url).transpose()?;
        let codec = match self.codec {
            Some(codec) => codec,
            None => Arc::new(JsonCodec::new(self.policy.unwrap_or_default())),
        };
        let transport = Transport::new(&TransportOptions {
            timeout: self.timeout,
            connect_timeout: self.connect_timeout,
            worker_threads: self.worker_threads,
        })?;

        debug!(
            naming = %codec.policy().naming(),
            unknown_fields = %codec.policy().unknown_fields(),
            date_format = %codec.policy().date_format(),
            timeout_ms = self.timeout.as_millis() as u64,
            base_url = ?base_url.as_ref().map(Url::as_str),
            "rest client ready"
        );

        Ok(RestClient {
            codec,
            transport,
            base_url,
        })
    }
}

fn parse_base_url(raw: &str) -> Result<Url, RestError> {
    let mut url = Url::parse(raw.trim())
        .map_err(|e| RestError::configuration(format!("invalid base URL `{raw}`: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(RestError::configuration(format!(
            "base URL must use http or https, got `{}`",
            url.scheme()
        )));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}
