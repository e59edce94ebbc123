//! HTTP request and response described as plain data.
//!
//! # Design
//! `RestClient::build_request` produces an `HttpRequest`, the transport turns
//! it into an `HttpResponse`, and `RestClient::parse_response` decodes that.
//! Keeping both halves as data means request binding and response decoding
//! can be tested without a network.

use std::collections::HashMap;
use std::fmt;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Url;

use crate::error::RestError;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    pub(crate) fn to_reqwest(self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extra headers for one call.
///
/// Names are case-insensitive and unique: inserting a name that is already
/// present replaces its value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestHeaders(HeaderMap);

impl RequestHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds headers from name/value pairs; later duplicates win.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, RestError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut headers = Self::new();
        for (name, value) in pairs {
            headers.insert(name.as_ref(), value.as_ref())?;
        }
        Ok(headers)
    }

    pub fn insert(&mut self, name: &str, value: &str) -> Result<&mut Self, RestError> {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| RestError::invalid_request(format!("invalid header name `{name}`")))?;
        let header_value = HeaderValue::from_str(value).map_err(|_| {
            RestError::invalid_request(format!("invalid value for header `{name}`"))
        })?;
        self.0.insert(header_name, header_value);
        Ok(self)
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, name: &str, value: &str) -> Result<Self, RestError> {
        self.insert(name, value)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_header_map(&self) -> &HeaderMap {
        &self.0
    }
}

impl TryFrom<&HashMap<String, String>> for RequestHeaders {
    type Error = RestError;

    fn try_from(map: &HashMap<String, String>) -> Result<Self, Self::Error> {
        Self::from_pairs(map)
    }
}

/// One outgoing call: method, resolved URL, headers and encoded body.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

/// A fully read response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
