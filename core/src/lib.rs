//! Blocking, typed JSON-over-HTTP client with a central serialization policy.
//!
//! # Overview
//! A `RestClient` is built once with a `SerializationPolicy` (field naming,
//! unknown-field handling, date format) and a response timeout, then shared
//! by every call site. Verb methods (`get`, `post`, `put`, `patch`,
//! `delete` and their list variants) look synchronous: each one encodes the
//! body with the client's codec, runs the exchange on an internal async
//! runtime, and blocks the calling thread until the response is decoded or
//! the timeout fires.
//!
//! # Design
//! - The policy and timeout are fixed at construction and only ever read, so
//!   calls from many threads need no locking.
//! - Callers say what a response decodes into with a descriptor value:
//!   `ResponseType<T>` for one value, `ListOf<T>` for a sequence.
//! - Request building and response parsing are plain functions over
//!   `HttpRequest`/`HttpResponse`, testable without a network.
//! - Every failure is returned to the caller. Nothing is retried.

pub mod client;
pub mod codec;
pub mod config;
pub mod date;
pub mod error;
pub mod http;
pub mod naming;
pub mod response;
pub mod transport;

pub use client::{RestClient, RestClientBuilder};
pub use codec::{JsonCodec, PolicyBuilder, SerializationPolicy, UnknownFields};
pub use config::ClientConfig;
pub use date::{CalendarDate, DateFormat};
pub use error::RestError;
pub use http::{HttpMethod, HttpRequest, HttpResponse, RequestHeaders};
pub use naming::NamingConvention;
pub use response::{list_of, single, Discard, ListOf, ResponseDescriptor, ResponseType};
pub use transport::CallState;
