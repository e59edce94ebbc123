//! Response-type descriptors.
//!
//! A descriptor tells a verb method what to decode the response body into.
//! `ResponseType<T>` names a single value; `ListOf<T>` names a sequence and
//! its element type separately, so the list is checked and decoded element
//! by element rather than guessed from the payload. `Discard` drops the body.

use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::codec::{parse_body, JsonCodec};
use crate::error::RestError;

/// Decodes a response body into `Output`.
pub trait ResponseDescriptor {
    type Output;

    /// Human-readable name of the expected shape, used in errors and logs.
    fn describe(&self) -> String;

    fn decode(&self, codec: &JsonCodec, body: &[u8]) -> Result<Self::Output, RestError>;
}

/// A single decoded `T`.
pub struct ResponseType<T>(PhantomData<fn() -> T>);

impl<T> ResponseType<T> {
    pub const fn new() -> Self {
        ResponseType(PhantomData)
    }
}

/// Shorthand for `ResponseType::<T>::new()`.
pub const fn single<T>() -> ResponseType<T> {
    ResponseType::new()
}

impl<T> Default for ResponseType<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for ResponseType<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ResponseType<T> {}

impl<T> fmt::Debug for ResponseType<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResponseType<{}>", type_name::<T>())
    }
}

impl<T: DeserializeOwned> ResponseDescriptor for ResponseType<T> {
    type Output = T;

    fn describe(&self) -> String {
        type_name::<T>().to_string()
    }

    fn decode(&self, codec: &JsonCodec, body: &[u8]) -> Result<T, RestError> {
        codec.decode(body).map_err(|source| RestError::Decode {
            expected: self.describe(),
            source,
        })
    }
}

/// An ordered sequence of decoded `T`.
pub struct ListOf<T>(PhantomData<fn() -> T>);

impl<T> ListOf<T> {
    pub const fn new() -> Self {
        ListOf(PhantomData)
    }
}

/// Shorthand for `ListOf::<T>::new()`.
pub const fn list_of<T>() -> ListOf<T> {
    ListOf::new()
}

impl<T> Default for ListOf<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for ListOf<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ListOf<T> {}

impl<T> fmt::Debug for ListOf<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ListOf<{}>", type_name::<T>())
    }
}

impl<T: DeserializeOwned> ResponseDescriptor for ListOf<T> {
    type Output = Vec<T>;

    fn describe(&self) -> String {
        format!("list of {}", type_name::<T>())
    }

    fn decode(&self, codec: &JsonCodec, body: &[u8]) -> Result<Vec<T>, RestError> {
        let decode_error = |source| RestError::Decode {
            expected: self.describe(),
            source,
        };
        let items = match parse_body(body).map_err(decode_error)? {
            Value::Array(items) => items,
            other => {
                return Err(decode_error(<serde_json::Error as serde::de::Error>::custom(
                    format!("expected a JSON array, found {}", json_kind(&other)),
                )))
            }
        };
        items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                codec.from_value(item).map_err(|e| {
                    decode_error(<serde_json::Error as serde::de::Error>::custom(format!(
                        "element {index}: {e}"
                    )))
                })
            })
            .collect()
    }
}

/// Ignores the response body.
#[derive(Debug, Clone, Copy, Default)]
pub struct Discard;

impl ResponseDescriptor for Discard {
    type Output = ();

    fn describe(&self) -> String {
        "nothing".to_string()
    }

    fn decode(&self, _codec: &JsonCodec, _body: &[u8]) -> Result<(), RestError> {
        Ok(())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
