//! Serialization policy and the JSON codec that applies it.
//!
//! # Design
//! `serde` fixes field names at compile time, so a runtime naming policy
//! cannot be expressed through derive attributes. Instead `JsonCodec` routes
//! every value through its own `Serializer` (value -> `serde_json::Value`) and
//! `Deserializer` (`serde_json::Value` -> value). Both see struct field names
//! as declared, which lets them:
//!
//! - rename struct fields (never map keys or enum variants) per
//!   [`NamingConvention`];
//! - reject wire keys that match no declared field when unknown fields are
//!   configured to fail;
//! - apply the [`DateFormat`] to [`crate::CalendarDate`] values.
//!
//! A `JsonCodec` is immutable once built and is shared between calls behind an
//! `Arc`.

use std::fmt;
use std::str::FromStr;

use serde::de::{
    self, value::StringDeserializer, DeserializeOwned, DeserializeSeed, Deserializer,
    EnumAccess, IntoDeserializer, MapAccess, SeqAccess, Unexpected, VariantAccess, Visitor,
};
use serde::ser::{self, Serialize, Serializer};
use serde::forward_to_deserialize_any;
use serde_json::{Map, Value};

use crate::date::{format_to_iso, iso_to_format, DateFormat, CALENDAR_DATE_TOKEN};
use crate::error::RestError;
use crate::naming::NamingConvention;

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// What decoding does with a JSON field that the target struct does not declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UnknownFields {
    /// Extra fields are skipped, so servers can grow their responses.
    #[default]
    Ignore,
    /// Extra fields fail the decode.
    Fail,
}

impl fmt::Display for UnknownFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnknownFields::Ignore => f.write_str("ignore"),
            UnknownFields::Fail => f.write_str("fail"),
        }
    }
}

impl FromStr for UnknownFields {
    type Err = RestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ignore" | "tolerant" | "IGNORE" => Ok(UnknownFields::Ignore),
            "fail" | "strict" | "FAIL" => Ok(UnknownFields::Fail),
            other => Err(RestError::configuration(format!(
                "unknown unknown-field policy `{other}`"
            ))),
        }
    }
}

/// Immutable encode/decode rules shared by every call of a client.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SerializationPolicy {
    naming: NamingConvention,
    unknown_fields: UnknownFields,
    date_format: DateFormat,
}

impl SerializationPolicy {
    pub fn builder() -> PolicyBuilder {
        PolicyBuilder::default()
    }

    pub fn naming(&self) -> NamingConvention {
        self.naming
    }

    pub fn unknown_fields(&self) -> UnknownFields {
        self.unknown_fields
    }

    pub fn date_format(&self) -> &DateFormat {
        &self.date_format
    }
}

/// Collects policy options; [`PolicyBuilder::build`] validates them.
#[derive(Debug, Clone, Default)]
pub struct PolicyBuilder {
    naming: NamingConvention,
    unknown_fields: UnknownFields,
    date_format: DateFormat,
}

impl PolicyBuilder {
    pub fn naming(mut self, naming: NamingConvention) -> Self {
        self.naming = naming;
        self
    }

    pub fn unknown_fields(mut self, unknown_fields: UnknownFields) -> Self {
        self.unknown_fields = unknown_fields;
        self
    }

    pub fn date_format(mut self, date_format: DateFormat) -> Self {
        self.date_format = date_format;
        self
    }

    pub fn build(self) -> Result<SerializationPolicy, RestError> {
        self.date_format.validate()?;
        Ok(SerializationPolicy {
            naming: self.naming,
            unknown_fields: self.unknown_fields,
            date_format: self.date_format,
        })
    }
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

/// JSON encoder/decoder bound to one [`SerializationPolicy`].
///
/// Encoding fails when two fields of one struct convert to the same wire
/// name.
///
/// Internally tagged (`#[serde(tag = "...")]`) and untagged enums are not
/// symmetric under a naming convention other than
/// [`NamingConvention::AsDeclared`]: their fields are renamed on encode, but
/// serde decodes them from its own buffered content, which never reaches this
/// codec's renaming. A value of such a type encoded with a renaming codec
/// cannot be decoded by it. Give those types explicit `#[serde(rename)]`
/// attributes instead.
#[derive(Debug, Clone, Default)]
pub struct JsonCodec {
    policy: SerializationPolicy,
}

impl JsonCodec {
    pub fn new(policy: SerializationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &SerializationPolicy {
        &self.policy
    }

    pub fn to_value<T: ?Sized + Serialize>(&self, value: &T) -> Result<Value, serde_json::Error> {
        value.serialize(PolicySerializer {
            policy: &self.policy,
        })
    }

    pub fn encode<T: ?Sized + Serialize>(&self, value: &T) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.to_value(value)?)
    }

    pub fn from_value<T: DeserializeOwned>(&self, value: Value) -> Result<T, serde_json::Error> {
        T::deserialize(PolicyValue {
            value,
            policy: &self.policy,
        })
    }

    /// Decodes a response body. An empty body reads as `null`.
    pub fn decode<T: DeserializeOwned>(&self, body: &[u8]) -> Result<T, serde_json::Error> {
        self.from_value(parse_body(body)?)
    }
}

pub(crate) fn parse_body(body: &[u8]) -> Result<Value, serde_json::Error> {
    if body.iter().all(u8::is_ascii_whitespace) {
        Ok(Value::Null)
    } else {
        serde_json::from_slice(body)
    }
}

fn ser_error(msg: impl fmt::Display) -> serde_json::Error {
    <serde_json::Error as ser::Error>::custom(msg)
}

fn de_error(msg: impl fmt::Display) -> serde_json::Error {
    <serde_json::Error as de::Error>::custom(msg)
}

fn invalid_type(value: &Value, expected: &dyn de::Expected) -> serde_json::Error {
    <serde_json::Error as de::Error>::invalid_type(unexpected(value), expected)
}

fn unexpected(value: &Value) -> Unexpected<'_> {
    match value {
        Value::Null => Unexpected::Unit,
        Value::Bool(b) => Unexpected::Bool(*b),
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                Unexpected::Unsigned(u)
            } else if let Some(i) = n.as_i64() {
                Unexpected::Signed(i)
            } else {
                Unexpected::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Value::String(s) => Unexpected::Str(s),
        Value::Array(_) => Unexpected::Seq,
        Value::Object(_) => Unexpected::Map,
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

#[derive(Clone, Copy)]
struct PolicySerializer<'p> {
    policy: &'p SerializationPolicy,
}

impl<'p> Serializer for PolicySerializer<'p> {
    type Ok = Value;
    type Error = serde_json::Error;

    type SerializeSeq = SeqSerializer<'p>;
    type SerializeTuple = SeqSerializer<'p>;
    type SerializeTupleStruct = SeqSerializer<'p>;
    type SerializeTupleVariant = TupleVariantSerializer<'p>;
    type SerializeMap = MapSerializer<'p>;
    type SerializeStruct = StructSerializer<'p>;
    type SerializeStructVariant = StructVariantSerializer<'p>;

    fn serialize_bool(self, v: bool) -> Result<Value, Self::Error> {
        Ok(Value::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> Result<Value, Self::Error> {
        Ok(Value::from(v))
    }

    fn serialize_i16(self, v: i16) -> Result<Value, Self::Error> {
        Ok(Value::from(v))
    }

    fn serialize_i32(self, v: i32) -> Result<Value, Self::Error> {
        Ok(Value::from(v))
    }

    fn serialize_i64(self, v: i64) -> Result<Value, Self::Error> {
        Ok(Value::from(v))
    }

    fn serialize_i128(self, v: i128) -> Result<Value, Self::Error> {
        serde_json::value::Serializer.serialize_i128(v)
    }

    fn serialize_u8(self, v: u8) -> Result<Value, Self::Error> {
        Ok(Value::from(v))
    }

    fn serialize_u16(self, v: u16) -> Result<Value, Self::Error> {
        Ok(Value::from(v))
    }

    fn serialize_u32(self, v: u32) -> Result<Value, Self::Error> {
        Ok(Value::from(v))
    }

    fn serialize_u64(self, v: u64) -> Result<Value, Self::Error> {
        Ok(Value::from(v))
    }

    fn serialize_u128(self, v: u128) -> Result<Value, Self::Error> {
        serde_json::value::Serializer.serialize_u128(v)
    }

    fn serialize_f32(self, v: f32) -> Result<Value, Self::Error> {
        serde_json::value::Serializer.serialize_f32(v)
    }

    fn serialize_f64(self, v: f64) -> Result<Value, Self::Error> {
        serde_json::value::Serializer.serialize_f64(v)
    }

    fn serialize_char(self, v: char) -> Result<Value, Self::Error> {
        Ok(Value::String(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<Value, Self::Error> {
        Ok(Value::String(v.to_owned()))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Value, Self::Error> {
        serde_json::value::Serializer.serialize_bytes(v)
    }

    fn serialize_none(self) -> Result<Value, Self::Error> {
        Ok(Value::Null)
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<Value, Self::Error> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Value, Self::Error> {
        Ok(Value::Null)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Value, Self::Error> {
        Ok(Value::Null)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<Value, Self::Error> {
        Ok(Value::String(variant.to_owned()))
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        name: &'static str,
        value: &T,
    ) -> Result<Value, Self::Error> {
        if name != CALENDAR_DATE_TOKEN {
            return value.serialize(self);
        }
        match serde_json::to_value(value)? {
            Value::String(iso) => iso_to_format(&iso, &self.policy.date_format)
                .map(Value::String)
                .map_err(ser_error),
            _ => Err(ser_error("calendar date did not serialize as a string")),
        }
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Value, Self::Error> {
        let mut object = Map::new();
        object.insert(variant.to_owned(), value.serialize(self)?);
        Ok(Value::Object(object))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<Self::SerializeSeq, Self::Error> {
        Ok(SeqSerializer {
            policy: self.policy,
            items: Vec::with_capacity(len.unwrap_or(0)),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<Self::SerializeTuple, Self::Error> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleStruct, Self::Error> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleVariant, Self::Error> {
        Ok(TupleVariantSerializer {
            variant,
            items: SeqSerializer {
                policy: self.policy,
                items: Vec::with_capacity(len),
            },
        })
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, Self::Error> {
        Ok(MapSerializer {
            policy: self.policy,
            object: Map::new(),
            next_key: None,
        })
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStruct, Self::Error> {
        Ok(StructSerializer {
            policy: self.policy,
            object: Map::new(),
        })
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, Self::Error> {
        Ok(StructVariantSerializer {
            variant,
            fields: StructSerializer {
                policy: self.policy,
                object: Map::new(),
            },
        })
    }
}

struct SeqSerializer<'p> {
    policy: &'p SerializationPolicy,
    items: Vec<Value>,
}

impl SeqSerializer<'_> {
    fn push<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), serde_json::Error> {
        let item = value.serialize(PolicySerializer {
            policy: self.policy,
        })?;
        self.items.push(item);
        Ok(())
    }
}

impl ser::SerializeSeq for SeqSerializer<'_> {
    type Ok = Value;
    type Error = serde_json::Error;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Self::Error> {
        self.push(value)
    }

    fn end(self) -> Result<Value, Self::Error> {
        Ok(Value::Array(self.items))
    }
}

impl ser::SerializeTuple for SeqSerializer<'_> {
    type Ok = Value;
    type Error = serde_json::Error;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Self::Error> {
        self.push(value)
    }

    fn end(self) -> Result<Value, Self::Error> {
        Ok(Value::Array(self.items))
    }
}

impl ser::SerializeTupleStruct for SeqSerializer<'_> {
    type Ok = Value;
    type Error = serde_json::Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Self::Error> {
        self.push(value)
    }

    fn end(self) -> Result<Value, Self::Error> {
        Ok(Value::Array(self.items))
    }
}

struct TupleVariantSerializer<'p> {
    variant: &'static str,
    items: SeqSerializer<'p>,
}

impl ser::SerializeTupleVariant for TupleVariantSerializer<'_> {
    type Ok = Value;
    type Error = serde_json::Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Self::Error> {
        self.items.push(value)
    }

    fn end(self) -> Result<Value, Self::Error> {
        let mut object = Map::new();
        object.insert(self.variant.to_owned(), Value::Array(self.items.items));
        Ok(Value::Object(object))
    }
}

struct MapSerializer<'p> {
    policy: &'p SerializationPolicy,
    object: Map<String, Value>,
    next_key: Option<String>,
}

impl ser::SerializeMap for MapSerializer<'_> {
    type Ok = Value;
    type Error = serde_json::Error;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<(), Self::Error> {
        // Map keys keep their own spelling; naming only applies to struct fields.
        let key = match serde_json::to_value(key)? {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => return Err(ser_error("map key must be a string, number or bool")),
        };
        self.next_key = Some(key);
        Ok(())
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Self::Error> {
        let key = self
            .next_key
            .take()
            .ok_or_else(|| ser_error("map value serialized before its key"))?;
        let value = value.serialize(PolicySerializer {
            policy: self.policy,
        })?;
        self.object.insert(key, value);
        Ok(())
    }

    fn end(self) -> Result<Value, Self::Error> {
        Ok(Value::Object(self.object))
    }
}

struct StructSerializer<'p> {
    policy: &'p SerializationPolicy,
    object: Map<String, Value>,
}

impl ser::SerializeStruct for StructSerializer<'_> {
    type Ok = Value;
    type Error = serde_json::Error;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), Self::Error> {
        let value = value.serialize(PolicySerializer {
            policy: self.policy,
        })?;
        let wire = self.policy.naming.apply(key);
        if self.object.contains_key(&wire) {
            return Err(ser_error(format!(
                "fields collide on wire name `{wire}` (second field `{key}`)"
            )));
        }
        self.object.insert(wire, value);
        Ok(())
    }

    fn end(self) -> Result<Value, Self::Error> {
        Ok(Value::Object(self.object))
    }
}

struct StructVariantSerializer<'p> {
    variant: &'static str,
    fields: StructSerializer<'p>,
}

impl ser::SerializeStructVariant for StructVariantSerializer<'_> {
    type Ok = Value;
    type Error = serde_json::Error;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), Self::Error> {
        ser::SerializeStruct::serialize_field(&mut self.fields, key, value)
    }

    fn end(self) -> Result<Value, Self::Error> {
        let mut object = Map::new();
        object.insert(self.variant.to_owned(), Value::Object(self.fields.object));
        Ok(Value::Object(object))
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

struct PolicyValue<'p> {
    value: Value,
    policy: &'p SerializationPolicy,
}

impl<'p> PolicyValue<'p> {
    fn visit_array<'de, V: Visitor<'de>>(
        items: Vec<Value>,
        policy: &'p SerializationPolicy,
        visitor: V,
    ) -> Result<V::Value, serde_json::Error> {
        let len = items.len();
        let mut seq = PolicySeq {
            items: items.into_iter(),
            policy,
        };
        let out = visitor.visit_seq(&mut seq)?;
        if seq.items.len() == 0 {
            Ok(out)
        } else {
            Err(de::Error::invalid_length(len, &"fewer elements in array"))
        }
    }

    /// Maps wire keys onto the declared `fields` of a struct.
    fn struct_entries(
        map: Map<String, Value>,
        fields: &'static [&'static str],
        policy: &SerializationPolicy,
    ) -> Result<Vec<(String, Value)>, serde_json::Error> {
        if policy.naming == NamingConvention::AsDeclared
            && policy.unknown_fields == UnknownFields::Ignore
        {
            return Ok(map.into_iter().collect());
        }
        let mut entries = Vec::with_capacity(map.len());
        for (key, value) in map {
            // A declared name wins over another field's converted name.
            let field = fields.iter().copied().find(|f| *f == key).or_else(|| {
                fields
                    .iter()
                    .copied()
                    .find(|f| policy.naming.matches(f, &key))
            });
            match field {
                Some(field) => entries.push((field.to_owned(), value)),
                None if policy.unknown_fields == UnknownFields::Fail => {
                    return Err(de::Error::unknown_field(&key, fields));
                }
                // The derived visitor skips it.
                None => entries.push((key, value)),
            }
        }
        Ok(entries)
    }
}

impl<'de, 'p> Deserializer<'de> for PolicyValue<'p> {
    type Error = serde_json::Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.value {
            Value::Null => visitor.visit_unit(),
            Value::Bool(b) => visitor.visit_bool(b),
            Value::Number(n) => {
                if let Some(u) = n.as_u64() {
                    visitor.visit_u64(u)
                } else if let Some(i) = n.as_i64() {
                    visitor.visit_i64(i)
                } else if let Some(f) = n.as_f64() {
                    visitor.visit_f64(f)
                } else {
                    Err(de_error(format!("unrepresentable number {n}")))
                }
            }
            Value::String(s) => visitor.visit_string(s),
            Value::Array(items) => Self::visit_array(items, self.policy, visitor),
            Value::Object(map) => visitor.visit_map(PolicyMap::new(map.into_iter().collect(), self.policy)),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match self.value {
            Value::Null => visitor.visit_none(),
            _ => visitor.visit_some(self),
        }
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        if name != CALENDAR_DATE_TOKEN {
            return visitor.visit_newtype_struct(self);
        }
        match self.value {
            Value::String(text) => {
                let iso = format_to_iso(&text, &self.policy.date_format).map_err(de_error)?;
                visitor.visit_string(iso)
            }
            other => Err(invalid_type(&other, &visitor)),
        }
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        match self.value {
            Value::Object(map) => {
                let entries = Self::struct_entries(map, fields, self.policy)?;
                visitor.visit_map(PolicyMap::new(entries, self.policy))
            }
            Value::Array(items) => Self::visit_array(items, self.policy, visitor),
            other => Err(invalid_type(&other, &visitor)),
        }
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        match self.value {
            Value::String(variant) => {
                let variant: StringDeserializer<serde_json::Error> = variant.into_deserializer();
                visitor.visit_enum(variant)
            }
            Value::Object(map) if map.len() == 1 => {
                let mut entries = map.into_iter();
                match entries.next() {
                    Some((variant, content)) => visitor.visit_enum(PolicyEnum {
                        variant,
                        content,
                        policy: self.policy,
                    }),
                    None => Err(de_error("empty enum object")),
                }
            }
            Value::Object(_) => Err(de::Error::invalid_value(
                Unexpected::Map,
                &"map with a single key",
            )),
            other => Err(invalid_type(&other, &"string or map")),
        }
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        drop(self);
        visitor.visit_unit()
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf unit unit_struct seq tuple tuple_struct map identifier
    }
}

struct PolicySeq<'p> {
    items: std::vec::IntoIter<Value>,
    policy: &'p SerializationPolicy,
}

impl<'de> SeqAccess<'de> for PolicySeq<'_> {
    type Error = serde_json::Error;

    fn next_element_seed<T: DeserializeSeed<'de>>(
        &mut self,
        seed: T,
    ) -> Result<Option<T::Value>, Self::Error> {
        match self.items.next() {
            Some(value) => seed
                .deserialize(PolicyValue {
                    value,
                    policy: self.policy,
                })
                .map(Some),
            None => Ok(None),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.items.len())
    }
}

struct PolicyMap<'p> {
    entries: std::vec::IntoIter<(String, Value)>,
    pending: Option<Value>,
    policy: &'p SerializationPolicy,
}

impl<'p> PolicyMap<'p> {
    fn new(entries: Vec<(String, Value)>, policy: &'p SerializationPolicy) -> Self {
        Self {
            entries: entries.into_iter(),
            pending: None,
            policy,
        }
    }
}

impl<'de> MapAccess<'de> for PolicyMap<'_> {
    type Error = serde_json::Error;

    fn next_key_seed<K: DeserializeSeed<'de>>(
        &mut self,
        seed: K,
    ) -> Result<Option<K::Value>, Self::Error> {
        match self.entries.next() {
            Some((key, value)) => {
                self.pending = Some(value);
                seed.deserialize(MapKey(key)).map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value, Self::Error> {
        let value = self
            .pending
            .take()
            .ok_or_else(|| de_error("map value requested before its key"))?;
        seed.deserialize(PolicyValue {
            value,
            policy: self.policy,
        })
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.entries.len())
    }
}

/// JSON object key; parses into numeric or bool keys on request.
struct MapKey(String);

macro_rules! deserialize_parsed_key {
    ($($method:ident => $visit:ident,)*) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
                match self.0.parse() {
                    Ok(parsed) => visitor.$visit(parsed),
                    Err(_) => visitor.visit_string(self.0),
                }
            }
        )*
    };
}

impl<'de> Deserializer<'de> for MapKey {
    type Error = serde_json::Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_string(self.0)
    }

    deserialize_parsed_key! {
        deserialize_bool => visit_bool,
        deserialize_i8 => visit_i8,
        deserialize_i16 => visit_i16,
        deserialize_i32 => visit_i32,
        deserialize_i64 => visit_i64,
        deserialize_u8 => visit_u8,
        deserialize_u16 => visit_u16,
        deserialize_u32 => visit_u32,
        deserialize_u64 => visit_u64,
        deserialize_f32 => visit_f32,
        deserialize_f64 => visit_f64,
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_some(self)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        let variant: StringDeserializer<serde_json::Error> = self.0.into_deserializer();
        visitor.visit_enum(variant)
    }

    forward_to_deserialize_any! {
        i128 u128 char str string bytes byte_buf unit unit_struct seq tuple
        tuple_struct map struct identifier ignored_any
    }
}

struct PolicyEnum<'p> {
    variant: String,
    content: Value,
    policy: &'p SerializationPolicy,
}

impl<'de, 'p> EnumAccess<'de> for PolicyEnum<'p> {
    type Error = serde_json::Error;
    type Variant = PolicyValue<'p>;

    fn variant_seed<V: DeserializeSeed<'de>>(
        self,
        seed: V,
    ) -> Result<(V::Value, Self::Variant), Self::Error> {
        let variant: StringDeserializer<serde_json::Error> = self.variant.into_deserializer();
        let tag = seed.deserialize(variant)?;
        Ok((
            tag,
            PolicyValue {
                value: self.content,
                policy: self.policy,
            },
        ))
    }
}

impl<'de> VariantAccess<'de> for PolicyValue<'_> {
    type Error = serde_json::Error;

    fn unit_variant(self) -> Result<(), Self::Error> {
        match self.value {
            Value::Null => Ok(()),
            other => Err(invalid_type(&other, &"unit variant")),
        }
    }

    fn newtype_variant_seed<T: DeserializeSeed<'de>>(self, seed: T) -> Result<T::Value, Self::Error> {
        seed.deserialize(self)
    }

    fn tuple_variant<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_seq(visitor)
    }

    fn struct_variant<V: Visitor<'de>>(
        self,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.deserialize_struct("", fields, visitor)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Serialize};
    use serde_json::json;

    use super::*;
    use crate::date::CalendarDate;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Order {
        order_id: u64,
        customer_name: String,
        placed_on: CalendarDate,
        delivery_note: Option<String>,
        line_items: Vec<LineItem>,
        status: OrderStatus,
        attributes: BTreeMap<String, String>,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct LineItem {
        sku_code: String,
        unit_count: u32,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    enum OrderStatus {
        Open,
        Shipped { carrier_name: String, shipped_on: CalendarDate },
        Cancelled(String),
    }

    fn order() -> Order {
        Order {
            order_id: 7,
            customer_name: "Ada".to_string(),
            placed_on: CalendarDate::from_ymd(2024, 2, 29).unwrap(),
            delivery_note: None,
            line_items: vec![
                LineItem {
                    sku_code: "A-1".to_string(),
                    unit_count: 2,
                },
                LineItem {
                    sku_code: "B-2".to_string(),
                    unit_count: 1,
                },
            ],
            status: OrderStatus::Shipped {
                carrier_name: "Post".to_string(),
                shipped_on: CalendarDate::from_ymd(2024, 3, 1).unwrap(),
            },
            attributes: BTreeMap::from([("gift_wrap".to_string(), "yes".to_string())]),
        }
    }

    fn codec(
        naming: NamingConvention,
        unknown_fields: UnknownFields,
        date_format: DateFormat,
    ) -> JsonCodec {
        JsonCodec::new(
            SerializationPolicy::builder()
                .naming(naming)
                .unknown_fields(unknown_fields)
                .date_format(date_format)
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn every_policy_round_trips_a_representative_value() {
        let namings = [
            NamingConvention::AsDeclared,
            NamingConvention::SnakeCase,
            NamingConvention::CamelCase,
            NamingConvention::PascalCase,
            NamingConvention::KebabCase,
            NamingConvention::ScreamingSnakeCase,
            NamingConvention::LowerCase,
            NamingConvention::LowerDotCase,
        ];
        let dates = [
            DateFormat::Iso8601,
            DateFormat::custom("%d/%m/%Y").unwrap(),
            DateFormat::custom("%b %d, %Y").unwrap(),
        ];
        for naming in namings {
            for unknown in [UnknownFields::Ignore, UnknownFields::Fail] {
                for date in &dates {
                    let codec = codec(naming, unknown, date.clone());
                    let bytes = codec.encode(&order()).unwrap();
                    let back: Order = codec.decode(&bytes).unwrap();
                    assert_eq!(back, order(), "{naming} / {unknown} / {date}");
                }
            }
        }
    }

    #[test]
    fn camel_case_renames_struct_fields_only() {
        let codec = codec(
            NamingConvention::CamelCase,
            UnknownFields::Ignore,
            DateFormat::Iso8601,
        );
        let value = codec.to_value(&order()).unwrap();

        assert_eq!(value["orderId"], 7);
        assert_eq!(value["customerName"], "Ada");
        assert_eq!(value["placedOn"], "2024-02-29");
        assert_eq!(value["deliveryNote"], Value::Null);
        assert_eq!(value["lineItems"][1]["skuCode"], "B-2");
        // Variant names stay as declared, their fields are renamed.
        assert_eq!(value["status"]["Shipped"]["carrierName"], "Post");
        // Map keys are data, not field names.
        assert_eq!(value["attributes"]["gift_wrap"], "yes");
        assert!(value.get("order_id").is_none());
    }

    #[test]
    fn snake_case_reads_snake_wire_keys_into_renamed_fields() {
        #[derive(Debug, Deserialize)]
        struct Legacy {
            #[serde(rename = "widgetId")]
            widget_id: u64,
        }
        let codec = codec(
            NamingConvention::SnakeCase,
            UnknownFields::Ignore,
            DateFormat::Iso8601,
        );
        let legacy: Legacy = codec.from_value(json!({"widget_id": 3})).unwrap();
        assert_eq!(legacy.widget_id, 3);
    }

    #[test]
    fn custom_date_format_applies_both_ways() {
        let codec = codec(
            NamingConvention::AsDeclared,
            UnknownFields::Ignore,
            DateFormat::custom("%d/%m/%Y").unwrap(),
        );
        let value = codec.to_value(&order()).unwrap();
        assert_eq!(value["placed_on"], "29/02/2024");
        assert_eq!(value["status"]["Shipped"]["shipped_on"], "01/03/2024");

        let mut wire = value;
        wire["placed_on"] = json!("2024-02-29");
        let err = codec.from_value::<Order>(wire).unwrap_err();
        assert!(err.to_string().contains("expected format `%d/%m/%Y`"), "{err}");
    }

    #[test]
    fn extra_field_is_ignored_by_default() {
        let codec = JsonCodec::default();
        let plain = json!({"sku_code": "A-1", "unit_count": 2});
        let extended = json!({"sku_code": "A-1", "unit_count": 2, "warehouse": "north"});

        let from_plain: LineItem = codec.from_value(plain).unwrap();
        let from_extended: LineItem = codec.from_value(extended).unwrap();
        assert_eq!(from_plain, from_extended);
    }

    #[test]
    fn extra_field_fails_when_configured() {
        let codec = codec(
            NamingConvention::AsDeclared,
            UnknownFields::Fail,
            DateFormat::Iso8601,
        );
        let err = codec
            .from_value::<LineItem>(json!({"sku_code": "A-1", "unit_count": 2, "warehouse": "north"}))
            .unwrap_err();
        assert!(err.to_string().contains("unknown field `warehouse`"), "{err}");
    }

    #[test]
    fn unknown_field_check_reaches_nested_structs() {
        let codec = codec(
            NamingConvention::CamelCase,
            UnknownFields::Fail,
            DateFormat::Iso8601,
        );
        let mut wire = codec.to_value(&order()).unwrap();
        wire["lineItems"][0]["binNumber"] = json!(12);
        let err = codec.from_value::<Order>(wire).unwrap_err();
        assert!(err.to_string().contains("binNumber"), "{err}");
    }

    #[test]
    fn missing_required_field_is_an_error_even_when_tolerant() {
        let codec = JsonCodec::default();
        let err = codec
            .from_value::<LineItem>(json!({"sku_code": "A-1"}))
            .unwrap_err();
        assert!(err.to_string().contains("unit_count"), "{err}");
    }

    #[test]
    fn enum_forms_decode() {
        let codec = JsonCodec::default();
        assert_eq!(
            codec.from_value::<OrderStatus>(json!("Open")).unwrap(),
            OrderStatus::Open
        );
        assert_eq!(
            codec.from_value::<OrderStatus>(json!({"Cancelled": "duplicate"})).unwrap(),
            OrderStatus::Cancelled("duplicate".to_string())
        );
        assert!(codec
            .from_value::<OrderStatus>(json!({"Open": null, "Cancelled": "x"}))
            .is_err());
    }

    #[test]
    fn numeric_map_keys_decode() {
        let codec = JsonCodec::default();
        let counts: BTreeMap<u32, String> = codec.from_value(json!({"1": "one", "2": "two"})).unwrap();
        assert_eq!(counts.get(&2).map(String::as_str), Some("two"));
    }

    #[test]
    fn empty_body_decodes_as_null() {
        let codec = JsonCodec::default();
        let none: Option<LineItem> = codec.decode(b"").unwrap();
        assert!(none.is_none());
        codec.decode::<()>(b"  \n").unwrap();
        assert!(codec.decode::<LineItem>(b"").is_err());
    }

    #[test]
    fn untyped_values_keep_wire_keys() {
        let codec = codec(
            NamingConvention::CamelCase,
            UnknownFields::Fail,
            DateFormat::Iso8601,
        );
        let value: Value = codec.decode(br#"{"widget_id": 1, "Other-Key": [true]}"#).unwrap();
        assert_eq!(value, json!({"widget_id": 1, "Other-Key": [true]}));
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Pair {
        ab_c: u32,
        a_bc: u32,
    }

    #[test]
    fn colliding_wire_names_fail_to_encode() {
        let lower = codec(
            NamingConvention::LowerCase,
            UnknownFields::Ignore,
            DateFormat::Iso8601,
        );
        let err = lower.encode(&Pair { ab_c: 1, a_bc: 2 }).unwrap_err();
        assert!(err.to_string().contains("collide on wire name `abc`"), "{err}");

        let snake = codec(
            NamingConvention::SnakeCase,
            UnknownFields::Ignore,
            DateFormat::Iso8601,
        );
        assert_eq!(
            snake.to_value(&Pair { ab_c: 1, a_bc: 2 }).unwrap(),
            json!({"ab_c": 1, "a_bc": 2})
        );
    }

    #[derive(Debug, Deserialize)]
    #[allow(non_snake_case)]
    struct Shadowed {
        widgetId: u32,
        widget_id: u32,
    }

    #[test]
    fn declared_name_wins_over_converted_name() {
        let codec = codec(
            NamingConvention::CamelCase,
            UnknownFields::Fail,
            DateFormat::Iso8601,
        );
        let decoded: Shadowed = codec
            .from_value(json!({"widgetId": 1, "widget_id": 2}))
            .unwrap();
        assert_eq!((decoded.widgetId, decoded.widget_id), (1, 2));
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(tag = "kind")]
    enum WidgetEvent {
        Created { widget_id: u32, display_name: String },
    }

    #[test]
    fn internally_tagged_fields_are_renamed_on_encode_only() {
        let codec = codec(
            NamingConvention::CamelCase,
            UnknownFields::Ignore,
            DateFormat::Iso8601,
        );
        let event = WidgetEvent::Created {
            widget_id: 1,
            display_name: "gear".to_string(),
        };
        let wire = codec.to_value(&event).unwrap();
        assert_eq!(
            wire,
            json!({"kind": "Created", "widgetId": 1, "displayName": "gear"})
        );
        let err = codec.from_value::<WidgetEvent>(wire).unwrap_err();
        assert!(err.to_string().contains("missing field `widget_id`"), "{err}");
    }

    #[test]
    fn policy_builder_rejects_bad_date_pattern() {
        let err = SerializationPolicy::builder()
            .date_format(DateFormat::Pattern("%Y".to_string()))
            .build()
            .unwrap_err();
        assert!(matches!(err, RestError::Configuration { .. }));
    }

    #[test]
    fn unknown_fields_from_str() {
        assert_eq!("tolerant".parse::<UnknownFields>().unwrap(), UnknownFields::Ignore);
        assert_eq!("fail".parse::<UnknownFields>().unwrap(), UnknownFields::Fail);
        assert!("maybe".parse::<UnknownFields>().is_err());
    }
}
