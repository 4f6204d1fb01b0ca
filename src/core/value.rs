//! Tagged-union values carried by properties and record maps
//!
//! Every record that flows between the data source, the property collection
//! and the controller is a [`PropertyValues`] map of [`PropertyName`] to
//! [`Value`]. Consumers match on the variants instead of casting.

use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use indexmap::IndexMap;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::ser::{Error as _, SerializeMap, SerializeSeq};
use serde::{Deserialize, Serialize, Serializer};

use crate::core::error::{ModelError, Result};

/// Canonical text form used when timestamps are persisted
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Canonical text form used when dates are persisted
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Name of a property, unique within its scope
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyName(String);

impl PropertyName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PropertyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for PropertyName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PropertyName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for PropertyName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl From<&PropertyName> for PropertyName {
    fn from(name: &PropertyName) -> Self {
        name.clone()
    }
}

/// A record: property name to value, in insertion order
pub type PropertyValues = IndexMap<PropertyName, Value>;

/// Key half of a lookup pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LookupKey {
    Integer(i64),
    Text(String),
}

impl LookupKey {
    /// The key as a plain scalar value (what gets persisted)
    pub fn to_value(&self) -> Value {
        match self {
            LookupKey::Integer(id) => Value::Integer(*id),
            LookupKey::Text(key) => Value::Text(key.clone()),
        }
    }
}

impl fmt::Display for LookupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupKey::Integer(id) => write!(f, "{}", id),
            LookupKey::Text(key) => f.write_str(key),
        }
    }
}

/// A lookup pair: the stored key and the label shown to the user
///
/// Two pairs are equal when their keys are; the label is not compared.
#[derive(Debug, Clone)]
pub struct LookupValue {
    pub key: LookupKey,
    pub display: String,
}

impl PartialEq for LookupValue {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for LookupValue {}

impl Hash for LookupValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl LookupValue {
    pub fn new(key: LookupKey, display: impl Into<String>) -> Self {
        Self {
            key,
            display: display.into(),
        }
    }

    pub fn of_id(id: i64, display: impl Into<String>) -> Self {
        Self::new(LookupKey::Integer(id), display)
    }
}

type RowsLoader = Box<dyn Fn() -> Result<Vec<PropertyValues>> + Send + Sync>;

struct RowSetInner {
    rows: OnceLock<Vec<PropertyValues>>,
    loader: Option<RowsLoader>,
}

/// Nested collection of rows, either materialized or loaded on first access
///
/// The loader runs at most once; its result is kept for the lifetime of the
/// set. Clones share the same rows.
#[derive(Clone)]
pub struct RowSet(Arc<RowSetInner>);

impl RowSet {
    /// A row set whose rows are already known
    pub fn loaded(rows: Vec<PropertyValues>) -> Self {
        Self(Arc::new(RowSetInner {
            rows: OnceLock::from(rows),
            loader: None,
        }))
    }

    /// A row set that runs `loader` the first time its rows are observed
    pub fn deferred<F>(loader: F) -> Self
    where
        F: Fn() -> Result<Vec<PropertyValues>> + Send + Sync + 'static,
    {
        Self(Arc::new(RowSetInner {
            rows: OnceLock::new(),
            loader: Some(Box::new(loader)),
        }))
    }

    pub fn is_loaded(&self) -> bool {
        self.0.rows.get().is_some()
    }

    /// Get the rows, running the loader if needed
    pub fn rows(&self) -> Result<&[PropertyValues]> {
        if let Some(rows) = self.0.rows.get() {
            return Ok(rows);
        }
        let loaded = match &self.0.loader {
            Some(loader) => loader()?,
            None => Vec::new(),
        };
        Ok(self.0.rows.get_or_init(|| loaded))
    }

    pub fn ptr_eq(&self, other: &RowSet) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for RowSet {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        match (self.0.rows.get(), other.0.rows.get()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for RowSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.rows.get() {
            Some(rows) => f.debug_tuple("RowSet").field(rows).finish(),
            None => f.write_str("RowSet(<deferred>)"),
        }
    }
}

/// A dynamically typed property value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Integer(i64),
    Decimal(Decimal),
    Text(String),
    Boolean(bool),
    Timestamp(NaiveDateTime),
    Bytes(Vec<u8>),
    Lookup(LookupValue),
    Rows(RowSet),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn decimal(s: &str) -> Result<Self> {
        Decimal::from_str(s.trim())
            .map(Value::Decimal)
            .map_err(|e| ModelError::InvalidSchema(format!("invalid decimal '{}': {}", s, e)))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Decimal(d) if d.fract().is_zero() => d.to_i64(),
            Value::Lookup(LookupValue {
                key: LookupKey::Integer(id),
                ..
            }) => Some(*id),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Integer(i) => Some(Decimal::from(*i)),
            Value::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_rows(&self) -> Option<&RowSet> {
        match self {
            Value::Rows(rows) => Some(rows),
            _ => None,
        }
    }

    /// Lookups are reduced to their key; everything else is returned as is
    pub fn unwrap_lookup(self) -> Value {
        match self {
            Value::Lookup(lookup) => lookup.key.to_value(),
            other => other,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Decimal(d) => write!(f, "{}", d.normalize()),
            Value::Text(s) => f.write_str(s),
            Value::Boolean(b) => f.write_str(if *b { "Y" } else { "N" }),
            Value::Timestamp(ts) => write!(f, "{}", ts.format(TIMESTAMP_FORMAT)),
            Value::Bytes(bytes) => write!(f, "<{} bytes>", bytes.len()),
            Value::Lookup(lookup) => f.write_str(&lookup.display),
            Value::Rows(rows) => match rows.0.rows.get() {
                Some(rows) => write!(f, "<{} rows>", rows.len()),
                None => f.write_str("<rows>"),
            },
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v)
    }
}

impl From<LookupValue> for Value {
    fn from(v: LookupValue) -> Self {
        Value::Lookup(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Decimal(d) => serializer.serialize_str(&d.normalize().to_string()),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Boolean(b) => serializer.serialize_bool(*b),
            Value::Timestamp(ts) => {
                serializer.serialize_str(&ts.format(TIMESTAMP_FORMAT).to_string())
            }
            Value::Bytes(bytes) => {
                let mut seq = serializer.serialize_seq(Some(bytes.len()))?;
                for b in bytes {
                    seq.serialize_element(b)?;
                }
                seq.end()
            }
            Value::Lookup(lookup) => {
                let mut map = serializer.serialize_map(Some(2))?;
                match &lookup.key {
                    LookupKey::Integer(id) => map.serialize_entry("key", id)?,
                    LookupKey::Text(key) => map.serialize_entry("key", key)?,
                }
                map.serialize_entry("display", &lookup.display)?;
                map.end()
            }
            Value::Rows(rows) => {
                let rows = rows.rows().map_err(S::Error::custom)?;
                let mut seq = serializer.serialize_seq(Some(rows.len()))?;
                for row in rows {
                    seq.serialize_element(row)?;
                }
                seq.end()
            }
        }
    }
}

/// Semantic type of a scalar property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Integer,
    Identifier,
    Decimal,
    Text,
    LongText,
    Binary,
    YesNo,
    Date,
    Timestamp,
    Lookup,
    TextLookup,
}

impl ValueType {
    /// Lookups whose key is numeric
    pub fn is_numeric_lookup(&self) -> bool {
        matches!(self, ValueType::Lookup)
    }

    pub fn is_lookup(&self) -> bool {
        matches!(self, ValueType::Lookup | ValueType::TextLookup)
    }

    /// Coerce an incoming value to this type
    ///
    /// Text is parsed, integers widen to decimals, dates drop their time part
    /// and bare keys become lookup pairs labelled with the key itself.
    pub fn normalize(&self, name: &PropertyName, value: Value) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        if let Value::Text(s) = &value {
            if s.trim().is_empty() && !matches!(self, ValueType::Text | ValueType::LongText) {
                return Ok(Value::Null);
            }
        }

        let mismatch = |value: &Value| {
            ModelError::invalid_value(name, format!("{:?} is not a valid {:?}", value, self))
        };

        match self {
            ValueType::Integer | ValueType::Identifier => match value {
                Value::Integer(_) => Ok(value),
                Value::Decimal(d) if d.fract().is_zero() => {
                    d.to_i64().map(Value::Integer).ok_or_else(|| mismatch(&value))
                }
                Value::Text(ref s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::Integer)
                    .map_err(|_| mismatch(&value)),
                _ => Err(mismatch(&value)),
            },
            ValueType::Decimal => match value {
                Value::Decimal(_) => Ok(value),
                Value::Integer(i) => Ok(Value::Decimal(Decimal::from(i))),
                Value::Text(ref s) => Decimal::from_str(s.trim())
                    .map(Value::Decimal)
                    .map_err(|_| mismatch(&value)),
                _ => Err(mismatch(&value)),
            },
            ValueType::Text => match value {
                Value::Text(_) => Ok(value),
                Value::Rows(_) | Value::Bytes(_) => Err(mismatch(&value)),
                other => Ok(Value::Text(other.to_string())),
            },
            ValueType::LongText => match value {
                Value::Text(_) | Value::Bytes(_) => Ok(value),
                Value::Rows(_) => Err(mismatch(&value)),
                other => Ok(Value::Text(other.to_string())),
            },
            ValueType::Binary => match value {
                Value::Bytes(_) => Ok(value),
                Value::Text(s) => Ok(Value::Bytes(s.into_bytes())),
                _ => Err(mismatch(&value)),
            },
            ValueType::YesNo => match value {
                Value::Boolean(_) => Ok(value),
                Value::Integer(0) => Ok(Value::Boolean(false)),
                Value::Integer(1) => Ok(Value::Boolean(true)),
                Value::Text(ref s) => parse_yes_no(s)
                    .map(Value::Boolean)
                    .ok_or_else(|| mismatch(&value)),
                _ => Err(mismatch(&value)),
            },
            ValueType::Date => match value {
                Value::Timestamp(ts) => Ok(Value::Timestamp(truncate_to_date(ts))),
                Value::Text(ref s) => parse_timestamp(s)
                    .map(|ts| Value::Timestamp(truncate_to_date(ts)))
                    .ok_or_else(|| mismatch(&value)),
                _ => Err(mismatch(&value)),
            },
            ValueType::Timestamp => match value {
                Value::Timestamp(_) => Ok(value),
                Value::Integer(secs) => DateTime::from_timestamp(secs, 0)
                    .map(|dt| Value::Timestamp(dt.naive_utc()))
                    .ok_or_else(|| mismatch(&value)),
                Value::Text(ref s) => parse_timestamp(s)
                    .map(Value::Timestamp)
                    .ok_or_else(|| mismatch(&value)),
                _ => Err(mismatch(&value)),
            },
            ValueType::Lookup | ValueType::TextLookup => match value {
                Value::Lookup(_) => Ok(value),
                Value::Integer(id) if self.is_numeric_lookup() => {
                    Ok(Value::Lookup(LookupValue::of_id(id, id.to_string())))
                }
                Value::Text(ref s) if self.is_numeric_lookup() => s
                    .trim()
                    .parse::<i64>()
                    .map(|id| Value::Lookup(LookupValue::of_id(id, id.to_string())))
                    .map_err(|_| mismatch(&value)),
                Value::Text(s) => Ok(Value::Lookup(LookupValue::new(
                    LookupKey::Text(s.clone()),
                    s,
                ))),
                Value::Integer(id) => Ok(Value::Lookup(LookupValue::new(
                    LookupKey::Text(id.to_string()),
                    id.to_string(),
                ))),
                _ => Err(mismatch(&value)),
            },
        }
    }
}

/// Parse the persisted yes/no encoding
pub fn parse_yes_no(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" | "true" | "1" => Some(true),
        "n" | "no" | "false" | "0" => Some(false),
        _ => None,
    }
}

/// Encode a boolean the way it is persisted
pub fn encode_yes_no(b: bool) -> &'static str {
    if b {
        "Y"
    } else {
        "N"
    }
}

/// Parse a timestamp from any of the supported textual representations
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, format) {
            return Some(ts);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, DATE_FORMAT) {
        return Some(date.and_time(NaiveTime::default()));
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.naive_local())
}

fn truncate_to_date(ts: NaiveDateTime) -> NaiveDateTime {
    ts.date().and_time(NaiveTime::default())
}
