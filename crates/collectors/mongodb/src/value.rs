use mongodb::bson::{self, Bson};

/// Nodes nested deeper than this decode to an empty map.
///
/// The flattening engine has its own, lower ceiling and reports over-deep branches.
pub const MAX_DECODE_DEPTH: usize = 128;

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(&self) -> f64 {
        match *self {
            Self::Int(value) => value as f64,
            Self::Float(value) => value,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Timestamp {
    /// Milliseconds since the unix epoch.
    DateTime(i64),
    /// Internal replication timestamp, `time` in seconds since the unix epoch.
    Bson { time: u32, increment: u32 },
}

impl Timestamp {
    pub fn as_secs(&self) -> f64 {
        match *self {
            Self::DateTime(millis) => millis as f64 / 1_000.0,
            Self::Bson { time, .. } => f64::from(time),
        }
    }

    pub fn as_nanos(&self) -> f64 {
        match *self {
            Self::DateTime(millis) => millis as f64 * 1_000_000.0,
            Self::Bson { time, .. } => f64::from(time) * 1_000_000_000.0,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Opaque {
    Binary,
    ObjectId,
    Null,
    /// A type that has no numeric interpretation at all.
    Unsupported(&'static str),
}

impl Opaque {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Binary => "binary",
            Self::ObjectId => "objectId",
            Self::Null => "null",
            Self::Unsupported(name) => name,
        }
    }
}

/// A decoded document node.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(Number),
    Bool(bool),
    Timestamp(Timestamp),
    String(String),
    Array(Vec<Value>),
    Map(Document),
    Binary(Opaque),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Number(Number::Int(_)) => "int",
            Self::Number(Number::Float(_)) => "double",
            Self::Bool(_) => "bool",
            Self::Timestamp(Timestamp::DateTime(_)) => "date",
            Self::Timestamp(Timestamp::Bson { .. }) => "timestamp",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Map(_) => "object",
            Self::Binary(opaque) => opaque.type_name(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(number) => Some(number.as_f64()),
            Self::Bool(value) => Some(if *value { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Document> {
        match self {
            Self::Map(document) => Some(document),
            _ => None,
        }
    }

    /// Renders scalars as label values.
    pub fn as_label_value(&self) -> Option<String> {
        match self {
            Self::String(value) => Some(value.clone()),
            Self::Number(Number::Int(value)) => Some(value.to_string()),
            Self::Number(Number::Float(value)) => Some(value.to_string()),
            Self::Bool(value) => Some(value.to_string()),
            _ => None,
        }
    }
}

/// Ordered mapping from key to value, preserving the server's key order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document(Vec<(String, Value)>);

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Replaces the value of an existing key in place, or appends it.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let idx = self.0.iter().position(|(k, _)| k == key)?;
        Some(self.0.remove(idx).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        let mut document = Self::new();
        for (key, value) in iter {
            document.insert(key, value);
        }
        document
    }
}

fn decode_document(document: bson::Document, depth: usize) -> Document {
    if depth >= MAX_DECODE_DEPTH {
        return Document::new();
    }
    document
        .into_iter()
        .map(|(key, value)| (key, decode(value, depth + 1)))
        .collect()
}

fn decode(value: Bson, depth: usize) -> Value {
    match value {
        Bson::Double(value) => Value::Number(Number::Float(value)),
        Bson::Int32(value) => Value::Number(Number::Int(value.into())),
        Bson::Int64(value) => Value::Number(Number::Int(value)),
        Bson::Decimal128(value) => match value.to_string().parse::<f64>() {
            Ok(value) => Value::Number(Number::Float(value)),
            Err(_) => Value::Binary(Opaque::Unsupported("decimal128")),
        },
        Bson::Boolean(value) => Value::Bool(value),
        Bson::DateTime(value) => Value::Timestamp(Timestamp::DateTime(value.timestamp_millis())),
        Bson::Timestamp(value) => Value::Timestamp(Timestamp::Bson {
            time: value.time,
            increment: value.increment,
        }),
        Bson::String(value) => Value::String(value),
        Bson::Array(values) => {
            if depth >= MAX_DECODE_DEPTH {
                return Value::Array(Vec::new());
            }
            Value::Array(
                values
                    .into_iter()
                    .map(|value| decode(value, depth + 1))
                    .collect(),
            )
        }
        Bson::Document(document) => Value::Map(decode_document(document, depth)),
        Bson::Binary(_) => Value::Binary(Opaque::Binary),
        Bson::ObjectId(_) => Value::Binary(Opaque::ObjectId),
        Bson::Null => Value::Binary(Opaque::Null),
        Bson::Undefined => Value::Binary(Opaque::Unsupported("undefined")),
        Bson::RegularExpression(_) => Value::Binary(Opaque::Unsupported("regex")),
        Bson::JavaScriptCode(_) => Value::Binary(Opaque::Unsupported("javascript")),
        Bson::JavaScriptCodeWithScope(_) => {
            Value::Binary(Opaque::Unsupported("javascriptWithScope"))
        }
        Bson::Symbol(_) => Value::Binary(Opaque::Unsupported("symbol")),
        Bson::DbPointer(_) => Value::Binary(Opaque::Unsupported("dbPointer")),
        Bson::MaxKey => Value::Binary(Opaque::Unsupported("maxKey")),
        Bson::MinKey => Value::Binary(Opaque::Unsupported("minKey")),
    }
}

impl From<bson::Document> for Document {
    fn from(document: bson::Document) -> Self {
        decode_document(document, 0)
    }
}

impl From<Bson> for Value {
    fn from(value: Bson) -> Self {
        decode(value, 0)
    }
}

#[derive(Copy, Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Key<'a> {
    Str(&'a str),
    Index(usize),
}

impl<'a> std::fmt::Display for Key<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Str(key) => std::fmt::Display::fmt(key, f),
            Self::Index(idx) => std::fmt::Display::fmt(idx, f),
        }
    }
}

impl<'a> From<usize> for Key<'a> {
    fn from(value: usize) -> Self {
        Key::Index(value)
    }
}

impl<'a> From<&'a str> for Key<'a> {
    fn from(value: &'a str) -> Self {
        Key::Str(value)
    }
}

pub fn get<'a>(value: &'a Value, key: Key<'_>) -> Option<&'a Value> {
    match (value, key) {
        (Value::Array(values), Key::Index(idx)) => values.get(idx),
        (Value::Map(document), Key::Str(key)) => document.get(key),
        _ => None,
    }
}

pub fn format_path(path: &[Key<'_>]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(".")
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("{path:?}: not found")]
    NotFound { path: String },
    #[error("{path:?}: invalid type: expected {expected}, found {found}")]
    InvalidType {
        path: String,
        expected: &'static str,
        found: &'static str,
    },
}

impl QueryError {
    pub fn path(&self) -> &str {
        match self {
            Self::NotFound { path } | Self::InvalidType { path, .. } => path,
        }
    }
}

impl From<QueryError> for mongodb_exporter_component::Error {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::NotFound { path } => Self::Schema {
                path,
                expected: "value",
                found: "nothing".to_string(),
            },
            QueryError::InvalidType {
                path,
                expected,
                found,
            } => Self::Schema {
                path,
                expected,
                found: found.to_string(),
            },
        }
    }
}

pub fn get_path<'a>(document: &'a Value, path: &[Key<'_>]) -> Result<&'a Value, QueryError> {
    let mut value = document;
    for key in path.iter().copied() {
        value = get(value, key).ok_or_else(|| QueryError::NotFound {
            path: format_path(path),
        })?;
    }
    Ok(value)
}

pub fn get_f64(document: &Value, path: &[Key<'_>]) -> Result<f64, QueryError> {
    let value = get_path(document, path)?;
    value.as_f64().ok_or_else(|| QueryError::InvalidType {
        path: format_path(path),
        expected: "number",
        found: value.type_name(),
    })
}

pub fn get_str<'a>(document: &'a Value, path: &[Key<'_>]) -> Result<&'a str, QueryError> {
    let value = get_path(document, path)?;
    value.as_str().ok_or_else(|| QueryError::InvalidType {
        path: format_path(path),
        expected: "string",
        found: value.type_name(),
    })
}

#[macro_export]
macro_rules! path {
    ( $( $x:expr ),* ) => {
        [ $( $crate::value::Key::from($x) ),* ]
    }
}

#[macro_export]
macro_rules! get_f64 {
    ( $doc:expr, $( $x:expr ),* ) => {
        $crate::value::get_f64($doc, &$crate::path!($($x),*))
    };
}

#[macro_export]
macro_rules! get_str {
    ( $doc:expr, $( $x:expr ),* ) => {
        $crate::value::get_str($doc, &$crate::path!($($x),*))
    };
}
