//! Generic DSDL values. Schema-only decoding produces these, and typed structs convert to and
//! from them through [`DsdlObject`].

use crate::error::CodecError;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Array(Vec<Value>),
    /// A structure (every named field) or a union (just the active field).
    Record(Record),
}

impl Value {
    /// A `uint8` array.
    pub fn bytes(bytes: &[u8]) -> Self {
        Self::Array(bytes.iter().map(|b| Self::UInt(*b as u64)).collect())
    }

    /// Strings go on the wire as `uint8` arrays of their UTF-8 bytes.
    pub fn string(s: &str) -> Self {
        Self::bytes(s.as_bytes())
    }

    /// A union value with `field` active.
    pub fn union(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Record(Record::new().with(field, value))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            Self::Int(v) => Some(*v != 0),
            Self::UInt(v) => Some(*v != 0),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::UInt(v) => Some(*v),
            Self::Int(v) => u64::try_from(*v).ok(),
            Self::Bool(v) => Some(*v as u64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::UInt(v) => i64::try_from(*v).ok(),
            Self::Bool(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            Self::UInt(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Self::Record(r) => Some(r),
            _ => None,
        }
    }

    /// `None` unless every element is an integer in `0..=255`.
    pub fn as_bytes(&self) -> Option<Vec<u8>> {
        self.as_array()?
            .iter()
            .map(|v| v.as_u64().and_then(|b| u8::try_from(b).ok()))
            .collect()
    }
}

macro_rules! value_from {
    ($variant:ident, $target:ty, $($t:ty),+) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Self::$variant(v as $target)
                }
            }
        )+
    };
}

value_from!(UInt, u64, u8, u16, u32, u64);
value_from!(Int, i64, i8, i16, i32, i64);
value_from!(Float, f64, f32, f64);

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<Record> for Value {
    fn from(v: Record) -> Self {
        Self::Record(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::Array(v)
    }
}

/// Field values of a composite, in insertion order. Names are unique.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Set a field, replacing any previous value under the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();

        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, v)) => *v = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Like [`get`](Self::get), but a missing field is an error.
    pub fn field(&self, name: &str) -> Result<&Value, CodecError> {
        self.get(name)
            .ok_or_else(|| CodecError::MissingField(name.to_owned()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn bool(&self, name: &str) -> Result<bool, CodecError> {
        self.field(name)?
            .as_bool()
            .ok_or_else(|| CodecError::TypeMismatch(name.to_owned()))
    }

    pub fn u64(&self, name: &str) -> Result<u64, CodecError> {
        self.field(name)?
            .as_u64()
            .ok_or_else(|| CodecError::TypeMismatch(name.to_owned()))
    }

    pub fn i64(&self, name: &str) -> Result<i64, CodecError> {
        self.field(name)?
            .as_i64()
            .ok_or_else(|| CodecError::TypeMismatch(name.to_owned()))
    }

    pub fn f64(&self, name: &str) -> Result<f64, CodecError> {
        self.field(name)?
            .as_f64()
            .ok_or_else(|| CodecError::TypeMismatch(name.to_owned()))
    }

    pub fn bytes(&self, name: &str) -> Result<Vec<u8>, CodecError> {
        self.field(name)?
            .as_bytes()
            .ok_or_else(|| CodecError::TypeMismatch(name.to_owned()))
    }

    pub fn record(&self, name: &str) -> Result<&Record, CodecError> {
        self.field(name)?
            .as_record()
            .ok_or_else(|| CodecError::TypeMismatch(name.to_owned()))
    }

    /// The active field of a union value.
    pub fn active(&self) -> Option<(&str, &Value)> {
        match self.fields.as_slice() {
            [(n, v)] => Some((n.as_str(), v)),
            _ => None,
        }
    }
}

impl<N: Into<String>, V: Into<Value>> FromIterator<(N, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut result = Self::new();
        for (n, v) in iter {
            result.insert(n, v);
        }
        result
    }
}

/// The field accessor table of a typed struct: how it maps onto the fields of its DSDL
/// composite.
pub trait DsdlObject: Sized {
    /// Full name of the composite (or service) this type is an instance of.
    const FULL_NAME: &'static str;

    fn to_record(&self) -> Record;

    fn from_record(record: &Record) -> Result<Self, CodecError>;
}
