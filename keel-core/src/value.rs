use rust_decimal::Decimal;
use std::{
    hash::{Hash, Hasher},
    mem,
};
use time::OffsetDateTime;
use uuid::Uuid;

/// Column value.
///
/// Every variant wraps an `Option` so the same enum doubles as a column type
/// template: `Value::Int32(None)` describes the type, `Value::Int32(Some(7))`
/// carries a value. `Null` is the untyped absent value (a property that was
/// never set).
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Boolean(Option<bool>),
    Int8(Option<i8>),
    Int16(Option<i16>),
    Int32(Option<i32>),
    Int64(Option<i64>),
    Float32(Option<f32>),
    Float64(Option<f64>),
    Decimal(Option<Decimal>),
    Varchar(Option<String>),
    Timestamp(Option<OffsetDateTime>),
    Uuid(Option<Uuid>),
    Blob(Option<Vec<u8>>),
}

impl Value {
    /// True when no value is present, whatever the type tag.
    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Boolean(v) => v.is_none(),
            Value::Int8(v) => v.is_none(),
            Value::Int16(v) => v.is_none(),
            Value::Int32(v) => v.is_none(),
            Value::Int64(v) => v.is_none(),
            Value::Float32(v) => v.is_none(),
            Value::Float64(v) => v.is_none(),
            Value::Decimal(v) => v.is_none(),
            Value::Varchar(v) => v.is_none(),
            Value::Timestamp(v) => v.is_none(),
            Value::Uuid(v) => v.is_none(),
            Value::Blob(v) => v.is_none(),
        }
    }

    /// Compare type tags only, ignoring the carried values.
    pub fn same_type(&self, other: &Self) -> bool {
        mem::discriminant(self) == mem::discriminant(other)
    }

    /// Clone of this value's type with no value inside.
    pub fn as_empty(&self) -> Value {
        match self {
            Value::Null => Value::Null,
            Value::Boolean(..) => Value::Boolean(None),
            Value::Int8(..) => Value::Int8(None),
            Value::Int16(..) => Value::Int16(None),
            Value::Int32(..) => Value::Int32(None),
            Value::Int64(..) => Value::Int64(None),
            Value::Float32(..) => Value::Float32(None),
            Value::Float64(..) => Value::Float64(None),
            Value::Decimal(..) => Value::Decimal(None),
            Value::Varchar(..) => Value::Varchar(None),
            Value::Timestamp(..) => Value::Timestamp(None),
            Value::Uuid(..) => Value::Uuid(None),
            Value::Blob(..) => Value::Blob(None),
        }
    }

    /// Type name used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(..) => "boolean",
            Value::Int8(..) => "int8",
            Value::Int16(..) => "int16",
            Value::Int32(..) => "int32",
            Value::Int64(..) => "int64",
            Value::Float32(..) => "float32",
            Value::Float64(..) => "float64",
            Value::Decimal(..) => "decimal",
            Value::Varchar(..) => "text",
            Value::Timestamp(..) => "timestamp",
            Value::Uuid(..) => "uuid",
            Value::Blob(..) => "bytes",
        }
    }

    /// Fit a backend-generated integer key into this value's type.
    ///
    /// Returns `None` when the type cannot hold an integer key.
    pub fn cast_integer(&self, value: i64) -> Option<Value> {
        Some(match self {
            Value::Int8(..) => Value::Int8(i8::try_from(value).ok()),
            Value::Int16(..) => Value::Int16(i16::try_from(value).ok()),
            Value::Int32(..) => Value::Int32(i32::try_from(value).ok()),
            Value::Int64(..) => Value::Int64(Some(value)),
            _ => return None,
        })
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int8(Some(v)) => Some(*v as i64),
            Value::Int16(Some(v)) => Some(*v as i64),
            Value::Int32(Some(v)) => Some(*v as i64),
            Value::Int64(Some(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Varchar(Some(v)) => Some(v),
            _ => None,
        }
    }
}

// Key values index the identity map. Floats hash by bit pattern, which does
// not agree with their derived equality (-0.0 == 0.0, NaN != NaN); the
// registry rejects floating-point primary keys so float values never reach
// the map.
impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Boolean(v) => v.hash(state),
            Value::Int8(v) => v.hash(state),
            Value::Int16(v) => v.hash(state),
            Value::Int32(v) => v.hash(state),
            Value::Int64(v) => v.hash(state),
            Value::Float32(v) => v.map(f32::to_bits).hash(state),
            Value::Float64(v) => v.map(f64::to_bits).hash(state),
            Value::Decimal(v) => v.hash(state),
            Value::Varchar(v) => v.hash(state),
            Value::Timestamp(v) => v.hash(state),
            Value::Uuid(v) => v.hash(state),
            Value::Blob(v) => v.hash(state),
        }
    }
}

macro_rules! impl_from_value {
    ($type:ty, $variant:ident) => {
        impl From<$type> for Value {
            fn from(value: $type) -> Self {
                Value::$variant(Some(value.into()))
            }
        }
        impl From<Option<$type>> for Value {
            fn from(value: Option<$type>) -> Self {
                Value::$variant(value.map(Into::into))
            }
        }
    };
}

impl_from_value!(bool, Boolean);
impl_from_value!(i8, Int8);
impl_from_value!(i16, Int16);
impl_from_value!(i32, Int32);
impl_from_value!(i64, Int64);
impl_from_value!(f32, Float32);
impl_from_value!(f64, Float64);
impl_from_value!(Decimal, Decimal);
impl_from_value!(String, Varchar);
impl_from_value!(&str, Varchar);
impl_from_value!(OffsetDateTime, Timestamp);
impl_from_value!(Uuid, Uuid);
impl_from_value!(Vec<u8>, Blob);

impl From<&Value> for Value {
    fn from(value: &Value) -> Self {
        value.clone()
    }
}
