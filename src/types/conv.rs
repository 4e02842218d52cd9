//! Conversions between Rust types and `Value`

use super::{BoolEncoding, Collection, Number, Object, Value};
use crate::{Error, Result};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};

/**
    Session settings that affect how values are marshaled: the session time zone,
    which is applied to timestamps that do not carry one, and the optional boolean
    text encoding.
*/
#[derive(Debug, Clone, PartialEq)]
pub struct Codec {
    timezone: FixedOffset,
    bools: Option<BoolEncoding>,
}

impl Default for Codec {
    fn default() -> Self {
        Self { timezone: utc(), bools: None }
    }
}

fn utc() -> FixedOffset {
    Utc.fix()
}

impl Codec {
    pub fn new(timezone: FixedOffset, bools: Option<BoolEncoding>) -> Self {
        Self { timezone, bools }
    }

    pub fn timezone(&self) -> FixedOffset {
        self.timezone
    }

    pub fn bool_encoding(&self) -> Option<&BoolEncoding> {
        self.bools.as_ref()
    }

    /// Interprets a naive timestamp as local time in the session time zone
    pub(crate) fn localize(&self, ts: &NaiveDateTime) -> Result<DateTime<FixedOffset>> {
        self.timezone.from_local_datetime(ts).single().ok_or_else(|| {
            Error::mismatch(format!("{} does not exist in time zone {}", ts, self.timezone))
        })
    }
}

/// Converts a Rust value into a `Value` for binding.
pub trait ToValue {
    fn to_value(&self, codec: &Codec) -> Result<Value>;
}

/// Converts a `Value` into an owned Rust value.
pub trait FromValue : Sized {
    fn from_value(val: &Value, codec: &Codec) -> Result<Self>;
}

pub(crate) fn mismatch<T>(val: &Value, target: &str) -> Result<T> {
    if val.is_null() {
        Err(Error::mismatch(format!("NULL cannot be converted to {}; use Option", target)))
    } else {
        Err(Error::mismatch(format!("{} cannot be converted to {}", val.kind(), target)))
    }
}

impl<T: ToValue + ?Sized> ToValue for &T {
    fn to_value(&self, codec: &Codec) -> Result<Value> {
        (**self).to_value(codec)
    }
}

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(&self, codec: &Codec) -> Result<Value> {
        match self {
            Some(val) => val.to_value(codec),
            None => Ok(Value::Null),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(val: &Value, codec: &Codec) -> Result<Self> {
        if val.is_null() {
            Ok(None)
        } else {
            T::from_value(val, codec).map(Some)
        }
    }
}

macro_rules! impl_int {
    ($($t:ty),+) => {
        $(
            impl ToValue for $t {
                fn to_value(&self, _codec: &Codec) -> Result<Value> {
                    match i64::try_from(*self) {
                        Ok(val) => Ok(Value::Int(val)),
                        Err(_)  => Ok(Value::Number(Number::from(*self))),
                    }
                }
            }

            impl FromValue for $t {
                fn from_value(val: &Value, _codec: &Codec) -> Result<Self> {
                    let target = stringify!($t);
                    let overflow = || Error::mismatch(format!("{} is out of range of {}", val, target));
                    match val {
                        Value::Int(num)   => <$t>::try_from(*num).map_err(|_| overflow()),
                        Value::Number(num) if num.is_integer() => num.as_str().parse::<$t>().map_err(|_| overflow()),
                        Value::Float(num) if num.fract() == 0.0 => <$t>::try_from(*num as i128).map_err(|_| overflow()),
                        Value::Bool(flag) => Ok(if *flag { 1 } else { 0 }),
                        _ => mismatch(val, target),
                    }
                }
            }
        )+
    };
}

impl_int!{ i8, i16, i32, i64, isize, u8, u16, u32, u64, usize }

macro_rules! impl_float {
    ($($t:ty),+) => {
        $(
            impl ToValue for $t {
                fn to_value(&self, _codec: &Codec) -> Result<Value> {
                    Ok(Value::Float(*self as f64))
                }
            }

            impl FromValue for $t {
                fn from_value(val: &Value, _codec: &Codec) -> Result<Self> {
                    match val {
                        Value::Float(num)  => Ok(*num as $t),
                        Value::Int(num)    => Ok(*num as $t),
                        Value::Number(num) => Ok(num.to_f64() as $t),
                        _ => mismatch(val, stringify!($t)),
                    }
                }
            }
        )+
    };
}

impl_float!{ f32, f64 }

impl ToValue for bool {
    fn to_value(&self, codec: &Codec) -> Result<Value> {
        match codec.bool_encoding() {
            Some(enc) => Ok(Value::Text(enc.encode(*self).to_string())),
            None => Ok(Value::Bool(*self)),
        }
    }
}

impl FromValue for bool {
    fn from_value(val: &Value, codec: &Codec) -> Result<Self> {
        match val {
            Value::Bool(flag) => Ok(*flag),
            Value::Int(num)   => Ok(*num != 0),
            Value::Number(num) if num.is_integer() => Ok(num.to_i128().map_or(true, |num| num != 0)),
            Value::Text(txt) => match codec.bool_encoding() {
                Some(enc) => enc.decode(txt),
                None => Err(Error::mismatch(format!("text {:?} cannot be converted to bool without a boolean encoding", txt))),
            },
            _ => mismatch(val, "bool"),
        }
    }
}

impl ToValue for str {
    fn to_value(&self, _codec: &Codec) -> Result<Value> {
        Ok(Value::Text(self.to_string()))
    }
}

impl ToValue for String {
    fn to_value(&self, _codec: &Codec) -> Result<Value> {
        Ok(Value::Text(self.clone()))
    }
}

impl FromValue for String {
    fn from_value(val: &Value, _codec: &Codec) -> Result<Self> {
        match val {
            Value::Text(txt)   => Ok(txt.clone()),
            Value::RowId(txt)  => Ok(txt.clone()),
            Value::Number(num) => Ok(num.to_string()),
            Value::Int(num)    => Ok(num.to_string()),
            Value::Float(num)  => Ok(num.to_string()),
            _ => mismatch(val, "String"),
        }
    }
}

impl ToValue for [u8] {
    fn to_value(&self, _codec: &Codec) -> Result<Value> {
        Ok(Value::Bytes(self.to_vec()))
    }
}

impl ToValue for Vec<u8> {
    fn to_value(&self, _codec: &Codec) -> Result<Value> {
        Ok(Value::Bytes(self.clone()))
    }
}

impl FromValue for Vec<u8> {
    fn from_value(val: &Value, _codec: &Codec) -> Result<Self> {
        match val {
            Value::Bytes(bytes) => Ok(bytes.clone()),
            _ => mismatch(val, "Vec<u8>"),
        }
    }
}

impl ToValue for Number {
    fn to_value(&self, _codec: &Codec) -> Result<Value> {
        Ok(Value::Number(self.clone()))
    }
}

impl FromValue for Number {
    fn from_value(val: &Value, _codec: &Codec) -> Result<Self> {
        match val {
            Value::Number(num) => Ok(num.clone()),
            Value::Int(num)    => Ok(Number::from(*num)),
            Value::Float(num)  => Number::from_f64(*num),
            Value::Text(txt)   => txt.parse(),
            _ => mismatch(val, "Number"),
        }
    }
}

impl ToValue for NaiveDateTime {
    fn to_value(&self, codec: &Codec) -> Result<Value> {
        codec.localize(self).map(Value::TimestampTz)
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(val: &Value, codec: &Codec) -> Result<Self> {
        match val {
            Value::Timestamp(ts)   => Ok(*ts),
            Value::TimestampTz(ts) => Ok(ts.with_timezone(&codec.timezone()).naive_local()),
            _ => mismatch(val, "NaiveDateTime"),
        }
    }
}

impl ToValue for NaiveDate {
    fn to_value(&self, _codec: &Codec) -> Result<Value> {
        self.and_hms_opt(0, 0, 0)
            .map(Value::Timestamp)
            .ok_or_else(|| Error::mismatch(format!("{} has no midnight", self)))
    }
}

impl FromValue for NaiveDate {
    fn from_value(val: &Value, codec: &Codec) -> Result<Self> {
        NaiveDateTime::from_value(val, codec).map(|ts| ts.date())
    }
}

impl ToValue for DateTime<FixedOffset> {
    fn to_value(&self, _codec: &Codec) -> Result<Value> {
        Ok(Value::TimestampTz(*self))
    }
}

impl FromValue for DateTime<FixedOffset> {
    fn from_value(val: &Value, codec: &Codec) -> Result<Self> {
        match val {
            Value::TimestampTz(ts) => Ok(*ts),
            Value::Timestamp(ts)   => codec.localize(ts),
            _ => mismatch(val, "DateTime"),
        }
    }
}

impl ToValue for DateTime<Utc> {
    fn to_value(&self, _codec: &Codec) -> Result<Value> {
        Ok(Value::TimestampTz(self.with_timezone(&Utc.fix())))
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(val: &Value, codec: &Codec) -> Result<Self> {
        DateTime::<FixedOffset>::from_value(val, codec).map(|ts| ts.with_timezone(&Utc))
    }
}

impl ToValue for Duration {
    fn to_value(&self, _codec: &Codec) -> Result<Value> {
        Ok(Value::Interval(*self))
    }
}

impl FromValue for Duration {
    fn from_value(val: &Value, _codec: &Codec) -> Result<Self> {
        match val {
            Value::Interval(dur) => Ok(*dur),
            _ => mismatch(val, "Duration"),
        }
    }
}

impl ToValue for Value {
    fn to_value(&self, _codec: &Codec) -> Result<Value> {
        Ok(self.clone())
    }
}

impl FromValue for Value {
    fn from_value(val: &Value, _codec: &Codec) -> Result<Self> {
        Ok(val.clone())
    }
}

impl ToValue for Object {
    fn to_value(&self, _codec: &Codec) -> Result<Value> {
        Ok(Value::Object(self.clone()))
    }
}

impl FromValue for Object {
    fn from_value(val: &Value, _codec: &Codec) -> Result<Self> {
        match val {
            Value::Object(obj) => Ok(obj.clone()),
            _ => mismatch(val, "Object"),
        }
    }
}

impl ToValue for Collection {
    fn to_value(&self, _codec: &Codec) -> Result<Value> {
        Ok(Value::Collection(self.clone()))
    }
}

impl FromValue for Collection {
    fn from_value(val: &Value, _codec: &Codec) -> Result<Self> {
        match val {
            Value::Collection(coll) => Ok(coll.clone()),
            _ => mismatch(val, "Collection"),
        }
    }
}
