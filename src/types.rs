//! Values exchanged with the database

pub mod number;
pub mod boolean;
pub mod object;
pub(crate) mod conv;

pub use number::Number;
pub use boolean::BoolEncoding;
pub use object::{Object, ObjectType, Collection, Attribute};
pub use conv::{ToValue, FromValue, Codec};

use crate::stmt::ColumnInfo;
use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime};
use std::{fmt, sync::Arc};

/// Server-side cursor identifier
pub type CursorId = u64;

/// Kind of a large object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LobKind {
    /// Character LOB
    Clob,
    /// Binary LOB
    Blob,
}

/// Reference to a LOB held by the server
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LobLocator {
    pub id: u64,
    pub kind: LobKind,
}

/// Reference to a cursor opened by the server, as returned in a column,
/// an OUT parameter or as an implicit result.
#[derive(Debug, Clone, PartialEq)]
pub struct RefCursor {
    pub id: CursorId,
    pub columns: Arc<Vec<ColumnInfo>>,
}

/**
    Database-native column and attribute types.
*/
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Varchar,
    Char,
    Number,
    BinaryFloat,
    BinaryDouble,
    Date,
    Timestamp,
    TimestampTz,
    IntervalDs,
    Raw,
    Clob,
    Blob,
    Boolean,
    RowId,
    Cursor,
    /// Instance of the named object type
    Object(String),
    /// Instance of the named collection type
    Collection(String),
}

impl ColumnType {
    /// Returns the database-native type name
    pub fn type_name(&self) -> &str {
        match self {
            ColumnType::Varchar        => "VARCHAR2",
            ColumnType::Char           => "CHAR",
            ColumnType::Number         => "NUMBER",
            ColumnType::BinaryFloat    => "BINARY_FLOAT",
            ColumnType::BinaryDouble   => "BINARY_DOUBLE",
            ColumnType::Date           => "DATE",
            ColumnType::Timestamp      => "TIMESTAMP",
            ColumnType::TimestampTz    => "TIMESTAMP WITH TIME ZONE",
            ColumnType::IntervalDs     => "INTERVAL DAY TO SECOND",
            ColumnType::Raw            => "RAW",
            ColumnType::Clob           => "CLOB",
            ColumnType::Blob           => "BLOB",
            ColumnType::Boolean        => "BOOLEAN",
            ColumnType::RowId          => "ROWID",
            ColumnType::Cursor         => "REF CURSOR",
            ColumnType::Object(name)   => name,
            ColumnType::Collection(name) => name,
        }
    }

    /// Returns `true` if a value of this type can hold `val`.
    pub(crate) fn accepts(&self, val: &Value) -> bool {
        match (self, val) {
            (_, Value::Null) => true,
            (ColumnType::Varchar | ColumnType::Char, Value::Text(_)) => true,
            (ColumnType::Number, Value::Int(_) | Value::Number(_) | Value::Float(_) | Value::Bool(_)) => true,
            (ColumnType::BinaryFloat | ColumnType::BinaryDouble, Value::Int(_) | Value::Float(_) | Value::Number(_)) => true,
            (ColumnType::Date | ColumnType::Timestamp | ColumnType::TimestampTz, Value::Timestamp(_) | Value::TimestampTz(_)) => true,
            (ColumnType::IntervalDs, Value::Interval(_)) => true,
            (ColumnType::Raw, Value::Bytes(_)) => true,
            (ColumnType::Clob, Value::Text(_) | Value::Lob(LobLocator { kind: LobKind::Clob, .. })) => true,
            (ColumnType::Blob, Value::Bytes(_) | Value::Lob(LobLocator { kind: LobKind::Blob, .. })) => true,
            (ColumnType::Boolean, Value::Bool(_)) => true,
            (ColumnType::RowId, Value::RowId(_) | Value::Text(_)) => true,
            (ColumnType::Cursor, Value::Cursor(_)) => true,
            (ColumnType::Object(name), Value::Object(obj)) => obj.type_name() == name,
            (ColumnType::Collection(name), Value::Collection(coll)) => coll.type_name() == name,
            _ => false,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/**
    A single value as it crosses the boundary between the application and a session.

    `Interval` of zero length and `Null` are distinct values.
*/
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    /// Decimal text that never passes through a binary float
    Number(Number),
    Text(String),
    Bytes(Vec<u8>),
    Bool(bool),
    /// Timestamp without a time zone
    Timestamp(NaiveDateTime),
    /// Timestamp with an explicit offset
    TimestampTz(DateTime<FixedOffset>),
    Interval(Duration),
    Lob(LobLocator),
    Object(Object),
    Collection(Collection),
    /// PL/SQL index-by table. Element `i` of the vector is index `i + 1` on the server.
    Array(Vec<Value>),
    Cursor(RefCursor),
    RowId(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns a short name of the variant for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null           => "NULL",
            Value::Int(_)         => "integer",
            Value::Float(_)       => "float",
            Value::Number(_)      => "number",
            Value::Text(_)        => "text",
            Value::Bytes(_)       => "bytes",
            Value::Bool(_)        => "boolean",
            Value::Timestamp(_)   => "timestamp",
            Value::TimestampTz(_) => "timestamp with time zone",
            Value::Interval(_)    => "interval",
            Value::Lob(_)         => "LOB",
            Value::Object(_)      => "object",
            Value::Collection(_)  => "collection",
            Value::Array(_)       => "array",
            Value::Cursor(_)      => "cursor",
            Value::RowId(_)       => "ROWID",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null            => f.write_str("NULL"),
            Value::Int(val)        => write!(f, "{}", val),
            Value::Float(val)      => write!(f, "{}", val),
            Value::Number(num)     => write!(f, "{}", num),
            Value::Text(txt)       => f.write_str(txt),
            Value::Bytes(bytes)    => bytes.iter().try_for_each(|b| write!(f, "{:02X}", b)),
            Value::Bool(val)       => write!(f, "{}", val),
            Value::Timestamp(ts)   => write!(f, "{}", ts),
            Value::TimestampTz(ts) => write!(f, "{}", ts),
            Value::Interval(dur)   => write!(f, "{}", dur),
            Value::Lob(loc)        => write!(f, "{:?}#{}", loc.kind, loc.id),
            Value::Object(obj)     => write!(f, "{}", obj),
            Value::Collection(col) => write!(f, "{}", col),
            Value::Array(items)    => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::Cursor(cur)     => write!(f, "cursor#{}", cur.id),
            Value::RowId(rowid)    => f.write_str(rowid),
        }
    }
}
