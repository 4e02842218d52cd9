use super::{cursor::Cursor, rows::Row};
use crate::{
    Result,
    lob::Lob,
    types::{Collection, FromValue, Number, Object, Value, conv::mismatch},
};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, Utc};

/// A trait for types which instances can be created from the returned column values.
pub trait FromSql<'a> : Sized {
    /**
        Converts, if possible, the value in the column at `pos` into the requested
        type and returns the instance of it. Returns error if the conversion fails
        or conversion from the type of the column into a requested type is not defined.
    */
    fn value(row: &'a Row<'a>, pos: usize) -> Result<Self>;
}

macro_rules! impl_from_value {
    ($($t:ty),+) => {
        $(
            impl<'a> FromSql<'a> for $t {
                fn value(row: &'a Row<'a>, pos: usize) -> Result<Self> {
                    <$t>::from_value(row.value_at(pos), row.codec())
                }
            }
        )+
    };
}

impl_from_value!{ i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64, bool }
impl_from_value!{ Number, NaiveDateTime, NaiveDate, DateTime<FixedOffset>, DateTime<Utc>, Duration }
impl_from_value!{ Value, Object, Collection }

impl<'a> FromSql<'a> for String {
    fn value(row: &'a Row<'a>, pos: usize) -> Result<Self> {
        match row.value_at(pos) {
            Value::Lob(locator) => Lob::new(row.conn(), locator.clone(), row.ctx().clone()).read_text(),
            val => String::from_value(val, row.codec()),
        }
    }
}

impl<'a> FromSql<'a> for Vec<u8> {
    fn value(row: &'a Row<'a>, pos: usize) -> Result<Self> {
        match row.value_at(pos) {
            Value::Lob(locator) => Lob::new(row.conn(), locator.clone(), row.ctx().clone()).read_to_vec(),
            val => Vec::<u8>::from_value(val, row.codec()),
        }
    }
}

impl<'a> FromSql<'a> for &'a str {
    fn value(row: &'a Row<'a>, pos: usize) -> Result<Self> {
        match row.value_at(pos) {
            Value::Text(txt)    => Ok(txt.as_str()),
            Value::RowId(rowid) => Ok(rowid.as_str()),
            val => mismatch(val, "&str"),
        }
    }
}

impl<'a> FromSql<'a> for &'a [u8] {
    fn value(row: &'a Row<'a>, pos: usize) -> Result<Self> {
        match row.value_at(pos) {
            Value::Bytes(bytes) => Ok(bytes.as_slice()),
            val => mismatch(val, "&[u8]"),
        }
    }
}

impl<'a> FromSql<'a> for Lob<'a> {
    fn value(row: &'a Row<'a>, pos: usize) -> Result<Self> {
        match row.value_at(pos) {
            Value::Lob(locator) => Ok(Lob::new(row.conn(), locator.clone(), row.ctx().clone())),
            val => mismatch(val, "LOB"),
        }
    }
}

impl<'a> FromSql<'a> for Cursor<'a> {
    fn value(row: &'a Row<'a>, pos: usize) -> Result<Self> {
        match row.value_at(pos) {
            Value::Cursor(cursor) => row.cursor(cursor.id),
            val => mismatch(val, "cursor"),
        }
    }
}
