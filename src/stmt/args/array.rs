//! PL/SQL index-by table arguments

use super::{Params, ToSql};
use crate::{
    Result,
    native::Direction,
    types::{FromValue, Number, Value, conv::mismatch},
};
use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime};

macro_rules! impl_array_to_sql {
    ($($t:ty),+) => {
        $(
            impl ToSql for &[$t] {
                fn bind_to(&mut self, pos: usize, params: &mut Params) -> Result<usize> {
                    params.bind_array(pos, &self[..], Direction::In)?;
                    Ok(pos + 1)
                }
            }
            impl<const N: usize> ToSql for &[$t; N] {
                fn bind_to(&mut self, pos: usize, params: &mut Params) -> Result<usize> {
                    params.bind_array(pos, &self[..], Direction::In)?;
                    Ok(pos + 1)
                }
            }
            impl ToSql for Vec<$t> {
                fn bind_to(&mut self, pos: usize, params: &mut Params) -> Result<usize> {
                    params.bind_array(pos, &self[..], Direction::In)?;
                    Ok(pos + 1)
                }
            }
            impl ToSql for &Vec<$t> {
                fn bind_to(&mut self, pos: usize, params: &mut Params) -> Result<usize> {
                    params.bind_array(pos, &self[..], Direction::In)?;
                    Ok(pos + 1)
                }
            }
            impl ToSql for &mut Vec<$t> {
                fn bind_to(&mut self, pos: usize, params: &mut Params) -> Result<usize> {
                    params.bind_array(pos, &self[..], Direction::InOut)?;
                    Ok(pos + 1)
                }
                fn update_from_bind(&mut self, pos: usize, params: &Params) -> Result<usize> {
                    match params.out_value(pos) {
                        Some(Value::Array(items)) => {
                            **self = items.iter().map(|item| <$t>::from_value(item, params.codec())).collect::<Result<_>>()?;
                        }
                        Some(Value::Null) | None => {}
                        Some(val) => return mismatch(val, "array"),
                    }
                    Ok(pos + 1)
                }
            }
        )+
    };
}

impl_array_to_sql!{ i8, i16, i32, i64, isize, u16, u32, u64, usize, f32, f64, bool }
impl_array_to_sql!{ String, Number, NaiveDateTime, DateTime<FixedOffset>, Duration, Value }

impl ToSql for &[&str] {
    fn bind_to(&mut self, pos: usize, params: &mut Params) -> Result<usize> {
        params.bind_array(pos, &self[..], Direction::In)?;
        Ok(pos + 1)
    }
}

impl<const N: usize> ToSql for &[&str; N] {
    fn bind_to(&mut self, pos: usize, params: &mut Params) -> Result<usize> {
        params.bind_array(pos, &self[..], Direction::In)?;
        Ok(pos + 1)
    }
}

impl ToSql for Vec<&str> {
    fn bind_to(&mut self, pos: usize, params: &mut Params) -> Result<usize> {
        params.bind_array(pos, &self[..], Direction::In)?;
        Ok(pos + 1)
    }
}
