use super::{Params, ToSql};
use crate::{Result, types::Number};

impl_scalar_to_sql!{ i8, i16, i32, i64, isize, u8, u16, u32, u64, usize }
impl_scalar_to_sql!{ f32, f64 }
impl_scalar_to_sql!{ bool }
impl_scalar_to_sql!{ Number }
