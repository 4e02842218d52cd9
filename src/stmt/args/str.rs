use super::{Params, ToSql};
use crate::Result;

impl_scalar_to_sql!{ String }

impl ToSql for &str {
    fn bind_to(&mut self, pos: usize, params: &mut Params) -> Result<usize> {
        params.bind_in(pos, *self)?;
        Ok(pos + 1)
    }
}

impl ToSql for &&str {
    fn bind_to(&mut self, pos: usize, params: &mut Params) -> Result<usize> {
        params.bind_in(pos, **self)?;
        Ok(pos + 1)
    }
}

impl ToSql for Option<&str> {
    fn bind_to(&mut self, pos: usize, params: &mut Params) -> Result<usize> {
        params.bind_in(pos, &*self)?;
        Ok(pos + 1)
    }
}
