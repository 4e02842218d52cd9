use super::{Params, ToSql};
use crate::Result;

impl_scalar_to_sql!{ Vec<u8> }

impl ToSql for &[u8] {
    fn bind_to(&mut self, pos: usize, params: &mut Params) -> Result<usize> {
        params.bind_in(pos, *self)?;
        Ok(pos + 1)
    }
}

impl ToSql for &&[u8] {
    fn bind_to(&mut self, pos: usize, params: &mut Params) -> Result<usize> {
        params.bind_in(pos, **self)?;
        Ok(pos + 1)
    }
}

impl ToSql for Option<&[u8]> {
    fn bind_to(&mut self, pos: usize, params: &mut Params) -> Result<usize> {
        params.bind_in(pos, &*self)?;
        Ok(pos + 1)
    }
}
