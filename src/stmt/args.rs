//! SQL statement arguments

use super::bind::Params;
use crate::Result;

/// Implements `ToSql` for an owned scalar type, references to it, its `Option`,
/// and the mutable references that are bound as IN/OUT arguments.
macro_rules! impl_scalar_to_sql {
    ($($t:ty),+) => {
        $(
            impl ToSql for $t {
                fn bind_to(&mut self, pos: usize, params: &mut Params) -> Result<usize> {
                    params.bind_in(pos, &*self)?;
                    Ok(pos + 1)
                }
            }
            impl ToSql for &$t {
                fn bind_to(&mut self, pos: usize, params: &mut Params) -> Result<usize> {
                    params.bind_in(pos, *self)?;
                    Ok(pos + 1)
                }
            }
            impl ToSql for Option<$t> {
                fn bind_to(&mut self, pos: usize, params: &mut Params) -> Result<usize> {
                    params.bind_in(pos, &*self)?;
                    Ok(pos + 1)
                }
            }
            impl ToSql for Option<&$t> {
                fn bind_to(&mut self, pos: usize, params: &mut Params) -> Result<usize> {
                    params.bind_in(pos, &*self)?;
                    Ok(pos + 1)
                }
            }
            impl ToSql for &Option<$t> {
                fn bind_to(&mut self, pos: usize, params: &mut Params) -> Result<usize> {
                    params.bind_in(pos, *self)?;
                    Ok(pos + 1)
                }
            }
            impl ToSql for &mut $t {
                fn bind_to(&mut self, pos: usize, params: &mut Params) -> Result<usize> {
                    params.bind_inout(pos, &**self)?;
                    Ok(pos + 1)
                }
                fn update_from_bind(&mut self, pos: usize, params: &Params) -> Result<usize> {
                    if let Some(val) = params.out_value(pos) {
                        **self = <$t as $crate::types::FromValue>::from_value(val, params.codec())?;
                    }
                    Ok(pos + 1)
                }
            }
            impl ToSql for &mut Option<$t> {
                fn bind_to(&mut self, pos: usize, params: &mut Params) -> Result<usize> {
                    params.bind_inout(pos, &**self)?;
                    Ok(pos + 1)
                }
                fn update_from_bind(&mut self, pos: usize, params: &Params) -> Result<usize> {
                    if let Some(val) = params.out_value(pos) {
                        **self = <Option<$t> as $crate::types::FromValue>::from_value(val, params.codec())?;
                    }
                    Ok(pos + 1)
                }
            }
        )+
    };
}

mod num;
mod str;
mod bin;
mod time;
mod array;

/// A trait for types that can be used as SQL arguments
pub trait ToSql : Send {
    /**
    Binds itself to the SQL parameter placeholder

    # Parameters

    - `pos` - zero-based index of the parameter placeholder to which the value will be bound
    - `params` - Statement parameters as defined in the SQL

    Note that the specified position might be ignored if the argument also provides the specific
    placeholder name to which the value should be bound.

    # Returns

    The index of the placeholder for the next argument.
    */
    fn bind_to(&mut self, pos: usize, params: &mut Params) -> Result<usize>;

    /**
    Takes the value the server returned into the OUT parameter.

    This is only applicable to arguments that were bound as mutable references.
    Returns the index of the placeholder for the next argument.
    */
    fn update_from_bind(&mut self, pos: usize, _params: &Params) -> Result<usize> {
        Ok(pos + 1)
    }
}

impl ToSql for () {
    fn bind_to(&mut self, pos: usize, _params: &mut Params) -> Result<usize> {
        Ok(pos)
    }

    fn update_from_bind(&mut self, pos: usize, _params: &Params) -> Result<usize> {
        Ok(pos)
    }
}

impl_scalar_to_sql!{ crate::types::Value, crate::types::Object, crate::types::Collection }

impl<T> ToSql for (&str, T) where T: ToSql {
    fn bind_to(&mut self, pos: usize, params: &mut Params) -> Result<usize> {
        let idx = params.index_of(self.0)?;
        params.enter_named()?;
        let res = self.1.bind_to(idx, params);
        params.leave_named();
        res?;
        Ok(pos)
    }

    fn update_from_bind(&mut self, pos: usize, params: &Params) -> Result<usize> {
        let idx = params.index_of(self.0)?;
        self.1.update_from_bind(idx, params)?;
        Ok(pos)
    }
}

impl<T1,T2> ToSql for ((&str, T1), (&str, T2)) where T1: ToSql, T2: ToSql {
    fn bind_to(&mut self, pos: usize, params: &mut Params) -> Result<usize> {
        self.0.bind_to(pos, params)?;
        self.1.bind_to(pos, params)?;
        Ok(pos)
    }

    fn update_from_bind(&mut self, pos: usize, params: &Params) -> Result<usize> {
        self.0.update_from_bind(pos, params)?;
        self.1.update_from_bind(pos, params)?;
        Ok(pos)
    }
}

macro_rules! impl_tuple_args {
    ($head:ident $($tail:ident)+) => {
        impl<$head $(, $tail)*> ToSql for ($head $(, $tail)*) where $head: ToSql $(, $tail: ToSql)* {
            #[allow(non_snake_case)]
            fn bind_to(&mut self, pos: usize, params: &mut Params) -> Result<usize> {
                let (ref mut $head $(, ref mut $tail)*) = *self;
                let pos = $head.bind_to(pos, params)?;
                $(
                    let pos = $tail.bind_to(pos, params)?;
                )*
                Ok(pos)
            }
            #[allow(non_snake_case)]
            fn update_from_bind(&mut self, pos: usize, params: &Params) -> Result<usize> {
                let (ref mut $head $(, ref mut $tail)*) = *self;
                let pos = $head.update_from_bind(pos, params)?;
                $(
                    let pos = $tail.update_from_bind(pos, params)?;
                )*
                Ok(pos)
            }
        }
    };
}

impl_tuple_args! { A B C }
impl_tuple_args! { A B C D }
impl_tuple_args! { A B C D E }
impl_tuple_args! { A B C D E F }
impl_tuple_args! { A B C D E F G }
impl_tuple_args! { A B C D E F G H }
impl_tuple_args! { A B C D E F G H I }
impl_tuple_args! { A B C D E F G H I J }
impl_tuple_args! { A B C D E F G H I J K }
impl_tuple_args! { A B C D E F G H I J K L }
impl_tuple_args! { A B C D E F G H I J K L M }
impl_tuple_args! { A B C D E F G H I J K L M N }
impl_tuple_args! { A B C D E F G H I J K L M N O }
impl_tuple_args! { A B C D E F G H I J K L M N O P }
