use super::{Params, ToSql};
use crate::Result;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, Utc};

impl_scalar_to_sql!{ NaiveDateTime, NaiveDate, DateTime<FixedOffset>, DateTime<Utc> }
impl_scalar_to_sql!{ Duration }
