//! Physical session as it is kept by the pool

use crate::{
    ConnectionParams, Result,
    native::{Client, ExecMode, ExecuteRequest, NativeSession},
};
use std::{fmt::Write, time::{Duration, Instant}};

/// Builds the statement that applies session-init pairs.
fn init_statement(on_init: &[(String, String)]) -> String {
    let mut sql = String::from("ALTER SESSION SET");
    for (name, value) in on_init {
        let _ = write!(sql, " {}='{}'", name, value.replace('\'', "''"));
    }
    sql
}

/// Returns `true` if `since` is further in the past than `limit`. A zero limit never expires.
pub(crate) fn has_expired(since: Instant, limit: Duration, now: Instant) -> bool {
    !limit.is_zero() && now.saturating_duration_since(since) >= limit
}

/// One physical session together with what the pool needs to know about it.
pub(crate) struct PooledSession {
    pub(crate) native: Box<dyn NativeSession>,
    pub(crate) class: String,
    pub(crate) created: Instant,
    pub(crate) last_used: Instant,
    /// A call was interrupted. The session is pinged before it is handed out again.
    pub(crate) needs_validation: bool,
}

impl PooledSession {
    /// Connects a new session and applies the session-init pairs.
    pub(crate) fn open(client: &dyn Client, params: &ConnectionParams, class: &str) -> Result<Self> {
        let mut native = client.connect(params, class)?;
        if !params.on_init().is_empty() {
            let sql = init_statement(params.on_init());
            if let Err(err) = native.execute(ExecuteRequest { sql: &sql, rows: Vec::new(), prefetch_rows: 0, mode: ExecMode::Execute }) {
                native.close();
                return Err(err);
            }
        }
        let now = Instant::now();
        tracing::debug!(class, "session opened");
        Ok(Self { native, class: class.to_string(), created: now, last_used: now, needs_validation: false })
    }

    /// Connects a new session, retrying failed attempts.
    pub(crate) fn open_with_retries(client: &dyn Client, params: &ConnectionParams, class: &str) -> Result<Self> {
        let attempts = params.connect_retries().max(1);
        let mut attempt = 1;
        loop {
            match Self::open(client, params, class) {
                Ok(session) => return Ok(session),
                Err(err) if attempt < attempts => {
                    tracing::debug!(class, attempt, %err, "session creation failed, retrying");
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Confirms that a session whose call was interrupted is still usable.
    pub(crate) fn validate(&mut self) -> Result<()> {
        self.native.set_call_timeout(None)?;
        self.native.breaker().reset();
        self.native.ping()?;
        self.needs_validation = false;
        Ok(())
    }

    /**
        Prepares a released session for the next caller: rolls back an open
        transaction, restores the session state and re-applies the session-init pairs.
    */
    pub(crate) fn recycle(&mut self, params: &ConnectionParams, in_txn: bool) -> Result<()> {
        self.native.set_call_timeout(None)?;
        self.native.breaker().reset();
        if in_txn {
            self.native.rollback()?;
        }
        self.native.reset()?;
        if !params.on_init().is_empty() {
            let sql = init_statement(params.on_init());
            self.native.execute(ExecuteRequest { sql: &sql, rows: Vec::new(), prefetch_rows: 0, mode: ExecMode::Execute })?;
        }
        self.last_used = Instant::now();
        Ok(())
    }

    /// Logs off.
    pub(crate) fn close(mut self) {
        self.native.close();
        tracing::debug!(class = %self.class, "session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_pairs() {
        let pairs = vec![
            ("NLS_DATE_FORMAT".to_string(), "YYYY-MM-DD".to_string()),
            ("NLS_NUMERIC_CHARACTERS".to_string(), "'.".to_string()),
        ];
        assert_eq!(init_statement(&pairs), "ALTER SESSION SET NLS_DATE_FORMAT='YYYY-MM-DD' NLS_NUMERIC_CHARACTERS='''.'");
    }

    #[test]
    fn expiration() {
        let now = Instant::now();
        let then = now - Duration::from_secs(10);
        assert!(has_expired(then, Duration::from_secs(5), now));
        assert!(!has_expired(then, Duration::from_secs(60), now));
        assert!(!has_expired(then, Duration::ZERO, now));
    }
}
