//! Session Pool

pub(crate) mod session;

use session::{PooledSession, has_expired};
use crate::{
    Connection, ConnectionParams, Context, Error, Result,
    conn::TypeCache,
    native::Client,
};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Weak},
    time::Instant,
};

/// Snapshot of the pool counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Sessions that exist, idle or busy
    pub open: usize,
    /// Sessions lent to callers
    pub busy: usize,
    /// Sessions waiting in the pool
    pub idle: usize,
    /// Callers waiting for a session
    pub waiting: usize,
    pub min: usize,
    pub max: usize,
}

#[derive(Default)]
struct PoolState {
    /// Idle sessions by connection class. The oldest are at the front.
    idle: HashMap<String, VecDeque<PooledSession>>,
    open: usize,
    /// Slots reserved for sessions that are being created
    pending: usize,
    busy: usize,
    waiting: usize,
    closed: bool,
}

impl PoolState {
    fn idle_count(&self) -> usize {
        self.idle.values().map(VecDeque::len).sum()
    }

    fn park(&mut self, session: PooledSession) {
        self.idle.entry(session.class.clone()).or_default().push_back(session);
    }

    /// Takes the oldest idle session of a class other than `class`.
    fn take_other(&mut self, class: &str) -> Option<PooledSession> {
        self.idle.iter_mut()
            .filter(|(name, _)| name.as_str() != class)
            .filter_map(|(_, queue)| {
                let last_used = queue.front()?.last_used;
                Some((last_used, queue))
            })
            .min_by_key(|(last_used, _)| *last_used)
            .and_then(|(_, queue)| queue.pop_front())
    }
}

fn close_all(sessions: Vec<PooledSession>) {
    for session in sessions {
        session.close();
    }
}

/// State shared by the pool and the connections it lends.
pub(crate) struct PoolShared {
    client: Arc<dyn Client>,
    params: ConnectionParams,
    state: Mutex<PoolState>,
    available: Condvar,
    types: Arc<TypeCache>,
}

impl PoolShared {
    pub(crate) fn params(&self) -> &ConnectionParams {
        &self.params
    }

    pub(crate) fn types(&self) -> Arc<TypeCache> {
        self.types.clone()
    }

    /**
        Removes idle sessions that are past their lifetime, and then the sessions
        that were idle for too long while the pool is above its minimum size.
        Returns the removed sessions, which the caller closes once the lock is released.
    */
    fn evict_expired(&self, state: &mut PoolState) -> Vec<PooledSession> {
        let now = Instant::now();
        let max_lifetime = self.params.max_lifetime();
        let session_timeout = self.params.session_timeout();
        let mut evicted = Vec::new();
        for queue in state.idle.values_mut() {
            let mut ix = 0;
            while ix < queue.len() {
                if has_expired(queue[ix].created, max_lifetime, now) {
                    evicted.extend(queue.remove(ix));
                } else {
                    ix += 1;
                }
            }
        }
        let retired = evicted.len();
        state.open -= retired;

        let min_sessions = self.params.min_sessions();
        while state.open > min_sessions {
            let oldest = state.idle.values_mut()
                .filter(|queue| queue.front().map_or(false, |session| has_expired(session.last_used, session_timeout, now)))
                .min_by_key(|queue| queue.front().map(|session| session.last_used));
            match oldest.and_then(VecDeque::pop_front) {
                Some(session) => {
                    evicted.push(session);
                    state.open -= 1;
                }
                None => break,
            }
        }
        if !evicted.is_empty() {
            tracing::warn!(retired, idle = evicted.len() - retired, open = state.open, "evicted expired sessions");
        }
        evicted
    }

    /// Creates up to `count` sessions. The first one must succeed, the rest are best effort.
    fn create(&self, count: usize, class: &str) -> Result<Vec<PooledSession>> {
        let mut sessions = vec![PooledSession::open(self.client.as_ref(), &self.params, class)?];
        for _ in 1..count {
            match PooledSession::open(self.client.as_ref(), &self.params, class) {
                Ok(session) => sessions.push(session),
                Err(err) => {
                    tracing::warn!(class, %err, "cannot create an additional session");
                    break;
                }
            }
        }
        Ok(sessions)
    }

    /**
        Lends a session of the given class to the caller, waiting for one when the
        pool is at capacity.
    */
    pub(crate) fn acquire(self: &Arc<Self>, ctx: &Context, class: &str) -> Result<Connection> {
        let wait_timeout = self.params.wait_timeout();
        let pool_deadline = Instant::now() + wait_timeout;
        let (deadline, ctx_bound) = match ctx.deadline() {
            Some(ctx_deadline) if ctx_deadline < pool_deadline => (ctx_deadline, true),
            _ => (pool_deadline, false),
        };
        let pool = Arc::downgrade(self);
        let _hook = ctx.on_cancel(move || {
            if let Some(pool) = Weak::upgrade(&pool) {
                let _state = pool.state.lock();
                pool.available.notify_all();
            }
        });

        let mut failed_validations = 0;
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(Error::PoolClosed);
            }
            ctx.check()?;

            let expired = self.evict_expired(&mut state);
            if !expired.is_empty() {
                MutexGuard::unlocked(&mut state, || close_all(expired));
                continue;
            }

            if let Some(mut session) = state.idle.get_mut(class).and_then(VecDeque::pop_back) {
                state.busy += 1;
                if session.needs_validation {
                    if let Err(err) = MutexGuard::unlocked(&mut state, || session.validate()) {
                        tracing::warn!(class, %err, "session failed validation");
                        state.busy -= 1;
                        state.open -= 1;
                        MutexGuard::unlocked(&mut state, || session.close());
                        self.available.notify_all();
                        failed_validations += 1;
                        if failed_validations >= self.params.acquire_attempts() {
                            return Err(err);
                        }
                        continue;
                    }
                }
                return Ok(Connection::pooled(self, session));
            }

            let max_sessions = self.params.max_sessions();
            if state.open + state.pending < max_sessions {
                let room = max_sessions - state.open - state.pending;
                let count = self.params.session_increment().min(room).max(1);
                state.pending += count;
                let created = MutexGuard::unlocked(&mut state, || self.create(count, class));
                state.pending -= count;
                let mut sessions = match created {
                    Ok(sessions) => sessions,
                    Err(err) => {
                        self.available.notify_all();
                        return Err(err);
                    }
                };
                state.open += sessions.len();
                tracing::debug!(class, created = sessions.len(), open = state.open, "pool grew");
                if state.closed {
                    state.open -= sessions.len();
                    drop(state);
                    close_all(sessions);
                    return Err(Error::PoolClosed);
                }
                let session = sessions.pop();
                for extra in sessions {
                    state.park(extra);
                }
                self.available.notify_all();
                match session {
                    Some(session) if ctx.check().is_ok() => {
                        state.busy += 1;
                        return Ok(Connection::pooled(self, session));
                    }
                    Some(session) => state.park(session),
                    None => {}
                }
                continue;
            }

            if let Some(session) = state.take_other(class) {
                tracing::debug!(class, retired = %session.class, "retiring idle session of another class");
                state.open -= 1;
                MutexGuard::unlocked(&mut state, || session.close());
                continue;
            }

            state.waiting += 1;
            let timed_out = self.available.wait_until(&mut state, deadline).timed_out();
            state.waiting -= 1;
            if state.closed {
                return Err(Error::Canceled);
            }
            if timed_out && Instant::now() >= deadline {
                ctx.check()?;
                return Err(if ctx_bound { Error::DeadlineExceeded } else { Error::PoolExhausted(wait_timeout) });
            }
        }
    }

    /// Takes a session back from a connection.
    pub(crate) fn release(&self, mut session: PooledSession, invalid: bool, in_txn: bool) {
        let reusable = !invalid
            && !self.state.lock().closed
            && !has_expired(session.created, self.params.max_lifetime(), Instant::now());
        let keep = reusable && match session.recycle(&self.params, in_txn) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(class = %session.class, %err, "session reset failed, closing the session");
                false
            }
        };
        let mut state = self.state.lock();
        state.busy -= 1;
        let discarded = if keep && !state.closed {
            state.park(session);
            None
        } else {
            state.open -= 1;
            Some(session)
        };
        let expired = self.evict_expired(&mut state);
        drop(state);
        self.available.notify_all();
        if let Some(session) = discarded {
            session.close();
        }
        close_all(expired);
    }

    fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        PoolStats {
            open: state.open,
            busy: state.busy,
            idle: state.idle_count(),
            waiting: state.waiting,
            min: self.params.min_sessions(),
            max: self.params.max_sessions(),
        }
    }

    fn shutdown(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        let idle : Vec<PooledSession> = state.idle.drain().flat_map(|(_, queue)| queue).collect();
        state.open -= idle.len();
        drop(state);
        self.available.notify_all();
        tracing::debug!(closed = idle.len(), "pool shut down");
        close_all(idle);
    }
}

/**
    Session pool creates and maintains a group of sessions to the database.

    These sessions are provided to the application as requested. If no sessions are
    available, new ones may be created. Thus, the number of sessions in the pool can
    increase dynamically up to the configured maximum. When the application is done
    with the session, it is returned to the pool by dropping the connection.

    # Example

    ```
    use augur::{Context, ConnectionParams};
    use augur::native::scripted::ScriptedServer;

    let oracle = augur::env(ScriptedServer::new());
    let params = ConnectionParams::builder()
        .connect_string("scripted")
        .min_sessions(1)
        .max_sessions(4)
        .build()?;
    let pool = oracle.create_session_pool(&params)?;
    assert_eq!(pool.stats().open, 1);

    let conn = pool.get_session(&Context::background())?;
    conn.ping()?;
    assert_eq!(pool.stats().busy, 1);

    drop(conn);
    assert_eq!(pool.stats().idle, 1);
    # Ok::<(),augur::Error>(())
    ```
*/
pub struct SessionPool {
    shared: Arc<PoolShared>,
}

impl Drop for SessionPool {
    fn drop(&mut self) {
        self.shared.shutdown();
    }
}

impl SessionPool {
    /// Creates the pool and opens its minimum number of sessions.
    pub(crate) fn new(client: Arc<dyn Client>, params: &ConnectionParams) -> Result<Self> {
        let shared = Arc::new(PoolShared {
            client,
            params: params.clone(),
            state: Mutex::new(PoolState::default()),
            available: Condvar::new(),
            types: Arc::new(TypeCache::default()),
        });
        let class = params.conn_class();
        let mut warm = Vec::with_capacity(params.min_sessions());
        for _ in 0..params.min_sessions() {
            match PooledSession::open_with_retries(shared.client.as_ref(), params, class) {
                Ok(session) => warm.push(session),
                Err(err) => tracing::warn!(class, %err, "cannot open an initial session"),
            }
        }
        {
            let mut state = shared.state.lock();
            state.open = warm.len();
            for session in warm {
                state.park(session);
            }
        }
        tracing::debug!(class, open = shared.stats().open, min = params.min_sessions(), max = params.max_sessions(), "pool created");
        Ok(Self { shared })
    }

    #[cfg(feature="nonblocking")]
    pub(crate) fn shared(&self) -> &Arc<PoolShared> {
        &self.shared
    }

    /// Returns the parameters the pool was created with.
    pub fn params(&self) -> &ConnectionParams {
        &self.shared.params
    }

    /**
        Returns a session of the default connection class.

        Fails with `PoolExhausted` when no session became available within the wait
        timeout, with `Canceled` or `DeadlineExceeded` when the context ends first,
        and with `PoolClosed` after the pool was shut down.
    */
    pub fn get_session(&self, ctx: &Context) -> Result<Connection> {
        self.shared.acquire(ctx, self.shared.params.conn_class())
    }

    /**
        Returns a session of the specified connection class.

        # Example

        ```
        use augur::{Context, ColumnInfo, ColumnType, ConnectionParams, Value};
        use augur::native::scripted::{ScriptedServer, Reply};

        let server = ScriptedServer::new();
        server.on("SELECT class FROM session", |call| {
            let class = call.conn_class().to_string();
            Ok(Reply::rows(vec![ColumnInfo::new("CLASS", ColumnType::Varchar)], vec![vec![Value::Text(class)]]))
        });
        let oracle = augur::env(server);
        let params = ConnectionParams::builder().connect_string("scripted").min_sessions(0).build()?;
        let pool = oracle.create_session_pool(&params)?;

        let conn = pool.get_session_for(&Context::background(), "REPORTS")?;
        let stmt = conn.prepare("SELECT class FROM session")?;
        let row = stmt.query_single(())?.unwrap();
        let class : Option<&str> = row.get(0)?;
        assert_eq!(class, Some("REPORTS"));
        # Ok::<(),augur::Error>(())
        ```
    */
    pub fn get_session_for(&self, ctx: &Context, conn_class: &str) -> Result<Connection> {
        self.shared.acquire(ctx, conn_class)
    }

    /// Returns the current pool counters.
    pub fn stats(&self) -> PoolStats {
        self.shared.stats()
    }

    /**
        Closes idle sessions and wakes callers waiting for a session with `Canceled`.
        Later requests fail with `PoolClosed`. Sessions that are in use are closed
        when they are returned.
    */
    pub fn shutdown(&self) {
        self.shared.shutdown();
    }
}
