//! User Session

use crate::{
    ConnectionParams, Context, Error, Result, Statement,
    err::{CALL_TIMEOUT, USER_CANCEL},
    native::{BindSlot, Breaker, Client, Direction, ExecMode, ExecuteRequest, ExecuteResponse, NativeSession, SessionAttr, ShutdownMode, StartupMode},
    pool::{PoolShared, session::PooledSession},
    types::{CursorId, LobKind, LobLocator, ObjectType, Value},
};
use chrono::{FixedOffset, Offset, Utc};
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    io::Write,
    sync::{Arc, Weak, atomic::{AtomicBool, Ordering}},
    time::Duration,
};

/// Object types described so far, by name
#[derive(Default)]
pub(crate) struct TypeCache {
    types: Mutex<HashMap<String, Arc<ObjectType>>>,
}

impl TypeCache {
    fn get(&self, name: &str) -> Option<Arc<ObjectType>> {
        self.types.lock().get(name).cloned()
    }

    fn insert(&self, otype: ObjectType) -> Arc<ObjectType> {
        self.types.lock().entry(otype.name().to_string()).or_insert_with(|| Arc::new(otype)).clone()
    }
}

/**
    Represents a user session.

    A connection owns one physical session. A pooled connection returns its session
    to the pool when it is dropped, a standalone one logs off.
*/
pub struct Connection {
    session: Mutex<Option<PooledSession>>,
    breaker: Arc<dyn Breaker>,
    invalid: AtomicBool,
    needs_validation: AtomicBool,
    in_txn: AtomicBool,
    pool: Option<Weak<PoolShared>>,
    types: Arc<TypeCache>,
    timezone: Option<FixedOffset>,
    ctx: Mutex<Context>,
}

impl Drop for Connection {
    fn drop(&mut self) {
        let session = self.session.get_mut().take();
        if let Some(mut session) = session {
            let invalid = *self.invalid.get_mut();
            let in_txn = *self.in_txn.get_mut();
            session.needs_validation |= *self.needs_validation.get_mut();
            match self.pool.as_ref().and_then(Weak::upgrade) {
                Some(pool) => pool.release(session, invalid, in_txn),
                None => {
                    if in_txn && !invalid {
                        session.native.set_call_timeout(None).ok();
                        if let Err(err) = session.native.rollback() {
                            tracing::warn!(%err, "rollback of an abandoned transaction failed");
                        }
                    }
                    session.close();
                }
            }
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("pooled", &self.pool.is_some())
            .field("valid", &self.is_valid())
            .finish()
    }
}

impl Connection {
    fn new(session: PooledSession, pool: Option<Weak<PoolShared>>, types: Arc<TypeCache>, timezone: Option<FixedOffset>) -> Self {
        let breaker = session.native.breaker();
        Self {
            breaker,
            invalid: AtomicBool::new(false),
            needs_validation: AtomicBool::new(false),
            in_txn: AtomicBool::new(false),
            session: Mutex::new(Some(session)),
            pool, types, timezone,
            ctx: Mutex::new(Context::background()),
        }
    }

    /// Opens a session that is not managed by a pool.
    pub(crate) fn standalone(client: &dyn Client, params: &ConnectionParams, types: Arc<TypeCache>) -> Result<Self> {
        let session = PooledSession::open(client, params, params.conn_class())?;
        Ok(Self::new(session, None, types, params.timezone()))
    }

    /// Wraps a session lent by the pool.
    pub(crate) fn pooled(pool: &Arc<PoolShared>, session: PooledSession) -> Self {
        Self::new(session, Some(Arc::downgrade(pool)), pool.types(), pool.params().timezone())
    }

    /**
        Runs one native call. The call is bounded by the context deadline and is
        interrupted when the context is canceled.
    */
    fn call<T>(&self, ctx: &Context, f: impl FnOnce(&mut dyn NativeSession) -> Result<T>) -> Result<T> {
        ctx.check()?;
        if self.invalid.load(Ordering::Acquire) {
            return Err(Error::SessionInvalid("the session was lost after a fatal error".to_string()));
        }
        let mut guard = self.session.lock();
        let session = guard.as_mut().ok_or_else(|| Error::SessionInvalid("the connection is closed".to_string()))?;
        let timeout = match ctx.remaining() {
            Some(remaining) if remaining < Duration::from_millis(1) => return Err(Error::DeadlineExceeded),
            remaining => remaining,
        };
        session.native.set_call_timeout(timeout)?;
        // A break that arrived between calls must not hit this one.
        self.breaker.reset();
        let breaker = self.breaker.clone();
        let _hook = ctx.on_cancel(move || breaker.break_call());
        ctx.check()?;
        f(session.native.as_mut()).map_err(|err| self.classify(ctx, err))
    }

    fn classify(&self, ctx: &Context, err: Error) -> Error {
        match err.code() {
            Some(USER_CANCEL) => {
                self.needs_validation.store(true, Ordering::Release);
                if ctx.is_expired() && !ctx.is_canceled() { Error::DeadlineExceeded } else { Error::Canceled }
            }
            Some(CALL_TIMEOUT) => {
                self.needs_validation.store(true, Ordering::Release);
                Error::DeadlineExceeded
            }
            _ if err.is_session_fatal() => {
                tracing::warn!(%err, "session lost");
                self.invalid.store(true, Ordering::Release);
                err
            }
            _ => err,
        }
    }

    pub(crate) fn execute(&self, ctx: &Context, req: ExecuteRequest) -> Result<ExecuteResponse> {
        self.call(ctx, |session| session.execute(req))
    }

    pub(crate) fn fetch(&self, ctx: &Context, cursor: CursorId, max_rows: usize) -> Result<Vec<Vec<Value>>> {
        self.call(ctx, |session| session.fetch(cursor, max_rows))
    }

    pub(crate) fn close_cursor(&self, cursor: CursorId) {
        if let Some(session) = self.session.lock().as_mut() {
            session.native.close_cursor(cursor);
        }
    }

    pub(crate) fn lob_create_temp(&self, ctx: &Context, kind: LobKind) -> Result<LobLocator> {
        self.call(ctx, |session| session.lob_create_temp(kind))
    }

    pub(crate) fn lob_read(&self, ctx: &Context, lob: &LobLocator, offset: u64, amount: usize) -> Result<Vec<u8>> {
        self.call(ctx, |session| session.lob_read(lob, offset, amount))
    }

    pub(crate) fn lob_write(&self, ctx: &Context, lob: &LobLocator, offset: u64, data: &[u8]) -> Result<usize> {
        self.call(ctx, |session| session.lob_write(lob, offset, data))
    }

    pub(crate) fn lob_len(&self, ctx: &Context, lob: &LobLocator) -> Result<u64> {
        self.call(ctx, |session| session.lob_len(lob))
    }

    pub(crate) fn lob_free(&self, ctx: &Context, lob: &LobLocator) -> Result<()> {
        self.call(ctx, |session| session.lob_free(lob))
    }

    pub(crate) fn mark_in_txn(&self) {
        self.in_txn.store(true, Ordering::Release);
    }

    /// Returns the context that new statements of this connection inherit.
    pub fn context(&self) -> Context {
        self.ctx.lock().clone()
    }

    /// Sets the context that new statements of this connection inherit and that governs
    /// connection level calls, such as `commit` or `ping`.
    pub fn set_context(&self, ctx: &Context) {
        *self.ctx.lock() = ctx.clone();
    }

    /// Returns `false` once the session was found dead.
    pub fn is_valid(&self) -> bool {
        !self.invalid.load(Ordering::Acquire) && self.session.lock().is_some()
    }

    /// Returns `true` if statements that might have changed data were executed since the last commit or rollback.
    pub fn in_transaction(&self) -> bool {
        self.in_txn.load(Ordering::Acquire)
    }

    /// Returns the number of round trips this session has made to the server.
    pub fn round_trips(&self) -> u64 {
        self.session.lock().as_ref().map_or(0, |session| session.native.round_trips())
    }

    /**
        Returns the time zone naive timestamps are interpreted in. This is the
        configured time zone, if there is one, or the session time zone.
    */
    pub fn timezone(&self) -> FixedOffset {
        self.timezone.unwrap_or_else(|| {
            self.session.lock().as_ref().map_or_else(|| Utc.fix(), |session| session.native.timezone())
        })
    }

    /// Confirms that the connection and the server are active.
    pub fn ping(&self) -> Result<()> {
        let ctx = self.context();
        self.call(&ctx, |session| session.ping())
    }

    /**
        Prepares SQL or PL/SQL statement for execution.

        # Example

        ```
        use augur::{ColumnInfo, ColumnType, ConnectionParams, Value};
        use augur::native::scripted::{ScriptedServer, Reply};

        let server = ScriptedServer::new();
        server.on("WHERE hire_date_rank = 1", |_| {
            Ok(Reply::rows(vec![ColumnInfo::new("EMPLOYEE_ID", ColumnType::Number)], vec![vec![Value::Int(102)]]))
        });
        let oracle = augur::env(server);
        let conn = oracle.connect(&ConnectionParams::builder().connect_string("scripted").build()?)?;
        let stmt = conn.prepare("
            SELECT employee_id
              FROM (
                    SELECT employee_id
                         , row_number() OVER (ORDER BY hire_date) AS hire_date_rank
                      FROM hr.employees
                   )
             WHERE hire_date_rank = 1
        ")?;
        let mut rows = stmt.query(())?;
        let row = rows.next()?.expect("first (and only) row");
        // EMPLOYEE_ID is NOT NULL, so it can be unwrapped safely
        let id : u32 = row.get(0)?.unwrap();
        assert_eq!(id, 102);
        assert!(rows.next()?.is_none());
        # Ok::<(),augur::Error>(())
        ```
    */
    pub fn prepare(&self, sql: &str) -> Result<Statement<'_>> {
        if sql.trim().is_empty() {
            return Err(Error::new("empty statement"));
        }
        Ok(Statement::new(self, sql))
    }

    /**
        Commits the current transaction.

        Current transaction is defined as the set of statements executed since
        the last commit or since the beginning of the user session.
    */
    pub fn commit(&self) -> Result<()> {
        let ctx = self.context();
        self.call(&ctx, |session| session.commit())?;
        self.in_txn.store(false, Ordering::Release);
        Ok(())
    }

    /**
        Rolls back the current transaction. The modified or deleted rows are restored
        to their original state, and any locks held by the transaction are released.
    */
    pub fn rollback(&self) -> Result<()> {
        let ctx = self.context();
        self.call(&ctx, |session| session.rollback())?;
        self.in_txn.store(false, Ordering::Release);
        Ok(())
    }

    fn set_attribute(&self, attr: SessionAttr, value: &str) -> Result<()> {
        let mut guard = self.session.lock();
        let session = guard.as_mut().ok_or_else(|| Error::SessionInvalid("the connection is closed".to_string()))?;
        session.native.set_attribute(attr, value)
    }

    /**
        Sets the name of the current module (`V$SESSION.MODULE`) running in the client application.
        When the current module terminates, call with the name of the new module, or use empty
        string if there is no new module. Can be up to 48 bytes long.

        The value is sent to the server with the next round trip.

        # Example

        ```
        use augur::{ColumnInfo, ColumnType, ConnectionParams, Value};
        use augur::native::SessionAttr;
        use augur::native::scripted::{ScriptedServer, Reply};

        let server = ScriptedServer::new();
        server.on("SELECT module FROM v$session", |call| {
            let module = call.attribute(SessionAttr::Module).unwrap_or_default().to_string();
            Ok(Reply::rows(vec![ColumnInfo::new("MODULE", ColumnType::Varchar)], vec![vec![Value::Text(module)]]))
        });
        let oracle = augur::env(server);
        let conn = oracle.connect(&ConnectionParams::builder().connect_string("scripted").build()?)?;
        conn.set_module("augur")?;

        let stmt = conn.prepare("
            SELECT module
              FROM v$session
             WHERE sid = SYS_CONTEXT('USERENV', 'SID')
        ")?;
        let row = stmt.query_single(())?.unwrap();
        let module : &str = row.get(0)?.unwrap();
        assert_eq!(module, "augur");
        # Ok::<(),augur::Error>(())
        ```
    */
    pub fn set_module(&self, name: &str) -> Result<()> {
        self.set_attribute(SessionAttr::Module, name)
    }

    /**
        Sets the name of the current action (`V$SESSION.ACTION`) within the current module.
        Can be up to 32 bytes long.
    */
    pub fn set_action(&self, action: &str) -> Result<()> {
        self.set_attribute(SessionAttr::Action, action)
    }

    /// Sets the user identifier (`V$SESSION.CLIENT_IDENTIFIER`). Can be up to 64 bytes long.
    pub fn set_client_identifier(&self, id: &str) -> Result<()> {
        self.set_attribute(SessionAttr::ClientIdentifier, id)
    }

    /// Sets additional client application information (`V$SESSION.CLIENT_INFO`). Can be up to 64 bytes long.
    pub fn set_client_info(&self, info: &str) -> Result<()> {
        self.set_attribute(SessionAttr::ClientInfo, info)
    }

    /// Enables `DBMS_OUTPUT` buffering in the session, without a limit on the buffer size.
    pub fn enable_dbms_output(&self) -> Result<()> {
        self.run_builtin("BEGIN DBMS_OUTPUT.ENABLE(NULL); END;", Vec::new())?;
        Ok(())
    }

    /**
        Moves the lines that PL/SQL put into the `DBMS_OUTPUT` buffer into `out`.
        Every line is terminated by a new line.

        # Example

        ```
        use augur::ConnectionParams;
        use augur::native::scripted::{ScriptedServer, Reply};

        let server = ScriptedServer::new();
        server.on("BEGIN greet", |call| {
            call.put_line("Hello,");
            call.put_line("World!");
            Ok(Reply::done())
        });
        let oracle = augur::env(server);
        let conn = oracle.connect(&ConnectionParams::builder().connect_string("scripted").build()?)?;

        conn.enable_dbms_output()?;
        conn.prepare("BEGIN greet; END;")?.execute(())?;
        let mut text = Vec::new();
        conn.read_dbms_output(&mut text)?;
        assert_eq!(text, b"Hello,\nWorld!\n");
        # Ok::<(),augur::Error>(())
        ```
    */
    pub fn read_dbms_output(&self, mut out: impl Write) -> Result<()> {
        const MAX_LINES : i64 = 128;
        loop {
            let binds = vec![
                BindSlot { name: "LINES".to_string(), value: Value::Null, dir: Direction::Out },
                BindSlot { name: "NUMLINES".to_string(), value: Value::Int(MAX_LINES), dir: Direction::InOut },
            ];
            let resp = self.run_builtin("BEGIN DBMS_OUTPUT.GET_LINES(:lines, :numlines); END;", binds)?;
            let mut num_lines = 0;
            for (pos, val) in resp.outs {
                match (pos, val) {
                    (0, Value::Array(lines)) => {
                        for line in lines {
                            let res = match line {
                                Value::Text(text) => writeln!(out, "{}", text),
                                _ => writeln!(out),
                            };
                            res.map_err(|err| Error::msg(format!("cannot write DBMS_OUTPUT lines: {}", err)))?;
                        }
                    }
                    (1, Value::Int(n)) => num_lines = n,
                    _ => {}
                }
            }
            if num_lines < MAX_LINES {
                return Ok(());
            }
        }
    }

    /// Executes a call into a built-in package. It neither opens a cursor nor starts a transaction.
    fn run_builtin(&self, sql: &str, binds: Vec<BindSlot>) -> Result<ExecuteResponse> {
        let ctx = self.context();
        self.execute(&ctx, ExecuteRequest { sql, rows: vec![binds], prefetch_rows: 0, mode: ExecMode::Execute })
    }

    /**
        Returns the description of the named object or collection type.

        A type is described by the server once. Later requests, from this or from any
        other connection of the same pool, are answered from the cache.

        # Example

        ```
        use augur::{Attribute, ColumnType, ConnectionParams, ObjectType};
        use augur::native::scripted::ScriptedServer;

        let server = ScriptedServer::new();
        server.define_type(ObjectType::object("HR.ADDRESS", vec![
            Attribute::new("STREET", ColumnType::Varchar),
            Attribute::new("CITY",   ColumnType::Varchar),
        ]));
        let oracle = augur::env(server.clone());
        let conn = oracle.connect(&ConnectionParams::builder().connect_string("scripted").build()?)?;

        let address_type = conn.object_type("hr.address")?;
        let mut address = address_type.new_object()?;
        address.set("city", "Sydney")?;
        assert_eq!(address.get::<String>("CITY")?, "Sydney");

        conn.object_type("HR.ADDRESS")?;
        assert_eq!(server.describe_calls(), 1);
        # Ok::<(),augur::Error>(())
        ```
    */
    pub fn object_type(&self, name: &str) -> Result<Arc<ObjectType>> {
        let key = name.to_uppercase();
        if let Some(otype) = self.types.get(&key) {
            return Ok(otype);
        }
        let ctx = self.context();
        let otype = self.call(&ctx, |session| session.describe_type(&key))?;
        tracing::debug!(name = %key, "object type described");
        Ok(self.types.insert(otype))
    }

    /// Starts the database. Requires a SYSDBA (and usually a preliminary) session.
    pub fn startup(&self, mode: StartupMode) -> Result<()> {
        let ctx = self.context();
        self.call(&ctx, |session| session.startup(mode))
    }

    /// Shuts the database down. Requires a SYSDBA session.
    pub fn shutdown(&self, mode: ShutdownMode) -> Result<()> {
        let ctx = self.context();
        self.call(&ctx, |session| session.shutdown(mode))
    }

    /**
        Interrupts the call that is currently executing on this connection, if any.
        The interrupted call fails with `Canceled`.
    */
    pub fn break_execution(&self) {
        self.breaker.break_call();
    }
}
