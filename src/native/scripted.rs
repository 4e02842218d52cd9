//! In-process server that implements the native session boundary.
//!
//! Statements are answered by handlers registered for SQL text patterns.
//! Sessions keep their own state (NLS parameters, trace attributes, open
//! cursors, temporary LOBs) and count round trips the way a real session does,
//! which makes fetch tuning, session reset and cancellation observable in tests.

use super::{
    Breaker, BindSlot, Client, ExecMode, ExecuteRequest, ExecuteResponse, NativeSession,
    QueryResult, SessionAttr, ShutdownMode, StartupMode,
};
use crate::{
    Error, Result,
    config::{AuthMode, ConnectionParams},
    err::{CALL_TIMEOUT, END_OF_CHANNEL, SESSION_KILLED, USER_CANCEL},
    stmt::ColumnInfo,
    types::{CursorId, LobKind, LobLocator, ObjectType, RefCursor, Value},
};
use chrono::{FixedOffset, Offset, Utc};
use once_cell::sync::Lazy;
use parking_lot::{Condvar, Mutex, RwLock};
use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{Arc, atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering}},
    time::{Duration, Instant},
};

/// Session parameters every new or reset session starts with
static NLS_DEFAULTS : Lazy<Vec<(&'static str, &'static str)>> = Lazy::new(|| vec![
    ("NLS_LANGUAGE",           "AMERICAN"),
    ("NLS_TERRITORY",          "AMERICA"),
    ("NLS_NUMERIC_CHARACTERS", ".,"),
    ("NLS_DATE_FORMAT",        "DD-MON-RR"),
]);

type HandlerFn = dyn Fn(&mut Call) -> Result<Reply> + Send + Sync;

struct Handler {
    pattern: String,
    run: Box<HandlerFn>,
}

struct Account {
    password: String,
    expired: bool,
}

struct LobData {
    kind: LobKind,
    data: Vec<u8>,
    temp_owner: Option<u64>,
}

struct Server {
    handlers:      RwLock<Vec<Arc<Handler>>>,
    accounts:      Mutex<HashMap<String, Account>>,
    types:         Mutex<HashMap<String, ObjectType>>,
    lobs:          Mutex<HashMap<u64, LobData>>,
    nls_overrides: Mutex<HashMap<String, String>>,
    timezone:      Mutex<FixedOffset>,
    killed:        Mutex<HashSet<u64>>,
    up:            AtomicBool,
    next_id:       AtomicU64,
    connects:      AtomicUsize,
    open_sessions: AtomicUsize,
    open_cursors:  AtomicUsize,
    describes:     AtomicUsize,
    resets:        AtomicUsize,
    commits:       AtomicUsize,
    rollbacks:     AtomicUsize,
    fail_connects: AtomicUsize,
    fail_resets:   AtomicUsize,
    connect_delay: Mutex<Duration>,
}

impl Server {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn find_handler(&self, sql: &str) -> Option<Arc<Handler>> {
        let sql = normalize(sql);
        self.handlers.read().iter().find(|handler| sql.contains(&handler.pattern)).cloned()
    }

    fn nls_defaults(&self) -> HashMap<String, String> {
        let mut nls : HashMap<String, String> = NLS_DEFAULTS.iter().map(|&(name, value)| (name.to_string(), value.to_string())).collect();
        let tz = *self.timezone.lock();
        nls.insert("TIME_ZONE".to_string(), tz.to_string());
        for (name, value) in self.nls_overrides.lock().iter() {
            nls.insert(name.clone(), value.clone());
        }
        nls
    }

    fn new_lob(&self, kind: LobKind, data: Vec<u8>, temp_owner: Option<u64>) -> LobLocator {
        let id = self.next_id();
        self.lobs.lock().insert(id, LobData { kind, data, temp_owner });
        LobLocator { id, kind }
    }

    fn lob_data(&self, lob: &LobLocator) -> Result<Vec<u8>> {
        self.lobs.lock().get(&lob.id).map(|lob| lob.data.clone()).ok_or_else(invalid_lob)
    }
}

fn invalid_lob() -> Error {
    Error::backend(22275, "invalid LOB locator specified")
}

fn normalize(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase()
}

/**
    A scripted database server.

    # Example

    ```
    use augur::{Context, ColumnInfo, ColumnType, ConnectionParams, Value};
    use augur::native::scripted::{ScriptedServer, Reply};

    let server = ScriptedServer::new();
    server.on("SELECT :1 * 2 FROM dual", |call| {
        let n : i64 = match call.arg(0) { Value::Int(n) => *n, _ => 0 };
        Ok(Reply::rows(vec![ColumnInfo::new("N", ColumnType::Number)], vec![vec![Value::Int(n * 2)]]))
    });

    let oracle = augur::env(server);
    let params = ConnectionParams::builder().connect_string("scripted").build()?;
    let conn = oracle.connect(&params)?;
    let stmt = conn.prepare("SELECT :1 * 2 FROM dual")?;
    let row = stmt.query_single(21)?.unwrap();
    let n : Option<i64> = row.get(0)?;
    assert_eq!(n, Some(42));
    # Ok::<(),augur::Error>(())
    ```
*/
#[derive(Clone)]
pub struct ScriptedServer {
    inner: Arc<Server>,
}

impl Default for ScriptedServer {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedServer {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Server {
                handlers:      RwLock::new(Vec::new()),
                accounts:      Mutex::new(HashMap::new()),
                types:         Mutex::new(HashMap::new()),
                lobs:          Mutex::new(HashMap::new()),
                nls_overrides: Mutex::new(HashMap::new()),
                timezone:      Mutex::new(Utc.fix()),
                killed:        Mutex::new(HashSet::new()),
                up:            AtomicBool::new(true),
                next_id:       AtomicU64::new(0),
                connects:      AtomicUsize::new(0),
                open_sessions: AtomicUsize::new(0),
                open_cursors:  AtomicUsize::new(0),
                describes:     AtomicUsize::new(0),
                resets:        AtomicUsize::new(0),
                commits:       AtomicUsize::new(0),
                rollbacks:     AtomicUsize::new(0),
                fail_connects: AtomicUsize::new(0),
                fail_resets:   AtomicUsize::new(0),
                connect_delay: Mutex::new(Duration::ZERO),
            })
        }
    }

    /**
        Registers a handler for statements whose text contains `pattern`.
        Whitespace and letter case are ignored. Handlers are tried in the
        order they were registered.
    */
    pub fn on<F>(&self, pattern: &str, handler: F) -> &Self
    where
        F: Fn(&mut Call) -> Result<Reply> + Send + Sync + 'static,
    {
        self.inner.handlers.write().push(Arc::new(Handler { pattern: normalize(pattern), run: Box::new(handler) }));
        self
    }

    /// Adds an account. Once any account exists, connections must authenticate.
    pub fn add_user(&self, username: &str, password: &str) -> &Self {
        self.inner.accounts.lock().insert(username.to_uppercase(), Account { password: password.to_string(), expired: false });
        self
    }

    /// Expires the password of the account. The next logon must supply a new password.
    pub fn expire_password(&self, username: &str) {
        if let Some(account) = self.inner.accounts.lock().get_mut(&username.to_uppercase()) {
            account.expired = true;
        }
    }

    /// Returns the current password of the account
    pub fn password_of(&self, username: &str) -> Option<String> {
        self.inner.accounts.lock().get(&username.to_uppercase()).map(|account| account.password.clone())
    }

    /// Defines an object or collection type that sessions can describe
    pub fn define_type(&self, otype: ObjectType) -> &Self {
        self.inner.types.lock().insert(otype.name().to_string(), otype);
        self
    }

    /// Sets the time zone new sessions start with
    pub fn set_timezone(&self, tz: FixedOffset) {
        *self.inner.timezone.lock() = tz;
    }

    /// Sets the default value of a session parameter
    pub fn set_nls_default(&self, name: &str, value: &str) {
        self.inner.nls_overrides.lock().insert(name.to_uppercase(), value.to_string());
    }

    /// Makes the next `count` connection attempts fail
    pub fn fail_next_connects(&self, count: usize) {
        self.inner.fail_connects.store(count, Ordering::SeqCst);
    }

    /// Makes every following logon take `delay`
    pub fn set_connect_delay(&self, delay: Duration) {
        *self.inner.connect_delay.lock() = delay;
    }

    /// Makes the next `count` session resets fail
    pub fn fail_next_resets(&self, count: usize) {
        self.inner.fail_resets.store(count, Ordering::SeqCst);
    }

    /// Kills the session. Its next round trip fails with ORA-00028.
    pub fn kill_session(&self, session_id: u64) {
        self.inner.killed.lock().insert(session_id);
    }

    /// Creates a persistent LOB, as if it were stored in a table
    pub fn new_lob(&self, kind: LobKind, data: &[u8]) -> Value {
        Value::Lob(self.inner.new_lob(kind, data.to_vec(), None))
    }

    /// Returns the content of the LOB the value refers to
    pub fn lob_data(&self, val: &Value) -> Result<Vec<u8>> {
        match val {
            Value::Lob(lob) => self.inner.lob_data(lob),
            _ => Err(invalid_lob()),
        }
    }

    /// Number of connection attempts so far
    pub fn connects(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    /// Number of sessions that are currently logged on
    pub fn open_sessions(&self) -> usize {
        self.inner.open_sessions.load(Ordering::SeqCst)
    }

    /// Number of cursors that are currently open in all sessions
    pub fn open_cursors(&self) -> usize {
        self.inner.open_cursors.load(Ordering::SeqCst)
    }

    /// Number of temporary LOBs that have not been freed
    pub fn temp_lobs(&self) -> usize {
        self.inner.lobs.lock().values().filter(|lob| lob.temp_owner.is_some()).count()
    }

    /// Number of type descriptions served so far
    pub fn describe_calls(&self) -> usize {
        self.inner.describes.load(Ordering::SeqCst)
    }

    /// Number of session resets so far
    pub fn resets(&self) -> usize {
        self.inner.resets.load(Ordering::SeqCst)
    }

    /// Number of commits so far
    pub fn commits(&self) -> usize {
        self.inner.commits.load(Ordering::SeqCst)
    }

    /// Number of rollbacks so far
    pub fn rollbacks(&self) -> usize {
        self.inner.rollbacks.load(Ordering::SeqCst)
    }

    /// Whether the database is open
    pub fn is_up(&self) -> bool {
        self.inner.up.load(Ordering::SeqCst)
    }
}

impl Client for ScriptedServer {
    fn connect(&self, params: &ConnectionParams, conn_class: &str) -> Result<Box<dyn NativeSession>> {
        let server = &self.inner;
        server.connects.fetch_add(1, Ordering::SeqCst);
        let delay = *server.connect_delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        let failed = server.fail_connects.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failed.is_ok() {
            return Err(Error::backend(12541, "TNS:no listener"));
        }
        if !server.up.load(Ordering::SeqCst) && !params.is_prelim() {
            return Err(Error::backend(1034, "ORACLE not available"));
        }
        {
            let mut accounts = server.accounts.lock();
            if !accounts.is_empty() {
                let account = accounts.get_mut(&params.username().to_uppercase())
                    .filter(|account| account.password == params.password().secret())
                    .ok_or_else(|| Error::backend(1017, "invalid username/password; logon denied"))?;
                if account.expired {
                    match params.new_password() {
                        Some(new_password) => {
                            account.password = new_password.secret().to_string();
                            account.expired = false;
                        }
                        None => return Err(Error::backend(28001, "the password has expired")),
                    }
                }
            }
        }
        let id = server.next_id();
        server.open_sessions.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(session = id, class = conn_class, "scripted session opened");
        Ok(Box::new(ScriptedSession {
            server: server.clone(),
            interrupt: Arc::new(Interrupt::default()),
            state: SessionState {
                id,
                class: conn_class.to_string(),
                username: params.username().to_uppercase(),
                nls: server.nls_defaults(),
                attrs: HashMap::new(),
                cursors: HashMap::new(),
                temp_lobs: Vec::new(),
                txn_mode: None,
                output: None,
                dead: false,
            },
            sysdba: params.auth_mode() == AuthMode::SysDba,
            round_trips: 0,
            call_timeout: None,
            deadline: None,
            closed: false,
        }))
    }
}

#[derive(Default)]
struct Interrupt {
    flag: Mutex<bool>,
    cond: Condvar,
}

impl Breaker for Interrupt {
    fn break_call(&self) {
        *self.flag.lock() = true;
        self.cond.notify_all();
    }

    fn reset(&self) {
        self.clear();
    }
}

impl Interrupt {
    /// Waits for `dur` unless the call is interrupted or runs out of time first.
    fn wait(&self, dur: Duration, deadline: Option<Instant>) -> Result<()> {
        let until = Instant::now() + dur;
        let mut flag = self.flag.lock();
        loop {
            if *flag {
                return Err(Error::backend(USER_CANCEL, "user requested cancel of current operation"));
            }
            let now = Instant::now();
            if deadline.map_or(false, |deadline| now >= deadline) {
                return Err(Error::backend(CALL_TIMEOUT, "OCI call timed out"));
            }
            if now >= until {
                return Ok(());
            }
            let wake = deadline.map_or(until, |deadline| deadline.min(until));
            self.cond.wait_until(&mut flag, wake);
        }
    }

    fn clear(&self) {
        *self.flag.lock() = false;
    }
}

struct ServerCursor {
    rows: VecDeque<Vec<Value>>,
    fetch_delay: Option<Duration>,
}

struct SessionState {
    id: u64,
    class: String,
    username: String,
    nls: HashMap<String, String>,
    attrs: HashMap<SessionAttr, String>,
    cursors: HashMap<CursorId, ServerCursor>,
    temp_lobs: Vec<u64>,
    /// Mode set by `SET TRANSACTION` for the current transaction
    txn_mode: Option<String>,
    /// `DBMS_OUTPUT` buffer, `None` while the output is disabled
    output: Option<VecDeque<String>>,
    dead: bool,
}

impl SessionState {
    fn open_cursor(&mut self, server: &Server, columns: Vec<ColumnInfo>, rows: Vec<Vec<Value>>, fetch_delay: Option<Duration>) -> RefCursor {
        let id = server.next_id();
        self.cursors.insert(id, ServerCursor { rows: rows.into(), fetch_delay });
        server.open_cursors.fetch_add(1, Ordering::SeqCst);
        RefCursor { id, columns: Arc::new(columns) }
    }

    /// Closes the cursor together with the cursors nested in its unfetched rows.
    fn close_cursor(&mut self, server: &Server, id: CursorId) {
        if let Some(cursor) = self.cursors.remove(&id) {
            server.open_cursors.fetch_sub(1, Ordering::SeqCst);
            for val in cursor.rows.iter().flatten() {
                if let Value::Cursor(nested) = val {
                    self.close_cursor(server, nested.id);
                }
            }
        }
    }

    fn close_all(&mut self, server: &Server) {
        let ids : Vec<_> = self.cursors.keys().copied().collect();
        for id in ids {
            self.close_cursor(server, id);
        }
        let mut lobs = server.lobs.lock();
        for id in self.temp_lobs.drain(..) {
            lobs.remove(&id);
        }
    }
}

/**
    A statement execution as seen by a handler.
*/
pub struct Call<'a> {
    sql: &'a str,
    binds: &'a [BindSlot],
    iteration: usize,
    outs: Vec<(usize, Value)>,
    state: &'a mut SessionState,
    server: &'a Server,
    interrupt: &'a Interrupt,
    deadline: Option<Instant>,
}

impl<'a> Call<'a> {
    pub fn sql(&self) -> &str {
        self.sql
    }

    /// Identifier of the session that executes the statement
    pub fn session_id(&self) -> u64 {
        self.state.id
    }

    /// Connection class of the session
    pub fn conn_class(&self) -> &str {
        &self.state.class
    }

    pub fn username(&self) -> &str {
        &self.state.username
    }

    /// Zero-based index of the argument row of an array DML
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Returns all bound parameters
    pub fn args(&self) -> &[BindSlot] {
        self.binds
    }

    /// Returns the value bound to the placeholder at zero-based `pos`
    pub fn arg(&self, pos: usize) -> &Value {
        static NULL : Value = Value::Null;
        self.binds.get(pos).map_or(&NULL, |bind| &bind.value)
    }

    /// Returns the value bound to the named placeholder
    pub fn named(&self, name: &str) -> &Value {
        static NULL : Value = Value::Null;
        let name = name.trim_start_matches(':');
        self.binds.iter().find(|bind| bind.name.eq_ignore_ascii_case(name)).map_or(&NULL, |bind| &bind.value)
    }

    /// Returns a value into the OUT parameter at zero-based `pos`
    pub fn set_out(&mut self, pos: usize, val: Value) {
        self.outs.retain(|(ix, _)| *ix != pos);
        self.outs.push((pos, val));
    }

    /// Returns a value into the named OUT parameter
    pub fn set_out_named(&mut self, name: &str, val: Value) {
        let name = name.trim_start_matches(':');
        if let Some(pos) = self.binds.iter().position(|bind| bind.name.eq_ignore_ascii_case(name)) {
            self.set_out(pos, val);
        }
    }

    /// Mode of the current transaction, like `READ ONLY`, if it was set
    pub fn transaction_mode(&self) -> Option<&str> {
        self.state.txn_mode.as_deref()
    }

    /// Writes a line into the session's `DBMS_OUTPUT` buffer. The line is dropped if the output is not enabled.
    pub fn put_line(&mut self, text: &str) {
        if let Some(output) = &mut self.state.output {
            output.push_back(text.to_string());
        }
    }

    /// Returns the current value of a session parameter
    pub fn nls(&self, name: &str) -> Option<&str> {
        self.state.nls.get(&name.to_uppercase()).map(String::as_str)
    }

    /// Returns a session attribute set by the client, like the module or action
    pub fn attribute(&self, attr: SessionAttr) -> Option<&str> {
        self.state.attrs.get(&attr).map(String::as_str)
    }

    /// Simulates work that takes `dur`. Fails if the call is canceled or times out.
    pub fn sleep(&self, dur: Duration) -> Result<()> {
        self.interrupt.wait(dur, self.deadline)
    }

    /// Opens a cursor over `rows` and returns a value that can be placed into a column or an OUT parameter.
    pub fn open_cursor(&mut self, columns: Vec<ColumnInfo>, rows: Vec<Vec<Value>>) -> Value {
        Value::Cursor(self.state.open_cursor(self.server, columns, rows, None))
    }

    /// Creates a LOB with the given content
    pub fn new_lob(&self, kind: LobKind, data: &[u8]) -> Value {
        Value::Lob(self.server.new_lob(kind, data.to_vec(), None))
    }

    /// Returns the content of a LOB argument
    pub fn lob_data(&self, val: &Value) -> Result<Vec<u8>> {
        match val {
            Value::Lob(lob) => self.server.lob_data(lob),
            Value::Bytes(bytes) => Ok(bytes.clone()),
            Value::Text(txt) => Ok(txt.as_bytes().to_vec()),
            _ => Err(invalid_lob()),
        }
    }

    /// Marks the session as disconnected and returns the error to report.
    pub fn disconnect(&mut self) -> Error {
        self.state.dead = true;
        Error::backend(END_OF_CHANNEL, "end-of-file on communication channel")
    }
}

/// A handler's reply
#[derive(Debug, Default)]
pub struct Reply {
    result: Option<(Vec<ColumnInfo>, Vec<Vec<Value>>)>,
    affected: u64,
    implicit: Vec<(Vec<ColumnInfo>, Vec<Vec<Value>>)>,
    fetch_delay: Option<Duration>,
}

impl Reply {
    /// Statement completed without a result set
    pub fn done() -> Self {
        Self::default()
    }

    /// DML statement completed
    pub fn affected(rows: u64) -> Self {
        Self { affected: rows, ..Self::default() }
    }

    /// Query result
    pub fn rows(columns: Vec<ColumnInfo>, rows: Vec<Vec<Value>>) -> Self {
        Self { result: Some((columns, rows)), ..Self::default() }
    }

    /// Adds an implicit result
    pub fn implicit(mut self, columns: Vec<ColumnInfo>, rows: Vec<Vec<Value>>) -> Self {
        self.implicit.push((columns, rows));
        self
    }

    /// Makes every fetch from the result set take `delay`
    pub fn fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }
}

struct ScriptedSession {
    server: Arc<Server>,
    interrupt: Arc<Interrupt>,
    state: SessionState,
    sysdba: bool,
    round_trips: u64,
    call_timeout: Option<Duration>,
    deadline: Option<Instant>,
    closed: bool,
}

impl ScriptedSession {
    /// Starts a round trip
    fn begin(&mut self) -> Result<()> {
        self.round_trips += 1;
        self.deadline = self.call_timeout.map(|timeout| Instant::now() + timeout);
        if self.server.killed.lock().remove(&self.state.id) {
            self.state.dead = true;
            return Err(Error::backend(SESSION_KILLED, "your session has been killed"));
        }
        if self.state.dead || self.closed {
            return Err(Error::backend(END_OF_CHANNEL, "end-of-file on communication channel"));
        }
        Ok(())
    }

    /// Completes a round trip
    fn end<T>(&self, res: Result<T>) -> Result<T> {
        self.interrupt.clear();
        res
    }

    fn alter_session(&mut self, sql: &str) -> Option<Result<()>> {
        // values keep their case, so they are taken from the original text
        let mut rest = sql.trim();
        for word in ["ALTER", "SESSION", "SET"] {
            let head = rest.get(..word.len())?;
            let tail = &rest[word.len()..];
            if !head.eq_ignore_ascii_case(word) || !tail.starts_with(char::is_whitespace) {
                return None;
            }
            rest = tail.trim_start();
        }
        let mut pairs = Vec::new();
        while !rest.is_empty() {
            let Some((name, tail)) = rest.split_once('=') else {
                return Some(Err(Error::backend(922, "missing or invalid option")));
            };
            let tail = tail.trim_start();
            let (value, tail) = if let Some(quoted) = tail.strip_prefix('\'') {
                match quoted.split_once('\'') {
                    Some((value, tail)) => (value, tail),
                    None => return Some(Err(Error::backend(1756, "quoted string not properly terminated"))),
                }
            } else {
                tail.split_once(char::is_whitespace).unwrap_or((tail, ""))
            };
            pairs.push((name.trim().to_uppercase(), value.to_string()));
            rest = tail.trim();
        }
        for (name, value) in pairs {
            self.state.nls.insert(name, value);
        }
        Some(Ok(()))
    }

    fn set_transaction(&mut self, text: &str) -> Option<Result<()>> {
        let mode = text.strip_prefix("SET TRANSACTION ")?;
        if !matches!(mode, "READ ONLY" | "READ WRITE" | "ISOLATION LEVEL SERIALIZABLE" | "ISOLATION LEVEL READ COMMITTED") {
            return Some(Err(Error::backend(2179, "valid options: ISOLATION LEVEL { SERIALIZABLE | READ COMMITTED }")));
        }
        if self.state.txn_mode.is_some() {
            return Some(Err(Error::backend(1453, "SET TRANSACTION must be first statement of transaction")));
        }
        self.state.txn_mode = Some(mode.to_string());
        Some(Ok(()))
    }

    /// Serves the `DBMS_OUTPUT` procedures
    fn dbms_output(&mut self, text: &str, binds: &[BindSlot]) -> Option<ExecuteResponse> {
        let call = text.strip_prefix("BEGIN DBMS_OUTPUT.")?;
        let mut resp = ExecuteResponse::default();
        if call.starts_with("ENABLE") {
            self.state.output.get_or_insert_with(VecDeque::new);
        } else if call.starts_with("DISABLE") {
            self.state.output = None;
        } else if call.starts_with("GET_LINES") {
            let position = |name: &str| binds.iter().position(|bind| bind.name.eq_ignore_ascii_case(name));
            let max_lines = match position("NUMLINES").map(|pos| &binds[pos].value) {
                Some(Value::Int(n)) => usize::try_from(*n).unwrap_or(0),
                _ => 0,
            };
            let lines : Vec<Value> = match &mut self.state.output {
                Some(output) => {
                    let n = max_lines.min(output.len());
                    output.drain(..n).map(Value::Text).collect()
                }
                None => Vec::new(),
            };
            if let Some(pos) = position("NUMLINES") {
                resp.outs.push((pos, Value::Int(lines.len() as i64)));
            }
            if let Some(pos) = position("LINES") {
                resp.outs.push((pos, Value::Array(lines)));
            }
        } else {
            return None;
        }
        Some(resp)
    }

    fn run(&mut self, req: ExecuteRequest) -> Result<ExecuteResponse> {
        let text = normalize(req.sql);
        if req.mode == ExecMode::Execute {
            if let Some(res) = self.alter_session(req.sql) {
                return res.map(|_| ExecuteResponse::default());
            }
            if let Some(res) = self.set_transaction(&text) {
                return res.map(|_| ExecuteResponse::default());
            }
            let binds = req.rows.first().map_or(&[][..], Vec::as_slice);
            if let Some(resp) = self.dbms_output(&text, binds) {
                return Ok(resp);
            }
        } else if ["ALTER SESSION SET ", "SET TRANSACTION ", "BEGIN DBMS_OUTPUT."].iter().any(|head| text.starts_with(head)) {
            return Ok(ExecuteResponse::default());
        }
        let is_dml = ["INSERT ", "UPDATE ", "DELETE ", "MERGE "].iter().any(|head| text.starts_with(head));
        if is_dml && req.mode == ExecMode::Execute && self.state.txn_mode.as_deref() == Some("READ ONLY") {
            return Err(Error::backend(1456, "may not perform insert/delete/update operation inside a READ ONLY transaction"));
        }
        let handler = self.server.find_handler(req.sql).ok_or_else(|| Error::backend(900, "invalid SQL statement"))?;
        if req.mode == ExecMode::ParseOnly {
            return Ok(ExecuteResponse::default());
        }
        let no_args = [Vec::new()];
        let arg_rows = if req.rows.is_empty() { &no_args[..] } else { &req.rows[..] };
        let mut resp = ExecuteResponse::default();
        for (iteration, binds) in arg_rows.iter().enumerate() {
            let mut call = Call {
                sql: req.sql,
                binds,
                iteration,
                outs: Vec::new(),
                state: &mut self.state,
                server: &self.server,
                interrupt: &self.interrupt,
                deadline: self.deadline,
            };
            let reply = (handler.run)(&mut call)?;
            resp.outs = call.outs;
            resp.rows_affected += reply.affected;
            if req.mode == ExecMode::DescribeOnly {
                resp.columns = reply.result.map(|(columns, _)| columns).unwrap_or_default();
                return Ok(resp);
            }
            if let Some((columns, rows)) = reply.result {
                let cursor = self.state.open_cursor(&self.server, columns, rows, reply.fetch_delay);
                let prefetched = self.take_rows(cursor.id, req.prefetch_rows);
                resp.query = Some(QueryResult { cursor, rows: prefetched });
            }
            for (columns, rows) in reply.implicit {
                resp.implicit.push(self.state.open_cursor(&self.server, columns, rows, None));
            }
        }
        Ok(resp)
    }

    fn take_rows(&mut self, cursor: CursorId, max_rows: usize) -> Vec<Vec<Value>> {
        match self.state.cursors.get_mut(&cursor) {
            Some(cur) => {
                let n = max_rows.min(cur.rows.len());
                cur.rows.drain(..n).collect()
            }
            None => Vec::new(),
        }
    }
}

impl NativeSession for ScriptedSession {
    fn execute(&mut self, req: ExecuteRequest) -> Result<ExecuteResponse> {
        self.begin()?;
        let res = self.run(req);
        self.end(res)
    }

    fn fetch(&mut self, cursor: CursorId, max_rows: usize) -> Result<Vec<Vec<Value>>> {
        self.begin()?;
        let res = match self.state.cursors.get(&cursor) {
            None => Err(Error::backend(1001, "invalid cursor")),
            Some(cur) => match cur.fetch_delay {
                Some(delay) => self.interrupt.wait(delay, self.deadline),
                None => Ok(()),
            },
        };
        let res = res.map(|_| self.take_rows(cursor, max_rows));
        self.end(res)
    }

    fn close_cursor(&mut self, cursor: CursorId) {
        self.state.close_cursor(&self.server, cursor);
    }

    fn commit(&mut self) -> Result<()> {
        self.begin()?;
        self.server.commits.fetch_add(1, Ordering::SeqCst);
        self.state.txn_mode = None;
        self.end(Ok(()))
    }

    fn rollback(&mut self) -> Result<()> {
        self.begin()?;
        self.server.rollbacks.fetch_add(1, Ordering::SeqCst);
        self.state.txn_mode = None;
        self.end(Ok(()))
    }

    fn ping(&mut self) -> Result<()> {
        self.begin()?;
        self.end(Ok(()))
    }

    fn reset(&mut self) -> Result<()> {
        self.begin()?;
        self.server.resets.fetch_add(1, Ordering::SeqCst);
        let failed = self.server.fail_resets.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        let res = if failed.is_ok() {
            Err(Error::backend(24459, "OCISessionGet() timed out waiting for pool to create new connections"))
        } else {
            self.state.nls = self.server.nls_defaults();
            self.state.attrs.clear();
            self.state.txn_mode = None;
            self.state.output = None;
            self.state.close_all(&self.server);
            Ok(())
        };
        self.end(res)
    }

    fn set_call_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        self.call_timeout = timeout;
        Ok(())
    }

    fn breaker(&self) -> Arc<dyn Breaker> {
        self.interrupt.clone()
    }

    fn round_trips(&self) -> u64 {
        self.round_trips
    }

    fn set_attribute(&mut self, attr: SessionAttr, value: &str) -> Result<()> {
        self.state.attrs.insert(attr, value.to_string());
        Ok(())
    }

    fn timezone(&self) -> FixedOffset {
        self.state.nls.get("TIME_ZONE")
            .and_then(|tz| parse_offset(tz))
            .unwrap_or_else(|| *self.server.timezone.lock())
    }

    fn lob_create_temp(&mut self, kind: LobKind) -> Result<LobLocator> {
        self.begin()?;
        let lob = self.server.new_lob(kind, Vec::new(), Some(self.state.id));
        self.state.temp_lobs.push(lob.id);
        self.end(Ok(lob))
    }

    fn lob_read(&mut self, lob: &LobLocator, offset: u64, amount: usize) -> Result<Vec<u8>> {
        self.begin()?;
        let res = self.server.lobs.lock().get(&lob.id).map(|data| {
            let start = (offset as usize).min(data.data.len());
            let end = start.saturating_add(amount).min(data.data.len());
            data.data[start..end].to_vec()
        }).ok_or_else(invalid_lob);
        self.end(res)
    }

    fn lob_write(&mut self, lob: &LobLocator, offset: u64, data: &[u8]) -> Result<usize> {
        self.begin()?;
        let res = self.server.lobs.lock().get_mut(&lob.id).map(|lob_data| {
            let start = offset as usize;
            if lob_data.data.len() < start + data.len() {
                lob_data.data.resize(start + data.len(), 0);
            }
            lob_data.data[start..start + data.len()].copy_from_slice(data);
            data.len()
        }).ok_or_else(invalid_lob);
        self.end(res)
    }

    fn lob_len(&mut self, lob: &LobLocator) -> Result<u64> {
        self.begin()?;
        let res = self.server.lobs.lock().get(&lob.id).map(|lob| lob.data.len() as u64).ok_or_else(invalid_lob);
        self.end(res)
    }

    fn lob_free(&mut self, lob: &LobLocator) -> Result<()> {
        self.begin()?;
        let mut lobs = self.server.lobs.lock();
        if lobs.get(&lob.id).map_or(false, |data| data.temp_owner.is_some()) {
            lobs.remove(&lob.id);
        }
        drop(lobs);
        self.state.temp_lobs.retain(|id| *id != lob.id);
        self.end(Ok(()))
    }

    fn describe_type(&mut self, name: &str) -> Result<ObjectType> {
        self.begin()?;
        self.server.describes.fetch_add(1, Ordering::SeqCst);
        let res = self.server.types.lock().get(&name.to_uppercase()).cloned()
            .ok_or_else(|| Error::backend(4043, format!("object {} does not exist", name)));
        self.end(res)
    }

    fn startup(&mut self, _mode: StartupMode) -> Result<()> {
        self.begin()?;
        let res = if self.sysdba {
            self.server.up.store(true, Ordering::SeqCst);
            Ok(())
        } else {
            Err(Error::backend(1031, "insufficient privileges"))
        };
        self.end(res)
    }

    fn shutdown(&mut self, _mode: ShutdownMode) -> Result<()> {
        self.begin()?;
        let res = if self.sysdba {
            self.server.up.store(false, Ordering::SeqCst);
            Ok(())
        } else {
            Err(Error::backend(1031, "insufficient privileges"))
        };
        self.end(res)
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.state.close_all(&self.server);
            self.server.open_sessions.fetch_sub(1, Ordering::SeqCst);
            tracing::trace!(session = self.state.id, "scripted session closed");
        }
    }
}

impl Drop for ScriptedSession {
    fn drop(&mut self) {
        self.close();
    }
}

fn parse_offset(tz: &str) -> Option<FixedOffset> {
    let tz = tz.trim();
    if tz.eq_ignore_ascii_case("UTC") || tz == "Z" {
        return FixedOffset::east_opt(0);
    }
    let (sign, rest) = match tz.as_bytes().first()? {
        b'+' => (1, &tz[1..]),
        b'-' => (-1, &tz[1..]),
        _ => return None,
    };
    let (h, m) = rest.split_once(':').unwrap_or((rest, "0"));
    let h = i32::from(h.parse::<u8>().ok().filter(|&h| h < 24)?);
    let m = i32::from(m.parse::<u8>().ok().filter(|&m| m < 60)?);
    let secs = h * 3600 + m * 60;
    FixedOffset::east_opt(sign * secs)
}
