//! Boundary to the native client library.
//!
//! The driver never speaks the wire protocol itself. Everything that needs a
//! round trip to the server goes through a [`NativeSession`] opened by a [`Client`].

pub mod scripted;

use crate::{
    Result, ConnectionParams,
    stmt::ColumnInfo,
    types::{CursorId, LobKind, LobLocator, ObjectType, RefCursor, Value},
};
use chrono::FixedOffset;
use std::{sync::Arc, time::Duration};

/// Direction of a bound parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
    InOut,
}

/// A value bound to a parameter placeholder
#[derive(Debug, Clone, PartialEq)]
pub struct BindSlot {
    /// Placeholder name without the leading colon
    pub name: String,
    pub value: Value,
    pub dir: Direction,
}

/// What the server should do with the statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    /// Execute the statement
    Execute,
    /// Only parse the statement. Reports syntax and semantic errors without executing it.
    ParseOnly,
    /// Describe the select list without fetching any rows
    DescribeOnly,
}

/// Statement execution request
#[derive(Debug)]
pub struct ExecuteRequest<'a> {
    pub sql: &'a str,
    /// Argument rows. A regular execution has one row, an array DML has many.
    pub rows: Vec<Vec<BindSlot>>,
    /// Number of rows the server should return together with the execute reply
    pub prefetch_rows: usize,
    pub mode: ExecMode,
}

/// Result set opened by a query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub cursor: RefCursor,
    /// Rows returned speculatively as part of the execute reply
    pub rows: Vec<Vec<Value>>,
}

/// Reply to an execution request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecuteResponse {
    pub rows_affected: u64,
    pub query: Option<QueryResult>,
    /// Values returned into OUT and IN/OUT parameters: (placeholder index, value)
    pub outs: Vec<(usize, Value)>,
    /// Implicit results in the order they were returned
    pub implicit: Vec<RefCursor>,
    /// Columns of the select list for `DescribeOnly` requests
    pub columns: Vec<ColumnInfo>,
}

/// Session attributes that are sent to the server with the next round trip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionAttr {
    Module,
    Action,
    ClientIdentifier,
    ClientInfo,
    DbOp,
}

/// Database startup mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupMode {
    Default,
    Force,
    Restrict,
}

/// Database shutdown mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    Default,
    Transactional,
    TransactionalLocal,
    Immediate,
    Abort,
    /// Final shutdown after the database was closed and dismounted
    Final,
}

/// Interrupts a call that is in progress on another thread.
pub trait Breaker : Send + Sync {
    fn break_call(&self);

    /// Discards a break that arrived when no call was in progress.
    fn reset(&self);
}

/// Opens physical sessions
pub trait Client : Send + Sync {
    /// Connects a new session tagged with the given connection class.
    fn connect(&self, params: &ConnectionParams, conn_class: &str) -> Result<Box<dyn NativeSession>>;
}

/**
    One physical session.

    Every method except `close_cursor`, `set_attribute`, `set_call_timeout`,
    `breaker`, `round_trips`, `timezone` and `close` costs one round trip.
*/
pub trait NativeSession : Send {
    fn execute(&mut self, req: ExecuteRequest) -> Result<ExecuteResponse>;

    /// Fetches up to `max_rows` rows. Fewer rows than requested means the cursor is exhausted.
    fn fetch(&mut self, cursor: CursorId, max_rows: usize) -> Result<Vec<Vec<Value>>>;

    fn close_cursor(&mut self, cursor: CursorId);

    fn commit(&mut self) -> Result<()>;

    fn rollback(&mut self) -> Result<()>;

    fn ping(&mut self) -> Result<()>;

    /// Restores session state (NLS parameters, packages, temporary LOBs, open cursors) to the defaults.
    fn reset(&mut self) -> Result<()>;

    /// Limits the duration of every following round trip. `None` removes the limit.
    fn set_call_timeout(&mut self, timeout: Option<Duration>) -> Result<()>;

    fn breaker(&self) -> Arc<dyn Breaker>;

    /// Number of round trips made by this session so far
    fn round_trips(&self) -> u64;

    fn set_attribute(&mut self, attr: SessionAttr, value: &str) -> Result<()>;

    /// Session time zone
    fn timezone(&self) -> FixedOffset;

    fn lob_create_temp(&mut self, kind: LobKind) -> Result<LobLocator>;

    fn lob_read(&mut self, lob: &LobLocator, offset: u64, amount: usize) -> Result<Vec<u8>>;

    fn lob_write(&mut self, lob: &LobLocator, offset: u64, data: &[u8]) -> Result<usize>;

    fn lob_len(&mut self, lob: &LobLocator) -> Result<u64>;

    fn lob_free(&mut self, lob: &LobLocator) -> Result<()>;

    fn describe_type(&mut self, name: &str) -> Result<ObjectType>;

    fn startup(&mut self, mode: StartupMode) -> Result<()>;

    fn shutdown(&mut self, mode: ShutdownMode) -> Result<()>;

    /// Logs off and releases the session.
    fn close(&mut self);
}
