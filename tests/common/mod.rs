#![allow(dead_code)]

use augur::{ColumnInfo, ColumnType, ConnectionParams, Connection, Environment, Result, Value};
use augur::native::scripted::{ScriptedServer, Reply};
use std::time::Duration;

/// Routes driver logs to the test output when `RUST_LOG` is set.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn params() -> ConnectionParams {
    ConnectionParams::builder()
        .username("scott")
        .password("tiger")
        .connect_string("scripted")
        .build()
        .expect("valid parameters")
}

pub fn pool_params(min: usize, max: usize) -> ConnectionParams {
    ConnectionParams::builder()
        .username("scott")
        .password("tiger")
        .connect_string("scripted")
        .min_sessions(min)
        .max_sessions(max)
        .wait_timeout(Duration::from_millis(200))
        .build()
        .expect("valid parameters")
}

/// Server that answers `SELECT n FROM numbers` with rows 1 through `count`.
pub fn numbers_server(count: i64) -> ScriptedServer {
    init_logging();
    let server = ScriptedServer::new();
    server.on("SELECT n FROM numbers", move |_| {
        let rows = (1..=count).map(|n| vec![Value::Int(n)]).collect();
        Ok(Reply::rows(vec![ColumnInfo::new("N", ColumnType::Number)], rows))
    });
    server
}

pub fn connect(server: &ScriptedServer) -> Result<(Environment, Connection)> {
    init_logging();
    let oracle = augur::env(server.clone());
    let conn = oracle.connect(&params())?;
    Ok((oracle, conn))
}

/**
    Server that reports session details:
    - `SELECT sid FROM session` returns the session identifier
    - `SELECT value FROM nls_session_parameters WHERE parameter = :name` returns a session parameter
    - `BEGIN DBMS_SESSION.SLEEP(:secs); END;` sleeps
*/
pub fn session_server() -> ScriptedServer {
    init_logging();
    let server = ScriptedServer::new();
    server.on("SELECT sid FROM session", |call| {
        let sid = call.session_id() as i64;
        Ok(Reply::rows(vec![ColumnInfo::new("SID", ColumnType::Number)], vec![vec![Value::Int(sid)]]))
    });
    server.on("FROM nls_session_parameters", |call| {
        let value = match call.arg(0) {
            Value::Text(name) => call.nls(name).map(|value| Value::Text(value.to_string())).unwrap_or(Value::Null),
            _ => Value::Null,
        };
        Ok(Reply::rows(vec![ColumnInfo::new("VALUE", ColumnType::Varchar)], vec![vec![value]]))
    });
    server.on("BEGIN DBMS_SESSION.SLEEP", |call| {
        let secs = match call.arg(0) { Value::Int(secs) => *secs as u64, _ => 1 };
        call.sleep(Duration::from_secs(secs))?;
        Ok(Reply::done())
    });
    server
}

pub fn session_id(conn: &Connection) -> Result<i64> {
    let stmt = conn.prepare("SELECT sid FROM session")?;
    let row = stmt.query_single(())?.expect("one row");
    let sid : i64 = row.get(0)?.expect("session id");
    Ok(sid)
}

pub fn nls_parameter(conn: &Connection, name: &str) -> Result<Option<String>> {
    let stmt = conn.prepare("SELECT value FROM nls_session_parameters WHERE parameter = :name")?;
    let row = stmt.query_single(name)?.expect("one row");
    row.get(0)
}
