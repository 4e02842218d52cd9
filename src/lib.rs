/*!
A pooled, type-marshaling driver layer between Rust applications and Oracle-style
SQL sessions.

The driver does not speak a wire protocol itself. It works on top of a native client
(see [`native`]) and adds session pooling, argument binding, row fetching with
prefetch and array fetch, LOB streaming, object types and context based cancellation.

# Example

```
use augur::{ColumnInfo, ColumnType, ConnectionParams, Context, Value};
use augur::native::scripted::{ScriptedServer, Reply};
use std::time::Duration;

let server = ScriptedServer::new();
server.on("FROM hr.employees", |call| {
    let id = call.arg(0).clone();
    Ok(Reply::rows(
        vec![ColumnInfo::new("FIRST_NAME", ColumnType::Varchar), ColumnInfo::new("LAST_NAME", ColumnType::Varchar)],
        if id == Value::Int(107) { vec![vec![Value::Text("Diana".to_string()), Value::Text("Lorentz".to_string())]] } else { Vec::new() },
    ))
});

let oracle = augur::env(server);
let params = ConnectionParams::builder()
    .username("hr")
    .password("hr")
    .connect_string("scripted")
    .max_sessions(4)
    .build()?;
let pool = oracle.create_session_pool(&params)?;

let ctx = Context::background().with_timeout(Duration::from_secs(5));
let conn = pool.get_session(&ctx)?;
let stmt = conn.prepare("
    SELECT first_name, last_name
      FROM hr.employees
     WHERE employee_id = :id
")?;
let row = stmt.query_single(107)?.expect("one row");
let first_name : Option<&str> = row.get("FIRST_NAME")?;
let last_name : &str = row.get("LAST_NAME")?.unwrap();
assert_eq!(first_name, Some("Diana"));
assert_eq!(last_name, "Lorentz");
# Ok::<(),augur::Error>(())
```
*/

#![cfg_attr(docsrs, feature(doc_cfg))]

#[cfg(feature="nonblocking")]
#[cfg_attr(docsrs, doc(cfg(feature="nonblocking")))]
mod task;

pub mod native;

mod err;
mod ctx;
mod config;
mod env;
mod conn;
mod pool;
mod db;
mod types;
mod stmt;
mod lob;

#[cfg(feature="nonblocking")]
pub use task::{spawn_blocking, block_on};

pub use err::Error;
pub use ctx::{Context, CancelHandle};
pub use config::{ConnectionParams, ConnectionParamsBuilder, AuthMode, Password};
pub use env::Environment;
pub use conn::Connection;
pub use pool::{SessionPool, PoolStats};
pub use db::{Db, Isolation, Transaction, TxOptions};
pub use stmt::{Statement, Cursor, Rows, Row, ToSql, FromSql, ColumnInfo, Position, FETCH_DEFAULT};
pub use types::{Value, ColumnType, Number, BoolEncoding, Object, ObjectType, Collection, Attribute, LobKind, LobLocator, RefCursor, ToValue, FromValue};
pub use lob::{Lob, LobFetch, LobSource};

pub type Result<T> = std::result::Result<T, Error>;

/**
    Returns a new environment that opens sessions through `client`.

    While there can be multiple environments, most applications need only one. It is
    created once, by the entry point, and passed to the parts of the application
    that need database access:

    ```
    use augur::native::scripted::ScriptedServer;

    fn main() {
        let oracle = augur::env(ScriptedServer::new());
        // ...
    }
    ```
*/
pub fn env(client: impl native::Client + 'static) -> Environment {
    Environment::new(client)
}
