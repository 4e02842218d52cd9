//! Async facade over the blocking API on the tokio runtime

use crate::{Connection, Context, Db, Error, Result, SessionPool, stmt::{Row, ToSql}};
use std::future::Future;

/// Runs a blocking function on tokio's blocking thread pool.
pub async fn spawn_blocking<F, R>(f: F) -> Result<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    match tokio_rt::task::spawn_blocking(f).await {
        Ok(res) => Ok(res),
        Err(err) => Err(Error::msg(format!("blocking task {}", err))),
    }
}

/**
    Builds a new multi-thread Tokio runtime and runs a future to completion on it.

    # Example

    ```
    use augur::{ConnectionParams, Context, Db};
    use augur::native::scripted::{ScriptedServer, Reply};

    let server = ScriptedServer::new();
    server.on("DELETE FROM sessions", |_| Ok(Reply::affected(3)));
    let oracle = augur::env(server);
    let db = Db::open(&oracle, &ConnectionParams::builder().connect_string("scripted").build()?)?;

    let deleted = augur::block_on(async {
        db.exec_async(&Context::background(), "DELETE FROM sessions WHERE expires < SYSDATE", ()).await
    })??;
    assert_eq!(deleted, 3);
    # Ok::<(),augur::Error>(())
    ```
*/
pub fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let runtime = tokio_rt::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| Error::msg(format!("cannot start the runtime: {}", err)))?;
    Ok(runtime.block_on(future))
}

impl SessionPool {
    /// Returns a session of the default connection class without blocking the async runtime.
    pub async fn get_session_async(&self, ctx: &Context) -> Result<Connection> {
        let pool = self.shared().clone();
        let ctx = ctx.clone();
        let class = self.params().conn_class().to_string();
        spawn_blocking(move || pool.acquire(&ctx, &class)).await?
    }
}

impl Db {
    /// Async version of [`Db::exec`](crate::Db::exec)
    pub async fn exec_async<A>(&self, ctx: &Context, sql: &str, args: A) -> Result<usize>
    where
        A: ToSql + 'static,
    {
        let db = self.clone();
        let ctx = ctx.clone();
        let sql = sql.to_string();
        spawn_blocking(move || db.exec(&ctx, &sql, args)).await?
    }

    /// Async version of [`Db::query_map`](crate::Db::query_map)
    pub async fn query_async<T, A, F>(&self, ctx: &Context, sql: &str, args: A, f: F) -> Result<Vec<T>>
    where
        T: Send + 'static,
        A: ToSql + 'static,
        F: FnMut(&Row) -> Result<T> + Send + 'static,
    {
        let db = self.clone();
        let ctx = ctx.clone();
        let sql = sql.to_string();
        spawn_blocking(move || db.query_map(&ctx, &sql, args, f)).await?
    }
}
