//! Database handle

use crate::{
    Connection, ConnectionParams, Context, Environment, Error, PoolStats, Result, SessionPool,
    conn::TypeCache,
    native::Client,
    stmt::{Row, ToSql},
};
use std::{ops::Deref, sync::Arc};

/// Transaction isolation level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Isolation {
    /// Whatever the session uses, which is `READ COMMITTED` unless it was altered
    #[default]
    Default,
    ReadCommitted,
    Serializable,
}

/// Options of a transaction started by [`Db::begin_with`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TxOptions {
    pub read_only: bool,
    pub isolation: Isolation,
}

impl TxOptions {
    /// Statement that sets up the transaction, if the options need one.
    fn set_transaction(&self) -> Result<Option<&'static str>> {
        match (self.read_only, self.isolation) {
            (true, Isolation::ReadCommitted) => Err(Error::new("read-only transactions cannot be READ COMMITTED")),
            (true, _) => Ok(Some("SET TRANSACTION READ ONLY")),
            (false, Isolation::Serializable) => Ok(Some("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")),
            (false, Isolation::ReadCommitted) => Ok(Some("SET TRANSACTION ISOLATION LEVEL READ COMMITTED")),
            (false, Isolation::Default) => Ok(None),
        }
    }
}

pub(crate) struct DbInner {
    client: Arc<dyn Client>,
    params: ConnectionParams,
    pool: Option<SessionPool>,
    types: Arc<TypeCache>,
}

/**
    Handle to an open database.

    Clones share the same session pool. The pool is shut down when the last
    clone is closed or dropped.

    # Example

    ```
    use augur::{ColumnInfo, ColumnType, ConnectionParams, Context, Db, Value};
    use augur::native::scripted::{ScriptedServer, Reply};

    let server = ScriptedServer::new();
    server.on("SELECT country_name FROM hr.countries", |_| {
        let names = ["Argentina", "Australia", "Belgium"];
        Ok(Reply::rows(
            vec![ColumnInfo::new("COUNTRY_NAME", ColumnType::Varchar)],
            names.iter().map(|name| vec![Value::Text(name.to_string())]).collect(),
        ))
    });
    let oracle = augur::env(server);
    let db = Db::open(&oracle, &ConnectionParams::builder().connect_string("scripted").build()?)?;

    let ctx = Context::background();
    let names = db.query_map(&ctx, "SELECT country_name FROM hr.countries ORDER BY 1", (), |row| {
        let name : Option<String> = row.get(0)?;
        Ok(name.unwrap_or_default())
    })?;
    assert_eq!(names, ["Argentina", "Australia", "Belgium"]);
    db.close();
    # Ok::<(),augur::Error>(())
    ```
*/
#[derive(Clone)]
pub struct Db {
    inner: Arc<DbInner>,
}

impl Db {
    /**
        Opens the database. Unless `params` ask for standalone connections, this creates
        a session pool. Opening a database that is already open in `env` with the same
        parameters returns a handle to the existing one.
    */
    pub fn open(env: &Environment, params: &ConnectionParams) -> Result<Self> {
        let inner = env.open_db(params, || {
            let pool = if params.is_standalone() { None } else { Some(env.create_session_pool(params)?) };
            Ok(Arc::new(DbInner { client: env.client(), params: params.clone(), pool, types: Arc::default() }))
        })?;
        Ok(Self { inner })
    }

    /// Returns the parameters the database was opened with.
    pub fn params(&self) -> &ConnectionParams {
        &self.inner.params
    }

    /**
        Returns a connection. Pooled databases lend a session from the pool; standalone
        ones open a new session that is closed when the connection is dropped.

        The connection inherits `ctx` for the statements it prepares.
    */
    pub fn conn(&self, ctx: &Context) -> Result<Connection> {
        let conn = match &self.inner.pool {
            Some(pool) => pool.get_session(ctx)?,
            None => {
                ctx.check()?;
                Connection::standalone(self.inner.client.as_ref(), &self.inner.params, self.inner.types.clone())?
            }
        };
        conn.set_context(ctx);
        Ok(conn)
    }

    /**
        Executes a statement that does not return rows and commits the changes it made.
        Returns the number of rows affected.
    */
    pub fn exec(&self, ctx: &Context, sql: &str, args: impl ToSql) -> Result<usize> {
        let conn = self.conn(ctx)?;
        let stmt = conn.prepare(sql)?;
        let count = stmt.execute(args)?;
        if conn.in_transaction() {
            conn.commit()?;
        }
        Ok(count)
    }

    /// Executes a query and maps every returned row through `f`.
    pub fn query_map<T, F>(&self, ctx: &Context, sql: &str, args: impl ToSql, mut f: F) -> Result<Vec<T>>
    where
        F: FnMut(&Row) -> Result<T>,
    {
        let conn = self.conn(ctx)?;
        let stmt = conn.prepare(sql)?;
        let mut rows = stmt.query(args)?;
        let mut res = Vec::new();
        while let Some(row) = rows.next()? {
            res.push(f(&row)?);
        }
        Ok(res)
    }

    /// Executes a query and maps its first row through `f`. Returns `None` if the query returned no rows.
    pub fn query_row<T, F>(&self, ctx: &Context, sql: &str, args: impl ToSql, f: F) -> Result<Option<T>>
    where
        F: FnOnce(&Row) -> Result<T>,
    {
        let conn = self.conn(ctx)?;
        let stmt = conn.prepare(sql)?;
        let mut rows = stmt.query(args)?;
        let row = rows.next()?;
        row.map(|row| f(&row)).transpose()
    }

    /**
        Starts a transaction on a dedicated connection. The transaction is rolled back
        when it is dropped without being committed.

        # Example

        ```
        use augur::{ConnectionParams, Context, Db};
        use augur::native::scripted::{ScriptedServer, Reply};

        let server = ScriptedServer::new();
        server.on("INSERT INTO audit_log", |_| Ok(Reply::affected(1)));
        let oracle = augur::env(server);
        let db = Db::open(&oracle, &ConnectionParams::builder().connect_string("scripted").build()?)?;

        let txn = db.begin(&Context::background())?;
        let stmt = txn.prepare("INSERT INTO audit_log (msg) VALUES (:msg)")?;
        assert_eq!(stmt.execute("started")?, 1);
        drop(stmt);
        assert!(txn.in_transaction());
        txn.commit()?;
        # Ok::<(),augur::Error>(())
        ```
    */
    pub fn begin(&self, ctx: &Context) -> Result<Transaction> {
        self.begin_with(ctx, TxOptions::default())
    }

    /**
        Starts a transaction with the given isolation level or as a read-only one.

        Read-only transactions see the data as of their start, thus they can only be
        combined with the default or the serializable isolation.

        # Example

        ```
        use augur::{ConnectionParams, Context, Db, Isolation, TxOptions};
        use augur::native::scripted::{ScriptedServer, Reply};

        let server = ScriptedServer::new();
        server.on("UPDATE hr.employees", |_| Ok(Reply::affected(1)));
        let oracle = augur::env(server);
        let db = Db::open(&oracle, &ConnectionParams::builder().connect_string("scripted").build()?)?;

        let ctx = Context::background();
        let txn = db.begin_with(&ctx, TxOptions { read_only: true, ..TxOptions::default() })?;
        let stmt = txn.prepare("UPDATE hr.employees SET salary = salary * 1.1")?;
        assert!(stmt.execute(()).is_err());
        drop(stmt);
        txn.commit()?;

        let txn = db.begin_with(&ctx, TxOptions { isolation: Isolation::Serializable, ..TxOptions::default() })?;
        let stmt = txn.prepare("UPDATE hr.employees SET salary = salary * 1.1")?;
        assert_eq!(stmt.execute(())?, 1);
        drop(stmt);
        txn.commit()?;
        # Ok::<(),augur::Error>(())
        ```
    */
    pub fn begin_with(&self, ctx: &Context, opts: TxOptions) -> Result<Transaction> {
        let set_transaction = opts.set_transaction()?;
        let conn = self.conn(ctx)?;
        if let Some(sql) = set_transaction {
            conn.prepare(sql)?.execute(())?;
            conn.mark_in_txn();
        }
        Ok(Transaction { conn, done: false })
    }

    /// Confirms that the database is reachable.
    pub fn ping(&self, ctx: &Context) -> Result<()> {
        self.conn(ctx)?.ping()
    }

    /// Returns the pool counters, or `None` for standalone databases.
    pub fn stats(&self) -> Option<PoolStats> {
        self.inner.pool.as_ref().map(SessionPool::stats)
    }

    /// Closes this handle. The pool is shut down when the last handle is closed.
    pub fn close(self) {
        if let Ok(inner) = Arc::try_unwrap(self.inner) {
            if let Some(pool) = &inner.pool {
                pool.shutdown();
            }
        }
    }
}

/**
    A database transaction.

    Statements are prepared on the transaction's connection, which the transaction
    dereferences to. Dropping an unfinished transaction rolls it back.
*/
pub struct Transaction {
    conn: Connection,
    done: bool,
}

impl Deref for Transaction {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.done && self.conn.in_transaction() {
            if let Err(err) = self.conn.rollback() {
                tracing::warn!(%err, "rollback of an abandoned transaction failed");
            }
        }
    }
}

impl Transaction {
    /// Commits the transaction.
    pub fn commit(mut self) -> Result<()> {
        self.done = true;
        self.conn.commit()
    }

    /// Rolls the transaction back.
    pub fn rollback(mut self) -> Result<()> {
        self.done = true;
        self.conn.rollback()
    }
}
