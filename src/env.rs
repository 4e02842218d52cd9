//! Driver environment

use crate::{
    Connection, ConnectionParams, Db, Result, SessionPool,
    conn::TypeCache,
    db::DbInner,
    native::Client,
};
use parking_lot::Mutex;
use std::{collections::HashMap, sync::{Arc, Weak}};

/**
    Represents the driver environment.

    The environment owns the native client. It opens standalone connections, creates
    session pools and hands out [`Db`] handles. It is cheap to clone, and clones share
    the client and the set of open databases.
*/
#[derive(Clone)]
pub struct Environment {
    client: Arc<dyn Client>,
    dbs: Arc<Mutex<HashMap<String, Weak<DbInner>>>>,
}

impl Environment {
    /// Creates an environment that opens sessions through `client`.
    pub fn new(client: impl Client + 'static) -> Self {
        Self { client: Arc::new(client), dbs: Arc::default() }
    }

    pub(crate) fn client(&self) -> Arc<dyn Client> {
        self.client.clone()
    }

    /**
        Creates and begins a session that is not managed by a pool.

        # Example

        ```
        use augur::ConnectionParams;
        use augur::native::scripted::ScriptedServer;

        let server = ScriptedServer::new();
        server.add_user("scott", "tiger");
        let oracle = augur::env(server.clone());

        let params = ConnectionParams::builder()
            .username("scott")
            .password("tiger")
            .connect_string("scripted")
            .build()?;
        let session = oracle.connect(&params)?;
        assert!(session.ping().is_ok());
        assert_eq!(server.open_sessions(), 1);

        drop(session);
        assert_eq!(server.open_sessions(), 0);

        let res = oracle.connect(&params.with_credentials("scott", "lion"));
        assert_eq!(res.unwrap_err().code(), Some(1017));
        # Ok::<(),augur::Error>(())
        ```
    */
    pub fn connect(&self, params: &ConnectionParams) -> Result<Connection> {
        Connection::standalone(self.client.as_ref(), params, Arc::new(TypeCache::default()))
    }

    /**
        Creates a session pool and opens its minimum number of sessions.

        Failures to open the initial sessions are logged and the pool starts with
        fewer sessions. It creates the missing ones on demand.
    */
    pub fn create_session_pool(&self, params: &ConnectionParams) -> Result<SessionPool> {
        SessionPool::new(self.client.clone(), params)
    }

    /**
        Parses the connection string and opens the database it describes. If the same
        database is already open in this environment, the returned handle shares its pool.

        # Example

        ```
        use augur::Context;
        use augur::native::scripted::ScriptedServer;

        let server = ScriptedServer::new();
        let oracle = augur::env(server.clone());
        let conn_str = r#"user="scott" password="tiger" connectString="scripted" poolMinSessions=2"#;
        let db = oracle.open(conn_str)?;
        let same = oracle.open(conn_str)?;
        assert_eq!(server.connects(), 2);

        db.ping(&Context::background())?;
        assert_eq!(same.stats().map(|stats| stats.open), Some(2));
        # Ok::<(),augur::Error>(())
        ```
    */
    pub fn open(&self, conn_str: &str) -> Result<Db> {
        let params = ConnectionParams::parse(conn_str)?;
        Db::open(self, &params)
    }

    /// Returns an open database with the same parameters, or opens it with `open`.
    pub(crate) fn open_db(&self, params: &ConnectionParams, open: impl FnOnce() -> Result<Arc<DbInner>>) -> Result<Arc<DbInner>> {
        let key = params.string_with_password();
        {
            let mut dbs = self.dbs.lock();
            dbs.retain(|_, db| db.strong_count() > 0);
            if let Some(db) = dbs.get(&key).and_then(Weak::upgrade) {
                return Ok(db);
            }
        }
        // the pool warms up without holding the registry
        let db = open()?;
        let mut dbs = self.dbs.lock();
        if let Some(existing) = dbs.get(&key).and_then(Weak::upgrade) {
            drop(dbs);
            tracing::debug!("database was opened concurrently, closing the duplicate");
            return Ok(existing);
        }
        dbs.insert(key, Arc::downgrade(&db));
        Ok(db)
    }
}
