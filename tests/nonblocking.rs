#![cfg(feature="nonblocking")]

mod common;

mod tests {
    use augur::*;
    use augur::native::scripted::{ScriptedServer, Reply};
    use crate::common;
    use std::time::Duration;

    fn jobs_server() -> ScriptedServer {
        common::init_logging();
        let server = common::session_server();
        server.on("DELETE FROM jobs", |_| Ok(Reply::affected(2)));
        server.on("SELECT name FROM jobs", |_| {
            let names = ["backup", "reindex", "vacuum"];
            Ok(Reply::rows(
                vec![ColumnInfo::new("NAME", ColumnType::Varchar)],
                names.iter().map(|name| vec![Value::Text(name.to_string())]).collect(),
            ))
        });
        server
    }

    #[test]
    fn async_db() -> Result<()> {
        let server = jobs_server();
        let oracle = augur::env(server.clone());
        let db = oracle.open(r#"user="scott" password="tiger" connectString="scripted" poolMaxSessions=2"#)?;

        augur::block_on(async {
            let ctx = Context::background();
            let deleted = db.exec_async(&ctx, "DELETE FROM jobs WHERE finished < SYSDATE - 30", ()).await?;
            assert_eq!(deleted, 2);
            assert_eq!(server.commits(), 1);

            let names = db.query_async(&ctx, "SELECT name FROM jobs ORDER BY name", (), |row| {
                let name : String = row.get(0)?.unwrap();
                Ok(name)
            }).await?;
            assert_eq!(names, ["backup", "reindex", "vacuum"]);
            Ok::<_, Error>(())
        })?
    }

    #[test]
    fn concurrent_async_acquire() -> Result<()> {
        let server = jobs_server();
        let oracle = augur::env(server.clone());
        let pool = std::sync::Arc::new(oracle.create_session_pool(&common::pool_params(0, 2))?);

        augur::block_on(async {
            let ctx = Context::background();
            let mut tasks = Vec::new();
            for _ in 0..4 {
                let pool = pool.clone();
                let ctx = ctx.clone();
                tasks.push(tokio_rt::spawn(async move {
                    let conn = pool.get_session_async(&ctx).await?;
                    let sid = spawn_blocking(move || {
                        let stmt = conn.prepare("BEGIN DBMS_SESSION.SLEEP(:secs); END;")?;
                        stmt.set_context(&Context::background().with_timeout(Duration::from_millis(20)));
                        // the sleep outlasts its timeout
                        assert!(matches!(stmt.execute(1), Err(Error::DeadlineExceeded)));
                        common::session_id(&conn)
                    }).await??;
                    Ok::<_, Error>(sid)
                }));
            }
            let mut sids = Vec::new();
            for task in tasks {
                let sid = task.await.map_err(|err| Error::Interface(err.to_string()))??;
                sids.push(sid);
            }
            sids.sort_unstable();
            sids.dedup();
            assert!(sids.len() <= 2);
            Ok::<_, Error>(())
        })??;
        assert_eq!(pool.stats().busy, 0);
        assert!(server.connects() <= 2);
        Ok(())
    }
}
