mod common;

mod tests {
    use augur::*;
    use crate::common;
    use pretty_assertions::assert_eq;
    use std::{thread, time::{Duration, Instant}};

    /// Waits until `cond` holds or a second has passed.
    fn wait_for(cond: impl Fn() -> bool) -> bool {
        let until = Instant::now() + Duration::from_secs(1);
        while Instant::now() < until {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    #[test]
    fn max_sessions() -> Result<()> {
        let server = common::session_server();
        let oracle = augur::env(server.clone());
        let pool = oracle.create_session_pool(&common::pool_params(0, 3))?;
        let ctx = Context::background();

        let conns = thread::scope(|scope| {
            let workers : Vec<_> = (0..3).map(|_| scope.spawn(|| pool.get_session(&ctx))).collect();
            workers.into_iter().map(|worker| worker.join().expect("worker")).collect::<Result<Vec<_>>>()
        })?;
        let mut sids = conns.iter().map(common::session_id).collect::<Result<Vec<_>>>()?;
        sids.sort();
        sids.dedup();
        assert_eq!(sids.len(), 3);
        assert_eq!(pool.stats(), PoolStats { open: 3, busy: 3, idle: 0, waiting: 0, min: 0, max: 3 });

        let started = Instant::now();
        let res = pool.get_session(&ctx);
        assert!(matches!(res, Err(Error::PoolExhausted(_))));
        assert!(started.elapsed() >= Duration::from_millis(200));
        assert_eq!(pool.stats().waiting, 0);

        // a waiter gets the session that is released while it waits
        let mut conns = conns;
        let conn = thread::scope(|scope| {
            let waiter = scope.spawn(|| pool.get_session(&ctx));
            assert!(wait_for(|| pool.stats().waiting == 1));
            conns.pop();
            waiter.join().expect("waiter")
        })?;
        conn.ping()?;
        assert_eq!(pool.stats().open, 3);
        assert_eq!(server.connects(), 3);
        Ok(())
    }

    #[test]
    fn canceled_acquire() -> Result<()> {
        let server = common::session_server();
        let oracle = augur::env(server);
        let pool = oracle.create_session_pool(&common::pool_params(1, 1))?;
        let conn = pool.get_session(&Context::background())?;

        let (ctx, cancel) = Context::background().with_cancel();
        let res = thread::scope(|scope| {
            let waiter = scope.spawn(|| pool.get_session(&ctx));
            assert!(wait_for(|| pool.stats().waiting == 1));
            cancel.cancel();
            waiter.join().expect("waiter")
        });
        assert!(matches!(res, Err(Error::Canceled)));

        let ctx = Context::background().with_timeout(Duration::from_millis(50));
        let res = pool.get_session(&ctx);
        assert!(matches!(res, Err(Error::DeadlineExceeded)));
        assert_eq!(pool.stats(), PoolStats { open: 1, busy: 1, idle: 0, waiting: 0, min: 1, max: 1 });

        // the abandoned requests did not take the session away
        drop(conn);
        let conn = pool.get_session(&Context::background())?;
        conn.ping()?;
        Ok(())
    }

    #[test]
    fn shutdown_wakes_waiters() -> Result<()> {
        let server = common::session_server();
        let oracle = augur::env(server.clone());
        let params = ConnectionParams::builder()
            .connect_string("scripted")
            .min_sessions(1)
            .max_sessions(1)
            .wait_timeout(Duration::from_secs(30))
            .build()?;
        let pool = oracle.create_session_pool(&params)?;
        let conn = pool.get_session(&Context::background())?;

        let res = thread::scope(|scope| {
            let waiter = scope.spawn(|| pool.get_session(&Context::background()));
            assert!(wait_for(|| pool.stats().waiting == 1));
            pool.shutdown();
            waiter.join().expect("waiter")
        });
        assert!(matches!(res, Err(Error::Canceled)));
        assert!(matches!(pool.get_session(&Context::background()), Err(Error::PoolClosed)));

        // sessions in use are closed when they come back
        assert_eq!(server.open_sessions(), 1);
        drop(conn);
        assert_eq!(server.open_sessions(), 0);
        assert_eq!(pool.stats().open, 0);
        Ok(())
    }

    #[test]
    fn connection_classes() -> Result<()> {
        let server = common::session_server();
        server.on("SELECT class FROM session", |call| {
            let class = call.conn_class().to_string();
            Ok(augur::native::scripted::Reply::rows(vec![ColumnInfo::new("CLASS", ColumnType::Varchar)], vec![vec![Value::Text(class)]]))
        });
        let oracle = augur::env(server.clone());
        let pool = oracle.create_session_pool(&common::pool_params(0, 2))?;
        let ctx = Context::background();

        let class_of = |conn: &Connection| -> Result<String> {
            let stmt = conn.prepare("SELECT class FROM session")?;
            let row = stmt.query_single(())?.expect("one row");
            let class : String = row.get(0)?.unwrap();
            Ok(class)
        };

        let conn = pool.get_session_for(&ctx, "ETL")?;
        assert_eq!(class_of(&conn)?, "ETL");
        let etl_sid = common::session_id(&conn)?;
        drop(conn);

        let conn = pool.get_session_for(&ctx, "REPORTS")?;
        assert_eq!(class_of(&conn)?, "REPORTS");
        assert_ne!(common::session_id(&conn)?, etl_sid);
        drop(conn);

        // sessions of a class are reused by that class only
        let conn = pool.get_session_for(&ctx, "ETL")?;
        assert_eq!(common::session_id(&conn)?, etl_sid);
        drop(conn);
        assert_eq!(server.connects(), 2);

        // a full pool retires an idle session of another class to make room
        let conn = pool.get_session_for(&ctx, "ADHOC")?;
        assert_eq!(class_of(&conn)?, "ADHOC");
        assert_eq!(server.connects(), 3);
        assert_eq!(server.open_sessions(), 2);
        assert_eq!(pool.stats().open, 2);
        Ok(())
    }

    #[test]
    fn standalone_sessions() -> Result<()> {
        let server = common::session_server();
        let oracle = augur::env(server.clone());
        let db = Db::open(&oracle, &common::params().with_standalone(true))?;
        assert!(db.stats().is_none());
        assert_eq!(server.open_sessions(), 0);

        let ctx = Context::background();
        let conn = db.conn(&ctx)?;
        let first = common::session_id(&conn)?;
        assert_eq!(server.open_sessions(), 1);
        drop(conn);
        assert_eq!(server.open_sessions(), 0);

        let conn = db.conn(&ctx)?;
        assert_ne!(common::session_id(&conn)?, first);
        assert_eq!(server.connects(), 2);
        Ok(())
    }

    #[test]
    fn session_state_is_reset() -> Result<()> {
        let server = common::session_server();
        let oracle = augur::env(server.clone());
        let pool = oracle.create_session_pool(&common::pool_params(1, 1))?;
        let ctx = Context::background();

        let conn = pool.get_session(&ctx)?;
        let sid = common::session_id(&conn)?;
        assert_eq!(common::nls_parameter(&conn, "NLS_DATE_FORMAT")?.as_deref(), Some("DD-MON-RR"));
        conn.prepare("ALTER SESSION SET NLS_DATE_FORMAT = 'YYYY-MM-DD'")?.execute(())?;
        assert_eq!(common::nls_parameter(&conn, "NLS_DATE_FORMAT")?.as_deref(), Some("YYYY-MM-DD"));
        conn.set_module("billing")?;
        drop(conn);

        let conn = pool.get_session(&ctx)?;
        assert_eq!(common::session_id(&conn)?, sid);
        assert_eq!(common::nls_parameter(&conn, "NLS_DATE_FORMAT")?.as_deref(), Some("DD-MON-RR"));
        assert_eq!(server.resets(), 1);
        Ok(())
    }

    #[test]
    fn session_init_survives_reset() -> Result<()> {
        let server = common::session_server();
        let oracle = augur::env(server.clone());
        let params = ConnectionParams::builder()
            .connect_string("scripted")
            .min_sessions(1)
            .max_sessions(1)
            .on_init("NLS_DATE_FORMAT", "YYYY-MM-DD HH24:MI:SS")
            .build()?;
        let pool = oracle.create_session_pool(&params)?;
        let ctx = Context::background();

        let conn = pool.get_session(&ctx)?;
        assert_eq!(common::nls_parameter(&conn, "NLS_DATE_FORMAT")?.as_deref(), Some("YYYY-MM-DD HH24:MI:SS"));
        conn.prepare("ALTER SESSION SET NLS_DATE_FORMAT = 'DD.MM.YYYY' NLS_TERRITORY = 'GERMANY'")?.execute(())?;
        assert_eq!(common::nls_parameter(&conn, "NLS_TERRITORY")?.as_deref(), Some("GERMANY"));
        drop(conn);

        let conn = pool.get_session(&ctx)?;
        assert_eq!(common::nls_parameter(&conn, "NLS_DATE_FORMAT")?.as_deref(), Some("YYYY-MM-DD HH24:MI:SS"));
        assert_eq!(common::nls_parameter(&conn, "NLS_TERRITORY")?.as_deref(), Some("AMERICA"));
        Ok(())
    }

    #[test]
    fn failed_reset_destroys_session() -> Result<()> {
        let server = common::session_server();
        let oracle = augur::env(server.clone());
        let pool = oracle.create_session_pool(&common::pool_params(0, 2))?;
        let ctx = Context::background();

        let conn = pool.get_session(&ctx)?;
        let sid = common::session_id(&conn)?;
        server.fail_next_resets(1);
        drop(conn);
        assert_eq!(pool.stats().open, 0);
        assert_eq!(server.open_sessions(), 0);

        let conn = pool.get_session(&ctx)?;
        assert_ne!(common::session_id(&conn)?, sid);
        Ok(())
    }

    #[test]
    fn killed_session_is_invalidated() -> Result<()> {
        let server = common::session_server();
        let oracle = augur::env(server.clone());
        let pool = oracle.create_session_pool(&common::pool_params(1, 1))?;
        let ctx = Context::background();

        let conn = pool.get_session(&ctx)?;
        let sid = common::session_id(&conn)?;
        server.kill_session(sid as u64);
        let err = conn.ping().unwrap_err();
        assert_eq!(err.code(), Some(28));
        assert!(err.is_session_fatal());
        assert!(!conn.is_valid());
        assert!(matches!(conn.ping(), Err(Error::SessionInvalid(_))));
        drop(conn);
        assert_eq!(pool.stats().open, 0);
        assert_eq!(server.resets(), 0);

        let conn = pool.get_session(&ctx)?;
        assert_ne!(common::session_id(&conn)?, sid);
        assert!(conn.is_valid());
        Ok(())
    }

    #[test]
    fn interrupted_session_is_validated() -> Result<()> {
        let server = common::session_server();
        let oracle = augur::env(server.clone());
        let pool = oracle.create_session_pool(&common::pool_params(1, 1))?;

        // a session that comes back in good standing is handed out as is: reset only
        let conn = pool.get_session(&Context::background())?;
        let sid = common::session_id(&conn)?;
        let round_trips = conn.round_trips();
        drop(conn);
        let conn = pool.get_session(&Context::background())?;
        assert_eq!(conn.round_trips(), round_trips + 1);

        // a session whose call was interrupted is pinged before it is reused: reset + ping
        let stmt = conn.prepare("BEGIN DBMS_SESSION.SLEEP(:secs); END;")?;
        stmt.set_context(&Context::background().with_timeout(Duration::from_millis(50)));
        assert!(matches!(stmt.execute(10), Err(Error::DeadlineExceeded)));
        drop(stmt);
        assert!(conn.is_valid());
        let round_trips = conn.round_trips();
        drop(conn);
        let conn = pool.get_session(&Context::background())?;
        assert_eq!(common::session_id(&conn)?, sid);
        assert_eq!(conn.round_trips(), round_trips + 3);

        // a session that fails validation is replaced
        let stmt = conn.prepare("BEGIN DBMS_SESSION.SLEEP(:secs); END;")?;
        stmt.set_context(&Context::background().with_timeout(Duration::from_millis(50)));
        assert!(stmt.execute(10).is_err());
        drop(stmt);
        drop(conn);
        server.kill_session(sid as u64);
        let conn = pool.get_session(&Context::background())?;
        assert_ne!(common::session_id(&conn)?, sid);
        assert_eq!(server.open_sessions(), 1);
        Ok(())
    }

    #[test]
    fn idle_sessions_are_evicted() -> Result<()> {
        let server = common::session_server();
        let oracle = augur::env(server.clone());
        let params = ConnectionParams::builder()
            .connect_string("scripted")
            .min_sessions(1)
            .max_sessions(3)
            .session_timeout(Duration::from_millis(50))
            .build()?;
        let pool = oracle.create_session_pool(&params)?;
        let ctx = Context::background();

        let conns = (0..3).map(|_| pool.get_session(&ctx)).collect::<Result<Vec<_>>>()?;
        drop(conns);
        assert_eq!(pool.stats().idle, 3);

        thread::sleep(Duration::from_millis(100));
        let conn = pool.get_session(&ctx)?;
        conn.ping()?;
        // idle eviction stops at the minimum
        assert_eq!(pool.stats(), PoolStats { open: 1, busy: 1, idle: 0, waiting: 0, min: 1, max: 3 });
        assert_eq!(server.open_sessions(), 1);
        Ok(())
    }

    #[test]
    fn sessions_are_retired_after_lifetime() -> Result<()> {
        let server = common::session_server();
        let oracle = augur::env(server.clone());
        let params = ConnectionParams::builder()
            .connect_string("scripted")
            .min_sessions(1)
            .max_sessions(1)
            .max_lifetime(Duration::from_millis(50))
            .build()?;
        let pool = oracle.create_session_pool(&params)?;
        assert_eq!(server.connects(), 1);

        thread::sleep(Duration::from_millis(100));
        // lifetime retirement ignores the minimum
        let conn = pool.get_session(&Context::background())?;
        conn.ping()?;
        assert_eq!(server.connects(), 2);
        assert_eq!(server.open_sessions(), 1);
        Ok(())
    }

    #[test]
    fn warm_up_failures() -> Result<()> {
        let server = common::session_server();
        // the first session fails every attempt
        server.fail_next_connects(3);
        let oracle = augur::env(server.clone());
        let params = ConnectionParams::builder()
            .connect_string("scripted")
            .min_sessions(2)
            .max_sessions(4)
            .build()?;
        let pool = oracle.create_session_pool(&params)?;
        assert_eq!(server.connects(), 4);
        assert_eq!(pool.stats().open, 1);

        let ctx = Context::background();
        let first = pool.get_session(&ctx)?;
        let second = pool.get_session(&ctx)?;
        assert_ne!(common::session_id(&first)?, common::session_id(&second)?);
        assert_eq!(pool.stats().open, 2);

        // a creation error is reported to the caller
        server.fail_next_connects(1);
        let err = pool.get_session(&ctx).unwrap_err();
        assert_eq!(err.code(), Some(12541));
        assert_eq!(pool.stats().open, 2);
        Ok(())
    }

    #[test]
    fn session_increment() -> Result<()> {
        let server = common::session_server();
        let oracle = augur::env(server.clone());
        let params = ConnectionParams::builder()
            .connect_string("scripted")
            .min_sessions(0)
            .max_sessions(4)
            .session_increment(3)
            .build()?;
        let pool = oracle.create_session_pool(&params)?;
        assert_eq!(pool.stats().open, 0);

        let conn = pool.get_session(&Context::background())?;
        assert_eq!(pool.stats(), PoolStats { open: 3, busy: 1, idle: 2, waiting: 0, min: 0, max: 4 });
        drop(conn);
        assert_eq!(server.connects(), 3);
        Ok(())
    }
}
