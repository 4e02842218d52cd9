mod common;

mod tests {
    use augur::*;
    use augur::native::{SessionAttr, ShutdownMode, StartupMode, scripted::{ScriptedServer, Reply}};
    use crate::common;

    #[test]
    fn authentication() -> Result<()> {
        common::init_logging();
        let server = ScriptedServer::new();
        server.add_user("scott", "tiger");
        let oracle = augur::env(server.clone());

        let conn = oracle.connect(&common::params())?;
        conn.ping()?;

        let err = oracle.connect(&common::params().with_credentials("scott", "lion")).unwrap_err();
        assert_eq!(err.code(), Some(1017));
        let err = oracle.connect(&common::params().with_credentials("adams", "tiger")).unwrap_err();
        assert_eq!(err.code(), Some(1017));
        Ok(())
    }

    #[test]
    fn expired_password() -> Result<()> {
        common::init_logging();
        let server = ScriptedServer::new();
        server.add_user("scott", "tiger");
        server.expire_password("scott");
        let oracle = augur::env(server.clone());

        let err = oracle.connect(&common::params()).unwrap_err();
        assert_eq!(err.code(), Some(28001));

        let params = common::params().with_new_password("leopard");
        let conn = oracle.connect(&params)?;
        conn.ping()?;
        assert_eq!(server.password_of("scott").as_deref(), Some("leopard"));
        drop(conn);

        assert!(oracle.connect(&common::params()).is_err());
        oracle.connect(&common::params().with_credentials("scott", "leopard"))?;
        Ok(())
    }

    #[test]
    fn startup_and_shutdown() -> Result<()> {
        common::init_logging();
        let server = ScriptedServer::new();
        let oracle = augur::env(server.clone());

        let conn = oracle.connect(&common::params())?;
        let err = conn.shutdown(ShutdownMode::Immediate).unwrap_err();
        assert_eq!(err.code(), Some(1031));
        assert!(server.is_up());
        // a failed privileged call does not break the session
        assert!(conn.is_valid());
        drop(conn);

        let sysdba = common::params().as_sysdba();
        assert_eq!(sysdba.auth_mode(), AuthMode::SysDba);
        let admin = oracle.connect(&sysdba)?;
        admin.shutdown(ShutdownMode::Immediate)?;
        admin.shutdown(ShutdownMode::Final)?;
        drop(admin);
        assert!(!server.is_up());

        let err = oracle.connect(&common::params()).unwrap_err();
        assert_eq!(err.code(), Some(1034));
        assert!(oracle.connect(&sysdba).is_err());

        let prelim = sysdba.as_prelim();
        assert!(prelim.is_prelim());
        let admin = oracle.connect(&prelim)?;
        admin.startup(StartupMode::Default)?;
        drop(admin);
        assert!(server.is_up());

        oracle.connect(&common::params())?.ping()?;
        Ok(())
    }

    #[test]
    fn trace_tags() -> Result<()> {
        common::init_logging();
        let server = ScriptedServer::new();
        server.on("FROM v$session", |call| {
            let tag = |attr| call.attribute(attr).map(|val| Value::Text(val.to_string())).unwrap_or(Value::Null);
            Ok(Reply::rows(
                vec![
                    ColumnInfo::new("MODULE", ColumnType::Varchar),
                    ColumnInfo::new("ACTION", ColumnType::Varchar),
                    ColumnInfo::new("CLIENT_IDENTIFIER", ColumnType::Varchar),
                    ColumnInfo::new("CLIENT_INFO", ColumnType::Varchar),
                ],
                vec![vec![
                    tag(SessionAttr::Module),
                    tag(SessionAttr::Action),
                    tag(SessionAttr::ClientIdentifier),
                    tag(SessionAttr::ClientInfo),
                ]],
            ))
        });
        let oracle = augur::env(server.clone());
        let pool = oracle.create_session_pool(&common::pool_params(1, 1))?;
        let sql = "SELECT module, action, client_identifier, client_info FROM v$session";
        {
            let conn = pool.get_session(&Context::background())?;
            conn.set_module("payroll")?;
            conn.set_action("monthly run")?;
            conn.set_client_identifier("jdoe")?;
            conn.set_client_info("batch 7")?;

            let stmt = conn.prepare(sql)?;
            let row = stmt.query_single(())?.expect("one row");
            let module : &str = row.get("MODULE")?.unwrap();
            let action : &str = row.get("ACTION")?.unwrap();
            let client_id : &str = row.get("CLIENT_IDENTIFIER")?.unwrap();
            let client_info : &str = row.get("CLIENT_INFO")?.unwrap();
            assert_eq!(module, "payroll");
            assert_eq!(action, "monthly run");
            assert_eq!(client_id, "jdoe");
            assert_eq!(client_info, "batch 7");
        }
        // tags do not leak to the next user of the session
        let conn = pool.get_session(&Context::background())?;
        let stmt = conn.prepare(sql)?;
        let row = stmt.query_single(())?.expect("one row");
        assert!(row.is_null("MODULE"));
        assert!(row.is_null(3));
        Ok(())
    }

    #[test]
    fn session_parameters() -> Result<()> {
        let server = common::session_server();
        server.set_nls_default("NLS_TERRITORY", "AUSTRALIA");
        let (_oracle, conn) = common::connect(&server)?;
        assert_eq!(common::nls_parameter(&conn, "NLS_TERRITORY")?.as_deref(), Some("AUSTRALIA"));

        let stmt = conn.prepare("ALTER SESSION SET NLS_DATE_FORMAT = 'YYYY-MM-DD' NLS_TERRITORY='NEW ZEALAND'")?;
        stmt.execute(())?;
        assert_eq!(common::nls_parameter(&conn, "NLS_DATE_FORMAT")?.as_deref(), Some("YYYY-MM-DD"));
        assert_eq!(common::nls_parameter(&conn, "nls_territory")?.as_deref(), Some("NEW ZEALAND"));
        assert_eq!(common::nls_parameter(&conn, "NLS_UNKNOWN")?, None);

        let err = conn.prepare("ALTER SESSION SET NLS_DATE_FORMAT = 'YYYY")?.execute(()).unwrap_err();
        assert_eq!(err.code(), Some(1756));
        Ok(())
    }
}
