mod common;

mod tests {
    use augur::*;
    use augur::native::scripted::{ScriptedServer, Reply};
    use crate::common;
    use std::{thread, time::Duration};

    /// Counts round trips that executing `SELECT n FROM numbers` and fetching every row takes.
    fn count_round_trips(conn: &Connection, prefetch_rows: Option<i32>, array_size: Option<i32>, expected_rows: usize) -> Result<u64> {
        let stmt = conn.prepare("SELECT n FROM numbers")?;
        if let Some(num_rows) = prefetch_rows {
            stmt.set_prefetch_rows(num_rows);
        }
        if let Some(num_rows) = array_size {
            stmt.set_fetch_array_size(num_rows);
        }
        let before = conn.round_trips();
        let mut rows = stmt.query(())?;
        let mut count = 0;
        while let Some(row) = rows.next()? {
            count += 1;
            let n : i64 = row.get(0)?.unwrap();
            assert_eq!(n, count as i64);
        }
        assert_eq!(count, expected_rows);
        Ok(conn.round_trips() - before)
    }

    const DEFAULT : Option<i32> = None;

    /// (prefetch rows, fetch array size, round trips for 1 row, round trips for 214 rows)
    const ROUND_TRIPS : [(Option<i32>, Option<i32>, u64, u64); 24] = [
        (DEFAULT,    DEFAULT,    1,  4),
        (Some(0),    DEFAULT,    2,  4),
        (Some(1),    DEFAULT,    2,  4),
        (Some(2),    DEFAULT,    1,  4),
        (Some(100),  DEFAULT,    1,  3),
        (Some(-1),   Some(100),  2,  4),
        (Some(0),    Some(100),  2,  4),
        (Some(1),    Some(100),  2,  4),
        (Some(2),    Some(100),  1,  4),
        (Some(100),  Some(100),  1,  3),
        (DEFAULT,    Some(40),   1,  7),
        (Some(2),    Some(40),   1,  7),
        (Some(-1),   Some(40),   2,  7),
        (Some(120),  DEFAULT,    1,  3),
        (Some(120),  Some(100),  1,  3),
        (Some(120),  Some(0),    1,  3),
        (Some(120),  Some(-1),   1,  3),
        (Some(120),  Some(250),  1,  2),
        (Some(0),    Some(10),   2, 23),
        (Some(10),   Some(10),   1, 22),
        (Some(214),  Some(214),  1,  2),
        (Some(215),  Some(214),  1,  1),
        (Some(215),  DEFAULT,    1,  1),
        (Some(215),  Some(10),   1,  1),
    ];

    #[test]
    fn single_row_round_trips() -> Result<()> {
        let server = common::numbers_server(1);
        let (_oracle, conn) = common::connect(&server)?;
        for (prefetch_rows, array_size, expected, _) in ROUND_TRIPS {
            let round_trips = count_round_trips(&conn, prefetch_rows, array_size, 1)?;
            assert_eq!(round_trips, expected, "prefetch rows {:?}, fetch array size {:?}", prefetch_rows, array_size);
        }
        assert_eq!(server.open_cursors(), 0);
        Ok(())
    }

    #[test]
    fn multi_row_round_trips() -> Result<()> {
        let server = common::numbers_server(214);
        let (_oracle, conn) = common::connect(&server)?;
        for (prefetch_rows, array_size, _, expected) in ROUND_TRIPS {
            let round_trips = count_round_trips(&conn, prefetch_rows, array_size, 214)?;
            assert_eq!(round_trips, expected, "prefetch rows {:?}, fetch array size {:?}", prefetch_rows, array_size);
        }
        Ok(())
    }

    #[test]
    fn explicit_default() -> Result<()> {
        let server = common::numbers_server(214);
        let (_oracle, conn) = common::connect(&server)?;
        let round_trips = count_round_trips(&conn, Some(FETCH_DEFAULT), Some(FETCH_DEFAULT), 214)?;
        assert_eq!(round_trips, 4);
        Ok(())
    }

    #[test]
    fn empty_result() -> Result<()> {
        let server = common::numbers_server(0);
        let (_oracle, conn) = common::connect(&server)?;
        assert_eq!(count_round_trips(&conn, DEFAULT, DEFAULT, 0)?, 1);
        assert_eq!(count_round_trips(&conn, Some(0), DEFAULT, 0)?, 2);
        Ok(())
    }

    #[test]
    fn exhausted_is_terminal() -> Result<()> {
        let server = common::numbers_server(3);
        let (_oracle, conn) = common::connect(&server)?;
        let stmt = conn.prepare("SELECT n FROM numbers")?;
        let mut rows = stmt.query(())?;
        while rows.next()?.is_some() {}
        let before = conn.round_trips();
        assert!(rows.next()?.is_none());
        assert!(rows.next()?.is_none());
        assert_eq!(conn.round_trips(), before);
        Ok(())
    }

    #[test]
    fn closed_rows() -> Result<()> {
        let server = common::numbers_server(10);
        let (_oracle, conn) = common::connect(&server)?;
        let stmt = conn.prepare("SELECT n FROM numbers")?;
        let mut rows = stmt.query(())?;
        assert!(rows.next()?.is_some());
        assert_eq!(server.open_cursors(), 1);
        let before = conn.round_trips();
        rows.close();
        assert_eq!(conn.round_trips(), before);
        assert_eq!(server.open_cursors(), 0);
        assert!(matches!(rows.next(), Err(Error::CursorClosed)));
        Ok(())
    }

    fn slow_server() -> ScriptedServer {
        common::init_logging();
        let server = ScriptedServer::new();
        server.on("SELECT n FROM slow_numbers", |_| {
            let rows = (1..=10).map(|n| vec![Value::Int(n)]).collect();
            Ok(Reply::rows(vec![ColumnInfo::new("N", ColumnType::Number)], rows).fetch_delay(Duration::from_secs(5)))
        });
        server
    }

    #[test]
    fn deadline_during_fetch() -> Result<()> {
        let server = slow_server();
        let (_oracle, conn) = common::connect(&server)?;
        let stmt = conn.prepare("SELECT n FROM slow_numbers")?;
        stmt.set_prefetch_rows(0);
        stmt.set_context(&Context::background().with_timeout(Duration::from_millis(100)));
        let mut rows = stmt.query(())?;

        let res = rows.next();
        assert!(matches!(res, Err(Error::DeadlineExceeded)));
        // the cursor stays in the failed state
        assert!(matches!(rows.next(), Err(Error::DeadlineExceeded)));
        drop(rows);
        drop(stmt);

        // the session survives the interrupted call
        assert!(conn.is_valid());
        conn.ping()?;
        Ok(())
    }

    #[test]
    fn cancel_during_fetch() -> Result<()> {
        let server = slow_server();
        let (_oracle, conn) = common::connect(&server)?;
        let stmt = conn.prepare("SELECT n FROM slow_numbers")?;
        stmt.set_prefetch_rows(0);
        let (ctx, cancel) = Context::background().with_cancel();
        stmt.set_context(&ctx);
        let mut rows = stmt.query(())?;

        let canceler = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            cancel.cancel();
        });
        let res = rows.next();
        canceler.join().expect("canceling thread");
        assert!(matches!(res, Err(Error::Canceled)));
        assert!(matches!(rows.next(), Err(Error::Canceled)));
        Ok(())
    }

    #[test]
    fn break_execution() -> Result<()> {
        let server = ScriptedServer::new();
        server.on("BEGIN DBMS_SESSION.SLEEP", |call| {
            call.sleep(Duration::from_secs(10))?;
            Ok(Reply::done())
        });
        let (_oracle, conn) = common::connect(&server)?;
        let res = thread::scope(|scope| {
            scope.spawn(|| {
                thread::sleep(Duration::from_millis(50));
                conn.break_execution();
            });
            let stmt = conn.prepare("BEGIN DBMS_SESSION.SLEEP(10); END;")?;
            stmt.execute(())
        });
        assert!(matches!(res, Err(Error::Canceled)));
        conn.ping()?;
        Ok(())
    }

    #[test]
    fn nested_cursors() -> Result<()> {
        let server = ScriptedServer::new();
        server.on("SELECT department_name, CURSOR(", |call| {
            let emp_cols = vec![ColumnInfo::new("LAST_NAME", ColumnType::Varchar)];
            let admin = call.open_cursor(emp_cols.clone(), vec![vec![Value::Text("Whalen".to_string())]]);
            let marketing = call.open_cursor(emp_cols, vec![
                vec![Value::Text("Hartstein".to_string())],
                vec![Value::Text("Fay".to_string())],
            ]);
            Ok(Reply::rows(
                vec![ColumnInfo::new("DEPARTMENT_NAME", ColumnType::Varchar), ColumnInfo::new("EMPLOYEES", ColumnType::Cursor)],
                vec![
                    vec![Value::Text("Administration".to_string()), admin],
                    vec![Value::Text("Marketing".to_string()), marketing],
                ],
            ))
        });
        let (_oracle, conn) = common::connect(&server)?;
        let stmt = conn.prepare("
            SELECT department_name, CURSOR(
                     SELECT last_name FROM hr.employees e WHERE e.department_id = d.department_id
                   ) AS employees
              FROM hr.departments d
        ")?;
        let mut rows = stmt.query(())?;
        assert_eq!(server.open_cursors(), 3);

        let row = rows.next()?.expect("first department");
        let name : &str = row.get(0)?.unwrap();
        assert_eq!(name, "Administration");
        let employees : Cursor = row.get("EMPLOYEES")?.unwrap();
        let mut emp_rows = employees.rows()?;
        let emp = emp_rows.next()?.expect("first employee");
        let last_name : String = emp.get(0)?.unwrap();
        assert_eq!(last_name, "Whalen");
        assert!(emp_rows.next()?.is_none());
        drop(emp_rows);

        let row = rows.next()?.expect("second department");
        let employees : Cursor = row.get(1)?.unwrap();
        assert!(employees.is_open());

        // closing the parent closes the cursors its rows produced
        rows.close();
        assert!(!employees.is_open());
        assert!(matches!(employees.rows(), Err(Error::CursorClosed)));
        assert_eq!(server.open_cursors(), 0);
        Ok(())
    }

    const DEPARTMENTS: &str = "SELECT department_name, CURSOR(SELECT last_name FROM hr.employees e WHERE e.department_id = d.department_id) FROM hr.departments d";

    fn departments_server() -> ScriptedServer {
        let server = ScriptedServer::new();
        server.on("FROM hr.departments d", |call| {
            let emp_cols = vec![ColumnInfo::new("LAST_NAME", ColumnType::Varchar)];
            let rows = ["Administration", "Marketing", "Purchasing"].iter().map(|name| {
                let employees = call.open_cursor(emp_cols.clone(), vec![vec![Value::Text(format!("{} manager", name))]]);
                vec![Value::Text(name.to_string()), employees]
            }).collect();
            Ok(Reply::rows(
                vec![ColumnInfo::new("DEPARTMENT_NAME", ColumnType::Varchar), ColumnInfo::new("EMPLOYEES", ColumnType::Cursor)],
                rows,
            ))
        });
        server
    }

    #[test]
    fn close_with_unread_nested_cursors() -> Result<()> {
        let server = departments_server();
        let (_oracle, conn) = common::connect(&server)?;
        let stmt = conn.prepare(DEPARTMENTS)?;

        let mut rows = stmt.query(())?;
        assert_eq!(server.open_cursors(), 4);
        let row = rows.next()?.expect("first department");
        let name : String = row.get(0)?.unwrap();
        assert_eq!(name, "Administration");
        rows.close();
        assert_eq!(server.open_cursors(), 0);

        // none of the rows were read
        let rows = stmt.query(())?;
        assert_eq!(server.open_cursors(), 4);
        drop(rows);
        assert_eq!(server.open_cursors(), 0);
        Ok(())
    }

    #[test]
    fn close_with_fetched_nested_cursors() -> Result<()> {
        let server = departments_server();
        let (_oracle, conn) = common::connect(&server)?;
        let stmt = conn.prepare(DEPARTMENTS)?;
        stmt.set_prefetch_rows(0);

        let mut rows = stmt.query(())?;
        let row = rows.next()?.expect("first department");
        let employees : Cursor = row.get(1)?.unwrap();
        let mut emp_rows = employees.rows()?;
        let emp = emp_rows.next()?.expect("department manager");
        let last_name : String = emp.get(0)?.unwrap();
        assert_eq!(last_name, "Administration manager");

        // the other two departments are still in the fetched batch
        drop(rows);
        assert_eq!(server.open_cursors(), 0);
        assert!(matches!(emp_rows.next(), Err(Error::CursorClosed)));
        Ok(())
    }

    #[test]
    fn cursor_out_parameter() -> Result<()> {
        let server = ScriptedServer::new();
        server.on("OPEN :lines FOR", |call| {
            let rows = (1..=250).map(|n| vec![Value::Int(n)]).collect();
            let cursor = call.open_cursor(vec![ColumnInfo::new("LINE", ColumnType::Number)], rows);
            call.set_out_named(":LINES", cursor);
            Ok(Reply::done())
        });
        let (_oracle, conn) = common::connect(&server)?;
        let stmt = conn.prepare("BEGIN OPEN :lines FOR SELECT level FROM dual CONNECT BY level <= 250; END;")?;
        let mut lines = Cursor::new(&stmt);
        assert!(!lines.is_open());
        stmt.execute(&mut lines)?;
        assert!(lines.is_open());
        assert_eq!(lines.columns()?[0].name(), "LINE");

        lines.set_fetch_array_size(50);
        let before = conn.round_trips();
        let mut rows = lines.rows()?;
        let mut count = 0;
        while rows.next()?.is_some() {
            count += 1;
        }
        assert_eq!(count, 250);
        // 5 full batches and an empty one
        assert_eq!(conn.round_trips() - before, 6);
        drop(rows);

        // statement owns the cursors returned through its parameters
        drop(stmt);
        assert_eq!(server.open_cursors(), 0);
        Ok(())
    }

    #[test]
    fn implicit_results() -> Result<()> {
        let server = ScriptedServer::new();
        server.on("DBMS_SQL.RETURN_RESULT", |_| {
            let cols = vec![ColumnInfo::new("CITY", ColumnType::Varchar)];
            Ok(Reply::done()
                .implicit(cols.clone(), vec![vec![Value::Text("Roma".to_string())]])
                .implicit(cols, vec![vec![Value::Text("Venice".to_string())], vec![Value::Text("Tokyo".to_string())]]))
        });
        let (_oracle, conn) = common::connect(&server)?;
        let stmt = conn.prepare("
            DECLARE
                c1 SYS_REFCURSOR;
                c2 SYS_REFCURSOR;
            BEGIN
                OPEN c1 FOR SELECT city FROM hr.locations WHERE location_id = 1000;
                DBMS_SQL.RETURN_RESULT(c1);
                OPEN c2 FOR SELECT city FROM hr.locations WHERE location_id IN (1100, 1200);
                DBMS_SQL.RETURN_RESULT(c2);
            END;
        ")?;
        stmt.execute(())?;
        assert_eq!(server.open_cursors(), 2);

        let mut cities = Vec::new();
        while let Some(cursor) = stmt.next_result()? {
            let mut rows = cursor.rows()?;
            while let Some(row) = rows.next()? {
                let city : String = row.get("CITY")?.unwrap();
                cities.push(city);
            }
        }
        assert_eq!(cities, ["Roma", "Venice", "Tokyo"]);
        assert!(stmt.next_result()?.is_none());

        drop(stmt);
        assert_eq!(server.open_cursors(), 0);
        Ok(())
    }

    #[test]
    fn reexecute_with_cursor_out_parameter() -> Result<()> {
        let server = ScriptedServer::new();
        server.on("OPEN :lines FOR", |call| {
            let rows = (1..=3).map(|n| vec![Value::Int(n)]).collect();
            let cursor = call.open_cursor(vec![ColumnInfo::new("LINE", ColumnType::Number)], rows);
            call.set_out(0, cursor);
            Ok(Reply::done())
        });
        let (_oracle, conn) = common::connect(&server)?;
        let stmt = conn.prepare("BEGIN OPEN :lines FOR SELECT level FROM dual CONNECT BY level <= 3; END;")?;
        for _ in 0..5 {
            let mut lines = Cursor::new(&stmt);
            stmt.execute(&mut lines)?;
            let mut rows = lines.rows()?;
            let mut count = 0;
            while rows.next()?.is_some() {
                count += 1;
            }
            assert_eq!(count, 3);
            drop(rows);
            assert_eq!(server.open_cursors(), 0);
        }

        // a cursor that was never read is closed when it is dropped
        let mut lines = Cursor::new(&stmt);
        stmt.execute(&mut lines)?;
        assert_eq!(server.open_cursors(), 1);
        drop(lines);
        assert_eq!(server.open_cursors(), 0);

        // reusing the same cursor closes the one it replaced
        let mut lines = Cursor::new(&stmt);
        stmt.execute(&mut lines)?;
        stmt.execute(&mut lines)?;
        assert_eq!(server.open_cursors(), 1);
        drop(lines);
        assert_eq!(server.open_cursors(), 0);
        Ok(())
    }

    #[test]
    fn reexecute_with_unread_implicit_results() -> Result<()> {
        let server = ScriptedServer::new();
        server.on("DBMS_SQL.RETURN_RESULT", |_| {
            let cols = vec![ColumnInfo::new("CITY", ColumnType::Varchar)];
            Ok(Reply::done()
                .implicit(cols.clone(), vec![vec![Value::Text("Roma".to_string())]])
                .implicit(cols, vec![vec![Value::Text("Venice".to_string())]]))
        });
        let (_oracle, conn) = common::connect(&server)?;
        let stmt = conn.prepare("BEGIN DBMS_SQL.RETURN_RESULT(c1); DBMS_SQL.RETURN_RESULT(c2); END;")?;
        for _ in 0..3 {
            stmt.execute(())?;
            assert_eq!(server.open_cursors(), 2);
        }
        let first = stmt.next_result()?.expect("first result");
        drop(first);
        assert_eq!(server.open_cursors(), 1);
        stmt.execute(())?;
        assert_eq!(server.open_cursors(), 2);
        drop(stmt);
        assert_eq!(server.open_cursors(), 0);
        Ok(())
    }

    #[test]
    fn describe_without_fetching() -> Result<()> {
        let server = ScriptedServer::new();
        server.on("FROM hr.employees", |_| {
            Ok(Reply::rows(
                vec![
                    ColumnInfo::new("EMPLOYEE_ID", ColumnType::Number).with_nullable(false).with_precision(6, 0),
                    ColumnInfo::new("LAST_NAME", ColumnType::Varchar).with_nullable(false).with_size(25),
                    ColumnInfo::new("COMMISSION_PCT", ColumnType::Number).with_precision(2, 2),
                ],
                vec![vec![Value::Int(100), Value::Text("King".to_string()), Value::Null]],
            ))
        });
        let (_oracle, conn) = common::connect(&server)?;
        let stmt = conn.prepare("SELECT employee_id, last_name, commission_pct FROM hr.employees")?;
        assert!(stmt.columns().is_none());
        let cols = stmt.describe()?;
        assert_eq!(server.open_cursors(), 0);
        assert_eq!(cols.len(), 3);
        assert_eq!(cols[0].name(), "EMPLOYEE_ID");
        assert!(!cols[0].is_nullable());
        assert_eq!(cols[0].precision(), 6);
        assert_eq!(cols[1].size(), 25);
        assert!(cols[2].is_nullable());
        assert_eq!(cols[2].scale(), 2);
        assert_eq!(stmt.columns().map(|cols| cols.len()), Some(3));

        let row = stmt.query_single(())?.expect("one row");
        assert!(row.is_null("COMMISSION_PCT"));
        let pct : Option<f64> = row.get(2)?;
        assert_eq!(pct, None);
        assert!(row.get::<i64, _>("NO_SUCH_COLUMN").is_err());
        Ok(())
    }
}
