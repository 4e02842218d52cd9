//! SQL or PL/SQL statement

pub mod args;
pub mod bind;
pub mod fromsql;
pub mod cols;
pub mod cursor;
pub mod rows;

pub use rows::{Rows, Row};
pub use cursor::Cursor;
pub use args::ToSql;
pub use fromsql::FromSql;
pub use cols::{ColumnInfo, Position};

use bind::Params;
use cols::Columns;
use cursor::CursorLink;
use crate::{
    Connection, Context, Error, Result,
    lob::LobFetch,
    native::{ExecMode, ExecuteRequest},
    types::{BoolEncoding, Codec, LobLocator, RefCursor, Value},
};
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, MutexGuard};
use std::{collections::VecDeque, sync::Arc};

/// Prefetch rows or fetch array size value that selects the default
pub const FETCH_DEFAULT : i32 = -99;

const DEFAULT_PREFETCH_ROWS : usize = 2;
const DEFAULT_FETCH_ARRAY_SIZE : usize = 100;

/// Settings that rows and cursors inherit from the statement that produced them
#[derive(Debug, Clone)]
pub(crate) struct FetchOptions {
    pub(crate) prefetch_rows: i32,
    pub(crate) array_size: i32,
    pub(crate) lob_fetch: LobFetch,
    pub(crate) codec: Codec,
}

impl FetchOptions {
    /// Number of rows returned by the execute round trip
    pub(crate) fn prefetch_rows(&self) -> usize {
        match self.prefetch_rows {
            FETCH_DEFAULT => DEFAULT_PREFETCH_ROWS,
            n if n < 0 => 0,
            n => n as usize,
        }
    }

    /// Number of rows in each fetched batch
    pub(crate) fn array_size(&self) -> usize {
        if self.array_size <= 0 { DEFAULT_FETCH_ARRAY_SIZE } else { self.array_size as usize }
    }
}

struct Options {
    prefetch_rows: i32,
    array_size: i32,
    lob_fetch: LobFetch,
    plsql_arrays: bool,
    bools: Option<BoolEncoding>,
}

/// Returns `true` if the statement may leave uncommitted changes or locks in the session.
fn is_transactional(sql: &str) -> bool {
    let mut text = sql.trim_start();
    loop {
        if let Some(rest) = text.strip_prefix("--") {
            text = rest.split_once('\n').map_or("", |(_, rest)| rest).trim_start();
        } else if let Some(rest) = text.strip_prefix("/*") {
            text = rest.split_once("*/").map_or("", |(_, rest)| rest).trim_start();
        } else {
            break;
        }
    }
    let keyword : String = text.chars().take_while(|c| c.is_ascii_alphabetic()).collect::<String>().to_uppercase();
    match keyword.as_str() {
        "INSERT" | "UPDATE" | "DELETE" | "MERGE" | "BEGIN" | "DECLARE" | "CALL" | "LOCK" => true,
        "SELECT" | "WITH" => text.to_uppercase().contains("FOR UPDATE"),
        _ => false,
    }
}

/// Represents a prepared for execution SQL or PL/SQL statement
pub struct Statement<'a> {
    conn:      &'a Connection,
    sql:       String,
    params:    Mutex<Params>,
    opts:      Mutex<Options>,
    ctx:       Mutex<Context>,
    cols:      OnceCell<Arc<Columns>>,
    cursors:   Mutex<Vec<Arc<CursorLink>>>,
    implicit:  Mutex<VecDeque<(RefCursor, Arc<CursorLink>)>>,
    temp_lobs: Mutex<Vec<LobLocator>>,
}

impl Drop for Statement<'_> {
    fn drop(&mut self) {
        for link in self.cursors.get_mut().drain(..) {
            link.close(self.conn);
        }
        let background = Context::background();
        for lob in self.temp_lobs.get_mut().drain(..) {
            if let Err(err) = self.conn.lob_free(&background, &lob) {
                tracing::debug!(lob = lob.id, %err, "temporary LOB was not freed");
            }
        }
    }
}

impl<'a> Statement<'a> {
    pub(crate) fn new(conn: &'a Connection, sql: &str) -> Self {
        Self {
            conn,
            sql: sql.to_string(),
            params: Mutex::new(Params::new(sql)),
            opts: Mutex::new(Options {
                prefetch_rows: FETCH_DEFAULT,
                array_size: FETCH_DEFAULT,
                lob_fetch: LobFetch::default(),
                plsql_arrays: false,
                bools: None,
            }),
            ctx: Mutex::new(conn.context()),
            cols: OnceCell::new(),
            cursors: Mutex::new(Vec::new()),
            implicit: Mutex::new(VecDeque::new()),
            temp_lobs: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn connection(&self) -> &'a Connection {
        self.conn
    }

    /// Returns the context that governs the statement's round trips.
    pub fn context(&self) -> Context {
        self.ctx.lock().clone()
    }

    /// Replaces the context that governs the statement's round trips.
    pub fn set_context(&self, ctx: &Context) {
        *self.ctx.lock() = ctx.clone();
    }

    pub(crate) fn fetch_options(&self) -> FetchOptions {
        let opts = self.opts.lock();
        FetchOptions {
            prefetch_rows: opts.prefetch_rows,
            array_size: opts.array_size,
            lob_fetch: opts.lob_fetch,
            codec: Codec::new(self.conn.timezone(), opts.bools.clone()),
        }
    }

    /// Returns the statement text
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /**
        Sets the number of top level rows to be prefetched by the execute round trip.

        [`FETCH_DEFAULT`] selects the default, which is 2. Negative values disable prefetching.

        # Example

        ```
        use augur::{ColumnInfo, ColumnType, ConnectionParams, Value};
        use augur::native::scripted::{ScriptedServer, Reply};

        let server = ScriptedServer::new();
        server.on("SELECT n FROM numbers", |_| {
            let rows = (1..=214).map(|n| vec![Value::Int(n)]).collect();
            Ok(Reply::rows(vec![ColumnInfo::new("N", ColumnType::Number)], rows))
        });
        let oracle = augur::env(server);
        let conn = oracle.connect(&ConnectionParams::builder().connect_string("scripted").build()?)?;

        let stmt = conn.prepare("SELECT n FROM numbers")?;
        stmt.set_prefetch_rows(215);
        let before = conn.round_trips();
        let mut rows = stmt.query(())?;
        let mut count = 0;
        while rows.next()?.is_some() {
            count += 1;
        }
        assert_eq!(count, 214);
        assert_eq!(conn.round_trips() - before, 1);
        # Ok::<(),augur::Error>(())
        ```
    */
    pub fn set_prefetch_rows(&self, num_rows: i32) {
        self.opts.lock().prefetch_rows = num_rows;
    }

    /// Sets the number of rows fetched by each fetch round trip. Values below 1 and [`FETCH_DEFAULT`] select the default, which is 100.
    pub fn set_fetch_array_size(&self, num_rows: i32) {
        self.opts.lock().array_size = num_rows;
    }

    /// Enables binding of slices and vectors as PL/SQL index-by tables.
    pub fn set_plsql_arrays(&self, enable: bool) {
        self.opts.lock().plsql_arrays = enable;
    }

    /// Selects how LOB columns are returned.
    pub fn set_lob_fetch(&self, lob_fetch: LobFetch) {
        self.opts.lock().lob_fetch = lob_fetch;
    }

    /**
        Sets the text codes booleans are bound as and decoded from. `None` binds
        booleans natively and decodes them only from numbers.
    */
    pub fn set_bool_encoding(&self, encoding: Option<BoolEncoding>) {
        self.opts.lock().bools = encoding;
    }

    fn bind_args(&self, ctx: &Context, args: &mut impl ToSql, params: &mut Params) -> Result<()> {
        let (codec, plsql_arrays) = {
            let opts = self.opts.lock();
            (Codec::new(self.conn.timezone(), opts.bools.clone()), opts.plsql_arrays)
        };
        params.reset(codec, plsql_arrays);
        args.bind_to(0, params)?;
        params.check_complete()?;
        for (pos, src) in params.take_lobs() {
            let lob = self.conn.lob_create_temp(ctx, src.kind())?;
            self.temp_lobs.lock().push(lob.clone());
            src.write_into(self.conn, ctx, &lob)?;
            params.set_value(pos, Value::Lob(lob));
        }
        Ok(())
    }

    fn run(&self, ctx: &Context, params: &mut MutexGuard<Params>, args: &mut impl ToSql, rows: Vec<Vec<crate::native::BindSlot>>, prefetch_rows: usize, mode: ExecMode) -> Result<crate::native::ExecuteResponse> {
        tracing::trace!(sql = %self.sql, ?mode, "execute");
        // implicit results the previous execution left unread
        for (_, link) in self.implicit.lock().drain(..) {
            link.close(self.conn);
        }
        let mut resp = self.conn.execute(ctx, ExecuteRequest { sql: &self.sql, rows, prefetch_rows, mode })?;
        if is_transactional(&self.sql) {
            self.conn.mark_in_txn();
        }
        params.set_outs(std::mem::take(&mut resp.outs));
        args.update_from_bind(0, params)?;
        let mut cursors = self.cursors.lock();
        cursors.retain(|link| link.is_open());
        cursors.extend(params.take_links());
        let mut implicit = self.implicit.lock();
        for cursor in std::mem::take(&mut resp.implicit) {
            let link = CursorLink::new(cursor.id);
            cursors.push(link.clone());
            implicit.push_back((cursor, link));
        }
        Ok(resp)
    }

    /**
        Executes the prepared statement. Returns the number of rows affected.

        # Example

        ```
        use augur::{ConnectionParams, Value};
        use augur::native::scripted::{ScriptedServer, Reply};

        let server = ScriptedServer::new();
        server.on("UPDATE hr.employees", |call| {
            assert_eq!(call.named(":ID"), &Value::Int(107));
            Ok(Reply::affected(1))
        });
        let oracle = augur::env(server);
        let conn = oracle.connect(&ConnectionParams::builder().connect_string("scripted").build()?)?;
        let stmt = conn.prepare("
            UPDATE hr.employees
               SET salary = :new_salary
             WHERE employee_id = :id
        ")?;
        let num_updated = stmt.execute((
            (":ID",         107  ),
            (":NEW_SALARY", 4200 ),
        ))?;
        assert_eq!(num_updated, 1);
        conn.rollback()?;
        # Ok::<(),augur::Error>(())
        ```
    */
    pub fn execute(&self, args: impl ToSql) -> Result<usize> {
        let mut args = args;
        let ctx = self.context();
        let mut params = self.params.lock();
        self.bind_args(&ctx, &mut args, &mut params)?;
        let rows = vec![params.slots()];
        let resp = self.run(&ctx, &mut params, &mut args, rows, 0, ExecMode::Execute)?;
        if let Some(query) = resp.query {
            self.conn.close_cursor(query.cursor.id);
        }
        Ok(resp.rows_affected as usize)
    }

    /**
        Executes an array DML: the statement runs once for each argument row, in
        one round trip. Returns the total number of rows affected.

        OUT arguments are not updated.
    */
    pub fn execute_many<T: ToSql>(&self, rows: &mut [T]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        let ctx = self.context();
        let mut params = self.params.lock();
        let mut arg_rows = Vec::with_capacity(rows.len());
        for args in rows.iter_mut() {
            self.bind_args(&ctx, args, &mut params)?;
            arg_rows.push(params.slots());
        }
        let resp = self.run(&ctx, &mut params, &mut (), arg_rows, 0, ExecMode::Execute)?;
        if let Some(query) = resp.query {
            self.conn.close_cursor(query.cursor.id);
        }
        Ok(resp.rows_affected as usize)
    }

    /**
        Executes the prepared statement. Returns the result set.

        # Example

        ```
        use augur::{ColumnInfo, ColumnType, ConnectionParams, Value};
        use augur::native::scripted::{ScriptedServer, Reply};

        let server = ScriptedServer::new();
        server.on("FROM hr.employees", |_| {
            Ok(Reply::rows(
                vec![ColumnInfo::new("EMPLOYEE_ID", ColumnType::Number), ColumnInfo::new("LAST_NAME", ColumnType::Varchar)],
                vec![vec![Value::Int(101), Value::Text("Kochhar".to_string())]],
            ))
        });
        let oracle = augur::env(server);
        let conn = oracle.connect(&ConnectionParams::builder().connect_string("scripted").build()?)?;
        let stmt = conn.prepare("
            SELECT employee_id, last_name
              FROM hr.employees
             WHERE manager_id = :id
        ")?;
        let mut rows = stmt.query(100)?;
        let mut names = Vec::new();
        while let Some(row) = rows.next()? {
            let name : Option<&str> = row.get("LAST_NAME")?;
            names.push(name.unwrap_or_default().to_string());
        }
        assert_eq!(names, ["Kochhar"]);
        # Ok::<(),augur::Error>(())
        ```
    */
    pub fn query(&self, args: impl ToSql) -> Result<Rows<'a>> {
        let mut args = args;
        let ctx = self.context();
        let opts = self.fetch_options();
        let mut params = self.params.lock();
        self.bind_args(&ctx, &mut args, &mut params)?;
        let rows = vec![params.slots()];
        let resp = self.run(&ctx, &mut params, &mut args, rows, opts.prefetch_rows(), ExecMode::Execute)?;
        let query = resp.query.ok_or_else(|| Error::new("statement did not return a result set"))?;
        let cols = self.cols.get_or_init(|| Arc::new(Columns::new(query.cursor.columns.clone()))).clone();
        let link = CursorLink::new(query.cursor.id);
        Ok(Rows::from_query(self.conn, ctx, opts, cols, link, query.rows))
    }

    /**
        Convenience method to execute a query that returns a single row.
        Returns `None` if the query did not return any rows.
    */
    pub fn query_single(&self, args: impl ToSql) -> Result<Option<Row<'a>>> {
        let mut rows = self.query(args)?;
        rows.next()
    }

    /// Parses the statement without executing it. Reports syntax and semantic errors.
    pub fn parse(&self) -> Result<()> {
        let ctx = self.context();
        self.conn.execute(&ctx, ExecuteRequest { sql: &self.sql, rows: Vec::new(), prefetch_rows: 0, mode: ExecMode::ParseOnly })?;
        Ok(())
    }

    /**
        Describes the select list of a query without fetching any rows.
    */
    pub fn describe(&self) -> Result<Vec<ColumnInfo>> {
        if let Some(cols) = self.cols.get() {
            return Ok(cols.infos().to_vec());
        }
        let ctx = self.context();
        let resp = self.conn.execute(&ctx, ExecuteRequest { sql: &self.sql, rows: Vec::new(), prefetch_rows: 0, mode: ExecMode::DescribeOnly })?;
        let cols = self.cols.get_or_init(|| Arc::new(Columns::new(Arc::new(resp.columns))));
        Ok(cols.infos().to_vec())
    }

    /// Returns the column descriptions of the last result set, if the statement was described or queried.
    pub fn columns(&self) -> Option<&[ColumnInfo]> {
        self.cols.get().map(|cols| cols.infos())
    }

    /**
        Returns the next implicit result of the executed PL/SQL block, or `None`
        when all of them have been returned.

        # Example

        ```
        use augur::{ColumnInfo, ColumnType, ConnectionParams, Value};
        use augur::native::scripted::{ScriptedServer, Reply};

        let server = ScriptedServer::new();
        server.on("DBMS_SQL.RETURN_RESULT", |_| {
            let cols = vec![ColumnInfo::new("N", ColumnType::Number)];
            Ok(Reply::done()
                .implicit(cols.clone(), vec![vec![Value::Int(1)]])
                .implicit(cols, vec![vec![Value::Int(2)], vec![Value::Int(3)]]))
        });
        let oracle = augur::env(server);
        let conn = oracle.connect(&ConnectionParams::builder().connect_string("scripted").build()?)?;
        let stmt = conn.prepare("
            DECLARE
                c1 SYS_REFCURSOR;
                c2 SYS_REFCURSOR;
            BEGIN
                OPEN c1 FOR SELECT 1 FROM dual;
                DBMS_SQL.RETURN_RESULT(c1);
                OPEN c2 FOR SELECT level + 1 FROM dual CONNECT BY level <= 2;
                DBMS_SQL.RETURN_RESULT(c2);
            END;
        ")?;
        stmt.execute(())?;
        let mut counts = Vec::new();
        while let Some(cursor) = stmt.next_result()? {
            let mut rows = cursor.rows()?;
            let mut count = 0;
            while rows.next()?.is_some() {
                count += 1;
            }
            counts.push(count);
        }
        assert_eq!(counts, [1, 2]);
        # Ok::<(),augur::Error>(())
        ```
    */
    pub fn next_result(&self) -> Result<Option<Cursor<'a>>> {
        let next = self.implicit.lock().pop_front();
        Ok(next.map(|(cursor, link)| Cursor::from_parts(self.conn, self.context(), self.fetch_options(), cursor, link)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_tunables() {
        let opts = |prefetch_rows, array_size| FetchOptions { prefetch_rows, array_size, lob_fetch: LobFetch::Materialize, codec: Codec::default() };
        assert_eq!(opts(FETCH_DEFAULT, FETCH_DEFAULT).prefetch_rows(), 2);
        assert_eq!(opts(FETCH_DEFAULT, FETCH_DEFAULT).array_size(), 100);
        assert_eq!(opts(-1, 0).prefetch_rows(), 0);
        assert_eq!(opts(-1, 0).array_size(), 100);
        assert_eq!(opts(120, -1).array_size(), 100);
        assert_eq!(opts(0, 10).array_size(), 10);
    }

    #[test]
    fn transactional_statements() {
        assert!(is_transactional("insert into t values (1)"));
        assert!(is_transactional("  -- comment\n /* block */ UPDATE t SET x = 1"));
        assert!(is_transactional("BEGIN NULL; END;"));
        assert!(is_transactional("SELECT * FROM t FOR UPDATE"));
        assert!(!is_transactional("SELECT * FROM t"));
        assert!(!is_transactional("CREATE TABLE t (x NUMBER)"));
    }
}
