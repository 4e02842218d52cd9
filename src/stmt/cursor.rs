//! REF CURSOR

use super::{FetchOptions, Statement, args::ToSql, bind::Params, cols::{ColumnInfo, Columns}, rows::Rows};
use crate::{Connection, Context, Error, Result, native::Direction, types::{CursorId, RefCursor, Value}};
use parking_lot::Mutex;
use std::sync::{Arc, atomic::{AtomicBool, Ordering}};

/// Tracks whether a server cursor is open and which cursors were produced from its rows.
#[derive(Debug)]
pub(crate) struct CursorLink {
    id: CursorId,
    open: AtomicBool,
    children: Mutex<Vec<Arc<CursorLink>>>,
}

impl CursorLink {
    pub(crate) fn new(id: CursorId) -> Arc<Self> {
        Arc::new(Self { id, open: AtomicBool::new(true), children: Mutex::new(Vec::new()) })
    }

    pub(crate) fn id(&self) -> CursorId {
        self.id
    }

    pub(crate) fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Registers a cursor that was returned in one of this cursor's rows.
    pub(crate) fn adopt(&self, child: Arc<CursorLink>) {
        self.children.lock().push(child);
    }

    pub(crate) fn child(&self, id: CursorId) -> Option<Arc<CursorLink>> {
        self.children.lock().iter().find(|child| child.id == id).cloned()
    }

    /// Closes this cursor and, before it, every cursor it produced.
    pub(crate) fn close(&self, conn: &Connection) {
        if self.open.swap(false, Ordering::AcqRel) {
            let children = std::mem::take(&mut *self.children.lock());
            for child in children {
                child.close(conn);
            }
            conn.close_cursor(self.id);
        }
    }
}

/**
    `REF CURSOR` returned in an OUT parameter or a column, or an implicit
    result of a PL/SQL block.

    # Example

    ```
    use augur::{Cursor, ColumnInfo, ColumnType, ConnectionParams, Value};
    use augur::native::scripted::{ScriptedServer, Reply};

    let server = ScriptedServer::new();
    server.on("BEGIN OPEN :lines FOR", |call| {
        let cols = vec![ColumnInfo::new("LINE", ColumnType::Varchar)];
        let cursor = call.open_cursor(cols, vec![
            vec![Value::Text("first".to_string())],
            vec![Value::Text("second".to_string())],
        ]);
        call.set_out(0, cursor);
        Ok(Reply::done())
    });
    let oracle = augur::env(server);
    let conn = oracle.connect(&ConnectionParams::builder().connect_string("scripted").build()?)?;

    let stmt = conn.prepare("BEGIN OPEN :lines FOR SELECT line FROM lines; END;")?;
    let mut lines = Cursor::new(&stmt);
    stmt.execute(&mut lines)?;

    let mut rows = lines.rows()?;
    let mut text = Vec::new();
    while let Some(row) = rows.next()? {
        let line : Option<String> = row.get(0)?;
        text.push(line.unwrap_or_default());
    }
    assert_eq!(text, ["first", "second"]);
    # Ok::<(),augur::Error>(())
    ```

    The server cursor is closed when the `Cursor` is dropped, or, once its
    [`rows`](Cursor::rows) were taken, when those rows are dropped.
*/
pub struct Cursor<'a> {
    conn: &'a Connection,
    ctx: Context,
    opts: FetchOptions,
    source: Option<(RefCursor, Arc<CursorLink>)>,
    /// Rows own the server cursor
    rows_taken: AtomicBool,
}

impl Drop for Cursor<'_> {
    fn drop(&mut self) {
        if !*self.rows_taken.get_mut() {
            self.close();
        }
    }
}

impl<'a> Cursor<'a> {
    /// Creates an unopened cursor to be bound as an OUT argument of `stmt`.
    pub fn new(stmt: &Statement<'a>) -> Self {
        Self { conn: stmt.connection(), ctx: stmt.context(), opts: stmt.fetch_options(), source: None, rows_taken: AtomicBool::new(false) }
    }

    pub(crate) fn from_parts(conn: &'a Connection, ctx: Context, opts: FetchOptions, cursor: RefCursor, link: Arc<CursorLink>) -> Self {
        Self { conn, ctx, opts, source: Some((cursor, link)), rows_taken: AtomicBool::new(false) }
    }

    /// Returns `true` once the server has opened the cursor.
    pub fn is_open(&self) -> bool {
        self.source.as_ref().map_or(false, |(_, link)| link.is_open())
    }

    /// Returns the column descriptions of the cursor's result set.
    pub fn columns(&self) -> Result<&[ColumnInfo]> {
        match &self.source {
            Some((cursor, _)) => Ok(&cursor.columns),
            None => Err(Error::CursorClosed),
        }
    }

    /// Sets the number of rows fetched per round trip. [`FETCH_DEFAULT`](super::FETCH_DEFAULT) restores the default.
    pub fn set_fetch_array_size(&mut self, num_rows: i32) {
        self.opts.array_size = num_rows;
    }

    /// Returns rows of the cursor's result set.
    pub fn rows(&self) -> Result<Rows<'a>> {
        let (cursor, link) = self.source.as_ref().ok_or(Error::CursorClosed)?;
        if !link.is_open() {
            return Err(Error::CursorClosed);
        }
        let cols = Arc::new(Columns::new(cursor.columns.clone()));
        self.rows_taken.store(true, Ordering::Release);
        Ok(Rows::from_cursor(self.conn, self.ctx.clone(), self.opts.clone(), cols, link.clone()))
    }

    /// Closes the cursor and every cursor nested in its rows.
    pub fn close(&self) {
        if let Some((_, link)) = &self.source {
            link.close(self.conn);
        }
    }
}

impl ToSql for &mut Cursor<'_> {
    fn bind_to(&mut self, pos: usize, params: &mut Params) -> Result<usize> {
        params.bind(pos, Value::Null, Direction::Out)?;
        Ok(pos + 1)
    }

    fn update_from_bind(&mut self, pos: usize, params: &Params) -> Result<usize> {
        if let Some(Value::Cursor(cursor)) = params.out_value(pos) {
            let link = params.cursor_link(cursor.id).unwrap_or_else(|| CursorLink::new(cursor.id));
            if let Some((_, prev)) = &self.source {
                if prev.id() != cursor.id && !self.rows_taken.load(Ordering::Acquire) {
                    prev.close(self.conn);
                }
            }
            self.rows_taken.store(false, Ordering::Release);
            self.source = Some((cursor.clone(), link));
        }
        Ok(pos + 1)
    }
}
