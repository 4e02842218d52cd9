//! Fetched rows

use super::{FetchOptions, cols::{ColumnInfo, Columns, Position}, cursor::{Cursor, CursorLink}, fromsql::FromSql};
use crate::{Connection, Context, Error, Result, lob::{self, LobFetch}, types::{Codec, CursorId, Value}};
use std::{collections::VecDeque, sync::Arc};

#[derive(Debug)]
enum State {
    /// Cursor was opened by the server but nothing has been fetched yet
    Unopened,
    Fetching,
    Exhausted,
    /// A fetch was canceled or timed out. Holds the error every later call reports.
    Canceled(Error),
    Closed,
}

/**
    Result set of a query or a cursor.

    Rows are fetched in batches. The execute round trip of a query returns up to
    `prefetch_rows` rows, and each following batch takes up to `fetch_array_size`
    rows: first from what was prefetched, then from one fetch round trip for the
    shortfall, unless the server already reported the end of the result set.

    Dropping the rows closes the server cursor and every cursor nested in its rows.
*/
pub struct Rows<'a> {
    conn:       &'a Connection,
    ctx:        Context,
    opts:       FetchOptions,
    cols:       Arc<Columns>,
    link:       Arc<CursorLink>,
    prefetched: VecDeque<Vec<Value>>,
    batch:      VecDeque<Vec<Value>>,
    /// The server has no more rows
    done:       bool,
    state:      State,
}

impl Drop for Rows<'_> {
    fn drop(&mut self) {
        self.link.close(self.conn);
    }
}

/// Registers cursors returned in buffered rows with the cursor that returned them.
fn adopt_nested<'r>(link: &CursorLink, rows: impl IntoIterator<Item = &'r Vec<Value>>) {
    for val in rows.into_iter().flatten() {
        if let Value::Cursor(cursor) = val {
            link.adopt(CursorLink::new(cursor.id));
        }
    }
}

impl<'a> Rows<'a> {
    /// Result set of an executed query
    pub(crate) fn from_query(conn: &'a Connection, ctx: Context, opts: FetchOptions, cols: Arc<Columns>, link: Arc<CursorLink>, prefetched: Vec<Vec<Value>>) -> Self {
        let prefetch = opts.prefetch_rows();
        let done = prefetch > 0 && prefetched.len() < prefetch;
        adopt_nested(&link, &prefetched);
        Self {
            conn, ctx, opts, cols, link,
            prefetched: prefetched.into(),
            batch: VecDeque::new(),
            done,
            state: State::Fetching,
        }
    }

    /// Result set of a cursor that was opened by the server
    pub(crate) fn from_cursor(conn: &'a Connection, ctx: Context, opts: FetchOptions, cols: Arc<Columns>, link: Arc<CursorLink>) -> Self {
        Self {
            conn, ctx, opts, cols, link,
            prefetched: VecDeque::new(),
            batch: VecDeque::new(),
            done: false,
            state: State::Unopened,
        }
    }

    /// Returns the column descriptions of the result set.
    pub fn columns(&self) -> &[ColumnInfo] {
        self.cols.infos()
    }

    /// Replaces the context that governs the following fetches.
    pub fn set_context(&mut self, ctx: &Context) {
        self.ctx = ctx.clone();
    }

    /// Closes the result set and every cursor nested in its rows.
    pub fn close(&mut self) {
        self.link.close(self.conn);
        self.state = State::Closed;
        self.prefetched.clear();
        self.batch.clear();
    }

    /**
        Returns the next row in the result set, or `None` when there are no more rows.

        Once the result set is exhausted, every following call returns `None`. Once a
        fetch was canceled, every following call fails with the same kind of error.
    */
    pub fn next(&mut self) -> Result<Option<Row<'a>>> {
        match &self.state {
            State::Exhausted => return Ok(None),
            State::Canceled(err) => return Err(err.duplicate()),
            State::Closed => return Err(Error::CursorClosed),
            State::Unopened | State::Fetching => {}
        }
        if !self.link.is_open() {
            self.state = State::Closed;
            return Err(Error::CursorClosed);
        }
        if self.batch.is_empty() {
            self.refill()?;
        }
        match self.batch.pop_front() {
            Some(values) => self.make_row(values).map(Some),
            None => {
                self.state = State::Exhausted;
                Ok(None)
            }
        }
    }

    fn refill(&mut self) -> Result<()> {
        self.state = State::Fetching;
        let array_size = self.opts.array_size();
        let taken = array_size.min(self.prefetched.len());
        self.batch.extend(self.prefetched.drain(..taken));
        if taken < array_size && !self.done {
            let want = array_size - taken;
            match self.conn.fetch(&self.ctx, self.link.id(), want) {
                Ok(rows) => {
                    tracing::trace!(cursor = self.link.id(), requested = want, received = rows.len(), "fetch");
                    if rows.len() < want {
                        self.done = true;
                    }
                    adopt_nested(&self.link, &rows);
                    self.batch.extend(rows);
                }
                Err(err) => {
                    if err.is_cancellation() {
                        self.batch.clear();
                        self.prefetched.clear();
                        self.state = State::Canceled(err.duplicate());
                    }
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    fn make_row(&self, mut values: Vec<Value>) -> Result<Row<'a>> {
        let mut nested = Vec::new();
        for val in values.iter_mut() {
            match val {
                Value::Cursor(cursor) => {
                    let link = self.link.child(cursor.id).unwrap_or_else(|| {
                        let link = CursorLink::new(cursor.id);
                        self.link.adopt(link.clone());
                        link
                    });
                    nested.push(link);
                }
                Value::Lob(locator) if self.opts.lob_fetch == LobFetch::Materialize => {
                    let data = lob::materialize(self.conn, &self.ctx, locator)?;
                    *val = data;
                }
                _ => {}
            }
        }
        Ok(Row {
            conn: self.conn,
            ctx: self.ctx.clone(),
            opts: self.opts.clone(),
            cols: self.cols.clone(),
            values,
            nested,
        })
    }
}

/// A row in the returned result set
pub struct Row<'a> {
    conn:   &'a Connection,
    ctx:    Context,
    opts:   FetchOptions,
    cols:   Arc<Columns>,
    values: Vec<Value>,
    nested: Vec<Arc<CursorLink>>,
}

impl<'a> Row<'a> {
    fn col_index(&self, pos: impl Position) -> Option<usize> {
        pos.name().and_then(|name| self.cols.col_index(name)).or(pos.index())
            .filter(|&ix| ix < self.values.len())
    }

    pub(crate) fn conn(&self) -> &'a Connection {
        self.conn
    }

    pub(crate) fn ctx(&self) -> &Context {
        &self.ctx
    }

    pub(crate) fn codec(&self) -> &Codec {
        &self.opts.codec
    }

    pub(crate) fn value_at(&self, ix: usize) -> &Value {
        &self.values[ix]
    }

    pub(crate) fn cursor(&self, id: CursorId) -> Result<Cursor<'a>> {
        let link = self.nested.iter().find(|link| link.id() == id).cloned().ok_or(Error::CursorClosed)?;
        let cursor = self.values.iter().find_map(|val| match val {
            Value::Cursor(cursor) if cursor.id == id => Some(cursor.clone()),
            _ => None,
        }).ok_or(Error::CursorClosed)?;
        Ok(Cursor::from_parts(self.conn, self.ctx.clone(), self.opts.clone(), cursor, link))
    }

    /// Returns the number of columns in the row
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the column descriptions
    pub fn columns(&self) -> &[ColumnInfo] {
        self.cols.infos()
    }

    /**
        Returns `true` if the value in the specified column is NULL.

        This method considers the out of bounds or unknown/misnamed
        "columns" to be NULL.
    */
    pub fn is_null(&self, pos: impl Position) -> bool {
        self.col_index(pos).map_or(true, |ix| self.values[ix].is_null())
    }

    /**
        Returns `Option`-al value of the specified column in the current row.
        The returned value is `None` when the SQL value is `NULL`.

        # Example

        ```
        use augur::{ColumnInfo, ColumnType, ConnectionParams, Value};
        use augur::native::scripted::{ScriptedServer, Reply};

        let server = ScriptedServer::new();
        server.on("SELECT manager_id FROM employees", |_| {
            Ok(Reply::rows(vec![ColumnInfo::new("MANAGER_ID", ColumnType::Number)], vec![vec![Value::Int(103)]]))
        });
        let oracle = augur::env(server);
        let conn = oracle.connect(&ConnectionParams::builder().connect_string("scripted").build()?)?;
        let stmt = conn.prepare("SELECT manager_id FROM employees WHERE employee_id = :id")?;
        let mut rows = stmt.query(107)?;
        let row = rows.next()?.expect("first (and only) row");

        // Either a 0-based column position...
        let manager_id: Option<u32> = row.get(0)?;
        assert_eq!(manager_id, Some(103));

        // Or the column name can be used to get the data
        let manager_id: Option<u32> = row.get("MANAGER_ID")?;
        assert_eq!(manager_id, Some(103));
        # Ok::<(),augur::Error>(())
        ```
    */
    pub fn get<T: FromSql<'a>, P: Position>(&'a self, pos: P) -> Result<Option<T>> {
        match self.col_index(pos) {
            None => Err(Error::new("no such column")),
            Some(ix) if self.values[ix].is_null() => Ok(None),
            Some(ix) => T::value(self, ix).map(Some),
        }
    }

    /// Returns the raw values of the row
    pub fn values(&self) -> &[Value] {
        &self.values
    }
}
