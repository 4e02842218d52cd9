//! Large objects (LOBs)

use crate::{
    Connection, Context, Error, Result,
    stmt::{args::ToSql, bind::Params},
    types::{LobKind, LobLocator, Value},
};
use std::io::{self, Read, Write};

/// Size of one LOB read or write round trip
pub(crate) const LOB_CHUNK_SIZE : usize = 32 * 1024;

/// How LOB columns of a query are returned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LobFetch {
    /// LOB content is copied into the row when it is fetched. CLOBs become text, BLOBs become bytes.
    #[default]
    Materialize,
    /// LOB columns stay references to the server-side LOB that can be read as a stream.
    Stream,
}

/// Reads the entire LOB content and returns it as text (CLOB) or bytes (BLOB).
pub(crate) fn materialize(conn: &Connection, ctx: &Context, locator: &LobLocator) -> Result<Value> {
    let data = read_all(conn, ctx, locator)?;
    match locator.kind {
        LobKind::Blob => Ok(Value::Bytes(data)),
        LobKind::Clob => String::from_utf8(data)
            .map(Value::Text)
            .map_err(|err| Error::mismatch(format!("CLOB content is not valid UTF-8: {}", err))),
    }
}

fn read_all(conn: &Connection, ctx: &Context, locator: &LobLocator) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    loop {
        let chunk = conn.lob_read(ctx, locator, data.len() as u64, LOB_CHUNK_SIZE)?;
        let last = chunk.len() < LOB_CHUNK_SIZE;
        data.extend_from_slice(&chunk);
        if last {
            return Ok(data);
        }
    }
}

/**
    LOB held by the server.

    `Lob` implements `std::io::Read` and `std::io::Write`. Every read or write is
    a round trip, so wrapping it into a `BufReader` or `BufWriter` is worthwhile
    for small operations.

    # Example

    ```
    use augur::{ColumnInfo, ColumnType, ConnectionParams, Lob, LobFetch, LobKind};
    use augur::native::scripted::{ScriptedServer, Reply};
    use std::io::Read;

    let server = ScriptedServer::new();
    let doc = server.new_lob(LobKind::Clob, b"Hello, World!");
    server.on("SELECT doc FROM docs", move |_| {
        Ok(Reply::rows(vec![ColumnInfo::new("DOC", ColumnType::Clob)], vec![vec![doc.clone()]]))
    });
    let oracle = augur::env(server);
    let conn = oracle.connect(&ConnectionParams::builder().connect_string("scripted").build()?)?;

    let stmt = conn.prepare("SELECT doc FROM docs")?;
    stmt.set_lob_fetch(LobFetch::Stream);
    let mut rows = stmt.query(())?;
    let row = rows.next()?.unwrap();
    let mut lob : Lob = row.get(0)?.unwrap();
    assert_eq!(lob.len()?, 13);

    let mut text = String::new();
    lob.read_to_string(&mut text)?;
    assert_eq!(text, "Hello, World!");
    # Ok::<(),Box<dyn std::error::Error>>(())
    ```
*/
pub struct Lob<'a> {
    conn: &'a Connection,
    locator: LobLocator,
    ctx: Context,
    offset: u64,
}

impl<'a> Lob<'a> {
    pub(crate) fn new(conn: &'a Connection, locator: LobLocator, ctx: Context) -> Self {
        Self { conn, locator, ctx, offset: 0 }
    }

    /**
        Creates a temporary LOB. Temporary LOBs are freed when the session is reset,
        which happens when the connection goes back to the pool.
    */
    pub fn temp(conn: &'a Connection, kind: LobKind) -> Result<Self> {
        let ctx = conn.context();
        let locator = conn.lob_create_temp(&ctx, kind)?;
        Ok(Self::new(conn, locator, ctx))
    }

    pub fn kind(&self) -> LobKind {
        self.locator.kind
    }

    pub fn locator(&self) -> &LobLocator {
        &self.locator
    }

    /// Returns the LOB length in bytes.
    pub fn len(&self) -> Result<u64> {
        self.conn.lob_len(&self.ctx, &self.locator)
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.len().map(|len| len == 0)
    }

    /// Reads the entire LOB regardless of the current stream position.
    pub fn read_to_vec(&self) -> Result<Vec<u8>> {
        read_all(self.conn, &self.ctx, &self.locator)
    }

    /// Reads the entire CLOB regardless of the current stream position.
    pub fn read_text(&self) -> Result<String> {
        let data = self.read_to_vec()?;
        String::from_utf8(data).map_err(|err| Error::mismatch(format!("LOB content is not valid UTF-8: {}", err)))
    }
}

impl Read for Lob<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let data = self.conn.lob_read(&self.ctx, &self.locator, self.offset, buf.len())?;
        buf[..data.len()].copy_from_slice(&data);
        self.offset += data.len() as u64;
        Ok(data.len())
    }
}

impl Write for Lob<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.conn.lob_write(&self.ctx, &self.locator, self.offset, buf)?;
        self.offset += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ToSql for &Lob<'_> {
    fn bind_to(&mut self, pos: usize, params: &mut Params) -> Result<usize> {
        params.bind(pos, Value::Lob(self.locator.clone()), crate::native::Direction::In)?;
        Ok(pos + 1)
    }
}

enum Source {
    Value(Value),
    Reader(Box<dyn Read + Send>),
}

/**
    Content for a LOB argument.

    Text and bytes are bound directly. A reader is streamed into a temporary LOB
    when the statement is executed, and the temporary LOB is bound instead.
*/
pub struct LobSource {
    kind: LobKind,
    source: Source,
}

impl LobSource {
    /// Streams the content of `reader` into a temporary LOB of the given kind.
    pub fn reader(reader: impl Read + Send + 'static, kind: LobKind) -> Self {
        Self { kind, source: Source::Reader(Box::new(reader)) }
    }

    /// BLOB content
    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        Self { kind: LobKind::Blob, source: Source::Value(Value::Bytes(data.into())) }
    }

    /// CLOB content
    pub fn text(text: impl Into<String>) -> Self {
        Self { kind: LobKind::Clob, source: Source::Value(Value::Text(text.into())) }
    }

    pub fn kind(&self) -> LobKind {
        self.kind
    }

    /// Returns the value to bind if the content does not need to be streamed.
    pub(crate) fn into_direct(self) -> std::result::Result<Value, LobSource> {
        match self.source {
            Source::Value(val) => Ok(val),
            source => Err(Self { kind: self.kind, source }),
        }
    }

    /// Copies the content into the LOB and returns the number of bytes written.
    pub(crate) fn write_into(self, conn: &Connection, ctx: &Context, locator: &LobLocator) -> Result<u64> {
        let mut reader : Box<dyn Read + Send> = match self.source {
            Source::Reader(reader) => reader,
            Source::Value(Value::Bytes(data)) => Box::new(io::Cursor::new(data)),
            Source::Value(Value::Text(text)) => Box::new(io::Cursor::new(text.into_bytes())),
            Source::Value(_) => return Ok(0),
        };
        let mut buf = vec![0u8; LOB_CHUNK_SIZE];
        let mut offset = 0u64;
        loop {
            let len = match reader.read(&mut buf) {
                Ok(0) => return Ok(offset),
                Ok(len) => len,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(Error::msg(format!("cannot read LOB source: {}", err))),
            };
            let mut chunk = &buf[..len];
            while !chunk.is_empty() {
                let written = conn.lob_write(ctx, locator, offset, chunk)?;
                if written == 0 {
                    return Err(Error::new("LOB write did not make progress"));
                }
                offset += written as u64;
                chunk = &chunk[written..];
            }
        }
    }
}

impl ToSql for LobSource {
    fn bind_to(&mut self, pos: usize, params: &mut Params) -> Result<usize> {
        let src = std::mem::replace(self, LobSource::bytes(Vec::new()));
        params.bind_lob(pos, src)?;
        Ok(pos + 1)
    }
}
