//! Message framer
//!
//! Splits one unframed byte stream into units. A unit starting with `{` is
//! a structured object that ends when brace depth returns to zero (braces
//! inside string literals do not count); anything else is a text line ended
//! by `\n`. Raw payload regions are never guessed from content: a caller
//! that knows a payload follows switches to [`Framer::read_raw`], which
//! drains already-buffered bytes before touching the socket. The newline
//! that follows a structured unit is never handed out as payload.
//!
//! There is no length prefix or checksum, so malformed units are dropped
//! rather than reported. A truncated object only ends when the connection
//! does; there is deliberately no timeout.

use log::debug;
use serde_json::Value;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::FrameError;

const READ_CHUNK: usize = 8 * 1024;

/// One parsed message boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Unit {
    Text(String),
    Structured(Value),
}

/// Incremental brace-depth scanner, resumable across reads.
#[derive(Debug, Default)]
struct ObjectScan {
    pos: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl ObjectScan {
    /// Returns the index one past the closing brace, once it has been seen.
    fn advance(&mut self, buf: &[u8]) -> Option<usize> {
        while self.pos < buf.len() {
            let byte = buf[self.pos];
            self.pos += 1;

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                }
                continue;
            }

            match byte {
                b'"' => self.in_string = true,
                b'{' => self.depth += 1,
                b'}' => {
                    self.depth = self.depth.saturating_sub(1);
                    if self.depth == 0 {
                        return Some(self.pos);
                    }
                }
                _ => {}
            }
        }
        None
    }
}

/// Reads units from an async reader, buffering partial reads.
pub struct Framer<R> {
    reader: R,
    buf: Vec<u8>,
    max_unit: usize,
    scan: ObjectScan,
    line_searched: usize,
    /// A structured unit was just returned; its trailing newline may still
    /// be in flight.
    after_object: bool,
    /// Exact text of the last structured unit returned.
    object_source: String,
}

impl<R> Framer<R> {
    pub fn new(reader: R, max_unit: usize) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(READ_CHUNK),
            max_unit,
            scan: ObjectScan::default(),
            line_searched: 0,
            after_object: false,
            object_source: String::new(),
        }
    }

    /// Source text of the structured unit most recently returned, exactly
    /// as it arrived.
    pub fn object_source(&self) -> &str {
        &self.object_source
    }

    /// Bytes received but not yet handed out.
    pub fn buffered(&self) -> &[u8] {
        &self.buf
    }

    fn unit_pending(&self) -> bool {
        self.scan.pos > 0 || self.line_searched > 0
    }

    fn reset_scan(&mut self) {
        self.scan = ObjectScan::default();
        self.line_searched = 0;
    }

    /// Drops line terminators left between units.
    fn skip_separators(&mut self) {
        let skip = self
            .buf
            .iter()
            .take_while(|b| matches!(b, b'\r' | b'\n'))
            .count();
        if skip > 0 {
            self.buf.drain(..skip);
        }
    }

    /// Finds the end of the unit at the front of the buffer.
    ///
    /// Returns `(content_end, consumed)`.
    fn find_boundary(&mut self) -> Option<(usize, usize)> {
        if self.buf[0] == b'{' {
            return self.scan.advance(&self.buf).map(|end| (end, end));
        }

        match self.buf[self.line_searched..].iter().position(|&b| b == b'\n') {
            Some(offset) => {
                let newline = self.line_searched + offset;
                Some((newline, newline + 1))
            }
            None => {
                self.line_searched = self.buf.len();
                None
            }
        }
    }
}

impl<R: AsyncRead + Unpin> Framer<R> {
    /// Next complete unit, or `None` once the stream has ended.
    pub async fn next_unit(&mut self) -> Result<Option<Unit>, FrameError> {
        self.after_object = false;
        loop {
            if !self.unit_pending() {
                self.skip_separators();
            }

            if self.buf.is_empty() {
                if self.fill().await? == 0 {
                    return Ok(None);
                }
                continue;
            }

            if let Some((end, consumed)) = self.find_boundary() {
                let bytes: Vec<u8> = self.buf.drain(..consumed).collect();
                self.reset_scan();
                if let Some(unit) = decode_unit(&bytes[..end]) {
                    self.after_object = matches!(unit, Unit::Structured(_));
                    if self.after_object {
                        self.object_source = String::from_utf8_lossy(&bytes[..end]).into_owned();
                    }
                    return Ok(Some(unit));
                }
                continue;
            }

            if self.buf.len() > self.max_unit {
                return Err(FrameError::UnitTooLarge(self.max_unit));
            }

            if self.fill().await? == 0 {
                let rest = std::mem::take(&mut self.buf);
                self.reset_scan();
                if rest[0] == b'{' {
                    debug!("Discarding truncated structured unit ({} bytes)", rest.len());
                    return Ok(None);
                }
                // An unterminated last line still counts.
                return Ok(decode_text(&rest));
            }
        }
    }

    /// Reads raw payload bytes, draining the internal buffer first.
    ///
    /// Only valid between units. Returns 0 at end of stream.
    pub async fn read_raw(&mut self, out: &mut [u8]) -> io::Result<usize> {
        debug_assert!(!self.unit_pending(), "raw read inside a unit");

        if self.after_object && !self.consume_object_terminator().await? {
            return Ok(0);
        }

        if !self.buf.is_empty() {
            let n = out.len().min(self.buf.len());
            out[..n].copy_from_slice(&self.buf[..n]);
            self.buf.drain(..n);
            return Ok(n);
        }

        self.reader.read(out).await
    }

    /// Drops the newline that follows a structured unit so it is not taken
    /// for payload. Returns false if the stream ended first.
    async fn consume_object_terminator(&mut self) -> io::Result<bool> {
        while self.buf.is_empty() || self.buf == b"\r" {
            if self.fill().await? == 0 {
                self.buf.clear();
                return Ok(false);
            }
        }
        self.after_object = false;

        let skip = match self.buf.as_slice() {
            [b'\r', b'\n', ..] => 2,
            [b'\n', ..] => 1,
            _ => 0,
        };
        self.buf.drain(..skip);
        Ok(true)
    }

    async fn fill(&mut self) -> io::Result<usize> {
        let mut chunk = [0u8; READ_CHUNK];
        let n = self.reader.read(&mut chunk).await?;
        self.buf.extend_from_slice(&chunk[..n]);
        Ok(n)
    }
}

fn decode_unit(bytes: &[u8]) -> Option<Unit> {
    if bytes.first() == Some(&b'{') {
        match serde_json::from_slice(bytes) {
            Ok(value) => Some(Unit::Structured(value)),
            Err(e) => {
                debug!("Discarding malformed structured unit: {}", e);
                None
            }
        }
    } else {
        decode_text(bytes)
    }
}

fn decode_text(bytes: &[u8]) -> Option<Unit> {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => Some(Unit::Text(text.to_string())),
        Err(e) => {
            debug!("Discarding text unit with invalid encoding: {}", e);
            None
        }
    }
}
