//! Resource handle tables
//!
//! Four independent registries of open streams, keyed by the script-visible
//! path used to open them. All tables live on the dispatcher thread.
//!
//! # Duplicate opens
//!
//! Opening a path that is already open in the same table is rejected with
//! [`StreamError::AlreadyOpen`]; the existing stream stays in place. Closing
//! first and re-opening is the supported way to reset a stream.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use thiserror::Error;

/// Failure of a streaming I/O operation.
///
/// The `Display` text is what scripts receive in-band.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("{0} is already open")]
    AlreadyOpen(String),

    #[error("{0} is not open")]
    NotOpen(String),

    #[error("{0}")]
    Io(#[from] io::Error),
}

/// A path-keyed registry of open streams.
#[derive(Debug)]
pub struct HandleTable<S> {
    entries: HashMap<String, S>,
}

impl<S> Default for HandleTable<S> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<S> HandleTable<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a stream under `path`, opening it with `open` only if the
    /// path is not already taken.
    pub fn open_with<F>(&mut self, path: &str, open: F) -> Result<(), StreamError>
    where
        F: FnOnce() -> io::Result<S>,
    {
        if self.entries.contains_key(path) {
            return Err(StreamError::AlreadyOpen(path.to_string()));
        }
        let stream = open()?;
        self.entries.insert(path.to_string(), stream);
        Ok(())
    }

    pub fn get_mut(&mut self, path: &str) -> Option<&mut S> {
        self.entries.get_mut(path)
    }

    /// Remove and return the stream registered under `path`.
    pub fn remove(&mut self, path: &str) -> Option<S> {
        self.entries.remove(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Stream types
// ============================================================================

/// Raw byte input.
#[derive(Debug)]
pub struct InputStream {
    file: File,
}

impl InputStream {
    pub fn open(path: &Path) -> io::Result<Self> {
        Ok(Self { file: File::open(path)? })
    }

    /// Read at most `max` bytes. `None` means end of stream.
    pub fn read_chunk(&mut self, max: usize) -> io::Result<Option<Vec<u8>>> {
        let mut buf = vec![0u8; max];
        loop {
            match self.file.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(n) => {
                    buf.truncate(n);
                    return Ok(Some(buf));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

/// Raw byte output, unbuffered.
#[derive(Debug)]
pub struct OutputStream {
    file: File,
}

impl OutputStream {
    pub fn open(path: &Path, append: bool) -> io::Result<Self> {
        Ok(Self {
            file: open_for_write(path, append)?,
        })
    }

    /// Write every byte of `bytes`.
    pub fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.file.write_all(bytes)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }

    pub fn close(mut self) -> io::Result<()> {
        self.file.flush()?;
        self.file.sync_all()
    }
}

/// UTF-8 character reader.
#[derive(Debug)]
pub struct TextReader {
    inner: BufReader<File>,
}

impl TextReader {
    pub fn open(path: &Path) -> io::Result<Self> {
        Ok(Self {
            inner: BufReader::new(File::open(path)?),
        })
    }

    /// Decode the next character. `None` means end of stream.
    ///
    /// An invalid lead byte or a sequence cut short decodes to U+FFFD. A byte
    /// that breaks a sequence is left in place and starts the next character.
    pub fn read_char(&mut self) -> io::Result<Option<char>> {
        let Some(lead) = self.next_byte(|_| true)? else {
            return Ok(None);
        };

        let width = utf8_width(lead);
        if width == 1 {
            return Ok(Some(lead as char));
        }
        if width == 0 {
            return Ok(Some(char::REPLACEMENT_CHARACTER));
        }

        let mut buf = [lead, 0, 0, 0];
        for slot in buf.iter_mut().take(width).skip(1) {
            match self.next_byte(is_continuation)? {
                Some(byte) => *slot = byte,
                None => return Ok(Some(char::REPLACEMENT_CHARACTER)),
            }
        }

        let decoded = std::str::from_utf8(&buf[..width])
            .ok()
            .and_then(|s| s.chars().next())
            .unwrap_or(char::REPLACEMENT_CHARACTER);
        Ok(Some(decoded))
    }

    /// Consume the next byte only if `accept` says so.
    fn next_byte(&mut self, accept: impl Fn(u8) -> bool) -> io::Result<Option<u8>> {
        let byte = loop {
            match self.inner.fill_buf() {
                Ok(buf) => break buf.first().copied(),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        };
        match byte {
            Some(b) if accept(b) => {
                self.inner.consume(1);
                Ok(Some(b))
            }
            _ => Ok(None),
        }
    }
}

fn is_continuation(byte: u8) -> bool {
    byte & 0b1100_0000 == 0b1000_0000
}

/// Width of the UTF-8 sequence introduced by `lead`, or 0 if `lead` cannot
/// start a sequence.
fn utf8_width(lead: u8) -> usize {
    match lead {
        0x00..=0x7F => 1,
        0xC2..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF4 => 4,
        _ => 0,
    }
}

/// UTF-8 text writer.
#[derive(Debug)]
pub struct TextWriter {
    inner: BufWriter<File>,
}

impl TextWriter {
    pub fn open(path: &Path, append: bool) -> io::Result<Self> {
        Ok(Self {
            inner: BufWriter::new(open_for_write(path, append)?),
        })
    }

    pub fn write(&mut self, text: &str) -> io::Result<()> {
        self.inner.write_all(text.as_bytes())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    pub fn close(self) -> io::Result<()> {
        let file = self.inner.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()
    }
}

fn open_for_write(path: &Path, append: bool) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.create(true);
    if append {
        options.append(true);
    } else {
        options.write(true).truncate(true);
    }
    options.open(path)
}

/// The four tables owned by the dispatcher thread.
#[derive(Debug, Default)]
pub struct StreamTables {
    pub input: HandleTable<InputStream>,
    pub output: HandleTable<OutputStream>,
    pub readers: HandleTable<TextReader>,
    pub writers: HandleTable<TextWriter>,
}

impl StreamTables {
    pub fn new() -> Self {
        Self::default()
    }
}
