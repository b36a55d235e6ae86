//! Native Capability Bridge state
//!
//! [`Bridge`] holds everything the natives need besides the engine itself:
//! the bundle, the writable file root, the stream tables, the timer tables,
//! the loaded-module set and the outbound notifier. It is created on the
//! dispatcher thread and never leaves it, so interior mutability is plain
//! `RefCell`/`Cell`.
//!
//! Everything here is engine-agnostic; the JavaScript glue lives in
//! [`bindings`](super::bindings).

use crate::bundle::Bundle;
use crate::command::{CommandSender, ForeignHandle};
use crate::config::VmConfig;
use crate::files::FileRoot;
use crate::handles::{InputStream, OutputStream, StreamError, StreamTables, TextReader, TextWriter};
use crate::http::HttpClient;
use crate::timers::Timers;
use replete_common::{Notification, Notifier};
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Prefix the module loader puts in front of paths relative to `goog/`.
pub const GOOG_RELATIVE_PREFIX: &str = "goog/../";

pub struct Bridge {
    bundle: Arc<dyn Bundle>,
    files: FileRoot,
    notifier: Arc<dyn Notifier>,
    commands: CommandSender,
    max_read_chunk: usize,
    loaded: RefCell<HashSet<String>>,
    streams: RefCell<StreamTables>,
    timers: RefCell<Timers>,
    http: HttpClient,
    next_handle: Cell<u64>,
    clock: Instant,
}

impl Bridge {
    pub fn new(
        config: &VmConfig,
        bundle: Arc<dyn Bundle>,
        notifier: Arc<dyn Notifier>,
        commands: CommandSender,
    ) -> Self {
        Self {
            bundle,
            files: FileRoot::new(config.files_root.clone()),
            notifier,
            commands,
            max_read_chunk: config.max_read_chunk,
            loaded: RefCell::new(HashSet::new()),
            streams: RefCell::new(StreamTables::new()),
            timers: RefCell::new(Timers::new()),
            http: HttpClient::new(),
            next_handle: Cell::new(0),
            clock: Instant::now(),
        }
    }

    pub fn bundle(&self) -> &dyn Bundle {
        self.bundle.as_ref()
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    pub fn notify(&self, notification: Notification) {
        self.notifier.notify(notification);
    }

    /// Allocate a fresh foreign handle id.
    pub fn next_handle(&self) -> ForeignHandle {
        let id = self.next_handle.get() + 1;
        self.next_handle.set(id);
        ForeignHandle(id)
    }

    // ========================================================================
    // Script loading
    // ========================================================================

    pub fn load(&self, path: &str) -> Option<String> {
        self.bundle.get_contents(path)
    }

    /// Resolve an import request to the source that still has to be evaluated.
    ///
    /// Returns `None` when the module was already imported or is not in the
    /// bundle. A returned module is marked loaded before it is evaluated.
    pub fn begin_import(&self, path: &str) -> Option<(String, String)> {
        let path = path.strip_prefix(GOOG_RELATIVE_PREFIX).unwrap_or(path);
        if self.loaded.borrow().contains(path) {
            tracing::debug!("Skipping already imported {}", path);
            return None;
        }

        let Some(source) = self.bundle.get_contents(path) else {
            tracing::warn!("Import of {} not found in bundle", path);
            return None;
        };
        self.loaded.borrow_mut().insert(path.to_string());
        Some((path.to_string(), source))
    }

    #[cfg(test)]
    pub fn is_loaded(&self, path: &str) -> bool {
        self.loaded.borrow().contains(path)
    }

    // ========================================================================
    // Output
    // ========================================================================

    pub fn print(&self, text: String) {
        self.notify(Notification::Output(text));
    }

    pub fn write_stdout(&self, text: &str) -> io::Result<()> {
        io::stdout().write_all(text.as_bytes())
    }

    pub fn flush_stdout(&self) -> io::Result<()> {
        io::stdout().flush()
    }

    pub fn write_stderr(&self, text: &str) -> io::Result<()> {
        io::stderr().write_all(text.as_bytes())
    }

    pub fn flush_stderr(&self) -> io::Result<()> {
        io::stderr().flush()
    }

    /// Monotonic time in fractional milliseconds.
    pub fn high_res_time(&self) -> f64 {
        self.clock.elapsed().as_secs_f64() * 1000.0
    }

    // ========================================================================
    // Filesystem
    // ========================================================================

    pub fn files(&self) -> &FileRoot {
        &self.files
    }

    /// Report a filesystem failure as an error item.
    fn report(&self, op: &str, result: io::Result<()>) {
        if let Err(e) = result {
            tracing::debug!("{} failed: {}", op, e);
            self.notify(Notification::Error(e.to_string()));
        }
    }

    pub fn delete(&self, path: &str) {
        self.report("delete", self.files.delete(path));
    }

    pub fn copy(&self, from: &str, to: &str) {
        self.report("copy", self.files.copy(from, to).map(|_| ()));
    }

    pub fn make_dirs(&self, path: &str) {
        self.report("mkdirs", self.files.make_dirs(path));
    }

    // ========================================================================
    // Streams
    // ========================================================================

    pub fn input_open(&self, path: &str) -> Result<(), StreamError> {
        let target = self.files.resolve(path)?;
        self.streams
            .borrow_mut()
            .input
            .open_with(path, || InputStream::open(&target))
    }

    pub fn input_read(&self, path: &str) -> Result<Option<Vec<u8>>, StreamError> {
        let mut streams = self.streams.borrow_mut();
        let stream = streams.input.get_mut(path).ok_or_else(|| not_open(path))?;
        Ok(stream.read_chunk(self.max_read_chunk)?)
    }

    pub fn input_close(&self, path: &str) -> Result<(), StreamError> {
        self.streams
            .borrow_mut()
            .input
            .remove(path)
            .map(drop)
            .ok_or_else(|| not_open(path))
    }

    pub fn output_open(&self, path: &str, append: bool) -> Result<(), StreamError> {
        let target = self.files.resolve(path)?;
        self.streams
            .borrow_mut()
            .output
            .open_with(path, || OutputStream::open(&target, append))
    }

    pub fn output_write(&self, path: &str, bytes: &[u8]) -> Result<(), StreamError> {
        let mut streams = self.streams.borrow_mut();
        let stream = streams.output.get_mut(path).ok_or_else(|| not_open(path))?;
        Ok(stream.write(bytes)?)
    }

    pub fn output_flush(&self, path: &str) -> Result<(), StreamError> {
        let mut streams = self.streams.borrow_mut();
        let stream = streams.output.get_mut(path).ok_or_else(|| not_open(path))?;
        Ok(stream.flush()?)
    }

    pub fn output_close(&self, path: &str) -> Result<(), StreamError> {
        let stream = self
            .streams
            .borrow_mut()
            .output
            .remove(path)
            .ok_or_else(|| not_open(path))?;
        Ok(stream.close()?)
    }

    pub fn reader_open(&self, path: &str, encoding: &str) -> Result<(), StreamError> {
        check_encoding(encoding);
        let target = self.files.resolve(path)?;
        self.streams
            .borrow_mut()
            .readers
            .open_with(path, || TextReader::open(&target))
    }

    pub fn reader_read(&self, path: &str) -> Result<Option<char>, StreamError> {
        let mut streams = self.streams.borrow_mut();
        let reader = streams.readers.get_mut(path).ok_or_else(|| not_open(path))?;
        Ok(reader.read_char()?)
    }

    pub fn reader_close(&self, path: &str) -> Result<(), StreamError> {
        self.streams
            .borrow_mut()
            .readers
            .remove(path)
            .map(drop)
            .ok_or_else(|| not_open(path))
    }

    pub fn writer_open(&self, path: &str, append: bool, encoding: &str) -> Result<(), StreamError> {
        check_encoding(encoding);
        let target = self.files.resolve(path)?;
        self.streams
            .borrow_mut()
            .writers
            .open_with(path, || TextWriter::open(&target, append))
    }

    pub fn writer_write(&self, path: &str, text: &str) -> Result<(), StreamError> {
        let mut streams = self.streams.borrow_mut();
        let writer = streams.writers.get_mut(path).ok_or_else(|| not_open(path))?;
        Ok(writer.write(text)?)
    }

    pub fn writer_flush(&self, path: &str) -> Result<(), StreamError> {
        let mut streams = self.streams.borrow_mut();
        let writer = streams.writers.get_mut(path).ok_or_else(|| not_open(path))?;
        Ok(writer.flush()?)
    }

    pub fn writer_close(&self, path: &str) -> Result<(), StreamError> {
        let writer = self
            .streams
            .borrow_mut()
            .writers
            .remove(path)
            .ok_or_else(|| not_open(path))?;
        Ok(writer.close()?)
    }

    // ========================================================================
    // Timers
    // ========================================================================

    pub fn set_timeout(&self, callback: ForeignHandle, delay: Duration) -> io::Result<u64> {
        self.timers
            .borrow_mut()
            .timeouts
            .register(callback, delay, self.commands.clone())
    }

    pub fn clear_timeout(&self, id: u64) {
        self.timers.borrow_mut().timeouts.cancel(id);
    }

    pub fn set_interval(&self, callback: ForeignHandle, interval: Duration) -> io::Result<u64> {
        self.timers
            .borrow_mut()
            .intervals
            .register(callback, interval, self.commands.clone())
    }

    pub fn clear_interval(&self, id: u64) {
        self.timers.borrow_mut().intervals.cancel(id);
    }

    pub fn cancel_all_timers(&self) {
        self.timers.borrow_mut().cancel_all();
    }
}

fn not_open(path: &str) -> StreamError {
    StreamError::NotOpen(path.to_string())
}

fn check_encoding(encoding: &str) {
    let normalized = encoding.to_ascii_lowercase().replace(['-', '_'], "");
    if normalized != "utf8" {
        tracing::warn!("Unsupported encoding {}, using UTF-8", encoding);
    }
}
