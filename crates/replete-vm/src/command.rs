//! Commands consumed by the dispatcher thread
//!
//! A [`Command`] is the only thing that crosses from a producer thread (UI,
//! timer threads, the bridge itself) to the thread that owns the engine.
//! Commands are immutable once sent and are executed strictly in FIFO order.

use replete_common::error::{RepleteError, Result};
use tokio::sync::mpsc;

/// Opaque reference to an engine object held outside the engine.
///
/// Only the numeric id travels between threads. The object itself stays in
/// the engine-side handle registry and is only ever dereferenced on the
/// dispatcher thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ForeignHandle(pub u64);

/// A unit of work for the dispatcher thread.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Create the engine. Must precede every other engine-touching command.
    InitEngine,
    /// Register the native capability functions in the global namespace.
    InitEnvironment,
    /// Run the bootstrap sequence for the given device kind.
    BootstrapEnvironment(String),
    /// Read-eval-print the given source text.
    Evaluate(String),
    /// Pass the viewport width to the REPL library.
    SetViewportWidth(f64),
    /// Call a foreign function handle with no arguments and no receiver.
    InvokeCallback(ForeignHandle),
    /// Release a foreign object handle.
    ReleaseHandle(ForeignHandle),
    /// Run the engine-side formatter.
    RunFormatter {
        text: String,
        enter_pressed: bool,
        cursor: u32,
    },
    /// Cancel all timers and stop the worker loop.
    Shutdown,
}

impl Command {
    /// Short stable name used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::InitEngine => "init-engine",
            Command::InitEnvironment => "init-environment",
            Command::BootstrapEnvironment(_) => "bootstrap-environment",
            Command::Evaluate(_) => "evaluate",
            Command::SetViewportWidth(_) => "set-viewport-width",
            Command::InvokeCallback(_) => "invoke-callback",
            Command::ReleaseHandle(_) => "release-handle",
            Command::RunFormatter { .. } => "run-formatter",
            Command::Shutdown => "shutdown",
        }
    }
}

/// Cloneable, thread-safe producer end of the command queue.
///
/// `submit` never blocks.
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: mpsc::UnboundedSender<Command>,
}

impl CommandSender {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Command>) -> Self {
        Self { tx }
    }

    /// Enqueue a command for the dispatcher thread.
    ///
    /// Fails only when the dispatcher has shut down.
    pub fn submit(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .map_err(|_| RepleteError::DispatcherClosed)
    }

    /// Returns true once the dispatcher has stopped receiving.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Create a command queue.
pub(crate) fn command_queue() -> (CommandSender, mpsc::UnboundedReceiver<Command>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (CommandSender::new(tx), rx)
}
