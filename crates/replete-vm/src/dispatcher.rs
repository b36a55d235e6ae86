//! Command dispatcher
//!
//! A single named worker thread owns the engine and drains the command
//! queue in FIFO order. Producers on any thread hold a [`CommandSender`];
//! the engine itself never leaves the worker.
//!
//! # Architecture
//!
//! ```text
//! UI thread ──┐
//! timer threads ──┼──> unbounded queue ──> worker thread ──> engine
//! natives ────┘                                 │
//!                                               └──> Notifier
//! ```
//!
//! # Example
//!
//! ```no_run
//! use replete_common::channel_notifier;
//! use replete_vm::{Command, DirBundle, Dispatcher, VmConfig};
//! use std::sync::Arc;
//!
//! let (notifier, _notes) = channel_notifier();
//! let dispatcher = Dispatcher::spawn(
//!     VmConfig::default(),
//!     Arc::new(DirBundle::new("out")),
//!     Arc::new(notifier),
//! )?;
//! dispatcher.start_session("phone")?;
//! dispatcher.submit(Command::Evaluate("(+ 1 2)".into()))?;
//! dispatcher.shutdown()?;
//! # Ok::<(), replete_common::RepleteError>(())
//! ```

use crate::bootstrap;
use crate::bundle::Bundle;
use crate::command::{command_queue, Command, CommandSender};
use crate::config::VmConfig;
use crate::runtime::{Bridge, RepleteContext};
use replete_common::error::{RepleteError, Result};
use replete_common::{Notification, Notifier};
use std::rc::Rc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc::UnboundedReceiver;

/// Handle to the dispatcher thread.
///
/// Dropping the handle without calling [`Dispatcher::shutdown`] still stops
/// the worker, but does not wait for it.
pub struct Dispatcher {
    sender: CommandSender,
    worker: Option<JoinHandle<Result<()>>>,
}

impl Dispatcher {
    /// Start the worker thread. The engine is not created until
    /// [`Command::InitEngine`] runs.
    pub fn spawn(config: VmConfig, bundle: Arc<dyn Bundle>, notifier: Arc<dyn Notifier>) -> Result<Self> {
        let (sender, receiver) = command_queue();
        let worker_sender = sender.clone();

        let worker = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || {
                let bridge = Rc::new(Bridge::new(&config, bundle, Arc::clone(&notifier), worker_sender));
                Worker::new(bridge, notifier).run(receiver)
            })?;

        Ok(Self {
            sender,
            worker: Some(worker),
        })
    }

    /// Enqueue a command. Never blocks.
    pub fn submit(&self, command: Command) -> Result<()> {
        self.sender.submit(command)
    }

    /// A producer handle for other threads.
    pub fn sender(&self) -> CommandSender {
        self.sender.clone()
    }

    /// Queue engine creation, native installation and bootstrap.
    pub fn start_session(&self, device_kind: impl Into<String>) -> Result<()> {
        self.submit(Command::InitEngine)?;
        self.submit(Command::InitEnvironment)?;
        self.submit(Command::BootstrapEnvironment(device_kind.into()))
    }

    /// Stop the worker and wait for it to exit.
    ///
    /// Commands queued before the shutdown still run.
    ///
    /// # Errors
    ///
    /// Returns the worker's own failure, such as
    /// `RepleteError::EngineNotInitialized`.
    pub fn shutdown(mut self) -> Result<()> {
        // the worker may already have exited on its own
        let _ = self.sender.submit(Command::Shutdown);
        match self.worker.take() {
            Some(worker) => worker
                .join()
                .map_err(|_| RepleteError::JavaScriptExecution("dispatcher thread panicked".into()))?,
            None => Ok(()),
        }
    }

    /// Whether the worker has stopped taking commands.
    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        if self.worker.is_some() {
            let _ = self.sender.submit(Command::Shutdown);
        }
    }
}

// ============================================================================
// Worker loop
// ============================================================================

struct Worker {
    bridge: Rc<Bridge>,
    notifier: Arc<dyn Notifier>,
    engine: Option<RepleteContext>,
    environment_installed: bool,
}

impl Worker {
    fn new(bridge: Rc<Bridge>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            bridge,
            notifier,
            engine: None,
            environment_installed: false,
        }
    }

    fn run(mut self, mut receiver: UnboundedReceiver<Command>) -> Result<()> {
        tracing::info!("Dispatcher started");

        let outcome = loop {
            let Some(command) = receiver.blocking_recv() else {
                break Ok(());
            };
            tracing::debug!("Dispatching {}", command.kind());

            if matches!(command, Command::Shutdown) {
                break Ok(());
            }

            match self.execute(command) {
                Ok(()) => {}
                Err(RepleteError::EngineNotInitialized) => {
                    tracing::error!("Command received before the engine was created, stopping");
                    break Err(RepleteError::EngineNotInitialized);
                }
                Err(e) => tracing::warn!("Command failed: {}", e),
            }

            if let Some(engine) = self.engine.as_mut() {
                engine.run_jobs();
            }
        };

        receiver.close();
        self.bridge.cancel_all_timers();
        tracing::info!("Dispatcher stopped");
        outcome
    }

    fn engine(&mut self) -> Result<&mut RepleteContext> {
        self.engine.as_mut().ok_or(RepleteError::EngineNotInitialized)
    }

    fn notify(&self, notification: Notification) {
        self.notifier.notify(notification);
    }

    fn report(&self, error: RepleteError) {
        self.notify(Notification::Error(error_text(error)));
    }

    fn execute(&mut self, command: Command) -> Result<()> {
        match command {
            Command::InitEngine => {
                if self.engine.is_some() {
                    tracing::warn!("Engine already exists, keeping it");
                } else {
                    self.engine = Some(RepleteContext::new());
                }
            }
            Command::InitEnvironment => {
                if self.environment_installed {
                    tracing::warn!("Environment already installed, keeping it");
                } else {
                    let bridge = Rc::clone(&self.bridge);
                    self.engine()?.install_bindings(bridge)?;
                    self.environment_installed = true;
                }
            }
            Command::BootstrapEnvironment(device_kind) => {
                let bridge = Rc::clone(&self.bridge);
                let engine = self.engine()?;
                match bootstrap::run(engine, bridge.bundle(), &device_kind) {
                    Ok(()) => {
                        self.notify(Notification::EngineReady);
                        self.notify(Notification::UpdateWidth);
                        self.notify(Notification::EnableEval);
                    }
                    Err(e) => {
                        tracing::warn!("Bootstrap failed");
                        self.report(e);
                    }
                }
            }
            Command::Evaluate(text) => {
                if let Err(e) = self.engine()?.read_eval_print(&text) {
                    self.report(e);
                }
                self.notify(Notification::EnableEval);
                self.notify(Notification::EnablePrinting);
            }
            Command::SetViewportWidth(width) => {
                if let Err(e) = self.engine()?.set_width(width) {
                    self.report(e);
                }
            }
            Command::InvokeCallback(handle) => {
                if let Err(e) = self.engine()?.invoke_handle(handle) {
                    self.report(e);
                }
            }
            Command::ReleaseHandle(handle) => {
                self.engine()?.release_handle(handle);
            }
            Command::RunFormatter {
                text,
                enter_pressed,
                cursor,
            } => match self.engine()?.format(&text, cursor, enter_pressed) {
                Ok((formatted, cursor)) => self.notify(Notification::ApplyFormatting {
                    original: text,
                    formatted,
                    cursor,
                }),
                Err(e) => self.report(e),
            },
            Command::Shutdown => {}
        }
        Ok(())
    }
}

/// Script failures carry their own text; everything else uses `Display`.
fn error_text(error: RepleteError) -> String {
    match error {
        RepleteError::JavaScriptExecution(text) => text,
        other => other.to_string(),
    }
}
