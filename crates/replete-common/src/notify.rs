//! Outbound notifications
//!
//! The VM never calls back into the UI directly. Everything it has to say is
//! packaged as a [`Notification`] and pushed through a [`Notifier`], which is
//! expected to be non-blocking and to preserve order per producer.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// An event pushed from the VM to the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "kebab-case")]
pub enum Notification {
    /// Bootstrap finished; the engine is ready for evaluation.
    EngineReady,
    /// The UI should recompute the viewport width and send it back.
    UpdateWidth,
    /// The UI may accept new evaluation input.
    EnableEval,
    /// The UI may resume rendering output.
    EnablePrinting,
    /// A line of ordinary program output.
    Output(String),
    /// An error item (bootstrap failures, bridge I/O failures, uncaught exceptions).
    Error(String),
    /// Result of a formatting request.
    ApplyFormatting {
        original: String,
        formatted: String,
        cursor: u32,
    },
}

impl Notification {
    /// Returns true for the item kinds that carry printable text.
    pub fn is_item(&self) -> bool {
        matches!(self, Notification::Output(_) | Notification::Error(_))
    }
}

/// One-way channel to the UI collaborator.
///
/// Implementations must not block: `notify` is called from the dispatcher
/// thread while it owns the engine.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// A [`Notifier`] backed by an unbounded tokio channel.
///
/// Notifications sent after the receiver is dropped are discarded.
#[derive(Clone, Debug)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: Notification) {
        // receiver gone means the UI has shut down
        let _ = self.tx.send(notification);
    }
}

/// Create a channel-backed notifier and the receiving end the UI drains.
pub fn channel_notifier() -> (ChannelNotifier, mpsc::UnboundedReceiver<Notification>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelNotifier { tx }, rx)
}
