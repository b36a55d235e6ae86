//! Replete Common Types
//!
//! This crate holds the types that cross the boundary between the Replete VM
//! and the UI that drives it:
//!
//! - **Notifications**: the one-way, fire-and-forget events the VM pushes to
//!   the UI (output lines, error items, lifecycle signals, formatting results)
//! - **Errors**: the [`RepleteError`] enum used across the workspace
//!
//! # Example
//!
//! ```
//! use replete_common::{channel_notifier, Notification, Notifier};
//!
//! let (notifier, mut rx) = channel_notifier();
//! notifier.notify(Notification::Output("hello".into()));
//!
//! assert_eq!(rx.try_recv().unwrap(), Notification::Output("hello".into()));
//! ```

pub mod error;
pub mod notify;

pub use error::{RepleteError, Result};
pub use notify::{channel_notifier, ChannelNotifier, Notification, Notifier};
