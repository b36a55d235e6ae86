//! Replete VM
//!
//! This crate hosts the embedded JavaScript engine behind a single
//! dispatcher thread, together with the native capabilities the bundled
//! ClojureScript runtime expects: script loading, printing, filesystem
//! access, path-keyed streams, HTTP and browser-style timers.

pub mod bootstrap;
pub mod bundle;
pub mod command;
pub mod config;
pub mod dispatcher;
pub mod files;
pub mod handles;
pub mod http;
pub mod timers;

pub(crate) mod runtime;

pub use bundle::{Bundle, DirBundle, MemoryBundle};
pub use command::{Command, CommandSender, ForeignHandle};
pub use config::VmConfig;
pub use dispatcher::Dispatcher;
pub use files::FileRoot;
pub use handles::StreamError;
pub use http::{HttpClient, HttpOptions, HttpResponse};
pub use timers::{TimerKind, Timers};
