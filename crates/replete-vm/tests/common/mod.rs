//! Shared fixtures for the dispatcher integration tests.
//!
//! A stub bundle of small scripts stands in for the compiled ClojureScript
//! runtime. It provides just enough of the module loader, the core library
//! and the REPL library for the bootstrap sequence to run, and its
//! `read_eval_print` evaluates plain JavaScript and prints the result.

#![allow(dead_code)]

use replete_common::{channel_notifier, Notification};
use replete_vm::{Command, DirBundle, Dispatcher, VmConfig};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

pub const GOOG_BASE: &str = r#"
var goog = goog || {};
goog.global = this;
goog.provided_ = {};
goog.provide = function (name) {
    var parts = name.split('.');
    var cur = goog.global;
    for (var i = 0; i < parts.length; i++) {
        cur[parts[i]] = cur[parts[i]] || {};
        cur = cur[parts[i]];
    }
    goog.provided_[name] = true;
};
goog.require = function (name) {};
goog.isProvided_ = function (name) { return !!goog.provided_[name]; };
goog.dependencies_ = { nameToPath: {} };
"#;

pub const DEPS: &str = r#"
goog.dependencies_.nameToPath['cljs.core'] = '../cljs/core.js';
goog.dependencies_.nameToPath['replete.repl'] = '../replete/repl.js';
"#;

pub const CORE: &str = r#"
goog.provide('cljs.core');
cljs.core.imports = (cljs.core.imports || 0) + 1;
cljs.core.PersistentHashSet = { EMPTY: [] };
cljs.core.into = function (coll, items) { return coll.concat(items); };
cljs.core.contains_QMARK_ = function (coll, x) { return coll.indexOf(x) >= 0; };
cljs.core.system_time = function () { return 0; };
cljs.core._STAR_print_fn_STAR_ = null;
cljs.core._STAR_print_err_fn_STAR_ = null;
cljs.core.set_print_fn_BANG_ = function (f) { cljs.core._STAR_print_fn_STAR_ = f; };
cljs.core.set_print_err_fn_BANG_ = function (f) { cljs.core._STAR_print_err_fn_STAR_ = f; };
"#;

pub const REPL: &str = r#"
goog.provide('replete.repl');
replete.repl.width = 0;
replete.repl.app_env = null;
replete.repl.user_ready = false;
replete.repl.setup_cljs_user = function () { replete.repl.user_ready = true; };
replete.repl.init_app_env = function (env) { replete.repl.app_env = env; };
replete.repl.set_width = function (w) { replete.repl.width = w; };
replete.repl.read_eval_print = function (source) {
    var result = (0, eval)(source);
    cljs.core._STAR_print_fn_STAR_(String(result));
};
replete.repl.format = function (text, cursor, enterPressed) {
    var opened = (text.match(/\(/g) || []).length - (text.match(/\)/g) || []).length;
    var formatted = text;
    for (var i = 0; i < opened; i++) {
        formatted += ')';
    }
    return [formatted, Math.min(cursor, formatted.length)];
};
"#;

/// Write the stub bundle under `root`, optionally leaving the REPL library out.
pub fn write_bundle(root: &Path, with_repl: bool) {
    let files = [
        ("goog/base.js", GOOG_BASE),
        ("main.js", DEPS),
        ("cljs/core.js", CORE),
        ("replete/repl.js", REPL),
    ];
    for (path, text) in files {
        if path == "replete/repl.js" && !with_repl {
            continue;
        }
        let target = root.join(path);
        fs::create_dir_all(target.parent().unwrap()).unwrap();
        fs::write(target, text).unwrap();
    }
}

/// Poll `notes` until one arrives or `timeout` elapses.
pub fn recv_timeout(notes: &mut UnboundedReceiver<Notification>, timeout: Duration) -> Option<Notification> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Ok(note) = notes.try_recv() {
            return Some(note);
        }
        if Instant::now() >= deadline {
            return None;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
}

/// A dispatcher running against the stub bundle with a scratch files root.
pub struct Session {
    pub dispatcher: Option<Dispatcher>,
    pub notes: UnboundedReceiver<Notification>,
    pub bundle_dir: TempDir,
    pub files_dir: TempDir,
}

impl Session {
    /// Spawn a dispatcher without starting the engine.
    pub fn spawn(with_repl: bool) -> Self {
        let bundle_dir = tempfile::tempdir().unwrap();
        let files_dir = tempfile::tempdir().unwrap();
        write_bundle(bundle_dir.path(), with_repl);

        let (notifier, notes) = channel_notifier();
        let config = VmConfig::new().with_files_root(files_dir.path());
        let dispatcher = Dispatcher::spawn(
            config,
            Arc::new(DirBundle::new(bundle_dir.path())),
            Arc::new(notifier),
        )
        .unwrap();

        Self {
            dispatcher: Some(dispatcher),
            notes,
            bundle_dir,
            files_dir,
        }
    }

    /// Spawn and bootstrap, waiting for the engine to report ready.
    pub fn start(device_kind: &str) -> Self {
        let mut session = Self::spawn(true);
        session.dispatcher().start_session(device_kind).unwrap();
        assert_eq!(session.next(), Notification::EngineReady);
        assert_eq!(session.next(), Notification::UpdateWidth);
        assert_eq!(session.next(), Notification::EnableEval);
        session
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        self.dispatcher.as_ref().unwrap()
    }

    pub fn submit(&self, command: Command) {
        self.dispatcher().submit(command).unwrap();
    }

    /// The next notification, failing the test after five seconds.
    pub fn next(&mut self) -> Notification {
        recv_timeout(&mut self.notes, Duration::from_secs(5)).expect("no notification arrived")
    }

    /// Evaluate `source` and return what it printed, or the error item text.
    pub fn eval(&mut self, source: &str) -> Result<String, String> {
        self.submit(Command::Evaluate(source.to_string()));
        let mut outcome = None;
        loop {
            match self.next() {
                Notification::Output(text) if outcome.is_none() => outcome = Some(Ok(text)),
                Notification::Error(text) if outcome.is_none() => outcome = Some(Err(text)),
                Notification::EnablePrinting => break,
                _ => {}
            }
        }
        outcome.unwrap_or_else(|| Err("nothing printed".to_string()))
    }

    pub fn eval_ok(&mut self, source: &str) -> String {
        self.eval(source).unwrap()
    }

    /// Wait until an output item with `expected` text arrives.
    pub fn wait_for_output(&mut self, expected: &str, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            match recv_timeout(&mut self.notes, deadline.saturating_duration_since(Instant::now())) {
                Some(Notification::Output(text)) if text == expected => return true,
                Some(_) => {}
                None => return false,
            }
        }
        false
    }

    /// Count output items with `expected` text seen within `window`.
    pub fn count_output(&mut self, expected: &str, window: Duration) -> usize {
        let deadline = Instant::now() + window;
        let mut count = 0;
        while let Some(note) = recv_timeout(&mut self.notes, deadline.saturating_duration_since(Instant::now())) {
            if note == Notification::Output(expected.to_string()) {
                count += 1;
            }
        }
        count
    }

    pub fn shutdown(&mut self) {
        if let Some(dispatcher) = self.dispatcher.take() {
            dispatcher.shutdown().unwrap();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(dispatcher) = self.dispatcher.take() {
            let _ = dispatcher.shutdown();
        }
    }
}
