//! Dispatcher Integration Tests
//!
//! Drives a real dispatcher thread through the stub bundle:
//! 1. Bootstrap success and failure reporting
//! 2. Evaluation and error items
//! 3. Ordering across producer threads
//! 4. Module import bookkeeping
//! 5. Viewport width and formatter round trips

mod common;

use common::Session;
use replete_common::Notification;
use replete_vm::Command;
use std::collections::HashMap;
use std::thread;

// ============================================================================
// Bootstrap
// ============================================================================

#[test]
fn test_bootstrap_reports_ready() {
    let mut session = Session::start("phone");
    assert_eq!(session.eval_ok("replete.repl.user_ready"), "true");
    assert_eq!(session.eval_ok("typeof window"), "object");
    assert_eq!(session.eval_ok("cljs.core.system_time === REPLETE_HIGH_RES_TIMER"), "true");
    session.shutdown();
}

#[test]
fn test_bootstrap_passes_device_kind() {
    let mut session = Session::start("tablet");
    assert_eq!(
        session.eval_ok("replete.repl.app_env['user-interface-idiom']"),
        "tablet"
    );
}

#[test]
fn test_bootstrap_failure_sends_error_item() {
    let mut session = Session::spawn(false);
    session.dispatcher().start_session("phone").unwrap();

    match session.next() {
        Notification::Error(text) => assert!(!text.is_empty()),
        other => panic!("expected an error item, got {other:?}"),
    }

    // the engine survives a failed bootstrap
    session.submit(Command::Evaluate("1".into()));
    assert!(matches!(session.next(), Notification::Error(_)));
    assert_eq!(session.next(), Notification::EnableEval);
    assert_eq!(session.next(), Notification::EnablePrinting);
}

// ============================================================================
// Evaluation
// ============================================================================

#[test]
fn test_evaluate_prints_and_reenables() {
    let mut session = Session::start("phone");
    session.submit(Command::Evaluate("1 + 2".into()));
    assert_eq!(session.next(), Notification::Output("3".into()));
    assert_eq!(session.next(), Notification::EnableEval);
    assert_eq!(session.next(), Notification::EnablePrinting);
}

#[test]
fn test_evaluation_error_is_reported_then_reenabled() {
    let mut session = Session::start("phone");
    session.submit(Command::Evaluate("throw new Error('nope')".into()));

    match session.next() {
        Notification::Error(text) => assert!(text.contains("nope")),
        other => panic!("expected an error item, got {other:?}"),
    }
    assert_eq!(session.next(), Notification::EnableEval);
    assert_eq!(session.next(), Notification::EnablePrinting);

    assert_eq!(session.eval_ok("'still alive'"), "still alive");
}

#[test]
fn test_state_persists_between_evaluations() {
    let mut session = Session::start("phone");
    session.eval_ok("var counter = 41");
    assert_eq!(session.eval_ok("++counter"), "42");
}

#[test]
fn test_commands_from_many_producers_keep_their_order() {
    const PRODUCERS: usize = 4;
    const PER_PRODUCER: usize = 25;

    let mut session = Session::start("phone");
    let handles: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let sender = session.dispatcher().sender();
            thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    sender.submit(Command::Evaluate(format!("'{}:{}'", p, i))).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut last_seen: HashMap<usize, usize> = HashMap::new();
    let mut outputs = 0;
    while outputs < PRODUCERS * PER_PRODUCER {
        if let Notification::Output(text) = session.next() {
            let (p, i) = text.split_once(':').unwrap();
            let (p, i): (usize, usize) = (p.parse().unwrap(), i.parse().unwrap());
            if let Some(previous) = last_seen.insert(p, i) {
                assert!(i > previous, "producer {p} reordered: {i} after {previous}");
            }
            outputs += 1;
        }
    }
    assert_eq!(last_seen.len(), PRODUCERS);
}

// ============================================================================
// Imports
// ============================================================================

#[test]
fn test_modules_are_imported_once() {
    let mut session = Session::start("phone");
    assert_eq!(session.eval_ok("cljs.core.imports"), "1");

    session.eval_ok("AMBLY_IMPORT_SCRIPT('cljs/core.js')");
    session.eval_ok("AMBLY_IMPORT_SCRIPT('goog/../cljs/core.js')");
    session.eval_ok("goog.require('cljs.core')");
    assert_eq!(session.eval_ok("cljs.core.imports"), "1");
}

#[test]
fn test_load_reads_bundle_text() {
    let mut session = Session::start("phone");
    assert_eq!(
        session.eval_ok("REPLETE_LOAD('main.js').indexOf('nameToPath') >= 0"),
        "true"
    );
    assert_eq!(session.eval_ok("REPLETE_LOAD('absent.js')"), "undefined");
}

// ============================================================================
// Viewport and formatter
// ============================================================================

#[test]
fn test_set_viewport_width() {
    let mut session = Session::start("phone");
    session.submit(Command::SetViewportWidth(72.0));
    assert_eq!(session.eval_ok("replete.repl.width"), "72");
}

#[test]
fn test_formatter_returns_text_and_cursor() {
    let mut session = Session::start("phone");
    session.submit(Command::RunFormatter {
        text: "(foo".into(),
        enter_pressed: false,
        cursor: 4,
    });

    match session.next() {
        Notification::ApplyFormatting {
            original,
            formatted,
            cursor,
        } => {
            assert_eq!(original, "(foo");
            assert_eq!(formatted, "(foo)");
            assert!(cursor as usize <= formatted.chars().count());
        }
        other => panic!("expected formatting, got {other:?}"),
    }
}

#[test]
fn test_formatter_failure_is_reported() {
    let mut session = Session::start("phone");
    session.eval_ok("replete.repl.format = function () { throw new Error('bad format'); }");
    session.submit(Command::RunFormatter {
        text: "(".into(),
        enter_pressed: true,
        cursor: 1,
    });
    match session.next() {
        Notification::Error(text) => assert!(text.contains("bad format")),
        other => panic!("expected an error item, got {other:?}"),
    }
}

#[test]
fn test_unknown_handles_are_ignored() {
    let mut session = Session::start("phone");
    session.submit(Command::InvokeCallback(replete_vm::ForeignHandle(999)));
    session.submit(Command::ReleaseHandle(replete_vm::ForeignHandle(999)));
    assert_eq!(session.eval_ok("'ok'"), "ok");
}
