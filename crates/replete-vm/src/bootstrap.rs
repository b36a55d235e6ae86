//! Environment bootstrap
//!
//! Brings a fresh engine with natives installed up to a running REPL: the
//! Closure module loader, the core library, the REPL library, and the hooks
//! that route clock and printing back to the host.
//!
//! The sequence is fixed. The first failing step aborts the rest and the
//! engine is left as far as it got.

use crate::bundle::Bundle;
use crate::runtime::RepleteContext;
use replete_common::error::Result;

/// Module loader entry in the bundle.
pub const GOOG_BASE_PATH: &str = "goog/base.js";

/// Dependency table evaluated right after the loader.
pub const DEPS_PATH: &str = "main.js";

const GLOBAL_ALIAS: &str = "var global = this;";

const IMPORT_SHIM: &str = "CLOSURE_IMPORT_SCRIPT = function(src) { AMBLY_IMPORT_SCRIPT('goog/' + src); return true; }";

const LOADER_HOOKS: &[&str] = &[
    "goog.isProvided_ = function(x) { return false; };",
    "goog.require = function (name) { return CLOSURE_IMPORT_SCRIPT(goog.dependencies_.nameToPath[name]); };",
    "goog.require('cljs.core');",
    "cljs.core._STAR_loaded_libs_STAR_ = cljs.core.into.call(null, cljs.core.PersistentHashSet.EMPTY, [\"cljs.core\"]);\n\
     goog.require = function (name, reload) {\n\
         if (!cljs.core.contains_QMARK_(cljs.core._STAR_loaded_libs_STAR_, name) || reload) {\n\
             var loaded = cljs.core.PersistentHashSet.EMPTY;\n\
             if (cljs.core._STAR_loaded_libs_STAR_) {\n\
                 loaded = cljs.core._STAR_loaded_libs_STAR_;\n\
             }\n\
             cljs.core._STAR_loaded_libs_STAR_ = cljs.core.into.call(null, loaded, [name]);\n\
             CLOSURE_IMPORT_SCRIPT(goog.dependencies_.nameToPath[name]);\n\
         }\n\
     };",
    "goog.provide('cljs.user');",
    "goog.require('cljs.core');",
    "goog.require('replete.repl');",
    "replete.repl.setup_cljs_user();",
];

const HOST_HOOKS: &[&str] = &[
    "cljs.core.system_time = REPLETE_HIGH_RES_TIMER;",
    "cljs.core.set_print_fn_BANG_.call(null, REPLETE_PRINT_FN);",
    "cljs.core.set_print_err_fn_BANG_.call(null, REPLETE_PRINT_FN);",
    "var window = global;",
];

/// Run the bootstrap sequence against `engine`.
///
/// # Arguments
///
/// * `engine` - An engine with natives already installed
/// * `bundle` - Source of the loader, the dependency table and the libraries
/// * `device_kind` - Passed to the REPL as the user interface idiom
///
/// # Errors
///
/// Returns the first script failure, carrying its description and stack.
pub(crate) fn run(engine: &mut RepleteContext, bundle: &dyn Bundle, device_kind: &str) -> Result<()> {
    engine.eval(GLOBAL_ALIAS)?;
    engine.eval(IMPORT_SHIM)?;

    match bundle.get_contents(GOOG_BASE_PATH) {
        Some(base) => {
            engine.eval(&base)?;
            match bundle.get_contents(DEPS_PATH) {
                Some(deps) => {
                    engine.eval(&deps)?;
                }
                None => tracing::warn!("{} missing from bundle", DEPS_PATH),
            }
        }
        None => tracing::warn!("{} missing from bundle", GOOG_BASE_PATH),
    }

    for step in LOADER_HOOKS {
        engine.eval(step)?;
    }
    engine.eval(&app_env_script(device_kind))?;
    for step in HOST_HOOKS {
        engine.eval(step)?;
    }

    tracing::info!("Bootstrap complete for {}", device_kind);
    Ok(())
}

fn app_env_script(device_kind: &str) -> String {
    format!(
        "replete.repl.init_app_env({{'debug-build': false, 'target-simulator': false, 'user-interface-idiom': {}}});",
        js_string_literal(device_kind)
    )
}

/// Quote `text` as a single-quoted script string literal.
fn js_string_literal(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('\'');
    for c in text.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '\'' => quoted.push_str("\\'"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\u{2028}' => quoted.push_str("\\u2028"),
            '\u{2029}' => quoted.push_str("\\u2029"),
            c => quoted.push(c),
        }
    }
    quoted.push('\'');
    quoted
}
