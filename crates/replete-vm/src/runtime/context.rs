use boa_engine::{js_string, property::PropertyKey, Context, JsError, JsObject, JsValue, Source};
use replete_common::error::{RepleteError, Result};
use std::rc::Rc;

use crate::command::ForeignHandle;
use crate::runtime::{bindings, bridge::Bridge, registry};

/// The engine instance owned by the dispatcher thread.
///
/// Boa's `Context` is neither `Send` nor `Sync`. A `RepleteContext` is
/// created by the worker loop and never leaves that thread; producers reach
/// it only through the command queue.
pub(crate) struct RepleteContext {
    ctx: Context,
}

impl RepleteContext {
    pub fn new() -> Self {
        tracing::info!("Engine created");
        Self {
            ctx: Context::default(),
        }
    }

    /// Register the native capability functions.
    pub fn install_bindings(&mut self, bridge: Rc<Bridge>) -> Result<()> {
        bindings::install_bindings(&mut self.ctx, bridge)
    }

    /// Evaluate a script in the global scope.
    ///
    /// # Errors
    ///
    /// Returns `RepleteError::JavaScriptExecution` carrying the exception's
    /// description and stack if the script throws.
    pub fn eval(&mut self, source: &str) -> Result<JsValue> {
        let result = self.ctx.eval(Source::from_bytes(source.as_bytes()));
        result.map_err(|e| self.script_error(&e))
    }

    /// Drain pending promise jobs.
    pub fn run_jobs(&mut self) {
        if let Err(e) = self.ctx.run_jobs() {
            let text = describe_error(&e, &mut self.ctx);
            tracing::warn!("Job queue failed: {}", text);
        }
    }

    fn script_error(&mut self, err: &JsError) -> RepleteError {
        RepleteError::JavaScriptExecution(describe_error(err, &mut self.ctx))
    }

    /// Resolve `replete.repl.<name>` and call it with the given arguments.
    fn call_repl(&mut self, name: &str, args: &[JsValue]) -> Result<JsValue> {
        let function = self.eval(&format!("replete.repl.{}", name))?;
        let Some(function) = function.as_object().filter(|f| f.is_callable()) else {
            return Err(RepleteError::JavaScriptExecution(format!(
                "replete.repl.{} is not a function",
                name
            )));
        };
        let result = function.call(&JsValue::undefined(), args, &mut self.ctx);
        result.map_err(|e| self.script_error(&e))
    }

    pub fn read_eval_print(&mut self, text: &str) -> Result<()> {
        self.call_repl("read_eval_print", &[JsValue::new(js_string!(text))])?;
        Ok(())
    }

    pub fn set_width(&mut self, width: f64) -> Result<()> {
        self.call_repl("set_width", &[JsValue::new(width)])?;
        Ok(())
    }

    /// Run the engine-side formatter.
    ///
    /// # Returns
    ///
    /// The formatted text and the new cursor position, clamped to the text.
    pub fn format(&mut self, text: &str, cursor: u32, enter_pressed: bool) -> Result<(String, u32)> {
        let result = self.call_repl(
            "format",
            &[
                JsValue::new(js_string!(text)),
                JsValue::new(cursor),
                JsValue::new(enter_pressed),
            ],
        )?;
        let Some(pair) = result.as_object() else {
            return Err(RepleteError::JavaScriptExecution(
                "formatter did not return a [text, cursor] pair".into(),
            ));
        };
        self.format_pair(&pair)
    }

    fn format_pair(&mut self, pair: &JsObject) -> Result<(String, u32)> {
        let ctx = &mut self.ctx;
        let text = pair
            .get(PropertyKey::from(0u32), ctx)
            .and_then(|v| v.to_string(ctx))
            .map(|s| s.to_std_string_escaped());
        let cursor = pair
            .get(PropertyKey::from(1u32), ctx)
            .and_then(|v| v.to_number(ctx));

        match (text, cursor) {
            (Ok(text), Ok(cursor)) => {
                let length = text.encode_utf16().count() as f64;
                let cursor = if cursor.is_finite() { cursor.clamp(0.0, length) } else { 0.0 };
                Ok((text, cursor as u32))
            }
            (Err(e), _) | (_, Err(e)) => Err(self.script_error(&e)),
        }
    }

    /// Call the function behind `handle` with no receiver and no arguments.
    ///
    /// A handle that was already released is skipped.
    pub fn invoke_handle(&mut self, handle: ForeignHandle) -> Result<()> {
        let callback = registry::get(&mut self.ctx, handle).map_err(|e| self.script_error(&e))?;
        let Some(callback) = callback else {
            tracing::warn!("Invoke of released handle {}", handle.0);
            return Ok(());
        };
        let Some(function) = callback.as_object().filter(|f| f.is_callable()) else {
            tracing::warn!("Handle {} is not callable", handle.0);
            return Ok(());
        };
        let result = function.call(&JsValue::undefined(), &[], &mut self.ctx);
        result.map(|_| ()).map_err(|e| self.script_error(&e))
    }

    pub fn release_handle(&mut self, handle: ForeignHandle) -> bool {
        match registry::release(&mut self.ctx, handle) {
            Ok(released) => {
                if !released {
                    tracing::debug!("Handle {} already released", handle.0);
                }
                released
            }
            Err(e) => {
                tracing::warn!("Release of handle {} failed: {}", handle.0, e);
                false
            }
        }
    }

    #[cfg(test)]
    pub fn live_handles(&mut self) -> usize {
        registry::live_count(&mut self.ctx).unwrap_or(0)
    }
}

/// Render an exception as its description followed by the stack, if any.
pub(crate) fn describe_error(err: &JsError, ctx: &mut Context) -> String {
    let mut text = err.to_string();
    let Some(thrown) = err.as_opaque() else {
        return text;
    };
    let Some(obj) = thrown.as_object() else {
        return text;
    };
    if let Ok(stack) = obj.get(js_string!("stack"), ctx) {
        if !stack.is_null_or_undefined() {
            if let Ok(stack) = stack.to_string(ctx) {
                let stack = stack.to_std_string_escaped();
                if !stack.is_empty() {
                    text.push('\n');
                    text.push_str(&stack);
                }
            }
        }
    }
    text
}
