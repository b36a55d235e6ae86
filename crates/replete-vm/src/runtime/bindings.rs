//! Native function bindings
//!
//! Installs the host capabilities into the engine's global namespace. Every
//! native is a thin adapter: it checks arity, coerces arguments, calls into
//! [`Bridge`] and converts the outcome back into a script value.
//!
//! # Arity
//!
//! A call with the wrong number of arguments returns `undefined` without
//! doing anything. Natives with `arity: None` accept any argument count.
//!
//! # Result conventions
//!
//! - Stream opens return the path, and throw on a duplicate open or I/O failure.
//! - Stream writes, flushes and closes return `undefined` on success and the
//!   error text on failure.
//! - Filesystem mutations report failures as error items and return `undefined`.
//! - HTTP failures come back as `{error}` records.

use super::bridge::Bridge;
use super::conversions::{
    arg_bool, arg_bytes, arg_number, arg_string, bytes_to_array, bytes_to_array_buffer, js_str,
    opt_property, opt_string, record, string_entries, strings_to_array, to_unsigned,
};
use super::registry;
use crate::handles::StreamError;
use crate::http::{HttpOptions, HttpResponse};
use boa_engine::{
    js_string, native_function::NativeFunction, object::builtins::JsArray, Context, JsNativeError,
    JsObject, JsResult, JsString, JsValue, Source,
};
use replete_common::error::{RepleteError, Result};
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

type NativeBody = fn(&Bridge, &[JsValue], &mut Context) -> JsResult<JsValue>;

/// A native function exposed under a fixed global name.
pub(crate) struct Native {
    pub name: &'static str,
    pub arity: Option<usize>,
    body: NativeBody,
}

const fn native(name: &'static str, arity: usize, body: NativeBody) -> Native {
    Native {
        name,
        arity: Some(arity),
        body,
    }
}

const fn variadic(name: &'static str, body: NativeBody) -> Native {
    Native {
        name,
        arity: None,
        body,
    }
}

pub(crate) const NATIVES: &[Native] = &[
    native("REPLETE_LOAD", 1, load),
    native("REPLETE_PRINT_FN", 1, print),
    native("AMBLY_IMPORT_SCRIPT", 1, import_script),
    variadic("REPLETE_HIGH_RES_TIMER", high_res_timer),
    native("REPLETE_REQUEST", 1, request),
    native("REPLETE_RAW_WRITE_STDOUT", 1, write_stdout),
    variadic("REPLETE_RAW_FLUSH_STDOUT", flush_stdout),
    native("REPLETE_RAW_WRITE_STDERR", 1, write_stderr),
    variadic("REPLETE_RAW_FLUSH_STDERR", flush_stderr),
    native("REPLETE_IS_DIRECTORY", 1, is_directory),
    native("REPLETE_LIST_FILES", 1, list_files),
    native("REPLETE_DELETE", 1, delete),
    native("REPLETE_COPY", 2, copy),
    native("REPLETE_MKDIRS", 1, make_dirs),
    native("REPLETE_FILE_READER_OPEN", 2, reader_open),
    native("REPLETE_FILE_READER_READ", 1, reader_read),
    native("REPLETE_FILE_READER_CLOSE", 1, reader_close),
    native("REPLETE_FILE_WRITER_OPEN", 3, writer_open),
    native("REPLETE_FILE_WRITER_WRITE", 2, writer_write),
    native("REPLETE_FILE_WRITER_FLUSH", 1, writer_flush),
    native("REPLETE_FILE_WRITER_CLOSE", 1, writer_close),
    native("REPLETE_FILE_INPUT_STREAM_OPEN", 1, input_open),
    native("REPLETE_FILE_INPUT_STREAM_READ", 1, input_read),
    native("REPLETE_FILE_INPUT_STREAM_CLOSE", 1, input_close),
    native("REPLETE_FILE_OUTPUT_STREAM_OPEN", 2, output_open),
    native("REPLETE_FILE_OUTPUT_STREAM_WRITE", 2, output_write),
    native("REPLETE_FILE_OUTPUT_STREAM_FLUSH", 1, output_flush),
    native("REPLETE_FILE_OUTPUT_STREAM_CLOSE", 1, output_close),
    native("setTimeout", 2, set_timeout),
    native("clearTimeout", 1, clear_timeout),
    native("setInterval", 2, set_interval),
    native("clearInterval", 1, clear_interval),
];

/// Install the handle registry and every native into the global object.
///
/// # Errors
///
/// Returns `RepleteError::JavaScriptExecution` if a global cannot be defined.
pub(crate) fn install_bindings(ctx: &mut Context, bridge: Rc<Bridge>) -> Result<()> {
    registry::install(ctx).map_err(|e| RepleteError::JavaScriptExecution(e.to_string()))?;

    for entry in NATIVES {
        let bridge = Rc::clone(&bridge);
        let name = entry.name;
        let arity = entry.arity;
        let body = entry.body;

        // SAFETY: the closure captures an `Rc<Bridge>`, a name and a fn
        // pointer. None of them hold garbage-collected values.
        let function = unsafe {
            NativeFunction::from_closure(move |_this, args, context| {
                if let Some(expected) = arity {
                    if args.len() != expected {
                        tracing::debug!(
                            "{} called with {} arguments, expected {}",
                            name,
                            args.len(),
                            expected
                        );
                        return Ok(JsValue::undefined());
                    }
                }
                body(&bridge, args, context)
            })
        };

        ctx.register_global_callable(JsString::from(name), arity.unwrap_or(0), function)
            .map_err(|e| {
                RepleteError::JavaScriptExecution(format!("Failed to register {}: {}", name, e))
            })?;
    }

    tracing::debug!("Installed {} natives", NATIVES.len());
    Ok(())
}

// ============================================================================
// Script loading and output
// ============================================================================

fn load(bridge: &Bridge, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let path = arg_string(args, 0, ctx)?;
    Ok(bridge
        .load(&path)
        .map(|source| js_str(&source))
        .unwrap_or_else(JsValue::undefined))
}

fn import_script(bridge: &Bridge, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let path = arg_string(args, 0, ctx)?;
    if let Some((name, source)) = bridge.begin_import(&path) {
        tracing::debug!("Importing {}", name);
        ctx.eval(Source::from_bytes(source.as_bytes()))?;
    }
    Ok(JsValue::undefined())
}

fn print(bridge: &Bridge, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    bridge.print(arg_string(args, 0, ctx)?);
    Ok(JsValue::undefined())
}

fn high_res_timer(bridge: &Bridge, _args: &[JsValue], _ctx: &mut Context) -> JsResult<JsValue> {
    Ok(JsValue::new(bridge.high_res_time()))
}

fn write_stdout(bridge: &Bridge, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    if let Err(e) = bridge.write_stdout(&arg_string(args, 0, ctx)?) {
        tracing::warn!("stdout write failed: {}", e);
    }
    Ok(JsValue::undefined())
}

fn flush_stdout(bridge: &Bridge, _args: &[JsValue], _ctx: &mut Context) -> JsResult<JsValue> {
    if let Err(e) = bridge.flush_stdout() {
        tracing::warn!("stdout flush failed: {}", e);
    }
    Ok(JsValue::undefined())
}

fn write_stderr(bridge: &Bridge, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    if let Err(e) = bridge.write_stderr(&arg_string(args, 0, ctx)?) {
        tracing::warn!("stderr write failed: {}", e);
    }
    Ok(JsValue::undefined())
}

fn flush_stderr(bridge: &Bridge, _args: &[JsValue], _ctx: &mut Context) -> JsResult<JsValue> {
    if let Err(e) = bridge.flush_stderr() {
        tracing::warn!("stderr flush failed: {}", e);
    }
    Ok(JsValue::undefined())
}

// ============================================================================
// Filesystem
// ============================================================================

fn is_directory(bridge: &Bridge, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let path = arg_string(args, 0, ctx)?;
    Ok(JsValue::new(bridge.files().is_directory(&path)))
}

fn list_files(bridge: &Bridge, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let path = arg_string(args, 0, ctx)?;
    match bridge.files().list_files(&path) {
        Ok(names) => Ok(strings_to_array(&names, ctx)),
        Err(e) => {
            tracing::debug!("Cannot list {}: {}", path, e);
            Ok(JsValue::undefined())
        }
    }
}

fn delete(bridge: &Bridge, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    bridge.delete(&arg_string(args, 0, ctx)?);
    Ok(JsValue::undefined())
}

fn copy(bridge: &Bridge, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let from = arg_string(args, 0, ctx)?;
    let to = arg_string(args, 1, ctx)?;
    bridge.copy(&from, &to);
    Ok(JsValue::undefined())
}

fn make_dirs(bridge: &Bridge, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    bridge.make_dirs(&arg_string(args, 0, ctx)?);
    Ok(JsValue::undefined())
}

// ============================================================================
// Streams
// ============================================================================

/// Open result: the path on success, a thrown error otherwise.
fn opened(path: String, result: std::result::Result<(), StreamError>) -> JsResult<JsValue> {
    match result {
        Ok(()) => Ok(js_str(&path)),
        Err(e) => Err(JsNativeError::error().with_message(e.to_string()).into()),
    }
}

/// In-band result: `undefined` on success, the error text on failure.
fn in_band(op: &str, result: std::result::Result<(), StreamError>) -> JsValue {
    match result {
        Ok(()) => JsValue::undefined(),
        Err(StreamError::NotOpen(path)) => {
            tracing::warn!("{} on unopened path {}", op, path);
            JsValue::undefined()
        }
        Err(e) => js_str(&e.to_string()),
    }
}

fn reader_open(bridge: &Bridge, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let path = arg_string(args, 0, ctx)?;
    let encoding = arg_string(args, 1, ctx)?;
    let result = bridge.reader_open(&path, &encoding);
    opened(path, result)
}

fn reader_read(bridge: &Bridge, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let path = arg_string(args, 0, ctx)?;
    let pair = match bridge.reader_read(&path) {
        Ok(Some(c)) => [js_str(c.encode_utf8(&mut [0; 4])), JsValue::undefined()],
        Ok(None) => [JsValue::undefined(), JsValue::undefined()],
        Err(StreamError::NotOpen(_)) => {
            tracing::warn!("read on unopened reader {}", path);
            return Ok(JsValue::undefined());
        }
        Err(e) => [JsValue::undefined(), js_str(&e.to_string())],
    };
    Ok(JsArray::from_iter(pair, ctx).into())
}

fn reader_close(bridge: &Bridge, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let path = arg_string(args, 0, ctx)?;
    Ok(in_band("close", bridge.reader_close(&path)))
}

fn writer_open(bridge: &Bridge, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let path = arg_string(args, 0, ctx)?;
    let append = arg_bool(args, 1);
    let encoding = arg_string(args, 2, ctx)?;
    let result = bridge.writer_open(&path, append, &encoding);
    opened(path, result)
}

fn writer_write(bridge: &Bridge, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let path = arg_string(args, 0, ctx)?;
    let text = arg_string(args, 1, ctx)?;
    Ok(in_band("write", bridge.writer_write(&path, &text)))
}

fn writer_flush(bridge: &Bridge, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let path = arg_string(args, 0, ctx)?;
    Ok(in_band("flush", bridge.writer_flush(&path)))
}

fn writer_close(bridge: &Bridge, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let path = arg_string(args, 0, ctx)?;
    Ok(in_band("close", bridge.writer_close(&path)))
}

fn input_open(bridge: &Bridge, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let path = arg_string(args, 0, ctx)?;
    let result = bridge.input_open(&path);
    opened(path, result)
}

fn input_read(bridge: &Bridge, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let path = arg_string(args, 0, ctx)?;
    match bridge.input_read(&path) {
        Ok(Some(bytes)) => Ok(bytes_to_array(&bytes, ctx)),
        Ok(None) => Ok(JsValue::undefined()),
        Err(e) => Ok(in_band("read", Err(e))),
    }
}

fn input_close(bridge: &Bridge, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let path = arg_string(args, 0, ctx)?;
    Ok(in_band("close", bridge.input_close(&path)))
}

fn output_open(bridge: &Bridge, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let path = arg_string(args, 0, ctx)?;
    let append = arg_bool(args, 1);
    let result = bridge.output_open(&path, append);
    opened(path, result)
}

fn output_write(bridge: &Bridge, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let path = arg_string(args, 0, ctx)?;
    let bytes = arg_bytes(args, 1, ctx)?;
    Ok(in_band("write", bridge.output_write(&path, &bytes)))
}

fn output_flush(bridge: &Bridge, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let path = arg_string(args, 0, ctx)?;
    Ok(in_band("flush", bridge.output_flush(&path)))
}

fn output_close(bridge: &Bridge, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let path = arg_string(args, 0, ctx)?;
    Ok(in_band("close", bridge.output_close(&path)))
}

// ============================================================================
// HTTP
// ============================================================================

/// Read the request options record. Returns `None` when `url` is missing.
fn http_options(opts: &JsObject, ctx: &mut Context) -> JsResult<Option<HttpOptions>> {
    let Some(url) = opt_string(opts, "url", ctx)? else {
        return Ok(None);
    };
    let mut options = HttpOptions::new(url);

    if let Some(timeout) = opt_property(opts, "timeout", ctx)? {
        options = options.with_timeout_secs(to_unsigned(timeout.to_number(ctx)?));
    }
    if let Some(binary) = opt_property(opts, "binary-response", ctx)? {
        options.binary_response = binary.to_boolean();
    }
    if let Some(method) = opt_string(opts, "method", ctx)? {
        options.method = method;
    }
    options.body = opt_string(opts, "body", ctx)?;
    if let Some(headers) = opt_property(opts, "headers", ctx)? {
        if let Some(headers) = headers.as_object() {
            options.headers = string_entries(&headers, ctx)?;
        }
    }
    options.user_agent = opt_string(opts, "user-agent", ctx)?;
    if let Some(insecure) = opt_property(opts, "insecure", ctx)? {
        options.insecure = insecure.to_boolean();
    }
    options.socket = opt_string(opts, "socket", ctx)?.map(PathBuf::from);

    Ok(Some(options))
}

fn http_result(response: HttpResponse, binary: bool, ctx: &mut Context) -> JsResult<JsValue> {
    let result = JsObject::default(ctx.intrinsics());
    let headers = record(&response.headers, ctx)?;
    let body = if binary {
        bytes_to_array_buffer(response.body, ctx)?
    } else {
        js_str(&response.text())
    };

    result.create_data_property_or_throw(js_string!("status"), JsValue::new(i32::from(response.status)), ctx)?;
    result.create_data_property_or_throw(js_string!("headers"), headers, ctx)?;
    result.create_data_property_or_throw(js_string!("body"), body, ctx)?;
    Ok(result.into())
}

fn request(bridge: &Bridge, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let Some(opts) = args[0].as_object() else {
        tracing::warn!("request called without an options object");
        return Ok(JsValue::undefined());
    };
    let Some(options) = http_options(&opts, ctx)? else {
        tracing::warn!("request called without a url");
        return Ok(JsValue::undefined());
    };

    match bridge.http().execute(&options) {
        Ok(response) => http_result(response, options.binary_response, ctx),
        Err(e) => {
            tracing::debug!("Request to {} failed: {}", options.url, e);
            Ok(record(&[("error".to_string(), e.to_string())], ctx)?.into())
        }
    }
}

// ============================================================================
// Timers
// ============================================================================

#[derive(Clone, Copy)]
enum Schedule {
    Once,
    Every,
}

fn schedule(bridge: &Bridge, args: &[JsValue], ctx: &mut Context, kind: Schedule) -> JsResult<JsValue> {
    let callback = args[0].clone();
    if !callback.as_object().is_some_and(|f| f.is_callable()) {
        tracing::warn!("timer callback is not a function");
        return Ok(JsValue::undefined());
    }
    let delay = Duration::from_millis(to_unsigned(arg_number(args, 1, ctx)?));

    let handle = bridge.next_handle();
    registry::store(ctx, handle, callback)?;

    let registered = match kind {
        Schedule::Once => bridge.set_timeout(handle, delay),
        Schedule::Every => bridge.set_interval(handle, delay),
    };
    match registered {
        Ok(id) => Ok(JsValue::new(id as f64)),
        Err(e) => {
            registry::release(ctx, handle)?;
            Err(JsNativeError::error()
                .with_message(format!("Failed to start timer: {}", e))
                .into())
        }
    }
}

fn timer_id(args: &[JsValue], ctx: &mut Context) -> JsResult<u64> {
    Ok(to_unsigned(arg_number(args, 0, ctx)?))
}

fn set_timeout(bridge: &Bridge, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    schedule(bridge, args, ctx, Schedule::Once)
}

fn clear_timeout(bridge: &Bridge, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    bridge.clear_timeout(timer_id(args, ctx)?);
    Ok(JsValue::undefined())
}

fn set_interval(bridge: &Bridge, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    schedule(bridge, args, ctx, Schedule::Every)
}

fn clear_interval(bridge: &Bridge, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    bridge.clear_interval(timer_id(args, ctx)?);
    Ok(JsValue::undefined())
}
