//! Engine-side registry of foreign handles
//!
//! Objects handed to the host (timer callbacks) stay inside the engine in a
//! hidden global object keyed by handle id. Only the numeric id leaves the
//! dispatcher thread, so nothing garbage-collected is ever shared.

use crate::command::ForeignHandle;
use boa_engine::{property::Attribute, Context, JsObject, JsResult, JsString, JsValue};

pub const REGISTRY_GLOBAL: &str = "__repleteHandles";

fn key(handle: ForeignHandle) -> JsString {
    JsString::from(handle.0.to_string().as_str())
}

fn registry(ctx: &mut Context) -> JsResult<JsObject> {
    let global = ctx.global_object();
    let value = global.get(JsString::from(REGISTRY_GLOBAL), ctx)?;
    match value.as_object() {
        Some(obj) => Ok(obj.clone()),
        None => Err(boa_engine::JsNativeError::error()
            .with_message("handle registry is not installed")
            .into()),
    }
}

/// Create the hidden registry object. Not enumerable, not writable.
///
/// An existing registry is kept along with every handle it holds.
pub fn install(ctx: &mut Context) -> JsResult<()> {
    let global = ctx.global_object();
    if global.has_own_property(JsString::from(REGISTRY_GLOBAL), ctx)? {
        tracing::debug!("Handle registry already installed");
        return Ok(());
    }
    let store = JsObject::default(ctx.intrinsics());
    ctx.register_global_property(JsString::from(REGISTRY_GLOBAL), store, Attribute::CONFIGURABLE)
}

/// Keep `value` alive under `handle` until it is released.
pub fn store(ctx: &mut Context, handle: ForeignHandle, value: JsValue) -> JsResult<()> {
    let store = registry(ctx)?;
    store.set(key(handle), value, true, ctx)?;
    Ok(())
}

/// Look up a handle. Released or unknown handles yield `None`.
pub fn get(ctx: &mut Context, handle: ForeignHandle) -> JsResult<Option<JsValue>> {
    let store = registry(ctx)?;
    let key = key(handle);
    if !store.has_own_property(key.clone(), ctx)? {
        return Ok(None);
    }
    Ok(Some(store.get(key, ctx)?))
}

/// Drop the engine-side reference. Returns whether the handle was live.
pub fn release(ctx: &mut Context, handle: ForeignHandle) -> JsResult<bool> {
    let store = registry(ctx)?;
    let key = key(handle);
    if !store.has_own_property(key.clone(), ctx)? {
        return Ok(false);
    }
    store.delete_property_or_throw(key, ctx)?;
    Ok(true)
}

/// Number of live handles.
#[cfg(test)]
pub fn live_count(ctx: &mut Context) -> JsResult<usize> {
    let store = registry(ctx)?;
    Ok(store.own_property_keys(ctx)?.len())
}
