//! Argument and result conversions for the native functions
//!
//! Natives receive loosely-typed JavaScript arguments. These helpers coerce
//! them the way the natives expect (strings via `ToString`, numbers via
//! `ToNumber`) and build the arrays and records handed back to scripts.
//!
//! # Byte values
//!
//! Byte arrays cross the boundary as arrays of numbers in `0..=255`. Incoming
//! numbers are reduced modulo 256, so `-1` becomes `255`. An incoming
//! array-like longer than [`MAX_BYTE_ARRAY_LENGTH`] is rejected with a
//! `RangeError` before any element is read.

use boa_engine::{
    js_string,
    object::builtins::{AlignedVec, JsArray, JsArrayBuffer},
    property::PropertyKey,
    Context, JsNativeError, JsObject, JsResult, JsString, JsValue,
};

/// Coerce argument `index` to a Rust string.
pub fn arg_string(args: &[JsValue], index: usize, ctx: &mut Context) -> JsResult<String> {
    let value = args.get(index).cloned().unwrap_or_else(JsValue::undefined);
    Ok(value.to_string(ctx)?.to_std_string_escaped())
}

pub fn arg_number(args: &[JsValue], index: usize, ctx: &mut Context) -> JsResult<f64> {
    let value = args.get(index).cloned().unwrap_or_else(JsValue::undefined);
    value.to_number(ctx)
}

pub fn arg_bool(args: &[JsValue], index: usize) -> bool {
    args.get(index).is_some_and(JsValue::to_boolean)
}

/// Coerce a number to a non-negative integer, mapping NaN and negatives to 0.
pub fn to_unsigned(number: f64) -> u64 {
    if number.is_finite() && number > 0.0 {
        number as u64
    } else {
        0
    }
}

/// Largest byte array a native accepts in one call.
pub const MAX_BYTE_ARRAY_LENGTH: u64 = 64 * 1024 * 1024;

/// Read an array-like of numbers (plain array or typed array) as bytes.
pub fn arg_bytes(args: &[JsValue], index: usize, ctx: &mut Context) -> JsResult<Vec<u8>> {
    let value = args.get(index).cloned().unwrap_or_else(JsValue::undefined);
    let Some(obj) = value.as_object() else {
        return Err(JsNativeError::typ()
            .with_message("expected an array of bytes")
            .into());
    };

    let length = obj.get(js_string!("length"), ctx)?.to_length(ctx)?;
    if length > MAX_BYTE_ARRAY_LENGTH {
        return Err(JsNativeError::range()
            .with_message(format!(
                "byte array length {} exceeds {}",
                length, MAX_BYTE_ARRAY_LENGTH
            ))
            .into());
    }

    let mut bytes = Vec::new();
    for i in 0..length {
        let element = obj.get(PropertyKey::from(i), ctx)?;
        bytes.push(number_to_byte(element.to_number(ctx)?));
    }
    Ok(bytes)
}

fn number_to_byte(number: f64) -> u8 {
    if !number.is_finite() {
        return 0;
    }
    (number.trunc() as i64).rem_euclid(256) as u8
}

pub fn js_str(text: &str) -> JsValue {
    JsValue::new(JsString::from(text))
}

/// Build an array of byte values, each in `0..=255`.
pub fn bytes_to_array(bytes: &[u8], ctx: &mut Context) -> JsValue {
    let values = bytes.iter().map(|b| JsValue::new(i32::from(*b)));
    JsArray::from_iter(values, ctx).into()
}

pub fn strings_to_array(items: &[String], ctx: &mut Context) -> JsValue {
    let values = items.iter().map(|s| js_str(s));
    JsArray::from_iter(values, ctx).into()
}

pub fn bytes_to_array_buffer(bytes: Vec<u8>, ctx: &mut Context) -> JsResult<JsValue> {
    let block = AlignedVec::from_iter(0, bytes);
    Ok(JsArrayBuffer::from_byte_block(block, ctx)?.into())
}

/// Build a plain object from string pairs.
pub fn record(entries: &[(String, String)], ctx: &mut Context) -> JsResult<JsObject> {
    let obj = JsObject::default(ctx.intrinsics());
    for (key, value) in entries {
        obj.create_data_property_or_throw(JsString::from(key.as_str()), js_str(value), ctx)?;
    }
    Ok(obj)
}

/// Read an optional property, treating `undefined` and `null` as absent.
pub fn opt_property(obj: &JsObject, name: &str, ctx: &mut Context) -> JsResult<Option<JsValue>> {
    let value = obj.get(JsString::from(name), ctx)?;
    if value.is_null_or_undefined() {
        Ok(None)
    } else {
        Ok(Some(value))
    }
}

pub fn opt_string(obj: &JsObject, name: &str, ctx: &mut Context) -> JsResult<Option<String>> {
    match opt_property(obj, name, ctx)? {
        Some(value) => Ok(Some(value.to_string(ctx)?.to_std_string_escaped())),
        None => Ok(None),
    }
}

/// String pairs of an object's own enumerable string-keyed properties.
pub fn string_entries(obj: &JsObject, ctx: &mut Context) -> JsResult<Vec<(String, String)>> {
    let mut entries = Vec::new();
    for key in obj.own_property_keys(ctx)? {
        let name = match &key {
            PropertyKey::String(s) => s.to_std_string_escaped(),
            PropertyKey::Index(i) => i.get().to_string(),
            PropertyKey::Symbol(_) => continue,
        };
        let value = obj.get(key, ctx)?;
        entries.push((name, value.to_string(ctx)?.to_std_string_escaped()));
    }
    Ok(entries)
}
