//! Decoding go command output
//!
//! `go list -json` and `go mod download -json` print one JSON object per
//! record, back to back, with no enclosing array. [`decode_stream`] turns such
//! a buffer into records; [`decode_object`] handles the single flat object
//! printed by `go env -json`.

use crate::error::{DecodeError, LoadError};
use crate::invoke::{Attr, Invocation, Invoker};
use serde::de::DeserializeOwned;
use serde_json::Deserializer;
use std::collections::BTreeMap;

/// Decode every JSON value in `data`, in order.
///
/// Decoding is all or nothing: the first value that is malformed, truncated
/// or does not fit `T` fails the whole call.
pub fn decode_stream<T: DeserializeOwned>(data: &[u8]) -> Result<Vec<T>, DecodeError> {
    Deserializer::from_slice(data)
        .into_iter::<T>()
        .enumerate()
        .map(|(index, value)| value.map_err(|source| DecodeError { index, source }))
        .collect()
}

/// Decode a single JSON object mapping names to string values.
pub fn decode_object(data: &[u8]) -> Result<BTreeMap<String, String>, DecodeError> {
    serde_json::from_slice(data).map_err(|source| DecodeError { index: 0, source })
}

/// Run `invocation` with `attr` applied and decode its stdout as a stream.
pub(crate) async fn invoke_stream<T: DeserializeOwned>(
    invoker: &Invoker,
    attr: &Attr,
    invocation: Invocation,
) -> Result<Vec<T>, LoadError> {
    let stdout = invoker.invoke(&invocation.attr(attr)).await?;
    Ok(decode_stream(&stdout)?)
}
