use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::{Result, RpcError};

/// `{"json": ..., "meta": ...}` wrapper around procedure inputs and outputs.
///
/// `meta` is the superjson annotation tree describing values plain JSON
/// cannot carry (bigints, maps, sets, dates, `undefined`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub json: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<JsonValue>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResponseBody {
    #[serde(default)]
    result: Option<ResultBody>,
    #[serde(default)]
    error: Option<Envelope<ErrorShape>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResultBody {
    data: Envelope<JsonValue>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorShape {
    message: String,
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    data: Option<ErrorData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ErrorData {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    http_status: Option<u16>,
    #[serde(default)]
    path: Option<String>,
}

/// Serializes a procedure input into its envelope.
///
/// Returns `None` when the input is `null` (unit or `None`), which is sent
/// as an absent input.
pub(crate) fn encode_input<I: Serialize + ?Sized>(input: &I) -> Result<Option<String>> {
    let json = serde_json::to_value(input)
        .map_err(|err| RpcError::Encode(format!("procedure input: {err}")))?;
    if json.is_null() {
        return Ok(None);
    }
    let envelope = Envelope { json, meta: None };
    serde_json::to_string(&envelope)
        .map(Some)
        .map_err(|err| RpcError::Encode(format!("procedure input envelope: {err}")))
}

/// Decodes a response body into the procedure output, keeping the
/// superjson `meta` next to it, or into the procedure error.
///
/// Annotations in `meta` are applied before the output is deserialized.
pub(crate) fn decode_envelope<O: DeserializeOwned>(body: &[u8]) -> Result<Envelope<O>> {
    let response: ResponseBody = serde_json::from_slice(body).map_err(|err| {
        RpcError::Decode(format!(
            "invalid rpc response JSON: {err}; body: {}",
            String::from_utf8_lossy(body)
        ))
    })?;

    if let Some(error) = response.error {
        return Err(procedure_error(error.json));
    }

    let Envelope { json, meta } = response
        .result
        .ok_or_else(|| RpcError::Decode("rpc response has neither result nor error".to_owned()))?
        .data;

    let json = apply_meta(json, meta.as_ref());
    let json = serde_json::from_value(json)
        .map_err(|err| RpcError::Decode(format!("procedure output: {err}")))?;
    Ok(Envelope { json, meta })
}

/// Rewrites annotated values in `json` into shapes serde can deserialize.
///
/// - `bigint`: decimal string to integer, when it fits `i64`/`u64`
/// - `map`: `[[key, value], ...]` to an object, when keys are scalars
/// - `undefined`: `null`
/// - `number`: `"-0"` to `-0.0`; `NaN` and infinities stay strings
///
/// `set`, `Date`, `regexp`, `URL` and `Error` already have a usable JSON
/// shape and are left alone, as are class and custom annotations.
pub(crate) fn apply_meta(mut json: JsonValue, meta: Option<&JsonValue>) -> JsonValue {
    if let Some(values) = meta.and_then(|meta| meta.get("values")) {
        apply_tree(&mut json, values, &[]);
    }
    json
}

fn apply_tree(root: &mut JsonValue, tree: &JsonValue, origin: &[String]) {
    match tree {
        JsonValue::Object(children) => apply_children(root, children, origin),
        JsonValue::Array(node) => {
            // Children first: a map's entries are annotated while still an array.
            if let Some(JsonValue::Object(children)) = node.get(1) {
                apply_children(root, children, origin);
            }
            if let (Some(JsonValue::String(annotation)), Some(target)) =
                (node.first(), lookup_mut(root, origin))
            {
                apply_annotation(target, annotation);
            }
        }
        _ => {}
    }
}

fn apply_children(root: &mut JsonValue, children: &Map<String, JsonValue>, origin: &[String]) {
    for (key, subtree) in children {
        let mut path = origin.to_vec();
        path.extend(parse_path(key));
        apply_tree(root, subtree, &path);
    }
}

fn lookup_mut<'a>(root: &'a mut JsonValue, path: &[String]) -> Option<&'a mut JsonValue> {
    path.iter().try_fold(root, |value, segment| match value {
        JsonValue::Object(map) => map.get_mut(segment),
        JsonValue::Array(items) => segment
            .parse::<usize>()
            .ok()
            .and_then(move |index| items.get_mut(index)),
        _ => None,
    })
}

/// Splits a dotted path; `\.` is a literal dot inside a key.
fn parse_path(key: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = key.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            '.' => segments.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    segments.push(current);
    segments
}

fn apply_annotation(target: &mut JsonValue, annotation: &str) {
    let replacement = match (annotation, &*target) {
        ("undefined", _) => Some(JsonValue::Null),
        ("bigint", JsonValue::String(digits)) => parse_integer(digits),
        ("number", JsonValue::String(number)) if number == "-0" => Some(JsonValue::from(-0.0)),
        ("map", JsonValue::Array(entries)) => entries_to_object(entries).map(JsonValue::Object),
        _ => None,
    };
    if let Some(value) = replacement {
        *target = value;
    }
}

fn parse_integer(digits: &str) -> Option<JsonValue> {
    digits
        .parse::<i64>()
        .map(JsonValue::from)
        .or_else(|_| digits.parse::<u64>().map(JsonValue::from))
        .ok()
}

fn entries_to_object(entries: &[JsonValue]) -> Option<Map<String, JsonValue>> {
    entries
        .iter()
        .map(|entry| match entry.as_array().map(Vec::as_slice) {
            Some([key, value]) => {
                let key = match key {
                    JsonValue::String(key) => key.clone(),
                    JsonValue::Number(key) => key.to_string(),
                    JsonValue::Bool(key) => key.to_string(),
                    _ => return None,
                };
                Some((key, value.clone()))
            }
            _ => None,
        })
        .collect()
}

/// Extracts a procedure error from a 4xx body, if it carries one.
pub(crate) fn decode_error(body: &str) -> Option<RpcError> {
    let response: ResponseBody = serde_json::from_str(body).ok()?;
    response.error.map(|error| procedure_error(error.json))
}

fn procedure_error(shape: ErrorShape) -> RpcError {
    let data = shape.data.unwrap_or_default();
    let code = data
        .code
        .or_else(|| shape.code.map(|code| code.to_string()))
        .unwrap_or_else(|| "UNKNOWN".to_owned());
    RpcError::Procedure {
        code,
        message: shape.message,
        http_status: data.http_status,
        path: data.path,
    }
}
