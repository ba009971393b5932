//! Native debugger values → observer (DevTools-shaped) values.
//!
//! All inputs are raw `serde_json::Value` bodies from the native protocol.
//! Objects referenced by handle are looked up in the `refs` array that
//! accompanies the response.

use crate::domain::TranslateError;
use log::warn;
use serde_json::{json, Map, Value};
use std::collections::HashMap;

const SCOPE_TYPES: [&str; 5] = ["global", "local", "with", "closure", "catch"];

/// Object descriptions that double as a DevTools subtype
const SUBTYPES: [&str; 5] = ["array", "date", "node", "null", "regexp"];

fn field<'a>(value: &'a Value, name: &'static str) -> Result<&'a Value, TranslateError> {
    value.get(name).ok_or(TranslateError::MissingField(name))
}

fn handle_str(value: &Value) -> Result<String, TranslateError> {
    Ok(id_string(field(value, "handle")?))
}

/// Numeric ids go out as strings
fn id_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `#<Foo>` → `Foo`
fn strip_angle_brackets(text: &str) -> &str {
    text.strip_prefix("#<")
        .and_then(|rest| rest.strip_suffix('>'))
        .unwrap_or(text)
}

pub fn remote_object(object: &Value) -> Result<Value, TranslateError> {
    let kind = field(object, "type")?
        .as_str()
        .ok_or(TranslateError::MissingField("type"))?;

    let translated = match kind {
        "undefined" => json!({"description": kind, "type": kind}),
        "null" => json!({
            "description": kind,
            "type": "object",
            "subtype": kind,
            "value": null,
        }),
        "boolean" | "number" | "string" => {
            let value = field(object, "value")?;
            let description = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            json!({"description": description, "type": kind, "value": value})
        }
        "object" | "error" => {
            let text = object.get("text").and_then(Value::as_str).unwrap_or_default();
            let description = strip_angle_brackets(text);
            let lowered = description.to_lowercase();
            let is_subtype = SUBTYPES.contains(&lowered.as_str());
            let subtype = is_subtype.then_some(lowered);
            json!({
                "className": object.get("className").cloned().unwrap_or(Value::Null),
                "description": description,
                "objectId": handle_str(object)?,
                "subtype": subtype,
                "type": kind,
            })
        }
        "function" => json!({
            "className": object.get("className").cloned().unwrap_or(Value::Null),
            "description": object.get("text").cloned().unwrap_or(Value::Null),
            "objectId": handle_str(object)?,
            "type": kind,
        }),
        other => return Err(TranslateError::UnsupportedType(other.to_string())),
    };
    Ok(translated)
}

/// `scripts` response body → `Debugger.scriptParsed` params. Unnamed
/// scripts are dropped.
#[must_use]
pub fn scripts(body: &Value) -> Vec<Value> {
    body.as_array()
        .map(|list| {
            list.iter()
                .filter_map(|script| {
                    let name = script.get("name").and_then(Value::as_str)?;
                    if name.is_empty() {
                        return None;
                    }
                    Some(json!({
                        "scriptId": id_string(script.get("id")?),
                        "url": name,
                        "isContentScript": false,
                    }))
                })
                .collect()
        })
        .unwrap_or_default()
}

struct Refs<'a>(HashMap<u64, &'a Value>);

impl<'a> Refs<'a> {
    fn new(refs: &'a [Value]) -> Self {
        Self(
            refs.iter()
                .filter_map(|r| Some((r.get("handle")?.as_u64()?, r)))
                .collect(),
        )
    }

    fn resolve(&self, reference: &Value) -> Result<&'a Value, TranslateError> {
        let handle = reference
            .get("ref")
            .and_then(Value::as_u64)
            .ok_or(TranslateError::MissingField("ref"))?;
        self.0
            .get(&handle)
            .copied()
            .ok_or(TranslateError::MissingRef(handle))
    }
}

/// Scopes of one frame together with the refs of their `scopes` response
#[derive(Debug, Clone, Default)]
pub struct FrameScopes {
    pub scopes: Vec<Value>,
    pub refs: Vec<Value>,
}

pub fn scope_chain(frame_scopes: &FrameScopes) -> Result<Vec<Value>, TranslateError> {
    let refs = Refs::new(&frame_scopes.refs);
    frame_scopes
        .scopes
        .iter()
        .map(|scope| {
            let kind = field(scope, "type")?
                .as_u64()
                .and_then(|i| SCOPE_TYPES.get(usize::try_from(i).ok()?))
                .copied();
            let object = refs.resolve(field(scope, "object")?)?;
            Ok(json!({"type": kind, "object": remote_object(object)?}))
        })
        .collect()
}

pub fn frame(frame: &Value, scopes: &FrameScopes) -> Result<Value, TranslateError> {
    let func = field(frame, "func")?;
    let name = func
        .get("name")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .or_else(|| func.get("inferredName").and_then(Value::as_str))
        .unwrap_or_default();

    Ok(json!({
        "callFrameId": id_string(field(frame, "index")?),
        "functionName": name,
        "location": {
            "scriptId": id_string(field(func, "scriptId")?),
            "lineNumber": frame.get("line").cloned().unwrap_or(Value::Null),
            "columnNumber": frame.get("column").cloned().unwrap_or(Value::Null),
        },
        "scopeChain": scope_chain(scopes)?,
    }))
}

/// Frames that fail to translate are logged and skipped
#[must_use]
pub fn frames(frames: &[Value], scopes: &[FrameScopes]) -> Vec<Value> {
    let empty = FrameScopes::default();
    frames
        .iter()
        .enumerate()
        .filter_map(|(i, raw)| {
            match frame(raw, scopes.get(i).unwrap_or(&empty)) {
                Ok(translated) => Some(translated),
                Err(e) => {
                    warn!("Skipping untranslatable frame {i}: {e}");
                    None
                }
            }
        })
        .collect()
}

/// Own properties plus the prototype as `__proto__`
pub fn properties(object: &Value, refs: &[Value]) -> Result<Vec<Value>, TranslateError> {
    let refs = Refs::new(refs);
    let mut listed: Vec<Value> = object
        .get("properties")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    if let Some(proto) = object.get("protoObject").and_then(Value::as_object) {
        let mut proto: Map<String, Value> = proto.clone();
        proto.insert("name".to_string(), json!("__proto__"));
        listed.push(Value::Object(proto));
    }

    listed
        .iter()
        .map(|prop| {
            Ok(json!({
                "name": prop.get("name").cloned().unwrap_or(Value::Null),
                "value": remote_object(refs.resolve(prop)?)?,
            }))
        })
        .collect()
}

pub fn function_details(object: &Value) -> Result<Value, TranslateError> {
    let name = object.get("name").cloned().unwrap_or(Value::Null);
    Ok(json!({
        "location": {
            "scriptId": id_string(field(object, "scriptId")?),
            "lineNumber": object.get("line").cloned().unwrap_or(Value::Null),
            "columnNumber": object.get("column").cloned().unwrap_or(Value::Null),
        },
        "name": name,
        "displayName": name,
        "inferredName": object.get("inferredName").cloned().unwrap_or(Value::Null),
    }))
}
