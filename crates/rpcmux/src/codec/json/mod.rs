//! JSON-RPC 1.0 and 2.0 codec.
//!
//! A request body is either one call object or a batch array of them. The
//! envelope generation is chosen per call: objects carrying
//! `"jsonrpc": "2.0"` are answered in 2.0 form, everything else in 1.0 form.
//! JSON has no date or binary kinds, so those travel as class-hinted objects
//! (`{"__jsonclass__": ["dateTime.iso8601", "..."]}` and
//! `{"__jsonclass__": ["base64", "..."]}`).
//!
//! Batch members without an id (or, in 1.0 form, with a null id) are
//! notifications and receive no reply entry. A lone call is always answered,
//! with a null id when it carried none.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Map, Number, json};

use super::{
    CallId, CallSlot, Codec, Decoded, DecodeError, EncodeError, JsonRpcVersion,
    NormalizedCall, Params, Protocol, RejectedCall, Reply, Response,
};
use crate::fault::Fault;
use crate::value::{Struct, Value, date_time};

/// Media type of JSON-RPC responses.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Member naming the class of a hinted object.
pub const CLASS_HINT: &str = "__jsonclass__";

const DATE_TIME_CLASS: &str = "dateTime.iso8601";
const BASE64_CLASS: &str = "base64";

/// Codec for JSON-RPC.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    /// Creates the codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Encodes a JSON-RPC 2.0 request object, as a client would send it.
    ///
    /// Passing `None` for `id` produces a notification.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError`] when an argument has no JSON form.
    pub fn encode_call(
        &self,
        method: &str,
        params: &[Value],
        id: Option<serde_json::Value>,
    ) -> Result<Vec<u8>, EncodeError> {
        let arguments = params
            .iter()
            .map(to_json)
            .collect::<Result<Vec<_>, _>>()?;
        let mut call = Map::new();
        call.insert(String::from("jsonrpc"), json!("2.0"));
        call.insert(String::from("method"), json!(method));
        call.insert(String::from("params"), serde_json::Value::Array(arguments));
        if let Some(id) = id {
            call.insert(String::from("id"), id);
        }
        Ok(serde_json::Value::Object(call).to_string().into_bytes())
    }
}

impl Codec for JsonCodec {
    fn protocol(&self) -> Protocol {
        Protocol::Json
    }

    fn content_type(&self) -> &'static str {
        JSON_CONTENT_TYPE
    }

    fn decode(&self, body: &[u8]) -> Result<Decoded, DecodeError> {
        let document: serde_json::Value = serde_json::from_slice(body)
            .map_err(|error| DecodeError::malformed(error.to_string()))?;
        match document {
            serde_json::Value::Object(call) => Ok(Decoded::Single(decode_call(&call, false))),
            serde_json::Value::Array(members) if members.is_empty() => {
                Err(DecodeError::invalid_request("empty batch"))
            }
            serde_json::Value::Array(members) => Ok(Decoded::Batch(
                members.iter().map(decode_batch_member).collect(),
            )),
            _ => Err(DecodeError::invalid_request(
                "expected a call object or a batch array",
            )),
        }
    }

    fn encode(&self, response: &Response) -> Result<Vec<u8>, EncodeError> {
        let document = match response {
            Response::Single(reply) => envelope(reply)?,
            Response::Batch(replies) if replies.is_empty() => return Ok(Vec::new()),
            Response::Batch(replies) => serde_json::Value::Array(
                replies.iter().map(envelope).collect::<Result<Vec<_>, _>>()?,
            ),
            Response::Empty => return Ok(Vec::new()),
        };
        Ok(document.to_string().into_bytes())
    }

    fn encode_fault(&self, fault: &Fault, id: Option<&CallId>) -> Vec<u8> {
        fault_envelope(fault, id).to_string().into_bytes()
    }
}

fn decode_batch_member(member: &serde_json::Value) -> CallSlot {
    match member {
        serde_json::Value::Object(call) => decode_call(call, true),
        _ => Err(RejectedCall {
            id: None,
            fault: Fault::invalid_request("batch member is not an object"),
        }),
    }
}

fn decode_call(call: &Map<String, serde_json::Value>, in_batch: bool) -> CallSlot {
    let version = match call.get("jsonrpc") {
        None => JsonRpcVersion::V1,
        Some(serde_json::Value::String(tag)) if tag == "2.0" => JsonRpcVersion::V2,
        Some(other) => {
            return Err(RejectedCall {
                id: None,
                fault: Fault::invalid_request(format!("unsupported jsonrpc version {other}")),
            });
        }
    };

    let raw_id = call.get("id");
    let reply_id = CallId::new(
        raw_id.cloned().unwrap_or(serde_json::Value::Null),
        version,
    );
    let reject = |fault: Fault| RejectedCall {
        id: Some(reply_id.clone()),
        fault,
    };

    if raw_id.is_some_and(|id| !(id.is_string() || id.is_number() || id.is_null())) {
        return Err(RejectedCall {
            id: Some(CallId::new(serde_json::Value::Null, version)),
            fault: Fault::invalid_request("id must be a string, number or null"),
        });
    }

    let method = match call.get("method") {
        Some(serde_json::Value::String(method)) if !method.trim().is_empty() => method.clone(),
        _ => return Err(reject(Fault::invalid_request("method must be a non-empty string"))),
    };

    let params = match call.get("params") {
        None | Some(serde_json::Value::Null) => Params::default(),
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .map(from_json)
            .collect::<Result<Vec<_>, _>>()
            .map(Params::Positional)
            .map_err(|message| reject(Fault::invalid_params(message)))?,
        Some(serde_json::Value::Object(members)) => decode_members(members)
            .map(Params::Named)
            .map_err(|message| reject(Fault::invalid_params(message)))?,
        Some(_) => {
            return Err(reject(Fault::invalid_request(
                "params must be an array or an object",
            )));
        }
    };

    // A lone call is always answered; only batch members can be notifications.
    let notification = in_batch
        && match version {
            JsonRpcVersion::V1 => raw_id.is_none_or(serde_json::Value::is_null),
            JsonRpcVersion::V2 => raw_id.is_none(),
        };
    Ok(NormalizedCall {
        method,
        params,
        id: (!notification).then_some(reply_id),
        notification,
    })
}

fn decode_members(members: &Map<String, serde_json::Value>) -> Result<Struct, String> {
    members
        .iter()
        .map(|(name, member)| from_json(member).map(|value| (name.clone(), value)))
        .collect()
}

/// Converts a JSON value into the shared vocabulary.
pub(crate) fn from_json(value: &serde_json::Value) -> Result<Value, String> {
    match value {
        serde_json::Value::Null => Ok(Value::Nil),
        serde_json::Value::Bool(flag) => Ok(Value::Boolean(*flag)),
        serde_json::Value::Number(number) => Ok(number.as_i64().map_or_else(
            || Value::Double(number.as_f64().unwrap_or(f64::NAN)),
            Value::Int,
        )),
        serde_json::Value::String(text) => Ok(Value::String(text.clone())),
        serde_json::Value::Array(items) => items
            .iter()
            .map(from_json)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        serde_json::Value::Object(members) => match class_hint(members) {
            Some((DATE_TIME_CLASS, payload)) => date_time::parse(payload)
                .map(Value::DateTime)
                .map_err(|error| format!("invalid {DATE_TIME_CLASS} {payload:?}: {error}")),
            Some((BASE64_CLASS, payload)) => STANDARD
                .decode(payload)
                .map(Value::Base64)
                .map_err(|error| format!("invalid {BASE64_CLASS} payload: {error}")),
            _ => decode_members(members).map(Value::Struct),
        },
    }
}

/// Returns `(class, payload)` for objects of the exact hinted shape.
fn class_hint(members: &Map<String, serde_json::Value>) -> Option<(&str, &str)> {
    if members.len() != 1 {
        return None;
    }
    let serde_json::Value::Array(hint) = members.get(CLASS_HINT)? else {
        return None;
    };
    match hint.as_slice() {
        [serde_json::Value::String(class), serde_json::Value::String(payload)] => {
            Some((class.as_str(), payload.as_str()))
        }
        _ => None,
    }
}

/// Converts a value into JSON, applying the class-hint convention.
fn to_json(value: &Value) -> Result<serde_json::Value, EncodeError> {
    let converted = match value {
        Value::Int(number) => json!(number),
        Value::Boolean(flag) => json!(flag),
        Value::Double(number) => Number::from_f64(*number)
            .map(serde_json::Value::Number)
            .ok_or(EncodeError::NonFiniteDouble)?,
        Value::String(text) => json!(text),
        Value::DateTime(moment) => {
            json!({ CLASS_HINT: [DATE_TIME_CLASS, date_time::format_extended(*moment)] })
        }
        Value::Base64(bytes) => json!({ CLASS_HINT: [BASE64_CLASS, STANDARD.encode(bytes)] }),
        Value::Array(items) => serde_json::Value::Array(
            items.iter().map(to_json).collect::<Result<Vec<_>, _>>()?,
        ),
        Value::Struct(members) => serde_json::Value::Object(
            members
                .iter()
                .map(|(name, member)| to_json(member).map(|converted| (name.clone(), converted)))
                .collect::<Result<Map<_, _>, _>>()?,
        ),
        Value::Nil => serde_json::Value::Null,
    };
    Ok(converted)
}

fn id_and_version(id: Option<&CallId>) -> (serde_json::Value, JsonRpcVersion) {
    id.map_or((serde_json::Value::Null, JsonRpcVersion::V2), |call_id| {
        (call_id.value().clone(), call_id.version())
    })
}

fn envelope(reply: &Reply) -> Result<serde_json::Value, EncodeError> {
    let result = match &reply.outcome {
        Ok(value) => to_json(value)?,
        Err(fault) => return Ok(fault_envelope(fault, reply.id.as_ref())),
    };
    let (id, version) = id_and_version(reply.id.as_ref());
    Ok(match version {
        JsonRpcVersion::V2 => json!({ "jsonrpc": "2.0", "result": result, "id": id }),
        JsonRpcVersion::V1 => json!({ "result": result, "error": null, "id": id }),
    })
}

fn fault_envelope(fault: &Fault, id: Option<&CallId>) -> serde_json::Value {
    let (id, version) = id_and_version(id);
    match version {
        JsonRpcVersion::V2 => json!({
            "jsonrpc": "2.0",
            "error": { "code": fault.code(), "message": fault.message() },
            "id": id,
        }),
        JsonRpcVersion::V1 => json!({
            "result": null,
            "error": {
                "name": "JSONRPCError",
                "code": fault.code(),
                "message": fault.message(),
            },
            "id": id,
        }),
    }
}
