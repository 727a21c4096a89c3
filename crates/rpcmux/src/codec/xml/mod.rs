//! XML-RPC codec.
//!
//! Requests are `methodCall` documents carrying one call with positional
//! arguments. Responses follow the layout of the reference Python
//! implementation (`xmlrpc.client`): one `param` for results, a `fault`
//! struct with `faultCode` and `faultString` for failures.

mod tree;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use quick_xml::escape::escape;

use self::tree::{Element, parse_document};
use super::{
    CallId, CallResult, Codec, Decoded, DecodeError, EncodeError, NormalizedCall, Params,
    Protocol, Response,
};
use crate::fault::Fault;
use crate::value::{Struct, Value, date_time};

/// Media type of XML-RPC responses.
pub const XML_CONTENT_TYPE: &str = "text/xml";

const XML_DECLARATION: &str = "<?xml version=\"1.0\"?>\n";

/// Codec for XML-RPC.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlCodec;

impl XmlCodec {
    /// Creates the codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Encodes a `methodCall` document, as a client would send it.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError`] when an argument has no XML-RPC form.
    pub fn encode_call(&self, method: &str, params: &[Value]) -> Result<Vec<u8>, EncodeError> {
        let mut out = String::from(XML_DECLARATION);
        out.push_str("<methodCall>\n<methodName>");
        out.push_str(&escape(method));
        out.push_str("</methodName>\n<params>\n");
        for param in params {
            out.push_str("<param>\n");
            write_value(&mut out, param)?;
            out.push_str("</param>\n");
        }
        out.push_str("</params>\n</methodCall>\n");
        Ok(out.into_bytes())
    }

    /// Decodes a `methodResponse` document into its result or fault.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] when the body is not a response document.
    pub fn decode_response(&self, body: &[u8]) -> Result<CallResult, DecodeError> {
        let root = parse_document(body)?;
        if root.name() != "methodResponse" {
            return Err(DecodeError::invalid_request(format!(
                "expected <methodResponse>, found <{}>",
                root.name()
            )));
        }
        if let Some(fault) = root.child("fault") {
            return decode_fault(fault).map(Err);
        }
        let value = root
            .child("params")
            .and_then(|params| params.child("param"))
            .and_then(|param| param.child("value"))
            .ok_or_else(|| DecodeError::invalid_request("response carries no value"))?;
        decode_value(value).map(Ok)
    }
}

/// Returns `true` for a well-formed document whose root is `methodCall`.
pub(crate) fn is_method_call(body: &[u8]) -> bool {
    parse_document(body).is_ok_and(|root| root.name() == "methodCall")
}

impl Codec for XmlCodec {
    fn protocol(&self) -> Protocol {
        Protocol::Xml
    }

    fn content_type(&self) -> &'static str {
        XML_CONTENT_TYPE
    }

    fn decode(&self, body: &[u8]) -> Result<Decoded, DecodeError> {
        let root = parse_document(body)?;
        decode_call(&root).map(|call| Decoded::Single(Ok(call)))
    }

    fn encode(&self, response: &Response) -> Result<Vec<u8>, EncodeError> {
        match response {
            Response::Single(reply) => match &reply.outcome {
                Ok(value) => encode_params(value),
                Err(fault) => Ok(fault_document(fault)),
            },
            Response::Batch(_) => Err(EncodeError::BatchUnsupported {
                protocol: Protocol::Xml,
            }),
            Response::Empty => Ok(Vec::new()),
        }
    }

    fn encode_fault(&self, fault: &Fault, _id: Option<&CallId>) -> Vec<u8> {
        fault_document(fault)
    }
}

fn decode_call(root: &Element) -> Result<NormalizedCall, DecodeError> {
    if root.name() != "methodCall" {
        return Err(DecodeError::invalid_request(format!(
            "expected <methodCall>, found <{}>",
            root.name()
        )));
    }
    let method = root
        .child("methodName")
        .map(|name| name.text().trim().to_owned())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| DecodeError::invalid_request("missing <methodName>"))?;

    let mut params = Vec::new();
    if let Some(list) = root.child("params") {
        for param in list.elements() {
            if param.name() != "param" {
                return Err(unexpected(param, "<param>"));
            }
            let value = param
                .child("value")
                .ok_or_else(|| DecodeError::invalid_request("<param> without <value>"))?;
            params.push(decode_value(value)?);
        }
    }
    Ok(NormalizedCall::new(method, Params::Positional(params)))
}

fn decode_fault(fault: &Element) -> Result<Fault, DecodeError> {
    let value = fault
        .child("value")
        .ok_or_else(|| DecodeError::invalid_request("<fault> without <value>"))?;
    let Value::Struct(members) = decode_value(value)? else {
        return Err(DecodeError::invalid_request("fault value is not a struct"));
    };
    let code = members
        .get("faultCode")
        .and_then(Value::as_i64)
        .and_then(|code| i32::try_from(code).ok())
        .ok_or_else(|| DecodeError::invalid_request("fault without integer faultCode"))?;
    let message = members
        .get("faultString")
        .and_then(Value::as_str)
        .unwrap_or_default();
    Ok(Fault::new(code, message))
}

fn decode_value(value: &Element) -> Result<Value, DecodeError> {
    let mut typed = value.elements();
    match (typed.next(), typed.next()) {
        (None, _) => Ok(Value::String(value.text())),
        (Some(inner), None) => decode_typed(inner),
        (Some(_), Some(_)) => Err(DecodeError::invalid_request(
            "<value> holds more than one typed element",
        )),
    }
}

fn decode_typed(element: &Element) -> Result<Value, DecodeError> {
    match element.name() {
        "i4" | "int" | "i8" => element
            .text()
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|error| invalid_scalar(element, &error)),
        "boolean" => match element.text().trim() {
            "0" => Ok(Value::Boolean(false)),
            "1" => Ok(Value::Boolean(true)),
            other => Err(DecodeError::invalid_request(format!(
                "boolean must be 0 or 1, found {other:?}"
            ))),
        },
        "double" => element
            .text()
            .trim()
            .parse::<f64>()
            .map(Value::Double)
            .map_err(|error| invalid_scalar(element, &error)),
        "string" => Ok(Value::String(element.text())),
        "dateTime.iso8601" => date_time::parse(element.text().trim())
            .map(Value::DateTime)
            .map_err(|error| invalid_scalar(element, &error)),
        "base64" => {
            let compact: String = element
                .text()
                .chars()
                .filter(|c| !c.is_ascii_whitespace())
                .collect();
            STANDARD
                .decode(compact)
                .map(Value::Base64)
                .map_err(|error| invalid_scalar(element, &error))
        }
        "nil" => Ok(Value::Nil),
        "array" => decode_array(element),
        "struct" => decode_struct(element),
        other => Err(DecodeError::invalid_request(format!(
            "unsupported value type <{other}>"
        ))),
    }
}

fn decode_array(array: &Element) -> Result<Value, DecodeError> {
    let data = array
        .child("data")
        .ok_or_else(|| DecodeError::invalid_request("<array> without <data>"))?;
    data.elements()
        .map(|item| {
            if item.name() == "value" {
                decode_value(item)
            } else {
                Err(unexpected(item, "<value>"))
            }
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}

fn decode_struct(record: &Element) -> Result<Value, DecodeError> {
    let mut members = Struct::new();
    for member in record.elements() {
        if member.name() != "member" {
            return Err(unexpected(member, "<member>"));
        }
        let name = member
            .child("name")
            .ok_or_else(|| DecodeError::invalid_request("<member> without <name>"))?
            .text();
        let value = member
            .child("value")
            .ok_or_else(|| DecodeError::invalid_request("<member> without <value>"))?;
        members.insert(name, decode_value(value)?);
    }
    Ok(Value::Struct(members))
}

fn invalid_scalar(element: &Element, error: &dyn std::fmt::Display) -> DecodeError {
    DecodeError::invalid_request(format!("invalid <{}> value: {error}", element.name()))
}

fn unexpected(element: &Element, expected: &str) -> DecodeError {
    DecodeError::invalid_request(format!(
        "expected {expected}, found <{}>",
        element.name()
    ))
}

fn encode_params(value: &Value) -> Result<Vec<u8>, EncodeError> {
    let mut out = String::from(XML_DECLARATION);
    out.push_str("<methodResponse>\n<params>\n<param>\n");
    write_value(&mut out, value)?;
    out.push_str("</param>\n</params>\n</methodResponse>\n");
    Ok(out.into_bytes())
}

fn fault_document(fault: &Fault) -> Vec<u8> {
    let mut out = String::from(XML_DECLARATION);
    out.push_str("<methodResponse>\n<fault>\n<value><struct>\n");
    out.push_str("<member>\n<name>faultCode</name>\n<value><int>");
    out.push_str(&fault.code().to_string());
    out.push_str("</int></value>\n</member>\n");
    out.push_str("<member>\n<name>faultString</name>\n<value><string>");
    out.push_str(&escape(fault.message()));
    out.push_str("</string></value>\n</member>\n");
    out.push_str("</struct></value>\n</fault>\n</methodResponse>\n");
    out.into_bytes()
}

fn write_value(out: &mut String, value: &Value) -> Result<(), EncodeError> {
    match value {
        Value::Int(number) => {
            let tag = if i32::try_from(*number).is_ok() { "int" } else { "i8" };
            write_scalar(out, tag, &number.to_string());
        }
        Value::Boolean(flag) => write_scalar(out, "boolean", if *flag { "1" } else { "0" }),
        Value::Double(number) => {
            if !number.is_finite() {
                return Err(EncodeError::NonFiniteDouble);
            }
            write_scalar(out, "double", &number.to_string());
        }
        Value::String(text) => write_scalar(out, "string", &escape(text.as_str())),
        Value::DateTime(moment) => {
            write_scalar(out, "dateTime.iso8601", &date_time::format_compact(*moment));
        }
        Value::Base64(bytes) => write_scalar(out, "base64", &STANDARD.encode(bytes)),
        Value::Array(items) => {
            out.push_str("<value><array><data>\n");
            for item in items {
                write_value(out, item)?;
            }
            out.push_str("</data></array></value>\n");
        }
        Value::Struct(members) => {
            out.push_str("<value><struct>\n");
            for (name, member) in members {
                out.push_str("<member>\n<name>");
                out.push_str(&escape(name.as_str()));
                out.push_str("</name>\n");
                write_value(out, member)?;
                out.push_str("</member>\n");
            }
            out.push_str("</struct></value>\n");
        }
        Value::Nil => out.push_str("<value><nil/></value>\n"),
    }
    Ok(())
}

fn write_scalar(out: &mut String, tag: &str, text: &str) {
    out.push_str("<value><");
    out.push_str(tag);
    out.push('>');
    out.push_str(text);
    out.push_str("</");
    out.push_str(tag);
    out.push_str("></value>\n");
}
