//! Protocol detection for inbound request bodies.
//!
//! The endpoint serves both protocols from one address, so each request is
//! classified before decoding. The declared content type wins when it names
//! a protocol; otherwise the body is inspected as JSON first and XML second.
//! Protocols disabled by configuration are never returned.

use rpcmux_config::Config;

use crate::codec::Protocol;
use crate::codec::xml::is_method_call;

/// Media types that select JSON-RPC.
pub const JSON_MEDIA_TYPES: &[&str] = &[
    "application/json",
    "application/json-rpc",
    "application/jsonrequest",
];

/// Media types that select XML-RPC.
pub const XML_MEDIA_TYPES: &[&str] = &["text/xml", "application/xml"];

/// Classifies requests as XML-RPC, JSON-RPC or unrecognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolSniffer {
    json_enabled: bool,
    xml_enabled: bool,
}

impl Default for ProtocolSniffer {
    fn default() -> Self {
        Self::new(true, true)
    }
}

impl ProtocolSniffer {
    /// Creates a sniffer with explicit protocol switches.
    #[must_use]
    pub const fn new(json_enabled: bool, xml_enabled: bool) -> Self {
        Self {
            json_enabled,
            xml_enabled,
        }
    }

    /// Creates a sniffer honouring the configured protocol switches.
    #[must_use]
    pub const fn from_config(config: &Config) -> Self {
        Self::new(!config.disable_json, !config.disable_xml)
    }

    /// Returns `true` when the protocol may be served.
    #[must_use]
    pub const fn is_enabled(&self, protocol: Protocol) -> bool {
        match protocol {
            Protocol::Json => self.json_enabled,
            Protocol::Xml => self.xml_enabled,
        }
    }

    /// Picks the protocol for a request, or `None` when unrecognised.
    #[must_use]
    pub fn sniff(&self, content_type: Option<&str>, body: &[u8]) -> Option<Protocol> {
        if let Some(declared) = content_type.and_then(declared_protocol) {
            return self.is_enabled(declared).then_some(declared);
        }
        if self.json_enabled && looks_like_json_call(body) {
            return Some(Protocol::Json);
        }
        if self.xml_enabled && is_method_call(body) {
            return Some(Protocol::Xml);
        }
        None
    }
}

/// Maps a content-type header value to a protocol, ignoring parameters.
fn declared_protocol(content_type: &str) -> Option<Protocol> {
    let media_type = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if JSON_MEDIA_TYPES.contains(&media_type.as_str()) {
        Some(Protocol::Json)
    } else if XML_MEDIA_TYPES.contains(&media_type.as_str()) {
        Some(Protocol::Xml)
    } else {
        None
    }
}

fn looks_like_json_call(body: &[u8]) -> bool {
    let Ok(document) = serde_json::from_slice::<serde_json::Value>(body) else {
        return false;
    };
    let is_call = |candidate: &serde_json::Value| {
        candidate
            .as_object()
            .is_some_and(|members| members.contains_key("method"))
    };
    match &document {
        serde_json::Value::Array(members) => members.iter().any(is_call),
        other => is_call(other),
    }
}
