//! Wire codecs and the protocol-neutral call representation.
//!
//! Each codec turns request bytes into [`Decoded`] calls and turns a
//! [`Response`] back into bytes. The dispatcher never looks at wire formats;
//! it only routes [`NormalizedCall`] values and produces [`Reply`] values.

pub mod json;
pub mod xml;

use std::fmt;

use thiserror::Error;

use crate::fault::Fault;
use crate::value::{Struct, Value};

pub use self::json::JsonCodec;
pub use self::xml::XmlCodec;

/// Outcome of one call: a value or a fault.
pub type CallResult = Result<Value, Fault>;

/// The two supported wire protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// XML-RPC.
    Xml,
    /// JSON-RPC 1.0 and 2.0.
    Json,
}

impl Protocol {
    /// Canonical lowercase name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Xml => "xml-rpc",
            Self::Json => "json-rpc",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON-RPC envelope generation a call arrived in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JsonRpcVersion {
    /// Version 1.0: no `jsonrpc` member; responses carry both `result` and
    /// `error`.
    V1,
    /// Version 2.0: `"jsonrpc": "2.0"`; responses carry exactly one of
    /// `result` or `error`.
    #[default]
    V2,
}

/// Identifier echoed back in the response to a JSON-RPC call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallId {
    value: serde_json::Value,
    version: JsonRpcVersion,
}

impl CallId {
    /// Creates an identifier.
    #[must_use]
    pub const fn new(value: serde_json::Value, version: JsonRpcVersion) -> Self {
        Self { value, version }
    }

    /// Raw JSON identifier.
    #[must_use]
    pub const fn value(&self) -> &serde_json::Value {
        &self.value
    }

    /// Envelope version of the originating call.
    #[must_use]
    pub const fn version(&self) -> JsonRpcVersion {
        self.version
    }
}

/// Arguments as they arrived on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Params {
    /// Ordered arguments.
    Positional(Vec<Value>),
    /// Arguments keyed by parameter name (JSON-RPC only).
    Named(Struct),
}

impl Default for Params {
    fn default() -> Self {
        Self::Positional(Vec::new())
    }
}

impl Params {
    /// Number of supplied arguments.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Positional(values) => values.len(),
            Self::Named(members) => members.len(),
        }
    }

    /// Returns `true` when no arguments were supplied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<Value>> for Params {
    fn from(values: Vec<Value>) -> Self {
        Self::Positional(values)
    }
}

/// A decoded call, independent of wire format.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedCall {
    /// Requested procedure name.
    pub method: String,
    /// Decoded arguments.
    pub params: Params,
    /// Identifier to echo back; always `None` for XML-RPC.
    pub id: Option<CallId>,
    /// The caller expects no response entry for this call.
    pub notification: bool,
}

impl NormalizedCall {
    /// Creates a call with positional arguments and no id.
    #[must_use]
    pub fn new(method: impl Into<String>, params: impl Into<Params>) -> Self {
        Self {
            method: method.into(),
            params: params.into(),
            id: None,
            notification: false,
        }
    }

    /// Sets the identifier to echo back.
    #[must_use]
    pub fn with_id(mut self, id: CallId) -> Self {
        self.id = Some(id);
        self
    }
}

/// A batch member that could not be turned into a call.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedCall {
    /// Identifier recovered from the member, if any.
    pub id: Option<CallId>,
    /// Fault to report in its place.
    pub fault: Fault,
}

/// One slot of a decoded request.
pub type CallSlot = Result<NormalizedCall, RejectedCall>;

/// Calls decoded from one request body.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A single call object or `methodCall` document.
    Single(CallSlot),
    /// A JSON-RPC batch, in input order.
    Batch(Vec<CallSlot>),
}

/// Outcome paired with the identifier it answers.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    /// Identifier of the originating call.
    pub id: Option<CallId>,
    /// Value or fault.
    pub outcome: CallResult,
}

impl Reply {
    /// Creates a reply.
    #[must_use]
    pub const fn new(id: Option<CallId>, outcome: CallResult) -> Self {
        Self { id, outcome }
    }
}

/// Replies to encode for one request.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Answer to a single call.
    Single(Reply),
    /// Answers to a batch; notifications already removed.
    Batch(Vec<Reply>),
    /// Nothing to send (every call was a notification).
    Empty,
}

/// Request bodies a codec cannot turn into calls.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The body is not well-formed for the protocol.
    #[error("malformed request: {message}")]
    Malformed {
        /// Parser diagnostic.
        message: String,
    },

    /// The body is well-formed but is not a call envelope.
    #[error("invalid request: {message}")]
    InvalidRequest {
        /// Description of the structural problem.
        message: String,
    },
}

impl DecodeError {
    /// Creates a malformed-body error.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Creates an invalid-envelope error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Fault reported for this error.
    #[must_use]
    pub fn to_fault(&self) -> Fault {
        match self {
            Self::Malformed { message } => Fault::parse_error(message.clone()),
            Self::InvalidRequest { message } => Fault::invalid_request(message.clone()),
        }
    }
}

/// Replies a codec cannot represent on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// NaN and infinities have no representation in either protocol.
    #[error("cannot encode non-finite double")]
    NonFiniteDouble,

    /// The protocol has no batch envelope.
    #[error("{protocol} has no batch response envelope")]
    BatchUnsupported {
        /// Protocol asked to encode a batch.
        protocol: Protocol,
    },
}

/// Wire format for one protocol.
pub trait Codec: Send + Sync {
    /// Protocol implemented by this codec.
    fn protocol(&self) -> Protocol;

    /// Media type of encoded responses.
    fn content_type(&self) -> &'static str;

    /// Decodes a request body.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] when the body as a whole cannot be decoded.
    fn decode(&self, body: &[u8]) -> Result<Decoded, DecodeError>;

    /// Encodes replies.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError`] when a value has no wire representation.
    fn encode(&self, response: &Response) -> Result<Vec<u8>, EncodeError>;

    /// Encodes a fault; faults are always representable.
    fn encode_fault(&self, fault: &Fault, id: Option<&CallId>) -> Vec<u8>;

    /// Encodes a single successful result.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError`] when the value has no wire representation.
    fn encode_result(&self, value: &Value, id: Option<&CallId>) -> Result<Vec<u8>, EncodeError> {
        self.encode(&Response::Single(Reply::new(id.cloned(), Ok(value.clone()))))
    }
}
