//! Protocol faults and the errors procedures may raise.
//!
//! A [`Fault`] is what reaches the wire: a numeric code plus a message. The
//! reserved codes follow the xmlrpc-epi interoperability table, which JSON-RPC
//! 2.0 adopted for its own reserved range, so one set of constants serves both
//! codecs.

use std::fmt;

use thiserror::Error;

/// Reserved fault codes.
pub mod codes {
    /// The request body could not be parsed.
    pub const PARSE_ERROR: i32 = -32700;
    /// The request parsed but is not a valid call envelope.
    pub const INVALID_REQUEST: i32 = -32600;
    /// No procedure is registered under the requested name.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Arguments do not match any declared signature.
    pub const INVALID_PARAMS: i32 = -32602;
    /// The dispatcher failed while producing a response.
    pub const INTERNAL_ERROR: i32 = -32603;
    /// The invoked procedure failed.
    pub const APPLICATION_ERROR: i32 = -32500;
    /// The caller lacks the permission the procedure requires.
    pub const NOT_AUTHORIZED: i32 = 403;
}

/// Failure outcome of a call, carried inside a protocol envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    code: i32,
    message: String,
}

impl Fault {
    /// Creates a fault with an arbitrary code.
    #[must_use]
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Numeric fault code.
    #[must_use]
    pub const fn code(&self) -> i32 {
        self.code
    }

    /// Human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        self.message.as_str()
    }

    /// Malformed request body.
    #[must_use]
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(codes::PARSE_ERROR, message)
    }

    /// Well-formed body that is not a call envelope.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(codes::INVALID_REQUEST, message)
    }

    /// Unknown procedure name.
    #[must_use]
    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            codes::METHOD_NOT_FOUND,
            format!("method '{method}' is not registered, see system.listMethods"),
        )
    }

    /// Arity or argument shape mismatch.
    #[must_use]
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(codes::INVALID_PARAMS, message)
    }

    /// Dispatcher-side failure.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(codes::INTERNAL_ERROR, message)
    }

    /// Procedure-side failure.
    #[must_use]
    pub fn application(message: impl Into<String>) -> Self {
        Self::new(codes::APPLICATION_ERROR, message)
    }

    /// Missing identity or insufficient permission.
    #[must_use]
    pub fn not_authorized(method: &str) -> Self {
        Self::new(
            codes::NOT_AUTHORIZED,
            format!("not authorized to call '{method}'"),
        )
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fault {}: {}", self.code, self.message)
    }
}

/// Errors a procedure body may return.
#[derive(Debug, Error)]
pub enum ProcedureError {
    /// Explicit fault chosen by the procedure, passed through unchanged.
    #[error("{0}")]
    Fault(Fault),

    /// The procedure rejected its arguments.
    #[error("invalid params: {message}")]
    InvalidParams {
        /// Description of what was wrong.
        message: String,
    },

    /// Any other failure inside the procedure.
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl ProcedureError {
    /// Creates an explicit fault.
    #[must_use]
    pub fn fault(code: i32, message: impl Into<String>) -> Self {
        Self::Fault(Fault::new(code, message))
    }

    /// Creates an invalid params error.
    #[must_use]
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: message.into(),
        }
    }

    /// Converts the error into the fault reported to the caller.
    #[must_use]
    pub fn into_fault(self) -> Fault {
        match self {
            Self::Fault(fault) => fault,
            Self::InvalidParams { message } => Fault::invalid_params(message),
            Self::Failed(error) => Fault::application(format!("{error:#}")),
        }
    }
}

impl From<Fault> for ProcedureError {
    fn from(fault: Fault) -> Self {
        Self::Fault(fault)
    }
}
