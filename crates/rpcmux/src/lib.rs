//! One endpoint serving a procedure registry over XML-RPC and JSON-RPC.
//!
//! Procedures are declared once with [`ProcedureDeclaration`] and registered
//! at startup. The [`Dispatcher`] then accepts raw request bodies, works out
//! which protocol each one uses, and answers in that protocol:
//!
//! 1. The [`ProtocolSniffer`] picks XML-RPC or JSON-RPC from the content type
//!    or, failing that, from the body itself.
//! 2. The matching [`Codec`] decodes the body into protocol-neutral calls.
//! 3. Each call is resolved in the [`Registry`], checked against the
//!    procedure's permission through the injected [`Authorizer`], checked for
//!    arity, and invoked.
//! 4. Results and faults are encoded back with the same codec.
//!
//! Failures never escape as Rust errors once a protocol is known: decoding
//! problems, unknown methods, authorization denials, procedure errors and
//! even panics become protocol faults with the codes in [`fault::codes`].
//!
//! The `system.*` introspection procedures (`listMethods`, `methodSignature`,
//! `methodHelp`, `multicall`, `describe`, and optionally `login`/`logout`)
//! are answered from the registry itself.
//!
//! HTTP serving, sessions and cookies stay with the embedding application:
//! it passes the body, the content type and an optional [`CallerIdentity`]
//! in, and writes the [`RpcResponse`] out.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use rpcmux::{Collaborators, ProcedureDeclaration, Value, build_dispatcher};
//! use rpcmux_config::Config;
//!
//! let add = ProcedureDeclaration::new("add", |params: &[Value]| {
//!     Ok(Value::from(params.iter().filter_map(Value::as_i64).sum::<i64>()))
//! })
//! .signature(["int", "int", "int"]);
//!
//! let authorizer = Arc::new(|_: &rpcmux::CallerIdentity, _: &str| false);
//! let dispatcher = build_dispatcher(&Config::default(), [add], Collaborators::new(authorizer))
//!     .expect("registration succeeds");
//!
//! let response = dispatcher.handle(
//!     br#"{"jsonrpc": "2.0", "method": "add", "params": [1, 2], "id": 7}"#,
//!     Some("application/json"),
//!     None,
//! );
//! let body = String::from_utf8(response.body).expect("utf-8");
//! assert!(body.contains(r#""result":3"#));
//! ```

pub mod auth;
mod bootstrap;
pub mod codec;
mod dispatch;
pub mod fault;
mod introspection;
mod registry;
mod signature;
mod sniffer;
pub mod telemetry;
mod value;

pub use auth::{AuthFailure, Authenticator, Authorizer, CallerIdentity, Credentials, SessionChange};
pub use bootstrap::{
    BootstrapError, Collaborators, ConfigLoader, Endpoint, SystemConfigLoader, bootstrap,
    bootstrap_with, build_dispatcher, build_registry,
};
pub use codec::{Codec, JsonCodec, Protocol, XmlCodec};
pub use dispatch::{Dispatcher, RpcResponse, TransportStatus};
pub use fault::{Fault, ProcedureError};
pub use introspection::{
    DESCRIBE, LIST_METHODS, LOGIN, LOGOUT, METHOD_HELP, METHOD_SIGNATURE, MULTICALL,
    UNDECLARED_SIGNATURE, render_markdown,
};
pub use registry::{
    CallContext, HelpFormat, Procedure, ProcedureDeclaration, ProcedureEntry, Registry,
    RegistryError,
};
pub use signature::{Signature, SignatureError, accepts_arity};
pub use sniffer::ProtocolSniffer;
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use value::{Struct, Value, ValueKind};

#[cfg(test)]
mod tests;
