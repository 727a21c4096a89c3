//! Request handling: sniff, decode, resolve, authorize, invoke, encode.
//!
//! [`Dispatcher::handle`] is the single entry point for the transport layer.
//! It never fails: every problem after protocol detection is reported as a
//! fault in the caller's protocol, and an unrecognised body yields
//! [`TransportStatus::Unsupported`] with an empty body.

mod arguments;

use std::any::Any;
use std::borrow::Cow;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use rpcmux_config::{Config, CrossOriginPolicy};
use tracing::{debug, error, warn};

use self::arguments::bind_arguments;
use crate::auth::{Authenticator, Authorizer, CallerIdentity, SessionChange};
use crate::codec::{
    CallResult, CallSlot, Codec, Decoded, JsonCodec, Params, Protocol, Reply, Response, XmlCodec,
};
use crate::fault::{Fault, ProcedureError};
use crate::introspection::{self, Builtin};
use crate::registry::{CallContext, Handler, ProcedureEntry, Registry};
use crate::signature::accepts_arity;
use crate::sniffer::ProtocolSniffer;
use crate::value::Value;

/// Tracing target for dispatch operations.
pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Transport-level outcome of handling a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportStatus {
    /// The request was recognised; the body holds the protocol response.
    Success,
    /// Neither protocol recognised the request.
    Unsupported,
}

impl TransportStatus {
    /// Suggested HTTP status code.
    #[must_use]
    pub const fn http_code(self) -> u16 {
        match self {
            Self::Success => 200,
            Self::Unsupported => 415,
        }
    }
}

/// Bytes and metadata handed back to the transport layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcResponse {
    /// Encoded response; empty for unsupported requests and pure
    /// notification requests.
    pub body: Vec<u8>,
    /// Media type of `body`, when a protocol was recognised.
    pub content_type: Option<&'static str>,
    /// Transport-level outcome.
    pub status: TransportStatus,
    /// Session transition requested by `system.login` or `system.logout`.
    pub session: Option<SessionChange>,
}

impl RpcResponse {
    /// Response for a request no enabled protocol recognised.
    #[must_use]
    pub const fn unsupported() -> Self {
        Self {
            body: Vec::new(),
            content_type: None,
            status: TransportStatus::Unsupported,
            session: None,
        }
    }
}

/// Per-dispatcher switches taken from [`Config`].
#[derive(Debug, Clone)]
struct DispatchSettings {
    log_requests: bool,
    render_help: bool,
    service_url: String,
    cross_origin: CrossOriginPolicy,
}

impl DispatchSettings {
    fn from_config(config: &Config) -> Self {
        Self {
            log_requests: config.log_requests,
            render_help: !config.disable_help_rendering,
            service_url: config.service_url.clone(),
            cross_origin: config.cross_origin(),
        }
    }
}

/// Routes requests of either protocol to the registry.
///
/// The dispatcher is immutable after construction and can be shared between
/// threads behind an [`Arc`].
pub struct Dispatcher {
    registry: Arc<Registry>,
    sniffer: ProtocolSniffer,
    xml: XmlCodec,
    json: JsonCodec,
    authorizer: Arc<dyn Authorizer>,
    authenticator: Option<Arc<dyn Authenticator>>,
    settings: DispatchSettings,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("procedures", &self.registry.len())
            .field("sniffer", &self.sniffer)
            .field("has_authenticator", &self.authenticator.is_some())
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Creates a dispatcher over a fully populated registry.
    #[must_use]
    pub fn new(registry: Registry, config: &Config, authorizer: Arc<dyn Authorizer>) -> Self {
        Self {
            registry: Arc::new(registry),
            sniffer: ProtocolSniffer::from_config(config),
            xml: XmlCodec::new(),
            json: JsonCodec::new(),
            authorizer,
            authenticator: None,
            settings: DispatchSettings::from_config(config),
        }
    }

    /// Supplies the backend used by `system.login` and `system.logout`.
    #[must_use]
    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    /// The registry requests are resolved against.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Cross-origin metadata for the transport layer.
    #[must_use]
    pub const fn cross_origin(&self) -> &CrossOriginPolicy {
        &self.settings.cross_origin
    }

    /// Handles one request body.
    ///
    /// `content_type` is the raw header value, if any; `caller` is the
    /// identity the transport resolved for this request.
    #[must_use]
    pub fn handle(
        &self,
        body: &[u8],
        content_type: Option<&str>,
        caller: Option<&CallerIdentity>,
    ) -> RpcResponse {
        let Some(protocol) = self.sniffer.sniff(content_type, body) else {
            warn!(
                target: DISPATCH_TARGET,
                content_type = content_type.unwrap_or_default(),
                bytes = body.len(),
                "unrecognised request"
            );
            return RpcResponse::unsupported();
        };
        if self.settings.log_requests {
            debug!(
                target: DISPATCH_TARGET,
                %protocol,
                body = %String::from_utf8_lossy(body),
                "request"
            );
        }

        let codec = self.codec(protocol);
        let mut session = None;
        let encoded = match codec.decode(body) {
            Ok(decoded) => {
                let response = self.answer(decoded, caller, &mut session);
                encode_response(codec, &response)
            }
            Err(error) => {
                debug!(
                    target: DISPATCH_TARGET,
                    %protocol,
                    error = %error,
                    "request could not be decoded"
                );
                codec.encode_fault(&error.to_fault(), None)
            }
        };

        if self.settings.log_requests {
            debug!(
                target: DISPATCH_TARGET,
                %protocol,
                body = %String::from_utf8_lossy(&encoded),
                "response"
            );
        }
        RpcResponse {
            body: encoded,
            content_type: Some(codec.content_type()),
            status: TransportStatus::Success,
            session,
        }
    }

    fn codec(&self, protocol: Protocol) -> &dyn Codec {
        match protocol {
            Protocol::Xml => &self.xml,
            Protocol::Json => &self.json,
        }
    }

    fn answer(
        &self,
        decoded: Decoded,
        caller: Option<&CallerIdentity>,
        session: &mut Option<SessionChange>,
    ) -> Response {
        match decoded {
            Decoded::Single(slot) => self
                .answer_slot(slot, caller, session)
                .map_or(Response::Empty, Response::Single),
            Decoded::Batch(slots) => Response::Batch(
                slots
                    .into_iter()
                    .filter_map(|slot| self.answer_slot(slot, caller, session))
                    .collect(),
            ),
        }
    }

    /// Executes one decoded slot; notifications produce no reply.
    fn answer_slot(
        &self,
        slot: CallSlot,
        caller: Option<&CallerIdentity>,
        session: &mut Option<SessionChange>,
    ) -> Option<Reply> {
        match slot {
            Ok(call) => {
                let outcome = self.execute(&call.method, &call.params, caller, session);
                if call.notification {
                    debug!(
                        target: DISPATCH_TARGET,
                        method = call.method.as_str(),
                        failed = outcome.is_err(),
                        "notification handled"
                    );
                    None
                } else {
                    Some(Reply::new(call.id, outcome))
                }
            }
            Err(rejected) => Some(Reply::new(rejected.id, Err(rejected.fault))),
        }
    }

    /// Lookup, authorization, argument binding, arity check and invocation.
    fn execute(
        &self,
        method: &str,
        params: &Params,
        caller: Option<&CallerIdentity>,
        session: &mut Option<SessionChange>,
    ) -> CallResult {
        let entry = self.resolve(method, caller)?;
        let arguments = match params {
            Params::Positional(values) => Cow::Borrowed(values.as_slice()),
            Params::Named(members) => Cow::Owned(bind_arguments(entry, members)?),
        };
        self.run(entry, &arguments, caller, session)
    }

    fn resolve(
        &self,
        method: &str,
        caller: Option<&CallerIdentity>,
    ) -> Result<&ProcedureEntry, Fault> {
        let entry = self.registry.lookup(method).ok_or_else(|| {
            debug!(target: DISPATCH_TARGET, method, "method not found");
            Fault::method_not_found(method)
        })?;
        self.authorize(entry, caller)?;
        Ok(entry)
    }

    fn authorize(&self, entry: &ProcedureEntry, caller: Option<&CallerIdentity>) -> Result<(), Fault> {
        if !entry.requires_identity() {
            return Ok(());
        }
        let granted = caller.is_some_and(|identity| {
            entry
                .permission()
                .is_none_or(|token| self.authorizer.has_permission(identity, token))
        });
        if granted {
            Ok(())
        } else {
            warn!(
                target: DISPATCH_TARGET,
                method = entry.name(),
                permission = entry.permission().unwrap_or_default(),
                authenticated = caller.is_some(),
                "call not authorized"
            );
            Err(Fault::not_authorized(entry.name()))
        }
    }

    fn run(
        &self,
        entry: &ProcedureEntry,
        arguments: &[Value],
        caller: Option<&CallerIdentity>,
        session: &mut Option<SessionChange>,
    ) -> CallResult {
        if !accepts_arity(entry.signatures(), arguments.len()) {
            return Err(Fault::invalid_params(format!(
                "{} does not accept {} argument(s)",
                entry.name(),
                arguments.len()
            )));
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| match &entry.handler {
            Handler::Procedure(procedure) => {
                procedure.call(&CallContext::new(entry.name(), caller), arguments)
            }
            Handler::Builtin(builtin) => self.run_builtin(*builtin, arguments, caller, session),
        }));

        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(failure)) => {
                let fault = failure.into_fault();
                debug!(
                    target: DISPATCH_TARGET,
                    method = entry.name(),
                    code = fault.code(),
                    message = fault.message(),
                    "procedure returned a fault"
                );
                Err(fault)
            }
            Err(payload) => {
                error!(
                    target: DISPATCH_TARGET,
                    method = entry.name(),
                    panic = panic_message(payload.as_ref()),
                    "procedure panicked"
                );
                Err(Fault::application(format!("{} failed unexpectedly", entry.name())))
            }
        }
    }

    fn run_builtin(
        &self,
        builtin: Builtin,
        arguments: &[Value],
        caller: Option<&CallerIdentity>,
        session: &mut Option<SessionChange>,
    ) -> Result<Value, ProcedureError> {
        match builtin {
            Builtin::ListMethods => Ok(introspection::list_methods(&self.registry)),
            Builtin::MethodSignature => introspection::method_signature(&self.registry, arguments),
            Builtin::MethodHelp => {
                introspection::method_help(&self.registry, self.settings.render_help, arguments)
            }
            Builtin::Describe => Ok(introspection::describe(
                &self.registry,
                &self.settings.service_url,
            )),
            Builtin::Multicall => introspection::multicall(arguments, |method, params| {
                self.resolve(method, caller)
                    .and_then(|entry| self.run(entry, params, caller, session))
            }),
            Builtin::Login => {
                let (value, change) =
                    introspection::login(self.authenticator.as_deref(), arguments)?;
                record_session(session, change);
                Ok(value)
            }
            Builtin::Logout => {
                let (value, change) = introspection::logout(self.authenticator.as_deref(), caller);
                record_session(session, change);
                Ok(value)
            }
        }
    }
}

fn record_session(session: &mut Option<SessionChange>, change: Option<SessionChange>) {
    if change.is_some() {
        *session = change;
    }
}

/// Encodes replies, substituting an internal-error fault for any reply the
/// codec cannot represent.
fn encode_response(codec: &dyn Codec, response: &Response) -> Vec<u8> {
    let failure = match codec.encode(response) {
        Ok(encoded) => return encoded,
        Err(failure) => failure,
    };
    warn!(
        target: DISPATCH_TARGET,
        protocol = %codec.protocol(),
        error = %failure,
        "result could not be encoded"
    );
    match response {
        Response::Single(reply) => {
            codec.encode_fault(&Fault::internal(failure.to_string()), reply.id.as_ref())
        }
        Response::Batch(replies) => {
            let repaired: Vec<Reply> = replies
                .iter()
                .map(|reply| match codec.encode(&Response::Single(reply.clone())) {
                    Ok(_) => reply.clone(),
                    Err(reply_failure) => Reply::new(
                        reply.id.clone(),
                        Err(Fault::internal(reply_failure.to_string())),
                    ),
                })
                .collect();
            codec
                .encode(&Response::Batch(repaired))
                .unwrap_or_else(|_| codec.encode_fault(&Fault::internal(failure.to_string()), None))
        }
        Response::Empty => Vec::new(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

#[cfg(test)]
mod tests;
