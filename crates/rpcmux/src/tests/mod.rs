//! Crate-level test support, bootstrap tests and BDD scenarios.

use std::ffi::OsString;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

use ortho_config::{OrthoConfig, OrthoError};
use rpcmux_config::Config;

use crate::auth::{AuthFailure, Authenticator, Authorizer, CallerIdentity, Credentials};
use crate::bootstrap::{
    BootstrapError, Collaborators, ConfigLoader, bootstrap_with, build_dispatcher,
};
use crate::codec::{CallResult, XmlCodec};
use crate::dispatch::{Dispatcher, TransportStatus};
use crate::fault::ProcedureError;
use crate::registry::{ProcedureDeclaration, RegistryError};
use crate::value::Value;


// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Authorizer granting every permission.
pub(crate) fn allow_all() -> Arc<dyn Authorizer> {
    Arc::new(|_: &CallerIdentity, _: &str| true)
}

/// Authorizer denying every permission.
pub(crate) fn deny_all() -> Arc<dyn Authorizer> {
    Arc::new(|_: &CallerIdentity, _: &str| false)
}

/// Accepts `alice`/`secret` and remembers who logged out.
#[derive(Debug, Default)]
pub(crate) struct StubAuthenticator {
    pub(crate) logged_out: Mutex<Vec<String>>,
}

impl Authenticator for StubAuthenticator {
    fn login(&self, credentials: &Credentials) -> Result<CallerIdentity, AuthFailure> {
        if credentials.username() == "alice" && credentials.password() == "secret" {
            Ok(CallerIdentity::new("alice"))
        } else {
            Err(AuthFailure::new("bad credentials"))
        }
    }

    fn logout(&self, caller: &CallerIdentity) {
        self.logged_out
            .lock()
            .expect("logout log poisoned")
            .push(caller.subject().to_owned());
    }
}

/// `add(a: int, b: int) -> int`, counting invocations.
pub(crate) fn counted_add(counter: Arc<AtomicUsize>) -> ProcedureDeclaration {
    ProcedureDeclaration::new("add", move |params: &[Value]| {
        counter.fetch_add(1, Ordering::SeqCst);
        let [Value::Int(a), Value::Int(b)] = params else {
            return Err(ProcedureError::invalid_params("add expects two integers"));
        };
        a.checked_add(*b)
            .map(Value::Int)
            .ok_or_else(|| ProcedureError::invalid_params("sum overflows"))
    })
    .signature(["int", "int", "int"])
    .params(["a", "b"])
    .help("Adds two integers.")
}

/// Builds a dispatcher with the built-ins and `declarations`.
pub(crate) fn dispatcher_with(
    config: &Config,
    declarations: Vec<ProcedureDeclaration>,
    authorizer: Arc<dyn Authorizer>,
) -> Dispatcher {
    build_dispatcher(config, declarations, Collaborators::new(authorizer))
        .expect("registration succeeds")
}

/// Sends an XML-RPC call and decodes the response document.
pub(crate) fn xml_call(
    dispatcher: &Dispatcher,
    method: &str,
    params: &[Value],
    caller: Option<&CallerIdentity>,
) -> CallResult {
    let codec = XmlCodec::new();
    let body = codec.encode_call(method, params).expect("encode call");
    let response = dispatcher.handle(&body, Some("text/xml"), caller);
    assert_eq!(response.status, TransportStatus::Success);
    codec
        .decode_response(&response.body)
        .expect("decode response")
}

/// Sends a JSON-RPC body and parses the response, if any.
pub(crate) fn json_exchange(
    dispatcher: &Dispatcher,
    body: &serde_json::Value,
    caller: Option<&CallerIdentity>,
) -> Option<serde_json::Value> {
    let response = dispatcher.handle(body.to_string().as_bytes(), None, caller);
    assert_eq!(response.status, TransportStatus::Success);
    (!response.body.is_empty())
        .then(|| serde_json::from_slice(&response.body).expect("valid JSON response"))
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

struct StaticLoader(Config);

impl ConfigLoader for StaticLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.0.clone())
    }
}

struct FailingLoader;

impl ConfigLoader for FailingLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let args = vec![
            OsString::from("rpcmux"),
            OsString::from("--log-format"),
            OsString::from("verbose"),
        ];
        Config::load_from_iter(args)
    }
}

#[test]
fn bootstrap_registers_declarations_and_builtins() {
    let counter = Arc::new(AtomicUsize::new(0));
    let endpoint = bootstrap_with(
        &StaticLoader(Config::default()),
        vec![counted_add(Arc::clone(&counter))],
        Collaborators::new(allow_all()),
    )
    .expect("bootstrap succeeds");

    let registry = endpoint.dispatcher().registry();
    assert!(registry.contains("add"));
    assert!(registry.contains(crate::LIST_METHODS));
    assert!(!registry.contains(crate::LOGIN), "login is disabled by default");
    assert_eq!(endpoint.config(), &Config::default());
}

#[test]
fn bootstrap_skips_disabled_methods() {
    let config = Config {
        disabled_methods: vec![String::from("add")],
        ..Config::default()
    };
    let endpoint = bootstrap_with(
        &StaticLoader(config),
        vec![counted_add(Arc::new(AtomicUsize::new(0)))],
        Collaborators::new(allow_all()),
    )
    .expect("bootstrap succeeds");

    assert!(!endpoint.dispatcher().registry().contains("add"));
}

#[test]
fn bootstrap_reports_configuration_failures() {
    let error = bootstrap_with(&FailingLoader, Vec::new(), Collaborators::new(allow_all()))
        .expect_err("loader failure aborts startup");
    assert!(matches!(error, BootstrapError::Configuration { .. }));
}

#[test]
fn duplicate_declarations_abort_startup() {
    let counter = Arc::new(AtomicUsize::new(0));
    let error = bootstrap_with(
        &StaticLoader(Config::default()),
        vec![counted_add(Arc::clone(&counter)), counted_add(counter)],
        Collaborators::new(allow_all()),
    )
    .expect_err("duplicate aborts startup");

    assert!(matches!(
        error,
        BootstrapError::Registration {
            source: RegistryError::DuplicateName { .. }
        }
    ));
}

#[test]
fn user_procedures_cannot_shadow_builtins() {
    let shadow = ProcedureDeclaration::new(crate::LIST_METHODS, |_params: &[Value]| {
        Ok(Value::Nil)
    });
    let error = build_dispatcher(&Config::default(), vec![shadow], Collaborators::new(allow_all()))
        .expect_err("built-in names are taken");
    assert!(matches!(error, RegistryError::DuplicateName { .. }));
}

#[test]
fn end_to_end_xml_add() {
    let dispatcher = dispatcher_with(
        &Config::default(),
        vec![counted_add(Arc::new(AtomicUsize::new(0)))],
        allow_all(),
    );
    let result = xml_call(&dispatcher, "add", &[Value::Int(1), Value::Int(2)], None);
    assert_eq!(result, Ok(Value::Int(3)));
}
