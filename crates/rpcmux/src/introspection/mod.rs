//! The `system.*` procedures answered from the registry itself.
//!
//! Built-ins are registered like any other procedure so that lookup,
//! permission checks and arity checks apply uniformly. Their bodies live
//! here; the dispatcher supplies the state they need when it invokes them.

mod help;

use rpcmux_config::Config;
use tracing::{debug, info};

use crate::auth::{Authenticator, CallerIdentity, Credentials, SessionChange};
use crate::codec::CallResult;
use crate::fault::{Fault, ProcedureError};
use crate::registry::{ProcedureDeclaration, ProcedureEntry, Registry, RegistryError};
use crate::value::{Struct, Value};

pub use self::help::render_markdown;
pub(crate) use self::help::entry_help;

/// Tracing target for built-in procedures.
pub(crate) const INTROSPECTION_TARGET: &str =
    concat!(env!("CARGO_PKG_NAME"), "::introspection");

/// `system.listMethods`
pub const LIST_METHODS: &str = "system.listMethods";
/// `system.methodSignature`
pub const METHOD_SIGNATURE: &str = "system.methodSignature";
/// `system.methodHelp`
pub const METHOD_HELP: &str = "system.methodHelp";
/// `system.multicall`
pub const MULTICALL: &str = "system.multicall";
/// `system.describe`
pub const DESCRIBE: &str = "system.describe";
/// `system.login`
pub const LOGIN: &str = "system.login";
/// `system.logout`
pub const LOGOUT: &str = "system.logout";

/// Answer to `system.methodSignature` when no signature was declared.
pub const UNDECLARED_SIGNATURE: &str = "undef";

/// Service type advertised by `system.describe`.
pub const SERVICE_TYPE: &str = "rpcmux XML-RPC/JSON-RPC";

/// Built-in procedures, dispatched without a user callable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Builtin {
    ListMethods,
    MethodSignature,
    MethodHelp,
    Multicall,
    Describe,
    Login,
    Logout,
}

/// Registers the enabled built-ins.
///
/// `login_available` reports whether an authenticator was supplied; login
/// and logout are only registered when it is and login is enabled. Names in
/// `disabled_methods` are skipped like any other procedure.
pub(crate) fn install(
    registry: &mut Registry,
    config: &Config,
    login_available: bool,
) -> Result<(), RegistryError> {
    if config.disable_introspection {
        debug!(target: INTROSPECTION_TARGET, "introspection disabled");
        return Ok(());
    }

    let mut builtins = vec![
        guarded(
            config,
            ProcedureDeclaration::builtin(LIST_METHODS, Builtin::ListMethods)
                .signature(["array"])
                .help("Returns the names of all callable procedures in lexical order."),
        ),
        guarded(
            config,
            ProcedureDeclaration::builtin(METHOD_SIGNATURE, Builtin::MethodSignature)
                .signature(["array", "string"])
                .params(["method_name"])
                .help("Returns the declared signatures of a procedure, or \"undef\"."),
        ),
        guarded(
            config,
            ProcedureDeclaration::builtin(METHOD_HELP, Builtin::MethodHelp)
                .signature(["string", "string"])
                .params(["method_name"])
                .help("Returns the documentation of a procedure."),
        ),
        guarded(
            config,
            ProcedureDeclaration::builtin(DESCRIBE, Builtin::Describe)
                .signature(["struct"])
                .help("Returns a description of the service and every procedure."),
        ),
    ];
    if !config.disable_multicall {
        builtins.push(guarded(
            config,
            ProcedureDeclaration::builtin(MULTICALL, Builtin::Multicall)
                .signature(["array", "array"])
                .params(["calls"])
                .help("Runs several calls in one request and returns their outcomes in order."),
        ));
    }
    if !config.disable_login && login_available {
        builtins.push(
            ProcedureDeclaration::builtin(LOGIN, Builtin::Login)
                .signature(["boolean", "string", "string"])
                .params(["username", "password"])
                .help("Authenticates the caller for subsequent requests."),
        );
        builtins.push(
            ProcedureDeclaration::builtin(LOGOUT, Builtin::Logout)
                .signature(["boolean"])
                .help("Ends the caller's authenticated session."),
        );
    }

    for declaration in builtins {
        if config.is_method_disabled(declaration.name()) {
            debug!(
                target: INTROSPECTION_TARGET,
                method = declaration.name(),
                "built-in disabled"
            );
            continue;
        }
        registry.register(declaration)?;
    }
    Ok(())
}

/// Applies the configured introspection permission, if any.
fn guarded(config: &Config, declaration: ProcedureDeclaration) -> ProcedureDeclaration {
    match &config.introspection_permission {
        Some(token) => declaration.permission(token.clone()),
        None => declaration,
    }
}

pub(crate) fn list_methods(registry: &Registry) -> Value {
    registry.list_names().into_iter().map(Value::from).collect()
}

pub(crate) fn method_signature(registry: &Registry, params: &[Value]) -> Result<Value, ProcedureError> {
    let entry = target_entry(registry, params)?;
    if entry.signatures().is_empty() {
        return Ok(Value::from(UNDECLARED_SIGNATURE));
    }
    Ok(entry
        .signatures()
        .iter()
        .map(|signature| {
            signature
                .type_names()
                .into_iter()
                .map(Value::from)
                .collect::<Value>()
        })
        .collect())
}

pub(crate) fn method_help(
    registry: &Registry,
    render: bool,
    params: &[Value],
) -> Result<Value, ProcedureError> {
    let entry = target_entry(registry, params)?;
    Ok(Value::from(entry_help(entry, render)))
}

pub(crate) fn describe(registry: &Registry, service_url: &str) -> Value {
    let methods = registry.entries().map(describe_entry).collect::<Value>();
    Value::Struct(Struct::from([
        (String::from("serviceType"), Value::from(SERVICE_TYPE)),
        (String::from("serviceURL"), Value::from(service_url)),
        (String::from("methods"), methods),
    ]))
}

fn describe_entry(entry: &ProcedureEntry) -> Value {
    let declared = entry.signatures().first();
    let arity = declared.map_or(entry.param_names().len(), |signature| signature.arity());
    let params = (0..arity)
        .map(|position| {
            let name = entry
                .param_names()
                .get(position)
                .cloned()
                .unwrap_or_else(|| format!("arg{}", position + 1));
            let rpctype = declared
                .and_then(|signature| signature.params().get(position))
                .map_or_else(|| String::from(UNDECLARED_SIGNATURE), ToString::to_string);
            Value::Struct(Struct::from([
                (String::from("name"), Value::from(name)),
                (String::from("rpctype"), Value::from(rpctype)),
            ]))
        })
        .collect::<Value>();

    Value::Struct(Struct::from([
        (String::from("name"), Value::from(entry.name())),
        (String::from("summary"), Value::from(entry.help())),
        (String::from("params"), params),
        (String::from("return"), Value::from(entry.return_type())),
        (
            String::from("signature"),
            Value::from(declared.map(|signature| {
                signature.describe(entry.name(), entry.param_names())
            })),
        ),
    ]))
}

/// Runs each `{methodName, params}` entry through `invoke`.
///
/// Successes become one-element arrays and failures become
/// `{faultCode, faultString}` structs, in input order.
pub(crate) fn multicall<F>(params: &[Value], mut invoke: F) -> Result<Value, ProcedureError>
where
    F: FnMut(&str, &[Value]) -> CallResult,
{
    let Some(Value::Array(calls)) = params.first() else {
        return Err(ProcedureError::invalid_params(
            "system.multicall expects an array of calls",
        ));
    };
    Ok(calls
        .iter()
        .map(|call| match multicall_entry(call) {
            Ok((name, _)) if name == MULTICALL => {
                fault_struct(&Fault::invalid_request("recursive system.multicall is forbidden"))
            }
            Ok((name, arguments)) => match invoke(name, arguments) {
                Ok(value) => Value::Array(vec![value]),
                Err(fault) => fault_struct(&fault),
            },
            Err(fault) => fault_struct(&fault),
        })
        .collect())
}

fn multicall_entry(call: &Value) -> Result<(&str, &[Value]), Fault> {
    let members = call
        .as_struct()
        .ok_or_else(|| Fault::invalid_request("multicall entry is not a struct"))?;
    let name = members
        .get("methodName")
        .and_then(Value::as_str)
        .ok_or_else(|| Fault::invalid_request("multicall entry has no methodName"))?;
    let arguments = match members.get("params") {
        None => &[][..],
        Some(Value::Array(arguments)) => arguments.as_slice(),
        Some(_) => return Err(Fault::invalid_params("multicall params must be an array")),
    };
    Ok((name, arguments))
}

fn fault_struct(fault: &Fault) -> Value {
    Value::Struct(Struct::from([
        (String::from("faultCode"), Value::from(fault.code())),
        (String::from("faultString"), Value::from(fault.message())),
    ]))
}

/// Delegates `system.login`; a successful login establishes a session.
pub(crate) fn login(
    authenticator: Option<&dyn Authenticator>,
    params: &[Value],
) -> Result<(Value, Option<SessionChange>), ProcedureError> {
    let [Value::String(username), Value::String(password)] = params else {
        return Err(ProcedureError::invalid_params(
            "system.login expects a username and a password",
        ));
    };
    let Some(authenticator) = authenticator else {
        return Ok((Value::Boolean(false), None));
    };
    match authenticator.login(&Credentials::new(username.as_str(), password.as_str())) {
        Ok(identity) => {
            info!(
                target: INTROSPECTION_TARGET,
                subject = identity.subject(),
                "login succeeded"
            );
            Ok((
                Value::Boolean(true),
                Some(SessionChange::Established(identity)),
            ))
        }
        Err(failure) => {
            info!(
                target: INTROSPECTION_TARGET,
                username = username.as_str(),
                reason = failure.reason(),
                "login rejected"
            );
            Ok((Value::Boolean(false), None))
        }
    }
}

/// Delegates `system.logout`; returns `false` when nobody is logged in.
pub(crate) fn logout(
    authenticator: Option<&dyn Authenticator>,
    caller: Option<&CallerIdentity>,
) -> (Value, Option<SessionChange>) {
    match (authenticator, caller) {
        (Some(authenticator), Some(identity)) => {
            authenticator.logout(identity);
            info!(
                target: INTROSPECTION_TARGET,
                subject = identity.subject(),
                "logout"
            );
            (Value::Boolean(true), Some(SessionChange::Ended))
        }
        _ => (Value::Boolean(false), None),
    }
}

fn target_entry<'a>(
    registry: &'a Registry,
    params: &[Value],
) -> Result<&'a ProcedureEntry, ProcedureError> {
    let Some(Value::String(name)) = params.first() else {
        return Err(ProcedureError::invalid_params("expected a method name"));
    };
    registry
        .lookup(name)
        .ok_or_else(|| ProcedureError::from(Fault::method_not_found(name)))
}
