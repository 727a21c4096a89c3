//! Procedure declarations and the validated entries the registry stores.

use std::fmt;
use std::sync::Arc;

use crate::auth::CallerIdentity;
use crate::fault::ProcedureError;
use crate::introspection::Builtin;
use crate::signature::Signature;
use crate::value::Value;

/// Per-call information available to procedures that want it.
#[derive(Debug, Clone, Copy)]
pub struct CallContext<'a> {
    method: &'a str,
    caller: Option<&'a CallerIdentity>,
}

impl<'a> CallContext<'a> {
    /// Creates a context for one invocation.
    #[must_use]
    pub const fn new(method: &'a str, caller: Option<&'a CallerIdentity>) -> Self {
        Self { method, caller }
    }

    /// Name the procedure was called under.
    #[must_use]
    pub const fn method(&self) -> &'a str {
        self.method
    }

    /// Identity of the caller, when the transport resolved one.
    #[must_use]
    pub const fn caller(&self) -> Option<&'a CallerIdentity> {
        self.caller
    }
}

/// A remotely callable procedure.
///
/// Plain closures taking the positional arguments implement this trait;
/// implement it on a type to also receive the [`CallContext`].
pub trait Procedure: Send + Sync {
    /// Invokes the procedure.
    ///
    /// # Errors
    ///
    /// Any [`ProcedureError`] becomes a fault in the caller's protocol.
    fn call(&self, context: &CallContext<'_>, params: &[Value]) -> Result<Value, ProcedureError>;
}

impl<F> Procedure for F
where
    F: Fn(&[Value]) -> Result<Value, ProcedureError> + Send + Sync,
{
    fn call(&self, _context: &CallContext<'_>, params: &[Value]) -> Result<Value, ProcedureError> {
        self(params)
    }
}

/// How documentation text is turned into `system.methodHelp` output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HelpFormat {
    /// Returned verbatim.
    #[default]
    Plain,
    /// Markdown, rendered to HTML unless rendering is disabled.
    Markdown,
}

#[derive(Clone)]
pub(crate) enum Handler {
    Procedure(Arc<dyn Procedure>),
    Builtin(Builtin),
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Procedure(_) => f.write_str("Procedure(..)"),
            Self::Builtin(builtin) => f.debug_tuple("Builtin").field(builtin).finish(),
        }
    }
}

/// Registration input describing one procedure.
///
/// # Example
///
/// ```
/// use rpcmux::{ProcedureDeclaration, Registry, Value};
///
/// let add = ProcedureDeclaration::new("add", |params: &[Value]| {
///     let sum = params.iter().filter_map(Value::as_i64).sum::<i64>();
///     Ok(Value::from(sum))
/// })
/// .signature(["int", "int", "int"])
/// .params(["a", "b"])
/// .help("Adds two integers.");
///
/// let mut registry = Registry::new();
/// registry.register(add).expect("registration succeeds");
/// assert_eq!(registry.list_names(), vec!["add"]);
/// ```
#[derive(Debug, Clone)]
pub struct ProcedureDeclaration {
    pub(crate) name: String,
    pub(crate) handler: Handler,
    pub(crate) signatures: Vec<Vec<String>>,
    pub(crate) param_names: Vec<String>,
    pub(crate) help: String,
    pub(crate) help_format: HelpFormat,
    pub(crate) permission: Option<String>,
    pub(crate) login_required: bool,
}

impl ProcedureDeclaration {
    /// Declares a closure taking the positional arguments.
    #[must_use]
    pub fn new<F>(name: impl Into<String>, procedure: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, ProcedureError> + Send + Sync + 'static,
    {
        Self::from_procedure(name, procedure)
    }

    /// Declares any [`Procedure`] implementation.
    #[must_use]
    pub fn from_procedure(name: impl Into<String>, procedure: impl Procedure + 'static) -> Self {
        Self::with_handler(name, Handler::Procedure(Arc::new(procedure)))
    }

    pub(crate) fn builtin(name: &str, builtin: Builtin) -> Self {
        Self::with_handler(name, Handler::Builtin(builtin))
    }

    fn with_handler(name: impl Into<String>, handler: Handler) -> Self {
        Self {
            name: name.into(),
            handler,
            signatures: Vec::new(),
            param_names: Vec::new(),
            help: String::new(),
            help_format: HelpFormat::Plain,
            permission: None,
            login_required: false,
        }
    }

    /// Adds a `[return, params...]` signature alternative.
    #[must_use]
    pub fn signature<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.signatures
            .push(types.into_iter().map(Into::into).collect());
        self
    }

    /// Names the positional parameters, enabling JSON named arguments.
    #[must_use]
    pub fn params<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.param_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Sets plain-text documentation.
    #[must_use]
    pub fn help(mut self, text: impl Into<String>) -> Self {
        self.help = text.into();
        self.help_format = HelpFormat::Plain;
        self
    }

    /// Sets Markdown documentation.
    #[must_use]
    pub fn markdown_help(mut self, text: impl Into<String>) -> Self {
        self.help = text.into();
        self.help_format = HelpFormat::Markdown;
        self
    }

    /// Requires the caller to hold `token`.
    #[must_use]
    pub fn permission(mut self, token: impl Into<String>) -> Self {
        self.permission = Some(token.into());
        self
    }

    /// Requires a caller identity even without a permission token.
    #[must_use]
    pub fn login_required(mut self) -> Self {
        self.login_required = true;
        self
    }

    /// Declared name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }
}

/// Validated, immutable registry entry.
#[derive(Debug, Clone)]
pub struct ProcedureEntry {
    pub(crate) name: String,
    pub(crate) handler: Handler,
    pub(crate) signatures: Vec<Signature>,
    pub(crate) param_names: Vec<String>,
    pub(crate) help: String,
    pub(crate) help_format: HelpFormat,
    pub(crate) permission: Option<String>,
    pub(crate) login_required: bool,
}

impl ProcedureEntry {
    /// Canonical name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Declared signature alternatives; empty when undeclared.
    #[must_use]
    pub fn signatures(&self) -> &[Signature] {
        self.signatures.as_slice()
    }

    /// Declared parameter names; empty when undeclared.
    #[must_use]
    pub fn param_names(&self) -> &[String] {
        self.param_names.as_slice()
    }

    /// Raw documentation text.
    #[must_use]
    pub fn help(&self) -> &str {
        self.help.as_str()
    }

    /// Documentation rendering mode.
    #[must_use]
    pub const fn help_format(&self) -> HelpFormat {
        self.help_format
    }

    /// Permission token the caller must hold, if any.
    #[must_use]
    pub fn permission(&self) -> Option<&str> {
        self.permission.as_deref()
    }

    /// Whether a caller identity must be present.
    #[must_use]
    pub const fn requires_identity(&self) -> bool {
        self.login_required || self.permission.is_some()
    }

    /// Return type of the first alternative, used for summaries.
    #[must_use]
    pub fn return_type(&self) -> Option<String> {
        self.signatures
            .first()
            .map(|signature| signature.returns().to_string())
    }
}
