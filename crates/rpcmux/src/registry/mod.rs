//! Procedure registry.
//!
//! The [`Registry`] maps canonical names to validated [`ProcedureEntry`]
//! values. It is populated once at startup and then moved into the
//! dispatcher, which only ever reads it; there is no way to register through
//! a shared reference, so hot-reload is ruled out by construction.
//! Registration is all-or-nothing per entry: a declaration that fails
//! validation leaves the registry untouched.

mod entry;

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::debug;

use crate::signature::{Signature, SignatureError};

pub use self::entry::{CallContext, HelpFormat, Procedure, ProcedureDeclaration, ProcedureEntry};
pub(crate) use self::entry::Handler;

/// Tracing target for registry operations.
pub(crate) const REGISTRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::registry");

/// Errors raised while registering a procedure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A procedure with the same name is already registered.
    #[error("procedure '{name}' is already registered")]
    DuplicateName {
        /// Conflicting name.
        name: String,
    },

    /// The declared name is empty.
    #[error("procedure name must not be empty")]
    InvalidName,

    /// A signature alternative used a type outside the vocabulary.
    #[error("procedure '{name}' declares an invalid signature: {source}")]
    InvalidSignature {
        /// Procedure name.
        name: String,
        /// Underlying validation error.
        #[source]
        source: SignatureError,
    },

    /// Declared parameter names disagree with a signature's arity.
    #[error("procedure '{name}' names {found} parameters but a signature takes {expected}")]
    ParameterNames {
        /// Procedure name.
        name: String,
        /// Arity of the conflicting signature alternative.
        expected: usize,
        /// Number of declared parameter names.
        found: usize,
    },
}

/// Registry of callable procedures keyed by canonical name.
#[derive(Debug, Default)]
pub struct Registry {
    entries: BTreeMap<String, ProcedureEntry>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and registers a declaration.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateName`] when the name is taken (the
    /// existing entry is kept), [`RegistryError::InvalidSignature`] when a
    /// signature uses an unknown type, [`RegistryError::InvalidName`] for an
    /// empty name and [`RegistryError::ParameterNames`] when parameter names
    /// contradict a signature.
    pub fn register(&mut self, declaration: ProcedureDeclaration) -> Result<(), RegistryError> {
        let entry = validate(declaration)?;
        if self.entries.contains_key(entry.name()) {
            return Err(RegistryError::DuplicateName { name: entry.name });
        }
        debug!(
            target: REGISTRY_TARGET,
            name = entry.name(),
            alternatives = entry.signatures().len(),
            permission = entry.permission(),
            "registered procedure"
        );
        self.entries.insert(entry.name.clone(), entry);
        Ok(())
    }

    /// Looks up a procedure by canonical name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&ProcedureEntry> {
        self.entries.get(name)
    }

    /// Returns `true` when `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names in lexical order.
    #[must_use]
    pub fn list_names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Entries in lexical name order.
    pub fn entries(&self) -> impl Iterator<Item = &ProcedureEntry> {
        self.entries.values()
    }

    /// Number of registered procedures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn validate(declaration: ProcedureDeclaration) -> Result<ProcedureEntry, RegistryError> {
    let ProcedureDeclaration {
        name: declared_name,
        handler,
        signatures: declared_signatures,
        param_names,
        help,
        help_format,
        permission,
        login_required,
    } = declaration;

    let canonical = declared_name.trim().to_owned();
    if canonical.is_empty() {
        return Err(RegistryError::InvalidName);
    }

    let signatures = declared_signatures
        .iter()
        .map(|types| Signature::parse(types.as_slice()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| RegistryError::InvalidSignature {
            name: canonical.clone(),
            source,
        })?;

    if !param_names.is_empty()
        && let Some(conflict) = signatures
            .iter()
            .find(|signature| signature.arity() != param_names.len())
    {
        return Err(RegistryError::ParameterNames {
            name: canonical,
            expected: conflict.arity(),
            found: param_names.len(),
        });
    }

    Ok(ProcedureEntry {
        name: canonical,
        handler,
        signatures,
        param_names,
        help,
        help_format,
        permission,
        login_required,
    })
}
