//! Declared procedure signatures and the arity gate built on them.
//!
//! A signature alternative is written the XML-RPC introspection way: the
//! return type first, then one type per parameter. Types are advisory for
//! introspection; the dispatcher only uses the alternatives to decide whether
//! an argument count can be accepted.

use std::str::FromStr;

use thiserror::Error;

use crate::value::ValueKind;

/// Errors raised while validating a declared signature.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    /// The alternative had no return type.
    #[error("signature alternative is empty; the return type comes first")]
    Empty,

    /// A type name outside the shared vocabulary was used.
    #[error("unknown type '{name}' in signature")]
    UnknownType {
        /// Offending type name.
        name: String,
    },
}

/// One `[return, params...]` alternative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    returns: ValueKind,
    params: Vec<ValueKind>,
}

impl Signature {
    /// Creates a signature from already-validated kinds.
    #[must_use]
    pub const fn new(returns: ValueKind, params: Vec<ValueKind>) -> Self {
        Self { returns, params }
    }

    /// Parses a `[return, params...]` list of type names.
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError::Empty`] for an empty list and
    /// [`SignatureError::UnknownType`] for names outside the vocabulary.
    pub fn parse<S: AsRef<str>>(types: &[S]) -> Result<Self, SignatureError> {
        let mut kinds = types.iter().map(|name| parse_kind(name.as_ref()));
        let returns = kinds.next().ok_or(SignatureError::Empty)??;
        let params = kinds.collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(returns, params))
    }

    /// Declared return type.
    #[must_use]
    pub const fn returns(&self) -> ValueKind {
        self.returns
    }

    /// Declared parameter types.
    #[must_use]
    pub fn params(&self) -> &[ValueKind] {
        self.params.as_slice()
    }

    /// Number of parameters.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Canonical type names, return type first.
    #[must_use]
    pub fn type_names(&self) -> Vec<String> {
        std::iter::once(self.returns)
            .chain(self.params.iter().copied())
            .map(|kind| kind.to_string())
            .collect()
    }

    /// Human-readable form such as `int add(int a, int b)`.
    ///
    /// Parameter names are included when `names` has one entry per
    /// parameter.
    #[must_use]
    pub fn describe(&self, method: &str, names: &[String]) -> String {
        let named = names.len() == self.params.len();
        let params = self
            .params
            .iter()
            .enumerate()
            .map(|(index, kind)| match names.get(index).filter(|_| named) {
                Some(name) => format!("{kind} {name}"),
                None => kind.to_string(),
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!("{} {method}({params})", self.returns)
    }
}

/// Returns `true` when some alternative accepts `count` arguments.
///
/// Procedures without declared alternatives accept any count.
#[must_use]
pub fn accepts_arity(alternatives: &[Signature], count: usize) -> bool {
    alternatives.is_empty() || alternatives.iter().any(|sig| sig.arity() == count)
}

fn parse_kind(name: &str) -> Result<ValueKind, SignatureError> {
    ValueKind::from_str(name.trim()).map_err(|_| SignatureError::UnknownType {
        name: name.to_owned(),
    })
}
