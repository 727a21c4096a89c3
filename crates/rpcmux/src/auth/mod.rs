//! Seams to the authentication and authorization collaborators.
//!
//! Authentication happens upstream: the transport resolves a
//! [`CallerIdentity`] (from a session, a token, HTTP basic auth...) before the
//! dispatcher sees the request. The dispatcher only asks an [`Authorizer`]
//! whether that identity holds a procedure's permission token. The optional
//! [`Authenticator`] backs the `system.login` / `system.logout` built-ins.

use std::fmt;

use thiserror::Error;

/// Opaque identity of the current caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallerIdentity {
    subject: String,
}

impl CallerIdentity {
    /// Wraps a subject supplied by the authentication collaborator.
    #[must_use]
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
        }
    }

    /// Subject string, meaningful only to the collaborators.
    #[must_use]
    pub fn subject(&self) -> &str {
        self.subject.as_str()
    }
}

/// Capability check consulted before invoking protected procedures.
pub trait Authorizer: Send + Sync {
    /// Returns `true` when `caller` holds `permission`.
    fn has_permission(&self, caller: &CallerIdentity, permission: &str) -> bool;
}

impl<F> Authorizer for F
where
    F: Fn(&CallerIdentity, &str) -> bool + Send + Sync,
{
    fn has_permission(&self, caller: &CallerIdentity, permission: &str) -> bool {
        self(caller, permission)
    }
}

/// Username and password passed to `system.login`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    /// Creates a credential pair.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Account name.
    #[must_use]
    pub fn username(&self) -> &str {
        self.username.as_str()
    }

    /// Secret.
    #[must_use]
    pub fn password(&self) -> &str {
        self.password.as_str()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Rejected login attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("authentication failed: {reason}")]
pub struct AuthFailure {
    reason: String,
}

impl AuthFailure {
    /// Creates a failure with a reason suitable for logs.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// Reason the login was refused.
    #[must_use]
    pub fn reason(&self) -> &str {
        self.reason.as_str()
    }
}

/// Login backend used by the out-of-the-box `system.login` procedure.
pub trait Authenticator: Send + Sync {
    /// Verifies credentials and yields the identity to establish.
    ///
    /// # Errors
    ///
    /// Returns [`AuthFailure`] when the credentials are rejected or the
    /// account is inactive.
    fn login(&self, credentials: &Credentials) -> Result<CallerIdentity, AuthFailure>;

    /// Ends whatever the backend associates with `caller`.
    fn logout(&self, caller: &CallerIdentity);
}

/// Session transition requested by a login or logout call.
///
/// The transport layer applies it (for example by issuing or clearing a
/// session cookie) after delivering the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionChange {
    /// A login succeeded for this identity.
    Established(CallerIdentity),
    /// The current session was logged out.
    Ended,
}
