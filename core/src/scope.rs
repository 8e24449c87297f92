//! Scopes and the delivery authorizer.
//!
//! A scope is declared twice for every delivery: once by the listener when it
//! registers (the scope it *accepts*) and once by the sender when it emits (the
//! scope it *claims*). The [`ScopeAuthorizer`] decides whether the pair lets the
//! message through.

use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

/// Authorization context attached to a send or a listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Scope identified by name; two named scopes match when the names are equal.
    Named(String),
    /// Unforgeable scope object; two tokens match only when they are the same token.
    Token(ScopeToken),
}

impl Scope {
    pub fn named(name: impl Into<String>) -> Self {
        Scope::Named(name.into())
    }

    pub fn token(label: impl Into<String>) -> Self {
        Scope::Token(ScopeToken::new(label))
    }
}

impl From<&str> for Scope {
    fn from(name: &str) -> Self {
        Scope::Named(name.to_string())
    }
}

impl From<String> for Scope {
    fn from(name: String) -> Self {
        Scope::Named(name)
    }
}

impl From<ScopeToken> for Scope {
    fn from(token: ScopeToken) -> Self {
        Scope::Token(token)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Named(name) => f.write_str(name),
            Scope::Token(token) => write!(f, "token:{}", token.label()),
        }
    }
}

impl Serialize for Scope {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Opaque scope object compared by identity.
///
/// Clones share identity; two tokens created separately never match, even with
/// the same label. The label only exists for logs and history.
#[derive(Clone)]
pub struct ScopeToken {
    inner: Arc<str>,
}

impl ScopeToken {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            inner: Arc::from(label.into()),
        }
    }

    pub fn label(&self) -> &str {
        &self.inner
    }
}

impl PartialEq for ScopeToken {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for ScopeToken {}

impl fmt::Debug for ScopeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ScopeToken").field(&self.label()).finish()
    }
}

/// Predicate deciding whether a delivery may reach a listener.
///
/// `accepted` is the scope the listener declared, `emitted` the scope the
/// sender declared. Implementations must be pure.
pub trait ScopeAuthorizer: Send + Sync {
    fn is_authorized(&self, accepted: Option<&Scope>, emitted: Option<&Scope>) -> bool;
}

impl<F> ScopeAuthorizer for F
where
    F: Fn(Option<&Scope>, Option<&Scope>) -> bool + Send + Sync,
{
    fn is_authorized(&self, accepted: Option<&Scope>, emitted: Option<&Scope>) -> bool {
        self(accepted, emitted)
    }
}

/// Default authorizer.
///
/// No scope on either side means the implicit self scope, which only matches
/// itself. Named scopes match by name, tokens by identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScopeMatch;

impl ScopeAuthorizer for ScopeMatch {
    fn is_authorized(&self, accepted: Option<&Scope>, emitted: Option<&Scope>) -> bool {
        match (accepted, emitted) {
            (None, None) => true,
            (Some(Scope::Named(a)), Some(Scope::Named(e))) => a == e,
            (Some(Scope::Token(a)), Some(Scope::Token(e))) => a == e,
            _ => false,
        }
    }
}
