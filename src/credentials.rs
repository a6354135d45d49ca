//! Outbound credentials and the round-robin rotator used for fallback sends.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// An opaque bot token identifying one outbound sending identity.
///
/// The raw token is only reachable through [`Credential::expose`]; `Debug`
/// and `Display` print a redacted form so tokens never end up in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(Arc<str>);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Arc::from(token.into()))
    }

    /// Returns the raw token for building request URLs.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// The bot id part of a `<id>:<secret>` token, or `***` if there is none.
    pub fn redacted(&self) -> String {
        match self.0.split_once(':') {
            Some((id, _)) if !id.is_empty() => format!("{}:***", id),
            _ => "***".to_string(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Credential").field(&self.redacted()).finish()
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("at least one credential is required")]
    Empty,
}

/// Yields credentials in a fixed round-robin order, forever.
///
/// Backed by a fixed array and an atomic cursor, so concurrent callers never
/// skip or repeat a slot within one rotation.
#[derive(Debug)]
pub struct CredentialRotator {
    credentials: Box<[Credential]>,
    cursor: AtomicUsize,
}

impl CredentialRotator {
    pub fn new(credentials: Vec<Credential>) -> Result<Self, CredentialError> {
        if credentials.is_empty() {
            return Err(CredentialError::Empty);
        }
        Ok(Self {
            credentials: credentials.into_boxed_slice(),
            cursor: AtomicUsize::new(0),
        })
    }

    /// Builds a rotator from raw token strings.
    pub fn from_tokens<I, S>(tokens: I) -> Result<Self, CredentialError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(tokens.into_iter().map(Credential::new).collect())
    }

    /// Returns the next credential in rotation.
    pub fn next(&self) -> Credential {
        let slot = self.cursor.fetch_add(1, Ordering::Relaxed) % self.credentials.len();
        self.credentials[slot].clone()
    }

    /// Number of credentials in the pool, which is also the fallback budget.
    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    /// Index of the slot the next call to [`next`](Self::next) will return.
    pub fn position(&self) -> usize {
        self.cursor.load(Ordering::Relaxed) % self.credentials.len()
    }
}
