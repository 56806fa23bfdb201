// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Secret
// ---------------------------------------------------------------------------

/// A decrypted secret value.
///
/// Both `Debug` and the serde representation redact the value; only
/// [`expose`](Secret::expose) reads it, at the call site that injects it
/// into a sandbox.
#[derive(Clone, Serialize)]
pub struct Secret {
    #[serde(skip)]
    value: String,
    /// Credential id this secret resolves.
    pub credential_id: String,
}

impl Secret {
    /// Wrap a decrypted value.
    #[must_use]
    pub fn new(credential_id: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            credential_id: credential_id.into(),
            value: value.into(),
        }
    }

    /// Read the decrypted value.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.value
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secret")
            .field("credential_id", &self.credential_id)
            .field("value", &"[redacted]")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Errors & health
// ---------------------------------------------------------------------------

/// Errors from credential resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    /// The credential id is not enrolled.
    #[error("credential \"{credential_id}\" is not enrolled")]
    Missing {
        /// The unresolvable id.
        credential_id: String,
    },
}

impl CredentialError {
    /// The taxonomy code for this error.
    #[must_use]
    pub fn error_code(&self) -> agw_error::ErrorCode {
        match self {
            Self::Missing { .. } => agw_error::ErrorCode::CredentialMissing,
        }
    }
}

/// Health report for a credential store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialHealth {
    /// Whether the store can serve lookups at all.
    pub healthy: bool,
    /// Enrolled credential count.
    pub enrolled: usize,
    /// When the store last served a successful resolution.
    pub last_resolved_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// CredentialStore
// ---------------------------------------------------------------------------

/// The lookup contract the core consumes.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Resolve a credential id to its decrypted secret.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Missing`] when the id is not enrolled.
    async fn resolve(&self, credential_id: &str) -> Result<Secret, CredentialError>;

    /// Report store health.
    async fn health(&self) -> CredentialHealth;
}

/// In-memory store for tests and single-process deployments.
#[derive(Default)]
pub struct MemoryCredentialStore {
    secrets: Mutex<HashMap<String, String>>,
    last_resolved_at: Mutex<Option<DateTime<Utc>>>,
}

impl MemoryCredentialStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enroll (or replace) a credential.
    pub fn enroll(&self, credential_id: impl Into<String>, value: impl Into<String>) {
        self.secrets
            .lock()
            .expect("store lock poisoned")
            .insert(credential_id.into(), value.into());
    }

    /// Remove a credential.
    pub fn revoke(&self, credential_id: &str) {
        self.secrets
            .lock()
            .expect("store lock poisoned")
            .remove(credential_id);
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn resolve(&self, credential_id: &str) -> Result<Secret, CredentialError> {
        let value = self
            .secrets
            .lock()
            .expect("store lock poisoned")
            .get(credential_id)
            .cloned();
        match value {
            Some(value) => {
                *self.last_resolved_at.lock().expect("store lock poisoned") = Some(Utc::now());
                Ok(Secret::new(credential_id, value))
            }
            None => Err(CredentialError::Missing {
                credential_id: credential_id.to_string(),
            }),
        }
    }

    async fn health(&self) -> CredentialHealth {
        CredentialHealth {
            healthy: true,
            enrolled: self.secrets.lock().expect("store lock poisoned").len(),
            last_resolved_at: *self.last_resolved_at.lock().expect("store lock poisoned"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
