//! Credential lifecycle: a cached bearer token refreshed on demand.
//!
//! The manager reads the durable slot on every request and only calls the
//! authentication client when the stored credential is missing or within
//! `skew` of its expiry. Refresh is synchronous and caller-triggered; there
//! is no background renewal.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{Duration, Utc};
use log::{debug, info, warn};

use crate::AuthClient;
use crate::error::BrokerError;
use crate::types::Credential;

/// Default safety margin before expiry, in seconds.
pub const DEFAULT_SKEW_SECS: i64 = 60;

/// Durable slot holding at most one credential.
pub trait CredentialStore {
    fn load(&self) -> Result<Option<Credential>, BrokerError>;
    fn save(&mut self, credential: &Credential) -> Result<(), BrokerError>;
}

/// Process-local slot, mainly for tests.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    slot: Option<Credential>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(credential: Credential) -> Self {
        Self {
            slot: Some(credential),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<Credential>, BrokerError> {
        Ok(self.slot.clone())
    }

    fn save(&mut self, credential: &Credential) -> Result<(), BrokerError> {
        self.slot = Some(credential.clone());
        Ok(())
    }
}

/// JSON file slot that survives process restarts.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<Credential>, BrokerError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(BrokerError::Store(format!(
                    "failed to read {}: {e}",
                    self.path.display()
                )));
            }
        };
        match serde_json::from_str(&contents) {
            Ok(credential) => Ok(Some(credential)),
            Err(e) => {
                // An unreadable slot is as good as an empty one.
                warn!("Ignoring corrupt credential file {}: {e}", self.path.display());
                Ok(None)
            }
        }
    }

    fn save(&mut self, credential: &Credential) -> Result<(), BrokerError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                BrokerError::Store(format!("failed to create {}: {e}", parent.display()))
            })?;
        }
        let json = serde_json::to_string(credential)?;
        fs::write(&self.path, json).map_err(|e| {
            BrokerError::Store(format!("failed to write {}: {e}", self.path.display()))
        })
    }
}

/// Hands out a valid bearer token.
pub trait CredentialProvider {
    /// Cached token if still fresh, otherwise a newly issued one.
    fn credential(&mut self) -> Result<String, BrokerError>;

    /// Issue a new token regardless of the cached one.
    fn refresh(&mut self) -> Result<String, BrokerError>;
}

/// Owns the cached credential and its refresh policy.
pub struct CredentialManager<A, S> {
    auth: A,
    store: S,
    skew: Duration,
}

impl<A: AuthClient, S: CredentialStore> CredentialManager<A, S> {
    pub fn new(auth: A, store: S) -> Self {
        Self {
            auth,
            store,
            skew: Duration::seconds(DEFAULT_SKEW_SECS),
        }
    }

    pub fn with_skew(mut self, skew: Duration) -> Self {
        self.skew = skew;
        self
    }

    pub fn auth(&self) -> &A {
        &self.auth
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Return a token valid for at least `skew`, refreshing if needed.
    ///
    /// Authentication failures propagate unchanged.
    pub fn get_credential(&mut self) -> Result<String, BrokerError> {
        let cached = match self.store.load() {
            Ok(c) => c,
            Err(e) => {
                warn!("Credential store unreadable, refreshing: {e}");
                None
            }
        };

        if let Some(credential) = cached {
            let now = Utc::now();
            if credential.is_fresh(now, self.skew) {
                debug!(
                    "Using cached credential ({}s left)",
                    credential.expires_in(now).num_seconds()
                );
                return Ok(credential.token);
            }
            debug!("Cached credential stale, refreshing");
        }

        self.force_refresh()
    }

    /// Obtain a new credential and overwrite the stored one.
    pub fn force_refresh(&mut self) -> Result<String, BrokerError> {
        let credential = self.auth.request_credential()?;
        self.store.save(&credential)?;
        info!("Credential refreshed, expires at {}", credential.expires_at);
        Ok(credential.token)
    }
}

impl<A: AuthClient, S: CredentialStore> CredentialProvider for CredentialManager<A, S> {
    fn credential(&mut self) -> Result<String, BrokerError> {
        self.get_credential()
    }

    fn refresh(&mut self) -> Result<String, BrokerError> {
        self.force_refresh()
    }
}

/// Cloneable handle to one credential provider, shared by every client
/// that needs an authorization header.
#[derive(Clone)]
pub struct Credentials {
    inner: Arc<Mutex<Box<dyn CredentialProvider + Send>>>,
}

impl Credentials {
    pub fn new<P: CredentialProvider + Send + 'static>(provider: P) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(provider))),
        }
    }

    pub fn token(&self) -> Result<String, BrokerError> {
        self.lock().credential()
    }

    pub fn refresh(&self) -> Result<String, BrokerError> {
        self.lock().refresh()
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn CredentialProvider + Send>> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            warn!("Credential mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}
