use crux_core::capability::{CapabilityContext, Operation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{AppError, ErrorKind};

pub const MAX_KEY_LENGTH: usize = 512;
pub const MAX_VALUE_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KvKey {
    namespace: KeyNamespace,
    key: String,
}

impl KvKey {
    pub fn new(namespace: KeyNamespace, key: impl Into<String>) -> Result<Self, KvError> {
        let key = key.into();
        Self::validate_key(&key)?;
        Ok(Self { namespace, key })
    }

    /// Storage key as written by the shell, `<namespace>:<key>`.
    pub fn raw(&self) -> String {
        format!("{}:{}", self.namespace.prefix(), self.key)
    }

    pub fn namespace(&self) -> KeyNamespace {
        self.namespace
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    fn validate_key(key: &str) -> Result<(), KvError> {
        if key.is_empty() {
            return Err(KvError::InvalidKey {
                key: key.to_string(),
                reason: "key cannot be empty".to_string(),
            });
        }

        if key.len() > MAX_KEY_LENGTH {
            return Err(KvError::InvalidKey {
                key: key.chars().take(50).collect::<String>() + "...",
                reason: format!("key exceeds maximum length of {MAX_KEY_LENGTH} bytes"),
            });
        }

        if key.trim().is_empty() {
            return Err(KvError::InvalidKey {
                key: key.to_string(),
                reason: "key cannot be only whitespace".to_string(),
            });
        }

        if key.contains("..") {
            return Err(KvError::InvalidKey {
                key: key.to_string(),
                reason: "key cannot contain path traversal sequences".to_string(),
            });
        }

        if key.starts_with('/') || key.starts_with('\\') {
            return Err(KvError::InvalidKey {
                key: key.to_string(),
                reason: "key cannot start with path separator".to_string(),
            });
        }

        if key.chars().any(char::is_control) {
            return Err(KvError::InvalidKey {
                key: key.escape_default().to_string(),
                reason: "key contains control characters".to_string(),
            });
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyNamespace {
    Session,
    Settings,
}

impl KeyNamespace {
    pub fn prefix(self) -> &'static str {
        match self {
            KeyNamespace::Session => "session",
            KeyNamespace::Settings => "settings",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KvOperation {
    Get { key: KvKey },
    Set { key: KvKey, value: String },
    Delete { key: KvKey },
}

impl KvOperation {
    pub fn key(&self) -> &KvKey {
        match self {
            KvOperation::Get { key } | KvOperation::Set { key, .. } | KvOperation::Delete { key } => {
                key
            }
        }
    }
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum KvError {
    #[error("invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("value too large: {size} bytes exceeds maximum of {max} bytes")]
    ValueTooLarge { size: usize, max: usize },

    #[error("storage error: {message} (retryable: {retryable})")]
    Storage { message: String, retryable: bool },

    #[error("unexpected storage output, expected {expected}")]
    UnexpectedOutput { expected: String },
}

impl KvError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, KvError::Storage { retryable: true, .. })
    }
}

impl From<KvError> for AppError {
    fn from(e: KvError) -> Self {
        AppError::of_kind(ErrorKind::Storage).with_internal(e.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum KvOutput {
    Value(Option<String>),
    Written,
    Deleted { existed: bool },
}

pub type KvResult = Result<KvOutput, KvError>;

impl Operation for KvOperation {
    type Output = KvResult;
}

/// Small string preferences in the device's local key-value store.
#[derive(crux_core::macros::Capability)]
pub struct Preferences<Ev> {
    context: CapabilityContext<KvOperation, Ev>,
}

impl<Ev> Preferences<Ev>
where
    Ev: 'static,
{
    pub fn new(context: CapabilityContext<KvOperation, Ev>) -> Self {
        Self { context }
    }

    pub fn get<F>(&self, key: KvKey, make_event: F)
    where
        F: FnOnce(Result<Option<String>, KvError>) -> Ev + Send + 'static,
    {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            let result = match ctx.request_from_shell(KvOperation::Get { key }).await {
                Ok(KvOutput::Value(value)) => Ok(value),
                Ok(_) => Err(KvError::UnexpectedOutput {
                    expected: "value".to_string(),
                }),
                Err(e) => Err(e),
            };
            ctx.update_app(make_event(result));
        });
    }

    /// Oversized values are rejected here without reaching the shell.
    pub fn set<F>(&self, key: KvKey, value: String, make_event: F)
    where
        F: FnOnce(Result<(), KvError>) -> Ev + Send + 'static,
    {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            let result = if value.len() > MAX_VALUE_SIZE {
                Err(KvError::ValueTooLarge {
                    size: value.len(),
                    max: MAX_VALUE_SIZE,
                })
            } else {
                match ctx.request_from_shell(KvOperation::Set { key, value }).await {
                    Ok(KvOutput::Written) => Ok(()),
                    Ok(_) => Err(KvError::UnexpectedOutput {
                        expected: "written".to_string(),
                    }),
                    Err(e) => Err(e),
                }
            };
            ctx.update_app(make_event(result));
        });
    }

    /// Resolves to whether the key existed.
    pub fn remove<F>(&self, key: KvKey, make_event: F)
    where
        F: FnOnce(Result<bool, KvError>) -> Ev + Send + 'static,
    {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            let result = match ctx.request_from_shell(KvOperation::Delete { key }).await {
                Ok(KvOutput::Deleted { existed }) => Ok(existed),
                Ok(_) => Err(KvError::UnexpectedOutput {
                    expected: "deleted".to_string(),
                }),
                Err(e) => Err(e),
            };
            ctx.update_app(make_event(result));
        });
    }
}
