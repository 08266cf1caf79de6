// lib.rs - πCRM shared core

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_lines)]

pub mod app;
pub mod capabilities;
pub mod config;
pub mod event;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod model;
pub mod preferences;
pub mod screen;
pub mod view;

use serde::{Deserialize, Serialize};

pub use app::App;
pub use capabilities::{Capabilities, Effect};
pub use config::BackendConfig;
pub use crux_core::{render::Render, App as CruxApp};
pub use event::Event;
pub use model::Model;
pub use view::ViewModel;

/// Title written on every report created from the compose sheet.
pub const DEFAULT_REPORT_TITLE: &str = "Untitled Report";
pub const REPORT_PREVIEW_LENGTH: usize = 160;
pub const MAX_REPORT_BODY_LENGTH: usize = 20_000;
pub const MAX_DISPLAY_NAME_LENGTH: usize = 80;
/// Format used for report timestamps on cards and the detail header.
pub const TIMESTAMP_FORMAT: &str = "%d %B, %H:%M";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// No session, or the session could not be resolved. Always fails closed.
    Auth,
    Forbidden,
    Validation,
    Network,
    Backend,
    NotFound,
    Storage,
    Config,
}

impl ErrorKind {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Auth => "AUTH_ERROR",
            Self::Forbidden => "FORBIDDEN",
            Self::Validation => "VALIDATION_ERROR",
            Self::Network => "NETWORK_ERROR",
            Self::Backend => "BACKEND_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::Storage => "STORAGE_ERROR",
            Self::Config => "CONFIG_ERROR",
        }
    }

    /// Whether a user-initiated retry can reasonably succeed.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Network | Self::Backend | Self::Storage)
    }

    #[must_use]
    pub const fn default_message(self) -> &'static str {
        match self {
            Self::Auth => "Your session has expired. Please sign in again.",
            Self::Forbidden => "You don't have permission to perform this action.",
            Self::Validation => "Please check the highlighted field.",
            Self::Network => "Unable to connect. Please check your internet connection and try again.",
            Self::Backend => "The server could not complete the request. Please try again.",
            Self::NotFound => "The requested item could not be found.",
            Self::Storage => "Unable to save your preferences on this device.",
            Self::Config => "The app is not connected to its backend. Please reinstall or contact support.",
        }
    }
}

/// Error state surfaced to the UI.
///
/// `message` is always safe to show; raw backend detail goes to `internal_message`
/// and only ever reaches the log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppError {
    pub kind: ErrorKind,
    pub message: String,
    pub internal_message: Option<String>,
}

impl AppError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            internal_message: None,
        }
    }

    #[must_use]
    pub fn of_kind(kind: ErrorKind) -> Self {
        Self::new(kind, kind.default_message())
    }

    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    #[must_use]
    pub fn with_internal(mut self, internal: impl Into<String>) -> Self {
        self.internal_message = Some(internal.into());
        self
    }

    /// Prefixes the user-facing message with what was being attempted.
    #[must_use]
    pub fn while_doing(mut self, action: &str) -> Self {
        self.message = format!("{action}: {}", self.message);
        self
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.kind.code()
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self.kind, ErrorKind::NotFound)
    }

    #[must_use]
    pub fn user_facing_message(&self) -> String {
        if self.message.trim().is_empty() {
            self.kind.default_message().to_string()
        } else {
            self.message.clone()
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code(), self.message)?;
        if let Some(internal) = &self.internal_message {
            write!(f, " (internal: {internal})")?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_while_doing_wraps_reason() {
        let err = AppError::new(ErrorKind::Network, "connection reset").while_doing("Reports could not be loaded");
        assert_eq!(err.user_facing_message(), "Reports could not be loaded: connection reset");
    }

    #[test]
    fn test_blank_message_falls_back_to_kind_default() {
        let err = AppError::new(ErrorKind::NotFound, "  ");
        assert_eq!(err.user_facing_message(), ErrorKind::NotFound.default_message());
    }

    #[test]
    fn test_display_includes_internal_detail() {
        let err = AppError::of_kind(ErrorKind::Backend).with_internal("PGRST301");
        let rendered = err.to_string();
        assert!(rendered.starts_with("[BACKEND_ERROR]"));
        assert!(rendered.contains("PGRST301"));
        assert!(!err.user_facing_message().contains("PGRST301"));
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(ErrorKind::Network.is_retryable());
        assert!(ErrorKind::Backend.is_retryable());
        assert!(!ErrorKind::Auth.is_retryable());
        assert!(!ErrorKind::Validation.is_retryable());
        assert!(!ErrorKind::NotFound.is_retryable());
    }
}
