use crux_core::capability::{CapabilityContext, Operation};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{Secret, Session};
use crate::{AppError, ErrorKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthOperation {
    GetSession,
    /// Long-lived: the shell answers with the current session whenever the
    /// auth client reports a sign-in, sign-out, refresh or account switch.
    WatchSession,
    SignIn { email: String, password: Secret },
    SignOut,
    UpdateDisplayName { display_name: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthOutput {
    Session(Option<Session>),
    SignedOut,
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("session expired")]
    SessionExpired,

    #[error("network error: {message}")]
    Network { message: String },

    #[error("auth backend error: {message}")]
    Backend { message: String },

    #[error("unexpected auth output for {operation}")]
    UnexpectedOutput { operation: String },
}

impl AuthError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::Network { .. } | AuthError::Backend { .. })
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        let internal = e.to_string();
        match e {
            AuthError::InvalidCredentials => {
                AppError::new(ErrorKind::Auth, "Incorrect email or password.")
            }
            AuthError::SessionExpired => AppError::of_kind(ErrorKind::Auth),
            AuthError::Network { .. } => AppError::of_kind(ErrorKind::Network),
            AuthError::Backend { .. } | AuthError::UnexpectedOutput { .. } => {
                AppError::of_kind(ErrorKind::Backend)
            }
        }
        .with_internal(internal)
    }
}

pub type AuthResult = Result<AuthOutput, AuthError>;

impl Operation for AuthOperation {
    type Output = AuthResult;
}

fn into_session(result: AuthResult, operation: &str) -> Result<Option<Session>, AuthError> {
    match result? {
        AuthOutput::Session(session) => Ok(session),
        AuthOutput::SignedOut => Err(AuthError::UnexpectedOutput {
            operation: operation.to_string(),
        }),
    }
}

/// Session resolver backed by the shell's auth client.
#[derive(crux_core::macros::Capability)]
pub struct Auth<Ev> {
    context: CapabilityContext<AuthOperation, Ev>,
}

impl<Ev> Auth<Ev>
where
    Ev: 'static,
{
    pub fn new(context: CapabilityContext<AuthOperation, Ev>) -> Self {
        Self { context }
    }

    /// Probes for the current identity. `Ok(None)` means nobody is signed in.
    pub fn get_session<F>(&self, make_event: F)
    where
        F: FnOnce(Result<Option<Session>, AuthError>) -> Ev + Send + 'static,
    {
        self.request_session(AuthOperation::GetSession, "get_session", make_event);
    }

    /// Follows auth state changes made outside the core, one event per change.
    pub fn watch_session<F>(&self, make_event: F)
    where
        F: Fn(Result<Option<Session>, AuthError>) -> Ev + Send + 'static,
    {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            let mut changes = Box::pin(ctx.stream_from_shell(AuthOperation::WatchSession));
            while let Some(output) = changes.next().await {
                ctx.update_app(make_event(into_session(output, "watch_session")));
            }
        });
    }

    pub fn sign_in<F>(&self, email: String, password: Secret, make_event: F)
    where
        F: FnOnce(Result<Option<Session>, AuthError>) -> Ev + Send + 'static,
    {
        self.request_session(AuthOperation::SignIn { email, password }, "sign_in", make_event);
    }

    /// Writes `display_name` into the user's metadata and returns the
    /// refreshed session.
    pub fn update_display_name<F>(&self, display_name: String, make_event: F)
    where
        F: FnOnce(Result<Option<Session>, AuthError>) -> Ev + Send + 'static,
    {
        self.request_session(
            AuthOperation::UpdateDisplayName { display_name },
            "update_display_name",
            make_event,
        );
    }

    pub fn sign_out<F>(&self, make_event: F)
    where
        F: FnOnce(Result<(), AuthError>) -> Ev + Send + 'static,
    {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            let result = match ctx.request_from_shell(AuthOperation::SignOut).await {
                Ok(AuthOutput::SignedOut) => Ok(()),
                Ok(AuthOutput::Session(_)) => Err(AuthError::UnexpectedOutput {
                    operation: "sign_out".to_string(),
                }),
                Err(e) => Err(e),
            };
            ctx.update_app(make_event(result));
        });
    }

    fn request_session<F>(&self, operation: AuthOperation, name: &'static str, make_event: F)
    where
        F: FnOnce(Result<Option<Session>, AuthError>) -> Ev + Send + 'static,
    {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            let output = ctx.request_from_shell(operation).await;
            ctx.update_app(make_event(into_session(output, name)));
        });
    }
}
