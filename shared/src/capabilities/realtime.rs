use crux_core::capability::{CapabilityContext, Operation};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::store::OwnerScope;
use crate::model::SubscriptionId;
use crate::{AppError, ErrorKind};

/// Table plus owner filter a subscription listens on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeScope {
    pub collection: String,
    pub owner: OwnerScope,
}

impl ChangeScope {
    #[must_use]
    pub fn new(collection: &str, owner: OwnerScope) -> Self {
        Self {
            collection: collection.to_string(),
            owner,
        }
    }

    /// Row filter in the backend's realtime syntax, e.g. `user_id=eq.<id>`.
    #[must_use]
    pub fn filter(&self) -> String {
        format!("user_id=eq.{}", self.owner.owner_id())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeFeedOperation {
    Subscribe { id: SubscriptionId, scope: ChangeScope },
    Unsubscribe { id: SubscriptionId },
}

/// One delivery from the change feed. Payloads are never forwarded; a change
/// only means "fetch again".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeSignal {
    Changed,
    Closed { reason: Option<String> },
}

impl Operation for ChangeFeedOperation {
    type Output = ChangeSignal;
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChangeFeedError {
    #[error("change feed closed: {reason}")]
    Closed { reason: String },
}

impl From<ChangeFeedError> for AppError {
    fn from(e: ChangeFeedError) -> Self {
        AppError::new(
            ErrorKind::Network,
            "Live updates stopped. Pull to refresh for the latest data.",
        )
        .with_internal(e.to_string())
    }
}

/// Per-table realtime subscriptions.
#[derive(crux_core::macros::Capability)]
pub struct ChangeFeed<Ev> {
    context: CapabilityContext<ChangeFeedOperation, Ev>,
}

impl<Ev> ChangeFeed<Ev>
where
    Ev: 'static,
{
    pub fn new(context: CapabilityContext<ChangeFeedOperation, Ev>) -> Self {
        Self { context }
    }

    /// Opens a subscription. Every signal becomes one event; the stream ends
    /// after the shell reports it closed.
    pub fn subscribe<F>(&self, id: SubscriptionId, scope: ChangeScope, make_event: F)
    where
        F: Fn(ChangeSignal) -> Ev + Send + 'static,
    {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            let mut signals =
                Box::pin(ctx.stream_from_shell(ChangeFeedOperation::Subscribe { id, scope }));
            while let Some(signal) = signals.next().await {
                let closed = matches!(signal, ChangeSignal::Closed { .. });
                ctx.update_app(make_event(signal));
                if closed {
                    break;
                }
            }
        });
    }

    pub fn cancel(&self, id: SubscriptionId) {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            ctx.notify_shell(ChangeFeedOperation::Unsubscribe { id }).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Session, UserId};

    #[test]
    fn test_filter_targets_owner_column() {
        let owner = OwnerScope::of(&Session {
            user_id: UserId::new("u-42"),
            email: "ada@example.com".into(),
            display_name: None,
        });
        let scope = ChangeScope::new("Reports", owner);
        assert_eq!(scope.filter(), "user_id=eq.u-42");
        assert_eq!(scope.collection, "Reports");
    }

    #[test]
    fn test_closed_feed_surfaces_as_network_notice() {
        let err: AppError = ChangeFeedError::Closed {
            reason: "CHANNEL_ERROR".into(),
        }
        .into();
        assert_eq!(err.kind, ErrorKind::Network);
        assert!(!err.user_facing_message().contains("CHANNEL_ERROR"));
    }
}
