//! Per-screen refresh state machine.
//!
//! Every data screen (home list, reports tab, report detail, trend capsule) runs
//! the same protocol: mount, initial fetch, refresh on demand, teardown. Only
//! one fetch per screen may be in flight; extra refresh requests are dropped.
//!
//! There is no real cancellation of shell requests. Each mount gets a fresh
//! [`ScreenInstance`] and each fetch a [`FetchTicket`]; a response is applied
//! only while both still match the live controller.

use serde::{Deserialize, Serialize};

use crate::model::SubscriptionId;
use crate::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenId {
    Home,
    Reports,
    ReportDetail,
    Trend,
}

impl ScreenId {
    pub const ALL: [ScreenId; 4] = [Self::Home, Self::Reports, Self::ReportDetail, Self::Trend];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Home => "home",
            Self::Reports => "reports",
            Self::ReportDetail => "report_detail",
            Self::Trend => "trend",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Phase {
    #[default]
    Idle,
    LoadingInitial,
    Refreshing,
    Loaded,
    Error,
}

impl Phase {
    #[must_use]
    pub const fn is_fetching(self) -> bool {
        matches!(self, Self::LoadingInitial | Self::Refreshing)
    }
}

/// What asked for a refresh. All of them go through the same routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshTrigger {
    PullToRefresh,
    RefreshButton,
    Retry,
    ChangeFeed,
    Focus,
    LocalMutation,
}

impl RefreshTrigger {
    /// Triggers allowed to leave the `Error` phase. Automatic ones wait for
    /// the user; a local mutation counts as the user's own action.
    #[must_use]
    pub const fn is_user_initiated(self) -> bool {
        matches!(
            self,
            Self::PullToRefresh | Self::RefreshButton | Self::Retry | Self::LocalMutation
        )
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PullToRefresh => "pull_to_refresh",
            Self::RefreshButton => "refresh_button",
            Self::Retry => "retry",
            Self::ChangeFeed => "change_feed",
            Self::Focus => "focus",
            Self::LocalMutation => "local_mutation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScreenInstance(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FetchTicket {
    pub instance: ScreenInstance,
    pub seq: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Completion {
    Applied,
    /// The response belonged to a dead instance or a superseded fetch.
    Discarded,
}

/// Data-independent half of a screen controller, usable as a trait object.
pub trait ScreenControl {
    fn phase(&self) -> Phase;
    fn instance(&self) -> Option<ScreenInstance>;
    fn in_flight(&self) -> Option<FetchTicket>;
    fn subscription(&self) -> Option<&SubscriptionId>;
    fn error(&self) -> Option<&AppError>;
    fn has_data(&self) -> bool;

    fn is_mounted(&self) -> bool {
        self.instance().is_some()
    }

    /// Starts a new instance in `LoadingInitial`. The caller tears down any
    /// previous instance first.
    fn mount(&mut self) -> ScreenInstance;

    /// Drops all state and hands back the subscription to cancel, if any.
    /// Calling it again is a no-op.
    fn unmount(&mut self) -> Option<SubscriptionId>;

    /// Reserves the single fetch slot. `None` while another fetch is in flight
    /// or when nothing is mounted.
    fn begin_fetch(&mut self) -> Option<FetchTicket>;

    /// Moves to `Refreshing` (or back to `LoadingInitial` when nothing was ever
    /// loaded) and reserves the fetch slot. Dropped while a fetch is running.
    fn request_refresh(&mut self) -> Option<FetchTicket>;

    /// Records a failed fetch without a typed payload.
    fn fail(&mut self, ticket: FetchTicket, error: AppError) -> Completion;

    fn attach_subscription(&mut self, instance: ScreenInstance, id: SubscriptionId) -> bool;
    fn detach_subscription(&mut self) -> Option<SubscriptionId>;
    fn accepts_signal(&self, instance: ScreenInstance, id: &SubscriptionId) -> bool;
}

#[derive(Debug, Clone)]
pub struct Screen<T> {
    phase: Phase,
    data: Option<T>,
    error: Option<AppError>,
    instance: Option<ScreenInstance>,
    mounts: u64,
    fetches: u64,
    in_flight: Option<FetchTicket>,
    subscription: Option<SubscriptionId>,
}

impl<T> Default for Screen<T> {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            data: None,
            error: None,
            instance: None,
            mounts: 0,
            fetches: 0,
            in_flight: None,
            subscription: None,
        }
    }
}

impl<T> Screen<T> {
    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    /// Applies a fetch result if `ticket` is the live in-flight fetch.
    ///
    /// Success replaces the data wholesale; failure keeps whatever was loaded
    /// before.
    pub fn complete(&mut self, ticket: FetchTicket, result: Result<T, AppError>) -> Completion {
        if self.instance != Some(ticket.instance) || self.in_flight != Some(ticket) {
            return Completion::Discarded;
        }
        self.in_flight = None;
        match result {
            Ok(data) => {
                self.data = Some(data);
                self.error = None;
                self.phase = Phase::Loaded;
            }
            Err(error) => {
                self.error = Some(error);
                self.phase = Phase::Error;
            }
        }
        Completion::Applied
    }
}

impl<T> ScreenControl for Screen<T> {
    fn phase(&self) -> Phase {
        self.phase
    }

    fn instance(&self) -> Option<ScreenInstance> {
        self.instance
    }

    fn in_flight(&self) -> Option<FetchTicket> {
        self.in_flight
    }

    fn subscription(&self) -> Option<&SubscriptionId> {
        self.subscription.as_ref()
    }

    fn error(&self) -> Option<&AppError> {
        self.error.as_ref()
    }

    fn has_data(&self) -> bool {
        self.data.is_some()
    }

    fn mount(&mut self) -> ScreenInstance {
        self.mounts += 1;
        let instance = ScreenInstance(self.mounts);
        self.instance = Some(instance);
        self.phase = Phase::LoadingInitial;
        self.data = None;
        self.error = None;
        self.in_flight = None;
        self.subscription = None;
        instance
    }

    fn unmount(&mut self) -> Option<SubscriptionId> {
        self.instance = None;
        self.phase = Phase::Idle;
        self.data = None;
        self.error = None;
        self.in_flight = None;
        self.subscription.take()
    }

    fn begin_fetch(&mut self) -> Option<FetchTicket> {
        let instance = self.instance?;
        if self.in_flight.is_some() {
            return None;
        }
        self.fetches += 1;
        let ticket = FetchTicket {
            instance,
            seq: self.fetches,
        };
        self.in_flight = Some(ticket);
        Some(ticket)
    }

    fn request_refresh(&mut self) -> Option<FetchTicket> {
        self.instance?;
        if self.phase.is_fetching() || self.in_flight.is_some() {
            return None;
        }
        self.phase = if self.data.is_some() {
            Phase::Refreshing
        } else {
            Phase::LoadingInitial
        };
        self.error = None;
        self.begin_fetch()
    }

    fn fail(&mut self, ticket: FetchTicket, error: AppError) -> Completion {
        self.complete(ticket, Err(error))
    }

    fn attach_subscription(&mut self, instance: ScreenInstance, id: SubscriptionId) -> bool {
        if self.instance != Some(instance) || self.subscription.is_some() {
            return false;
        }
        self.subscription = Some(id);
        true
    }

    fn detach_subscription(&mut self) -> Option<SubscriptionId> {
        self.subscription.take()
    }

    fn accepts_signal(&self, instance: ScreenInstance, id: &SubscriptionId) -> bool {
        self.instance == Some(instance) && self.subscription.as_ref() == Some(id)
    }
}
