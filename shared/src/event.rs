use serde::{Deserialize, Serialize};

use crate::capabilities::{AuthError, ChangeSignal, KvError, StoreError};
use crate::config::BackendConfig;
use crate::model::{Report, ReportId, Route, Secret, Session, SubscriptionId, Theme, TrendSnapshot};
use crate::preferences::PreferenceKey;
use crate::screen::{FetchTicket, RefreshTrigger, ScreenId, ScreenInstance};

// --- Event enum: large variants boxed ---

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum Event {
    // Start-up
    Start {
        config: Box<BackendConfig>,
        system_theme: Option<Theme>,
    },
    PreferenceLoaded {
        key: PreferenceKey,
        result: Result<Option<String>, KvError>,
    },
    PreferenceWritten {
        key: PreferenceKey,
        result: Result<(), KvError>,
    },
    PreferenceRemoved {
        key: PreferenceKey,
        result: Result<bool, KvError>,
    },
    ThemeToggled,

    // Session
    SignInRequested {
        email: String,
        password: Secret,
        remember: bool,
    },
    SignInCompleted {
        result: Result<Option<Session>, AuthError>,
    },
    SignOutRequested,
    SignOutCompleted {
        result: Result<(), AuthError>,
    },
    DisplayNameSubmitted {
        display_name: String,
    },
    DisplayNameUpdated {
        result: Result<Option<Session>, AuthError>,
    },
    ProfileRowUpdated {
        result: Result<(), StoreError>,
    },
    /// Auth state changed outside the core (token refresh, sign-out or a
    /// different account signing in).
    SessionChanged {
        result: Result<Option<Session>, AuthError>,
    },
    SessionProbed {
        screen: ScreenId,
        instance: ScreenInstance,
        result: Result<Option<Session>, AuthError>,
    },

    // Navigation & screen lifecycle
    Navigated(Route),
    ScreenMounted(ScreenId),
    ScreenUnmounted(ScreenId),
    ScreenFocused(ScreenId),

    // Refresh
    RefreshRequested {
        screen: ScreenId,
        trigger: RefreshTrigger,
    },
    ChangeNotified {
        screen: ScreenId,
        instance: ScreenInstance,
        subscription: SubscriptionId,
        signal: ChangeSignal,
    },
    ReportsFetched {
        screen: ScreenId,
        ticket: FetchTicket,
        result: Result<Vec<Report>, StoreError>,
    },
    ReportFetched {
        ticket: FetchTicket,
        result: Box<Result<Report, StoreError>>,
    },
    TrendFetched {
        ticket: FetchTicket,
        result: Result<Option<TrendSnapshot>, StoreError>,
    },

    // Compose
    ComposeOpened,
    DraftChanged(String),
    ComposeSubmitted,
    ComposeDismissed,
    ReportCreated {
        result: Box<Result<Report, StoreError>>,
    },

    // Delete
    DeleteRequested,
    DeleteConfirmed,
    DeleteCancelled,
    ReportDeleted {
        id: ReportId,
        result: Result<ReportId, StoreError>,
    },

    NoticeDismissed,
}

impl Event {
    /// Variant name for log fields. Never includes payloads.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::PreferenceLoaded { .. } => "preference_loaded",
            Self::PreferenceWritten { .. } => "preference_written",
            Self::PreferenceRemoved { .. } => "preference_removed",
            Self::ThemeToggled => "theme_toggled",
            Self::SignInRequested { .. } => "sign_in_requested",
            Self::SignInCompleted { .. } => "sign_in_completed",
            Self::SignOutRequested => "sign_out_requested",
            Self::SignOutCompleted { .. } => "sign_out_completed",
            Self::DisplayNameSubmitted { .. } => "display_name_submitted",
            Self::DisplayNameUpdated { .. } => "display_name_updated",
            Self::ProfileRowUpdated { .. } => "profile_row_updated",
            Self::SessionChanged { .. } => "session_changed",
            Self::SessionProbed { .. } => "session_probed",
            Self::Navigated(_) => "navigated",
            Self::ScreenMounted(_) => "screen_mounted",
            Self::ScreenUnmounted(_) => "screen_unmounted",
            Self::ScreenFocused(_) => "screen_focused",
            Self::RefreshRequested { .. } => "refresh_requested",
            Self::ChangeNotified { .. } => "change_notified",
            Self::ReportsFetched { .. } => "reports_fetched",
            Self::ReportFetched { .. } => "report_fetched",
            Self::TrendFetched { .. } => "trend_fetched",
            Self::ComposeOpened => "compose_opened",
            Self::DraftChanged(_) => "draft_changed",
            Self::ComposeSubmitted => "compose_submitted",
            Self::ComposeDismissed => "compose_dismissed",
            Self::ReportCreated { .. } => "report_created",
            Self::DeleteRequested => "delete_requested",
            Self::DeleteConfirmed => "delete_confirmed",
            Self::DeleteCancelled => "delete_cancelled",
            Self::ReportDeleted { .. } => "report_deleted",
            Self::NoticeDismissed => "notice_dismissed",
        }
    }

    /// Events handled before a valid configuration exists.
    #[must_use]
    pub const fn is_startup(&self) -> bool {
        matches!(self, Self::Start { .. })
    }
}
