use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;
use uuid::Uuid;
use zeroize::Zeroize;

use crate::config::BackendConfig;
use crate::screen::{Screen, ScreenControl, ScreenId};
use crate::AppError;

// --- Secret wrapper: redacts Debug, zeroizes on Drop ---

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

// --- Typed IDs ---

macro_rules! typed_id {
    ($name:ident) => {
        #[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

typed_id!(ReportId);
typed_id!(UserId);
typed_id!(SubscriptionId);

impl SubscriptionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

// --- Records ---

/// A report row. Field names on the wire follow the backend table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub id: ReportId,
    #[serde(rename = "user_id")]
    pub owner_id: UserId,
    pub title: String,
    #[serde(rename = "report")]
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl Report {
    #[must_use]
    pub fn is_owned_by(&self, user_id: &UserId) -> bool {
        &self.owner_id == user_id
    }

    #[must_use]
    pub fn preview(&self, max_chars: usize) -> String {
        let body = self.body.trim();
        if body.chars().count() <= max_chars {
            return body.to_string();
        }
        let cut: String = body.chars().take(max_chars).collect();
        format!("{}…", cut.trim_end())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendSnapshot {
    #[serde(rename = "user_id")]
    pub owner_id: UserId,
    #[serde(rename = "trends")]
    pub value: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: UserId,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Applies the listing invariants to rows returned by the backend: only the
/// owner's rows survive, newest first.
pub fn normalize_listing(owner: &UserId, rows: Vec<Report>) -> Vec<Report> {
    let total = rows.len();
    let mut reports: Vec<Report> = rows.into_iter().filter(|r| r.is_owned_by(owner)).collect();
    if reports.len() != total {
        warn!(
            dropped = total - reports.len(),
            "listing contained rows for another owner"
        );
    }
    reports.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
    reports
}

// --- Preferences ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "light" => Some(Self::Light),
            "dark" => Some(Self::Dark),
            _ => None,
        }
    }

    #[must_use]
    pub const fn toggle(self) -> Self {
        match self {
            Self::Light => Self::Dark,
            Self::Dark => Self::Light,
        }
    }
}

// --- Navigation ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "route", content = "id", rename_all = "snake_case")]
pub enum Route {
    #[default]
    Launch,
    SignIn,
    Home,
    Reports,
    ReportDetail(ReportId),
    Settings,
}

impl Route {
    #[must_use]
    pub const fn requires_session(&self) -> bool {
        !matches!(self, Self::Launch | Self::SignIn)
    }
}

// --- Local flows ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ComposePhase {
    #[default]
    Closed,
    Editing,
    Submitting,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComposeState {
    pub phase: ComposePhase,
    pub draft: String,
    pub error: Option<AppError>,
}

impl ComposeState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DeleteFlow {
    #[default]
    Idle,
    AwaitingConfirmation,
    Deleting,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignInState {
    pub pending: bool,
    /// Email of the pending attempt, kept for "remember me".
    pub email: String,
    pub remember: bool,
    pub error: Option<AppError>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileState {
    pub saving: bool,
    pub saved: bool,
    /// Trimmed name being written, kept until the profile row is updated.
    pub pending: Option<String>,
    pub error: Option<AppError>,
}

// --- Model ---

#[derive(Debug, Default)]
pub struct Model {
    pub config: Option<BackendConfig>,
    pub fatal_error: Option<AppError>,
    pub route: Route,
    pub session: Option<Session>,
    pub theme: Theme,
    pub remembered_email: Option<String>,
    pub home: Screen<Vec<Report>>,
    pub reports: Screen<Vec<Report>>,
    pub detail: Screen<Report>,
    pub detail_target: Option<ReportId>,
    pub trend: Screen<Option<TrendSnapshot>>,
    pub compose: ComposeState,
    pub delete: DeleteFlow,
    pub sign_in: SignInState,
    pub profile: ProfileState,
    /// Transient, dismissible error that does not belong to a screen.
    pub notice: Option<AppError>,
}

impl Model {
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    #[must_use]
    pub fn owner_id(&self) -> Option<&UserId> {
        self.session.as_ref().map(|s| &s.user_id)
    }

    pub fn screen(&self, id: ScreenId) -> &dyn ScreenControl {
        match id {
            ScreenId::Home => &self.home,
            ScreenId::Reports => &self.reports,
            ScreenId::ReportDetail => &self.detail,
            ScreenId::Trend => &self.trend,
        }
    }

    pub fn screen_mut(&mut self, id: ScreenId) -> &mut dyn ScreenControl {
        match id {
            ScreenId::Home => &mut self.home,
            ScreenId::Reports => &mut self.reports,
            ScreenId::ReportDetail => &mut self.detail,
            ScreenId::Trend => &mut self.trend,
        }
    }

    pub fn list_screen_mut(&mut self, id: ScreenId) -> Option<&mut Screen<Vec<Report>>> {
        match id {
            ScreenId::Home => Some(&mut self.home),
            ScreenId::Reports => Some(&mut self.reports),
            ScreenId::ReportDetail | ScreenId::Trend => None,
        }
    }

    /// The report on the detail screen, if the viewer may delete it.
    #[must_use]
    pub fn deletable_report(&self) -> Option<&Report> {
        let owner = self.owner_id()?;
        self.detail.data().filter(|r| r.is_owned_by(owner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn report(id: &str, owner: &str, secs: i64) -> Report {
        Report {
            id: ReportId::new(id),
            owner_id: UserId::new(owner),
            title: "Untitled Report".into(),
            body: format!("body of {id}"),
            created_at: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    #[test]
    fn test_report_wire_names() {
        let json = serde_json::json!({
            "id": "r1",
            "user_id": "u1",
            "title": "Untitled Report",
            "report": "Q3 numbers look strong",
            "created_at": "2024-05-01T10:00:00Z"
        });
        let parsed: Report = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.owner_id, UserId::new("u1"));
        assert_eq!(parsed.body, "Q3 numbers look strong");
    }

    #[test]
    fn test_trend_wire_names() {
        let json = serde_json::json!({
            "user_id": "u1",
            "trends": "Pipeline up 12%",
            "created_at": "2024-05-01T10:00:00+00:00"
        });
        let parsed: TrendSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.value, "Pipeline up 12%");
    }

    #[test]
    fn test_normalize_sorts_newest_first_and_drops_foreign_rows() {
        let rows = vec![
            report("a", "u1", 10),
            report("b", "u2", 50),
            report("c", "u1", 30),
            report("d", "u1", 20),
        ];
        let ids: Vec<_> = normalize_listing(&UserId::new("u1"), rows)
            .into_iter()
            .map(|r| r.id.0)
            .collect();
        assert_eq!(ids, vec!["c", "d", "a"]);
    }

    #[test]
    fn test_normalize_empty() {
        assert!(normalize_listing(&UserId::new("u1"), Vec::new()).is_empty());
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let mut r = report("a", "u1", 0);
        r.body = "çok güzel bir rapor".into();
        assert_eq!(r.preview(3), "çok…");
        assert_eq!(r.preview(100), "çok güzel bir rapor");
    }

    #[test]
    fn test_theme_parse_and_toggle() {
        assert_eq!(Theme::parse("dark"), Some(Theme::Dark));
        assert_eq!(Theme::parse(" light "), Some(Theme::Light));
        assert_eq!(Theme::parse("sepia"), None);
        assert_eq!(Theme::Light.toggle(), Theme::Dark);
        assert_eq!(Theme::Dark.toggle().as_str(), "light");
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = Secret::new("hunter2");
        assert_eq!(format!("{secret:?}"), "[REDACTED]");
        assert_eq!(secret.expose(), "hunter2");
    }

    #[test]
    fn test_route_session_requirement() {
        assert!(!Route::SignIn.requires_session());
        assert!(Route::Home.requires_session());
        assert!(Route::ReportDetail(ReportId::new("r1")).requires_session());
    }
}
