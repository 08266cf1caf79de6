use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{ComposePhase, DeleteFlow, Model, Report, Route, Theme};
use crate::screen::{Phase, Screen, ScreenControl};
use crate::{AppError, REPORT_PREVIEW_LENGTH, TIMESTAMP_FORMAT};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserFacingError {
    pub message: String,
    pub is_retryable: bool,
    pub error_code: String,
}

impl From<&AppError> for UserFacingError {
    fn from(e: &AppError) -> Self {
        Self {
            message: e.user_facing_message(),
            is_retryable: e.is_retryable(),
            error_code: e.code().to_string(),
        }
    }
}

/// What a data screen should draw. `Error` with data still present means the
/// last good data stays visible under an error banner.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ScreenStatus {
    Idle,
    Loading,
    Refreshing,
    Loaded,
    Error,
}

impl From<Phase> for ScreenStatus {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::Idle => Self::Idle,
            Phase::LoadingInitial => Self::Loading,
            Phase::Refreshing => Self::Refreshing,
            Phase::Loaded => Self::Loaded,
            Phase::Error => Self::Error,
        }
    }
}

#[must_use]
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReportCardView {
    pub id: String,
    pub title: String,
    pub preview: String,
    pub created_at: String,
}

impl From<&Report> for ReportCardView {
    fn from(r: &Report) -> Self {
        Self {
            id: r.id.to_string(),
            title: r.title.clone(),
            preview: r.preview(REPORT_PREVIEW_LENGTH),
            created_at: format_timestamp(&r.created_at),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReportListView {
    pub status: ScreenStatus,
    pub reports: Vec<ReportCardView>,
    pub is_empty: bool,
    pub error: Option<UserFacingError>,
}

impl From<&Screen<Vec<Report>>> for ReportListView {
    fn from(screen: &Screen<Vec<Report>>) -> Self {
        let reports: Vec<ReportCardView> = screen
            .data()
            .map(|rows| rows.iter().map(ReportCardView::from).collect())
            .unwrap_or_default();
        Self {
            status: screen.phase().into(),
            is_empty: screen.phase() == Phase::Loaded && reports.is_empty(),
            reports,
            error: screen.error().map(UserFacingError::from),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReportDetailView {
    pub status: ScreenStatus,
    pub id: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub created_at: Option<String>,
    /// Only true for the viewer's own report.
    pub can_delete: bool,
    pub confirming_delete: bool,
    pub deleting: bool,
    pub error: Option<UserFacingError>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrendView {
    pub status: ScreenStatus,
    pub value: Option<String>,
    pub updated_at: Option<String>,
    pub error: Option<UserFacingError>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComposeView {
    pub is_open: bool,
    pub draft: String,
    pub is_submitting: bool,
    pub can_submit: bool,
    pub error: Option<UserFacingError>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignInView {
    pub pending: bool,
    pub remember: bool,
    pub prefill_email: Option<String>,
    pub error: Option<UserFacingError>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfileView {
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub saving: bool,
    pub saved: bool,
    pub error: Option<UserFacingError>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ViewModel {
    pub route: Route,
    pub theme: Theme,
    pub fatal_error: Option<UserFacingError>,
    pub is_authenticated: bool,
    pub home: ReportListView,
    pub reports: ReportListView,
    pub detail: ReportDetailView,
    pub trend: TrendView,
    pub compose: ComposeView,
    pub sign_in: SignInView,
    pub profile: ProfileView,
    pub notice: Option<UserFacingError>,
}

impl ViewModel {
    #[must_use]
    pub fn from_model(model: &Model) -> Self {
        let detail = model.detail.data();
        let trend = model.trend.data().and_then(Option::as_ref);
        let compose = &model.compose;

        Self {
            route: model.route.clone(),
            theme: model.theme,
            fatal_error: model.fatal_error.as_ref().map(UserFacingError::from),
            is_authenticated: model.is_authenticated(),
            home: ReportListView::from(&model.home),
            reports: ReportListView::from(&model.reports),
            detail: ReportDetailView {
                status: model.detail.phase().into(),
                id: detail.map(|r| r.id.to_string()),
                title: detail.map(|r| r.title.clone()),
                body: detail.map(|r| r.body.clone()),
                created_at: detail.map(|r| format_timestamp(&r.created_at)),
                can_delete: model.deletable_report().is_some(),
                confirming_delete: model.delete == DeleteFlow::AwaitingConfirmation,
                deleting: model.delete == DeleteFlow::Deleting,
                error: model.detail.error().map(UserFacingError::from),
            },
            trend: TrendView {
                status: model.trend.phase().into(),
                value: trend.map(|t| t.value.clone()),
                updated_at: trend.map(|t| format_timestamp(&t.created_at)),
                error: model.trend.error().map(UserFacingError::from),
            },
            compose: ComposeView {
                is_open: compose.phase != ComposePhase::Closed,
                draft: compose.draft.clone(),
                is_submitting: compose.phase == ComposePhase::Submitting,
                can_submit: compose.phase == ComposePhase::Editing
                    && !compose.draft.trim().is_empty(),
                error: compose.error.as_ref().map(UserFacingError::from),
            },
            sign_in: SignInView {
                pending: model.sign_in.pending,
                remember: model.sign_in.remember,
                prefill_email: model.remembered_email.clone(),
                error: model.sign_in.error.as_ref().map(UserFacingError::from),
            },
            profile: ProfileView {
                email: model.session.as_ref().map(|s| s.email.clone()),
                display_name: model.session.as_ref().and_then(|s| s.display_name.clone()),
                saving: model.profile.saving,
                saved: model.profile.saved,
                error: model.profile.error.as_ref().map(UserFacingError::from),
            },
            notice: model.notice.as_ref().map(UserFacingError::from),
        }
    }
}
