use crux_core::capability::{CapabilityContext, Operation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{Report, ReportId, Session, TrendSnapshot, UserId};
use crate::{AppError, ErrorKind};

/// Row-level "no rows returned" code of the backend's REST layer.
pub const NO_ROWS_CODE: &str = "PGRST116";

/// Owner filter attached to every collection operation.
///
/// Only constructible from a resolved [`Session`], so an unscoped query cannot
/// be expressed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerScope {
    owner_id: UserId,
}

impl OwnerScope {
    #[must_use]
    pub fn of(session: &Session) -> Self {
        Self {
            owner_id: session.user_id.clone(),
        }
    }

    #[must_use]
    pub fn owner_id(&self) -> &UserId {
        &self.owner_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReport {
    pub title: String,
    #[serde(rename = "report")]
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StoreOperation {
    /// All rows of the owner, `created_at` descending.
    ListReports { collection: String, scope: OwnerScope },
    GetReport {
        collection: String,
        scope: OwnerScope,
        id: ReportId,
    },
    CreateReport {
        collection: String,
        scope: OwnerScope,
        report: NewReport,
    },
    DeleteReport {
        collection: String,
        scope: OwnerScope,
        id: ReportId,
    },
    /// Newest row of the owner, or nothing.
    LatestTrend { collection: String, scope: OwnerScope },
    /// Sets `display_name` on the owner's profile row.
    UpdateProfile {
        collection: String,
        scope: OwnerScope,
        display_name: String,
    },
}

impl StoreOperation {
    #[must_use]
    pub fn scope(&self) -> &OwnerScope {
        match self {
            Self::ListReports { scope, .. }
            | Self::GetReport { scope, .. }
            | Self::CreateReport { scope, .. }
            | Self::DeleteReport { scope, .. }
            | Self::LatestTrend { scope, .. }
            | Self::UpdateProfile { scope, .. } => scope,
        }
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        match self {
            Self::ListReports { collection, .. }
            | Self::GetReport { collection, .. }
            | Self::CreateReport { collection, .. }
            | Self::DeleteReport { collection, .. }
            | Self::LatestTrend { collection, .. }
            | Self::UpdateProfile { collection, .. } => collection,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreOutput {
    Reports(Vec<Report>),
    Report(Report),
    Deleted { id: ReportId },
    Trend(Option<TrendSnapshot>),
    ProfileUpdated,
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum StoreError {
    #[error("network error: {message}")]
    Network { message: String },

    #[error("backend error {code}: {message}")]
    Backend { code: String, message: String },

    #[error("row not found")]
    NotFound,

    #[error("not authorized")]
    Unauthorized,

    #[error("unexpected store output, expected {expected}")]
    UnexpectedOutput { expected: String },
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Network { .. } | StoreError::Backend { .. })
    }

    /// Folds the backend's "no rows" code into [`StoreError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        match self {
            StoreError::NotFound => true,
            StoreError::Backend { code, .. } => code == NO_ROWS_CODE,
            _ => false,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        let internal = e.to_string();
        let error = if e.is_not_found() {
            AppError::new(ErrorKind::NotFound, "Report not found")
        } else {
            match e {
                StoreError::Network { .. } => AppError::of_kind(ErrorKind::Network),
                StoreError::Unauthorized => AppError::of_kind(ErrorKind::Auth),
                StoreError::Backend { .. } | StoreError::NotFound | StoreError::UnexpectedOutput { .. } => {
                    AppError::of_kind(ErrorKind::Backend)
                }
            }
        };
        error.with_internal(internal)
    }
}

pub type StoreResult = Result<StoreOutput, StoreError>;

impl Operation for StoreOperation {
    type Output = StoreResult;
}

impl StoreOutput {
    fn into_reports(self) -> Result<Vec<Report>, StoreError> {
        match self {
            StoreOutput::Reports(reports) => Ok(reports),
            _ => Err(unexpected("reports")),
        }
    }

    fn into_report(self) -> Result<Report, StoreError> {
        match self {
            StoreOutput::Report(report) => Ok(report),
            _ => Err(unexpected("report")),
        }
    }

    fn into_deleted(self) -> Result<ReportId, StoreError> {
        match self {
            StoreOutput::Deleted { id } => Ok(id),
            _ => Err(unexpected("deleted")),
        }
    }

    fn into_profile_updated(self) -> Result<(), StoreError> {
        match self {
            StoreOutput::ProfileUpdated => Ok(()),
            _ => Err(unexpected("profile_updated")),
        }
    }

    fn into_trend(self) -> Result<Option<TrendSnapshot>, StoreError> {
        match self {
            StoreOutput::Trend(trend) => Ok(trend),
            _ => Err(unexpected("trend")),
        }
    }
}

fn unexpected(expected: &str) -> StoreError {
    StoreError::UnexpectedOutput {
        expected: expected.to_string(),
    }
}

/// Owner-scoped access to the remote report and trend collections.
#[derive(crux_core::macros::Capability)]
pub struct Store<Ev> {
    context: CapabilityContext<StoreOperation, Ev>,
}

impl<Ev> Store<Ev>
where
    Ev: 'static,
{
    pub fn new(context: CapabilityContext<StoreOperation, Ev>) -> Self {
        Self { context }
    }

    pub fn list_reports<F>(&self, collection: &str, scope: OwnerScope, make_event: F)
    where
        F: FnOnce(Result<Vec<Report>, StoreError>) -> Ev + Send + 'static,
    {
        let op = StoreOperation::ListReports {
            collection: collection.to_string(),
            scope,
        };
        self.request(op, StoreOutput::into_reports, make_event);
    }

    pub fn get_report<F>(&self, collection: &str, scope: OwnerScope, id: ReportId, make_event: F)
    where
        F: FnOnce(Result<Report, StoreError>) -> Ev + Send + 'static,
    {
        let op = StoreOperation::GetReport {
            collection: collection.to_string(),
            scope,
            id,
        };
        self.request(op, StoreOutput::into_report, make_event);
    }

    pub fn create_report<F>(
        &self,
        collection: &str,
        scope: OwnerScope,
        report: NewReport,
        make_event: F,
    ) where
        F: FnOnce(Result<Report, StoreError>) -> Ev + Send + 'static,
    {
        let op = StoreOperation::CreateReport {
            collection: collection.to_string(),
            scope,
            report,
        };
        self.request(op, StoreOutput::into_report, make_event);
    }

    pub fn delete_report<F>(&self, collection: &str, scope: OwnerScope, id: ReportId, make_event: F)
    where
        F: FnOnce(Result<ReportId, StoreError>) -> Ev + Send + 'static,
    {
        let op = StoreOperation::DeleteReport {
            collection: collection.to_string(),
            scope,
            id,
        };
        self.request(op, StoreOutput::into_deleted, make_event);
    }

    pub fn latest_trend<F>(&self, collection: &str, scope: OwnerScope, make_event: F)
    where
        F: FnOnce(Result<Option<TrendSnapshot>, StoreError>) -> Ev + Send + 'static,
    {
        let op = StoreOperation::LatestTrend {
            collection: collection.to_string(),
            scope,
        };
        self.request(op, StoreOutput::into_trend, make_event);
    }

    pub fn update_profile<F>(&self, collection: &str, scope: OwnerScope, display_name: String, make_event: F)
    where
        F: FnOnce(Result<(), StoreError>) -> Ev + Send + 'static,
    {
        let op = StoreOperation::UpdateProfile {
            collection: collection.to_string(),
            scope,
            display_name,
        };
        self.request(op, StoreOutput::into_profile_updated, make_event);
    }

    fn request<T, F>(
        &self,
        op: StoreOperation,
        extract: fn(StoreOutput) -> Result<T, StoreError>,
        make_event: F,
    ) where
        T: Send + 'static,
        F: FnOnce(Result<T, StoreError>) -> Ev + Send + 'static,
    {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            let result = ctx.request_from_shell(op).await.and_then(extract);
            ctx.update_app(make_event(result));
        });
    }
}
