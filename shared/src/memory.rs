//! In-memory stand-in for the shell's backend client and local storage.
//!
//! Resolves the same operations a real shell would, with the backend's
//! owner filtering and ordering, so flows can be driven end to end without a
//! network. Compiled for tests and behind the `test-utils` feature.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::capabilities::{
    AuthError, AuthOperation, AuthOutput, AuthResult, KvError, KvOperation, KvOutput, KvResult,
    StoreError, StoreOperation, StoreOutput, StoreResult,
};
use crate::model::{Report, ReportId, Session, TrendSnapshot, UserId};

#[derive(Debug, Clone)]
struct Account {
    password: String,
    session: Session,
}

#[derive(Debug, Clone)]
pub struct MemoryBackend {
    reports: Vec<Report>,
    trends: Vec<TrendSnapshot>,
    accounts: BTreeMap<String, Account>,
    session: Option<Session>,
    kv: BTreeMap<String, String>,
    profiles: BTreeMap<UserId, String>,
    raw_listings: bool,
    clock: DateTime<Utc>,
    next_id: u64,
    fail_next_store: Option<StoreError>,
    fail_next_auth: Option<AuthError>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self {
            reports: Vec::new(),
            trends: Vec::new(),
            accounts: BTreeMap::new(),
            session: None,
            kv: BTreeMap::new(),
            profiles: BTreeMap::new(),
            raw_listings: false,
            clock: Utc
                .timestamp_opt(1_700_000_000, 0)
                .single()
                .unwrap_or_else(Utc::now),
            next_id: 0,
            fail_next_store: None,
            fail_next_auth: None,
        }
    }
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an account that `SignIn` accepts.
    pub fn add_account(&mut self, email: &str, password: &str, user_id: &str) -> Session {
        let session = Session {
            user_id: UserId::new(user_id),
            email: email.to_string(),
            display_name: None,
        };
        self.accounts.insert(
            email.to_lowercase(),
            Account {
                password: password.to_string(),
                session: session.clone(),
            },
        );
        session
    }

    /// Marks `session` as the currently signed-in identity.
    pub fn sign_in_as(&mut self, session: Session) {
        self.session = Some(session);
    }

    pub fn sign_out(&mut self) {
        self.session = None;
    }

    /// Inserts a report as another client would, stamping `created_at`.
    pub fn seed_report(&mut self, owner: &UserId, body: &str) -> Report {
        let report = Report {
            id: self.next_report_id(),
            owner_id: owner.clone(),
            title: crate::DEFAULT_REPORT_TITLE.to_string(),
            body: body.to_string(),
            created_at: self.tick(),
        };
        self.reports.push(report.clone());
        report
    }

    /// Inserts a fixture row exactly as given.
    pub fn insert_report(&mut self, report: Report) {
        self.reports.push(report);
    }

    pub fn seed_trend(&mut self, owner: &UserId, value: &str) -> TrendSnapshot {
        let trend = TrendSnapshot {
            owner_id: owner.clone(),
            value: value.to_string(),
            created_at: self.tick(),
        };
        self.trends.push(trend.clone());
        trend
    }

    pub fn remove_report(&mut self, id: &ReportId) -> bool {
        let before = self.reports.len();
        self.reports.retain(|r| &r.id != id);
        self.reports.len() != before
    }

    /// Listings skip the owner filter and ordering and return rows in
    /// insertion order, as a misconfigured row policy would.
    pub fn serve_raw_listings(&mut self, raw: bool) {
        self.raw_listings = raw;
    }

    /// The next store operation fails with `error` instead of running.
    pub fn fail_next_store(&mut self, error: StoreError) {
        self.fail_next_store = Some(error);
    }

    pub fn fail_next_auth(&mut self, error: AuthError) {
        self.fail_next_auth = Some(error);
    }

    #[must_use]
    pub fn reports(&self) -> &[Report] {
        &self.reports
    }

    #[must_use]
    pub fn stored(&self, raw_key: &str) -> Option<&str> {
        self.kv.get(raw_key).map(String::as_str)
    }

    pub fn store_raw(&mut self, raw_key: &str, value: &str) {
        self.kv.insert(raw_key.to_string(), value.to_string());
    }

    /// Display name on the owner's profile row.
    #[must_use]
    pub fn profile_name(&self, owner: &UserId) -> Option<&str> {
        self.profiles.get(owner).map(String::as_str)
    }

    pub fn handle_store(&mut self, op: &StoreOperation) -> StoreResult {
        if let Some(error) = self.fail_next_store.take() {
            return Err(error);
        }
        let owner = op.scope().owner_id().clone();
        match op {
            StoreOperation::ListReports { .. } if self.raw_listings => {
                Ok(StoreOutput::Reports(self.reports.clone()))
            }
            StoreOperation::ListReports { .. } => {
                let mut rows: Vec<Report> = self
                    .reports
                    .iter()
                    .filter(|r| r.owner_id == owner)
                    .cloned()
                    .collect();
                rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                Ok(StoreOutput::Reports(rows))
            }
            StoreOperation::GetReport { id, .. } => self
                .reports
                .iter()
                .find(|r| &r.id == id && r.owner_id == owner)
                .cloned()
                .map(StoreOutput::Report)
                .ok_or_else(|| StoreError::Backend {
                    code: crate::capabilities::NO_ROWS_CODE.to_string(),
                    message: "JSON object requested, multiple (or no) rows returned".to_string(),
                }),
            StoreOperation::CreateReport { report, .. } => {
                let created = Report {
                    id: self.next_report_id(),
                    owner_id: owner,
                    title: report.title.clone(),
                    body: report.body.clone(),
                    created_at: self.tick(),
                };
                self.reports.push(created.clone());
                Ok(StoreOutput::Report(created))
            }
            StoreOperation::DeleteReport { id, .. } => {
                let before = self.reports.len();
                self.reports.retain(|r| !(&r.id == id && r.owner_id == owner));
                if self.reports.len() == before {
                    Err(StoreError::NotFound)
                } else {
                    Ok(StoreOutput::Deleted { id: id.clone() })
                }
            }
            StoreOperation::LatestTrend { .. } => {
                let latest = self
                    .trends
                    .iter()
                    .filter(|t| t.owner_id == owner)
                    .max_by_key(|t| t.created_at)
                    .cloned();
                Ok(StoreOutput::Trend(latest))
            }
            StoreOperation::UpdateProfile { display_name, .. } => {
                self.profiles.insert(owner, display_name.clone());
                Ok(StoreOutput::ProfileUpdated)
            }
        }
    }

    pub fn handle_auth(&mut self, op: &AuthOperation) -> AuthResult {
        if let Some(error) = self.fail_next_auth.take() {
            return Err(error);
        }
        match op {
            AuthOperation::GetSession | AuthOperation::WatchSession => {
                Ok(AuthOutput::Session(self.session.clone()))
            }
            AuthOperation::SignIn { email, password } => {
                let account = self
                    .accounts
                    .get(&email.trim().to_lowercase())
                    .filter(|a| a.password == password.expose())
                    .ok_or(AuthError::InvalidCredentials)?;
                self.session = Some(account.session.clone());
                Ok(AuthOutput::Session(self.session.clone()))
            }
            AuthOperation::SignOut => {
                self.session = None;
                Ok(AuthOutput::SignedOut)
            }
            AuthOperation::UpdateDisplayName { display_name } => {
                let session = self.session.as_mut().ok_or(AuthError::SessionExpired)?;
                session.display_name = Some(display_name.clone());
                Ok(AuthOutput::Session(Some(session.clone())))
            }
        }
    }

    pub fn handle_kv(&mut self, op: &KvOperation) -> KvResult {
        let raw = op.key().raw();
        match op {
            KvOperation::Get { .. } => Ok(KvOutput::Value(self.kv.get(&raw).cloned())),
            KvOperation::Set { value, .. } => {
                if value.len() > crate::capabilities::MAX_VALUE_SIZE {
                    return Err(KvError::ValueTooLarge {
                        size: value.len(),
                        max: crate::capabilities::MAX_VALUE_SIZE,
                    });
                }
                self.kv.insert(raw, value.clone());
                Ok(KvOutput::Written)
            }
            KvOperation::Delete { .. } => Ok(KvOutput::Deleted {
                existed: self.kv.remove(&raw).is_some(),
            }),
        }
    }

    fn next_report_id(&mut self) -> ReportId {
        self.next_id += 1;
        ReportId::new(format!("report-{:04}", self.next_id))
    }

    /// Strictly increasing timestamps, one second apart.
    fn tick(&mut self) -> DateTime<Utc> {
        self.clock += Duration::seconds(1);
        self.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{NewReport, OwnerScope};

    fn scope(session: &Session) -> OwnerScope {
        OwnerScope::of(session)
    }

    fn list(backend: &mut MemoryBackend, session: &Session) -> Vec<Report> {
        match backend.handle_store(&StoreOperation::ListReports {
            collection: "Reports".into(),
            scope: scope(session),
        }) {
            Ok(StoreOutput::Reports(rows)) => rows,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_listing_is_owner_scoped_and_newest_first() {
        let mut backend = MemoryBackend::new();
        let ada = backend.add_account("ada@example.com", "pw", "u1");
        let bob = backend.add_account("bob@example.com", "pw", "u2");
        backend.seed_report(&ada.user_id, "first");
        backend.seed_report(&bob.user_id, "foreign");
        backend.seed_report(&ada.user_id, "second");

        let bodies: Vec<String> = list(&mut backend, &ada).into_iter().map(|r| r.body).collect();
        assert_eq!(bodies, vec!["second", "first"]);
    }

    #[test]
    fn test_delete_missing_is_not_found() {
        let mut backend = MemoryBackend::new();
        let ada = backend.add_account("ada@example.com", "pw", "u1");
        let result = backend.handle_store(&StoreOperation::DeleteReport {
            collection: "Reports".into(),
            scope: scope(&ada),
            id: ReportId::new("nope"),
        });
        assert_eq!(result, Err(StoreError::NotFound));
    }

    #[test]
    fn test_cannot_delete_foreign_report() {
        let mut backend = MemoryBackend::new();
        let ada = backend.add_account("ada@example.com", "pw", "u1");
        let bob = backend.add_account("bob@example.com", "pw", "u2");
        let theirs = backend.seed_report(&bob.user_id, "bob's");
        let result = backend.handle_store(&StoreOperation::DeleteReport {
            collection: "Reports".into(),
            scope: scope(&ada),
            id: theirs.id,
        });
        assert!(result.is_err());
        assert_eq!(backend.reports().len(), 1);
    }

    #[test]
    fn test_create_assigns_increasing_timestamps() {
        let mut backend = MemoryBackend::new();
        let ada = backend.add_account("ada@example.com", "pw", "u1");
        let seeded = backend.seed_report(&ada.user_id, "older");
        let created = match backend.handle_store(&StoreOperation::CreateReport {
            collection: "Reports".into(),
            scope: scope(&ada),
            report: NewReport {
                title: "Untitled Report".into(),
                body: "newer".into(),
            },
        }) {
            Ok(StoreOutput::Report(r)) => r,
            other => panic!("unexpected {other:?}"),
        };
        assert!(created.created_at > seeded.created_at);
        assert_eq!(created.owner_id, ada.user_id);
    }

    #[test]
    fn test_fail_next_applies_once() {
        let mut backend = MemoryBackend::new();
        let ada = backend.add_account("ada@example.com", "pw", "u1");
        backend.fail_next_store(StoreError::Network {
            message: "offline".into(),
        });
        let op = StoreOperation::ListReports {
            collection: "Reports".into(),
            scope: scope(&ada),
        };
        assert!(backend.handle_store(&op).is_err());
        assert!(backend.handle_store(&op).is_ok());
    }

    #[test]
    fn test_sign_in_checks_password() {
        let mut backend = MemoryBackend::new();
        backend.add_account("ada@example.com", "right", "u1");
        let wrong = backend.handle_auth(&AuthOperation::SignIn {
            email: "ada@example.com".into(),
            password: crate::model::Secret::new("wrong"),
        });
        assert_eq!(wrong, Err(AuthError::InvalidCredentials));
        let right = backend.handle_auth(&AuthOperation::SignIn {
            email: "ADA@example.com".into(),
            password: crate::model::Secret::new("right"),
        });
        assert!(matches!(right, Ok(AuthOutput::Session(Some(_)))));
    }

    #[test]
    fn test_latest_trend_picks_newest_for_owner() {
        let mut backend = MemoryBackend::new();
        let ada = backend.add_account("ada@example.com", "pw", "u1");
        backend.seed_trend(&ada.user_id, "old");
        backend.seed_trend(&ada.user_id, "new");
        let result = backend.handle_store(&StoreOperation::LatestTrend {
            collection: "trend_analyses".into(),
            scope: scope(&ada),
        });
        match result {
            Ok(StoreOutput::Trend(Some(t))) => assert_eq!(t.value, "new"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_raw_listings_skip_filter_and_order() {
        let mut backend = MemoryBackend::new();
        let ada = backend.add_account("ada@example.com", "pw", "u1");
        let bob = backend.add_account("bob@example.com", "pw", "u2");
        backend.seed_report(&ada.user_id, "first");
        backend.seed_report(&bob.user_id, "foreign");
        backend.seed_report(&ada.user_id, "second");
        backend.serve_raw_listings(true);

        let bodies: Vec<String> = list(&mut backend, &ada).into_iter().map(|r| r.body).collect();
        assert_eq!(bodies, vec!["first", "foreign", "second"]);
    }

    #[test]
    fn test_profile_update_writes_owner_row() {
        let mut backend = MemoryBackend::new();
        let ada = backend.add_account("ada@example.com", "pw", "u1");
        let result = backend.handle_store(&StoreOperation::UpdateProfile {
            collection: "user_profiles".into(),
            scope: scope(&ada),
            display_name: "Ada".into(),
        });
        assert_eq!(result, Ok(StoreOutput::ProfileUpdated));
        assert_eq!(backend.profile_name(&ada.user_id), Some("Ada"));
        assert!(backend.profile_name(&UserId::new("u2")).is_none());
    }
}
