#![allow(dead_code)]

use std::collections::VecDeque;

use crux_core::testing::AppTester;
use crux_core::Request;
use picrm_shared::capabilities::{
    AuthOperation, ChangeFeedOperation, ChangeSignal, StoreOperation,
};
use picrm_shared::memory::MemoryBackend;
use picrm_shared::model::{Session, SubscriptionId, Theme};
use picrm_shared::{App, BackendConfig, Effect, Event, Model};

/// Drives the core against a [`MemoryBackend`] the way a shell would.
///
/// Auth and store requests resolve immediately unless `hold` is set, in which
/// case they queue up until the test releases them. Preference requests always
/// resolve immediately. Change-feed subscriptions stay open for `emit_change`,
/// and the auth-state stream stays open for `emit_session_change`.
pub struct Harness {
    pub app: AppTester<App, Effect>,
    pub model: Model,
    pub backend: MemoryBackend,
    pub hold: bool,
    pub held_store: VecDeque<Request<StoreOperation>>,
    pub held_auth: VecDeque<Request<AuthOperation>>,
    pub session_watch: Option<Request<AuthOperation>>,
    pub store_log: Vec<StoreOperation>,
    pub subscriptions: Vec<(SubscriptionId, Request<ChangeFeedOperation>)>,
    pub unsubscribed: Vec<SubscriptionId>,
}

pub fn config() -> BackendConfig {
    BackendConfig {
        url: "https://picrm-test.supabase.co".into(),
        anon_key: "anon-key".into(),
        reports_collection: "Reports".into(),
        trends_collection: "trend_analyses".into(),
        profiles_collection: "user_profiles".into(),
    }
}

impl Harness {
    pub fn new() -> Self {
        Self::with_backend(MemoryBackend::new())
    }

    pub fn with_backend(backend: MemoryBackend) -> Self {
        let mut harness = Self {
            app: AppTester::<App, Effect>::default(),
            model: Model::default(),
            backend,
            hold: false,
            held_store: VecDeque::new(),
            held_auth: VecDeque::new(),
            session_watch: None,
            store_log: Vec::new(),
            subscriptions: Vec::new(),
            unsubscribed: Vec::new(),
        };
        harness.send(Event::Start {
            config: Box::new(config()),
            system_theme: Some(Theme::Light),
        });
        harness
    }

    /// Started harness with `user_id` signed in on the backend.
    pub fn signed_in(user_id: &str) -> (Self, Session) {
        let mut backend = MemoryBackend::new();
        let session = backend.add_account(&format!("{user_id}@example.com"), "pw", user_id);
        backend.sign_in_as(session.clone());
        (Self::with_backend(backend), session)
    }

    pub fn send(&mut self, event: Event) {
        let update = self.app.update(event, &mut self.model);
        self.absorb(update.effects);
        for event in update.events {
            self.send(event);
        }
    }

    fn absorb(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Render(_) => {}
                Effect::Preferences(mut request) => {
                    let output = self.backend.handle_kv(&request.operation);
                    self.resolve(&mut request, output);
                }
                Effect::Auth(request) if request.operation == AuthOperation::WatchSession => {
                    self.session_watch = Some(request);
                }
                Effect::Auth(mut request) => {
                    if self.hold {
                        self.held_auth.push_back(request);
                    } else {
                        let output = self.backend.handle_auth(&request.operation);
                        self.resolve(&mut request, output);
                    }
                }
                Effect::Store(mut request) => {
                    self.store_log.push(request.operation.clone());
                    if self.hold {
                        self.held_store.push_back(request);
                    } else {
                        let output = self.backend.handle_store(&request.operation);
                        self.resolve(&mut request, output);
                    }
                }
                Effect::ChangeFeed(request) => match &request.operation {
                    ChangeFeedOperation::Subscribe { id, .. } => {
                        self.subscriptions.push((id.clone(), request));
                    }
                    ChangeFeedOperation::Unsubscribe { id } => {
                        self.unsubscribed.push(id.clone());
                    }
                },
            }
        }
    }

    fn resolve<Op>(&mut self, request: &mut Request<Op>, output: Op::Output)
    where
        Op: crux_core::capability::Operation,
    {
        let update = self
            .app
            .resolve(request, output)
            .expect("request should resolve");
        self.absorb(update.effects);
        for event in update.events {
            self.send(event);
        }
    }

    /// Resolves the oldest held store request against the backend.
    pub fn release_store(&mut self) {
        let mut request = self.held_store.pop_front().expect("no held store request");
        let output = self.backend.handle_store(&request.operation);
        self.resolve(&mut request, output);
    }

    pub fn release_auth(&mut self) {
        let mut request = self.held_auth.pop_front().expect("no held auth request");
        let output = self.backend.handle_auth(&request.operation);
        self.resolve(&mut request, output);
    }

    pub fn release_all(&mut self) {
        while !self.held_auth.is_empty() || !self.held_store.is_empty() {
            if !self.held_auth.is_empty() {
                self.release_auth();
            } else {
                self.release_store();
            }
        }
    }

    /// Delivers a change-feed signal on an open subscription.
    pub fn emit_change(&mut self, id: &SubscriptionId, signal: ChangeSignal) {
        let index = self
            .subscriptions
            .iter()
            .position(|(sub, _)| sub == id)
            .expect("unknown subscription");
        let mut request = self.subscriptions.remove(index).1;
        let update = self
            .app
            .resolve(&mut request, signal)
            .expect("subscription should accept signals");
        self.subscriptions.insert(index, (id.clone(), request));
        self.absorb(update.effects);
        for event in update.events {
            self.send(event);
        }
    }

    /// Pushes the backend's current session down the auth-state stream, as
    /// the auth client does after a change made outside the app.
    pub fn emit_session_change(&mut self) {
        let mut request = self.session_watch.take().expect("auth state not watched");
        let output = self.backend.handle_auth(&request.operation);
        let update = self
            .app
            .resolve(&mut request, output)
            .expect("auth state stream should accept changes");
        self.session_watch = Some(request);
        self.absorb(update.effects);
        for event in update.events {
            self.send(event);
        }
    }

    pub fn list_calls(&self) -> usize {
        self.store_log
            .iter()
            .filter(|op| matches!(op, StoreOperation::ListReports { .. }))
            .count()
    }

    pub fn create_calls(&self) -> usize {
        self.store_log
            .iter()
            .filter(|op| matches!(op, StoreOperation::CreateReport { .. }))
            .count()
    }

    pub fn delete_calls(&self) -> usize {
        self.store_log
            .iter()
            .filter(|op| matches!(op, StoreOperation::DeleteReport { .. }))
            .count()
    }
}
