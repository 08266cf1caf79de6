use tracing::{debug, error, info, instrument, warn};

use crate::capabilities::{
    AuthError, Capabilities, ChangeFeedError, ChangeScope, ChangeSignal, NewReport, OwnerScope, StoreError,
};
use crate::config::BackendConfig;
use crate::event::Event;
use crate::model::{
    normalize_listing, ComposePhase, DeleteFlow, Model, ProfileState, ReportId, Route, Session,
    SignInState, SubscriptionId,
};
use crate::preferences::{self, PreferenceKey};
use crate::screen::{Completion, FetchTicket, Phase, RefreshTrigger, ScreenControl, ScreenId};
use crate::view::ViewModel;
use crate::{
    AppError, ErrorKind, DEFAULT_REPORT_TITLE, MAX_DISPLAY_NAME_LENGTH, MAX_REPORT_BODY_LENGTH,
};

#[derive(Default)]
pub struct App;

impl App {
    fn load_preference(key: PreferenceKey, caps: &Capabilities) {
        match key.kv_key() {
            Ok(kv_key) => caps
                .preferences
                .get(kv_key, move |result| Event::PreferenceLoaded { key, result }),
            Err(e) => error!(?key, error = %e, "invalid preference key"),
        }
    }

    fn write_preference(key: PreferenceKey, value: String, caps: &Capabilities) {
        match key.kv_key() {
            Ok(kv_key) => caps
                .preferences
                .set(kv_key, value, move |result| Event::PreferenceWritten { key, result }),
            Err(e) => error!(?key, error = %e, "invalid preference key"),
        }
    }

    fn remove_preference(key: PreferenceKey, caps: &Capabilities) {
        match key.kv_key() {
            Ok(kv_key) => caps
                .preferences
                .remove(kv_key, move |result| Event::PreferenceRemoved { key, result }),
            Err(e) => error!(?key, error = %e, "invalid preference key"),
        }
    }

    /// Unmounts one screen and cancels its subscription, at most once.
    fn teardown(model: &mut Model, caps: &Capabilities, id: ScreenId) {
        if let Some(subscription) = model.screen_mut(id).unmount() {
            debug!(screen = id.as_str(), %subscription, "cancelling subscription");
            caps.change_feed.cancel(subscription);
        }
        if id == ScreenId::ReportDetail {
            model.delete = DeleteFlow::Idle;
        }
    }

    /// Terminal redirect for a missing or unknown session. Nothing fetched
    /// for the previous session stays on screen.
    fn fail_closed(model: &mut Model, caps: &Capabilities, reason: Option<AppError>) {
        for id in ScreenId::ALL {
            Self::teardown(model, caps, id);
        }
        model.session = None;
        model.detail_target = None;
        model.compose.reset();
        model.profile = ProfileState::default();
        model.route = Route::SignIn;
        model.notice = reason;
    }

    /// Makes `session` the active identity. When it belongs to a different
    /// user than the cached one, everything fetched for the previous user is
    /// dropped and the mounted list screens start over under the new owner.
    fn adopt_session(model: &mut Model, caps: &Capabilities, session: Session) {
        let switched = model
            .owner_id()
            .is_some_and(|owner| *owner != session.user_id);
        if !switched {
            model.session = Some(session);
            return;
        }

        info!(user_id = %session.user_id, "account switched, restarting screens");
        let mounted: Vec<ScreenId> = ScreenId::ALL
            .into_iter()
            .filter(|id| model.screen(*id).is_mounted())
            .collect();
        for id in ScreenId::ALL {
            Self::teardown(model, caps, id);
        }
        model.detail_target = None;
        model.compose.reset();
        model.profile = ProfileState::default();
        model.notice = None;
        if matches!(model.route, Route::ReportDetail(_)) {
            model.route = Route::Home;
        }
        model.session = Some(session);

        for id in mounted {
            if id == ScreenId::ReportDetail {
                continue;
            }
            let instance = model.screen_mut(id).mount();
            debug!(screen = id.as_str(), instance = instance.0, "screen restarted");
            Self::start_initial_fetch(model, caps, id);
            Self::ensure_subscription(model, caps, id);
        }
    }

    fn mount(model: &mut Model, caps: &Capabilities, id: ScreenId) {
        if id == ScreenId::ReportDetail && model.detail_target.is_none() {
            warn!("report detail mounted without a target");
            return;
        }
        Self::teardown(model, caps, id);
        let instance = model.screen_mut(id).mount();
        info!(screen = id.as_str(), instance = instance.0, "screen mounted");

        caps.auth.get_session(move |result| Event::SessionProbed {
            screen: id,
            instance,
            result,
        });

        if model.session.is_some() {
            Self::start_initial_fetch(model, caps, id);
            Self::ensure_subscription(model, caps, id);
        }
    }

    fn start_initial_fetch(model: &mut Model, caps: &Capabilities, id: ScreenId) {
        if let Some(ticket) = model.screen_mut(id).begin_fetch() {
            Self::dispatch_fetch(model, caps, id, ticket);
        }
    }

    /// Single entry point for every refresh trigger.
    #[instrument(skip_all, fields(screen = id.as_str(), trigger = trigger.as_str()))]
    fn refresh(model: &mut Model, caps: &Capabilities, id: ScreenId, trigger: RefreshTrigger) {
        if model.session.is_none() {
            debug!("refresh skipped, session not resolved");
            return;
        }
        if model.screen(id).phase() == Phase::Error && !trigger.is_user_initiated() {
            debug!("refresh skipped, error waits for a user retry");
            return;
        }
        match model.screen_mut(id).request_refresh() {
            Some(ticket) => {
                debug!(seq = ticket.seq, "refresh started");
                Self::dispatch_fetch(model, caps, id, ticket);
            }
            None => debug!("refresh dropped"),
        }
    }

    fn dispatch_fetch(model: &mut Model, caps: &Capabilities, id: ScreenId, ticket: FetchTicket) {
        let Some((scope, config)) = Self::scoped_config(model) else {
            let _ = model
                .screen_mut(id)
                .fail(ticket, AppError::of_kind(ErrorKind::Auth));
            return;
        };

        match id {
            ScreenId::Home | ScreenId::Reports => {
                caps.store
                    .list_reports(&config.reports_collection, scope, move |result| {
                        Event::ReportsFetched {
                            screen: id,
                            ticket,
                            result,
                        }
                    });
            }
            ScreenId::ReportDetail => {
                let Some(report_id) = model.detail_target.clone() else {
                    let _ = model
                        .detail
                        .fail(ticket, AppError::of_kind(ErrorKind::NotFound));
                    return;
                };
                caps.store
                    .get_report(&config.reports_collection, scope, report_id, move |result| {
                        Event::ReportFetched {
                            ticket,
                            result: Box::new(result),
                        }
                    });
            }
            ScreenId::Trend => {
                caps.store
                    .latest_trend(&config.trends_collection, scope, move |result| {
                        Event::TrendFetched { ticket, result }
                    });
            }
        }
    }

    /// Opens the change feed for a mounted screen if it has none yet. The
    /// detail screen has no live updates.
    fn ensure_subscription(model: &mut Model, caps: &Capabilities, id: ScreenId) {
        let Some((owner, config)) = Self::scoped_config(model) else {
            return;
        };
        let collection = match id {
            ScreenId::Home | ScreenId::Reports => config.reports_collection,
            ScreenId::Trend => config.trends_collection,
            ScreenId::ReportDetail => return,
        };
        let screen = model.screen_mut(id);
        let Some(instance) = screen.instance() else {
            return;
        };
        if screen.subscription().is_some() {
            return;
        }

        let subscription = SubscriptionId::generate();
        if screen.attach_subscription(instance, subscription.clone()) {
            debug!(screen = id.as_str(), %subscription, "subscribing to changes");
            let tag = subscription.clone();
            caps.change_feed.subscribe(
                subscription,
                ChangeScope::new(&collection, owner),
                move |signal| Event::ChangeNotified {
                    screen: id,
                    instance,
                    subscription: tag.clone(),
                    signal,
                },
            );
        }
    }

    /// Owner scope and backend config, both required for any store request.
    fn scoped_config(model: &Model) -> Option<(OwnerScope, BackendConfig)> {
        let scope = model.session.as_ref().map(OwnerScope::of)?;
        let config = model.config.clone()?;
        Some((scope, config))
    }

    fn store_error(e: StoreError, action: &str) -> AppError {
        warn!(error = %e, action, "store request failed");
        AppError::from(e).while_doing(action)
    }

    fn after_completion(model: &mut Model, caps: &Capabilities, id: ScreenId, completion: Completion) {
        match completion {
            Completion::Discarded => debug!(screen = id.as_str(), "late response discarded"),
            Completion::Applied => {
                let screen = model.screen(id);
                if let Some(err) = screen.error() {
                    if err.kind == ErrorKind::Auth {
                        warn!(screen = id.as_str(), "backend rejected session");
                        let reason = err.clone();
                        Self::fail_closed(model, caps, Some(reason));
                    }
                } else {
                    debug!(screen = id.as_str(), "fetch applied");
                }
            }
        }
    }

    fn remember_identity(model: &mut Model, caps: &Capabilities) {
        match preferences::remembered_email(&model.sign_in.email, model.sign_in.remember) {
            Some(email) => {
                Self::write_preference(PreferenceKey::RememberedEmail, email.clone(), caps);
                model.remembered_email = Some(email);
            }
            None => {
                Self::remove_preference(PreferenceKey::RememberedEmail, caps);
                model.remembered_email = None;
            }
        }
    }

    fn refresh_lists(model: &mut Model, caps: &Capabilities) {
        for id in [ScreenId::Home, ScreenId::Reports] {
            if model.screen(id).is_mounted() {
                Self::refresh(model, caps, id, RefreshTrigger::LocalMutation);
            }
        }
    }

    fn deletion_target(model: &Model) -> Option<ReportId> {
        model.deletable_report().map(|r| r.id.clone())
    }

    fn forbid_foreign_delete(model: &mut Model) {
        warn!("delete rejected, report not owned by viewer");
        model.delete = DeleteFlow::Idle;
        model.notice = Some(AppError::new(
            ErrorKind::Forbidden,
            "You can only delete your own reports.",
        ));
    }
}

impl crux_core::App for App {
    type Event = Event;
    type Model = Model;
    type ViewModel = ViewModel;
    type Capabilities = Capabilities;

    fn update(&self, event: Event, model: &mut Model, caps: &Capabilities) {
        let event_name = event.name();
        debug!(event = event_name, "update");

        if model.config.is_none() && !event.is_startup() {
            warn!(event = event_name, "ignored, backend not configured");
            return;
        }

        match event {
            Event::Start {
                config,
                system_theme,
            } => {
                model.theme = system_theme.unwrap_or_default();
                match (*config).validate() {
                    Ok(config) => {
                        info!(host = ?config.host(), "core configured");
                        model.config = Some(config);
                        model.fatal_error = None;
                    }
                    Err(e) => {
                        error!(error = %e, "invalid backend configuration");
                        model.config = None;
                        model.fatal_error = Some(e.into());
                        caps.render.render();
                        return;
                    }
                }
                for key in PreferenceKey::RESTORED {
                    Self::load_preference(key, caps);
                }
                caps.auth
                    .watch_session(|result| Event::SessionChanged { result });
                Self::remove_preference(PreferenceKey::LegacyRememberedPassword, caps);
                model.route = Route::Home;
            }

            Event::PreferenceLoaded { key, result } => match (key, result) {
                (PreferenceKey::Theme, Ok(value)) => {
                    if let Some(theme) = preferences::parse_theme(value.as_deref()) {
                        model.theme = theme;
                    }
                }
                (PreferenceKey::RememberedEmail, Ok(value)) => {
                    model.remembered_email = value.filter(|v| !v.trim().is_empty());
                    model.sign_in.remember = model.remembered_email.is_some();
                }
                (PreferenceKey::LegacyRememberedPassword, Ok(_)) => {}
                (key, Err(e)) => warn!(?key, error = %e, "preference could not be read"),
            },

            Event::PreferenceWritten { key, result } => match result {
                Ok(()) => debug!(?key, "preference written"),
                Err(e) => {
                    warn!(?key, error = %e, "preference could not be written");
                    model.notice = Some(e.into());
                }
            },

            Event::PreferenceRemoved { key, result } => match result {
                Ok(true) if key == PreferenceKey::LegacyRememberedPassword => {
                    info!("removed stored password left by an older build");
                }
                Ok(_) => debug!(?key, "preference removed"),
                Err(e) => warn!(?key, error = %e, "preference could not be removed"),
            },

            Event::ThemeToggled => {
                model.theme = model.theme.toggle();
                Self::write_preference(PreferenceKey::Theme, model.theme.as_str().to_string(), caps);
            }

            Event::SignInRequested {
                email,
                password,
                remember,
            } => {
                if model.sign_in.pending {
                    return;
                }
                let email = email.trim().to_string();
                if email.is_empty() || password.is_empty() {
                    model.sign_in.error =
                        Some(AppError::validation("Please enter your email and password."));
                } else {
                    model.sign_in.pending = true;
                    model.sign_in.error = None;
                    model.sign_in.remember = remember;
                    model.sign_in.email = email.clone();
                    caps.auth
                        .sign_in(email, password, |result| Event::SignInCompleted { result });
                }
            }

            Event::SignInCompleted { result } => {
                model.sign_in.pending = false;
                match result {
                    Ok(Some(session)) => {
                        info!(user_id = %session.user_id, "signed in");
                        Self::adopt_session(model, caps, session);
                        model.sign_in.error = None;
                        model.notice = None;
                        Self::remember_identity(model, caps);
                        model.route = Route::Home;
                    }
                    Ok(None) => {
                        model.sign_in.error =
                            Some(AuthError::InvalidCredentials.into());
                    }
                    Err(e) => {
                        warn!(error = %e, "sign in failed");
                        model.sign_in.error = Some(e.into());
                    }
                }
            }

            Event::SignOutRequested => {
                info!("signing out");
                Self::remove_preference(PreferenceKey::RememberedEmail, caps);
                model.remembered_email = None;
                model.sign_in = SignInState::default();
                Self::fail_closed(model, caps, None);
                caps.auth.sign_out(|result| Event::SignOutCompleted { result });
            }

            Event::SignOutCompleted { result } => {
                if let Err(e) = result {
                    warn!(error = %e, "backend sign out failed, local session already cleared");
                }
            }

            Event::DisplayNameSubmitted { display_name } => {
                if model.session.is_none() {
                    Self::fail_closed(model, caps, Some(AppError::of_kind(ErrorKind::Auth)));
                } else if !model.profile.saving {
                    let name = display_name.trim().to_string();
                    if name.is_empty() {
                        model.profile.error =
                            Some(AppError::validation("Display name cannot be empty."));
                    } else if name.chars().count() > MAX_DISPLAY_NAME_LENGTH {
                        model.profile.error = Some(AppError::validation(format!(
                            "Display name is limited to {MAX_DISPLAY_NAME_LENGTH} characters."
                        )));
                    } else {
                        model.profile.saving = true;
                        model.profile.saved = false;
                        model.profile.error = None;
                        model.profile.pending = Some(name.clone());
                        caps.auth
                            .update_display_name(name, |result| Event::DisplayNameUpdated { result });
                    }
                }
            }

            Event::DisplayNameUpdated { result } => match result {
                // metadata saved, the profile row follows
                Ok(Some(session)) => {
                    Self::adopt_session(model, caps, session);
                    match (model.profile.pending.clone(), Self::scoped_config(model)) {
                        (Some(name), Some((scope, config))) => {
                            caps.store.update_profile(
                                &config.profiles_collection,
                                scope,
                                name,
                                |result| Event::ProfileRowUpdated { result },
                            );
                        }
                        _ => {
                            debug!("profile update superseded");
                            model.profile.saving = false;
                        }
                    }
                }
                Ok(None) => Self::fail_closed(model, caps, Some(AppError::of_kind(ErrorKind::Auth))),
                Err(e) => {
                    warn!(error = %e, "display name update failed");
                    model.profile.saving = false;
                    model.profile.pending = None;
                    let error = AppError::from(e);
                    if error.kind == ErrorKind::Auth {
                        Self::fail_closed(model, caps, Some(error));
                    } else {
                        model.profile.error = Some(error.while_doing("Profile could not be updated"));
                    }
                }
            },

            Event::ProfileRowUpdated { result } => {
                if !model.profile.saving {
                    debug!("profile row response ignored");
                    return;
                }
                model.profile.saving = false;
                model.profile.pending = None;
                match result {
                    Ok(()) => {
                        info!("profile updated");
                        model.profile.saved = true;
                    }
                    Err(e) if e.is_not_found() => {
                        warn!(error = %e, "profile row missing");
                        model.profile.error = Some(
                            AppError::new(ErrorKind::NotFound, "Profile not found.")
                                .with_internal(e.to_string())
                                .while_doing("Profile could not be updated"),
                        );
                    }
                    Err(e) => {
                        let error = Self::store_error(e, "Profile could not be updated");
                        if error.kind == ErrorKind::Auth {
                            Self::fail_closed(model, caps, Some(error));
                        } else {
                            model.profile.error = Some(error);
                        }
                    }
                }
            }

            Event::SessionChanged { result } => match result {
                Ok(Some(session)) => {
                    Self::adopt_session(model, caps, session);
                    if model.route == Route::SignIn && !model.sign_in.pending {
                        model.route = Route::Home;
                    }
                }
                Ok(None) => {
                    info!("signed out outside the app");
                    Self::fail_closed(model, caps, None);
                }
                Err(e) => {
                    warn!(error = %e, "auth state unknown, failing closed");
                    Self::fail_closed(model, caps, Some(e.into()));
                }
            },

            Event::SessionProbed {
                screen,
                instance,
                result,
            } => {
                if model.screen(screen).instance() != Some(instance) {
                    debug!(screen = screen.as_str(), "stale session probe ignored");
                    return;
                }
                match result {
                    Ok(Some(session)) => {
                        Self::adopt_session(model, caps, session);
                        let control = model.screen(screen);
                        let waiting = control.phase() == Phase::LoadingInitial
                            && control.in_flight().is_none()
                            && !control.has_data();
                        if waiting {
                            Self::start_initial_fetch(model, caps, screen);
                        }
                        Self::ensure_subscription(model, caps, screen);
                    }
                    Ok(None) => {
                        info!(screen = screen.as_str(), "no session, redirecting to sign in");
                        Self::fail_closed(model, caps, None);
                    }
                    Err(e) => {
                        warn!(screen = screen.as_str(), error = %e, "session unknown, failing closed");
                        Self::fail_closed(model, caps, Some(e.into()));
                    }
                }
            }

            Event::Navigated(route) => {
                if let Route::ReportDetail(id) = &route {
                    if model.detail_target.as_ref() != Some(id) {
                        Self::teardown(model, caps, ScreenId::ReportDetail);
                        model.detail_target = Some(id.clone());
                    }
                }
                model.route = route;
            }

            Event::ScreenMounted(id) => Self::mount(model, caps, id),

            Event::ScreenUnmounted(id) => {
                Self::teardown(model, caps, id);
                info!(screen = id.as_str(), "screen unmounted");
            }

            Event::ScreenFocused(id) => Self::refresh(model, caps, id, RefreshTrigger::Focus),

            Event::RefreshRequested { screen, trigger } => {
                Self::refresh(model, caps, screen, trigger);
            }

            Event::ChangeNotified {
                screen,
                instance,
                subscription,
                signal,
            } => {
                if !model.screen(screen).accepts_signal(instance, &subscription) {
                    debug!(screen = screen.as_str(), %subscription, "stale change signal ignored");
                    return;
                }
                match signal {
                    ChangeSignal::Changed => {
                        Self::refresh(model, caps, screen, RefreshTrigger::ChangeFeed);
                    }
                    ChangeSignal::Closed { reason } => {
                        let _ = model.screen_mut(screen).detach_subscription();
                        let reason = reason.unwrap_or_else(|| "closed by backend".to_string());
                        warn!(screen = screen.as_str(), %reason, "change feed closed");
                        model.notice = Some(ChangeFeedError::Closed { reason }.into());
                    }
                }
            }

            Event::ReportsFetched {
                screen,
                ticket,
                result,
            } => {
                let owner = model.owner_id().cloned();
                let result = match (result, owner) {
                    (Ok(rows), Some(owner)) => Ok(normalize_listing(&owner, rows)),
                    (Ok(_), None) => Err(AppError::of_kind(ErrorKind::Auth)),
                    (Err(e), _) => Err(Self::store_error(e, "Reports could not be loaded")),
                };
                let Some(list) = model.list_screen_mut(screen) else {
                    warn!(screen = screen.as_str(), "report listing for a non-list screen");
                    return;
                };
                let completion = list.complete(ticket, result);
                Self::after_completion(model, caps, screen, completion);
            }

            Event::ReportFetched { ticket, result } => {
                let owner = model.owner_id().cloned();
                let target = model.detail_target.clone();
                let result = match (*result, owner) {
                    (Ok(report), Some(owner)) => {
                        if report.is_owned_by(&owner) && target.as_ref() == Some(&report.id) {
                            Ok(report)
                        } else {
                            warn!(report_id = %report.id, "report outside the viewer's scope");
                            Err(AppError::new(ErrorKind::NotFound, "Report not found"))
                        }
                    }
                    (Ok(_), None) => Err(AppError::of_kind(ErrorKind::Auth)),
                    (Err(e), _) => Err(Self::store_error(e, "Report could not be loaded")),
                };
                let completion = model.detail.complete(ticket, result);
                Self::after_completion(model, caps, ScreenId::ReportDetail, completion);
            }

            Event::TrendFetched { ticket, result } => {
                let owner = model.owner_id().cloned();
                let result = match (result, owner) {
                    (Ok(trend), Some(owner)) => Ok(trend.filter(|t| {
                        let owned = t.owner_id == owner;
                        if !owned {
                            warn!("trend snapshot for another owner dropped");
                        }
                        owned
                    })),
                    (Ok(_), None) => Err(AppError::of_kind(ErrorKind::Auth)),
                    (Err(e), _) => Err(Self::store_error(e, "Trends could not be loaded")),
                };
                let completion = model.trend.complete(ticket, result);
                Self::after_completion(model, caps, ScreenId::Trend, completion);
            }

            Event::ComposeOpened => {
                if model.compose.phase == ComposePhase::Closed {
                    model.compose.phase = ComposePhase::Editing;
                    model.compose.error = None;
                }
            }

            Event::DraftChanged(text) => {
                if model.compose.phase == ComposePhase::Editing {
                    model.compose.draft = text;
                    model.compose.error = None;
                }
            }

            Event::ComposeDismissed => {
                if model.compose.phase == ComposePhase::Editing {
                    model.compose.reset();
                }
            }

            Event::ComposeSubmitted => {
                if model.compose.phase != ComposePhase::Editing {
                    return;
                }
                let body = model.compose.draft.trim().to_string();
                if body.is_empty() {
                    model.compose.error =
                        Some(AppError::validation("Report content cannot be empty."));
                } else if body.chars().count() > MAX_REPORT_BODY_LENGTH {
                    model.compose.error = Some(AppError::validation(format!(
                        "Report content is limited to {MAX_REPORT_BODY_LENGTH} characters."
                    )));
                } else if let Some((scope, config)) = Self::scoped_config(model) {
                    model.compose.phase = ComposePhase::Submitting;
                    model.compose.error = None;
                    let report = NewReport {
                        title: DEFAULT_REPORT_TITLE.to_string(),
                        body,
                    };
                    caps.store
                        .create_report(&config.reports_collection, scope, report, |result| {
                            Event::ReportCreated {
                                result: Box::new(result),
                            }
                        });
                } else {
                    warn!("compose submitted without a session");
                    Self::fail_closed(model, caps, Some(AppError::of_kind(ErrorKind::Auth)));
                }
            }

            Event::ReportCreated { result } => {
                if model.compose.phase != ComposePhase::Submitting {
                    debug!("create response after compose closed, ignored");
                    return;
                }
                match *result {
                    Ok(report) => {
                        info!(report_id = %report.id, "report created");
                        model.compose.reset();
                        Self::refresh_lists(model, caps);
                    }
                    Err(e) => {
                        let error = Self::store_error(e, "Report could not be created");
                        model.compose.phase = ComposePhase::Editing;
                        if error.kind == ErrorKind::Auth {
                            Self::fail_closed(model, caps, Some(error));
                        } else {
                            model.compose.error = Some(error);
                        }
                    }
                }
            }

            Event::DeleteRequested => {
                if model.delete != DeleteFlow::Idle {
                    return;
                }
                if Self::deletion_target(model).is_some() {
                    model.delete = DeleteFlow::AwaitingConfirmation;
                } else if model.detail.data().is_some() {
                    Self::forbid_foreign_delete(model);
                }
            }

            Event::DeleteCancelled => {
                if model.delete == DeleteFlow::AwaitingConfirmation {
                    model.delete = DeleteFlow::Idle;
                }
            }

            Event::DeleteConfirmed => {
                if model.delete != DeleteFlow::AwaitingConfirmation {
                    return;
                }
                match (Self::deletion_target(model), Self::scoped_config(model)) {
                    (Some(id), Some((scope, config))) => {
                        model.delete = DeleteFlow::Deleting;
                        let event_id = id.clone();
                        caps.store
                            .delete_report(&config.reports_collection, scope, id, move |result| {
                                Event::ReportDeleted {
                                    id: event_id,
                                    result,
                                }
                            });
                    }
                    _ => Self::forbid_foreign_delete(model),
                }
            }

            Event::ReportDeleted { id, result } => {
                if model.delete != DeleteFlow::Deleting {
                    debug!(report_id = %id, "delete response ignored");
                    return;
                }
                model.delete = DeleteFlow::Idle;
                match result {
                    Ok(_) => {
                        info!(report_id = %id, "report deleted");
                        if model.detail_target.as_ref() == Some(&id) {
                            Self::teardown(model, caps, ScreenId::ReportDetail);
                            model.detail_target = None;
                        }
                        model.route = Route::Home;
                        Self::refresh_lists(model, caps);
                    }
                    Err(e) if e.is_not_found() => {
                        warn!(report_id = %id, "report already gone");
                        model.notice = Some(e.into());
                    }
                    Err(e) => {
                        let error = Self::store_error(e, "Report could not be deleted");
                        if error.kind == ErrorKind::Auth {
                            Self::fail_closed(model, caps, Some(error));
                        } else {
                            model.notice = Some(error);
                        }
                    }
                }
            }

            Event::NoticeDismissed => model.notice = None,
        }

        caps.render.render();
    }

    fn view(&self, model: &Model) -> ViewModel {
        ViewModel::from_model(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{AuthOperation, KvOperation, StoreOperation};
    use crate::model::{Report, Session, Theme, UserId};
    use crate::Effect;
    use chrono::{TimeZone, Utc};
    use crux_core::testing::AppTester;

    fn config() -> Box<BackendConfig> {
        Box::new(BackendConfig {
            url: "https://abc.supabase.co".into(),
            anon_key: "anon".into(),
            reports_collection: "Reports".into(),
            trends_collection: "trend_analyses".into(),
            profiles_collection: "user_profiles".into(),
        })
    }

    fn session(user: &str) -> Session {
        Session {
            user_id: UserId::new(user),
            email: format!("{user}@example.com"),
            display_name: None,
        }
    }

    fn report(id: &str, owner: &str, secs: i64) -> Report {
        Report {
            id: ReportId::new(id),
            owner_id: UserId::new(owner),
            title: DEFAULT_REPORT_TITLE.into(),
            body: format!("body {id}"),
            created_at: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    fn started() -> (AppTester<App, Effect>, Model) {
        let app = AppTester::<App, Effect>::default();
        let mut model = Model::default();
        let _ = app.update(
            Event::Start {
                config: config(),
                system_theme: Some(Theme::Dark),
            },
            &mut model,
        );
        (app, model)
    }

    fn store_ops(effects: Vec<Effect>) -> Vec<StoreOperation> {
        effects
            .into_iter()
            .filter_map(|e| match e {
                Effect::Store(request) => Some(request.operation),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_events_ignored_until_configured() {
        let app = AppTester::<App, Effect>::default();
        let mut model = Model::default();
        let update = app.update(Event::ScreenMounted(ScreenId::Home), &mut model);
        assert!(update.effects.is_empty());
        assert_eq!(model.home.phase(), Phase::Idle);
    }

    #[test]
    fn test_invalid_config_is_fatal() {
        let app = AppTester::<App, Effect>::default();
        let mut model = Model::default();
        let mut bad = config();
        bad.anon_key = String::new();
        let _ = app.update(
            Event::Start {
                config: bad,
                system_theme: None,
            },
            &mut model,
        );
        assert!(model.config.is_none());
        assert_eq!(model.fatal_error.as_ref().map(|e| e.kind), Some(ErrorKind::Config));
    }

    #[test]
    fn test_start_restores_preferences_and_drops_legacy_password() {
        let app = AppTester::<App, Effect>::default();
        let mut model = Model::default();
        let update = app.update(
            Event::Start {
                config: config(),
                system_theme: Some(Theme::Dark),
            },
            &mut model,
        );
        assert_eq!(model.theme, Theme::Dark);
        let kv: Vec<KvOperation> = update
            .effects
            .into_iter()
            .filter_map(|e| match e {
                Effect::Preferences(request) => Some(request.operation),
                _ => None,
            })
            .collect();
        let deleted: Vec<String> = kv
            .iter()
            .filter_map(|op| match op {
                KvOperation::Delete { key } => Some(key.raw()),
                _ => None,
            })
            .collect();
        assert_eq!(deleted, vec!["session:remembered_password".to_string()]);
        assert!(kv.iter().all(|op| !matches!(op, KvOperation::Set { .. })));
    }

    #[test]
    fn test_start_watches_auth_state() {
        let app = AppTester::<App, Effect>::default();
        let mut model = Model::default();
        let update = app.update(
            Event::Start {
                config: config(),
                system_theme: None,
            },
            &mut model,
        );
        let watching = update.effects.into_iter().any(|e| match e {
            Effect::Auth(request) => request.operation == AuthOperation::WatchSession,
            _ => false,
        });
        assert!(watching);
    }

    #[test]
    fn test_session_lost_elsewhere_fails_closed() {
        let (app, mut model) = started();
        model.session = Some(session("u1"));
        model.route = Route::Reports;
        let _ = app.update(Event::SessionChanged { result: Ok(None) }, &mut model);
        assert_eq!(model.route, Route::SignIn);
        assert!(model.session.is_none());
    }

    #[test]
    fn test_mount_without_cached_session_probes_first() {
        let (app, mut model) = started();
        let update = app.update(Event::ScreenMounted(ScreenId::Home), &mut model);
        let mut probed = false;
        for effect in update.effects {
            match effect {
                Effect::Auth(request) => {
                    probed = request.operation == AuthOperation::GetSession;
                }
                Effect::Store(_) | Effect::ChangeFeed(_) => panic!("fetched before session"),
                _ => {}
            }
        }
        assert!(probed);
        assert_eq!(model.home.phase(), Phase::LoadingInitial);
    }

    #[test]
    fn test_probe_without_session_fails_closed() {
        let (app, mut model) = started();
        let _ = app.update(Event::ScreenMounted(ScreenId::Home), &mut model);
        let instance = model.home.instance().unwrap();
        let _ = app.update(
            Event::SessionProbed {
                screen: ScreenId::Home,
                instance,
                result: Ok(None),
            },
            &mut model,
        );
        assert_eq!(model.route, Route::SignIn);
        assert!(!model.home.is_mounted());
        assert!(model.session.is_none());
    }

    #[test]
    fn test_probe_with_session_starts_fetch() {
        let (app, mut model) = started();
        let _ = app.update(Event::ScreenMounted(ScreenId::Reports), &mut model);
        let instance = model.reports.instance().unwrap();
        let update = app.update(
            Event::SessionProbed {
                screen: ScreenId::Reports,
                instance,
                result: Ok(Some(session("u1"))),
            },
            &mut model,
        );
        let ops = store_ops(update.effects);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].scope().owner_id(), &UserId::new("u1"));
        assert!(model.reports.subscription().is_some());
    }

    #[test]
    fn test_listing_is_normalized_for_owner() {
        let (app, mut model) = started();
        model.session = Some(session("u1"));
        let _ = app.update(Event::ScreenMounted(ScreenId::Home), &mut model);
        let ticket = model.home.in_flight().unwrap();
        let _ = app.update(
            Event::ReportsFetched {
                screen: ScreenId::Home,
                ticket,
                result: Ok(vec![
                    report("a", "u1", 1),
                    report("b", "u2", 9),
                    report("c", "u1", 5),
                ]),
            },
            &mut model,
        );
        let ids: Vec<&str> = model.home.data().unwrap().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);
        assert_eq!(model.home.phase(), Phase::Loaded);
    }

    #[test]
    fn test_unauthorized_listing_fails_closed() {
        let (app, mut model) = started();
        model.session = Some(session("u1"));
        let _ = app.update(Event::ScreenMounted(ScreenId::Home), &mut model);
        let ticket = model.home.in_flight().unwrap();
        let _ = app.update(
            Event::ReportsFetched {
                screen: ScreenId::Home,
                ticket,
                result: Err(StoreError::Unauthorized),
            },
            &mut model,
        );
        assert_eq!(model.route, Route::SignIn);
        assert!(model.home.data().is_none());
    }

    #[test]
    fn test_theme_toggle_persists() {
        let (app, mut model) = started();
        let update = app.update(Event::ThemeToggled, &mut model);
        assert_eq!(model.theme, Theme::Light);
        let written = update.effects.into_iter().any(|e| match e {
            Effect::Preferences(request) => matches!(
                &request.operation,
                KvOperation::Set { key, value } if key.raw() == "settings:theme" && value == "light"
            ),
            _ => false,
        });
        assert!(written);
    }
}
