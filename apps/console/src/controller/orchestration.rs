//! Orchestration from operator actions to data-layer calls and view updates.

use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Instant,
};

use data_access::{field_errors, DataAccess, Subscription};
use shared::{
    domain::{UserFilters, UserId},
    protocol::{ChangeEvent, ExportEnvelope},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

use crate::controller::{
    events::{ConnectionStatus, Notification, UiError, UiErrorContext, UiEvent},
    reducer::{FormMode, FormValues, TableStatus, ViewState},
};

/// Monotonic request counter; only the latest issued token may apply its result.
#[derive(Debug, Default)]
pub struct ReloadToken {
    issued: AtomicU64,
}

impl ReloadToken {
    pub fn issue(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_current(&self, token: u64) -> bool {
        self.issued.load(Ordering::SeqCst) == token
    }
}

pub fn export_file_name(envelope: &ExportEnvelope) -> String {
    format!(
        "usuarios-export-{}.json",
        envelope.metadata.export_date.format("%Y-%m-%d")
    )
}

/// Clears the in-flight flag however the submission ends, including cancellation.
struct SubmitGuard<'a>(&'a AtomicBool);

impl<'a> SubmitGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Controller {
    dal: Arc<DataAccess>,
    state: Mutex<ViewState>,
    submitting: AtomicBool,
    list_reloads: ReloadToken,
    stats_reloads: ReloadToken,
    events: broadcast::Sender<UiEvent>,
    subscription: Mutex<Option<Subscription>>,
}

impl Controller {
    pub fn new(dal: Arc<DataAccess>) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            dal,
            state: Mutex::new(ViewState::default()),
            submitting: AtomicBool::new(false),
            list_reloads: ReloadToken::default(),
            stats_reloads: ReloadToken::default(),
            events,
            subscription: Mutex::new(None),
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<UiEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> ViewState {
        let mut state = self.state.lock().await.clone();
        state.form.submitting = self.submitting.load(Ordering::Acquire);
        state
    }

    /// Pending notifications, oldest first, dropping the ones past their lifetime.
    pub async fn drain_notifications(&self) -> Vec<Notification> {
        let mut state = self.state.lock().await;
        state.prune_notifications(Instant::now());
        std::mem::take(&mut state.notifications)
    }

    fn emit(&self, event: UiEvent) {
        // No listener is fine.
        let _ = self.events.send(event);
    }

    async fn notify(&self, notification: Notification) {
        debug!(kind = ?notification.kind, text = %notification.message, "controller: notify");
        self.state
            .lock()
            .await
            .notifications
            .push(notification.clone());
        self.emit(UiEvent::Notified(notification));
    }

    async fn report(&self, err: UiError) {
        error!(
            context = ?err.context(),
            category = ?err.category(),
            reason = err.message(),
            "controller: operation failed"
        );
        self.notify(err.notification()).await;
    }

    async fn set_connection(&self, status: ConnectionStatus) {
        self.state.lock().await.connection = Some(status.clone());
        self.emit(UiEvent::Connection(status));
    }

    /// Initializes the data layer and reports the connection outcome.
    pub async fn connect(&self) -> bool {
        self.set_connection(ConnectionStatus::Connecting {
            source: self.dal.source().to_string(),
        })
        .await;

        match self.dal.init().await {
            Ok(()) => {
                self.set_connection(ConnectionStatus::Connected).await;
                self.notify(Notification::success("Connected to the database"))
                    .await;
                true
            }
            Err(err) => {
                self.set_connection(ConnectionStatus::Failed).await;
                self.report(UiError::from_data_error(UiErrorContext::Startup, &err))
                    .await;
                false
            }
        }
    }

    /// Connects, renders the first listing and stats, then follows remote changes.
    pub async fn start(self: &Arc<Self>) -> bool {
        if !self.connect().await {
            return false;
        }
        self.refresh().await;
        self.follow_changes().await;
        true
    }

    async fn follow_changes(self: &Arc<Self>) {
        let controller = Arc::downgrade(self);
        let subscription = self
            .dal
            .subscribe(move |event| {
                let Some(controller) = controller.upgrade() else {
                    return;
                };
                tokio::spawn(async move {
                    controller.on_remote_change(event).await;
                });
            })
            .await;

        if subscription.is_none() {
            warn!("controller: live updates unavailable");
        }
        *self.subscription.lock().await = subscription;
    }

    pub async fn is_following_changes(&self) -> bool {
        self.subscription
            .lock()
            .await
            .as_ref()
            .is_some_and(Subscription::is_active)
    }

    pub async fn stop_following_changes(&self) {
        if let Some(subscription) = self.subscription.lock().await.take() {
            subscription.unsubscribe();
        }
    }

    pub async fn on_remote_change(&self, event: ChangeEvent) {
        info!(kind = ?event.kind, user_id = ?event.user_id(), "controller: remote change");
        self.emit(UiEvent::RemoteChange(event));
        self.refresh().await;
    }

    /// Re-fetches the listing for the current filters.
    ///
    /// Returns `false` when the read failed or a newer reload superseded this one.
    pub async fn reload(&self) -> bool {
        let token = self.list_reloads.issue();
        let filters = {
            let mut state = self.state.lock().await;
            state.table = TableStatus::Loading;
            state.filters.clone()
        };

        let result = self.dal.read(&filters).await;

        let mut state = self.state.lock().await;
        if !self.list_reloads.is_current(token) {
            debug!(token, "controller: discarding superseded listing");
            return false;
        }
        match result {
            Ok(records) => {
                let count = records.len();
                state.apply_records(records);
                self.emit(UiEvent::ListRendered { count });
                true
            }
            Err(err) => {
                let err = UiError::from_data_error(UiErrorContext::Reload, &err);
                warn!(category = ?err.category(), "controller: listing failed");
                state.table = TableStatus::Error(err.message().to_string());
                self.emit(UiEvent::ListFailed);
                false
            }
        }
    }

    pub async fn load_stats(&self) -> bool {
        let token = self.stats_reloads.issue();
        let stats = self.dal.stats().await;

        let mut state = self.state.lock().await;
        if !self.stats_reloads.is_current(token) {
            debug!(token, "controller: discarding superseded stats");
            return false;
        }
        state.stats = stats;
        self.emit(UiEvent::StatsUpdated(stats));
        true
    }

    async fn refresh(&self) {
        tokio::join!(self.reload(), self.load_stats());
        self.emit(UiEvent::Refreshed);
    }

    pub async fn set_form(&self, values: FormValues) {
        self.state.lock().await.form.values = values;
    }

    /// Creates or updates from the current form, depending on the edit target.
    ///
    /// Returns `false` without a write while another submission is in flight.
    pub async fn submit(&self) -> bool {
        let Some(in_flight) = SubmitGuard::acquire(&self.submitting) else {
            debug!("controller: submit ignored, one already in flight");
            return false;
        };

        let (input, mode) = {
            let mut state = self.state.lock().await;
            let input = state.form.values.to_input();
            let errors = field_errors(&input);
            if !errors.is_empty() {
                debug!(?errors, "controller: form rejected locally");
                state.form.errors = errors;
                return false;
            }
            state.form.errors.clear();
            (input, state.form.mode)
        };

        let result = match mode {
            FormMode::Add => self.dal.create(&input).await,
            FormMode::Edit(id) => self.dal.update(id, &input).await,
        };
        drop(in_flight);

        match result {
            Ok(user) => {
                let message = match mode {
                    FormMode::Add => "User created",
                    FormMode::Edit(_) => "User updated",
                };
                info!(user_id = user.id.0, outcome = message, "controller: form submitted");
                self.notify(Notification::success(message)).await;
                self.state.lock().await.reset_form();
                self.refresh().await;
                true
            }
            Err(err) => {
                self.report(UiError::from_data_error(UiErrorContext::Submit, &err))
                    .await;
                false
            }
        }
    }

    pub async fn submit_form(&self, values: FormValues) -> bool {
        self.set_form(values).await;
        self.submit().await
    }

    pub async fn begin_edit(&self, id: UserId) -> bool {
        match self.dal.read_one(id).await {
            Ok(user) => {
                self.state.lock().await.begin_edit(&user);
                self.notify(Notification::info(format!("Editing user: {}", user.nombre)))
                    .await;
                true
            }
            Err(err) => {
                self.report(UiError::from_data_error(UiErrorContext::Edit, &err))
                    .await;
                false
            }
        }
    }

    pub async fn cancel_edit(&self) {
        self.state.lock().await.reset_form();
        self.notify(Notification::warning("Edit cancelled")).await;
    }

    pub async fn clear_form(&self) {
        self.state.lock().await.reset_form();
    }

    pub async fn apply_filters(&self, filters: UserFilters) -> bool {
        self.state.lock().await.filters = filters.normalized();
        self.reload().await
    }

    pub async fn reset_filters(&self) -> bool {
        self.state.lock().await.filters = UserFilters::default();
        self.reload().await
    }

    /// Stages `id` for deletion and opens the confirmation naming the user.
    pub async fn request_delete(&self, id: UserId) {
        let known = self.state.lock().await.record_name(id);
        let nombre = match known {
            Some(nombre) => Some(nombre),
            None => self.dal.read_one(id).await.ok().map(|user| user.nombre),
        };
        self.state
            .lock()
            .await
            .stage_delete(id, nombre.as_deref());
    }

    pub async fn confirm_delete(&self) -> bool {
        let Some(id) = self.state.lock().await.pending_delete_id else {
            return false;
        };

        let result = self.dal.delete(id).await;
        self.state.lock().await.close_modal();

        match result {
            Ok(()) => {
                self.notify(Notification::success("User deleted")).await;
                self.refresh().await;
                true
            }
            Err(err) => {
                self.report(UiError::from_data_error(UiErrorContext::Delete, &err))
                    .await;
                false
            }
        }
    }

    pub async fn dismiss_delete(&self) {
        self.state.lock().await.close_modal();
    }

    /// Writes every record as pretty JSON under `dir`; returns the written path.
    pub async fn export(&self, dir: &Path) -> Option<PathBuf> {
        let Some(envelope) = self.dal.export().await else {
            self.report(UiError::from_message(
                UiErrorContext::Export,
                "Error exporting data",
            ))
            .await;
            return None;
        };

        let path = dir.join(export_file_name(&envelope));
        match write_export(&path, &envelope).await {
            Ok(()) => {
                info!(path = %path.display(), count = envelope.metadata.record_count, "controller: export written");
                self.notify(Notification::success(format!(
                    "Data exported to {}",
                    path.display()
                )))
                .await;
                Some(path)
            }
            Err(err) => {
                warn!(path = %path.display(), %err, "controller: export write failed");
                self.report(UiError::from_message(
                    UiErrorContext::Export,
                    "Error exporting data",
                ))
                .await;
                None
            }
        }
    }
}

async fn write_export(path: &Path, envelope: &ExportEnvelope) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let body = serde_json::to_string_pretty(envelope)?;
    tokio::fs::write(path, body).await?;
    Ok(())
}

#[cfg(test)]
#[path = "tests/orchestration_tests.rs"]
mod tests;
