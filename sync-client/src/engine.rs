//! SyncEngine - the main interface for linksync.
//!
//! This module provides [`SyncEngine`], which authenticates a session,
//! ingests its history and live messages into a store, and shuts the run
//! down cleanly.
//!
//! # Architecture
//!
//! The engine feeds events into the pure phase machine from sync-core and
//! performs the I/O its actions ask for through the [`SessionClient`] and
//! [`Store`] traits.
//!
//! ```text
//! Command surface → SyncEngine → SessionClient → Network
//!                       ↓    ↘
//!             sync-core      Store
//! ```
//!
//! Every exit path ends in the `Closed` phase with the session disconnected
//! and the side-task group joined or aborted.
//!
//! # Example
//!
//! ```ignore
//! use sync_client::{MemoryStore, MockSessionClient, SyncEngine, SyncOptions};
//! use sync_types::SyncMode;
//!
//! let engine = SyncEngine::new(Arc::new(session), Arc::new(store));
//! let options = SyncOptions::new(SyncMode::Bootstrap)
//!     .with_allow_qr(true)
//!     .on_qr_code(|code| println!("{code}"));
//! let result = engine.sync(&CancellationToken::new(), options).await?;
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use sync_core::{Action, CodeDecision, Event, ExitPolicy, PairingTracker, SyncPhase};
use sync_types::{
    MessageId, PairingEvent, SessionEvent, StoredMessage, SyncMode, SyncResult, WarningKind,
};
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::SyncError;
use crate::session::{EventStream, SessionClient};
use crate::store::Store;
use crate::tasks::TaskGroup;

/// Default inactivity window for bounded modes.
pub const DEFAULT_IDLE_EXIT: Duration = Duration::from_secs(30);

/// Default number of concurrent media downloads.
pub const DEFAULT_MAX_MEDIA_DOWNLOADS: usize = 4;

/// Default time a finished run waits for side tasks.
///
/// A bounded run can return up to this long after its exit condition when
/// contact, group or media tasks are still in flight; anything still running
/// afterwards is aborted and reports no warning.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Callback receiving each new pairing payload.
pub type QrCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Options for one [`SyncEngine::sync`] call.
#[derive(Clone)]
pub struct SyncOptions {
    /// Bootstrap, follow or once.
    pub mode: SyncMode,
    /// Permit pairing a new device when no credentials exist.
    pub allow_qr: bool,
    /// Download media of stored messages in the background.
    pub download_media: bool,
    /// Refresh the contact list when ingestion starts.
    pub refresh_contacts: bool,
    /// Refresh the group list when ingestion starts.
    pub refresh_groups: bool,
    /// Finish a bounded run after this long without a stored message.
    ///
    /// Zero disables the idle exit (bootstrap then ends on history complete).
    pub idle_exit: Duration,
    /// Upper bound on concurrent media downloads.
    pub max_media_downloads: usize,
    /// How long a finished bounded run waits for side tasks.
    pub drain_timeout: Duration,
    /// Invoked once per distinct pairing code.
    pub on_qr_code: Option<QrCallback>,
}

impl SyncOptions {
    /// Options for a mode with everything optional switched off.
    pub fn new(mode: SyncMode) -> Self {
        Self {
            mode,
            allow_qr: false,
            download_media: false,
            refresh_contacts: false,
            refresh_groups: false,
            idle_exit: DEFAULT_IDLE_EXIT,
            max_media_downloads: DEFAULT_MAX_MEDIA_DOWNLOADS,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            on_qr_code: None,
        }
    }

    /// Permit pairing.
    pub fn with_allow_qr(mut self, allow: bool) -> Self {
        self.allow_qr = allow;
        self
    }

    /// Download media in the background.
    pub fn with_download_media(mut self, enabled: bool) -> Self {
        self.download_media = enabled;
        self
    }

    /// Refresh contacts.
    pub fn with_refresh_contacts(mut self, enabled: bool) -> Self {
        self.refresh_contacts = enabled;
        self
    }

    /// Refresh groups.
    pub fn with_refresh_groups(mut self, enabled: bool) -> Self {
        self.refresh_groups = enabled;
        self
    }

    /// Set the idle-exit window.
    pub fn with_idle_exit(mut self, idle_exit: Duration) -> Self {
        self.idle_exit = idle_exit;
        self
    }

    /// Set the media download concurrency (at least one).
    pub fn with_max_media_downloads(mut self, max: usize) -> Self {
        self.max_media_downloads = max.max(1);
        self
    }

    /// Set the side-task drain timeout.
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Register the pairing-code callback.
    pub fn on_qr_code<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_qr_code = Some(Arc::new(callback));
        self
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::new(SyncMode::default())
    }
}

impl fmt::Debug for SyncOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncOptions")
            .field("mode", &self.mode)
            .field("allow_qr", &self.allow_qr)
            .field("download_media", &self.download_media)
            .field("refresh_contacts", &self.refresh_contacts)
            .field("refresh_groups", &self.refresh_groups)
            .field("idle_exit", &self.idle_exit)
            .field("max_media_downloads", &self.max_media_downloads)
            .field("drain_timeout", &self.drain_timeout)
            .field("on_qr_code", &self.on_qr_code.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

/// The sync engine.
///
/// Holds the session and store handles. Operations never run concurrently
/// against the same session; callers serialize them.
pub struct SyncEngine<S: SessionClient, St: Store> {
    session: Arc<S>,
    store: Arc<St>,
    last_run: Mutex<Vec<SyncPhase>>,
}

impl<S: SessionClient, St: Store> SyncEngine<S, St> {
    /// Create an engine over a session client and a store.
    pub fn new(session: Arc<S>, store: Arc<St>) -> Self {
        Self {
            session,
            store,
            last_run: Mutex::new(Vec::new()),
        }
    }

    /// Authenticate if needed, ingest, and return what was stored.
    ///
    /// Cancelling `cancel` ends the run at the next suspension point. In
    /// follow mode, cancellation after connecting is the normal way to stop
    /// and returns `Ok`.
    pub async fn sync(
        &self,
        cancel: &CancellationToken,
        options: SyncOptions,
    ) -> Result<SyncResult, SyncError> {
        let mut run = Run::new();
        tracing::info!(mode = %options.mode, allow_qr = options.allow_qr, "sync started");

        let result = self.drive(&mut run, cancel, &options).await;

        run.apply(Event::Closed);
        if run.disconnect {
            self.close().await;
        }

        match &result {
            Ok(summary) => tracing::info!(
                messages_stored = summary.messages_stored,
                warnings = summary.warnings.len(),
                "sync finished"
            ),
            Err(e) => tracing::warn!("sync failed: {}", e),
        }
        *self.last_run.lock().await = run.trace;
        result
    }

    /// Whether credentials exist. Opens the session, never pairs.
    pub async fn is_authed(&self) -> Result<bool, SyncError> {
        self.session.open().await?;
        Ok(self.session.is_authed())
    }

    /// Fail with `Unauthenticated` unless credentials exist.
    pub async fn ensure_authed(&self) -> Result<(), SyncError> {
        if self.is_authed().await? {
            Ok(())
        } else {
            Err(SyncError::Unauthenticated)
        }
    }

    /// Connect with existing credentials. Never pairs.
    pub async fn connect(&self, cancel: &CancellationToken) -> Result<(), SyncError> {
        self.ensure_authed().await?;
        match cancellable(cancel, self.session.connect()).await {
            None => Err(SyncError::Cancelled),
            Some(result) => {
                result?;
                tracing::debug!("session connected");
                Ok(())
            }
        }
    }

    /// Disconnect the session. Safe when not connected.
    pub async fn disconnect(&self) -> Result<(), SyncError> {
        self.session.disconnect().await?;
        Ok(())
    }

    /// Invalidate the session server-side and clear local credentials.
    ///
    /// Requires credentials. The session is disconnected afterwards whatever
    /// the outcome; a failed invalidation is not rolled back.
    pub async fn logout(&self, cancel: &CancellationToken) -> Result<(), SyncError> {
        let result = self.logout_connected(cancel).await;
        self.close().await;
        match &result {
            Ok(()) => tracing::info!("logged out"),
            Err(e) => tracing::warn!("logout failed: {}", e),
        }
        result
    }

    /// Phases visited by the most recent `sync` call.
    pub async fn last_run_phases(&self) -> Vec<SyncPhase> {
        self.last_run.lock().await.clone()
    }

    async fn logout_connected(&self, cancel: &CancellationToken) -> Result<(), SyncError> {
        self.connect(cancel).await?;
        match cancellable(cancel, self.session.logout()).await {
            None => Err(SyncError::Cancelled),
            Some(result) => result.map_err(SyncError::Logout),
        }
    }

    async fn close(&self) {
        if let Err(e) = self.session.disconnect().await {
            tracing::warn!("disconnect failed: {}", e);
        }
    }

    async fn drive(
        &self,
        run: &mut Run,
        cancel: &CancellationToken,
        options: &SyncOptions,
    ) -> Result<SyncResult, SyncError> {
        match cancellable(cancel, self.session.open()).await {
            None => return Err(run.cancelled()),
            Some(result) => result?,
        }

        let authenticated = self.session.is_authed();
        run.apply(Event::Opened { authenticated });
        if !authenticated {
            if !options.allow_qr {
                run.apply(Event::PairingDenied);
                tracing::info!("no credentials and pairing not allowed");
                return Err(SyncError::Unauthenticated);
            }
            let actions = run.apply(Event::PairingAllowed);
            self.pair(run, cancel, options, actions).await?;
        }

        match cancellable(cancel, self.session.connect()).await {
            None => return Err(run.cancelled()),
            Some(Err(e)) => {
                run.apply(Event::ConnectFailed);
                return Err(e.into());
            }
            Some(Ok(())) => {
                run.apply(Event::ConnectSucceeded);
            }
        }

        let policy = ExitPolicy::for_mode(options.mode, options.idle_exit);
        run.apply(Event::IngestStarted { policy });
        tracing::debug!(?policy, "ingestion started");

        let events = match cancellable(cancel, self.open_event_stream()).await {
            None => {
                return if run.apply(Event::Cancelled).contains(&Action::Finish) {
                    tracing::info!("follow stopped before backfill started");
                    Ok(SyncResult::default())
                } else {
                    Err(SyncError::Cancelled)
                };
            }
            Some(Ok(events)) => events,
            Some(Err(e)) => {
                run.apply(Event::ConnectionLost);
                return Err(e);
            }
        };

        let mut tasks = TaskGroup::new(cancel);
        self.spawn_refreshes(&mut tasks, options);

        let outcome = Ingest {
            session: &self.session,
            store: &self.store,
            run: &mut *run,
            tasks: &mut tasks,
            download_media: options.download_media,
            media_slots: Arc::new(Semaphore::new(options.max_media_downloads.max(1))),
            policy,
            stored: 0,
        }
        .run(cancel, events)
        .await;

        let warnings = if outcome.is_ok() && !cancel.is_cancelled() {
            tasks.drain(options.drain_timeout).await
        } else {
            tasks.shutdown().await
        };

        outcome.map(|messages_stored| SyncResult {
            messages_stored,
            warnings,
        })
    }

    async fn open_event_stream(&self) -> Result<EventStream, SyncError> {
        let events = self.session.subscribe().await?;
        self.session.request_backfill().await?;
        Ok(events)
    }

    async fn pair(
        &self,
        run: &mut Run,
        cancel: &CancellationToken,
        options: &SyncOptions,
        mut actions: Vec<Action>,
    ) -> Result<(), SyncError> {
        let mut tracker = PairingTracker::new();

        while actions.contains(&Action::RequestPairingCode) {
            if let Err(e) = tracker.start_stream() {
                tracing::warn!("pairing failed: {}", e);
                return Err(SyncError::Connection(e.to_string()));
            }
            let mut codes = match cancellable(cancel, self.session.pairing_codes()).await {
                None => return Err(run.cancelled()),
                Some(result) => result?,
            };

            actions = loop {
                let Some(event) = cancellable(cancel, codes.recv()).await else {
                    return Err(run.cancelled());
                };
                match event {
                    Some(PairingEvent::Code(code)) => match tracker.observe(&code) {
                        CodeDecision::Show => {
                            let actions = run.apply(Event::PairingCodeIssued);
                            if actions.contains(&Action::ShowPairingCode) {
                                tracing::info!(shown = tracker.shown(), "pairing code issued");
                                if let Some(callback) = &options.on_qr_code {
                                    callback(code.as_str());
                                }
                            }
                        }
                        CodeDecision::Duplicate => {
                            tracing::debug!(?code, "pairing code already shown");
                        }
                        CodeDecision::Blank => tracing::warn!("ignoring blank pairing code"),
                    },
                    Some(PairingEvent::Success) => {
                        run.apply(Event::Paired);
                        tracing::info!("device paired");
                        return Ok(());
                    }
                    Some(PairingEvent::Failed(reason)) => {
                        run.apply(Event::PairingRejected);
                        tracing::warn!(%reason, "pairing rejected");
                        return Err(SyncError::Unauthenticated);
                    }
                    Some(PairingEvent::Expired) | None => {
                        tracing::debug!(
                            streams = tracker.streams(),
                            "pairing codes expired, requesting new ones"
                        );
                        break run.apply(Event::PairingCodeExpired);
                    }
                }
            };
        }

        // The phase machine stopped asking for codes
        Err(SyncError::Unauthenticated)
    }

    fn spawn_refreshes(&self, tasks: &mut TaskGroup, options: &SyncOptions) {
        if options.refresh_contacts {
            let session = Arc::clone(&self.session);
            let store = Arc::clone(&self.store);
            tasks.spawn(WarningKind::RefreshContacts, async move {
                let contacts = session.fetch_contacts().await.map_err(|e| e.to_string())?;
                store
                    .store_contacts(&contacts)
                    .await
                    .map_err(|e| e.to_string())?;
                tracing::debug!(count = contacts.len(), "contacts refreshed");
                Ok::<(), String>(())
            });
        }
        if options.refresh_groups {
            let session = Arc::clone(&self.session);
            let store = Arc::clone(&self.store);
            tasks.spawn(WarningKind::RefreshGroups, async move {
                let groups = session.fetch_groups().await.map_err(|e| e.to_string())?;
                store.store_groups(&groups).await.map_err(|e| e.to_string())?;
                tracing::debug!(count = groups.len(), "groups refreshed");
                Ok::<(), String>(())
            });
        }
    }
}

/// Phase bookkeeping for one sync call.
struct Run {
    phase: SyncPhase,
    trace: Vec<SyncPhase>,
    disconnect: bool,
}

impl Run {
    fn new() -> Self {
        let phase = SyncPhase::new();
        Self {
            trace: vec![phase.clone()],
            phase,
            disconnect: false,
        }
    }

    fn apply(&mut self, event: Event) -> Vec<Action> {
        let (next, actions) = self.phase.clone().on_event(event);
        if next != self.phase {
            tracing::debug!(from = self.phase.name(), to = next.name(), "sync phase");
            self.trace.push(next.clone());
        }
        self.phase = next;
        self.disconnect |= actions.contains(&Action::Disconnect);
        actions
    }

    fn cancelled(&mut self) -> SyncError {
        self.apply(Event::Cancelled);
        SyncError::Cancelled
    }
}

/// The ingestion loop and its state.
struct Ingest<'a, S, St> {
    session: &'a Arc<S>,
    store: &'a Arc<St>,
    run: &'a mut Run,
    tasks: &'a mut TaskGroup,
    download_media: bool,
    media_slots: Arc<Semaphore>,
    policy: ExitPolicy,
    stored: u64,
}

impl<S: SessionClient, St: Store> Ingest<'_, S, St> {
    async fn run(
        mut self,
        cancel: &CancellationToken,
        mut events: EventStream,
    ) -> Result<u64, SyncError> {
        let mut deadline = self.policy.deadline_after(Instant::now());

        loop {
            let idle = async move {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return if self.finishes(Event::Cancelled) {
                        tracing::info!(messages_stored = self.stored, "follow stopped");
                        Ok(self.stored)
                    } else {
                        Err(SyncError::Cancelled)
                    };
                }
                event = events.recv() => match event {
                    Some(SessionEvent::Message(message)) => {
                        if self.store_message(message).await? {
                            deadline = self.policy.deadline_after(Instant::now());
                        }
                    }
                    Some(SessionEvent::HistoryBatch(batch)) => {
                        tracing::debug!(size = batch.len(), "history batch");
                        let mut reset = false;
                        for message in batch {
                            reset |= self.store_message(message).await?;
                        }
                        if reset {
                            deadline = self.policy.deadline_after(Instant::now());
                        }
                    }
                    Some(SessionEvent::HistoryComplete) => {
                        tracing::debug!(messages_stored = self.stored, "history complete");
                        if self.finishes(Event::HistoryComplete) {
                            return Ok(self.stored);
                        }
                    }
                    Some(SessionEvent::Disconnected { reason }) => {
                        self.run.apply(Event::ConnectionLost);
                        return Err(SyncError::Connection(reason));
                    }
                    None => {
                        return if self.finishes(Event::StreamEnded) {
                            Ok(self.stored)
                        } else {
                            Err(SyncError::Connection("event stream closed".into()))
                        };
                    }
                },
                _ = idle => {
                    if self.finishes(Event::IdleElapsed) {
                        tracing::info!(messages_stored = self.stored, "idle exit");
                        return Ok(self.stored);
                    }
                }
            }
        }
    }

    fn finishes(&mut self, event: Event) -> bool {
        self.run.apply(event).contains(&Action::Finish)
    }

    /// Store one message. Returns whether the idle timer should restart.
    async fn store_message(&mut self, message: StoredMessage) -> Result<bool, SyncError> {
        if let Err(e) = self.store.store_message(&message).await {
            tracing::error!(id = %message.id, "store rejected message: {}", e);
            self.run.apply(Event::StoreFailed);
            return Err(SyncError::Store(e));
        }
        self.stored += 1;
        let actions = self.run.apply(Event::MessageStored);

        if self.download_media {
            if let Some(media) = message.media {
                self.spawn_media(message.id, media);
            }
        }
        Ok(actions.contains(&Action::ResetIdleTimer))
    }

    fn spawn_media(&mut self, id: MessageId, media: sync_types::MediaRef) {
        let session = Arc::clone(self.session);
        let store = Arc::clone(self.store);
        let slots = Arc::clone(&self.media_slots);
        self.tasks.spawn(WarningKind::Media, async move {
            let _permit = slots.acquire_owned().await.map_err(|e| e.to_string())?;
            let bytes = session
                .download_media(&media)
                .await
                .map_err(|e| format!("{}: {}", id, e))?;
            store
                .store_media(&id, &bytes)
                .await
                .map_err(|e| format!("{}: {}", id, e))?;
            tracing::debug!(%id, size = bytes.len(), "media saved");
            Ok::<(), String>(())
        });
    }
}

async fn cancellable<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        output = fut => Some(output),
    }
}
