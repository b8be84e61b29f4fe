//! Mock session client for testing.
//!
//! Allows scripting pairing rounds, queueing events, forcing failures and
//! inspecting how the engine drove the session.

use super::{EventStream, PairingStream, SessionClient, SessionError};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use sync_types::{Contact, Group, MediaRef, PairingEvent, SessionEvent};
use tokio::sync::mpsc;

const STREAM_CAPACITY: usize = 256;

/// Mock session client for testing.
///
/// Clones share state, so a test can keep one handle while the engine owns
/// another.
#[derive(Debug, Default)]
pub struct MockSessionClient {
    inner: Arc<Mutex<MockSessionInner>>,
}

#[derive(Debug, Default)]
struct MockSessionInner {
    authed: bool,
    opened: bool,
    connected: bool,
    open_calls: u32,
    connect_calls: u32,
    disconnect_calls: u32,
    logout_calls: u32,
    backfill_requests: u32,
    pairing_requests: u32,
    pairing_rounds: VecDeque<Vec<PairingEvent>>,
    // Keeps the pairing stream open once scripted rounds run out.
    pairing_hold: Option<mpsc::Sender<PairingEvent>>,
    queued_events: VecDeque<SessionEvent>,
    event_tx: Option<mpsc::Sender<SessionEvent>>,
    end_events_after_queue: bool,
    contacts: Vec<Contact>,
    groups: Vec<Group>,
    media: HashMap<String, Vec<u8>>,
    fail_next_open: Option<String>,
    fail_next_connect: Option<String>,
    fail_contacts: Option<String>,
    fail_groups: Option<String>,
    fail_media: Option<String>,
    fail_logout: Option<String>,
    stall_backfill: bool,
    stall_contacts: bool,
}

impl MockSessionClient {
    /// Create a new, unauthenticated mock session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock session that already holds credentials.
    pub fn authenticated() -> Self {
        let session = Self::new();
        session.set_authed(true);
        session
    }

    /// Set whether credentials exist.
    pub fn set_authed(&self, authed: bool) {
        self.inner.lock().unwrap().authed = authed;
    }

    /// Script the events of the next pairing stream.
    ///
    /// A round containing `Success` marks the session authenticated when the
    /// stream is handed out. Once all rounds are used, further streams stay
    /// open without yielding anything.
    pub fn queue_pairing_round(&self, events: Vec<PairingEvent>) {
        self.inner.lock().unwrap().pairing_rounds.push_back(events);
    }

    /// Queue an event for the event stream.
    ///
    /// Delivered immediately if a subscriber exists, otherwise on subscribe.
    pub fn push_event(&self, event: SessionEvent) {
        let mut inner = self.inner.lock().unwrap();
        match &inner.event_tx {
            Some(tx) => {
                let _ = tx.try_send(event);
            }
            None => inner.queued_events.push_back(event),
        }
    }

    /// Close the event stream once the queued events have been delivered.
    pub fn end_events_after_queue(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.end_events_after_queue = true;
        if inner.queued_events.is_empty() {
            inner.event_tx = None;
        }
    }

    /// Contacts returned by `fetch_contacts()`.
    pub fn set_contacts(&self, contacts: Vec<Contact>) {
        self.inner.lock().unwrap().contacts = contacts;
    }

    /// Groups returned by `fetch_groups()`.
    pub fn set_groups(&self, groups: Vec<Group>) {
        self.inner.lock().unwrap().groups = groups;
    }

    /// Bytes returned for a media direct path.
    pub fn add_media(&self, direct_path: &str, bytes: Vec<u8>) {
        self.inner
            .lock()
            .unwrap()
            .media
            .insert(direct_path.to_string(), bytes);
    }

    /// Cause the next open() to fail with the given error.
    pub fn fail_next_open(&self, error: &str) {
        self.inner.lock().unwrap().fail_next_open = Some(error.to_string());
    }

    /// Cause the next connect() to fail with the given error.
    pub fn fail_next_connect(&self, error: &str) {
        self.inner.lock().unwrap().fail_next_connect = Some(error.to_string());
    }

    /// Make every fetch_contacts() fail with the given error.
    pub fn fail_contacts(&self, error: &str) {
        self.inner.lock().unwrap().fail_contacts = Some(error.to_string());
    }

    /// Make every fetch_groups() fail with the given error.
    pub fn fail_groups(&self, error: &str) {
        self.inner.lock().unwrap().fail_groups = Some(error.to_string());
    }

    /// Make every download_media() fail with the given error.
    pub fn fail_media(&self, error: &str) {
        self.inner.lock().unwrap().fail_media = Some(error.to_string());
    }

    /// Cause the next logout() to fail with the given error.
    pub fn fail_next_logout(&self, error: &str) {
        self.inner.lock().unwrap().fail_logout = Some(error.to_string());
    }

    /// Make request_backfill() hang until the caller gives up on it.
    pub fn stall_backfill(&self) {
        self.inner.lock().unwrap().stall_backfill = true;
    }

    /// Make fetch_contacts() hang until its task is aborted.
    pub fn stall_contacts(&self) {
        self.inner.lock().unwrap().stall_contacts = true;
    }

    /// Number of open() calls.
    pub fn open_calls(&self) -> u32 {
        self.inner.lock().unwrap().open_calls
    }

    /// Number of successful connect() calls.
    pub fn connect_calls(&self) -> u32 {
        self.inner.lock().unwrap().connect_calls
    }

    /// Number of disconnect() calls.
    pub fn disconnect_calls(&self) -> u32 {
        self.inner.lock().unwrap().disconnect_calls
    }

    /// Number of successful logout() calls.
    pub fn logout_calls(&self) -> u32 {
        self.inner.lock().unwrap().logout_calls
    }

    /// Number of backfill requests.
    pub fn backfill_requests(&self) -> u32 {
        self.inner.lock().unwrap().backfill_requests
    }

    /// Number of pairing streams requested.
    pub fn pairing_requests(&self) -> u32 {
        self.inner.lock().unwrap().pairing_requests
    }

    /// Whether open() has succeeded at least once.
    pub fn is_opened(&self) -> bool {
        self.inner.lock().unwrap().opened
    }
}

impl Clone for MockSessionClient {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl SessionClient for MockSessionClient {
    async fn open(&self) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().unwrap();
        inner.open_calls += 1;

        // Check for forced failure
        if let Some(error) = inner.fail_next_open.take() {
            return Err(SessionError::ConnectionFailed(error));
        }

        inner.opened = true;
        Ok(())
    }

    fn is_authed(&self) -> bool {
        self.inner.lock().unwrap().authed
    }

    async fn pairing_codes(&self) -> Result<PairingStream, SessionError> {
        let mut inner = self.inner.lock().unwrap();
        inner.pairing_requests += 1;

        let Some(round) = inner.pairing_rounds.pop_front() else {
            let (tx, rx) = mpsc::channel(1);
            inner.pairing_hold = Some(tx);
            return Ok(rx);
        };

        if round.contains(&PairingEvent::Success) {
            inner.authed = true;
        }
        let (tx, rx) = mpsc::channel(round.len().max(1));
        for event in round {
            let _ = tx.try_send(event);
        }
        Ok(rx)
    }

    async fn connect(&self) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().unwrap();

        // Check for forced failure
        if let Some(error) = inner.fail_next_connect.take() {
            return Err(SessionError::ConnectionFailed(error));
        }
        if !inner.authed {
            return Err(SessionError::NotAuthenticated);
        }

        inner.connected = true;
        inner.connect_calls += 1;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.inner.lock().unwrap().connected
    }

    async fn subscribe(&self) -> Result<EventStream, SessionError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.connected {
            return Err(SessionError::NotConnected);
        }

        let capacity = STREAM_CAPACITY.max(inner.queued_events.len() + 1);
        let (tx, rx) = mpsc::channel(capacity);
        while let Some(event) = inner.queued_events.pop_front() {
            let _ = tx.try_send(event);
        }
        if !inner.end_events_after_queue {
            inner.event_tx = Some(tx);
        }
        Ok(rx)
    }

    async fn request_backfill(&self) -> Result<(), SessionError> {
        let stall = {
            let mut inner = self.inner.lock().unwrap();
            if !inner.connected {
                return Err(SessionError::NotConnected);
            }
            inner.backfill_requests += 1;
            inner.stall_backfill
        };
        if stall {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn fetch_contacts(&self) -> Result<Vec<Contact>, SessionError> {
        let stall = self.inner.lock().unwrap().stall_contacts;
        if stall {
            std::future::pending::<()>().await;
        }
        let inner = self.inner.lock().unwrap();
        if let Some(error) = &inner.fail_contacts {
            return Err(SessionError::Protocol(error.clone()));
        }
        Ok(inner.contacts.clone())
    }

    async fn fetch_groups(&self) -> Result<Vec<Group>, SessionError> {
        let inner = self.inner.lock().unwrap();
        if let Some(error) = &inner.fail_groups {
            return Err(SessionError::Protocol(error.clone()));
        }
        Ok(inner.groups.clone())
    }

    async fn download_media(&self, media: &MediaRef) -> Result<Vec<u8>, SessionError> {
        let inner = self.inner.lock().unwrap();
        if let Some(error) = &inner.fail_media {
            return Err(SessionError::Media(error.clone()));
        }
        inner
            .media
            .get(&media.direct_path)
            .cloned()
            .ok_or_else(|| SessionError::Media(format!("no media at {}", media.direct_path)))
    }

    async fn logout(&self) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.connected {
            return Err(SessionError::NotConnected);
        }
        if let Some(error) = inner.fail_logout.take() {
            return Err(SessionError::Protocol(error));
        }
        inner.authed = false;
        inner.logout_calls += 1;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().unwrap();
        inner.connected = false;
        inner.disconnect_calls += 1;
        inner.event_tx = None;
        inner.pairing_hold = None;
        Ok(())
    }
}
