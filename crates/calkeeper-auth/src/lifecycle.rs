//! Credential lifecycle: load, validate, refresh, clear.
//!
//! [`TokenLifecycleManager`] owns the single in-memory [`CredentialRecord`]
//! and the refresh timer bound to its expiry. Cloning the manager yields
//! another handle to the same state.
//!
//! ```text
//!   Unloaded ──load_saved/save──▶ Loaded-Valid ──expiry──▶ Loaded-Expired
//!      ▲                             ▲   │                      │
//!      │                             │   └──timer: refresh──────┤
//!      │                             └────validate: refresh─────┘
//!      └──────────────── clear ──────────────────────────────────
//! ```
//!
//! The record and the timer handle sit behind one async mutex. Refreshes
//! hold it for the duration of the token request, so a timer-driven
//! refresh never races an inline refresh from [`validate`] or a `save`.
//!
//! [`validate`]: TokenLifecycleManager::validate

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use calkeeper_core::{EpochMillis, delay_until, format_millis, now_millis};

use crate::error::{AuthError, AuthErrorCode, AuthResult};
use crate::oauth::OAuthClient;
use crate::record::CredentialRecord;
use crate::store::CredentialStore;

/// Tuning for [`TokenLifecycleManager`].
#[derive(Debug, Clone, Default)]
pub struct LifecycleConfig {
    /// How long before expiry the proactive refresh fires.
    ///
    /// Only shifts the timer; [`TokenLifecycleManager::validate`] still
    /// treats the token as valid until its actual expiry.
    pub refresh_lead: Duration,

    /// Whether [`TokenLifecycleManager::clear`] also deletes the durable
    /// record. Off by default: a kept file is re-checked by `load_saved`
    /// on next start.
    pub delete_on_clear: bool,
}

impl LifecycleConfig {
    /// Sets the refresh lead time.
    pub fn with_refresh_lead(mut self, lead: Duration) -> Self {
        self.refresh_lead = lead;
        self
    }

    /// Sets whether `clear` deletes the durable record.
    pub fn with_delete_on_clear(mut self, delete: bool) -> Self {
        self.delete_on_clear = delete;
        self
    }
}

#[derive(Debug, Default)]
struct State {
    record: Option<CredentialRecord>,
    timer: Option<JoinHandle<()>>,
    /// Bumped whenever the timer is replaced or cancelled. A timer task
    /// that wakes up with a stale generation does nothing.
    generation: u64,
}

impl State {
    fn cancel_timer(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

struct Inner {
    store: CredentialStore,
    client: Arc<dyn OAuthClient>,
    config: LifecycleConfig,
    state: Mutex<State>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.state.get_mut().cancel_timer();
    }
}

/// Owner of the process's single OAuth credential.
#[derive(Clone)]
pub struct TokenLifecycleManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for TokenLifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenLifecycleManager")
            .field("store", &self.inner.store)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl TokenLifecycleManager {
    /// Creates a manager in the Unloaded state.
    pub fn new(store: CredentialStore, client: Arc<dyn OAuthClient>) -> Self {
        Self::with_config(store, client, LifecycleConfig::default())
    }

    /// Creates a manager with explicit tuning.
    pub fn with_config(
        store: CredentialStore,
        client: Arc<dyn OAuthClient>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                client,
                config,
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Returns the backing store.
    pub fn store(&self) -> &CredentialStore {
        &self.inner.store
    }

    /// Loads the durable record and adopts it.
    ///
    /// Returns `false` without raising when there is no record, when it
    /// cannot be read or parsed, or when it carries no access token; the
    /// caller is expected to fall back to interactive authorization.
    pub async fn load_saved(&self) -> bool {
        let record = match self.inner.store.load() {
            Ok(record) => record,
            Err(e) if e.is_not_found() => {
                debug!(path = %self.inner.store.path().display(), "no saved credentials");
                return false;
            }
            Err(e) => {
                warn!(error = %e, "ignoring unreadable saved credentials");
                return false;
            }
        };

        if !record.is_usable() {
            warn!(
                path = %self.inner.store.path().display(),
                "saved credentials have no access token"
            );
            return false;
        }

        let mut state = self.inner.state.lock().await;
        self.adopt(&mut state, record, Origin::Loaded);
        info!(path = %self.inner.store.path().display(), "loaded saved credentials");
        true
    }

    /// Persists `record`, then adopts it and re-arms the refresh timer.
    ///
    /// A failed write leaves the in-memory state untouched.
    pub async fn save(&self, record: CredentialRecord) -> AuthResult<()> {
        let mut state = self.inner.state.lock().await;
        self.persist_and_adopt(&mut state, record, Origin::Loaded)
    }

    /// Reports whether the current credential can be used right now.
    ///
    /// An expired credential gets exactly one inline refresh attempt. A
    /// failed refresh is logged and reported as `false`.
    pub async fn validate(&self) -> bool {
        let mut state = self.inner.state.lock().await;

        match state.record.as_ref() {
            None => return false,
            Some(record) if !record.is_usable() => return false,
            Some(record) if record.is_fresh() => return true,
            Some(_) => {}
        }

        debug!("access token expired, refreshing inline");
        match self.refresh_locked(&mut state).await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "token refresh failed, re-authentication required");
                false
            }
        }
    }

    /// Refreshes the access token and saves the result.
    ///
    /// Every failure is reported as a `RefreshFailed` error and leaves the
    /// in-memory record unchanged.
    pub async fn refresh(&self) -> AuthResult<CredentialRecord> {
        let mut state = self.inner.state.lock().await;
        self.refresh_locked(&mut state).await
    }

    /// Validates the credential and returns its access token.
    pub async fn access_token(&self) -> Option<String> {
        if !self.validate().await {
            return None;
        }
        self.current().await.map(|r| r.access_token)
    }

    /// Returns a copy of the in-memory record.
    pub async fn current(&self) -> Option<CredentialRecord> {
        self.inner.state.lock().await.record.clone()
    }

    /// True while a proactive refresh is scheduled.
    pub async fn has_pending_refresh(&self) -> bool {
        self.inner
            .state
            .lock()
            .await
            .timer
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }

    /// Cancels the refresh timer and forgets the in-memory record.
    ///
    /// The durable record is kept unless `delete_on_clear` is set.
    pub async fn clear(&self) {
        let mut state = self.inner.state.lock().await;
        state.cancel_timer();
        state.record = None;
        self.inner.client.set_credentials(None);

        if self.inner.config.delete_on_clear
            && let Err(e) = self.inner.store.remove()
        {
            warn!(error = %e, "failed to delete saved credentials");
        }
        info!("credentials cleared");
    }

    fn persist_and_adopt(
        &self,
        state: &mut State,
        record: CredentialRecord,
        origin: Origin,
    ) -> AuthResult<()> {
        self.inner.store.save(&record)?;
        self.adopt(state, record, origin);
        Ok(())
    }

    fn adopt(&self, state: &mut State, record: CredentialRecord, origin: Origin) {
        self.inner.client.set_credentials(Some(&record));
        state.cancel_timer();
        if let Some(expiry) = record.expiry_date {
            match refresh_delay(expiry, now_millis(), self.inner.config.refresh_lead, origin) {
                Some(delay) => {
                    state.timer = Some(self.arm_timer(expiry, delay, state.generation));
                }
                None => warn!(
                    expiry = %format_millis(expiry),
                    "refreshed token is already expired; not scheduling another refresh"
                ),
            }
        }
        state.record = Some(record);
    }

    fn arm_timer(&self, expiry: EpochMillis, delay: Duration, generation: u64) -> JoinHandle<()> {
        debug!(
            expiry = %format_millis(expiry),
            delay_secs = delay.as_secs(),
            "scheduled proactive refresh"
        );

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                TokenLifecycleManager { inner }
                    .proactive_refresh(generation)
                    .await;
            }
        })
    }

    async fn proactive_refresh(&self, generation: u64) {
        let mut state = self.inner.state.lock().await;
        if state.generation != generation {
            return;
        }
        // This task is the timer; drop its handle so re-arming does not
        // abort the task that is doing the re-arming.
        state.timer = None;

        match self.refresh_locked(&mut state).await {
            Ok(_) => info!("proactive token refresh succeeded"),
            Err(e) => warn!(error = %e, "proactive token refresh failed"),
        }
    }

    #[tracing::instrument(skip_all, name = "token_refresh")]
    async fn refresh_locked(&self, state: &mut State) -> AuthResult<CredentialRecord> {
        let current = state
            .record
            .clone()
            .ok_or_else(|| AuthError::refresh_failed("no credentials loaded"))?;

        let refreshed = self
            .inner
            .client
            .refresh(&current)
            .await
            .map_err(|e| match e.code() {
                AuthErrorCode::RefreshFailed => e,
                _ => AuthError::refresh_failed("token refresh failed").with_source(e),
            })?
            .inherit_refresh_token(&current);

        self.persist_and_adopt(state, refreshed.clone(), Origin::Refreshed).map_err(|e| {
            AuthError::refresh_failed("failed to save refreshed credentials").with_source(e)
        })?;

        info!(
            expiry = %refreshed.expiry_date.map(format_millis).unwrap_or_else(|| "never".into()),
            "access token refreshed"
        );
        Ok(refreshed)
    }
}

/// Where an adopted record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    /// Read from disk or handed to `save`.
    Loaded,
    /// Returned by the token endpoint.
    Refreshed,
}

/// Picks the timer delay for a record expiring at `expiry`.
///
/// A lead that covers the whole remaining lifetime falls back to the
/// expiry itself. A record that is already expired is refreshed at once,
/// unless it just came back from a refresh; `None` means no timer.
fn refresh_delay(
    expiry: EpochMillis,
    now: EpochMillis,
    lead: Duration,
    origin: Origin,
) -> Option<Duration> {
    let early = delay_until(expiry, now, lead);
    if !early.is_zero() {
        return Some(early);
    }
    let at_expiry = delay_until(expiry, now, Duration::ZERO);
    if !at_expiry.is_zero() {
        return Some(at_expiry);
    }
    match origin {
        Origin::Loaded => Some(Duration::ZERO),
        Origin::Refreshed => None,
    }
}
