//! SessionGuard: hands out currently-valid credentials.
//!
//! # Responsibilities
//! - Load and validate the stored bundle
//! - Refresh when the bundle is inside the expiry buffer
//! - Run at most one refresh flight at a time; concurrent callers share it
//! - Fail fast while the circuit breaker is open
//!
//! # Data Flow
//! ```text
//! ensure_valid / force_refresh
//!     → breaker check (open ⇒ ServiceUnavailable)
//!     → join in-flight flight, or spawn a new one
//!         → store.get → validate → (fresh? return) → refresh attempts
//!         → persist + breaker reset, or breaker failure
//!     → every joined caller receives the same result
//! ```
//!
//! # Design Decisions
//! - Breaker and flight slot live behind one short-held std mutex; nothing is
//!   awaited while it is held
//! - The flight runs as a spawned task so it completes even if every caller
//!   stops waiting
//! - A session epoch is bumped by `clear` and `store_credentials`; a flight
//!   started under an older epoch never writes to the store
//! - `clear` and `store_credentials` abort the superseded flight, so at most
//!   one refresh sequence reaches the endpoint at a time
//! - Every store write happens under one async write lock, with the epoch
//!   checked after the lock is taken

use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::AbortHandle;
use tokio::time::{sleep, timeout};

use crate::clock::{Clock, SystemClock};
use crate::config::SessionConfig;
use crate::error::{AuthError, AuthResult};
use crate::observability::metrics;
use crate::resilience::{Backoff, CircuitBreaker, CircuitBreakerState};
use crate::session::bundle::CredentialBundle;
use crate::session::refresh::{RefreshClient, RefreshFailure};
use crate::session::store::CredentialStore;

type SharedFlight = Shared<BoxFuture<'static, AuthResult<CredentialBundle>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlightMode {
    /// Return the stored bundle if it is outside the expiry buffer.
    EnsureValid,
    /// Always attempt a refresh.
    Force,
}

struct Flight {
    id: u64,
    result: SharedFlight,
    abort: AbortHandle,
}

struct GuardState {
    breaker: CircuitBreaker,
    flight: Option<Flight>,
    epoch: u64,
    next_flight_id: u64,
}

struct GuardInner {
    store: Arc<dyn CredentialStore>,
    client: Arc<dyn RefreshClient>,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
    backoff: Backoff,
    state: Mutex<GuardState>,
    write_lock: tokio::sync::Mutex<()>,
}

/// Owner of the shared credential bundle.
#[derive(Clone)]
pub struct SessionGuard {
    inner: Arc<GuardInner>,
}

impl SessionGuard {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        client: Arc<dyn RefreshClient>,
        config: SessionConfig,
    ) -> Self {
        Self::with_clock(store, client, Arc::new(SystemClock), config)
    }

    pub fn with_clock(
        store: Arc<dyn CredentialStore>,
        client: Arc<dyn RefreshClient>,
        clock: Arc<dyn Clock>,
        config: SessionConfig,
    ) -> Self {
        let backoff = Backoff::new(config.base_delay_ms, config.max_delay_ms);
        let breaker = CircuitBreaker::new(config.max_failures, config.cool_down_secs);
        Self {
            inner: Arc::new(GuardInner {
                store,
                client,
                clock,
                config,
                backoff,
                state: Mutex::new(GuardState {
                    breaker,
                    flight: None,
                    epoch: 0,
                    next_flight_id: 1,
                }),
                write_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Produce a bundle with more than `buffer_secs` of validity left,
    /// refreshing if needed.
    pub async fn ensure_valid(&self) -> AuthResult<CredentialBundle> {
        self.acquire(FlightMode::EnsureValid).await
    }

    /// Refresh regardless of remaining validity.
    pub async fn force_refresh(&self) -> AuthResult<CredentialBundle> {
        self.acquire(FlightMode::Force).await
    }

    /// Logout: remove the stored bundle and reset the breaker.
    pub async fn clear(&self) -> AuthResult<()> {
        let _write = self.inner.write_lock.lock().await;
        self.inner.supersede(true);
        tracing::info!("Session cleared");
        self.inner
            .store
            .remove(&self.inner.config.storage_key)
            .await
            .map_err(|e| AuthError::ServiceError(format!("credential store remove failed: {}", e)))
    }

    /// Login/signup: persist a freshly issued bundle. Any refresh flight in
    /// progress is superseded and will not persist its grant.
    pub async fn store_credentials(&self, bundle: CredentialBundle) -> AuthResult<()> {
        if let Err(e) = bundle.validate() {
            tracing::warn!(error = %e, "Rejecting invalid credentials");
            return Err(AuthError::AuthRequired);
        }
        let _write = self.inner.write_lock.lock().await;
        self.inner.supersede(false);
        self.inner
            .store
            .set(&self.inner.config.storage_key, bundle.to_stored())
            .await
            .map_err(|e| AuthError::ServiceError(format!("credential store write failed: {}", e)))?;
        tracing::info!(subject = ?bundle.subject_id, expires_at = bundle.expires_at, "Credentials stored");
        Ok(())
    }

    /// The stored bundle as-is, without refreshing.
    pub async fn current(&self) -> AuthResult<CredentialBundle> {
        let value = self
            .inner
            .store
            .get(&self.inner.config.storage_key)
            .await
            .map_err(|e| AuthError::ServiceError(format!("credential store read failed: {}", e)))?
            .ok_or(AuthError::AuthRequired)?;
        CredentialBundle::from_stored(value).map_err(|_| AuthError::AuthRequired)
    }

    pub fn breaker_state(&self) -> CircuitBreakerState {
        self.inner.lock_state().breaker.state()
    }

    pub fn refresh_in_flight(&self) -> bool {
        self.inner.lock_state().flight.is_some()
    }

    async fn acquire(&self, mode: FlightMode) -> AuthResult<CredentialBundle> {
        let flight = {
            let mut state = self.inner.lock_state();
            let now = self.inner.clock.now_secs();

            if let Err(retry_after_secs) = state.breaker.check(now) {
                tracing::debug!(retry_after_secs, "Circuit breaker open, failing fast");
                return Err(AuthError::ServiceUnavailable { retry_after_secs });
            }

            match &state.flight {
                Some(flight) => {
                    tracing::trace!(flight = flight.id, "Joining in-flight credential check");
                    flight.result.clone()
                }
                None => {
                    let id = state.next_flight_id;
                    state.next_flight_id += 1;
                    let epoch = state.epoch;

                    let inner = self.inner.clone();
                    let task = tokio::spawn(async move { inner.run_flight(id, epoch, mode).await });
                    let abort = task.abort_handle();
                    let result = async move {
                        match task.await {
                            Ok(result) => result,
                            // Superseded by clear() or store_credentials()
                            Err(e) if e.is_cancelled() => Err(AuthError::AuthRequired),
                            Err(e) => Err(AuthError::ServiceError(format!("refresh task failed: {}", e))),
                        }
                    }
                    .boxed()
                    .shared();

                    state.flight = Some(Flight {
                        id,
                        result: result.clone(),
                        abort,
                    });
                    result
                }
            }
        };

        flight.await
    }
}

impl GuardInner {
    fn lock_state(&self) -> MutexGuard<'_, GuardState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start a new session epoch and abort the flight it replaces. Callers
    /// hold `write_lock`.
    fn supersede(&self, reset_breaker: bool) {
        let mut state = self.lock_state();
        state.epoch += 1;
        if reset_breaker {
            state.breaker.reset();
        }
        if let Some(flight) = state.flight.take() {
            tracing::debug!(flight = flight.id, "Aborting superseded refresh flight");
            flight.abort.abort();
        }
    }

    async fn run_flight(self: Arc<Self>, id: u64, epoch: u64, mode: FlightMode) -> AuthResult<CredentialBundle> {
        let result = self.resolve(epoch, mode).await;

        let mut state = self.lock_state();
        if state.flight.as_ref().map(|f| f.id) == Some(id) {
            state.flight = None;
        }
        result
    }

    async fn resolve(&self, epoch: u64, mode: FlightMode) -> AuthResult<CredentialBundle> {
        let key = &self.config.storage_key;
        let stored = self
            .store
            .get(key)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to read stored credentials");
                AuthError::ServiceError(format!("credential store read failed: {}", e))
            })?;

        let Some(value) = stored else {
            tracing::debug!("No stored credentials");
            return Err(AuthError::AuthRequired);
        };

        let bundle = match CredentialBundle::from_stored(value) {
            Ok(bundle) => bundle,
            Err(e) => {
                tracing::warn!(error = %e, "Stored credentials are corrupt, clearing");
                self.remove_if_current(epoch).await;
                return Err(AuthError::AuthRequired);
            }
        };

        let now = self.clock.now_secs();
        if mode == FlightMode::EnsureValid && !bundle.needs_refresh(now, self.config.buffer_secs) {
            return Ok(bundle);
        }

        tracing::debug!(
            remaining_secs = bundle.remaining_secs(now),
            forced = mode == FlightMode::Force,
            "Refreshing credentials"
        );
        self.do_refresh(bundle, epoch).await
    }

    async fn do_refresh(&self, bundle: CredentialBundle, epoch: u64) -> AuthResult<CredentialBundle> {
        let max_attempts = self.config.max_attempts.max(1);
        let attempt_timeout = self.config.attempt_timeout();
        let mut last_failure = None;

        for attempt in 1..=max_attempts {
            let failure = match timeout(attempt_timeout, self.client.refresh(&bundle.refresh_token)).await {
                Ok(Ok(grant)) => {
                    let now = self.clock.now_secs();
                    match grant.into_bundle(now, self.config.default_expires_in_secs, &bundle) {
                        Ok(fresh) => {
                            metrics::record_refresh_attempt("success");
                            return self.commit(fresh, epoch).await;
                        }
                        Err(failure) => failure,
                    }
                }
                Ok(Err(failure)) => failure,
                Err(_) => RefreshFailure::Transport(format!(
                    "attempt timed out after {}s",
                    attempt_timeout.as_secs()
                )),
            };
            metrics::record_refresh_attempt(failure.label());

            if failure.is_terminal() {
                tracing::warn!(attempt, error = %failure, "Refresh token rejected, session ended");
                self.remove_if_current(epoch).await;
                metrics::record_refresh_flight("auth_required");
                return Err(AuthError::AuthRequired);
            }

            tracing::warn!(attempt, max_attempts, error = %failure, "Refresh attempt failed");
            last_failure = Some(failure);

            if attempt < max_attempts {
                sleep(self.backoff.delay(attempt)).await;
            }
        }

        self.record_failure(epoch);
        metrics::record_refresh_flight("service_error");
        let reason = last_failure.map(|f| f.to_string()).unwrap_or_default();
        Err(AuthError::ServiceError(format!(
            "token refresh failed after {} attempts: {}",
            max_attempts, reason
        )))
    }

    async fn commit(&self, fresh: CredentialBundle, epoch: u64) -> AuthResult<CredentialBundle> {
        {
            let _write = self.write_lock.lock().await;
            if self.epoch_changed(epoch) {
                tracing::info!("Session replaced during refresh, discarding grant");
                return Err(AuthError::AuthRequired);
            }

            if let Err(e) = self.store.set(&self.config.storage_key, fresh.to_stored()).await {
                tracing::error!(error = %e, "Failed to persist refreshed credentials");
            }
        }

        self.lock_state().breaker.record_success();
        metrics::record_refresh_flight("success");
        tracing::info!(expires_at = fresh.expires_at, "Credentials refreshed");
        Ok(fresh)
    }

    fn epoch_changed(&self, epoch: u64) -> bool {
        self.lock_state().epoch != epoch
    }

    fn record_failure(&self, epoch: u64) {
        let now = self.clock.now_secs();
        let mut state = self.lock_state();
        if state.epoch != epoch {
            return;
        }
        if state.breaker.record_failure(now) {
            metrics::record_breaker_trip();
        }
    }

    /// Remove the stored bundle unless the session moved on since `epoch`.
    async fn remove_if_current(&self, epoch: u64) {
        let _write = self.write_lock.lock().await;
        if self.epoch_changed(epoch) {
            tracing::debug!("Session replaced during refresh, leaving store untouched");
            return;
        }
        if let Err(e) = self.store.remove(&self.config.storage_key).await {
            tracing::error!(error = %e, "Failed to clear stored credentials");
        }
    }
}
