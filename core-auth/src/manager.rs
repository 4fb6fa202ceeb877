//! Session holder for the signed-in account.

use bridge_traits::{Clock, Credentials};
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::error::{AuthError, Result};
use crate::types::{AuthState, Session};

/// Owns the current [`Session`] and produces [`Credentials`] on demand.
///
/// The manager is shared behind an `Arc`; readers never hold the lock across
/// a remote call because [`AuthManager::credentials`] returns an owned
/// snapshot.
pub struct AuthManager {
    session: Arc<RwLock<Option<Session>>>,
    /// Set when the provider rejected the current token
    rejected: Arc<RwLock<bool>>,
    event_bus: EventBus,
    clock: Arc<dyn Clock>,
}

impl AuthManager {
    pub fn new(event_bus: EventBus, clock: Arc<dyn Clock>) -> Self {
        Self {
            session: Arc::new(RwLock::new(None)),
            rejected: Arc::new(RwLock::new(false)),
            event_bus,
            clock,
        }
    }

    /// Install a session obtained by the host, replacing any previous one.
    #[instrument(skip(self, session), fields(account_id = ?session.account_id))]
    pub async fn sign_in(&self, session: Session) {
        let account_id = session.account_id.clone();
        *self.session.write().await = Some(session);
        *self.rejected.write().await = false;

        info!("Session installed");
        self.event_bus
            .emit(CoreEvent::Auth(AuthEvent::SignedIn { account_id }))
            .ok();
    }

    #[instrument(skip(self))]
    pub async fn sign_out(&self) {
        let previous = self.session.write().await.take();
        *self.rejected.write().await = false;

        if previous.is_some() {
            info!("Signed out");
            self.event_bus.emit(CoreEvent::Auth(AuthEvent::SignedOut)).ok();
        }
    }

    /// Mark the current session unusable after the provider rejected it.
    pub async fn invalidate(&self) {
        if self.session.read().await.is_none() {
            return;
        }

        let mut rejected = self.rejected.write().await;
        if !*rejected {
            *rejected = true;
            warn!("Provider rejected the current session");
            self.event_bus
                .emit(CoreEvent::Auth(AuthEvent::SessionExpired))
                .ok();
        }
    }

    pub async fn state(&self) -> AuthState {
        let rejected = *self.rejected.read().await;
        let session = self.session.read().await;
        match session.as_ref() {
            None => AuthState::SignedOut,
            Some(session) if rejected || session.is_expired(self.clock.now()) => {
                AuthState::Expired
            }
            Some(_) => AuthState::SignedIn,
        }
    }

    pub async fn current_session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    /// Credentials for one remote call, read from the session at call time.
    ///
    /// # Errors
    ///
    /// - [`AuthError::NotAuthenticated`] when nobody is signed in
    /// - [`AuthError::SessionExpired`] when the session is past its expiry or
    ///   was rejected by the provider
    pub async fn credentials(&self) -> Result<Credentials> {
        let session = self.session.read().await;
        let session = session.as_ref().ok_or(AuthError::NotAuthenticated)?;

        if *self.rejected.read().await {
            return Err(AuthError::SessionExpired);
        }

        if session.is_expired(self.clock.now()) {
            debug!(expires_at = ?session.expires_at, "Session past expiry");
            self.event_bus
                .emit(CoreEvent::Auth(AuthEvent::SessionExpired))
                .ok();
            return Err(AuthError::SessionExpired);
        }

        Ok(session.credentials())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::SystemClock;
    use chrono::{DateTime, Duration, Utc};

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn manager() -> (AuthManager, EventBus) {
        let bus = EventBus::new(16);
        (AuthManager::new(bus.clone(), Arc::new(SystemClock)), bus)
    }

    #[tokio::test]
    async fn test_credentials_require_sign_in() {
        let (auth, _bus) = manager();

        assert_eq!(auth.state().await, AuthState::SignedOut);
        assert_eq!(auth.credentials().await.unwrap_err(), AuthError::NotAuthenticated);
    }

    #[tokio::test]
    async fn test_sign_in_then_out() {
        let (auth, bus) = manager();
        let mut events = bus.subscribe();

        auth.sign_in(Session::new("sl.token").unwrap().with_account("dbid:1"))
            .await;
        assert_eq!(auth.state().await, AuthState::SignedIn);
        assert_eq!(auth.credentials().await.unwrap().access_token, "sl.token");

        auth.sign_out().await;
        assert_eq!(auth.state().await, AuthState::SignedOut);

        assert_eq!(
            events.recv().await.unwrap(),
            CoreEvent::Auth(AuthEvent::SignedIn {
                account_id: Some("dbid:1".to_string())
            })
        );
        assert_eq!(events.recv().await.unwrap(), CoreEvent::Auth(AuthEvent::SignedOut));
    }

    #[tokio::test]
    async fn test_expired_session_is_refused() {
        let now = Utc::now();
        let bus = EventBus::new(16);
        let auth = AuthManager::new(bus.clone(), Arc::new(FixedClock(now)));

        auth.sign_in(
            Session::new("sl.token")
                .unwrap()
                .with_expiry(now - Duration::seconds(1)),
        )
        .await;

        assert_eq!(auth.state().await, AuthState::Expired);
        assert_eq!(auth.credentials().await.unwrap_err(), AuthError::SessionExpired);
    }

    #[tokio::test]
    async fn test_invalidate_until_next_sign_in() {
        let (auth, bus) = manager();
        auth.sign_in(Session::new("sl.old").unwrap()).await;
        let mut events = bus.subscribe();

        auth.invalidate().await;
        auth.invalidate().await;

        assert_eq!(auth.credentials().await.unwrap_err(), AuthError::SessionExpired);
        assert_eq!(
            events.try_recv().unwrap(),
            CoreEvent::Auth(AuthEvent::SessionExpired)
        );
        assert!(events.try_recv().is_err());

        auth.sign_in(Session::new("sl.new").unwrap()).await;
        assert_eq!(auth.credentials().await.unwrap().access_token, "sl.new");
    }
}
