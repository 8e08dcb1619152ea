//! Process-wide session state

use std::sync::Arc;

use log::{info, warn};
use serde_json::json;
use tokio::sync::{watch, RwLock};

use crate::auth::{AuthBackend, Identity, Session, UserType};
use crate::error::{Error, GatewayError, Result};

/// Receiver half of the identity broadcast; drop it to unsubscribe
pub type SessionWatch = watch::Receiver<Option<Identity>>;

/// The single active session of this client.
///
/// Pass it (or an `Arc` of it) to whatever needs to know who is signed in;
/// `subscribe` to be told when that changes.
pub struct SessionStore {
    backend: Arc<dyn AuthBackend>,
    session: RwLock<Option<Session>>,
    identity: watch::Sender<Option<Identity>>,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn AuthBackend>) -> Self {
        let (identity, _) = watch::channel(None);
        Self {
            backend,
            session: RwLock::new(None),
            identity,
        }
    }

    /// Create an account tagged with `role`.
    ///
    /// When the backend hands back a session right away, it becomes current.
    ///
    /// # Errors
    ///
    /// [`Error::Auth`] for duplicate emails, weak passwords and network faults.
    pub async fn sign_up(&self, email: &str, password: &str, role: UserType) -> Result<Identity> {
        let response = self
            .backend
            .sign_up(email, password, json!({ "user_type": role }))
            .await
            .map_err(|e| auth_failure("sign-up", e))?;

        let identity = Identity::from(&response.user);
        if let Some(session) = response.session {
            self.install(session).await;
        }
        info!("signed up {} as {}", identity.id, role);
        Ok(identity)
    }

    /// Establish a session from email and password
    ///
    /// # Errors
    ///
    /// [`Error::Auth`] for bad credentials and network faults.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Identity> {
        let session = self
            .backend
            .sign_in(email, password)
            .await
            .map_err(|e| auth_failure("sign-in", e))?;

        let identity = self.install(session).await;
        info!("signed in {}", identity.id);
        Ok(identity)
    }

    /// Replace the current session with a freshly refreshed one
    ///
    /// # Errors
    ///
    /// [`Error::Auth`] when nobody is signed in or the refresh is rejected.
    pub async fn refresh(&self) -> Result<Identity> {
        let refresh_token = self
            .session
            .read()
            .await
            .as_ref()
            .map(|s| s.refresh_token.clone())
            .ok_or_else(|| Error::auth("Not signed in"))?;

        let session = self
            .backend
            .refresh(&refresh_token)
            .await
            .map_err(|e| auth_failure("token refresh", e))?;

        Ok(self.install(session).await)
    }

    /// Clear the session. Calling it while signed out does nothing.
    ///
    /// A backend failure is logged; the local session is cleared regardless.
    pub async fn sign_out(&self) -> Result<()> {
        let Some(session) = self.session.write().await.take() else {
            return Ok(());
        };

        if let Err(e) = self.backend.sign_out(&session.access_token).await {
            warn!("sign-out for {} not confirmed by backend: {}", session.user.id, e);
        }

        self.identity.send_replace(None);
        info!("signed out {}", session.user.id);
        Ok(())
    }

    /// Identity of the signed-in user
    pub fn current_user(&self) -> Option<Identity> {
        self.identity.borrow().clone()
    }

    /// Identity of the signed-in user, or an auth error
    pub fn require_user(&self) -> Result<Identity> {
        self.current_user()
            .ok_or_else(|| Error::auth("Please sign in to continue"))
    }

    /// Access token of the current session
    pub async fn access_token(&self) -> Option<String> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.access_token.clone())
    }

    /// Be told about every identity transition
    pub fn subscribe(&self) -> SessionWatch {
        self.identity.subscribe()
    }

    async fn install(&self, session: Session) -> Identity {
        let identity = Identity::from(&session.user);
        *self.session.write().await = Some(session);
        self.identity.send_replace(Some(identity.clone()));
        identity
    }
}

fn auth_failure(action: &str, err: GatewayError) -> Error {
    warn!("{} failed: {}", action, err);
    match err {
        GatewayError::Status { message, .. } => Error::Auth(message),
        GatewayError::NotAuthenticated => Error::auth("Not signed in"),
        _ => Error::auth("Network error, please try again"),
    }
}
