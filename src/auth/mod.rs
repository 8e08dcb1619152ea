//! Authentication against the Supabase auth service

mod session;
mod types;

use async_trait::async_trait;
use log::debug;
use serde_json::{json, Value};

use crate::error::GatewayError;
use crate::fetch::Fetch;
use crate::gateway::SupabaseGateway;

pub use session::*;
pub use types::*;

/// Email/password identity operations
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Create an account with `metadata` stored as user metadata
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Value,
    ) -> Result<AuthResponse, GatewayError>;

    /// Exchange credentials for a session
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, GatewayError>;

    /// Exchange a refresh token for a new session
    async fn refresh(&self, refresh_token: &str) -> Result<Session, GatewayError>;

    /// Revoke the session behind `access_token`
    async fn sign_out(&self, access_token: &str) -> Result<(), GatewayError>;
}

impl SupabaseGateway {
    fn auth_url(&self, path: &str) -> String {
        self.service_url("auth", path)
    }

    async fn token_grant(&self, grant_type: &str, body: Value) -> Result<Session, GatewayError> {
        let session = Fetch::post(&self.client, &self.auth_url("/token"))
            .header("apikey", &self.key)
            .query(vec![("grant_type".to_string(), grant_type.to_string())])
            .json(&body)?
            .execute::<Session>()
            .await?;

        self.set_access_token(Some(session.access_token.clone())).await;
        Ok(session)
    }
}

#[async_trait]
impl AuthBackend for SupabaseGateway {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Value,
    ) -> Result<AuthResponse, GatewayError> {
        let body = json!({
            "email": email,
            "password": password,
            "data": metadata,
        });

        let value = Fetch::post(&self.client, &self.auth_url("/signup"))
            .header("apikey", &self.key)
            .json(&body)?
            .execute::<Value>()
            .await?;

        // Auto-confirming projects answer with a session, the rest with the bare user.
        if value.get("access_token").is_some() {
            let session: Session = serde_json::from_value(value)?;
            self.set_access_token(Some(session.access_token.clone())).await;
            Ok(AuthResponse {
                user: session.user.clone(),
                session: Some(session),
            })
        } else {
            let user: User = serde_json::from_value(value.get("user").cloned().unwrap_or(value))?;
            debug!("sign-up for {} awaits email confirmation", user.id);
            Ok(AuthResponse { user, session: None })
        }
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, GatewayError> {
        self.token_grant("password", json!({ "email": email, "password": password }))
            .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session, GatewayError> {
        self.token_grant("refresh_token", json!({ "refresh_token": refresh_token }))
            .await
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), GatewayError> {
        let result = Fetch::post(&self.client, &self.auth_url("/logout"))
            .credentials(&self.key, access_token)
            .send()
            .await;

        // The local token goes away whatever the backend said.
        self.set_access_token(None).await;
        result.map(|_| ())
    }
}
