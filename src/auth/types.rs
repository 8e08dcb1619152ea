//! Types for authentication and identity

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Marketplace role chosen at sign-up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Farmer,
    Buyer,
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Farmer => "farmer",
            UserType::Buyer => "buyer",
        }
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "farmer" => Ok(UserType::Farmer),
            "buyer" => Ok(UserType::Buyer),
            other => Err(format!("unknown user type: {}", other)),
        }
    }
}

/// User record as returned by the auth service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// The user ID
    pub id: Uuid,

    /// The user's email address
    pub email: Option<String>,

    /// Metadata bag written at sign-up
    #[serde(default)]
    pub user_metadata: serde_json::Value,
}

/// Session data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// The access token
    pub access_token: String,

    /// The refresh token
    pub refresh_token: String,

    /// The expiry time in seconds
    pub expires_in: i64,

    /// The expiry timestamp
    #[serde(default)]
    pub expires_at: Option<i64>,

    /// The token type
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// The signed-in user
    pub user: User,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl Session {
    /// Check if the session has expired
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .map(|expires_at| chrono::Utc::now().timestamp() >= expires_at)
            .unwrap_or(false)
    }
}

/// Result of a sign-up.
///
/// `session` is absent when the project requires email confirmation.
#[derive(Debug, Clone)]
pub struct AuthResponse {
    pub user: User,
    pub session: Option<Session>,
}

/// The identity views key off
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: Uuid,
    pub email: Option<String>,
    /// Role stashed in the sign-up metadata, if any
    pub role_hint: Option<UserType>,
}

impl From<&User> for Identity {
    fn from(user: &User) -> Self {
        let role_hint = user
            .user_metadata
            .get("user_type")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok());

        Self {
            id: user.id,
            email: user.email.clone(),
            role_hint,
        }
    }
}
