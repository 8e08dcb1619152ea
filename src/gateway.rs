//! The HTTP gateway to a hosted Supabase project
//!
//! [`SupabaseGateway`] carries the shared connection state. The table,
//! storage and auth operations live next to their traits in
//! [`crate::postgrest`], [`crate::storage`] and [`crate::auth`].

use std::sync::Arc;

use reqwest::Client;
use tokio::sync::RwLock;

use crate::config::Config;
use crate::error::GatewayError;

/// Client for one Supabase project
#[derive(Clone)]
pub struct SupabaseGateway {
    /// The base URL for the Supabase project
    pub(crate) url: String,

    /// The anonymous API key for the Supabase project
    pub(crate) key: String,

    /// HTTP client used for requests
    pub(crate) client: Client,

    /// Access token of the signed-in user, if any
    pub(crate) access_token: Arc<RwLock<Option<String>>>,
}

impl SupabaseGateway {
    /// Create a gateway from the start-up configuration
    ///
    /// # Errors
    ///
    /// Fails when the HTTP client cannot be built.
    pub fn new(config: &Config) -> Result<Self, GatewayError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            url: config.supabase_url.clone(),
            key: config.supabase_anon_key.clone(),
            client: builder.build()?,
            access_token: Arc::new(RwLock::new(None)),
        })
    }

    /// Base URL of a Supabase service, e.g. `rest` → `{url}/rest/v1`
    pub(crate) fn service_url(&self, service: &str, path: &str) -> String {
        format!("{}/{}/v1{}", self.url, service, path)
    }

    /// Token sent as bearer: the user's access token, or the anon key
    pub(crate) async fn bearer(&self) -> String {
        self.access_token
            .read()
            .await
            .clone()
            .unwrap_or_else(|| self.key.clone())
    }

    pub(crate) async fn set_access_token(&self, token: Option<String>) {
        *self.access_token.write().await = token;
    }

    /// Whether a user token is currently attached
    pub async fn is_authenticated(&self) -> bool {
        self.access_token.read().await.is_some()
    }
}
