//! Configuration options for the MkulimaExpo client

use std::env;
use std::time::Duration;

use crate::error::{Error, Result};

/// Environment variables holding the backend URL, in lookup order
const URL_VARS: [&str; 2] = ["SUPABASE_URL", "VITE_SUPABASE_URL"];

/// Environment variables holding the public API key, in lookup order
const KEY_VARS: [&str; 2] = ["SUPABASE_ANON_KEY", "VITE_SUPABASE_ANON_KEY"];

/// Connection and behaviour settings, read once at start-up
#[derive(Debug, Clone)]
pub struct Config {
    /// The base URL for the Supabase project
    pub supabase_url: String,

    /// The anonymous API key for the Supabase project
    pub supabase_anon_key: String,

    /// The request timeout
    pub request_timeout: Option<Duration>,

    /// How long a notice stays visible
    pub notice_ttl: Duration,

    /// Remove uploaded images when the listing row could not be written
    pub discard_orphaned_uploads: bool,

    /// Realtime heartbeat interval
    pub heartbeat_interval: Duration,
}

impl Config {
    /// Create a configuration with default options
    pub fn new(supabase_url: &str, supabase_anon_key: &str) -> Self {
        Self {
            supabase_url: supabase_url.trim_end_matches('/').to_string(),
            supabase_anon_key: supabase_anon_key.to_string(),
            request_timeout: Some(Duration::from_secs(30)),
            notice_ttl: Duration::from_secs(3),
            discard_orphaned_uploads: false,
            heartbeat_interval: Duration::from_secs(30),
        }
    }

    /// Read the backend URL and key from the environment.
    ///
    /// A `.env` file in the working directory is loaded first if present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when either value is missing or the URL does
    /// not parse.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let url = first_var(&URL_VARS)
            .ok_or_else(|| Error::Config(format!("{} must be set", URL_VARS[0])))?;
        let key = first_var(&KEY_VARS)
            .ok_or_else(|| Error::Config(format!("{} must be set", KEY_VARS[0])))?;

        url::Url::parse(&url)
            .map_err(|e| Error::Config(format!("invalid {}: {}", URL_VARS[0], e)))?;

        Ok(Self::new(&url, &key))
    }

    /// Set the request timeout
    pub fn with_request_timeout(mut self, value: Option<Duration>) -> Self {
        self.request_timeout = value;
        self
    }

    /// Set how long notices stay visible
    pub fn with_notice_ttl(mut self, value: Duration) -> Self {
        self.notice_ttl = value;
        self
    }

    /// Set whether orphaned uploads are removed after a failed write
    pub fn with_discard_orphaned_uploads(mut self, value: bool) -> Self {
        self.discard_orphaned_uploads = value;
        self
    }

    /// Set the realtime heartbeat interval
    pub fn with_heartbeat_interval(mut self, value: Duration) -> Self {
        self.heartbeat_interval = value;
        self
    }
}

fn first_var(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| env::var(name).ok())
        .find(|value| !value.trim().is_empty())
}
