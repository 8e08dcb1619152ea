//! MkulimaExpo marketplace core
//!
//! Farmers publish produce listings, buyers browse and filter them, and a
//! signed-in viewer gets call and WhatsApp links to the seller. Everything
//! persists in a hosted Supabase project: PostgREST tables, a storage bucket
//! for photos, GoTrue for sessions and Realtime for change notifications.
//!
//! The backend sits behind four traits ([`postgrest::Database`],
//! [`storage::ObjectStorage`], [`auth::AuthBackend`] and
//! [`realtime::ChangeFeed`]); [`MkulimaExpo::connect`] wires the real ones.

pub mod auth;
pub mod config;
pub mod contact;
pub mod dashboard;
pub mod error;
pub mod fetch;
pub mod form;
pub mod gateway;
pub mod listings;
pub mod marketplace;
pub mod notice;
pub mod postgrest;
pub mod profiles;
pub mod realtime;
pub mod routes;
pub mod storage;
pub mod subscriptions;

use std::sync::Arc;

use log::info;

use crate::auth::{AuthBackend, SessionStore};
use crate::config::Config;
use crate::dashboard::OwnerDashboard;
use crate::error::{Error, Result};
use crate::form::ListingFormController;
use crate::gateway::SupabaseGateway;
use crate::listings::ListingRepository;
use crate::marketplace::MarketplaceController;
use crate::postgrest::Database;
use crate::profiles::ProfileRepository;
use crate::realtime::{ChangeFeed, RealtimeFeed};
use crate::storage::ObjectStorage;
use crate::subscriptions::SubscriptionService;

/// One configured application instance
pub struct MkulimaExpo {
    config: Config,
    session: Arc<SessionStore>,
    listings: ListingRepository,
    profiles: ProfileRepository,
    subscriptions: SubscriptionService,
}

impl MkulimaExpo {
    /// Connect to the Supabase project named in `config`
    ///
    /// # Example
    ///
    /// ```no_run
    /// use mkulima_expo::{config::Config, MkulimaExpo};
    ///
    /// let app = MkulimaExpo::connect(Config::new("https://your-project.supabase.co", "anon-key"))
    ///     .expect("valid configuration");
    /// assert!(app.session().current_user().is_none());
    /// ```
    pub fn connect(config: Config) -> Result<Self> {
        let gateway = Arc::new(
            SupabaseGateway::new(&config).map_err(|e| Error::Config(e.to_string()))?,
        );
        let feed = Arc::new(RealtimeFeed::new(&config));
        info!("connecting to {}", config.supabase_url);

        Ok(Self::with_backends(
            config,
            gateway.clone(),
            gateway.clone(),
            gateway,
            feed,
        ))
    }

    /// Connect using `SUPABASE_URL` and `SUPABASE_ANON_KEY`
    pub fn from_env() -> Result<Self> {
        Self::connect(Config::from_env()?)
    }

    /// Assemble the application over arbitrary backends
    pub fn with_backends(
        config: Config,
        db: Arc<dyn Database>,
        storage: Arc<dyn ObjectStorage>,
        auth: Arc<dyn AuthBackend>,
        feed: Arc<dyn ChangeFeed>,
    ) -> Self {
        let listings = ListingRepository::new(Arc::clone(&db), storage, feed)
            .with_orphan_cleanup(config.discard_orphaned_uploads);

        Self {
            session: Arc::new(SessionStore::new(auth)),
            profiles: ProfileRepository::new(Arc::clone(&db)),
            subscriptions: SubscriptionService::new(db),
            listings,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn listings(&self) -> &ListingRepository {
        &self.listings
    }

    pub fn profiles(&self) -> &ProfileRepository {
        &self.profiles
    }

    pub fn subscriptions(&self) -> &SubscriptionService {
        &self.subscriptions
    }

    /// Controller for the marketplace page; call `mount` to load it
    pub fn marketplace(&self) -> MarketplaceController {
        MarketplaceController::new(
            self.listings.clone(),
            Arc::clone(&self.session),
            self.config.notice_ttl,
        )
    }

    /// The signed-in farmer's listings page
    pub fn dashboard(&self) -> OwnerDashboard {
        OwnerDashboard::new(
            self.listings.clone(),
            Arc::clone(&self.session),
            self.config.notice_ttl,
        )
    }

    /// A blank create-listing form
    pub fn listing_form(&self) -> ListingFormController {
        ListingFormController::new_listing(self.listings.clone(), Arc::clone(&self.session))
    }
}

/// A convenience module for common imports
pub mod prelude {
    pub use crate::auth::{Identity, SessionStore, UserType};
    pub use crate::config::Config;
    pub use crate::contact::{format_phone_number, ContactAffordance};
    pub use crate::error::{Error, Result};
    pub use crate::form::{FormOutcome, FormState, ListingFormController};
    pub use crate::listings::{
        Category, Listing, ListingDraft, ListingFilter, ListingRepository, ListingStatus, Unit,
    };
    pub use crate::routes::Route;
    pub use crate::storage::ImageFile;
    pub use crate::MkulimaExpo;
}
