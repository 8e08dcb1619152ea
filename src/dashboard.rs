//! The signed-in farmer's own listings

use std::sync::Arc;
use std::time::Duration;

use log::info;
use uuid::Uuid;

use crate::auth::SessionStore;
use crate::error::{Error, Result};
use crate::form::{FormOutcome, ListingFormController};
use crate::listings::{Listing, ListingRepository};
use crate::notice::{Notice, NoticeBoard};

/// Lists, opens forms for, and deletes the current farmer's listings
pub struct OwnerDashboard {
    repo: ListingRepository,
    session: Arc<SessionStore>,
    listings: Vec<Listing>,
    notices: NoticeBoard,
}

impl OwnerDashboard {
    pub fn new(repo: ListingRepository, session: Arc<SessionStore>, notice_ttl: Duration) -> Self {
        Self {
            repo,
            session,
            listings: Vec::new(),
            notices: NoticeBoard::new(notice_ttl),
        }
    }

    /// Reload every listing the farmer owns, whatever its status
    pub async fn refresh(&mut self) -> Result<()> {
        let user = self.session.require_user()?;
        match self.repo.list_owned_by(&user.id).await {
            Ok(listings) => {
                self.listings = listings;
                Ok(())
            }
            Err(err) => Err(self.report(err)),
        }
    }

    pub fn listings(&self) -> &[Listing] {
        &self.listings
    }

    /// Blank form for a new listing
    pub fn new_listing_form(&self) -> Result<ListingFormController> {
        self.session.require_user()?;
        Ok(ListingFormController::new_listing(
            self.repo.clone(),
            Arc::clone(&self.session),
        ))
    }

    /// Form seeded from one of the loaded listings, without a fetch
    pub fn edit_listing_form(&self, id: &Uuid) -> Result<ListingFormController> {
        self.session.require_user()?;
        let listing = self
            .listings
            .iter()
            .find(|listing| listing.id == *id)
            .ok_or_else(|| Error::not_found(id))?;
        Ok(ListingFormController::edit(
            self.repo.clone(),
            Arc::clone(&self.session),
            listing,
        ))
    }

    /// Close a successfully submitted form: post its notice and reload
    pub async fn complete(&mut self, outcome: &FormOutcome) -> Result<()> {
        self.notices.success(outcome.message());
        self.refresh().await
    }

    /// Delete an owned listing and reload
    pub async fn delete(&mut self, id: &Uuid) -> Result<()> {
        let user = self.session.require_user()?;
        if let Err(err) = self.repo.delete(id, &user.id).await {
            return Err(self.report(err));
        }

        info!("{} deleted listing {}", user.id, id);
        self.notices.success("Listing deleted successfully!");
        self.refresh().await
    }

    /// Post an error notice for a failure the host caught, e.g. from a form
    pub fn report(&mut self, err: Error) -> Error {
        self.notices.error(err.user_message());
        err
    }

    pub fn notices(&mut self) -> Vec<Notice> {
        self.notices.active()
    }
}
