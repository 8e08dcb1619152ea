//! Controller behind the create/edit listing form

use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::watch;
use uuid::Uuid;

use crate::auth::SessionStore;
use crate::error::{Error, Result};
use crate::listings::{validate_images, Listing, ListingDraft, ListingRepository};
use crate::storage::ImageFile;

/// Where a submission currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormState {
    Editing,
    Validating,
    Invalid,
    Uploading,
    Persisting,
    Success,
    Failed,
}

impl FormState {
    /// Submit stays disabled in these states
    pub fn is_busy(&self) -> bool {
        matches!(self, FormState::Uploading | FormState::Persisting)
    }
}

/// Create a new listing or edit an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormMode {
    Create,
    Edit(Uuid),
}

/// A saved listing, handed back so the host can close the form and refresh
#[derive(Debug, Clone, PartialEq)]
pub struct FormOutcome {
    pub listing: Listing,
    pub created: bool,
}

impl FormOutcome {
    pub fn message(&self) -> &'static str {
        if self.created {
            "Product listed successfully!"
        } else {
            "Listing updated successfully!"
        }
    }
}

pub struct ListingFormController {
    repo: ListingRepository,
    session: Arc<SessionStore>,
    mode: FormMode,
    draft: ListingDraft,
    state: watch::Sender<FormState>,
}

impl ListingFormController {
    /// Blank form; the availability date starts at today
    pub fn new_listing(repo: ListingRepository, session: Arc<SessionStore>) -> Self {
        Self::with_draft(repo, session, FormMode::Create, ListingDraft::default())
    }

    /// Form seeded from a listing already in memory
    pub fn edit(repo: ListingRepository, session: Arc<SessionStore>, listing: &Listing) -> Self {
        Self::with_draft(
            repo,
            session,
            FormMode::Edit(listing.id),
            ListingDraft::from_listing(listing),
        )
    }

    fn with_draft(
        repo: ListingRepository,
        session: Arc<SessionStore>,
        mode: FormMode,
        draft: ListingDraft,
    ) -> Self {
        let (state, _) = watch::channel(FormState::Editing);
        Self {
            repo,
            session,
            mode,
            draft,
            state,
        }
    }

    pub fn mode(&self) -> FormMode {
        self.mode
    }

    pub fn state(&self) -> FormState {
        *self.state.borrow()
    }

    pub fn is_busy(&self) -> bool {
        self.state().is_busy()
    }

    /// Be told about every state transition
    pub fn subscribe_state(&self) -> watch::Receiver<FormState> {
        self.state.subscribe()
    }

    pub fn draft(&self) -> &ListingDraft {
        &self.draft
    }

    /// Edit the bound values; nothing is validated until submit
    pub fn draft_mut(&mut self) -> &mut ListingDraft {
        self.back_to_editing();
        &mut self.draft
    }

    /// Replace the staged batch with `files` if every one is acceptable
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] naming each rejected file; the previous batch
    /// stays staged.
    pub fn stage_images(&mut self, files: Vec<ImageFile>) -> Result<()> {
        validate_images(&files)?;
        self.back_to_editing();
        self.draft.staged = files;
        Ok(())
    }

    /// Drop one staged file by position
    pub fn unstage_image(&mut self, index: usize) -> Option<ImageFile> {
        (index < self.draft.staged.len()).then(|| self.draft.staged.remove(index))
    }

    /// Detach one of the already stored images by position
    pub fn remove_existing_image(&mut self, index: usize) -> Option<String> {
        (index < self.draft.images.len()).then(|| self.draft.images.remove(index))
    }

    /// Validate, upload staged images and write the listing.
    ///
    /// # Errors
    ///
    /// - [`Error::Auth`] without a session
    /// - [`Error::Validation`] with every failing rule; nothing was sent
    /// - [`Error::Forbidden`] when the edited listing is not the caller's
    /// - [`Error::Persistence`] for upload or write failures
    pub async fn submit(&mut self) -> Result<FormOutcome> {
        let user = self.session.require_user()?;

        self.transition(FormState::Validating);
        let values = match self.draft.validate() {
            Ok(values) => values,
            Err(problems) => {
                debug!("listing form rejected: {}", problems);
                self.transition(FormState::Invalid);
                self.transition(FormState::Editing);
                return Err(problems.into());
            }
        };

        let mut uploaded = Vec::new();
        if !self.draft.staged.is_empty() {
            self.transition(FormState::Uploading);
            match self.repo.upload_images(&self.draft.staged, &user.id).await {
                Ok(urls) => uploaded = urls,
                Err(err) => return Err(self.fail(err)),
            }
        }

        self.transition(FormState::Persisting);
        let images: Vec<String> = self
            .draft
            .images
            .iter()
            .chain(&uploaded)
            .cloned()
            .collect();

        let result = match self.mode {
            FormMode::Create => self.repo.insert_values(&values, &images, &user.id).await,
            FormMode::Edit(id) => match self
                .repo
                .update_values(&id, &values, &images, &user.id)
                .await
            {
                Ok(Some(listing)) => Ok(listing),
                Ok(None) => {
                    self.repo.release_unused(&uploaded).await;
                    return Err(self.fail(Error::Forbidden(id)));
                }
                Err(err) => Err(err),
            },
        };

        match result {
            Ok(listing) => {
                self.draft.staged.clear();
                self.draft.images = listing.images.clone();
                self.transition(FormState::Success);

                let outcome = FormOutcome {
                    created: self.mode == FormMode::Create,
                    listing,
                };
                info!("{}: {}", outcome.message(), outcome.listing.id);
                Ok(outcome)
            }
            Err(err) => {
                let err = self.repo.abandon_uploads(err, &uploaded).await;
                Err(self.fail(err))
            }
        }
    }

    fn fail(&self, err: Error) -> Error {
        warn!("listing form submission failed: {}", err);
        self.transition(FormState::Failed);
        err
    }

    fn back_to_editing(&self) {
        if matches!(
            self.state(),
            FormState::Invalid | FormState::Failed | FormState::Success
        ) {
            self.transition(FormState::Editing);
        }
    }

    fn transition(&self, next: FormState) {
        self.state.send_replace(next);
    }
}
