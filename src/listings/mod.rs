//! Persistence of product listings and their images

mod draft;
mod filter;
mod types;

use std::sync::Arc;

use chrono::Utc;
use log::{debug, error, info, warn};
use serde_json::json;
use uuid::Uuid;

use crate::error::{Error, GatewayError, PersistStage, Result};
use crate::postgrest::{decode_rows, decode_valid_rows, Database, Query};
use crate::realtime::{ChangeFeed, ChangeStream};
use crate::storage::{ImageFile, ObjectStorage, PRODUCT_IMAGES_BUCKET};

pub use draft::*;
pub use filter::*;
pub use types::*;

/// Table holding listing rows
pub const LISTINGS_TABLE: &str = "product_listings";

/// Reads and ownership-scoped writes of listings.
///
/// Writes never trust the caller-supplied row: the owner column always comes
/// from the `farmer_id` argument, which callers take from the session.
#[derive(Clone)]
pub struct ListingRepository {
    db: Arc<dyn Database>,
    storage: Arc<dyn ObjectStorage>,
    feed: Arc<dyn ChangeFeed>,
    discard_orphans: bool,
}

impl ListingRepository {
    pub fn new(
        db: Arc<dyn Database>,
        storage: Arc<dyn ObjectStorage>,
        feed: Arc<dyn ChangeFeed>,
    ) -> Self {
        Self {
            db,
            storage,
            feed,
            discard_orphans: false,
        }
    }

    /// Remove uploads that a failed write left unreferenced
    pub fn with_orphan_cleanup(mut self, value: bool) -> Self {
        self.discard_orphans = value;
        self
    }

    /// Available listings matching `filter`, newest first
    ///
    /// # Errors
    ///
    /// [`Error::Query`] when the backend cannot be reached or rejects the query.
    pub async fn list_available(&self, filter: &ListingFilter) -> Result<Vec<Listing>> {
        self.fetch(filter.to_query()).await
    }

    /// One page of [`ListingRepository::list_available`]
    pub async fn list_available_page(
        &self,
        filter: &ListingFilter,
        page: Page,
    ) -> Result<Vec<Listing>> {
        let query = filter.to_query().offset(page.offset).limit(page.limit);
        self.fetch(query).await
    }

    /// Every listing of one farmer regardless of status, newest first
    pub async fn list_owned_by(&self, farmer_id: &Uuid) -> Result<Vec<Listing>> {
        let query = Query::default()
            .eq("farmer_id", farmer_id)
            .order("created_at", false);
        self.fetch(query).await
    }

    /// A single listing with its seller's contact fields
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when `id` is not a hyphenated UUID or no row has it;
    /// malformed ids are rejected without a network call.
    pub async fn get_by_id(&self, id: &str) -> Result<Listing> {
        let id = parse_listing_id(id)?;
        let query = Query::select(LISTING_WITH_SELLER).eq("id", id).limit(1);

        self.fetch(query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found(id))
    }

    /// Validate, upload the staged images and insert a new available listing
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] before any network call, or
    /// [`Error::Persistence`] naming the failed stage and any stored images.
    pub async fn create(&self, draft: &ListingDraft, farmer_id: &Uuid) -> Result<Listing> {
        let values = draft.validate()?;
        let uploaded = self.upload_images(&draft.staged, farmer_id).await?;
        let images = combine_images(&draft.images, &uploaded);

        match self.insert_values(&values, &images, farmer_id).await {
            Ok(listing) => Ok(listing),
            Err(err) => Err(self.abandon_uploads(err, &uploaded).await),
        }
    }

    /// Validate, upload and replace the mutable fields of an owned listing.
    ///
    /// Existing image URLs on the draft are kept and new uploads appended.
    /// Returns `Ok(None)` when no row matched both `id` and `farmer_id`.
    pub async fn update(
        &self,
        id: &Uuid,
        draft: &ListingDraft,
        farmer_id: &Uuid,
    ) -> Result<Option<Listing>> {
        let values = draft.validate()?;
        let uploaded = self.upload_images(&draft.staged, farmer_id).await?;
        let images = combine_images(&draft.images, &uploaded);

        match self.update_values(id, &values, &images, farmer_id).await {
            Ok(Some(listing)) => Ok(Some(listing)),
            Ok(None) => {
                self.release_unused(&uploaded).await;
                Ok(None)
            }
            Err(err) => Err(self.abandon_uploads(err, &uploaded).await),
        }
    }

    /// Insert already validated values with their final image URLs
    pub async fn insert_values(
        &self,
        values: &ListingValues,
        images: &[String],
        farmer_id: &Uuid,
    ) -> Result<Listing> {
        let row = values.to_insert_row(images, farmer_id);
        let rows = self
            .db
            .insert(LISTINGS_TABLE, row)
            .await
            .map_err(|e| write_failure(PersistStage::Insert, e))?;

        let listing = decode_rows::<Listing>(rows)
            .map_err(|e| write_failure(PersistStage::Insert, e))?
            .into_iter()
            .next()
            .ok_or_else(|| {
                write_failure(
                    PersistStage::Insert,
                    GatewayError::status(500, "insert returned no row"),
                )
            })?;

        info!("created listing {} for {}", listing.id, farmer_id);
        Ok(listing)
    }

    /// Replace the mutable fields of the row matching `id` and `farmer_id`
    pub async fn update_values(
        &self,
        id: &Uuid,
        values: &ListingValues,
        images: &[String],
        farmer_id: &Uuid,
    ) -> Result<Option<Listing>> {
        let mut changes = values.to_row(images);
        changes["updated_at"] = json!(Utc::now());

        let rows = self
            .db
            .update(LISTINGS_TABLE, &owned_row(id, farmer_id), changes)
            .await
            .map_err(|e| write_failure(PersistStage::Update, e))?;

        let listing = decode_rows::<Listing>(rows)
            .map_err(|e| write_failure(PersistStage::Update, e))?
            .into_iter()
            .next();

        match &listing {
            Some(_) => info!("updated listing {}", id),
            None => warn!("update of listing {} by {} matched no row", id, farmer_id),
        }
        Ok(listing)
    }

    /// Delete an owned listing; deleting a missing one is not an error
    pub async fn delete(&self, id: &Uuid, farmer_id: &Uuid) -> Result<()> {
        let rows = self
            .db
            .delete(LISTINGS_TABLE, &owned_row(id, farmer_id))
            .await
            .map_err(|e| write_failure(PersistStage::Delete, e))?;

        if rows.is_empty() {
            debug!("delete of listing {} by {} matched no row", id, farmer_id);
        } else {
            info!("deleted listing {}", id);
        }
        Ok(())
    }

    /// Upload a batch of images under `owner_id` and return their public URLs
    /// in input order.
    ///
    /// The whole batch is checked first; one bad file means nothing is
    /// uploaded. Uploads run one after another.
    pub async fn upload_images(&self, files: &[ImageFile], owner_id: &Uuid) -> Result<Vec<String>> {
        draft::validate_images(files)?;

        let mut urls = Vec::with_capacity(files.len());
        let mut stored = Vec::with_capacity(files.len());
        for file in files {
            let path = file.storage_path(owner_id);
            debug!("uploading {:?} to {}", file, path);

            if let Err(e) = self
                .storage
                .upload(PRODUCT_IMAGES_BUCKET, &path, file.data.clone(), &file.media_type)
                .await
            {
                error!("upload of {} failed: {}", file.name, e);
                let err = Error::persistence(PersistStage::Upload, e);
                return Err(self.abandon_paths(err, stored).await);
            }

            urls.push(self.storage.public_url(PRODUCT_IMAGES_BUCKET, &path));
            stored.push(path);
        }

        Ok(urls)
    }

    /// Remove stored images by path
    pub async fn discard_uploads(&self, paths: &[String]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        self.storage
            .remove(PRODUCT_IMAGES_BUCKET, paths)
            .await
            .map_err(|e| write_failure(PersistStage::Delete, e))?;
        info!("discarded {} orphaned image(s)", paths.len());
        Ok(())
    }

    /// Storage path behind one of this bucket's public URLs
    pub fn storage_path(&self, url: &str) -> Option<String> {
        let prefix = self.storage.public_url(PRODUCT_IMAGES_BUCKET, "");
        url.strip_prefix(&prefix)
            .filter(|path| !path.is_empty())
            .map(str::to_string)
    }

    /// Attach (or clean up) the uploads a failed write left behind
    pub async fn abandon_uploads(&self, err: Error, uploaded_urls: &[String]) -> Error {
        let paths = uploaded_urls
            .iter()
            .filter_map(|url| self.storage_path(url))
            .collect();
        self.abandon_paths(err, paths).await
    }

    /// Notifications for any insert, update or delete of a listing
    pub async fn subscribe_changes(&self) -> Result<ChangeStream> {
        self.feed.subscribe(LISTINGS_TABLE).await.map_err(|e| {
            error!("listing change subscription failed: {}", e);
            Error::Query(e)
        })
    }

    async fn abandon_paths(&self, err: Error, paths: Vec<String>) -> Error {
        if self.release(&paths).await {
            err
        } else {
            err.with_orphans(paths)
        }
    }

    /// Let go of uploads no row ended up referencing
    pub(crate) async fn release_unused(&self, uploaded_urls: &[String]) {
        let paths: Vec<String> = uploaded_urls
            .iter()
            .filter_map(|url| self.storage_path(url))
            .collect();
        self.release(&paths).await;
    }

    /// Discard unreferenced uploads when cleanup is enabled; true once gone
    async fn release(&self, paths: &[String]) -> bool {
        if paths.is_empty() {
            return true;
        }
        if !self.discard_orphans {
            warn!("{} uploaded image(s) left unreferenced: {:?}", paths.len(), paths);
            return false;
        }
        match self.discard_uploads(paths).await {
            Ok(()) => true,
            Err(e) => {
                warn!("could not discard orphaned images: {}", e);
                false
            }
        }
    }

    async fn fetch(&self, query: Query) -> Result<Vec<Listing>> {
        let rows = self.db.select(LISTINGS_TABLE, &query).await.map_err(|e| {
            error!("listing query failed: {}", e);
            Error::Query(e)
        })?;
        Ok(decode_valid_rows(LISTINGS_TABLE, rows))
    }
}

/// Accept only canonical hyphenated UUIDs
fn parse_listing_id(id: &str) -> Result<Uuid> {
    if id.len() != 36 {
        return Err(Error::not_found(id));
    }
    Uuid::try_parse(id).map_err(|_| Error::not_found(id))
}

fn owned_row(id: &Uuid, farmer_id: &Uuid) -> Query {
    Query::default().eq("id", id).eq("farmer_id", farmer_id)
}

fn combine_images(existing: &[String], uploaded: &[String]) -> Vec<String> {
    existing.iter().chain(uploaded).cloned().collect()
}

fn write_failure(stage: PersistStage, err: GatewayError) -> Error {
    error!("listing {} failed: {}", stage, err);
    Error::persistence(stage, err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_ids_must_be_canonical() {
        let id = Uuid::new_v4();
        assert_eq!(parse_listing_id(&id.to_string()).unwrap(), id);
        assert_eq!(parse_listing_id(&id.to_string().to_uppercase()).unwrap(), id);

        for bad in [
            String::new(),
            "not-a-uuid".to_string(),
            id.simple().to_string(),
            format!("{{{}}}", id),
            format!("urn:uuid:{}", id),
        ] {
            assert!(matches!(parse_listing_id(&bad), Err(Error::NotFound(_))), "{bad}");
        }
    }

    #[test]
    fn new_uploads_follow_existing_images() {
        let combined = combine_images(&["a".to_string()], &["b".to_string(), "c".to_string()]);
        assert_eq!(combined, vec!["a", "b", "c"]);
    }
}
