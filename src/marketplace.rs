//! Controller behind the public marketplace page

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::auth::SessionStore;
use crate::contact::ContactAffordance;
use crate::error::Result;
use crate::listings::{Listing, ListingFilter, ListingRepository};
use crate::notice::{Notice, NoticeBoard};

struct State {
    /// Filter as the user is typing it
    edited: ListingFilter,
    /// Filter the shown listings were queried with
    applied: ListingFilter,
    listings: Vec<Listing>,
    loading: bool,
    notices: NoticeBoard,
    mounted: bool,
    /// Bumped per refresh so only the newest result lands
    generation: u64,
}

/// Browse available listings with filters, kept fresh by the change feed
pub struct MarketplaceController {
    repo: ListingRepository,
    session: Arc<SessionStore>,
    state: Arc<RwLock<State>>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl MarketplaceController {
    pub fn new(repo: ListingRepository, session: Arc<SessionStore>, notice_ttl: Duration) -> Self {
        let state = State {
            edited: ListingFilter::default(),
            applied: ListingFilter::default(),
            listings: Vec::new(),
            loading: false,
            notices: NoticeBoard::new(notice_ttl),
            mounted: false,
            generation: 0,
        };

        Self {
            repo,
            session,
            state: Arc::new(RwLock::new(state)),
            watcher: Mutex::new(None),
        }
    }

    /// Load the listings and start following changes.
    ///
    /// Every change notification re-runs the applied query as a whole. When
    /// the change feed cannot be joined the page still works without it.
    pub async fn mount(&self) -> Result<()> {
        self.state.write().await.mounted = true;

        let mut watcher = self.watcher.lock().await;
        if watcher.is_none() {
            match self.repo.subscribe_changes().await {
                Ok(mut changes) => {
                    let repo = self.repo.clone();
                    let state = Arc::clone(&self.state);
                    *watcher = Some(tokio::spawn(async move {
                        loop {
                            match changes.recv().await {
                                Ok(change) => {
                                    debug!("{:?} on {}, refreshing marketplace", change.kind, change.table);
                                }
                                Err(RecvError::Lagged(skipped)) => {
                                    debug!("skipped {} change notification(s)", skipped);
                                }
                                Err(RecvError::Closed) => break,
                            }
                            // Failures are already on the notice board.
                            let _ = refresh(&repo, &state).await;
                        }
                        debug!("marketplace change feed ended");
                    }));
                }
                Err(err) => warn!("marketplace will not auto-refresh: {}", err),
            }
        }
        drop(watcher);

        refresh(&self.repo, &self.state).await
    }

    /// Stop following changes; results still in flight are dropped
    pub async fn unmount(&self) {
        {
            let mut state = self.state.write().await;
            state.mounted = false;
            state.loading = false;
        }
        if let Some(watcher) = self.watcher.lock().await.take() {
            watcher.abort();
        }
        info!("marketplace unmounted");
    }

    pub async fn is_mounted(&self) -> bool {
        self.state.read().await.mounted
    }

    /// Change the edited filter; no query is issued
    pub async fn edit_filter<F>(&self, edit: F)
    where
        F: FnOnce(&mut ListingFilter),
    {
        edit(&mut self.state.write().await.edited);
    }

    /// Query with the edited filter
    pub async fn apply_filters(&self) -> Result<()> {
        {
            let mut state = self.state.write().await;
            state.applied = state.edited.clone();
        }
        refresh(&self.repo, &self.state).await
    }

    /// Clear every filter field and query again
    pub async fn reset_filters(&self) -> Result<()> {
        {
            let mut state = self.state.write().await;
            state.edited.clear();
            state.applied.clear();
        }
        refresh(&self.repo, &self.state).await
    }

    /// Re-run the applied query
    pub async fn refresh(&self) -> Result<()> {
        refresh(&self.repo, &self.state).await
    }

    pub async fn listings(&self) -> Vec<Listing> {
        self.state.read().await.listings.clone()
    }

    pub async fn is_loading(&self) -> bool {
        self.state.read().await.loading
    }

    pub async fn edited_filter(&self) -> ListingFilter {
        self.state.read().await.edited.clone()
    }

    pub async fn applied_filter(&self) -> ListingFilter {
        self.state.read().await.applied.clone()
    }

    pub async fn notices(&self) -> Vec<Notice> {
        self.state.write().await.notices.active()
    }

    /// Contact options for one listing, given who is signed in right now
    pub fn contact_for(&self, listing: &Listing) -> ContactAffordance {
        ContactAffordance::for_listing(self.session.current_user().is_some(), listing)
    }

    /// Load one listing for its details page
    pub async fn listing_details(&self, id: &str) -> Result<Listing> {
        match self.repo.get_by_id(id).await {
            Ok(listing) => Ok(listing),
            Err(err) => {
                self.state.write().await.notices.error(err.user_message());
                Err(err)
            }
        }
    }
}

impl Drop for MarketplaceController {
    fn drop(&mut self) {
        if let Some(watcher) = self.watcher.get_mut().take() {
            watcher.abort();
        }
    }
}

async fn refresh(repo: &ListingRepository, state: &RwLock<State>) -> Result<()> {
    let (filter, generation) = {
        let mut state = state.write().await;
        if !state.mounted {
            return Ok(());
        }
        state.generation += 1;
        state.loading = true;
        (state.applied.clone(), state.generation)
    };

    let result = repo.list_available(&filter).await;

    let mut state = state.write().await;
    if !state.mounted || state.generation != generation {
        debug!("discarding stale marketplace result #{}", generation);
        return Ok(());
    }
    state.loading = false;

    match result {
        Ok(listings) => {
            debug!("marketplace shows {} listing(s)", listings.len());
            state.listings = listings;
            Ok(())
        }
        Err(err) => {
            state.notices.error(err.user_message());
            Err(err)
        }
    }
}
