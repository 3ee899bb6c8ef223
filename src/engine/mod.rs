mod presence_api;
mod ride_api;

use std::sync::Arc;

use crate::api::API;
use crate::feed::ChangeFeed;
use crate::store::RideStore;

/// Freshness horizon applied to the driver index; the store keeps no TTL.
const PRESENCE_MAX_AGE_SECS: i64 = 60;

const FEED_CAPACITY: usize = 256;

pub struct Engine {
    store: Arc<dyn RideStore>,
    feed: ChangeFeed,
}

impl Engine {
    #[tracing::instrument(name = "Engine::new", skip_all)]
    pub fn new(store: Arc<dyn RideStore>) -> Self {
        Self {
            store,
            feed: ChangeFeed::new(FEED_CAPACITY),
        }
    }

    pub fn store(&self) -> Arc<dyn RideStore> {
        self.store.clone()
    }
}

impl API for Engine {
    fn feed(&self) -> &ChangeFeed {
        &self.feed
    }
}
