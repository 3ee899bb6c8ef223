use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use super::{ChangeFeed, FeedMessage, RideSubscription};
use crate::entities::Ride;
use crate::error::{invalid_input_error, Error};
use crate::store::RideStore;

const RESYNC_ATTEMPTS: u32 = 5;
const RESYNC_BASE_DELAY: Duration = Duration::from_millis(200);

/// Latest-state view of one ride, fed by the change feed with a
/// fixed-interval re-fetch layered on top as a reconciliation pass. Push
/// events and poll results overwrite the same cell, so duplicates and
/// missed events both converge on the store's truth.
pub struct RideWatch {
    rx: watch::Receiver<Ride>,
    task: JoinHandle<()>,
}

impl RideWatch {
    #[tracing::instrument(name = "RideWatch::spawn", skip(store, feed))]
    pub async fn spawn(
        store: Arc<dyn RideStore>,
        feed: &ChangeFeed,
        id: Uuid,
        poll_interval: Duration,
    ) -> Result<Self, Error> {
        // subscribe before the snapshot so no window exists between them
        let subscription = feed.subscribe_ride(id);
        let ride = store
            .fetch_ride(id)
            .await?
            .ok_or_else(invalid_input_error)?;

        let (tx, rx) = watch::channel(ride);
        let task = tokio::spawn(run(store, subscription, tx, id, poll_interval));

        Ok(Self { rx, task })
    }

    pub fn current(&self) -> Ride {
        self.rx.borrow().clone()
    }

    pub fn receiver(&self) -> watch::Receiver<Ride> {
        self.rx.clone()
    }
}

impl Drop for RideWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    store: Arc<dyn RideStore>,
    mut subscription: RideSubscription,
    tx: watch::Sender<Ride>,
    id: Uuid,
    poll_interval: Duration,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            message = subscription.recv() => match message {
                Some(FeedMessage::Event(ride)) => {
                    let terminal = ride.is_terminal();

                    if tx.send(ride).is_err() || terminal {
                        break;
                    }
                }
                Some(FeedMessage::Lapse(skipped)) => {
                    tracing::warn!(%id, skipped, "ride feed lapsed, resyncing from store");

                    if !resync(store.as_ref(), &tx, id).await {
                        break;
                    }
                }
                None => break,
            },
            _ = ticker.tick() => {
                if !resync(store.as_ref(), &tx, id).await {
                    break;
                }
            }
        }
    }
}

/// Re-fetch the row and overwrite the cell, retrying transient store
/// failures with exponential backoff. Returns false once the watch has no
/// more work to do.
async fn resync(store: &dyn RideStore, tx: &watch::Sender<Ride>, id: Uuid) -> bool {
    let mut delay = RESYNC_BASE_DELAY;

    for _ in 0..RESYNC_ATTEMPTS {
        match store.fetch_ride(id).await {
            Ok(Some(ride)) => {
                let terminal = ride.is_terminal();

                return tx.send(ride).is_ok() && !terminal;
            }
            Ok(None) => return false,
            Err(err) => {
                tracing::warn!(%id, code = err.code, "ride resync failed, backing off");

                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }
    }

    // keep the watch alive; the next pass retries
    true
}
