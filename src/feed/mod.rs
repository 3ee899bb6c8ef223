mod watch;

pub use watch::RideWatch;

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::entities::{DriverPresence, Ride, RideStatus};

/// Push channel for ride and presence mutations. Every event carries the
/// full row, never a diff; delivery is at-least-once and subscribers must
/// tolerate duplicates. The feed pushes changes only; a subscriber
/// fetches its snapshot separately when it attaches.
#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<FeedEvent>,
}

#[derive(Clone, Debug)]
pub enum FeedEvent {
    Ride(Ride),
    Presence(DriverPresence),
}

#[derive(Clone, Debug)]
pub enum FeedMessage<T> {
    /// Full replacement of the row's state.
    Event(T),
    /// The receiver fell behind and `skipped` events were dropped; the
    /// subscriber must re-fetch before trusting the stream again.
    Lapse(u64),
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);

        Self { tx }
    }

    pub fn publish_ride(&self, ride: &Ride) {
        // no subscribers is not an error
        let _ = self.tx.send(FeedEvent::Ride(ride.clone()));
    }

    pub fn publish_presence(&self, presence: &DriverPresence) {
        let _ = self.tx.send(FeedEvent::Presence(presence.clone()));
    }

    /// Every update to a single ride: the passenger waiting on their own
    /// request, or the matched driver following it.
    pub fn subscribe_ride(&self, id: Uuid) -> RideSubscription {
        RideSubscription {
            id,
            rx: self.tx.subscribe(),
        }
    }

    /// Rides entering or leaving the open pool, as seen by one driver.
    /// Targeted requests aimed at other drivers are filtered out here;
    /// proximity filtering stays with the consumer.
    pub fn subscribe_open_rides(&self, driver_id: Uuid) -> OpenRideSubscription {
        OpenRideSubscription {
            driver_id,
            rx: self.tx.subscribe(),
        }
    }

    /// Online-driver presence changes, e.g. for rendering competing
    /// drivers on the map.
    pub fn subscribe_presence(&self) -> PresenceSubscription {
        PresenceSubscription {
            rx: self.tx.subscribe(),
        }
    }
}

pub struct RideSubscription {
    id: Uuid,
    rx: broadcast::Receiver<FeedEvent>,
}

impl RideSubscription {
    /// `None` once the feed is gone.
    pub async fn recv(&mut self) -> Option<FeedMessage<Ride>> {
        loop {
            match self.rx.recv().await {
                Ok(FeedEvent::Ride(ride)) if ride.id == self.id => {
                    return Some(FeedMessage::Event(ride))
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    return Some(FeedMessage::Lapse(skipped))
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

pub struct OpenRideSubscription {
    driver_id: Uuid,
    rx: broadcast::Receiver<FeedEvent>,
}

impl OpenRideSubscription {
    fn wants(&self, ride: &Ride) -> bool {
        if ride.is_searching() {
            return ride.visible_to(self.driver_id);
        }

        // a claim or a cancellation takes a ride out of the open pool;
        // subscribers drop ids they were not tracking
        matches!(ride.status, RideStatus::Accepted | RideStatus::Cancelled)
    }

    pub async fn recv(&mut self) -> Option<FeedMessage<Ride>> {
        loop {
            match self.rx.recv().await {
                Ok(FeedEvent::Ride(ride)) if self.wants(&ride) => {
                    return Some(FeedMessage::Event(ride))
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    return Some(FeedMessage::Lapse(skipped))
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

pub struct PresenceSubscription {
    rx: broadcast::Receiver<FeedEvent>,
}

impl PresenceSubscription {
    pub async fn recv(&mut self) -> Option<FeedMessage<DriverPresence>> {
        loop {
            match self.rx.recv().await {
                Ok(FeedEvent::Presence(presence)) => return Some(FeedMessage::Event(presence)),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    return Some(FeedMessage::Lapse(skipped))
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Coordinates, Place, RideRequest};

    fn open_ride(driver_id: Option<Uuid>) -> Ride {
        Ride::request(
            Uuid::new_v4(),
            RideRequest {
                pickup: Place {
                    coordinates: Coordinates {
                        latitude: -1.6585,
                        longitude: 29.2205,
                    },
                    address: "Avenue du Lac, Goma".into(),
                },
                destination: Place {
                    coordinates: Coordinates {
                        latitude: -1.6135,
                        longitude: 29.2205,
                    },
                    address: "Aéroport international de Goma".into(),
                },
                price: 4500.0,
                distance: 5000.0,
                duration: 900.0,
                driver_id,
            },
        )
        .unwrap()
    }

    #[test]
    fn ride_subscription_ignores_other_rides() {
        tokio_test::block_on(async {
            let feed = ChangeFeed::new(16);
            let tracked = open_ride(None);
            let other = open_ride(None);

            let mut subscription = feed.subscribe_ride(tracked.id);

            feed.publish_ride(&other);
            feed.publish_ride(&tracked);

            match subscription.recv().await {
                Some(FeedMessage::Event(ride)) => assert_eq!(ride.id, tracked.id),
                message => panic!("unexpected message: {:?}", message),
            }
        });
    }

    #[test]
    fn open_feed_hides_rides_targeted_at_other_drivers() {
        tokio_test::block_on(async {
            let feed = ChangeFeed::new(16);
            let me = Uuid::new_v4();
            let rival = Uuid::new_v4();

            let mut subscription = feed.subscribe_open_rides(me);

            feed.publish_ride(&open_ride(Some(rival)));
            let broadcast_ride = open_ride(None);
            feed.publish_ride(&broadcast_ride);

            match subscription.recv().await {
                Some(FeedMessage::Event(ride)) => assert_eq!(ride.id, broadcast_ride.id),
                message => panic!("unexpected message: {:?}", message),
            }
        });
    }

    #[test]
    fn claimed_ride_reaches_open_subscribers_as_departure() {
        tokio_test::block_on(async {
            let feed = ChangeFeed::new(16);
            let mut subscription = feed.subscribe_open_rides(Uuid::new_v4());

            let mut ride = open_ride(None);
            ride.claim(Uuid::new_v4()).unwrap();
            feed.publish_ride(&ride);

            match subscription.recv().await {
                Some(FeedMessage::Event(seen)) => {
                    assert_eq!(seen.id, ride.id);
                    assert_eq!(seen.status, RideStatus::Accepted);
                }
                message => panic!("unexpected message: {:?}", message),
            }
        });
    }

    #[test]
    fn slow_subscriber_observes_a_lapse() {
        tokio_test::block_on(async {
            let feed = ChangeFeed::new(1);
            let ride = open_ride(None);
            let mut subscription = feed.subscribe_ride(ride.id);

            for _ in 0..4 {
                feed.publish_ride(&ride);
            }

            match subscription.recv().await {
                Some(FeedMessage::Lapse(skipped)) => assert!(skipped > 0),
                message => panic!("unexpected message: {:?}", message),
            }
        });
    }
}
