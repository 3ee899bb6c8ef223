mod support;

use std::time::Duration;

use kenda_dispatch::api::{PresenceAPI, RideAPI, API};
use kenda_dispatch::entities::{RideStatus, VehicleClass};
use kenda_dispatch::feed::{FeedMessage, RideWatch};
use kenda_dispatch::store::RideStore;

#[tokio::test]
async fn passenger_sees_claim_through_the_feed() {
    let (engine, _store) = support::engine();
    let passenger = support::passenger();
    let driver = support::online_driver(&engine).await;

    let ride = engine
        .create_ride(passenger, support::goma_request(None))
        .await
        .unwrap();

    let mut subscription = engine.feed().subscribe_ride(ride.id);

    engine.claim_ride(driver.clone(), ride.id).await.unwrap();

    let message = tokio::time::timeout(Duration::from_secs(1), subscription.recv())
        .await
        .unwrap();

    match message {
        Some(FeedMessage::Event(update)) => {
            assert_eq!(update.id, ride.id);
            assert_eq!(update.status, RideStatus::Accepted);
            assert_eq!(update.driver_id, Some(driver.id));
        }
        message => panic!("unexpected message: {:?}", message),
    }
}

#[tokio::test]
async fn open_feed_reports_arrivals_and_departures() {
    let (engine, _store) = support::engine();
    let scanning_driver = support::online_driver(&engine).await;
    let claiming_driver = support::online_driver(&engine).await;

    let mut subscription = engine.feed().subscribe_open_rides(scanning_driver.id);

    let ride = engine
        .create_ride(support::passenger(), support::goma_request(None))
        .await
        .unwrap();

    match subscription.recv().await {
        Some(FeedMessage::Event(open)) => {
            assert_eq!(open.id, ride.id);
            assert_eq!(open.status, RideStatus::Searching);
        }
        message => panic!("unexpected message: {:?}", message),
    }

    engine
        .claim_ride(claiming_driver.clone(), ride.id)
        .await
        .unwrap();

    match subscription.recv().await {
        Some(FeedMessage::Event(taken)) => {
            assert_eq!(taken.id, ride.id);
            assert_eq!(taken.status, RideStatus::Accepted);
            assert_eq!(taken.driver_id, Some(claiming_driver.id));
        }
        message => panic!("unexpected message: {:?}", message),
    }
}

#[tokio::test]
async fn presence_feed_tracks_online_toggles() {
    let (engine, _store) = support::engine();

    let mut subscription = engine.feed().subscribe_presence();

    let driver = support::passenger();
    engine
        .go_online(driver.clone(), support::PICKUP, VehicleClass::Car)
        .await
        .unwrap();

    match subscription.recv().await {
        Some(FeedMessage::Event(presence)) => {
            assert_eq!(presence.driver_id, driver.id);
            assert!(presence.online);
        }
        message => panic!("unexpected message: {:?}", message),
    }

    engine.go_offline(driver.clone()).await.unwrap();

    match subscription.recv().await {
        Some(FeedMessage::Event(presence)) => {
            assert_eq!(presence.driver_id, driver.id);
            assert!(!presence.online);
        }
        message => panic!("unexpected message: {:?}", message),
    }
}

#[tokio::test]
async fn watch_follows_pushed_updates() {
    let (engine, _store) = support::engine();
    let passenger = support::passenger();
    let driver = support::online_driver(&engine).await;

    let ride = engine
        .create_ride(passenger, support::goma_request(None))
        .await
        .unwrap();

    let watch = RideWatch::spawn(
        engine.store(),
        engine.feed(),
        ride.id,
        Duration::from_secs(30),
    )
    .await
    .unwrap();

    let mut rx = watch.receiver();

    engine.claim_ride(driver.clone(), ride.id).await.unwrap();

    tokio::time::timeout(Duration::from_secs(1), rx.changed())
        .await
        .unwrap()
        .unwrap();

    let current = watch.current();
    assert_eq!(current.status, RideStatus::Accepted);
    assert_eq!(current.driver_id, Some(driver.id));
}

#[tokio::test]
async fn watch_reconciles_an_update_the_feed_never_delivered() {
    let (engine, store) = support::engine();
    let passenger = support::passenger();

    let ride = engine
        .create_ride(passenger, support::goma_request(None))
        .await
        .unwrap();

    let watch = RideWatch::spawn(
        engine.store(),
        engine.feed(),
        ride.id,
        Duration::from_millis(50),
    )
    .await
    .unwrap();

    // mutate the store behind the feed's back, as if a push event was lost
    let mut silent = store.fetch_ride(ride.id).await.unwrap().unwrap();
    silent.cancel(Some("dispatcher override".into())).unwrap();
    assert!(store.update_ride(&silent, "searching").await.unwrap());

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if watch.current().status == RideStatus::Cancelled {
            break;
        }

        assert!(
            tokio::time::Instant::now() < deadline,
            "watch never reconciled the silent update"
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
