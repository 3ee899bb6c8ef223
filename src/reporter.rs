use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::api::{DynAPI, PresenceAPI};
use crate::auth::User;
use crate::entities::{Coordinates, DriverPresence, VehicleClass};
use crate::error::Error;

/// Default fallback interval for platforms that throttle continuous
/// position callbacks.
pub const DEFAULT_FALLBACK_INTERVAL: Duration = Duration::from_secs(15);

/// Periodic position emission for one online driver. The first report
/// happens inline when the driver goes online; afterwards the loop
/// forwards every fix from the device and re-sends the last known fix on
/// a fallback timer. Reports are best-effort: failures are logged and the
/// loop keeps going.
pub struct LocationReporter {
    api: DynAPI,
    user: User,
    task: JoinHandle<()>,
}

impl LocationReporter {
    #[tracing::instrument(name = "LocationReporter::spawn", skip(api, fixes))]
    pub async fn spawn(
        api: DynAPI,
        user: User,
        vehicle: VehicleClass,
        initial: Coordinates,
        fixes: mpsc::Receiver<Coordinates>,
        fallback_interval: Duration,
    ) -> Result<(Self, DriverPresence), Error> {
        let presence = api.go_online(user.clone(), initial, vehicle).await?;

        let task = tokio::spawn(run(
            api.clone(),
            user.clone(),
            initial,
            fixes,
            fallback_interval,
        ));

        Ok((Self { api, user, task }, presence))
    }

    /// Tear the loop down and clear dispatch visibility. Rides the driver
    /// is bound to are left untouched.
    #[tracing::instrument(name = "LocationReporter::stop", skip(self))]
    pub async fn stop(self) -> Result<DriverPresence, Error> {
        self.task.abort();

        self.api.go_offline(self.user.clone()).await
    }
}

impl Drop for LocationReporter {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    api: DynAPI,
    user: User,
    mut last: Coordinates,
    mut fixes: mpsc::Receiver<Coordinates>,
    fallback_interval: Duration,
) {
    let mut ticker = tokio::time::interval(fallback_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    let mut fixes_closed = false;

    loop {
        tokio::select! {
            fix = fixes.recv(), if !fixes_closed => match fix {
                Some(coordinates) => {
                    last = coordinates;
                    report(&api, &user, last).await;
                }
                // device stopped pushing fixes; the fallback timer keeps
                // the last position fresh
                None => fixes_closed = true,
            },
            _ = ticker.tick() => report(&api, &user, last).await,
        }
    }
}

async fn report(api: &DynAPI, user: &User, coordinates: Coordinates) {
    if let Err(err) = api.report_location(user.clone(), coordinates).await {
        tracing::warn!(driver_id = %user.id, code = err.code, "location report failed");
    }
}
