mod driver;
mod place;
mod ride;

pub use driver::{DriverPresence, VehicleClass};
pub use place::{Coordinates, Place};
pub use ride::{Ride, RideRequest, RideStatus};
