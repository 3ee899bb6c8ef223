use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::entities::Coordinates;
use crate::error::{invalid_input_error, upstream_error, Error};

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Estimate {
    /// Route distance in meters.
    pub distance: f64,
    /// Travel time in seconds.
    pub duration: f64,
}

#[derive(Clone, Debug, Deserialize)]
struct RouteResponse {
    code: String,
    routes: Option<Vec<RouteLeg>>,
}

#[derive(Clone, Debug, Deserialize)]
struct RouteLeg {
    distance: f64,
    duration: f64,
}

#[tracing::instrument]
pub async fn estimate_route(
    base_url: &str,
    origin: Coordinates,
    destination: Coordinates,
) -> Result<Estimate, Error> {
    let url = format!(
        "{}/route/v1/driving/{},{};{},{}",
        base_url,
        origin.longitude,
        origin.latitude,
        destination.longitude,
        destination.latitude
    );

    let res = reqwest::Client::new()
        .get(url)
        .query(&[("overview", "false")])
        .send()
        .await?;

    let status_code = res.status().as_u16();

    if status_code >= 400 && status_code < 500 {
        return Err(invalid_input_error());
    } else if status_code != 200 {
        return Err(upstream_error());
    }

    let data: RouteResponse = res.json().await?;

    if data.code != "Ok" {
        return Err(upstream_error());
    }

    data.routes
        .unwrap_or_default()
        .into_iter()
        .next()
        .map(|leg| Estimate {
            distance: leg.distance,
            duration: leg.duration,
        })
        .ok_or_else(upstream_error)
}

/// Straight-line estimate used when the routing service is unreachable or
/// not configured; an estimate always comes back, the request flow never
/// blocks on routing.
pub fn fallback_estimate(
    origin: Coordinates,
    destination: Coordinates,
    average_speed: f64,
) -> Estimate {
    let distance = origin.haversine_distance(&destination);

    Estimate {
        distance,
        duration: distance / average_speed,
    }
}

#[tracing::instrument(skip(config))]
pub async fn estimate_or_fallback(
    config: &Config,
    origin: Coordinates,
    destination: Coordinates,
) -> Estimate {
    if let Some(base_url) = &config.routing_url {
        match estimate_route(base_url, origin, destination).await {
            Ok(estimate) => return estimate,
            Err(err) => {
                tracing::warn!(code = err.code, "routing estimate failed, using fallback");
            }
        }
    }

    fallback_estimate(origin, destination, config.average_speed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_estimate_scales_with_speed() {
        let goma = Coordinates {
            latitude: -1.6585,
            longitude: 29.2205,
        };
        let sake = Coordinates {
            latitude: -1.5736,
            longitude: 29.0508,
        };

        let estimate = fallback_estimate(goma, sake, 10.0);

        assert!(estimate.distance > 20_000.0);
        assert!((estimate.duration - estimate.distance / 10.0).abs() < f64::EPSILON);
    }
}
