use async_trait::async_trait;
use axum::extract::{FromRequest, RequestParts};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{unauthorized_error, Error};

/// Caller identity. Authentication lives upstream; the engine trusts the
/// user id handed to it and only checks which party it is on a ride.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
}

impl User {
    pub fn new(id: Uuid) -> Self {
        Self { id }
    }
}

#[async_trait]
impl<B: Send> FromRequest<B> for User {
    type Rejection = Error;

    async fn from_request(req: &mut RequestParts<B>) -> Result<Self, Self::Rejection> {
        let id = req
            .headers()
            .get("x-user-id")
            .and_then(|value| value.to_str().ok())
            .and_then(|raw| Uuid::parse_str(raw).ok())
            .ok_or_else(unauthorized_error)?;

        Ok(Self::new(id))
    }
}
