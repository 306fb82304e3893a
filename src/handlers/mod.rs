use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::gateway::VnpayGateway;
use crate::services::carts::CartService;
use crate::services::settlement::SettlementService;

pub mod carts;
pub mod checkout;
pub mod orders;

/// Service container threaded through the router state.
#[derive(Clone)]
pub struct AppServices {
    pub settlement: Arc<SettlementService>,
    pub carts: Arc<CartService>,
    pub gateway: Arc<VnpayGateway>,
}

/// Caller identity. Authentication lives in front of this service; the
/// trusted proxy injects the resolved user id as a header.
pub struct UserId(pub Uuid);

#[axum::async_trait]
impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Uuid::parse_str(s).ok())
            .map(UserId)
            .ok_or_else(|| {
                ServiceError::InvalidInput("missing or malformed x-user-id header".to_string())
            })
    }
}
