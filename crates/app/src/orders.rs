//! Order handoff.
//!
//! Converting a cart hands a frozen [`OrderSnapshot`] to the order service.
//! Submission is attempted once: placing an order is not idempotent.

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use carthorse::order::OrderSnapshot;
use mockall::automock;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::lookup::{Transport, TransportError};

#[derive(Debug, Error)]
pub enum HandoffError {
    #[error("order could not be encoded")]
    Encode(#[from] serde_json::Error),

    #[error("order service unreachable")]
    Unreachable(#[source] TransportError),

    #[error("order service timed out after {0:?}")]
    TimedOut(Duration),

    #[error("order service rejected the order with status {status}")]
    Rejected { status: u16 },
}

#[automock]
#[async_trait]
pub trait OrderHandoff: Send + Sync {
    async fn submit(&self, order: &OrderSnapshot) -> Result<(), HandoffError>;
}

pub struct HttpOrderHandoff {
    url: String,
    transport: Arc<dyn Transport>,
    timeout: Duration,
}

impl Debug for HttpOrderHandoff {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("HttpOrderHandoff")
            .field("url", &self.url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl HttpOrderHandoff {
    pub fn new(base_url: &str, transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        Self {
            url: format!("{}/api/orders", base_url.trim_end_matches('/')),
            transport,
            timeout,
        }
    }
}

#[async_trait]
impl OrderHandoff for HttpOrderHandoff {
    async fn submit(&self, order: &OrderSnapshot) -> Result<(), HandoffError> {
        let body = serde_json::to_value(order)?;

        let response = timeout(self.timeout, self.transport.post_json(&self.url, &body))
            .await
            .map_err(|elapsed| {
                warn!(cart = %order.cart_id, %elapsed, "order handoff timed out");

                HandoffError::TimedOut(self.timeout)
            })?
            .map_err(HandoffError::Unreachable)?;

        if !response.is_success() {
            warn!(cart = %order.cart_id, status = response.status, "order handoff rejected");

            return Err(HandoffError::Rejected {
                status: response.status,
            });
        }

        info!(cart = %order.cart_id, lines = order.items.len(), "order handed off");

        Ok(())
    }
}
