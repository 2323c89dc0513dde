//! Retrying lookup client.

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::Arc,
};

use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use super::{LookupError, LookupPolicy, Transport};

/// GETs resources from one remote service under a [`LookupPolicy`].
#[derive(Clone)]
pub struct RemoteLookup {
    service: &'static str,
    base_url: String,
    transport: Arc<dyn Transport>,
    policy: LookupPolicy,
}

impl Debug for RemoteLookup {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("RemoteLookup")
            .field("service", &self.service)
            .field("base_url", &self.base_url)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl RemoteLookup {
    pub fn new(
        service: &'static str,
        base_url: impl Into<String>,
        transport: Arc<dyn Transport>,
        policy: LookupPolicy,
    ) -> Self {
        Self {
            service,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            transport,
            policy,
        }
    }

    pub fn service(&self) -> &'static str {
        self.service
    }

    /// Fetch `path` relative to the service base URL.
    ///
    /// Returns the body on a 2xx response and `None` on a non-retryable
    /// client error such as 404.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::Unavailable`] once every attempt has timed out,
    /// failed to connect or received a retryable status.
    pub async fn get(&self, path: &str) -> Result<Option<String>, LookupError> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut attempt = 0;

        loop {
            let failure = match timeout(self.policy.timeout, self.transport.get(&url)).await {
                Ok(Ok(response)) if response.is_success() => return Ok(Some(response.body)),
                Ok(Ok(response)) if !LookupPolicy::is_retryable_status(response.status) => {
                    debug!(service = self.service, %url, status = response.status, "not found");

                    return Ok(None);
                }
                Ok(Ok(response)) => format!("status {}", response.status),
                Ok(Err(error)) => error.to_string(),
                Err(elapsed) => elapsed.to_string(),
            };

            if attempt >= self.policy.max_retries {
                warn!(
                    service = self.service,
                    %url,
                    attempts = attempt + 1,
                    %failure,
                    "lookup retries exhausted"
                );

                return Err(LookupError::Unavailable {
                    service: self.service,
                    attempts: attempt + 1,
                });
            }

            let delay = self.policy.delay_for_attempt(attempt);

            debug!(
                service = self.service,
                %url,
                attempt,
                ?delay,
                %failure,
                "retrying lookup"
            );

            sleep(delay).await;

            attempt += 1;
        }
    }
}
