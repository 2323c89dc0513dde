//! Lookup errors.

use std::error::Error as StdError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed")]
    Request(#[source] Box<dyn StdError + Send + Sync>),
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        Self::Request(Box::new(error))
    }
}

#[derive(Debug, Error)]
pub enum LookupError {
    /// Timeouts, connection failures or retryable statuses outlasted the retry budget.
    #[error("{service} service unavailable after {attempts} attempts")]
    Unavailable { service: &'static str, attempts: u32 },

    #[error("{service} service returned an unreadable response")]
    InvalidResponse {
        service: &'static str,

        #[source]
        error: serde_json::Error,
    },
}

impl LookupError {
    /// Name of the service that failed.
    pub fn service(&self) -> &'static str {
        match self {
            Self::Unavailable { service, .. } | Self::InvalidResponse { service, .. } => service,
        }
    }
}
