//! Push gateway backends.
pub mod fcm;

use crate::credentials::CredentialsError;
use thiserror::Error;

pub use crate::core::PushGateway;
pub use fcm::FcmGateway;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("batch of {size} messages exceeds the gateway limit of {max}")]
    BatchTooLarge { size: usize, max: usize },

    #[error("push gateway credentials unavailable: {0}")]
    Credentials(#[from] CredentialsError),

    #[error("push gateway rejected credentials ({status}): {body}")]
    Unauthorized { status: u16, body: String },

    #[error("push gateway request failed: {0}")]
    Transport(#[from] reqwest::Error),
}
