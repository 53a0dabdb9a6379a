//! User directory backends.
pub mod firestore;

use crate::credentials::CredentialsError;
use thiserror::Error;

pub use crate::core::UserDirectory;
pub use firestore::FirestoreDirectory;

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("user directory credentials unavailable: {0}")]
    Credentials(#[from] CredentialsError),

    #[error("user directory request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("user directory returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("user directory response could not be decoded: {0}")]
    Decode(String),
}
