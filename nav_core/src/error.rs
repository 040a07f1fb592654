//! Error types for configuration-time failures.
//!
//! Runtime paths (prediction, updates, association) never fail: bad inputs are
//! dropped with a diagnostic instead.

use crate::types::BeaconId;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NavError {
    #[error("duplicate beacon id {0}")]
    DuplicateBeaconId(BeaconId),

    #[error("invalid beacon {id}: {reason}")]
    InvalidBeacon { id: BeaconId, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, NavError>;
