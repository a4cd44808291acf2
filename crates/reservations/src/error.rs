//! Reservation flow error taxonomy, mapped onto the HTTP responses clients
//! of the booking API actually see.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReservationError {
    #[error("booking {0} not found")]
    NotFound(uuid::Uuid),

    #[error("requested dates are no longer available")]
    DatesUnavailable,

    #[error("booking {0} is in status {1} and cannot be {2}")]
    InvalidTransition(uuid::Uuid, String, &'static str),

    #[error("could not acquire a lock for this property and date range")]
    LockContention,

    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error(transparent)]
    Lock(#[from] channels::LockError),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("payment processor declined the charge: {0}")]
    Declined(String),

    #[error("payment processor request failed: {0}")]
    Request(String),

    #[error("payment processor returned an unparseable response: {0}")]
    MalformedResponse(String),

    #[error("payment intent {0} has not succeeded at the processor")]
    NotSucceeded(String),
}
