//! Maps each collaborator crate's error enum onto [`common::AppError`] at
//! the HTTP edge. Plain functions rather than `From` impls: both types are
//! foreign to this crate, so the orphan rule rules out a trait impl here.

use common::AppError;
use reservations::{PaymentError, ReservationError};
use sync_engine::SyncError;

pub fn reservation_error(err: ReservationError) -> AppError {
    match err {
        ReservationError::NotFound(id) => AppError::NotFound(format!("booking {id}")),
        ReservationError::DatesUnavailable => AppError::Conflict("requested dates are no longer available".into()),
        ReservationError::InvalidTransition(id, from, to) => {
            AppError::Conflict(format!("booking {id} is {from}, cannot transition to {to}"))
        }
        ReservationError::LockContention => {
            AppError::LockContention("could not acquire the calendar lock in time".into())
        }
        ReservationError::Payment(e) => payment_error(e),
        ReservationError::Lock(e) => AppError::Internal(e.to_string()),
        ReservationError::Database(e) => AppError::Database(e.to_string()),
    }
}

fn payment_error(err: PaymentError) -> AppError {
    match err {
        PaymentError::Declined(message) => AppError::UnprocessableEntity(message),
        PaymentError::Request(message) | PaymentError::MalformedResponse(message) => {
            AppError::ExternalService(message)
        }
        PaymentError::NotSucceeded(payment_intent_id) => {
            AppError::UnprocessableEntity(format!("payment intent {payment_intent_id} has not succeeded"))
        }
    }
}

pub fn sync_error(err: SyncError) -> AppError {
    match err {
        SyncError::Adapter(e) => AppError::ExternalService(e.to_string()),
        SyncError::RateLimit(_) => AppError::RateLimitExceeded,
        SyncError::CircuitOpen(channel) => AppError::CircuitOpen(channel),
        SyncError::Database(e) => AppError::Database(e.to_string()),
        SyncError::Redis(e) => AppError::Internal(e.to_string()),
        SyncError::ConnectionNotFound(id) => AppError::NotFound(format!("connection {id}")),
        SyncError::RetriesExhausted(attempts, message) => {
            AppError::ExternalService(format!("gave up after {attempts} attempts: {message}"))
        }
        SyncError::MalformedEvent(message) => AppError::BadRequest(message),
    }
}
