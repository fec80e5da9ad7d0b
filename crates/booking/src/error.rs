//! Booking collaborator errors.

use saga::StepError;
use thiserror::Error;

/// Errors raised by the booking, lock and payment services.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BookingError {
    /// Another saga holds the lock on this resource.
    #[error("Resource is locked: {0}")]
    LockHeld(String),

    /// The lock token is unknown or already released.
    #[error("Unknown lock token: {0}")]
    UnknownLock(String),

    /// Course does not exist.
    #[error("Course not found: {0}")]
    CourseNotFound(String),

    /// Not enough seats left on the course.
    #[error("Insufficient capacity: requested {requested}, available {available}")]
    InsufficientCapacity { requested: u32, available: u32 },

    /// The booking request itself is malformed.
    #[error("Invalid booking request: {0}")]
    InvalidRequest(String),

    /// Booking not found.
    #[error("Booking not found: {0}")]
    BookingNotFound(String),

    /// The payment provider refused the charge.
    #[error("Payment declined: {0}")]
    PaymentDeclined(String),

    /// The payment provider refused the refund.
    #[error("Refund failed: {0}")]
    RefundFailed(String),

    /// Step context could not be decoded or encoded.
    #[error("Invalid saga context: {0}")]
    Context(String),
}

impl From<BookingError> for StepError {
    fn from(err: BookingError) -> Self {
        StepError::execution(err.to_string())
    }
}

impl From<serde_json::Error> for BookingError {
    fn from(err: serde_json::Error) -> Self {
        BookingError::Context(err.to_string())
    }
}

/// Convenience type alias for booking results.
pub type Result<T> = std::result::Result<T, BookingError>;
