//! External service traits and in-memory implementations for booking steps.

pub mod booking;
pub mod lock;
pub mod payment;

pub use booking::{BookingRecord, BookingService, InMemoryBookingService};
pub use lock::{InMemoryLockService, LockService};
pub use payment::{InMemoryPaymentService, PaymentResult, PaymentService};
