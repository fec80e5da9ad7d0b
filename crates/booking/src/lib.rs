//! Course booking saga built on the `saga` orchestration engine.
//!
//! Books seats on a course under an exclusive lock, then charges the user.
//! If payment fails the booking is cancelled and the lock released.

pub mod config;
pub mod course_booking;
pub mod error;
pub mod request;
pub mod services;
pub mod steps;

pub use config::DemoConfig;
pub use course_booking::{BookingServices, SAGA_NAME, course_booking_saga};
pub use error::{BookingError, Result};
pub use request::{BookingRequest, BookingState};
