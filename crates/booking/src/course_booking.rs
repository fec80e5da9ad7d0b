//! The course booking saga definition.

use std::sync::Arc;

use saga::SagaDefinition;

use crate::services::{BookingService, LockService, PaymentService};
use crate::steps::{
    AcquireLockStep, CreateBookingStep, ReleaseLockStep, TakePaymentStep, ValidateBookingStep,
};

/// The saga name used for course bookings.
pub const SAGA_NAME: &str = "course-booking";

/// Collaborators the booking steps call into.
#[derive(Clone)]
pub struct BookingServices {
    pub locks: Arc<dyn LockService>,
    pub bookings: Arc<dyn BookingService>,
    pub payments: Arc<dyn PaymentService>,
}

/// Builds the course booking saga:
/// lock, validate, create booking, take payment, release lock.
///
/// A failed payment cancels the booking and releases the lock.
pub fn course_booking_saga(services: &BookingServices) -> SagaDefinition {
    SagaDefinition::new(SAGA_NAME)
        .step(AcquireLockStep::new(services.locks.clone()))
        .step(ValidateBookingStep::new(services.bookings.clone()))
        .step(CreateBookingStep::new(services.bookings.clone()))
        .step(TakePaymentStep::new(services.payments.clone()))
        .step(ReleaseLockStep::new(services.locks.clone()))
}
