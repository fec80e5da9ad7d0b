//! Course booking saga steps.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use saga::{CompensationContext, SagaStep, StepContext, StepError, StepPolicy};
use serde_json::Value;

use crate::error::BookingError;
use crate::request::BookingState;
use crate::services::{BookingService, LockService, PaymentService};

/// Step id: take the course lock.
pub const STEP_ACQUIRE_LOCK: &str = "acquire-lock";

/// Step id: check the request against course capacity.
pub const STEP_VALIDATE: &str = "validate";

/// Step id: persist the booking.
pub const STEP_CREATE_BOOKING: &str = "create-booking";

/// Step id: charge the user.
pub const STEP_TAKE_PAYMENT: &str = "take-payment";

/// Step id: give the course lock back once everything succeeded.
pub const STEP_RELEASE_LOCK: &str = "release-lock";

/// Deadline for a single charge attempt.
pub const PAYMENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Takes an exclusive lock on the course for the rest of the saga.
pub struct AcquireLockStep {
    locks: Arc<dyn LockService>,
}

impl AcquireLockStep {
    pub fn new(locks: Arc<dyn LockService>) -> Self {
        Self { locks }
    }
}

#[async_trait]
impl SagaStep for AcquireLockStep {
    fn id(&self) -> &str {
        STEP_ACQUIRE_LOCK
    }

    fn name(&self) -> &str {
        "Acquire course lock"
    }

    async fn execute(&self, ctx: &StepContext) -> Result<Value, StepError> {
        let mut state = BookingState::decode(&ctx.input)?;
        let token = self.locks.acquire(&state.request.lock_resource()).await?;
        tracing::debug!(saga_id = %ctx.saga_id, %token, "course lock acquired");
        state.lock_token = Some(token);
        Ok(state.encode()?)
    }

    async fn compensate(&self, ctx: &CompensationContext) -> Result<(), StepError> {
        let state = BookingState::decode_result(ctx.result.as_ref())?;
        if let Some(token) = state.lock_token {
            self.locks.release(&token).await?;
        }
        Ok(())
    }
}

/// Rejects requests that cannot be satisfied. Read-only, so nothing to undo.
pub struct ValidateBookingStep {
    bookings: Arc<dyn BookingService>,
}

impl ValidateBookingStep {
    pub fn new(bookings: Arc<dyn BookingService>) -> Self {
        Self { bookings }
    }
}

#[async_trait]
impl SagaStep for ValidateBookingStep {
    fn id(&self) -> &str {
        STEP_VALIDATE
    }

    fn name(&self) -> &str {
        "Validate booking"
    }

    async fn execute(&self, ctx: &StepContext) -> Result<Value, StepError> {
        let state = BookingState::decode(&ctx.input)?;
        let request = &state.request;

        if request.seats == 0 {
            return Err(BookingError::InvalidRequest("at least one seat is required".into()).into());
        }
        if request.user_id.trim().is_empty() {
            return Err(BookingError::InvalidRequest("user id is empty".into()).into());
        }

        let available = self.bookings.available_seats(&request.course_id).await?;
        if available < request.seats {
            return Err(BookingError::InsufficientCapacity {
                requested: request.seats,
                available,
            }
            .into());
        }

        Ok(state.encode()?)
    }
}

/// Persists the booking and takes the seats.
pub struct CreateBookingStep {
    bookings: Arc<dyn BookingService>,
}

impl CreateBookingStep {
    pub fn new(bookings: Arc<dyn BookingService>) -> Self {
        Self { bookings }
    }
}

#[async_trait]
impl SagaStep for CreateBookingStep {
    fn id(&self) -> &str {
        STEP_CREATE_BOOKING
    }

    fn name(&self) -> &str {
        "Create booking"
    }

    async fn execute(&self, ctx: &StepContext) -> Result<Value, StepError> {
        let mut state = BookingState::decode(&ctx.input)?;
        let record = self.bookings.create(&state.request).await?;
        tracing::info!(saga_id = %ctx.saga_id, booking_id = %record.booking_id, "booking created");
        state.booking_id = Some(record.booking_id);
        Ok(state.encode()?)
    }

    async fn compensate(&self, ctx: &CompensationContext) -> Result<(), StepError> {
        let state = BookingState::decode_result(ctx.result.as_ref())?;
        if let Some(booking_id) = state.booking_id {
            self.bookings.cancel(&booking_id).await?;
        }
        Ok(())
    }
}

/// Charges the user. Declines are retried twice with backoff.
pub struct TakePaymentStep {
    payments: Arc<dyn PaymentService>,
    policy: StepPolicy,
}

impl TakePaymentStep {
    pub fn new(payments: Arc<dyn PaymentService>) -> Self {
        Self {
            payments,
            policy: StepPolicy::retrying(2).with_timeout(PAYMENT_TIMEOUT),
        }
    }

    pub fn with_policy(mut self, policy: StepPolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[async_trait]
impl SagaStep for TakePaymentStep {
    fn id(&self) -> &str {
        STEP_TAKE_PAYMENT
    }

    fn name(&self) -> &str {
        "Take payment"
    }

    fn policy(&self) -> StepPolicy {
        self.policy
    }

    async fn execute(&self, ctx: &StepContext) -> Result<Value, StepError> {
        let mut state = BookingState::decode(&ctx.input)?;
        let payment = self
            .payments
            .charge(&state.request.user_id, state.request.amount_cents)
            .await?;
        state.payment_id = Some(payment.payment_id);
        Ok(state.encode()?)
    }

    async fn compensate(&self, ctx: &CompensationContext) -> Result<(), StepError> {
        let state = BookingState::decode_result(ctx.result.as_ref())?;
        if let Some(payment_id) = state.payment_id {
            self.payments.refund(&payment_id).await?;
        }
        Ok(())
    }
}

/// Releases the course lock at the end of a successful booking.
pub struct ReleaseLockStep {
    locks: Arc<dyn LockService>,
}

impl ReleaseLockStep {
    pub fn new(locks: Arc<dyn LockService>) -> Self {
        Self { locks }
    }
}

#[async_trait]
impl SagaStep for ReleaseLockStep {
    fn id(&self) -> &str {
        STEP_RELEASE_LOCK
    }

    fn name(&self) -> &str {
        "Release course lock"
    }

    async fn execute(&self, ctx: &StepContext) -> Result<Value, StepError> {
        let mut state = BookingState::decode(&ctx.input)?;
        if let Some(token) = state.lock_token.take() {
            self.locks.release(&token).await?;
        }
        Ok(state.encode()?)
    }
}
