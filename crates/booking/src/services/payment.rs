//! Payment service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::{BookingError, Result};

/// Result of a successful payment charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentResult {
    /// The payment ID assigned by the payment service.
    pub payment_id: String,
}

/// Trait for payment processing operations.
#[async_trait]
pub trait PaymentService: Send + Sync {
    /// Charges a user for a booking.
    async fn charge(&self, user_id: &str, amount_cents: u64) -> Result<PaymentResult>;

    /// Refunds a previously made payment.
    async fn refund(&self, payment_id: &str) -> Result<()>;
}

#[derive(Debug, Default)]
struct InMemoryPaymentState {
    payments: HashMap<String, (String, u64)>,
    next_id: u32,
    /// Number of upcoming charge calls that will be declined.
    declines_remaining: u32,
    fail_on_refund: bool,
    charge_attempts: u32,
}

/// In-memory payment service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentService {
    state: Arc<RwLock<InMemoryPaymentState>>,
}

impl InMemoryPaymentService {
    /// Creates a new in-memory payment service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the service to decline every charge call.
    pub fn set_fail_on_charge(&self, fail: bool) {
        self.state.write().unwrap().declines_remaining = if fail { u32::MAX } else { 0 };
    }

    /// Configures the service to decline the next `count` charge calls.
    pub fn decline_next(&self, count: u32) {
        self.state.write().unwrap().declines_remaining = count;
    }

    /// Configures the service to fail on refund calls.
    pub fn set_fail_on_refund(&self, fail: bool) {
        self.state.write().unwrap().fail_on_refund = fail;
    }

    /// Returns the number of active payments.
    pub fn payment_count(&self) -> usize {
        self.state.read().unwrap().payments.len()
    }

    /// Returns how many charge calls were made, successful or not.
    pub fn charge_attempts(&self) -> u32 {
        self.state.read().unwrap().charge_attempts
    }

    /// Returns true if a payment exists with the given ID.
    pub fn has_payment(&self, payment_id: &str) -> bool {
        self.state.read().unwrap().payments.contains_key(payment_id)
    }
}

#[async_trait]
impl PaymentService for InMemoryPaymentService {
    async fn charge(&self, user_id: &str, amount_cents: u64) -> Result<PaymentResult> {
        let mut state = self.state.write().unwrap();
        state.charge_attempts += 1;

        if state.declines_remaining > 0 {
            state.declines_remaining -= 1;
            return Err(BookingError::PaymentDeclined(format!(
                "card for {user_id} was declined"
            )));
        }

        state.next_id += 1;
        let payment_id = format!("PAY-{:04}", state.next_id);
        state
            .payments
            .insert(payment_id.clone(), (user_id.to_string(), amount_cents));

        Ok(PaymentResult { payment_id })
    }

    async fn refund(&self, payment_id: &str) -> Result<()> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_refund {
            return Err(BookingError::RefundFailed(format!(
                "{payment_id} was already settled"
            )));
        }
        state.payments.remove(payment_id);
        Ok(())
    }
}
