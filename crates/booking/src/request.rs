//! Booking request and the context threaded through the booking saga.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BookingError, Result};

/// A request to book seats on a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub course_id: String,
    pub user_id: String,
    pub seats: u32,
    /// Total price in cents.
    pub amount_cents: u64,
}

impl BookingRequest {
    pub fn new(
        course_id: impl Into<String>,
        user_id: impl Into<String>,
        seats: u32,
        amount_cents: u64,
    ) -> Self {
        Self {
            course_id: course_id.into(),
            user_id: user_id.into(),
            seats,
            amount_cents,
        }
    }

    /// The lock resource guarding this request's course.
    pub fn lock_resource(&self) -> String {
        format!("course:{}", self.course_id)
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Saga context: the request plus whatever each step has produced so far.
///
/// The saga input is a bare [`BookingRequest`]; every step decodes the
/// previous step's result into this type and returns an extended copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingState {
    #[serde(flatten)]
    pub request: BookingRequest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
}

impl BookingState {
    pub fn decode(value: &Value) -> Result<Self> {
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Decodes an optional step result, failing when the step never produced one.
    pub fn decode_result(value: Option<&Value>) -> Result<Self> {
        value
            .map(Self::decode)
            .unwrap_or_else(|| Err(BookingError::Context("missing step result".to_string())))
    }

    pub fn encode(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_state_decodes_from_bare_request() {
        let request = BookingRequest::new("rust-101", "user-1", 2, 9000);
        let state = BookingState::decode(&request.to_value().unwrap()).unwrap();

        assert_eq!(state.request, request);
        assert!(state.lock_token.is_none());
        assert!(state.booking_id.is_none());
        assert!(state.payment_id.is_none());
    }

    #[test]
    fn test_encode_flattens_request_and_skips_empty_fields() {
        let mut state =
            BookingState::decode(&json!({"course_id": "c", "user_id": "u", "seats": 1, "amount_cents": 10}))
                .unwrap();
        state.booking_id = Some("BKG-0001".to_string());

        let value = state.encode().unwrap();
        assert_eq!(value["course_id"], "c");
        assert_eq!(value["booking_id"], "BKG-0001");
        assert!(value.get("payment_id").is_none());
    }

    #[test]
    fn test_decode_rejects_malformed_context() {
        assert!(matches!(
            BookingState::decode(&json!({"course_id": 7})),
            Err(BookingError::Context(_))
        ));
        assert!(matches!(
            BookingState::decode_result(None),
            Err(BookingError::Context(_))
        ));
    }

    #[test]
    fn test_lock_resource() {
        let request = BookingRequest::new("rust-101", "user-1", 1, 100);
        assert_eq!(request.lock_resource(), "course:rust-101");
    }
}
