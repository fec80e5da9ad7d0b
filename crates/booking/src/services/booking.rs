//! Booking service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::{BookingError, Result};
use crate::request::BookingRequest;

/// A confirmed booking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRecord {
    pub booking_id: String,
    pub course_id: String,
    pub user_id: String,
    pub seats: u32,
}

/// Trait for course capacity and booking persistence.
#[async_trait]
pub trait BookingService: Send + Sync {
    /// Returns the number of seats still available on a course.
    async fn available_seats(&self, course_id: &str) -> Result<u32>;

    /// Creates a booking and takes the requested seats.
    async fn create(&self, request: &BookingRequest) -> Result<BookingRecord>;

    /// Cancels a booking and frees its seats.
    async fn cancel(&self, booking_id: &str) -> Result<()>;
}

#[derive(Debug, Default)]
struct InMemoryBookingState {
    capacity: HashMap<String, u32>,
    bookings: HashMap<String, BookingRecord>,
    next_id: u32,
    fail_on_create: bool,
}

/// In-memory booking service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBookingService {
    state: Arc<RwLock<InMemoryBookingState>>,
}

impl InMemoryBookingService {
    /// Creates a new in-memory booking service with no courses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a course with the given number of seats.
    pub fn add_course(&self, course_id: impl Into<String>, seats: u32) {
        self.state
            .write()
            .unwrap()
            .capacity
            .insert(course_id.into(), seats);
    }

    /// Configures the service to fail on create calls.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.state.write().unwrap().fail_on_create = fail;
    }

    /// Returns the number of active bookings.
    pub fn booking_count(&self) -> usize {
        self.state.read().unwrap().bookings.len()
    }

    /// Returns the booking with the given ID.
    pub fn booking(&self, booking_id: &str) -> Option<BookingRecord> {
        self.state.read().unwrap().bookings.get(booking_id).cloned()
    }
}

#[async_trait]
impl BookingService for InMemoryBookingService {
    async fn available_seats(&self, course_id: &str) -> Result<u32> {
        self.state
            .read()
            .unwrap()
            .capacity
            .get(course_id)
            .copied()
            .ok_or_else(|| BookingError::CourseNotFound(course_id.to_string()))
    }

    async fn create(&self, request: &BookingRequest) -> Result<BookingRecord> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_create {
            return Err(BookingError::InvalidRequest(
                "booking store rejected the write".to_string(),
            ));
        }

        let available = state
            .capacity
            .get(&request.course_id)
            .copied()
            .ok_or_else(|| BookingError::CourseNotFound(request.course_id.clone()))?;
        if available < request.seats {
            return Err(BookingError::InsufficientCapacity {
                requested: request.seats,
                available,
            });
        }

        state
            .capacity
            .insert(request.course_id.clone(), available - request.seats);
        state.next_id += 1;
        let record = BookingRecord {
            booking_id: format!("BKG-{:04}", state.next_id),
            course_id: request.course_id.clone(),
            user_id: request.user_id.clone(),
            seats: request.seats,
        };
        state
            .bookings
            .insert(record.booking_id.clone(), record.clone());

        Ok(record)
    }

    async fn cancel(&self, booking_id: &str) -> Result<()> {
        let mut state = self.state.write().unwrap();
        let record = state
            .bookings
            .remove(booking_id)
            .ok_or_else(|| BookingError::BookingNotFound(booking_id.to_string()))?;
        *state.capacity.entry(record.course_id).or_default() += record.seats;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(seats: u32) -> BookingRequest {
        BookingRequest::new("rust-101", "user-1", seats, 5000)
    }

    #[tokio::test]
    async fn test_create_and_cancel_restores_capacity() {
        let service = InMemoryBookingService::new();
        service.add_course("rust-101", 10);

        let record = service.create(&request(3)).await.unwrap();
        assert_eq!(record.booking_id, "BKG-0001");
        assert_eq!(service.available_seats("rust-101").await.unwrap(), 7);
        assert_eq!(service.booking_count(), 1);

        service.cancel(&record.booking_id).await.unwrap();
        assert_eq!(service.available_seats("rust-101").await.unwrap(), 10);
        assert!(service.booking(&record.booking_id).is_none());
    }

    #[tokio::test]
    async fn test_insufficient_capacity() {
        let service = InMemoryBookingService::new();
        service.add_course("rust-101", 2);

        let result = service.create(&request(3)).await;
        assert_eq!(
            result,
            Err(BookingError::InsufficientCapacity {
                requested: 3,
                available: 2
            })
        );
    }

    #[tokio::test]
    async fn test_unknown_course() {
        let service = InMemoryBookingService::new();
        assert!(matches!(
            service.available_seats("nope").await,
            Err(BookingError::CourseNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_fail_on_create() {
        let service = InMemoryBookingService::new();
        service.add_course("rust-101", 10);
        service.set_fail_on_create(true);
        assert!(service.create(&request(1)).await.is_err());
        assert_eq!(service.booking_count(), 0);
    }
}
