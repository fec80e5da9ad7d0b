//! Runs one course booking through the saga orchestrator and prints the outcome.

use std::sync::Arc;

use booking::services::{InMemoryBookingService, InMemoryLockService, InMemoryPaymentService};
use booking::{BookingRequest, BookingServices, DemoConfig, course_booking_saga};
use common::Metadata;
use saga::{PrometheusMetricsSink, SagaOrchestrator};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEMO_COURSE: &str = "rust-101";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = DemoConfig::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    // 3. Wire collaborators
    let bookings = InMemoryBookingService::new();
    bookings.add_course(DEMO_COURSE, config.course_seats);
    let payments = InMemoryPaymentService::new();
    payments.set_fail_on_charge(config.fail_payment);
    let services = BookingServices {
        locks: Arc::new(InMemoryLockService::new()),
        bookings: Arc::new(bookings),
        payments: Arc::new(payments),
    };

    let orchestrator = SagaOrchestrator::new(config.orchestrator.clone())
        .with_metrics_sink(Arc::new(PrometheusMetricsSink));

    // 4. Run the saga
    let request = BookingRequest::new(DEMO_COURSE, "demo-user", 2, 9_800);
    let mut metadata = Metadata::new();
    metadata.insert("source".to_string(), serde_json::json!("booking-demo"));

    let definition = course_booking_saga(&services);
    let saga = orchestrator
        .run_definition(&definition, request.to_value()?, metadata)
        .await?;
    tracing::info!(saga_id = %saga.id(), status = %saga.status(), "booking saga finished");

    // 5. Report
    let logs = orchestrator.get_saga_logs(saga.id()).await;
    let report = serde_json::json!({ "saga": saga, "logs": logs });
    println!("{}", serde_json::to_string_pretty(&report)?);
    println!("{}", metrics_handle.render());

    Ok(())
}
