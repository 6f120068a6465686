//! Metrics for the batch repository.

/// Container for the metrics recorded by the batch repository.
#[derive(Debug, Clone)]
pub(crate) struct Metrics;

impl Metrics {
    /// Identifier for the counter of catch-up requests sent to peers.
    pub(crate) const CATCH_UP_REQUESTS_SENT_TOTAL: &'static str =
        "conclave_host_catch_up_requests_sent_total";
    /// Identifier for the counter of catch-up requests suppressed by an in-flight request.
    pub(crate) const CATCH_UP_REQUESTS_SUPPRESSED_TOTAL: &'static str =
        "conclave_host_catch_up_requests_suppressed_total";
    /// Identifier for the counter of catch-up requests that could not be sent.
    pub(crate) const CATCH_UP_REQUESTS_FAILED_TOTAL: &'static str =
        "conclave_host_catch_up_requests_failed_total";
    /// Identifier for the counter of batches served to peers.
    pub(crate) const BATCHES_SERVED_TOTAL: &'static str = "conclave_host_batches_served_total";
    /// Identifier for the counter of batches ingested from peers.
    pub(crate) const BATCHES_INGESTED_TOTAL: &'static str =
        "conclave_host_batches_ingested_total";

    /// Initializes metrics for the batch repository.
    ///
    /// This does two things:
    /// * Describes various metrics.
    /// * Initializes metrics to 0 so they can be queried immediately.
    pub(crate) fn init() {
        Self::describe();
        Self::zero();
    }

    fn describe() {
        metrics::describe_counter!(
            Self::CATCH_UP_REQUESTS_SENT_TOTAL,
            metrics::Unit::Count,
            "Total number of catch-up requests sent to peers",
        );
        metrics::describe_counter!(
            Self::CATCH_UP_REQUESTS_SUPPRESSED_TOTAL,
            metrics::Unit::Count,
            "Total number of catch-up requests skipped while another one was in flight",
        );
        metrics::describe_counter!(
            Self::CATCH_UP_REQUESTS_FAILED_TOTAL,
            metrics::Unit::Count,
            "Total number of catch-up requests that could not be sent",
        );
        metrics::describe_counter!(
            Self::BATCHES_SERVED_TOTAL,
            metrics::Unit::Count,
            "Total number of batches sent to peers in reply to catch-up requests",
        );
        metrics::describe_counter!(
            Self::BATCHES_INGESTED_TOTAL,
            metrics::Unit::Count,
            "Total number of new batches received from peers",
        );
    }

    fn zero() {
        metrics::counter!(Self::CATCH_UP_REQUESTS_SENT_TOTAL).increment(0);
        metrics::counter!(Self::CATCH_UP_REQUESTS_SUPPRESSED_TOTAL).increment(0);
        metrics::counter!(Self::CATCH_UP_REQUESTS_FAILED_TOTAL).increment(0);
        metrics::counter!(Self::BATCHES_SERVED_TOTAL).increment(0);
        metrics::counter!(Self::BATCHES_INGESTED_TOTAL, "live" => "true").increment(0);
        metrics::counter!(Self::BATCHES_INGESTED_TOTAL, "live" => "false").increment(0);
    }

    pub(crate) fn record_batches_ingested(count: u64, is_live: bool) {
        metrics::counter!(
            Self::BATCHES_INGESTED_TOTAL,
            "live" => if is_live { "true" } else { "false" },
        )
        .increment(count);
    }
}
