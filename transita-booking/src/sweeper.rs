use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use transita_core::{BookingError, BookingStore};
use transita_ledger::SeatLedger;

/// Outcome of one sweep run.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SweepReport {
    pub examined: usize,
    pub cancelled: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Cancels bookings whose payment window has elapsed and frees their seats.
///
/// Holds expire lazily on the read path; booking expiry is active because the
/// cancellation has side effects (seat release, audit trail) worth a formal,
/// logged sweep. The cancellation write re-checks `payment_status = PENDING`,
/// so a booking paid between candidate selection and the write is skipped,
/// not cancelled.
pub struct ExpirySweeper {
    bookings: Arc<dyn BookingStore>,
    ledger: Arc<SeatLedger>,
    payment_deadline: Duration,
}

impl ExpirySweeper {
    pub fn new(
        bookings: Arc<dyn BookingStore>,
        ledger: Arc<SeatLedger>,
        payment_deadline: Duration,
    ) -> Self {
        Self {
            bookings,
            ledger,
            payment_deadline,
        }
    }

    /// One batch run against the clock value `now`. Individual booking
    /// failures are logged and counted, never fatal to the batch.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, BookingError> {
        let cutoff = now - self.payment_deadline;
        let candidates = self.bookings.find_expired_pending(cutoff).await?;

        let mut report = SweepReport {
            examined: candidates.len(),
            ..Default::default()
        };

        for candidate in candidates {
            match self
                .bookings
                .cancel_if_payment_pending(&candidate.booking_ref)
                .await
            {
                Ok(Some(cancelled)) => {
                    // Same release path as an explicit cancellation.
                    if let Err(e) = self
                        .ledger
                        .release_seats(
                            cancelled.bus_id,
                            cancelled.schedule_id,
                            &cancelled.seat_numbers,
                        )
                        .await
                    {
                        error!(
                            booking_ref = %cancelled.booking_ref, error = %e,
                            "expired booking cancelled but seat release failed"
                        );
                        report.failed += 1;
                        continue;
                    }
                    info!(
                        booking_ref = %cancelled.booking_ref,
                        seats = ?cancelled.seat_numbers,
                        "expired booking cancelled"
                    );
                    report.cancelled += 1;
                }
                Ok(None) => {
                    // Paid or cancelled since the candidate query.
                    report.skipped += 1;
                }
                Err(e) => {
                    warn!(
                        booking_ref = %candidate.booking_ref, error = %e,
                        "failed to cancel expired booking"
                    );
                    report.failed += 1;
                }
            }
        }

        info!(
            examined = report.examined,
            cancelled = report.cancelled,
            skipped = report.skipped,
            failed = report.failed,
            "expiry sweep finished"
        );
        Ok(report)
    }

    pub async fn sweep_now(&self) -> Result<SweepReport, BookingError> {
        self.sweep(Utc::now()).await
    }
}
