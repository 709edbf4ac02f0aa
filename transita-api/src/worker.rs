use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info, warn};

use transita_booking::ExpirySweeper;

/// Runs the expiry sweep on a fixed interval. A failed run is logged and the
/// next tick tries again; if the task itself is down that is an operational
/// alarm, not a data-integrity problem, since the deadline is enforced at the
/// next successful sweep.
pub async fn start_expiry_worker(sweeper: Arc<ExpirySweeper>, interval_seconds: u64) {
    let mut ticker = interval(Duration::from_secs(interval_seconds));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(interval_seconds, "expiry worker started");

    loop {
        ticker.tick().await;
        match sweeper.sweep_now().await {
            Ok(report) => {
                if report.failed > 0 {
                    warn!(
                        failed = report.failed,
                        cancelled = report.cancelled,
                        "sweep finished with failures"
                    );
                }
            }
            Err(e) => error!(error = %e, "expiry sweep run failed"),
        }
    }
}
