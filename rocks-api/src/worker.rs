use rocks_booking::SyncOptions;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};

use crate::state::AppState;

/// Periodic occupancy sync plus stale-payment recovery. Returns `None` when
/// `sync_interval_seconds` is 0.
pub fn start_maintenance_worker(state: AppState) -> Option<JoinHandle<()>> {
    let every = state.business_rules.sync_interval_seconds;
    if every == 0 {
        info!("Maintenance worker disabled");
        return None;
    }
    let stale_after = Duration::from_secs(state.business_rules.stale_payment_seconds);
    let options = SyncOptions {
        prune: state.business_rules.sync_prune,
    };

    Some(tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(every));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; skip it so startup stays quiet.
        ticker.tick().await;
        info!(prune = options.prune, "Maintenance worker started, every {}s", every);

        loop {
            ticker.tick().await;

            match state.payments.recover_stale_payments(stale_after).await {
                Ok(report) if !report.errors.is_empty() => {
                    error!(errors = report.errors.len(), "Stale payment recovery had errors")
                }
                Ok(_) => {}
                Err(e) => error!("Stale payment recovery failed: {}", e),
            }

            match state.sync.run(options.clone()).await {
                Ok(report) if !report.errors.is_empty() => {
                    error!(errors = ?report.errors, "Occupancy sync finished with errors")
                }
                Ok(_) => {}
                Err(e) => error!("Occupancy sync failed: {}", e),
            }
        }
    }))
}
