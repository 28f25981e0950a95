// ── Daily reconnect ──
//
// Gateways drop long-lived sessions after a while without telling anyone.
// A background task refreshes the connection once a day at a fixed local
// hour. Failures are logged and retried at the next slot.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDateTime, TimeDelta, TimeZone};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::connection::Connection;

/// Next occurrence of `hour:00:00` strictly after `now`, in `now`'s zone.
///
/// Returns `None` only for an hour outside 0-23.
pub fn next_run<Tz: TimeZone>(now: &DateTime<Tz>, hour: u32) -> Option<DateTime<Tz>> {
    let mut candidate = now.date_naive().and_hms_opt(hour, 0, 0)?;
    if candidate <= now.naive_local() {
        candidate += TimeDelta::days(1);
    }
    resolve_local(&now.timezone(), candidate)
}

// A wall-clock time skipped by a DST jump resolves to the first valid
// instant after it.
fn resolve_local<Tz: TimeZone>(tz: &Tz, local: NaiveDateTime) -> Option<DateTime<Tz>> {
    (0..3).find_map(|shift| {
        tz.from_local_datetime(&(local + TimeDelta::hours(shift)))
            .earliest()
    })
}

/// Handle on the daily reconnect task. Dropping it stops the task.
#[derive(Debug)]
pub struct DailyReconnect {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl DailyReconnect {
    /// Refresh `connection` every day at local `hour`.
    pub fn spawn(connection: Arc<Connection>, hour: u32) -> Self {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(reconnect_task(connection, hour, cancel.clone()));
        Self { cancel, task }
    }

    /// Stop the task and wait for it to finish. Returns `false` if the
    /// task had panicked or was aborted.
    pub async fn shutdown(mut self) -> bool {
        self.cancel.cancel();
        match (&mut self.task).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "daily reconnect task failed");
                false
            }
        }
    }
}

impl Drop for DailyReconnect {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn reconnect_task(connection: Arc<Connection>, hour: u32, cancel: CancellationToken) {
    loop {
        let now = Local::now();
        let Some(next) = next_run(&now, hour) else {
            warn!(hour, "invalid reconnect hour, schedule disabled");
            return;
        };
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        debug!(next = %next, "next scheduled reconnect");

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(wait) => {
                match connection.refresh().await {
                    Ok(()) => info!("scheduled reconnect complete"),
                    Err(e) => warn!(error = %e, "scheduled reconnect failed"),
                }
            }
        }
    }
    debug!("daily reconnect stopped");
}
