//! PollLoop - poll cycle を定期的に回すバックグラウンドタスク
//!
//! - `shutdown_tx` に true を送るとループが止まる（実行中の cycle は最後まで走る）
//! - 間隔は cycle ごとに settings から読み直す
//! - tick を取りこぼしても害はない（次の cycle が続きから拾う）

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::app::poller::PollOrchestrator;
use crate::ports::SettingsSource;

/// Interval used while settings cannot be read.
const FALLBACK_INTERVAL: Duration = Duration::from_secs(7 * 60);

/// Handle to the running loop.
pub struct PollLoop {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl PollLoop {
    pub fn spawn(poller: Arc<PollOrchestrator>, settings: Arc<dyn SettingsSource>) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(async move {
            run(poller, settings, &mut shutdown_rx).await;
        });
        Self { shutdown_tx, join }
    }

    /// Ask the loop to stop after the current cycle.
    pub fn request_shutdown(&self) {
        // receiver may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        if let Err(err) = self.join.await {
            error!(error = %err, "poll loop task failed");
        }
    }
}

async fn run(
    poller: Arc<PollOrchestrator>,
    settings: Arc<dyn SettingsSource>,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    info!("poll loop started");
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        if let Err(err) = poller.run_cycle().await {
            error!(error = %err, "poll cycle failed");
        }

        let interval = match settings.load().await {
            Ok(settings) => settings.poll_interval(),
            Err(err) => {
                warn!(error = %err, "settings unavailable, using fallback interval");
                FALLBACK_INTERVAL
            }
        };

        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }
    info!("poll loop stopped");
}
