use std::time::Duration;

use tokio::sync::broadcast;

use crate::catalog::Catalog;

/// Periodic compaction and statistics refresh: `PRAGMA
/// optimize` to let SQLite refresh its query planner statistics, plus
/// reaping of stale terminal-state download sessions. Modeled on the
/// teacher's background-task-with-explicit-shutdown idiom — a
/// `broadcast::Sender` whose `Drop` implementation is the shutdown signal,
/// the same pattern `letung3105-opal`'s `Bitcask`/`Shutdown` pair uses —
/// rather than a detached daemon thread.
pub struct Maintenance {
    _notify_shutdown: broadcast::Sender<()>,
    handle: tokio::task::JoinHandle<()>,
}

impl Maintenance {
    /// Spawns the periodic task. Each tick's work is bounded to a single
    /// pass over `PRAGMA optimize` plus one `reap_sessions` call, so a tick
    /// never holds a write transaction open for more than the time those
    /// two statements take — comfortably inside the "a few hundred
    /// milliseconds" ceiling sets.
    pub fn spawn(catalog: Catalog, interval: Duration, session_retention: Duration) -> Self {
        let (notify_shutdown, mut shutdown_rx) = broadcast::channel(1);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = run_once(&catalog, session_retention).await {
                            tracing::warn!(error = %e, "catalog maintenance tick failed");
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::debug!("catalog maintenance task shutting down");
                        break;
                    }
                }
            }
        });

        Self { _notify_shutdown: notify_shutdown, handle }
    }

    /// Signals the task to stop and waits for it to finish its current tick.
    pub async fn shutdown(self) {
        drop(self._notify_shutdown);
        let _ = self.handle.await;
    }
}

async fn run_once(catalog: &Catalog, session_retention: Duration) -> sv_core::Result<()> {
    sqlx::query("PRAGMA optimize")
        .execute(catalog.pool())
        .await
        .map_err(crate::error::from_sqlx)?;
    catalog.reap_sessions(session_retention).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn maintenance_task_runs_and_shuts_down_cleanly() {
        let catalog = Catalog::open_in_memory().await.unwrap();
        let maintenance = Maintenance::spawn(catalog, Duration::from_millis(10), Duration::from_secs(3600));
        tokio::time::sleep(Duration::from_millis(35)).await;
        maintenance.shutdown().await;
    }
}
