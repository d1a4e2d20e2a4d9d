//! Periodic cycle runner: an interval ticker drives cycles until Ctrl-C or
//! the cycle limit. Cycles run on the blocking pool since they hold the
//! SQLite connection for their whole duration.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::{Engine, print_cycle, run_and_record};

pub async fn run(engine: Arc<Engine>, interval_ms: u64, limit: Option<u64>) -> Result<()> {
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received, stopping after the current cycle");
                shutdown.cancel();
            }
        });
    }

    let completed = run_until(engine, interval_ms, limit, shutdown).await?;
    println!("stopped after {completed} cycles");
    Ok(())
}

/// Tick until `shutdown` fires or `limit` cycles have completed. Returns
/// the number of completed cycles. A failed cycle stops the runner.
pub async fn run_until(
    engine: Arc<Engine>,
    interval_ms: u64,
    limit: Option<u64>,
    shutdown: CancellationToken,
) -> Result<u64> {
    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut completed = 0u64;
    while limit.is_none_or(|k| completed < k) {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let task_engine = Arc::clone(&engine);
        let stats = tokio::task::spawn_blocking(move || run_and_record(&task_engine))
            .await
            .context("cycle task panicked")??;
        print_cycle(&stats);
        completed += 1;
    }

    tracing::info!(completed, "runner stopped");
    Ok(completed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use swm_core::{CognitiveCycle, EngineConfig, Geoid};
    use swm_store::Store;

    fn engine() -> Arc<Engine> {
        let store = Store::open_in_memory().unwrap();
        let engine = CognitiveCycle::from_config(&EngineConfig::default(), store).unwrap();
        engine
            .ingest(Geoid::new("a").with_semantic([("x", 1.0)]))
            .unwrap();
        Arc::new(engine)
    }

    #[tokio::test]
    async fn test_run_until_limit() {
        let engine = engine();
        let completed = run_until(Arc::clone(&engine), 1, Some(3), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(completed, 3);
        assert_eq!(engine.cycle_count(), 3);
        let journaled = engine.with_backend(|store, _| store.cycle_count().unwrap());
        assert_eq!(journaled, 3);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_tick() {
        let engine = engine();
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let completed = run_until(Arc::clone(&engine), 60_000, None, shutdown)
            .await
            .unwrap();
        assert_eq!(completed, 0);
        assert_eq!(engine.cycle_count(), 0);
    }
}
