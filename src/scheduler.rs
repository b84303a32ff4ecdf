// src/scheduler.rs
use chrono::{Duration as ChronoDuration, Local};
use std::future::Future;
use tokio::time::{sleep, Duration};
use tracing::info;

/// Invoke `run` every `interval`, optionally once right away.
///
/// Nothing is carried from one run to the next; each call builds its own
/// state. Never returns; callers race it against a shutdown signal.
pub async fn run_every<F, Fut>(interval: Duration, run_now: bool, mut run: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    info!("Starting scheduler with {} minute interval", interval.as_secs() / 60);

    if run_now {
        info!("Running initial execution");
        run().await;
    }

    loop {
        match ChronoDuration::from_std(interval)
            .ok()
            .and_then(|d| Local::now().checked_add_signed(d))
        {
            Some(next) => info!("Next execution scheduled at: {}", next.format("%Y-%m-%d %H:%M:%S")),
            None => info!("Next execution in {:?}", interval),
        }

        sleep(interval).await;
        run().await;
    }
}
