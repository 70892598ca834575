//! Owner of the two periodic engine tasks.
//!
//! - **Sweep**: runs immediately on start and then every `sweep_interval`.
//! - **Daily reset**: first fires at the next local midnight, then every 24 hours.
//!
//! Each task awaits its own run before waiting for the next tick, so a task
//! never overlaps itself; both take the rule store lock for their whole cycle,
//! so they never overlap event handlers either.

use crate::libs::clock::until_next_local_midnight;
use crate::libs::reset::DailyReset;
use crate::libs::sweep::Sweeper;
use chrono::Local;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

const ONE_DAY: Duration = Duration::from_secs(24 * 60 * 60);

pub struct Scheduler {
    sweeper: Arc<Sweeper>,
    reset: Arc<DailyReset>,
    sweep_interval: Duration,
    tasks: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(sweeper: Arc<Sweeper>, reset: Arc<DailyReset>, sweep_interval: Duration) -> Self {
        Self {
            sweeper,
            reset,
            sweep_interval,
            tasks: Vec::new(),
        }
    }

    /// Spawns the sweep and reset tasks. Calling `start` on a running
    /// scheduler does nothing.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }
        self.tasks.clear();

        let sweeper = Arc::clone(&self.sweeper);
        let sweep_interval = self.sweep_interval;
        self.tasks.push(tokio::spawn(async move {
            let mut ticker = interval(sweep_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match sweeper.run().await {
                    Ok(report) => debug!(
                        expired = report.newly_expired.len(),
                        redirected = report.redirected.len(),
                        dropped = report.dropped.len(),
                        "sweep finished"
                    ),
                    Err(e) => error!(error = %e, "sweep failed"),
                }
            }
        }));

        let reset = Arc::clone(&self.reset);
        let first = until_next_local_midnight(Local::now());
        self.tasks.push(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + first, ONE_DAY);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = reset.run().await {
                    error!(error = %e, "daily reset failed");
                }
            }
        }));

        info!(sweep_secs = sweep_interval.as_secs(), first_reset_in_secs = first.as_secs(), "scheduler started");
    }

    pub fn stop(&mut self) {
        if self.tasks.is_empty() {
            return;
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
        info!("scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        !self.tasks.is_empty() && self.tasks.iter().all(|task| !task.is_finished())
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}
