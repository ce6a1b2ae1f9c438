//! Batch driver: ordered processing with cooldown windows and a retry queue.

use crate::core::pacing::{Pacer, Sleeper};
use anyhow::Result;
use std::fmt::Display;
use std::time::Duration;

/// Summary of one batch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport<T> {
    /// Passes executed (the first pass counts).
    pub passes: u32,
    /// Item operations attempted across all passes.
    pub attempts: usize,
    /// Cooldown pauses taken.
    pub cooldowns: usize,
    /// Items still failing when the driver stopped. Empty unless a pass cap was hit.
    pub failed: Vec<T>,
}

impl<T> BatchReport<T> {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct BatchDriver<'a> {
    /// Label used in progress events ("issue keys", "delete keys", ...).
    pub label: &'a str,
    pub pacer: Pacer,
    pub retry_delay: Duration,
    /// `None` retries until a pass has no failures.
    pub max_passes: Option<u32>,
    pub sleeper: &'a dyn Sleeper,
}

impl BatchDriver<'_> {
    /// Run `op` over `items` in order, re-queueing failures until none remain.
    ///
    /// An item fails when `op` returns `Err`; the error is logged and the item
    /// goes to the next pass. Items are never dropped without a report.
    pub fn run<T, F>(&self, items: Vec<T>, mut op: F) -> BatchReport<T>
    where
        T: Display,
        F: FnMut(&T) -> Result<()>,
    {
        let mut report = BatchReport {
            passes: 0,
            attempts: 0,
            cooldowns: 0,
            failed: Vec::new(),
        };
        let mut queue = items;

        while !queue.is_empty() {
            report.passes += 1;
            let total = queue.len();
            let mut failed = Vec::new();

            for (i, item) in queue.into_iter().enumerate() {
                let processed = i + 1;
                report.attempts += 1;
                match op(&item) {
                    Ok(()) => {
                        tracing::info!(batch = self.label, progress = %format!("{}/{}", processed, total), item = %item, "done");
                    }
                    Err(e) => {
                        tracing::warn!(batch = self.label, item = %item, error = %format!("{:#}", e), "failed, queued for retry");
                        failed.push(item);
                    }
                }
                if self.pacer.after_item(processed, total, self.sleeper) {
                    report.cooldowns += 1;
                }
            }

            if failed.is_empty() {
                tracing::info!(batch = self.label, passes = report.passes, "all items processed");
                break;
            }
            if self.max_passes.is_some_and(|max| report.passes >= max) {
                tracing::error!(
                    batch = self.label,
                    passes = report.passes,
                    remaining = failed.len(),
                    "giving up after maximum passes"
                );
                report.failed = failed;
                break;
            }
            tracing::warn!(
                batch = self.label,
                remaining = failed.len(),
                delay_secs = self.retry_delay.as_secs_f64(),
                "retrying failed items"
            );
            self.sleeper.sleep(self.retry_delay);
            queue = failed;
        }

        report
    }
}
