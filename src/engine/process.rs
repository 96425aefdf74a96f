//! Processing mode: claim each queued item, apply the remediation, finalize.

use std::time::Instant;

use chrono::{Local, NaiveDate};
use opentelemetry::KeyValue;
use tracing::{Instrument, error, info, warn};

use super::queue::WorkQueue;
use crate::error::{Error, Result};
use crate::remediation::{ApplyError, Remediation};
use crate::telemetry::metrics;
use crate::telemetry::work::{record_state_transition, start_work_span};

/// Tally of one processing run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProcessReport {
    /// Stale claims reset before the run started.
    pub recovered: u64,
    pub claimed: u64,
    pub done: u64,
    pub failed: u64,
}

pub struct Processor {
    queue: WorkQueue,
    remediation: Remediation,
    /// Fixed marker start date; `None` means today's local date.
    processing_date: Option<NaiveDate>,
}

impl Processor {
    pub fn new(queue: WorkQueue, remediation: Remediation) -> Self {
        Self {
            queue,
            remediation,
            processing_date: None,
        }
    }

    /// Use `date` as the marker start date instead of the current day.
    pub fn on_date(mut self, date: NaiveDate) -> Self {
        self.processing_date = Some(date);
        self
    }

    /// Process every item that is `new` when the run starts.
    ///
    /// Rejections mark the item `failed` and the run moves on. A fault
    /// releases the current item back to `new` and aborts the run with
    /// [`Error::Remote`].
    pub async fn run(&self) -> Result<ProcessReport> {
        let mut report = ProcessReport {
            recovered: self.queue.recover().await?,
            ..Default::default()
        };
        if report.recovered > 0 {
            warn!(recovered = report.recovered, "reset stale in-progress items");
        }

        info!("processing work queue");
        let mut items = self.queue.iter().await?;

        while let Some(claim) = items.next().await? {
            report.claimed += 1;
            let span = start_work_span(claim.item());
            record_state_transition(&span, "new", "in_progress");

            let date = self
                .processing_date
                .unwrap_or_else(|| Local::now().date_naive());
            let started = Instant::now();
            let result = self
                .remediation
                .apply(&claim.payload().cpr, date)
                .instrument(span.clone())
                .await;
            metrics::operation_duration_ms().record(
                started.elapsed().as_secs_f64() * 1000.0,
                &[KeyValue::new("operation", "remediation.apply")],
            );

            match result {
                Ok(()) => {
                    claim.complete().await?;
                    record_state_transition(&span, "in_progress", "done");
                    report.done += 1;
                }
                Err(ApplyError::Rejected(reason)) => {
                    span.in_scope(|| error!(%reason, "remediation rejected, routed to manual review"));
                    claim.fail(&reason).await?;
                    record_state_transition(&span, "in_progress", "failed");
                    report.failed += 1;
                }
                Err(ApplyError::Fault(err)) => {
                    span.in_scope(|| error!(error = %err, "remediation fault, aborting run"));
                    claim.release().await?;
                    record_state_transition(&span, "in_progress", "new");
                    info!(?report, "processing aborted");
                    return Err(Error::Remote(err));
                }
            }
        }

        info!(
            claimed = report.claimed,
            done = report.done,
            failed = report.failed,
            "processing finished"
        );
        Ok(report)
    }
}
