//! Running submission sequences end to end.
//!
//! A sequence is locate → render → reconcile → persist → re-render →
//! classify, on one leased session. Transport failures restart the whole
//! sequence from the locator since the server-side "current invoice" may no
//! longer be the one the sequence opened.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::Serialize;
use tracing::Instrument;

use crate::config::{ResolvedConfig, RetryConfig};
use crate::error::PortalError;
use crate::models::{SubmissionJob, SubmissionOutcome};
use crate::portal::{classify, reconcile, Portal};
use crate::session::{PortalSession, SessionLease};

pub struct SubmissionService {
    portal: Portal,
    retry: RetryConfig,
}

/// Result of one job in a batch.
#[derive(Debug, Clone, Serialize)]
pub struct LineReport {
    pub job: SubmissionJob,
    #[serde(flatten)]
    pub result: LineResult,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LineResult {
    Submitted {
        outcome: SubmissionOutcome,
    },
    Failed {
        kind: String,
        message: String,
        retryable: bool,
    },
    NotAttempted {
        reason: String,
    },
}

impl LineResult {
    fn failed(err: &PortalError) -> Self {
        Self::Failed {
            kind: err.kind().to_string(),
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }

    pub fn is_submitted(&self) -> bool {
        matches!(self, Self::Submitted { .. })
    }
}

impl SubmissionService {
    pub fn new(portal: Portal, retry: RetryConfig) -> Self {
        Self { portal, retry }
    }

    pub fn from_config(config: &ResolvedConfig) -> anyhow::Result<Self> {
        Ok(Self::new(Portal::from_config(config)?, config.retry.clone()))
    }

    pub fn portal(&self) -> &Portal {
        &self.portal
    }

    /// Run one job, holding the session for the whole sequence.
    pub async fn submit(
        &self,
        session: &PortalSession,
        job: &SubmissionJob,
    ) -> Result<SubmissionOutcome, PortalError> {
        let lease = session.lease().await;
        self.submit_with_lease(&lease, job).await
    }

    /// Run one job on an already-held lease, restarting the sequence on
    /// transport failures.
    pub async fn submit_with_lease(
        &self,
        lease: &SessionLease<'_>,
        job: &SubmissionJob,
    ) -> Result<SubmissionOutcome, PortalError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut backoff = self.retry.initial_backoff;
        let mut attempt = 1;

        loop {
            match self.run_sequence(lease, job).await {
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    tracing::warn!(
                        session = lease.session_name(),
                        invoice_id = %job.invoice_id,
                        attempt,
                        max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "Sequence failed; restarting from locator"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = next_backoff(backoff);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// One attempt of the full sequence, with no retries.
    pub async fn run_sequence(
        &self,
        lease: &SessionLease<'_>,
        job: &SubmissionJob,
    ) -> Result<SubmissionOutcome, PortalError> {
        let span = tracing::info_span!(
            "submission",
            sequence_id = %lease.sequence_id(),
            session = lease.session_name(),
            provider_code = %job.provider_code,
            invoice_id = %job.invoice_id,
            uci = %job.consumer.uci,
        );
        self.sequence(lease, job).instrument(span).await
    }

    /// Locate, render, reconcile, persist, re-render, classify.
    ///
    /// When the rendered calendar already shows every requested day at the
    /// requested units, both the persist request and the re-render are
    /// skipped and the first render, read under this same lease, stands in
    /// as the confirmed state.
    async fn sequence(
        &self,
        lease: &SessionLease<'_>,
        job: &SubmissionJob,
    ) -> Result<SubmissionOutcome, PortalError> {
        let portal = &self.portal;
        let request = &job.request;

        let line = portal
            .locate(lease, &job.provider_code, &job.invoice_id, &job.consumer)
            .await?;
        let pre = portal.fetch_calendar(lease, &line).await?;
        let reconciled = reconcile(&pre, request, portal.schema())?;

        let needs_write = request
            .days()
            .iter()
            .any(|(&day, &units)| pre.day(day).and_then(|c| c.value()) != Some(units));

        let post = if needs_write {
            portal.submit(lease, &line, &reconciled).await?
        } else {
            tracing::info!(
                line_id = %line.line_id,
                "Every requested day already carries the requested units; nothing to persist"
            );
            pre.clone()
        };

        if post.summary() != reconciled.summary() {
            tracing::warn!(
                line_id = %line.line_id,
                local_total_units = %reconciled.constants.total_units,
                portal_total_units = %post.constants.total_units,
                local_gross = %reconciled.constants.gross_amount,
                portal_gross = %post.constants.gross_amount,
                "Portal totals differ from the locally reconciled figures"
            );
        }

        let outcome = classify(&line, &pre, &post, request);
        if !outcome.success {
            tracing::error!(
                line_id = %line.line_id,
                mismatches = outcome.mismatches.len(),
                "Submission did not take effect"
            );
            return Err(PortalError::PersistenceMismatch {
                line_id: line.line_id,
                mismatches: outcome.mismatches,
            });
        }

        if let Some(comparison) = &outcome.invoice_comparison {
            if !comparison.agrees() {
                tracing::warn!(
                    line_id = %line.line_id,
                    invoice_units = %comparison.invoice_units,
                    portal_units = %comparison.portal_units,
                    invoice_amount = %comparison.invoice_amount,
                    portal_amount = %comparison.portal_amount,
                    "Portal totals disagree with invoice totals"
                );
            }
        }

        tracing::info!(
            line_id = %line.line_id,
            newly_entered = outcome.newly_entered.len(),
            already_entered = outcome.already_entered.len(),
            total_units = %outcome.summary.total_units,
            gross_amount = %outcome.summary.gross_amount,
            "Submission confirmed"
        );
        Ok(outcome)
    }

    /// Run many jobs on one session.
    ///
    /// Jobs are grouped by provider and invoice, keeping first-seen order, so
    /// the portal switches invoices as rarely as possible. A failing line does
    /// not stop the others; an expired session does, and every job after it is
    /// reported as not attempted.
    pub async fn submit_batch(
        &self,
        session: &PortalSession,
        jobs: Vec<SubmissionJob>,
    ) -> Vec<LineReport> {
        let ordered = group_by_invoice(jobs);
        let total = ordered.len();
        let mut reports = Vec::with_capacity(total);
        let mut jobs = ordered.into_iter();

        while let Some(job) = jobs.next() {
            match self.submit(session, &job).await {
                Ok(outcome) => reports.push(LineReport {
                    job,
                    result: LineResult::Submitted { outcome },
                }),
                Err(err @ PortalError::AuthExpired { .. }) => {
                    tracing::error!(
                        session = session.name(),
                        error = %err,
                        remaining = total - reports.len() - 1,
                        "Session expired; stopping batch"
                    );
                    reports.push(LineReport {
                        job,
                        result: LineResult::failed(&err),
                    });
                    reports.extend(jobs.by_ref().map(|job| LineReport {
                        job,
                        result: LineResult::NotAttempted {
                            reason: "session expired earlier in the batch".to_string(),
                        },
                    }));
                }
                Err(err) => {
                    tracing::warn!(
                        session = session.name(),
                        invoice_id = %job.invoice_id,
                        uci = %job.consumer.uci,
                        kind = err.kind(),
                        error = %err,
                        "Line failed; continuing batch"
                    );
                    reports.push(LineReport {
                        job,
                        result: LineResult::failed(&err),
                    });
                }
            }
        }

        let submitted = reports.iter().filter(|r| r.result.is_submitted()).count();
        tracing::info!(
            session = session.name(),
            total,
            submitted,
            "Batch finished"
        );
        reports
    }

    /// Run independent batches on independent sessions in parallel.
    ///
    /// Results come back in the order the sessions were given.
    pub async fn submit_sessions(
        self: Arc<Self>,
        work: Vec<(Arc<PortalSession>, Vec<SubmissionJob>)>,
    ) -> anyhow::Result<Vec<(String, Vec<LineReport>)>> {
        let handles: Vec<_> = work
            .into_iter()
            .map(|(session, jobs)| {
                let service = Arc::clone(&self);
                tokio::spawn(async move {
                    let reports = service.submit_batch(&session, jobs).await;
                    (session.name().to_string(), reports)
                })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(handle.await.context("Session batch task failed")?);
        }
        Ok(results)
    }
}

fn next_backoff(current: Duration) -> Duration {
    current.saturating_mul(2).min(Duration::from_secs(300))
}

fn group_by_invoice(jobs: Vec<SubmissionJob>) -> Vec<SubmissionJob> {
    let mut groups: Vec<((String, String), Vec<SubmissionJob>)> = Vec::new();
    for job in jobs {
        let key = (job.provider_code.clone(), job.invoice_id.clone());
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, group)) => group.push(job),
            None => groups.push((key, vec![job])),
        }
    }
    groups.into_iter().flat_map(|(_, group)| group).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConsumerKey, SubmissionRequest};
    use rust_decimal::Decimal;

    fn job(invoice: &str, uci: &str) -> SubmissionJob {
        SubmissionJob {
            provider_code: "PP0212".to_string(),
            invoice_id: invoice.to_string(),
            consumer: ConsumerKey::new(uci),
            request: SubmissionRequest::uniform([1], Decimal::ONE).unwrap(),
        }
    }

    #[test]
    fn groups_jobs_by_invoice_in_first_seen_order() {
        let jobs = vec![job("B", "1"), job("A", "2"), job("B", "3"), job("A", "4")];
        let order: Vec<(String, String)> = group_by_invoice(jobs)
            .into_iter()
            .map(|j| (j.invoice_id, j.consumer.uci))
            .collect();
        assert_eq!(
            order,
            vec![
                ("B".to_string(), "1".to_string()),
                ("B".to_string(), "3".to_string()),
                ("A".to_string(), "2".to_string()),
                ("A".to_string(), "4".to_string()),
            ]
        );
    }

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(next_backoff(Duration::from_secs(2)), Duration::from_secs(4));
        assert_eq!(next_backoff(Duration::from_secs(200)), Duration::from_secs(300));
    }

    #[test]
    fn failed_report_serializes_kind() {
        let report = LineReport {
            job: job("A", "1"),
            result: LineResult::failed(&PortalError::AuthExpired {
                url: "https://portal/login".to_string(),
            }),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["kind"], "auth_expired");
        assert_eq!(json["retryable"], false);
        assert_eq!(json["job"]["invoice_id"], "A");
    }
}
