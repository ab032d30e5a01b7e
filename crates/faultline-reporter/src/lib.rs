//! Per-test failure reporting.
//!
//! [`ReportingHook`] is called once per finished test. For failures it walks
//! the chain
//!
//! ```text
//! FAILED → EVIDENCE_COLLECTED → DEDUP_CHECKED → (REUSED | CREATED) → LINKED
//! ```
//!
//! and returns a [`ChainOutcome`]. Nothing in the chain can fail the test run:
//! tracker errors end the chain for that test and are reported in the outcome.

pub mod description;
pub mod evidence;
pub mod ledger;
mod outcome;

pub use ledger::{Ledger, LedgerEntry, read_ledger};
pub use outcome::{ChainOutcome, ChainState, TicketRef};

use faultline_config::FaultlineConfig;
use faultline_dedupe::{DedupDecision, classify};
use faultline_ids::{TestIdentity, WorkerId};
use faultline_lock::{LockManager, NamedLockGuard};
use faultline_ports::{
    FailureAnalyzer, IssueTracker, ScreenshotSource, TestManagement, TrackerResult,
};
use faultline_schema::analysis::AnalysisRequest;
use faultline_schema::evidence::{FailureEvidence, Outcome, TestOutcome};
use faultline_schema::execution::{TestResult, TestStatus};
use faultline_schema::options::{ResolvedOptions, TicketOptions, TicketOptionsRegistry};
use faultline_schema::ticket::Ticket;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Execution key handed to worker processes by `faultline run`.
pub const EXECUTION_KEY_ENV: &str = "FAULTLINE_EXECUTION_KEY";

/// Link type between a failure ticket and the test it reports on.
pub const TESTS_LINK_TYPE: &str = "Tests";

pub struct ReportingHook<'a> {
    config: &'a FaultlineConfig,
    tracker: Option<&'a dyn IssueTracker>,
    management: Option<&'a dyn TestManagement>,
    analyzer: Option<&'a dyn FailureAnalyzer>,
    registry: TicketOptionsRegistry,
    global: TicketOptions,
    locks: LockManager,
    worker: WorkerId,
    execution_key: Option<String>,
    ledger: Option<Ledger>,
    processed: Mutex<HashMap<TestIdentity, ChainOutcome>>,
    results: Mutex<Vec<TestResult>>,
}

fn locked<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

fn ticket_ref(tracker: &dyn IssueTracker, ticket: &Ticket) -> TicketRef {
    TicketRef {
        key: ticket.key.clone(),
        url: ticket
            .url
            .clone()
            .unwrap_or_else(|| tracker.browse_url(&ticket.key)),
    }
}

impl<'a> ReportingHook<'a> {
    /// `tracker` is `None` when the tracker integration is disabled or
    /// misconfigured; the failure chain is then a no-op.
    ///
    /// The worker id comes from `FAULTLINE_WORKER` and the execution key from
    /// `FAULTLINE_EXECUTION_KEY`, falling back to the configured one.
    pub fn new(config: &'a FaultlineConfig, tracker: Option<&'a dyn IssueTracker>) -> Self {
        let execution_key = std::env::var(EXECUTION_KEY_ENV)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| config.xray.execution_key.clone());
        let worker = WorkerId::from_env();
        Self {
            config,
            tracker,
            management: None,
            analyzer: None,
            registry: TicketOptionsRegistry::new(),
            global: config.jira.ticket_defaults(),
            locks: LockManager::new(config.lock_dir()),
            ledger: Some(Ledger::for_worker(&config.reports.dir, &worker)),
            worker,
            execution_key,
            processed: Mutex::new(HashMap::new()),
            results: Mutex::new(Vec::new()),
        }
    }

    pub fn with_management(mut self, management: &'a dyn TestManagement) -> Self {
        self.management = Some(management);
        self
    }

    /// Only pass an analyzer when the AI capability probe succeeded.
    pub fn with_analyzer(mut self, analyzer: &'a dyn FailureAnalyzer) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn with_registry(mut self, registry: TicketOptionsRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_worker(mut self, worker: WorkerId) -> Self {
        if self.ledger.is_some() {
            self.ledger = Some(Ledger::for_worker(&self.config.reports.dir, &worker));
        }
        self.worker = worker;
        self
    }

    pub fn with_execution_key(mut self, key: impl Into<String>) -> Self {
        self.execution_key = Some(key.into());
        self
    }

    pub fn with_lock_manager(mut self, locks: LockManager) -> Self {
        self.locks = locks;
        self
    }

    pub fn without_ledger(mut self) -> Self {
        self.ledger = None;
        self
    }

    pub fn worker(&self) -> &WorkerId {
        &self.worker
    }

    pub fn execution_key(&self) -> Option<&str> {
        self.execution_key.as_deref()
    }

    pub fn ledger(&self) -> Option<&Ledger> {
        self.ledger.as_ref()
    }

    pub fn options_for(&self, identity: &TestIdentity) -> ResolvedOptions {
        self.registry.resolve(identity, &self.global)
    }

    /// Handle one finished test.
    ///
    /// `screenshot` is supplied by UI tests only.
    pub fn on_test_finished(
        &self,
        outcome: &TestOutcome,
        screenshot: Option<&dyn ScreenshotSource>,
    ) -> ChainOutcome {
        let identity = &outcome.identity;
        if let Some(previous) = locked(&self.processed).get(identity) {
            debug!(test = %identity, state = %previous.state(), "already reported, skipping");
            return previous.clone();
        }

        let options = self.options_for(identity);
        let (chain, screenshot_path) = match outcome.outcome {
            Outcome::Passed | Outcome::Skipped => (ChainOutcome::NoFailure, None),
            Outcome::Failed => self.report_failure(outcome, &options, screenshot),
        };

        if chain.ticket().is_some() {
            locked(&self.processed).insert(identity.clone(), chain.clone());
        }
        if let Some(key) = &options.test_key {
            self.record_result(key, outcome, &chain, screenshot_path);
        }
        if let Some(ledger) = &self.ledger
            && let Err(e) = ledger.append(&LedgerEntry::new(&self.worker, identity, chain.clone()))
        {
            warn!(path = ?ledger.path(), error = %format!("{e:#}"), "failed to append outcome ledger");
        }
        chain
    }

    fn report_failure(
        &self,
        outcome: &TestOutcome,
        options: &ResolvedOptions,
        screenshot: Option<&dyn ScreenshotSource>,
    ) -> (ChainOutcome, Option<std::path::PathBuf>) {
        let identity = &outcome.identity;
        let Some(tracker) = self.tracker else {
            debug!(test = %identity, "tracker disabled, not reporting failure");
            return (ChainOutcome::Disabled, None);
        };
        if !options.wants_ticket() {
            let reason = options
                .skip_reason
                .clone()
                .unwrap_or_else(|| "create_on_failure is false".to_string());
            info!(test = %identity, reason = %reason, "ticket creation skipped");
            return (ChainOutcome::Suppressed { reason }, None);
        }

        let evidence = self.collect_evidence(outcome, screenshot);
        let shot = evidence.screenshot_path.clone();
        (self.file_ticket(tracker, outcome, options, &evidence), shot)
    }

    fn collect_evidence(
        &self,
        outcome: &TestOutcome,
        screenshot: Option<&dyn ScreenshotSource>,
    ) -> FailureEvidence {
        let identity = &outcome.identity;
        let mut evidence = FailureEvidence::from_outcome(outcome);

        if let Some(source) = screenshot {
            match crate::evidence::capture_screenshot(source, &self.config.reports.dir, &self.worker, identity) {
                Ok(path) => {
                    debug!(test = %identity, path = ?path, "screenshot saved");
                    evidence.screenshot_path = Some(path);
                }
                Err(e) => warn!(test = %identity, error = %format!("{e:#}"), "screenshot capture failed"),
            }
        }

        if let Some(analyzer) = self.analyzer {
            let request = AnalysisRequest {
                test_name: identity.name.clone(),
                error_message: evidence.error_message.clone(),
                test_code: evidence.source_snippet.clone().unwrap_or_default(),
                screenshot_path: evidence.screenshot_path.clone(),
                response_data: None,
            };
            match analyzer.analyze(&request) {
                Ok(analysis) => evidence.ai_root_cause = Some(analysis.root_cause),
                Err(e) => warn!(test = %identity, error = %format!("{e:#}"), "AI failure analysis failed"),
            }
        }
        evidence
    }

    fn lock(&self, identity: &TestIdentity) -> Option<NamedLockGuard> {
        let name = format!("ticket:{}", identity.label());
        let timeout = Duration::from_secs(self.config.lock.timeout_secs);
        match self.locks.acquire(&name, timeout) {
            Ok(Some(guard)) => Some(guard),
            Ok(None) => {
                warn!(test = %identity, lock = %name, "lock timed out, checking duplicates without it");
                None
            }
            Err(e) => {
                warn!(test = %identity, lock = %name, error = %e, "lock unavailable, checking duplicates without it");
                None
            }
        }
    }

    fn file_ticket(
        &self,
        tracker: &dyn IssueTracker,
        outcome: &TestOutcome,
        options: &ResolvedOptions,
        evidence: &FailureEvidence,
    ) -> ChainOutcome {
        let identity = &outcome.identity;
        let guard = self.lock(identity);

        let decision = match classify(tracker, identity, self.config.jira.create_duplicates) {
            Ok(d) => d,
            Err(e) => {
                warn!(test = %identity, category = %e.category(), error = %e, "duplicate check failed");
                return ChainOutcome::aborted(ChainState::EvidenceCollected, &e, None);
            }
        };

        let created = match decision {
            DedupDecision::Reuse(existing) => {
                drop(guard);
                let ticket = ticket_ref(tracker, &existing);
                let comment = description::recurrence_comment(&self.worker, evidence);
                if let Err(e) = tracker.add_comment(&ticket.key, &comment) {
                    warn!(key = %ticket.key, error = %e, "failed to comment on reused ticket");
                }
                info!(test = %identity, key = %ticket.key, url = %ticket.url, "reusing open ticket");
                return self.link_to_execution(tracker, ticket, ChainState::Reused);
            }
            DedupDecision::Create => {
                let fields = description::issue_fields(
                    &self.config.jira.issue_type,
                    identity,
                    &self.worker,
                    evidence,
                    options,
                    outcome.duration_ms,
                );
                let result = tracker.create_issue(&fields);
                drop(guard);
                match result {
                    Ok(t) => t,
                    Err(e) => {
                        warn!(test = %identity, category = %e.category(), error = %e, "ticket creation failed");
                        return ChainOutcome::aborted(ChainState::DedupChecked, &e, None);
                    }
                }
            }
        };

        let ticket = ticket_ref(tracker, &created);
        info!(test = %identity, key = %ticket.key, url = %ticket.url, "created ticket");

        if let Some(path) = &evidence.screenshot_path
            && let Err(e) = tracker.upload_attachment(&ticket.key, path)
        {
            warn!(key = %ticket.key, error = %e, "failed to attach screenshot");
        }

        if let Some(test_key) = &options.test_key
            && let Err(e) = tracker.link_issues(TESTS_LINK_TYPE, &ticket.key, test_key, None)
        {
            warn!(key = %ticket.key, test_key = %test_key, error = %e, "failed to link ticket to test");
        }

        self.link_to_execution(tracker, ticket, ChainState::Created)
    }

    /// Final step for both created and reused tickets. `reached` is
    /// `Created` or `Reused`.
    fn link_to_execution(
        &self,
        tracker: &dyn IssueTracker,
        ticket: TicketRef,
        reached: ChainState,
    ) -> ChainOutcome {
        let finish = |ticket, linked| match reached {
            ChainState::Reused => ChainOutcome::Reused { ticket, linked },
            _ => ChainOutcome::Created { ticket, linked },
        };
        let Some(exec) = self.execution_key.as_deref() else {
            return finish(ticket, false);
        };
        match tracker.link_issues(&self.config.jira.link_type, &ticket.key, exec, None) {
            Ok(()) => {
                debug!(key = %ticket.key, execution = exec, "linked ticket to execution");
                finish(ticket, true)
            }
            Err(e) => {
                warn!(key = %ticket.key, execution = exec, error = %e, "failed to link ticket to execution");
                ChainOutcome::aborted(reached, &e, Some(ticket))
            }
        }
    }

    fn record_result(
        &self,
        test_key: &str,
        outcome: &TestOutcome,
        chain: &ChainOutcome,
        screenshot: Option<std::path::PathBuf>,
    ) {
        let status = match outcome.outcome {
            Outcome::Passed => TestStatus::Pass,
            Outcome::Failed => TestStatus::Fail,
            Outcome::Skipped => TestStatus::Todo,
        };
        let mut result = TestResult::new(test_key, status);
        if outcome.outcome == Outcome::Failed {
            let first = outcome
                .error_message
                .as_deref()
                .and_then(|m| m.lines().next())
                .unwrap_or("failed");
            result.comment = Some(match chain.ticket() {
                Some(t) => format!("{first} ({})", t.key),
                None => first.to_string(),
            });
        }
        result.duration_ms = outcome.duration_ms;
        result.started_at = outcome.started_at;
        result.finished_at = outcome.finished_at;
        result.evidence = screenshot.into_iter().collect();
        locked(&self.results).push(result);
    }

    /// Results recorded so far, in arrival order.
    pub fn pending_results(&self) -> Vec<TestResult> {
        locked(&self.results).clone()
    }

    /// Report recorded results to the execution in one call.
    ///
    /// Returns how many results were sent. Without an execution key or a
    /// test-management client nothing is sent and recorded results are kept.
    pub fn finish_run(&self) -> TrackerResult<usize> {
        let (Some(management), Some(exec)) = (self.management, self.execution_key.as_deref()) else {
            debug!("no execution to report results to");
            return Ok(0);
        };
        let results = std::mem::take(&mut *locked(&self.results));
        if results.is_empty() {
            return Ok(0);
        }
        match management.report_results(exec, &results) {
            Ok(()) => {
                info!(execution = exec, results = results.len(), "reported test results");
                Ok(results.len())
            }
            Err(e) => {
                locked(&self.results).extend(results);
                Err(e)
            }
        }
    }
}
