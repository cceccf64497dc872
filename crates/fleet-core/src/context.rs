use serde::Serialize;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Shared cancellation flag. Cloning shares the flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Per-task budget handed to every backend call: the task deadline plus the
/// run-level cancellation token.
#[derive(Clone, Debug)]
pub struct TaskContext {
    deadline: Option<Instant>,
    cancel: CancelToken,
}

impl TaskContext {
    pub fn new(timeout: Option<Duration>, cancel: CancelToken) -> Self {
        Self {
            deadline: timeout.map(|timeout| Instant::now() + timeout),
            cancel,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None, CancelToken::new())
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_some_and(|remaining| remaining.is_zero())
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Ok,
    Warning,
    Failure,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Ok => "ok",
            Severity::Warning => "warning",
            Severity::Failure => "failure",
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Severity::Ok => 0,
            Severity::Failure => 1,
            Severity::Warning => 2,
        }
    }
}

/// Per-invocation state passed down explicitly: cancellation and the
/// accumulated severity signal. Two contexts never share state.
#[derive(Clone, Debug, Default)]
pub struct RunContext {
    cancel: CancelToken,
    severity: Arc<Mutex<SeverityLedger>>,
}

#[derive(Debug, Default)]
struct SeverityLedger {
    level: Severity,
    warnings: usize,
    failures: usize,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(cancel: CancelToken) -> Self {
        Self {
            cancel,
            severity: Arc::default(),
        }
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn task(&self, timeout: Option<Duration>) -> TaskContext {
        TaskContext::new(timeout, self.cancel.clone())
    }

    pub fn warn(&self) {
        self.record(Severity::Warning);
    }

    pub fn fail(&self) {
        self.record(Severity::Failure);
    }

    pub fn record(&self, severity: Severity) {
        if let Ok(mut ledger) = self.severity.lock() {
            match severity {
                Severity::Ok => {}
                Severity::Warning => ledger.warnings += 1,
                Severity::Failure => ledger.failures += 1,
            }
            ledger.level = ledger.level.max(severity);
        }
    }

    pub fn severity(&self) -> Severity {
        self.severity
            .lock()
            .map(|ledger| ledger.level)
            .unwrap_or(Severity::Failure)
    }

    pub fn warnings(&self) -> usize {
        self.severity.lock().map(|ledger| ledger.warnings).unwrap_or(0)
    }

    pub fn failures(&self) -> usize {
        self.severity.lock().map(|ledger| ledger.failures).unwrap_or(0)
    }

    pub fn exit_code(&self) -> i32 {
        self.severity().exit_code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_escalates_and_never_downgrades() {
        let ctx = RunContext::new();
        assert_eq!(ctx.severity(), Severity::Ok);
        ctx.warn();
        assert_eq!(ctx.severity(), Severity::Warning);
        ctx.fail();
        ctx.warn();
        assert_eq!(ctx.severity(), Severity::Failure);
        assert_eq!(ctx.warnings(), 2);
        assert_eq!(ctx.failures(), 1);
        assert_eq!(ctx.exit_code(), 1);
    }

    #[test]
    fn separate_contexts_do_not_interfere() {
        let first = RunContext::new();
        let second = RunContext::new();
        first.fail();
        assert_eq!(second.severity(), Severity::Ok);
        assert!(!second.cancel_token().is_cancelled());
    }

    #[test]
    fn task_context_tracks_deadline_and_cancel() {
        let ctx = RunContext::new();
        let task = ctx.task(Some(Duration::from_millis(0)));
        assert!(task.is_expired());
        let open = ctx.task(None);
        assert!(open.remaining().is_none());
        assert!(!open.is_cancelled());
        ctx.cancel_token().cancel();
        assert!(open.is_cancelled());
    }
}
