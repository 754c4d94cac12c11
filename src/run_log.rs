//! Run logs for debugging and troubleshooting.
//!
//! Each pipeline run records:
//! - Run metadata (task, provider, model, transcript size)
//! - Every stage call with all of its attempts and backoffs
//! - Timing information
//! - The classified error, if any

use crate::error::{ClassifiedError, ErrorCategory};
use crate::pipeline::Stage;
use crate::retry::InvocationAttempt;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Default number of run logs to keep
const DEFAULT_MAX_LOGS: usize = 50;

/// Hard cap for run logs kept in memory, whatever the retention mode.
const HARD_MAX_LOGS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunLogsRetentionMode {
    Amount,
    Time,
}

#[derive(Debug, Clone, Copy)]
pub struct RunLogsRetentionConfig {
    pub mode: RunLogsRetentionMode,
    /// Only used when mode == Amount.
    pub amount: usize,
    /// Only used when mode == Time. None keeps logs until the hard cap.
    pub time_retention: Option<ChronoDuration>,
}

impl Default for RunLogsRetentionConfig {
    fn default() -> Self {
        Self {
            mode: RunLogsRetentionMode::Amount,
            amount: DEFAULT_MAX_LOGS,
            time_retention: Some(ChronoDuration::days(1)),
        }
    }
}

/// A single log entry within a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// One stage call and every attempt it took
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRecord {
    pub stage: Stage,
    pub attempts: Vec<InvocationAttempt>,
    pub duration_ms: u64,
    pub succeeded: bool,
}

impl CallRecord {
    /// Number of backoff delays slept during this call
    pub fn backoff_count(&self) -> usize {
        self.attempts.iter().filter(|a| a.backoff_ms > 0).count()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    InProgress,
    Success,
    Error,
}

/// A complete log of one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLog {
    pub id: String,
    /// Task label, e.g. `summarize`
    pub task: String,
    /// Recording the run was made for, if any
    pub recording_id: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(rename = "ended_at")]
    pub completed_at: Option<DateTime<Utc>>,
    pub transcript_chars: usize,
    pub chunk_count: usize,
    pub calls: Vec<CallRecord>,
    pub entries: Vec<LogEntry>,
    pub status: RunStatus,
    pub error_category: Option<ErrorCategory>,
    pub error_message: Option<String>,
    /// Operator detail for failed runs
    pub error_detail: Option<String>,
    pub total_duration_ms: Option<u64>,
}

impl RunLog {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            task: task.into(),
            recording_id: None,
            provider: None,
            model: None,
            started_at: Utc::now(),
            completed_at: None,
            transcript_chars: 0,
            chunk_count: 0,
            calls: Vec::new(),
            entries: Vec::new(),
            status: RunStatus::InProgress,
            error_category: None,
            error_message: None,
            error_detail: None,
            total_duration_ms: None,
        }
    }

    pub fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        self.entries.push(LogEntry {
            timestamp: Utc::now(),
            level,
            message: message.into(),
        });
    }

    pub fn debug(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }

    /// Record a finished stage call. Retried or failed calls also leave a
    /// warning entry.
    pub fn record_call(&mut self, record: CallRecord) {
        let attempts = record.attempts.len();
        if !record.succeeded {
            self.warn(format!("{} failed after {} attempt(s)", record.stage, attempts));
        } else if attempts > 1 {
            self.warn(format!("{} succeeded after {} attempts", record.stage, attempts));
        } else {
            self.debug(format!("{} done", record.stage));
        }
        self.calls.push(record);
    }

    /// Total provider calls made, counting every attempt
    pub fn provider_calls(&self) -> usize {
        self.calls.iter().map(|c| c.attempts.len()).sum()
    }

    /// Total backoff delays slept across the run
    pub fn backoff_count(&self) -> usize {
        self.calls.iter().map(CallRecord::backoff_count).sum()
    }

    fn finish(&mut self, status: RunStatus) {
        let completed_at = Utc::now();
        self.completed_at = Some(completed_at);
        self.status = status;
        self.total_duration_ms = Some(
            (completed_at - self.started_at)
                .num_milliseconds()
                .max(0) as u64,
        );
    }

    pub fn complete_success(&mut self) {
        self.finish(RunStatus::Success);
    }

    pub fn complete_error(&mut self, error: &ClassifiedError) {
        self.error_category = Some(error.category);
        self.error_message = Some(error.message.clone());
        self.error_detail = Some(error.detail.clone());
        self.error(format!("Run failed with {}: {}", error.category, error.detail));
        self.finish(RunStatus::Error);
    }
}

/// Thread-safe store of recent run logs
#[derive(Debug, Clone)]
pub struct RunLogStore {
    logs: Arc<Mutex<VecDeque<RunLog>>>,
    retention: Arc<Mutex<RunLogsRetentionConfig>>,
}

impl Default for RunLogStore {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RunLogStore {
    pub fn new() -> Self {
        Self::new_with_retention(RunLogsRetentionConfig::default())
    }

    pub fn new_with_retention(retention: RunLogsRetentionConfig) -> Self {
        let initial_capacity = match retention.mode {
            RunLogsRetentionMode::Amount => retention.amount.clamp(1, HARD_MAX_LOGS),
            RunLogsRetentionMode::Time => DEFAULT_MAX_LOGS,
        };

        Self {
            logs: Arc::new(Mutex::new(VecDeque::with_capacity(initial_capacity))),
            retention: Arc::new(Mutex::new(retention)),
        }
    }

    pub fn set_retention(&self, retention: RunLogsRetentionConfig) {
        *lock(&self.retention) = retention;
        self.prune();
    }

    pub fn retention(&self) -> RunLogsRetentionConfig {
        *lock(&self.retention)
    }

    fn prune_locked(logs: &mut VecDeque<RunLog>, cfg: RunLogsRetentionConfig) {
        match cfg.mode {
            RunLogsRetentionMode::Time => {
                if let Some(retention) = cfg.time_retention {
                    let cutoff = Utc::now() - retention;
                    logs.retain(|l| l.started_at >= cutoff);
                }
            }
            RunLogsRetentionMode::Amount => {
                let target = cfg.amount.max(1);
                while logs.len() > target {
                    logs.pop_front();
                }
            }
        }

        while logs.len() > HARD_MAX_LOGS {
            logs.pop_front();
        }
    }

    pub fn prune(&self) {
        let cfg = self.retention();
        let mut logs = lock(&self.logs);
        Self::prune_locked(&mut logs, cfg);
    }

    /// Store a finished run
    pub fn record(&self, log: RunLog) {
        let cfg = self.retention();
        let mut logs = lock(&self.logs);
        logs.push_back(log);
        Self::prune_locked(&mut logs, cfg);
    }

    /// Get stored logs, most recent first
    pub fn get_logs(&self, limit: Option<usize>) -> Vec<RunLog> {
        self.prune();

        let logs = lock(&self.logs);
        let mut result: Vec<RunLog> = logs.iter().rev().cloned().collect();
        if let Some(limit) = limit {
            result.truncate(limit);
        }
        result
    }

    pub fn find(&self, id: &str) -> Option<RunLog> {
        lock(&self.logs).iter().find(|l| l.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.logs).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        lock(&self.logs).clear();
    }
}
