use crate::model::ClassroomStudentRecord;
use crate::store::RecordWriter;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WritePolicy {
    pub flush_delay: Duration,
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl Default for WritePolicy {
    fn default() -> Self {
        Self {
            flush_delay: Duration::from_millis(1200),
            max_attempts: 3,
            backoff_base: Duration::from_millis(100),
        }
    }
}

impl WritePolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(1u32 << attempt.min(16))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushOutcome {
    pub written: usize,
    pub attempts: u32,
    pub error: Option<String>,
}

impl FlushOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Staged record snapshots keyed by record id. The newest snapshot for a key wins.
#[derive(Debug)]
pub struct WriteQueue {
    policy: WritePolicy,
    pending: BTreeMap<String, ClassroomStudentRecord>,
    last_edit: Option<Instant>,
}

impl WriteQueue {
    pub fn new(policy: WritePolicy) -> Self {
        Self {
            policy,
            pending: BTreeMap::new(),
            last_edit: None,
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn stage(&mut self, record: ClassroomStudentRecord) {
        self.stage_at(record, Instant::now());
    }

    pub fn stage_at(&mut self, record: ClassroomStudentRecord, now: Instant) {
        self.pending.insert(record.id.clone(), record);
        self.last_edit = Some(now);
    }

    /// Replaces loaded records with their staged snapshots.
    pub fn overlay(&self, records: &mut [ClassroomStudentRecord]) {
        for r in records.iter_mut() {
            if let Some(staged) = self.pending.get(&r.id) {
                *r = staged.clone();
            }
        }
    }

    pub fn discard(&mut self, record_id: &str) -> bool {
        self.pending.remove(record_id).is_some()
    }

    /// True once the queue has been idle for the configured delay.
    pub fn is_due(&self, now: Instant) -> bool {
        match self.last_edit {
            Some(t) if !self.pending.is_empty() => now.duration_since(t) >= self.policy.flush_delay,
            _ => false,
        }
    }

    pub fn flush<W: RecordWriter + ?Sized>(&mut self, writer: &W) -> FlushOutcome {
        if self.pending.is_empty() {
            return FlushOutcome {
                written: 0,
                attempts: 0,
                error: None,
            };
        }

        let batch: Vec<ClassroomStudentRecord> = self.pending.values().cloned().collect();
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_error = String::new();
        for attempt in 0..max_attempts {
            match writer.write_records(&batch) {
                Ok(()) => {
                    self.pending.clear();
                    self.last_edit = None;
                    tracing::debug!(written = batch.len(), attempts = attempt + 1, "flushed staged grades");
                    return FlushOutcome {
                        written: batch.len(),
                        attempts: attempt + 1,
                        error: None,
                    };
                }
                Err(e) => {
                    last_error = format!("{e:#}");
                    tracing::warn!(attempt = attempt + 1, error = %last_error, "grade flush failed");
                    if attempt + 1 < max_attempts {
                        std::thread::sleep(self.policy.backoff(attempt));
                    }
                }
            }
        }

        // Keep everything staged; the idle window restarts before the next automatic try.
        self.last_edit = Some(Instant::now());
        tracing::error!(pending = batch.len(), error = %last_error, "grade flush gave up");
        FlushOutcome {
            written: 0,
            attempts: max_attempts,
            error: Some(last_error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct FlakyWriter {
        failures_left: RefCell<u32>,
        calls: RefCell<u32>,
        written: RefCell<Vec<ClassroomStudentRecord>>,
    }

    impl RecordWriter for FlakyWriter {
        fn write_records(&self, records: &[ClassroomStudentRecord]) -> anyhow::Result<()> {
            *self.calls.borrow_mut() += 1;
            let mut left = self.failures_left.borrow_mut();
            if *left > 0 {
                *left -= 1;
                anyhow::bail!("disk busy");
            }
            self.written.borrow_mut().extend_from_slice(records);
            Ok(())
        }
    }

    fn policy() -> WritePolicy {
        WritePolicy {
            flush_delay: Duration::from_millis(1000),
            max_attempts: 3,
            backoff_base: Duration::ZERO,
        }
    }

    fn record(id: &str, score: f64) -> ClassroomStudentRecord {
        let mut r = ClassroomStudentRecord {
            id: id.to_string(),
            student_id: format!("s-{}", id),
            grades: Vec::new(),
            group_id: None,
        };
        r.set_score("act", score);
        r
    }

    #[test]
    fn later_edit_supersedes_staged_one() {
        let mut q = WriteQueue::new(policy());
        q.stage(record("a", 1.0));
        q.stage(record("a", 2.0));
        q.stage(record("b", 3.0));
        assert_eq!(q.pending_len(), 2);

        let w = FlakyWriter::default();
        let out = q.flush(&w);
        assert!(out.is_ok());
        assert_eq!(out.written, 2);
        let written = w.written.borrow();
        let a = written.iter().find(|r| r.id == "a").expect("a written");
        assert_eq!(a.entry("act").map(|g| g.score), Some(2.0));
        assert!(q.is_empty());
    }

    #[test]
    fn due_only_after_idle_window() {
        let mut q = WriteQueue::new(policy());
        let t0 = Instant::now();
        assert!(!q.is_due(t0));
        q.stage_at(record("a", 1.0), t0);
        assert!(!q.is_due(t0 + Duration::from_millis(999)));
        assert!(q.is_due(t0 + Duration::from_millis(1000)));
    }

    #[test]
    fn transient_failure_is_retried() {
        let mut q = WriteQueue::new(policy());
        q.stage(record("a", 5.0));
        let w = FlakyWriter {
            failures_left: RefCell::new(2),
            ..Default::default()
        };
        let out = q.flush(&w);
        assert!(out.is_ok());
        assert_eq!(out.attempts, 3);
        assert_eq!(*w.calls.borrow(), 3);
        assert!(q.is_empty());
    }

    #[test]
    fn exhausted_retries_keep_records_staged() {
        let mut q = WriteQueue::new(policy());
        q.stage(record("a", 5.0));
        let w = FlakyWriter {
            failures_left: RefCell::new(10),
            ..Default::default()
        };
        let out = q.flush(&w);
        assert!(!out.is_ok());
        assert_eq!(out.attempts, 3);
        assert_eq!(q.pending_len(), 1);
        assert!(out.error.unwrap_or_default().contains("disk busy"));

        *w.failures_left.borrow_mut() = 0;
        assert!(q.flush(&w).is_ok());
        assert!(q.is_empty());
    }

    #[test]
    fn overlay_prefers_staged_snapshot() {
        let mut q = WriteQueue::new(policy());
        q.stage(record("a", 9.0));
        let mut loaded = vec![record("a", 1.0), record("b", 1.0)];
        q.overlay(&mut loaded);
        assert_eq!(loaded[0].entry("act").map(|g| g.score), Some(9.0));
        assert_eq!(loaded[1].entry("act").map(|g| g.score), Some(1.0));
        assert!(q.discard("a"));
        assert!(q.is_empty());
    }

    #[test]
    fn backoff_doubles() {
        let p = WritePolicy {
            backoff_base: Duration::from_millis(100),
            ..policy()
        };
        assert_eq!(p.backoff(0), Duration::from_millis(100));
        assert_eq!(p.backoff(2), Duration::from_millis(400));
    }
}
