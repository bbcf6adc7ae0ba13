//! `CryptoService`: the crypto primitives plus injected collaborators.
//!
//! Single operations always run on the calling thread. Batches go to the
//! configured [`TaskExecutor`] when there is one; a refused job is run inline
//! and produces exactly the same result value.

use super::executor::{Job, TaskExecutor};
use super::metrics::CryptoMetrics;
use super::KeyPair;
use crate::error::CryptoError;
use crossbeam_channel::{bounded, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStrategy {
    Inline,
    Offload,
}

/// A unit of batched work, correlated with its result by `id`.
pub trait CryptoTask: Send + 'static {
    fn id(&self) -> &str;
}

#[derive(Debug, Clone)]
pub struct SignTask {
    pub id: String,
    pub message: String,
    pub private_key: String,
}

#[derive(Debug, Clone)]
pub struct VerifyTask {
    pub id: String,
    pub signature: String,
    pub message: String,
    pub public_key: String,
}

#[derive(Debug, Clone)]
pub struct HashTask {
    pub id: String,
    pub message: String,
}

impl CryptoTask for SignTask {
    fn id(&self) -> &str {
        &self.id
    }
}

impl CryptoTask for VerifyTask {
    fn id(&self) -> &str {
        &self.id
    }
}

impl CryptoTask for HashTask {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskResult<T> {
    pub id: String,
    pub outcome: Result<T, CryptoError>,
}

impl<T> TaskResult<T> {
    pub fn success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn result(&self) -> Option<&T> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&CryptoError> {
        self.outcome.as_ref().err()
    }
}

#[derive(Clone)]
pub struct CryptoService {
    executor: Option<Arc<dyn TaskExecutor>>,
    metrics: Arc<CryptoMetrics>,
    task_timeout: Duration,
}

impl Default for CryptoService {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CryptoService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoService")
            .field("strategy", &self.strategy())
            .field("task_timeout", &self.task_timeout)
            .finish()
    }
}

impl CryptoService {
    /// A service with no executor: every batch runs inline.
    pub fn new() -> Self {
        Self {
            executor: None,
            metrics: Arc::new(CryptoMetrics::new()),
            task_timeout: DEFAULT_TASK_TIMEOUT,
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<CryptoMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    pub fn strategy(&self) -> ExecutionStrategy {
        match self.executor {
            Some(_) => ExecutionStrategy::Offload,
            None => ExecutionStrategy::Inline,
        }
    }

    pub fn metrics(&self) -> &Arc<CryptoMetrics> {
        &self.metrics
    }

    pub fn task_timeout(&self) -> Duration {
        self.task_timeout
    }

    pub fn generate_key_pair(&self) -> Result<KeyPair, CryptoError> {
        let result = super::generate_key_pair();
        match &result {
            Ok(_) => self.metrics.record_key_generated(),
            Err(_) => self.metrics.record_failure(),
        }
        result
    }

    pub fn sign(&self, message: &str, private_key: &str) -> Result<String, CryptoError> {
        let result = super::sign(message, private_key);
        self.record_signature(&result);
        result
    }

    pub fn verify(&self, signature: &str, message: &str, public_key: &str) -> bool {
        let valid = super::verify(signature, message, public_key);
        self.metrics.record_verification(valid);
        valid
    }

    pub fn hash(&self, message: &str) -> String {
        self.metrics.record_hash();
        super::hash(message)
    }

    pub fn batch_sign(&self, tasks: Vec<SignTask>) -> Vec<TaskResult<String>> {
        let results = self.run_batch(tasks, |task: &SignTask| {
            super::sign(&task.message, &task.private_key)
        });
        for result in &results {
            self.record_signature(&result.outcome);
        }
        results
    }

    /// A failed verification is a successful task with result `false`.
    pub fn batch_verify(&self, tasks: Vec<VerifyTask>) -> Vec<TaskResult<bool>> {
        let results = self.run_batch(tasks, |task: &VerifyTask| {
            Ok(super::verify(&task.signature, &task.message, &task.public_key))
        });
        for result in &results {
            match result.outcome {
                Ok(valid) => self.metrics.record_verification(valid),
                Err(_) => self.metrics.record_failure(),
            }
        }
        results
    }

    pub fn batch_hash(&self, tasks: Vec<HashTask>) -> Vec<TaskResult<String>> {
        let results = self.run_batch(tasks, |task: &HashTask| Ok(super::hash(&task.message)));
        for result in &results {
            match result.outcome {
                Ok(_) => self.metrics.record_hash(),
                Err(_) => self.metrics.record_failure(),
            }
        }
        results
    }

    fn record_signature(&self, result: &Result<String, CryptoError>) {
        match result {
            Ok(_) => self.metrics.record_signature(),
            Err(_) => self.metrics.record_failure(),
        }
    }

    fn run_batch<T, R>(&self, tasks: Vec<T>, op: fn(&T) -> Result<R, CryptoError>) -> Vec<TaskResult<R>>
    where
        T: CryptoTask,
        R: Send + 'static,
    {
        let Some(executor) = self.executor.as_ref() else {
            return tasks
                .into_iter()
                .map(|task| {
                    self.metrics.record_inline();
                    TaskResult {
                        id: task.id().to_string(),
                        outcome: op(&task),
                    }
                })
                .collect();
        };

        let mut pending = Vec::with_capacity(tasks.len());
        for task in tasks {
            let id = task.id().to_string();
            let (tx, rx) = bounded(1);
            let job: Job = Box::new(move || {
                // The receiver is gone once the caller has timed out.
                let _ = tx.send(op(&task));
            });
            let deadline = Instant::now() + self.task_timeout;

            match executor.submit(job) {
                Ok(()) => self.metrics.record_offloaded(),
                Err(refused) => {
                    warn!("Executor refused crypto task {}: {}; running inline", id, refused.reason);
                    self.metrics.record_fallback();
                    (refused.job)();
                }
            }
            pending.push((id, rx, deadline));
        }

        pending
            .into_iter()
            .map(|(id, rx, deadline)| {
                let outcome = match rx.recv_deadline(deadline) {
                    Ok(outcome) => outcome,
                    Err(RecvTimeoutError::Timeout) => {
                        warn!("Crypto task {} timed out", id);
                        self.metrics.record_timeout();
                        Err(CryptoError::TaskTimeout {
                            id: id.clone(),
                            timeout_ms: self.task_timeout.as_millis(),
                        })
                    }
                    Err(RecvTimeoutError::Disconnected) => Err(CryptoError::TaskFailed {
                        id: id.clone(),
                        reason: "worker dropped the task without a result".to_string(),
                    }),
                };
                TaskResult { id, outcome }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::executor::{SubmitError, WorkerPool};
    use parking_lot::Mutex;

    /// Accepts every job and never runs it.
    #[derive(Default)]
    struct BlackHole {
        parked: Mutex<Vec<Job>>,
    }

    impl TaskExecutor for BlackHole {
        fn submit(&self, job: Job) -> Result<(), SubmitError> {
            self.parked.lock().push(job);
            Ok(())
        }

        fn worker_count(&self) -> usize {
            1
        }
    }

    /// Refuses every job.
    struct Refusing;

    impl TaskExecutor for Refusing {
        fn submit(&self, job: Job) -> Result<(), SubmitError> {
            Err(SubmitError {
                job,
                reason: "closed".to_string(),
            })
        }

        fn worker_count(&self) -> usize {
            0
        }
    }

    fn sign_tasks(keypair: &KeyPair) -> Vec<SignTask> {
        vec![
            SignTask {
                id: "a".to_string(),
                message: "first".to_string(),
                private_key: keypair.private_key.clone(),
            },
            SignTask {
                id: "b".to_string(),
                message: "second".to_string(),
                private_key: "garbage".to_string(),
            },
            SignTask {
                id: "c".to_string(),
                message: "third".to_string(),
                private_key: keypair.private_key.clone(),
            },
        ]
    }

    #[test]
    fn test_inline_batch_sign_partial_failure() {
        let service = CryptoService::new();
        let keypair = service.generate_key_pair().unwrap();
        let results = service.batch_sign(sign_tasks(&keypair));

        assert_eq!(results.len(), 3);
        assert!(results[0].success());
        assert!(!results[1].success());
        assert!(results[2].success());
        assert_eq!(results[1].id, "b");
        assert!(matches!(results[1].error(), Some(CryptoError::InvalidPrivateKey(_))));

        let snap = service.metrics().snapshot();
        assert_eq!(snap.signatures, 2);
        assert_eq!(snap.failures, 1);
        assert_eq!(snap.inline_tasks, 3);
    }

    #[test]
    fn test_offloaded_and_inline_paths_agree() {
        let keypair = crate::crypto::generate_key_pair().unwrap();
        let inline = CryptoService::new();
        let pooled = CryptoService::new().with_executor(Arc::new(WorkerPool::new(2).unwrap()));
        assert_eq!(pooled.strategy(), ExecutionStrategy::Offload);

        let hashes: Vec<HashTask> = (0..16)
            .map(|i| HashTask {
                id: format!("h{}", i),
                message: format!("message {}", i),
            })
            .collect();
        assert_eq!(inline.batch_hash(hashes.clone()), pooled.batch_hash(hashes));

        // RFC 6979 signatures are deterministic, so both paths match byte for byte.
        assert_eq!(
            inline.batch_sign(sign_tasks(&keypair)),
            pooled.batch_sign(sign_tasks(&keypair))
        );
        assert!(pooled.metrics().snapshot().offloaded_tasks >= 16);
    }

    #[test]
    fn test_batch_verify_correlates_by_id() {
        let service = CryptoService::new().with_executor(Arc::new(WorkerPool::new(3).unwrap()));
        let keypair = service.generate_key_pair().unwrap();
        let signature = service.sign("payload", &keypair.private_key).unwrap();

        let tasks = vec![
            VerifyTask {
                id: "good".to_string(),
                signature: signature.clone(),
                message: "payload".to_string(),
                public_key: keypair.public_key.clone(),
            },
            VerifyTask {
                id: "tampered".to_string(),
                signature: signature.clone(),
                message: "payload!".to_string(),
                public_key: keypair.public_key.clone(),
            },
            VerifyTask {
                id: "malformed".to_string(),
                signature: "???".to_string(),
                message: "payload".to_string(),
                public_key: keypair.public_key.clone(),
            },
        ];

        let results = service.batch_verify(tasks);
        let by_id = |id: &str| results.iter().find(|r| r.id == id).unwrap().outcome.clone();
        assert_eq!(by_id("good"), Ok(true));
        assert_eq!(by_id("tampered"), Ok(false));
        assert_eq!(by_id("malformed"), Ok(false));
    }

    #[test]
    fn test_refused_tasks_fall_back_inline() {
        let service = CryptoService::new().with_executor(Arc::new(Refusing));
        let results = service.batch_hash(vec![HashTask {
            id: "x".to_string(),
            message: "abc".to_string(),
        }]);
        assert_eq!(results[0].result(), Some(&crate::crypto::hash("abc")));

        let snap = service.metrics().snapshot();
        assert_eq!(snap.fallbacks, 1);
        assert_eq!(snap.offloaded_tasks, 0);
    }

    #[test]
    fn test_stalled_task_times_out_independently() {
        let service = CryptoService::new()
            .with_executor(Arc::new(BlackHole::default()))
            .with_task_timeout(Duration::from_millis(20));
        let results = service.batch_hash(vec![
            HashTask {
                id: "one".to_string(),
                message: "a".to_string(),
            },
            HashTask {
                id: "two".to_string(),
                message: "b".to_string(),
            },
        ]);

        assert_eq!(results.len(), 2);
        for result in &results {
            assert!(matches!(result.error(), Some(CryptoError::TaskTimeout { .. })));
        }
        assert_eq!(service.metrics().snapshot().timeouts, 2);
    }
}
