use super::*;
use crate::domain::{commit_channel, CommitReceipt, CommitSender, ServiceError};
use crate::ports::{tx_inbox, TxSender};
use crate::SubmissionError;
use async_trait::async_trait;
use shared_types::{Block, StateDigest};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::timeout;

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

// Mock implementations for testing

#[derive(Clone, Default)]
struct ProxyLog {
    submitted: Arc<Mutex<Vec<Transaction>>>,
    attempts: Arc<AtomicU64>,
}

impl ProxyLog {
    fn submitted(&self) -> Vec<Transaction> {
        self.submitted.lock().unwrap().clone()
    }
}

struct MockProxy {
    log: ProxyLog,
    reject: Option<Transaction>,
    commit_rx: Option<CommitReceiver>,
}

impl MockProxy {
    fn new() -> (Self, CommitSender, ProxyLog) {
        let (commit_tx, commit_rx) = commit_channel(16);
        let log = ProxyLog::default();
        let proxy = Self {
            log: log.clone(),
            reject: None,
            commit_rx: Some(commit_rx),
        };
        (proxy, commit_tx, log)
    }

    fn rejecting(mut self, tx: impl Into<Transaction>) -> Self {
        self.reject = Some(tx.into());
        self
    }
}

#[async_trait]
impl ConsensusProxy for MockProxy {
    async fn submit_tx(&self, tx: Transaction) -> Result<(), SubmissionError> {
        self.log.attempts.fetch_add(1, Ordering::SeqCst);
        if self.reject.as_ref() == Some(&tx) {
            return Err(SubmissionError::Transport("proxy down".into()));
        }
        self.log.submitted.lock().unwrap().push(tx);
        Ok(())
    }

    fn commit_receiver(&mut self) -> Option<CommitReceiver> {
        self.commit_rx.take()
    }
}

#[derive(Clone, Default)]
struct ExecLog {
    applied: Arc<Mutex<Vec<u64>>>,
    overlaps: Arc<AtomicU64>,
    in_flight: Arc<AtomicBool>,
}

impl ExecLog {
    fn applied(&self) -> Vec<u64> {
        self.applied.lock().unwrap().clone()
    }
}

#[derive(Default)]
struct MockExecutor {
    log: ExecLog,
    failures: HashMap<u64, ExecutionError>,
    fail_all: bool,
    delay: Duration,
    entered: Option<Arc<Notify>>,
}

fn digest_for(index: u64) -> StateDigest {
    StateDigest::new([index as u8 + 1; 32])
}

impl StateExecutor for MockExecutor {
    fn process_block(&mut self, block: &Block) -> Result<StateDigest, ExecutionError> {
        if self.log.in_flight.swap(true, Ordering::SeqCst) {
            self.log.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        if let Some(entered) = &self.entered {
            entered.notify_one();
        }
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.log.applied.lock().unwrap().push(block.index());
        self.log.in_flight.store(false, Ordering::SeqCst);

        if self.fail_all {
            return Err(ExecutionError::InvalidTransition("bad state".into()));
        }
        match self.failures.get(&block.index()) {
            Some(err) => Err(err.clone()),
            None => Ok(digest_for(block.index())),
        }
    }
}

fn build_engine(
    proxy: MockProxy,
    executor: MockExecutor,
    config: EngineConfig,
) -> (ReplicationEngine<MockProxy, MockExecutor>, TxSender) {
    let (tx_sender, inbox) = tx_inbox();
    let engine = ReplicationEngine::new(EngineDependencies {
        proxy,
        executor,
        service: None::<NoopService>,
        inbox,
        config,
        span: tracing::info_span!("test-engine"),
    })
    .expect("engine construction");
    (engine, tx_sender)
}

async fn send_commit(commits: &CommitSender, index: u64) -> CommitReceipt {
    let (commit, receipt) = Commit::new(Block::new(index, index, vec![]));
    commits.send(commit).await.expect("commit stream open");
    receipt
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    timeout(TEST_TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn acknowledged(receipt: CommitReceipt) -> Result<StateDigest, ExecutionError> {
    timeout(TEST_TIMEOUT, receipt.wait())
        .await
        .expect("acknowledgment timed out")
        .expect("responder dropped")
}

// =============================================================================
// Transaction path
// =============================================================================

#[tokio::test]
async fn test_transactions_forwarded_in_order() {
    let (proxy, _commits, log) = MockProxy::new();
    let (engine, tx_sender) = build_engine(proxy, MockExecutor::default(), EngineConfig::default());
    let handle = engine.handle();

    tx_sender.send(Transaction::from("tx1")).unwrap();
    tx_sender.send(Transaction::from("tx2")).unwrap();

    let task = tokio::spawn(engine.run());
    wait_until(|| handle.metrics().txs_forwarded == 2).await;

    assert_eq!(
        log.submitted(),
        vec![Transaction::from("tx1"), Transaction::from("tx2")]
    );

    handle.shutdown();
    assert!(task.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_submission_failure_does_not_block_next_transaction() {
    let (proxy, commits, log) = MockProxy::new();
    let proxy = proxy.rejecting("bad");
    let (engine, tx_sender) = build_engine(proxy, MockExecutor::default(), EngineConfig::default());
    let handle = engine.handle();
    let task = tokio::spawn(engine.run());

    tx_sender.send(Transaction::from("bad")).unwrap();
    tx_sender.send(Transaction::from("good")).unwrap();
    wait_until(|| log.attempts.load(Ordering::SeqCst) == 2).await;

    // A commit right after the failure is still serviced.
    let receipt = send_commit(&commits, 0).await;
    assert_eq!(acknowledged(receipt).await, Ok(digest_for(0)));

    assert_eq!(log.submitted(), vec![Transaction::from("good")]);
    let metrics = handle.metrics();
    assert_eq!(metrics.submit_failures, 1);
    assert_eq!(metrics.txs_forwarded, 1);

    handle.shutdown();
    assert!(task.await.unwrap().is_ok());
}

// =============================================================================
// Commit path
// =============================================================================

#[tokio::test]
async fn test_commits_acknowledged_in_order_with_digests() {
    let (proxy, commits, _log) = MockProxy::new();
    let executor = MockExecutor::default();
    let exec_log = executor.log.clone();
    let (engine, _tx_sender) = build_engine(proxy, executor, EngineConfig::default());
    let handle = engine.handle();

    let r0 = send_commit(&commits, 0).await;
    let r1 = send_commit(&commits, 1).await;
    let task = tokio::spawn(engine.run());

    assert_eq!(acknowledged(r0).await, Ok(digest_for(0)));
    assert_eq!(acknowledged(r1).await, Ok(digest_for(1)));
    assert_eq!(exec_log.applied(), vec![0, 1]);
    assert_eq!(handle.metrics().last_applied_index, Some(1));

    handle.shutdown();
    assert!(task.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_execution_error_is_acknowledged_and_loop_continues() {
    let (proxy, commits, _log) = MockProxy::new();
    let bad_state = ExecutionError::InvalidTransition("bad state".into());
    let mut executor = MockExecutor::default();
    executor.failures.insert(0, bad_state.clone());
    let (engine, _tx_sender) = build_engine(proxy, executor, EngineConfig::default());
    let handle = engine.handle();
    let task = tokio::spawn(engine.run());

    let r0 = send_commit(&commits, 0).await;
    assert_eq!(acknowledged(r0).await, Err(bad_state));

    let r1 = send_commit(&commits, 1).await;
    assert_eq!(acknowledged(r1).await, Ok(digest_for(1)));

    let metrics = handle.metrics();
    assert_eq!(metrics.execution_failures, 1);
    assert_eq!(metrics.commits_applied, 1);

    handle.shutdown();
    assert!(task.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_simultaneous_transaction_and_commit_both_serviced() {
    let (proxy, commits, log) = MockProxy::new();
    let (engine, tx_sender) = build_engine(proxy, MockExecutor::default(), EngineConfig::default());
    let handle = engine.handle();

    tx_sender.send(Transaction::from("tx")).unwrap();
    let receipt = send_commit(&commits, 0).await;
    let task = tokio::spawn(engine.run());

    assert_eq!(acknowledged(receipt).await, Ok(digest_for(0)));
    wait_until(|| handle.metrics().txs_forwarded == 1).await;
    assert_eq!(log.submitted(), vec![Transaction::from("tx")]);

    handle.shutdown();
    assert!(task.await.unwrap().is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_process_block_never_overlaps_under_interleaving() {
    let (proxy, commits, log) = MockProxy::new();
    let executor = MockExecutor {
        delay: Duration::from_millis(1),
        ..Default::default()
    };
    let exec_log = executor.log.clone();
    let (engine, tx_sender) = build_engine(proxy, executor, EngineConfig::default());
    let handle = engine.handle();
    let task = tokio::spawn(engine.run());

    let producer = tokio::spawn(async move {
        for i in 0..50u32 {
            tx_sender.send(Transaction::new(i.to_be_bytes().to_vec())).unwrap();
            tokio::task::yield_now().await;
        }
        tx_sender
    });

    let mut receipts = Vec::new();
    for index in 0..50 {
        receipts.push(send_commit(&commits, index).await);
    }
    for (index, receipt) in receipts.into_iter().enumerate() {
        assert_eq!(acknowledged(receipt).await, Ok(digest_for(index as u64)));
    }
    let _tx_sender = producer.await.unwrap();
    wait_until(|| handle.metrics().txs_forwarded == 50).await;

    assert_eq!(exec_log.overlaps.load(Ordering::SeqCst), 0);
    assert_eq!(exec_log.applied(), (0..50).collect::<Vec<u64>>());
    let expected: Vec<Transaction> = (0..50u32)
        .map(|i| Transaction::new(i.to_be_bytes().to_vec()))
        .collect();
    assert_eq!(log.submitted(), expected);

    handle.shutdown();
    assert!(task.await.unwrap().is_ok());
}

// =============================================================================
// Shutdown and termination
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_waits_for_in_flight_commit() {
    let (proxy, commits, _log) = MockProxy::new();
    let entered = Arc::new(Notify::new());
    let executor = MockExecutor {
        delay: Duration::from_millis(100),
        entered: Some(Arc::clone(&entered)),
        ..Default::default()
    };
    let (engine, _tx_sender) = build_engine(proxy, executor, EngineConfig::default());
    let handle = engine.handle();
    let task = tokio::spawn(engine.run());

    let receipt = send_commit(&commits, 0).await;
    timeout(TEST_TIMEOUT, entered.notified()).await.unwrap();
    handle.shutdown();

    assert!(task.await.unwrap().is_ok());
    assert_eq!(acknowledged(receipt).await, Ok(digest_for(0)));
}

#[tokio::test]
async fn test_shutdown_before_run_returns_immediately() {
    let (proxy, _commits, _log) = MockProxy::new();
    let (engine, _tx_sender) = build_engine(proxy, MockExecutor::default(), EngineConfig::default());
    engine.handle().shutdown();

    let result = timeout(TEST_TIMEOUT, engine.run()).await.unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_loop_exits_when_both_sources_close() {
    let (proxy, commits, _log) = MockProxy::new();
    let (engine, tx_sender) = build_engine(proxy, MockExecutor::default(), EngineConfig::default());
    drop(tx_sender);
    drop(commits);

    let result = timeout(TEST_TIMEOUT, engine.run()).await.unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_commits_still_applied_after_inbox_closes() {
    let (proxy, commits, _log) = MockProxy::new();
    let (engine, tx_sender) = build_engine(proxy, MockExecutor::default(), EngineConfig::default());
    let handle = engine.handle();
    drop(tx_sender);
    let task = tokio::spawn(engine.run());

    let receipt = send_commit(&commits, 0).await;
    assert_eq!(acknowledged(receipt).await, Ok(digest_for(0)));

    handle.shutdown();
    assert!(task.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_escalates_after_consecutive_failures() {
    let (proxy, commits, _log) = MockProxy::new();
    let executor = MockExecutor {
        fail_all: true,
        ..Default::default()
    };
    let config = EngineConfig {
        max_consecutive_execution_failures: Some(2),
    };
    let (engine, _tx_sender) = build_engine(proxy, executor, config.clone());
    assert_eq!(engine.config(), &config);
    let task = tokio::spawn(engine.run());

    let r0 = send_commit(&commits, 0).await;
    let r1 = send_commit(&commits, 1).await;
    assert!(acknowledged(r0).await.is_err());
    assert!(acknowledged(r1).await.is_err());

    match task.await.unwrap() {
        Err(EngineError::ExecutionDiverged {
            consecutive_failures,
            ..
        }) => assert_eq!(consecutive_failures, 2),
        other => panic!("expected ExecutionDiverged, got {:?}", other),
    }
}

#[tokio::test]
async fn test_success_resets_failure_streak() {
    let (proxy, commits, _log) = MockProxy::new();
    let mut executor = MockExecutor::default();
    let err = ExecutionError::Storage("disk".into());
    executor.failures.insert(0, err.clone());
    executor.failures.insert(2, err.clone());
    let config = EngineConfig {
        max_consecutive_execution_failures: Some(2),
    };
    let (engine, _tx_sender) = build_engine(proxy, executor, config);
    let handle = engine.handle();
    let task = tokio::spawn(engine.run());

    for index in 0..4 {
        let receipt = send_commit(&commits, index).await;
        acknowledged(receipt).await.ok();
    }
    assert_eq!(handle.metrics().commits_acknowledged(), 4);
    assert!(!task.is_finished());

    handle.shutdown();
    assert!(task.await.unwrap().is_ok());
}

// =============================================================================
// Construction and service lifecycle
// =============================================================================

#[test]
fn test_construction_fails_without_commit_stream() {
    let (mut proxy, _commits, _log) = MockProxy::new();
    let _taken = proxy.commit_receiver();
    let (_tx_sender, inbox) = tx_inbox();

    let result = ReplicationEngine::new(EngineDependencies {
        proxy,
        executor: MockExecutor::default(),
        service: None::<NoopService>,
        inbox,
        config: EngineConfig::default(),
        span: Span::none(),
    });
    assert!(matches!(
        result,
        Err(ConstructionError::CommitStreamUnavailable)
    ));
}

struct OneShotService {
    sender: TxSender,
    payload: &'static str,
}

#[async_trait]
impl ApplicationService for OneShotService {
    async fn run(self) -> Result<(), ServiceError> {
        self.sender
            .send(Transaction::from(self.payload))
            .map_err(|e| ServiceError::Stopped(e.to_string()))?;
        // Keep the inbox open like a long-running service would.
        std::future::pending::<()>().await;
        Ok(())
    }
}

#[tokio::test]
async fn test_service_started_and_feeds_inbox() {
    let (proxy, _commits, log) = MockProxy::new();
    let (tx_sender, inbox) = tx_inbox();
    let engine = ReplicationEngine::new(EngineDependencies {
        proxy,
        executor: MockExecutor::default(),
        service: Some(OneShotService {
            sender: tx_sender,
            payload: "from-service",
        }),
        inbox,
        config: EngineConfig::default(),
        span: Span::none(),
    })
    .unwrap();
    let handle = engine.handle();
    let task = tokio::spawn(engine.run());

    wait_until(|| handle.metrics().txs_forwarded == 1).await;
    assert_eq!(log.submitted(), vec![Transaction::from("from-service")]);

    handle.shutdown();
    assert!(task.await.unwrap().is_ok());
}
