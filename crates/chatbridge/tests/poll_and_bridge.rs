//! Polling-loop and orchestration behavior against scripted conversation
//! sources, on paused tokio time so every run is instant and deterministic.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chatbridge::{
    BridgeConfig, BridgeError, ChatBridge, ConversationSource, DesktopDriver, ExtractError,
    Extraction, ExtractionMeta, PollConfig, ResponsePoller,
};

fn extraction(items: &[&str]) -> Extraction {
    let messages: Vec<String> = items.iter().map(|s| s.to_string()).collect();
    Extraction {
        meta: ExtractionMeta {
            elapsed_ms: 0,
            nodes_visited: 0,
            message_count: messages.len(),
        },
        messages,
    }
}

/// Replays a fixed sequence of reads; repeats the final entry once the
/// script runs out.
#[derive(Debug)]
struct ScriptedSource {
    script: Vec<Result<Extraction, ExtractError>>,
    cursor: usize,
}

impl ScriptedSource {
    fn new(script: Vec<Result<Extraction, ExtractError>>) -> Self {
        Self { script, cursor: 0 }
    }
}

impl ConversationSource for ScriptedSource {
    fn snapshot(&mut self) -> Result<Extraction, ExtractError> {
        let index = self.cursor.min(self.script.len() - 1);
        self.cursor += 1;
        self.script[index].clone()
    }
}

fn fast_poll() -> PollConfig {
    PollConfig {
        check_interval: Duration::from_millis(1000),
        stable_checks: 2,
        max_wait: Duration::from_millis(60_000),
    }
}

#[tokio::test(start_paused = true)]
async fn response_resolves_once_it_stops_changing() {
    let source = ScriptedSource::new(vec![
        Ok(extraction(&[])),
        Ok(extraction(&["what is a trait?"])),
        Ok(extraction(&["what is a trait?", "A trait"])),
        Ok(extraction(&["what is a trait?", "A trait is a shared interface."])),
        Ok(extraction(&["what is a trait?", "A trait is a shared interface."])),
        Ok(extraction(&["what is a trait?", "A trait is a shared interface."])),
    ]);

    let poller = ResponsePoller::new(fast_poll());
    let (outcome, _source) = poller
        .wait_for_response(source, "what is a trait?")
        .await
        .unwrap();

    assert_eq!(
        outcome.response.as_deref(),
        Some("A trait is a shared interface.")
    );
    assert!(!outcome.timed_out);
    assert_eq!(outcome.ui_reads, 6);
    assert_eq!(outcome.checks, 6);
    // Five sleeps of the check interval elapsed before the stable read.
    assert_eq!(outcome.waiting_time, Duration::from_millis(5000));
}

#[tokio::test(start_paused = true)]
async fn wrong_conversation_aborts_with_mismatch() {
    let source = ScriptedSource::new(vec![Ok(extraction(&[
        "How do I sort an array in JavaScript?",
        "Use Array.prototype.sort.",
    ]))]);

    let poller = ResponsePoller::new(fast_poll());
    let err = poller
        .wait_for_response(source, "Explain foo()")
        .await
        .unwrap_err();

    match err {
        BridgeError::ConversationMismatch { expected, found } => {
            assert_eq!(expected, "Explain foo()");
            assert!(found.starts_with("How do I sort an array"));
        }
        other => panic!("expected mismatch, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn timeout_returns_the_best_candidate_so_far() {
    let source = ScriptedSource::new(vec![Ok(extraction(&["q", "partial answer"]))]);

    let poller = ResponsePoller::new(PollConfig {
        check_interval: Duration::from_millis(1000),
        stable_checks: 5,
        max_wait: Duration::from_millis(2000),
    });
    let (outcome, _source) = poller.wait_for_response(source, "q").await.unwrap();

    assert!(outcome.timed_out);
    assert_eq!(outcome.response.as_deref(), Some("partial answer"));
    assert_eq!(outcome.ui_reads, 2);
    assert_eq!(outcome.waiting_time, Duration::from_millis(2000));
}

#[tokio::test(start_paused = true)]
async fn timeout_with_no_candidate_yields_none() {
    let source = ScriptedSource::new(vec![Ok(extraction(&[]))]);

    let poller = ResponsePoller::new(PollConfig {
        check_interval: Duration::from_millis(1000),
        stable_checks: 2,
        max_wait: Duration::from_millis(3000),
    });
    let (outcome, _source) = poller.wait_for_response(source, "q").await.unwrap();

    assert!(outcome.timed_out);
    assert!(outcome.response.is_none());
    assert_eq!(outcome.ui_reads, 3);
    assert_eq!(outcome.checks, 3);
}

#[tokio::test(start_paused = true)]
async fn transient_read_errors_are_retried_not_fatal() {
    let source = ScriptedSource::new(vec![
        Err(ExtractError::Read("AX timeout".into())),
        Ok(extraction(&["q", "the answer"])),
        Err(ExtractError::NoWindow),
        Ok(extraction(&["q", "the answer"])),
        Ok(extraction(&["q", "the answer"])),
    ]);

    let poller = ResponsePoller::new(fast_poll());
    let (outcome, _source) = poller.wait_for_response(source, "q").await.unwrap();

    assert_eq!(outcome.response.as_deref(), Some("the answer"));
    // Failed reads count as reads but never advance the state machine.
    assert_eq!(outcome.ui_reads, 5);
    assert_eq!(outcome.checks, 3);
}

#[derive(Default)]
struct CallLog {
    focused: bool,
    opened_new_conversation: bool,
    sent: Option<String>,
}

/// In-memory driver: records the automation calls and serves a scripted
/// conversation.
struct FakeDriver {
    running: bool,
    source: ScriptedSource,
    log: Arc<Mutex<CallLog>>,
}

impl ConversationSource for FakeDriver {
    fn snapshot(&mut self) -> Result<Extraction, ExtractError> {
        self.source.snapshot()
    }
}

impl DesktopDriver for FakeDriver {
    fn ensure_running(&mut self) -> Result<(), BridgeError> {
        if self.running {
            Ok(())
        } else {
            Err(BridgeError::AppNotRunning("ChatGPT".into()))
        }
    }

    fn focus(&mut self) -> Result<(), BridgeError> {
        self.log.lock().unwrap().focused = true;
        Ok(())
    }

    fn new_conversation(&mut self) -> Result<(), BridgeError> {
        self.log.lock().unwrap().opened_new_conversation = true;
        Ok(())
    }

    fn send_message(&mut self, message: &str) -> Result<(), BridgeError> {
        self.log.lock().unwrap().sent = Some(message.to_string());
        Ok(())
    }
}

fn bridge_config() -> BridgeConfig {
    BridgeConfig {
        poll: PollConfig {
            check_interval: Duration::from_millis(100),
            stable_checks: 1,
            max_wait: Duration::from_millis(10_000),
        },
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn query_runs_the_full_exchange() {
    let log = Arc::new(Mutex::new(CallLog::default()));
    let sent_text = "Explain lifetimes";
    let driver = FakeDriver {
        running: true,
        source: ScriptedSource::new(vec![
            Ok(extraction(&[sent_text])),
            Ok(extraction(&[sent_text, "Lifetimes tie"])),
            Ok(extraction(&[sent_text, "Lifetimes tie borrows to scopes."])),
            Ok(extraction(&[sent_text, "Lifetimes tie borrows to scopes."])),
        ]),
        log: Arc::clone(&log),
    };

    let mut bridge = ChatBridge::new(driver, bridge_config());
    let outcome = bridge.query(sent_text, true).await.unwrap();

    assert!(outcome.success);
    assert_eq!(
        outcome.response.as_deref(),
        Some("Lifetimes tie borrows to scopes.")
    );
    assert!(outcome.error.is_none());
    assert_eq!(outcome.message, sent_text);
    assert_eq!(outcome.metrics.ui_reads, 4);

    let log = log.lock().unwrap();
    assert!(log.focused);
    assert!(log.opened_new_conversation);
    assert_eq!(log.sent.as_deref(), Some(sent_text));
}

#[tokio::test(start_paused = true)]
async fn query_can_continue_the_current_conversation() {
    let log = Arc::new(Mutex::new(CallLog::default()));
    let driver = FakeDriver {
        running: true,
        source: ScriptedSource::new(vec![
            Ok(extraction(&["follow-up", "ack"])),
            Ok(extraction(&["follow-up", "ack"])),
        ]),
        log: Arc::clone(&log),
    };

    let mut bridge = ChatBridge::new(driver, bridge_config());
    let outcome = bridge.query("follow-up", false).await.unwrap();

    assert!(outcome.success);
    assert!(!log.lock().unwrap().opened_new_conversation);
}

#[tokio::test(start_paused = true)]
async fn query_fails_fast_when_the_app_is_not_running() {
    let driver = FakeDriver {
        running: false,
        source: ScriptedSource::new(vec![Ok(extraction(&[]))]),
        log: Arc::new(Mutex::new(CallLog::default())),
    };

    let mut bridge = ChatBridge::new(driver, bridge_config());
    let err = bridge.query("hello", true).await.unwrap_err();

    assert!(matches!(err, BridgeError::AppNotRunning(_)));
    assert_eq!(err.to_string(), "ChatGPT not running");
}

#[tokio::test(start_paused = true)]
async fn query_soft_fails_when_the_response_never_settles() {
    // Every read shows a different candidate, so stability is unreachable.
    let script: Vec<_> = (0..200)
        .map(|i| Ok(extraction(&["q", &format!("draft {i}")])))
        .collect();
    let driver = FakeDriver {
        running: true,
        source: ScriptedSource::new(script),
        log: Arc::new(Mutex::new(CallLog::default())),
    };

    let mut config = bridge_config();
    config.poll.max_wait = Duration::from_millis(1000);
    config.poll.check_interval = Duration::from_millis(100);

    let mut bridge = ChatBridge::new(driver, config);
    let outcome = bridge.query("q", false).await.unwrap();

    // A moving response still counts as captured, but the run reports the
    // timeout path rather than clean success.
    assert!(outcome.success);
    assert!(outcome.response.is_some());
    assert!(outcome.error.is_none());

    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["success"], true);
    assert!(json["metrics"]["uiReads"].as_u64().unwrap() >= 2);
}

/// Driver whose reads park the calling thread, the way a wedged
/// accessibility call does.
struct WedgedDriver {
    block_for: Duration,
}

impl ConversationSource for WedgedDriver {
    fn snapshot(&mut self) -> Result<Extraction, ExtractError> {
        std::thread::sleep(self.block_for);
        Ok(extraction(&[]))
    }
}

impl DesktopDriver for WedgedDriver {
    fn ensure_running(&mut self) -> Result<(), BridgeError> {
        Ok(())
    }

    fn focus(&mut self) -> Result<(), BridgeError> {
        Ok(())
    }

    fn new_conversation(&mut self) -> Result<(), BridgeError> {
        Ok(())
    }

    fn send_message(&mut self, _message: &str) -> Result<(), BridgeError> {
        Ok(())
    }
}

// Real time on purpose: the paused clock does not advance while a blocking
// call is in flight, and this test is about wall-clock enforcement.
#[tokio::test]
async fn hard_deadline_preempts_a_blocked_read() {
    let driver = WedgedDriver {
        block_for: Duration::from_millis(800),
    };
    let mut config = bridge_config();
    config.poll.max_wait = Duration::from_millis(100);
    config.poll.check_interval = Duration::from_millis(50);
    config.hard_timeout_grace = Duration::from_millis(100);

    let started = std::time::Instant::now();
    let mut bridge = ChatBridge::new(driver, config);
    let err = bridge.query("q", false).await.unwrap_err();
    let elapsed = started.elapsed();

    match err {
        BridgeError::HardTimeout(deadline) => {
            assert_eq!(deadline, Duration::from_millis(200));
        }
        other => panic!("expected hard timeout, got {other:?}"),
    }
    // The deadline fires while the read is still parked, well before the
    // blocked call would have returned.
    assert!(
        elapsed < Duration::from_millis(600),
        "deadline enforcement took {elapsed:?}"
    );

    // The driver is stranded on the parked thread; later queries must not
    // pretend otherwise.
    let err = bridge.query("again", false).await.unwrap_err();
    assert!(matches!(err, BridgeError::Platform(_)));
}

#[tokio::test(start_paused = true)]
async fn bridge_is_reusable_across_queries() {
    let log = Arc::new(Mutex::new(CallLog::default()));
    let driver = FakeDriver {
        running: true,
        source: ScriptedSource::new(vec![
            Ok(extraction(&["ping", "pong"])),
            Ok(extraction(&["ping", "pong"])),
        ]),
        log: Arc::clone(&log),
    };

    let mut bridge = ChatBridge::new(driver, bridge_config());
    let first = bridge.query("ping", false).await.unwrap();
    assert!(first.success);

    // The driver is handed back after a completed poll session.
    let second = bridge.query("ping", false).await.unwrap();
    assert!(second.success);
    assert_eq!(second.response.as_deref(), Some("pong"));
}

#[tokio::test(start_paused = true)]
async fn query_reports_an_error_when_nothing_was_captured() {
    let driver = FakeDriver {
        running: true,
        source: ScriptedSource::new(vec![Ok(extraction(&[]))]),
        log: Arc::new(Mutex::new(CallLog::default())),
    };

    let mut config = bridge_config();
    config.poll.max_wait = Duration::from_millis(500);

    let mut bridge = ChatBridge::new(driver, config);
    let outcome = bridge.query("q", false).await.unwrap();

    assert!(!outcome.success);
    assert!(outcome.response.is_none());
    assert!(outcome.error.is_some());

    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["success"], false);
    assert!(json.get("response").is_none());
}
