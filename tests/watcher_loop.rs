//! Watcher Cycle Tests
//!
//! End-to-end runs of the prompt/record cycle with scripted surfaces and
//! a mock server: a full answered cycle, shutdown while a dialog is on
//! screen, a lapsed question, and a cycle with the store down.

use async_trait::async_trait;
use aw_watcher_ask::config::{QuestionConfig, WatcherConfig};
use aw_watcher_ask::store::build_event;
use aw_watcher_ask::{
    EventRecorder, PromptOutcome, PromptSurface, QuestionDescriptor, RecorderConfig, Watcher,
    WatcherState,
};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Surface that immediately returns a fixed outcome.
struct ScriptedSurface {
    calls: Arc<AtomicUsize>,
    outcome: PromptOutcome,
}

#[async_trait]
impl PromptSurface for ScriptedSurface {
    async fn prompt(&self, _question: &QuestionDescriptor) -> PromptOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone()
    }
}

/// Surface that never answers, standing in for a dialog left on screen.
struct HangingSurface {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl PromptSurface for HangingSurface {
    async fn prompt(&self, _question: &QuestionDescriptor) -> PromptOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(600)).await;
        PromptOutcome::Dismissed
    }
}

fn every_second_question(id: &str) -> QuestionDescriptor {
    let config = WatcherConfig {
        question: QuestionConfig {
            id: id.to_owned(),
            kind: "entry".to_owned(),
            schedule: "* * * * * *".to_owned(),
            ..QuestionConfig::default()
        },
        ..WatcherConfig::default()
    };
    QuestionDescriptor::from_config(&config).expect("valid question")
}

fn recorder_for(server: &MockServer) -> EventRecorder {
    EventRecorder::new(
        RecorderConfig::new(server.uri())
            .with_hostname("testhost")
            .with_timeout_secs(2)
            .with_retry_count(0)
            .with_retry_delay_ms(10),
    )
}

#[tokio::test]
async fn answered_cycle_lands_on_the_server() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/0/buckets/aw-watcher-ask_testhost"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/0/buckets/aw-watcher-ask_testhost/events"))
        .and(body_partial_json(json!({
            "data": {
                "question_id": "focus.check",
                "question_type": "entry",
                "answer": "coding",
                "outcome": "answered"
            }
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1..)
        .mount(&mock_server)
        .await;

    let calls = Arc::new(AtomicUsize::new(0));
    let surface = Arc::new(ScriptedSurface {
        calls: calls.clone(),
        outcome: PromptOutcome::Answered {
            text: "coding".to_owned(),
        },
    });

    let mut watcher = Watcher::new(
        every_second_question("focus.check"),
        surface,
        recorder_for(&mock_server),
    );
    let token = watcher.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1500)).await;
        token.cancel();
    });

    watcher.run().await.expect("run should end cleanly");

    assert!(calls.load(Ordering::SeqCst) >= 1);
    assert_eq!(watcher.state(), WatcherState::Stopped);
}

#[tokio::test]
async fn shutdown_during_prompt_records_a_surface_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/0/buckets/aw-watcher-ask_testhost"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/0/buckets/aw-watcher-ask_testhost/events"))
        .and(body_partial_json(json!({
            "data": {
                "question_id": "hang.check",
                "answer": null,
                "outcome": "surface_failed"
            }
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let calls = Arc::new(AtomicUsize::new(0));
    let surface = Arc::new(HangingSurface {
        calls: calls.clone(),
    });

    let mut watcher = Watcher::new(
        every_second_question("hang.check"),
        surface,
        recorder_for(&mock_server),
    );
    let token = watcher.cancellation_token();
    tokio::spawn(async move {
        // Past the first due tick, so the dialog is on screen by now.
        tokio::time::sleep(Duration::from_millis(1500)).await;
        token.cancel();
    });

    let start = std::time::Instant::now();
    watcher.run().await.expect("run should end cleanly");

    assert!(start.elapsed() < Duration::from_secs(30));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(watcher.state(), WatcherState::Stopped);
}

#[tokio::test]
async fn lapsed_question_never_touches_the_server() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let config = WatcherConfig {
        question: QuestionConfig {
            id: "lapsed.check".to_owned(),
            until: Some("2020-01-01".to_owned()),
            ..QuestionConfig::default()
        },
        ..WatcherConfig::default()
    };
    let question = QuestionDescriptor::from_config(&config).expect("valid question");

    let calls = Arc::new(AtomicUsize::new(0));
    let surface = Arc::new(ScriptedSurface {
        calls: calls.clone(),
        outcome: PromptOutcome::Dismissed,
    });

    let mut watcher = Watcher::new(question, surface, recorder_for(&mock_server));
    watcher.run().await.expect("a lapsed question is a clean end");

    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cycles_survive_an_unreachable_store() {
    // Port unlikely to be in use; every submission fails.
    let recorder = EventRecorder::new(
        RecorderConfig::new("http://127.0.0.1:19999")
            .with_hostname("testhost")
            .with_timeout_secs(1)
            .with_retry_count(0)
            .with_retry_delay_ms(10),
    );

    let calls = Arc::new(AtomicUsize::new(0));
    let surface = Arc::new(ScriptedSurface {
        calls: calls.clone(),
        outcome: PromptOutcome::Answered {
            text: "still here".to_owned(),
        },
    });

    let mut watcher = Watcher::new(every_second_question("outage.check"), surface, recorder);
    let token = watcher.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(2600)).await;
        token.cancel();
    });

    watcher.run().await.expect("run should end cleanly");

    // A dropped event must not stop the schedule: later cycles still fire.
    assert!(calls.load(Ordering::SeqCst) >= 2);
    assert_eq!(watcher.state(), WatcherState::Stopped);
}

#[tokio::test]
async fn event_timestamps_are_utc_rfc3339() {
    // The wire format commitment, independent of any server.
    let config = WatcherConfig {
        question: QuestionConfig {
            id: "wire.check".to_owned(),
            ..QuestionConfig::default()
        },
        ..WatcherConfig::default()
    };
    let question = QuestionDescriptor::from_config(&config).expect("valid question");
    let outcome = PromptOutcome::Answered {
        text: "Yes".to_owned(),
    };
    let answer = aw_watcher_ask::normalize::normalize(&question, &outcome);
    let event = build_event(&question, &outcome, &answer, Utc::now());

    let wire = serde_json::to_value(&event).expect("serializable event");
    let timestamp = wire["timestamp"].as_str().expect("timestamp is a string");
    assert!(timestamp.ends_with('Z') || timestamp.contains("+00:00"));
    assert_eq!(wire["duration"], json!(0.0));
}
