// Pipeline and relay loop tests — policies chained together, and the
// line protocol that feeds them.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use strainer::config::Config;
use strainer::policy::basic::{NoopPolicy, ReadOnlyPolicy, READ_ONLY_MSG};
use strainer::policy::keywords::{KeywordPolicy, KEYWORD_REJECT_MSG};
use strainer::policy::rate_limit::{RateLimitOptions, RateLimitPolicy, RATE_LIMIT_REJECT_MSG};
use strainer::policy::{
    Action, Event, InputMessage, MessageType, OutputMessage, Pipeline, Policy, SourceType,
};
use strainer::relay::{self, RunStats, MALFORMED_REJECT_MSG};
use strainer::store::{CounterStore, MemoryStore};

fn message(id: &str, content: &str) -> InputMessage {
    InputMessage {
        message_type: MessageType::New,
        event: Event {
            id: id.to_string(),
            pubkey: "f00d".to_string(),
            created_at: 1_700_000_000,
            kind: 1,
            tags: vec![],
            content: content.to_string(),
            sig: "beef".to_string(),
        },
        received_at: 1_700_000_001,
        source_type: SourceType::Ip4,
        source_info: "192.0.2.10".to_string(),
    }
}

/// Counts how often it runs; always accepts.
struct Counting(Arc<AtomicUsize>);

#[async_trait]
impl Policy for Counting {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn evaluate(&self, msg: &InputMessage) -> OutputMessage {
        self.0.fetch_add(1, Ordering::SeqCst);
        OutputMessage::accept(&msg.event.id)
    }
}

/// Shadow-rejects everything.
struct Shadow;

#[async_trait]
impl Policy for Shadow {
    fn name(&self) -> &'static str {
        "shadow"
    }

    async fn evaluate(&self, msg: &InputMessage) -> OutputMessage {
        OutputMessage::shadow_reject(&msg.event.id)
    }
}

fn keywords(list: &[&str]) -> KeywordPolicy {
    KeywordPolicy::new(list.iter().map(|w| w.to_string()).collect())
}

// ============================================================
// Ordering and short-circuit
// ============================================================

#[tokio::test]
async fn all_accept_yields_plain_accept() {
    let pipeline = Pipeline::default()
        .with(NoopPolicy)
        .with(keywords(&["spam"]));
    let out = pipeline.evaluate(&message("a", "hello world")).await;
    assert_eq!(out, OutputMessage::accept("a"));
}

#[tokio::test]
async fn first_rejection_wins() {
    let pipeline = Pipeline::default()
        .with(keywords(&["spam"]))
        .with(ReadOnlyPolicy);

    let out = pipeline.evaluate(&message("a", "spam")).await;
    assert_eq!(out.msg, KEYWORD_REJECT_MSG);

    let out = pipeline.evaluate(&message("b", "clean")).await;
    assert_eq!(out.msg, READ_ONLY_MSG);
}

#[tokio::test]
async fn later_policies_do_not_run_after_rejection() {
    let runs = Arc::new(AtomicUsize::new(0));
    let pipeline = Pipeline::default()
        .with(Counting(Arc::clone(&runs)))
        .with(ReadOnlyPolicy)
        .with(Counting(Arc::clone(&runs)));

    pipeline.evaluate(&message("a", "x")).await;
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn shadow_reject_also_short_circuits() {
    let pipeline = Pipeline::default().with(Shadow).with(ReadOnlyPolicy);
    let out = pipeline.evaluate(&message("a", "x")).await;
    assert_eq!(out.action, Action::ShadowReject);
    assert_eq!(out.msg, "");
}

#[tokio::test(start_paused = true)]
async fn keyword_rejection_does_not_consume_rate_limit() {
    let store = Arc::new(MemoryStore::new());
    let pipeline = Pipeline::default().with(keywords(&["spam"])).with(RateLimitPolicy::new(
        store.clone(),
        RateLimitOptions {
            max: 1,
            ..Default::default()
        },
    ));

    for _ in 0..5 {
        let out = pipeline.evaluate(&message("a", "spam")).await;
        assert_eq!(out.msg, KEYWORD_REJECT_MSG);
    }
    assert_eq!(store.count().await.unwrap(), 0);

    assert!(pipeline.evaluate(&message("b", "ok")).await.is_accept());
    let out = pipeline.evaluate(&message("c", "ok")).await;
    assert_eq!(out.msg, RATE_LIMIT_REJECT_MSG);
}

// ============================================================
// Relay loop
// ============================================================

fn line(id: &str, content: &str) -> String {
    serde_json::to_string(&message(id, content)).unwrap()
}

async fn run_lines(pipeline: &Pipeline, input: &str) -> (Vec<OutputMessage>, RunStats) {
    let mut output = Vec::new();
    let stats = relay::run(pipeline, input.as_bytes(), &mut output)
        .await
        .unwrap();
    let verdicts = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    (verdicts, stats)
}

#[tokio::test]
async fn one_verdict_per_line_in_order() {
    let pipeline = Pipeline::default().with(keywords(&["t.me/spam"]));
    let input = [
        line("1", "hello world"),
        line("2", "buy now at t.me/spam"),
        line("3", "gm"),
    ]
    .join("\n");

    let (verdicts, stats) = run_lines(&pipeline, &input).await;

    let ids: Vec<&str> = verdicts.iter().map(|v| v.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2", "3"]);
    assert_eq!(verdicts[0].action, Action::Accept);
    assert_eq!(verdicts[1].action, Action::Reject);
    assert_eq!(verdicts[2].action, Action::Accept);
    assert_eq!(
        stats,
        RunStats {
            accepted: 2,
            rejected: 1,
            malformed: 0
        }
    );
}

#[tokio::test]
async fn malformed_and_blank_lines_are_skipped() {
    let pipeline = Pipeline::default();
    let input = format!("{}\n\n{{not json\n   \n{}\n", line("1", "a"), line("2", "b"));

    let (verdicts, stats) = run_lines(&pipeline, &input).await;

    assert_eq!(verdicts.len(), 2);
    assert_eq!(stats.malformed, 1);
    assert_eq!(stats.accepted, 2);
}

#[tokio::test]
async fn unreadable_message_with_event_id_is_still_answered() {
    let pipeline = Pipeline::default();
    let unknown_source = r#"{"type":"new","event":{"id":"abc","pubkey":"pk","created_at":0,"kind":1,"tags":[],"content":"","sig":""},"receivedAt":0,"sourceType":"Stored","sourceInfo":""}"#;
    let missing_received_at = r#"{"type":"new","event":{"id":"def","pubkey":"pk","created_at":0,"kind":1,"tags":[],"content":"","sig":""},"sourceType":"IP4","sourceInfo":"192.0.2.10"}"#;
    let input = format!(
        "{}\n{unknown_source}\n{{\"event\":{{}}}}\n{missing_received_at}\n{}\n",
        line("1", "a"),
        line("2", "b")
    );

    let (verdicts, stats) = run_lines(&pipeline, &input).await;

    let ids: Vec<&str> = verdicts.iter().map(|v| v.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "abc", "def", "2"]);
    assert_eq!(verdicts[1], OutputMessage::reject("abc", MALFORMED_REJECT_MSG));
    assert_eq!(verdicts[2], OutputMessage::reject("def", MALFORMED_REJECT_MSG));
    assert_eq!(
        stats,
        RunStats {
            accepted: 2,
            rejected: 2,
            malformed: 3
        }
    );
}

#[tokio::test]
async fn output_lines_are_relay_json() {
    let pipeline = Pipeline::default().with(ReadOnlyPolicy);
    let mut output = Vec::new();
    relay::run(&pipeline, line("abc", "x").as_bytes(), &mut output)
        .await
        .unwrap();
    assert_eq!(
        String::from_utf8(output).unwrap(),
        format!(
            "{{\"id\":\"abc\",\"action\":\"reject\",\"msg\":\"{}\"}}\n",
            READ_ONLY_MSG
        )
    );
}

#[tokio::test]
async fn empty_input_produces_no_output() {
    let (verdicts, stats) = run_lines(&Pipeline::default(), "").await;
    assert!(verdicts.is_empty());
    assert_eq!(stats, RunStats::default());
}

// ============================================================
// Config-built pipeline
// ============================================================

#[tokio::test]
async fn configured_pipeline_matches_example_scenarios() {
    let config = Config::from_lookup(|key: &str| match key {
        "STRAINER_POLICIES" => Some("keywords,hellthread".to_string()),
        "STRAINER_BANNED_WORDS" => Some("t.me/spam".to_string()),
        _ => None,
    })
    .unwrap();
    let store: Arc<dyn CounterStore> = Arc::new(MemoryStore::new());
    let pipeline = config.build_pipeline(store).unwrap();

    let out = pipeline.evaluate(&message("1", "hello world")).await;
    assert_eq!(out.action, Action::Accept);

    let out = pipeline.evaluate(&message("2", "buy now at t.me/spam")).await;
    assert_eq!(out.action, Action::Reject);
}
