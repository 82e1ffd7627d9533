//! Tests for turn orchestration against a scripted remote service.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::TimeZone;
use serde_json::{json, Value};

use super::*;
use crate::commands::{CommandError, CommandHandler};
use crate::reducer::NoopObserver;
use crate::repository::{AssetRepository, InMemoryRepository};
use crate::test_support::{
    action, completed, erroring, failed, hanging, message_created, requires, script, text, Call,
    FakeApi,
};
use crate::timeseries::TimeSeriesStore;
use crate::ToolDefinition;

fn default_registry(repo: Arc<InMemoryRepository>) -> CommandRegistry {
    let series = Arc::new(TimeSeriesStore::new(60, Duration::from_secs(60)).with_seed(5));
    CommandRegistry::with_defaults(repo, series)
}

fn orchestrator_with_registry(api: &Arc<FakeApi>, registry: CommandRegistry) -> TurnOrchestrator {
    let sessions = Arc::new(SessionStore::new(api.clone(), Duration::from_secs(1800), 16));
    TurnOrchestrator::new(api.clone(), sessions, Arc::new(registry)).with_assistant_id("asst_1")
}

fn orchestrator_with(api: &Arc<FakeApi>, repo: Arc<InMemoryRepository>) -> TurnOrchestrator {
    orchestrator_with_registry(api, default_registry(repo))
}

/// Cancels the turn from inside a tool batch.
struct CancelsTurn(CancellationToken);

#[async_trait]
impl CommandHandler for CancelsTurn {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "Hangup".into(),
            description: "Cancels the caller".into(),
            parameters: json!({"type": "object"}),
        }
    }

    async fn handle(&self, _raw: &str, _ctx: &mut MessageContext) -> Result<Value, CommandError> {
        self.0.cancel();
        Ok(json!({"ok": true}))
    }
}

fn cancel_runs(api: &FakeApi) -> Vec<Call> {
    api.calls()
        .into_iter()
        .filter(|c| matches!(c, Call::CancelRun { .. }))
        .collect()
}

fn orchestrator(api: &Arc<FakeApi>) -> TurnOrchestrator {
    orchestrator_with(api, Arc::new(InMemoryRepository::seeded()))
}

fn request(session: &str, message: &str) -> TurnRequest {
    TurnRequest::new(Some(session.into()), message)
}

async fn run(orchestrator: &TurnOrchestrator, request: TurnRequest) -> TurnResponse {
    orchestrator
        .run_turn(request, &NoopObserver, &CancellationToken::new())
        .await
        .unwrap()
}

fn appended(api: &FakeApi) -> Vec<String> {
    api.calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::AppendMessage { text, .. } => Some(text),
            _ => None,
        })
        .collect()
}

#[test]
fn prompt_metadata_suffix() {
    let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    assert_eq!(
        append_prompt_metadata("hi", now),
        "hi\n---\nCurrent time: 2024-05-01T12:00:00.000Z"
    );
}

#[tokio::test]
async fn first_turn_creates_one_thread_and_sends_one_message() {
    let api = Arc::new(FakeApi::new().with_runs(vec![script(vec![
        message_created(),
        text("Hi there"),
        completed("run_1"),
    ])]));
    let orchestrator = orchestrator(&api);

    let response = run(&orchestrator, request("s1", "hello")).await;

    assert_eq!(response.session_id.as_str(), "s1");
    assert_eq!(response.content, "Hi there");
    assert_eq!(response.outcome, TurnOutcome::Completed);
    assert!(response.command_results.is_empty());
    assert_eq!(api.created_threads(), 1);

    let messages = appended(&api);
    assert_eq!(messages.len(), 1);
    assert!(messages[0].starts_with("hello\n---\nCurrent time: "));
    assert_eq!(
        api.count(|c| matches!(c, Call::CreateRun { assistant, .. } if assistant == "asst_1")),
        1
    );
    assert!(api.deleted_threads().is_empty());
}

#[tokio::test]
async fn second_turn_reuses_the_thread() {
    let api = Arc::new(FakeApi::new().with_runs(vec![
        script(vec![text("one"), completed("run_1")]),
        script(vec![text("two"), completed("run_2")]),
    ]));
    let orchestrator = orchestrator(&api);

    run(&orchestrator, request("s1", "first")).await;
    let response = run(&orchestrator, request("s1", "second")).await;

    assert_eq!(response.content, "two");
    assert_eq!(api.created_threads(), 1);
    assert_eq!(
        api.count(|c| matches!(c, Call::AppendMessage { thread, .. } if thread == "thread_1")),
        2
    );
}

#[tokio::test]
async fn navigate_to_asset_pause_yields_one_result() {
    let repo = Arc::new(InMemoryRepository::seeded());
    let pump = repo.asset_by_name("Pump 001").await.unwrap();
    let api = Arc::new(FakeApi::new().with_runs(vec![
        script(vec![requires(
            "run_1",
            vec![action("call_1", "NavigateToAsset", r#"{"assetName":"Pump 001"}"#)],
        )]),
        script(vec![text("Opening Pump 001."), completed("run_1")]),
    ]));
    let orchestrator = orchestrator_with(&api, repo);

    let response = run(&orchestrator, request("s1", "show me pump 001")).await;

    assert_eq!(response.command_results.len(), 1);
    assert_eq!(response.command_results[0].command, "NavigateToAsset");
    assert_eq!(
        response.command_results[0].data,
        json!({"assetId": pump.id, "found": true})
    );
    assert_eq!(response.content, "Opening Pump 001.");
    assert_eq!(response.outcome, TurnOutcome::Completed);
}

#[tokio::test]
async fn run_failure_is_content_not_error() {
    let api = Arc::new(
        FakeApi::new().with_runs(vec![script(vec![failed("run_1", "rate limited")])]),
    );
    let orchestrator = orchestrator(&api);

    let response = run(&orchestrator, request("s1", "hello")).await;

    assert!(response.content.contains("[Error] rate limited"));
    assert!(response.command_results.is_empty());
    assert_eq!(response.outcome, TurnOutcome::Failed("rate limited".into()));
    assert!(response.is_failed());
}

#[tokio::test]
async fn unknown_and_known_actions_keep_order() {
    let api = Arc::new(FakeApi::new().with_runs(vec![
        script(vec![requires(
            "run_1",
            vec![
                action("call_1", "Foo", "{}"),
                action("call_2", "SearchProject", r#"{"name":"Project 001"}"#),
            ],
        )]),
        script(vec![completed("run_1")]),
    ]));
    let orchestrator = orchestrator(&api);

    let response = run(&orchestrator, request("s1", "find project 001")).await;

    let submissions = api.submissions();
    assert_eq!(submissions.len(), 1);
    let ids: Vec<_> = submissions[0].iter().map(|o| o.tool_call_id.as_str()).collect();
    assert_eq!(ids, vec!["call_1", "call_2"]);
    assert_eq!(submissions[0][0].payload, "{}");

    assert_eq!(response.command_results.len(), 1);
    assert_eq!(response.command_results[0].command, "SearchProject");
    assert_eq!(response.command_results[0].data["found"], true);
}

#[tokio::test]
async fn results_and_context_span_every_pause() {
    let api = Arc::new(FakeApi::new().with_runs(vec![
        script(vec![
            text("Finding the subscription. "),
            requires(
                "run_1",
                vec![action("call_1", "SearchSubscription", r#"{"name":"Subscription 002"}"#)],
            ),
        ]),
        script(vec![
            text("Now the project. "),
            requires(
                "run_1",
                vec![action("call_2", "SearchProject", r#"{"name":"Project 002"}"#)],
            ),
        ]),
        script(vec![text("Done."), completed("run_1")]),
    ]));
    let orchestrator = orchestrator(&api);

    let response = run(&orchestrator, request("s1", "open project 002")).await;

    assert_eq!(
        response.content,
        "Finding the subscription. Now the project. Done."
    );
    let commands: Vec<_> = response
        .command_results
        .iter()
        .map(|r| r.command.as_str())
        .collect();
    assert_eq!(commands, vec!["SearchSubscription", "SearchProject"]);
    assert_eq!(
        response.command_results[0].data["subscriptionId"],
        response.command_results[1].data["subscriptionId"]
    );
    assert_eq!(response.command_results[1].data["found"], true);
    assert_eq!(api.submissions().len(), 2);
}

#[tokio::test]
async fn one_shot_turn_deletes_its_thread() {
    let api = Arc::new(FakeApi::new().with_runs(vec![script(vec![
        text("ok"),
        completed("run_1"),
    ])]));
    let orchestrator = orchestrator(&api);

    let response = run(&orchestrator, TurnRequest::new(None, "hello")).await;

    assert!(!response.session_id.as_str().is_empty());
    assert_eq!(api.deleted_threads(), vec!["thread_1".to_string()]);
    assert!(orchestrator.sessions().is_empty().await);
    assert!(orchestrator
        .sessions()
        .lookup(&response.session_id)
        .await
        .is_none());
}

#[tokio::test]
async fn transport_error_propagates() {
    let api = Arc::new(FakeApi::new().with_runs(vec![erroring(
        vec![text("partial")],
        EngineError::Network("connection reset".into()),
    )]));
    let orchestrator = orchestrator(&api);

    let err = orchestrator
        .run_turn(request("s1", "hello"), &NoopObserver, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Network(_)));
    let lease = orchestrator.sessions().lookup(&"s1".into()).await.unwrap();
    assert!(!lease.entry().is_busy());
}

#[tokio::test]
async fn thread_creation_failure_propagates() {
    let api = Arc::new(FakeApi::new().failing_create());
    let orchestrator = orchestrator(&api);

    let err = orchestrator
        .run_turn(request("s1", "hello"), &NoopObserver, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::SessionUnavailable { .. }));
    assert!(appended(&api).is_empty());
}

#[tokio::test]
async fn missing_assistant_is_rejected_before_any_call() {
    let api = Arc::new(FakeApi::new());
    let orchestrator = orchestrator(&api).with_assistant_id("");

    let err = orchestrator
        .run_turn(request("s1", "hello"), &NoopObserver, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::MissingAssistant));
    assert!(api.calls().is_empty());
}

#[tokio::test]
async fn request_assistant_overrides_default() {
    let api = Arc::new(FakeApi::new().with_runs(vec![script(vec![completed("run_1")])]));
    let orchestrator = orchestrator(&api);

    run(
        &orchestrator,
        request("s1", "hello").with_assistant("asst_other"),
    )
    .await;

    assert_eq!(
        api.count(|c| matches!(c, Call::CreateRun { assistant, .. } if assistant == "asst_other")),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_observing() {
    let api = Arc::new(FakeApi::new().with_runs(vec![hanging(vec![text("thinking")])]));
    let orchestrator = orchestrator(&api);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let err = orchestrator
        .run_turn(request("s1", "hello"), &NoopObserver, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Cancelled));
    let lease = orchestrator.sessions().lookup(&"s1".into()).await.unwrap();
    assert!(!lease.entry().is_busy());
    assert!(api.deleted_threads().is_empty());
}

#[tokio::test(start_paused = true)]
async fn silent_run_fails_after_idle_timeout() {
    let api = Arc::new(FakeApi::new().with_runs(vec![hanging(vec![text("thinking")])]));
    let orchestrator = orchestrator(&api)
        .with_reducer(Reducer::new("/api/file", Duration::from_secs(5)));

    let response = run(&orchestrator, request("s1", "hello")).await;

    assert!(response.is_failed());
    assert!(response.content.starts_with("thinking[Error] "));
}

#[tokio::test]
async fn tool_round_limit_fails_the_turn() {
    let pause = |id: &str| {
        script(vec![requires(
            "run_1",
            vec![action(id, "SearchSubscription", r#"{"name":"Subscription 001"}"#)],
        )])
    };
    let api = Arc::new(FakeApi::new().with_runs(vec![pause("call_1"), pause("call_2")]));
    let orchestrator = orchestrator(&api).with_max_tool_rounds(1);

    let response = run(&orchestrator, request("s1", "loop")).await;

    assert!(response.is_failed());
    assert!(response.content.contains("[Error] Tool round limit (1) reached"));
    assert_eq!(response.command_results.len(), 1);
    assert_eq!(api.submissions().len(), 1);
    assert_eq!(
        cancel_runs(&api),
        vec![Call::CancelRun {
            thread: "thread_1".into(),
            run: "run_1".into(),
        }]
    );
    assert!(api.deleted_threads().is_empty());
}

#[tokio::test]
async fn session_is_usable_after_round_limit() {
    let api = Arc::new(FakeApi::new().with_runs(vec![
        script(vec![requires("run_1", vec![action("call_1", "Foo", "{}")])]),
        script(vec![requires("run_1", vec![action("call_2", "Foo", "{}")])]),
        script(vec![text("fresh"), completed("run_2")]),
    ]));
    let orchestrator = orchestrator(&api).with_max_tool_rounds(1);

    assert!(run(&orchestrator, request("s1", "loop")).await.is_failed());
    let response = run(&orchestrator, request("s1", "again")).await;

    assert_eq!(response.content, "fresh");
    assert_eq!(api.created_threads(), 1);
    let kinds: Vec<&str> = api
        .calls()
        .iter()
        .filter_map(|c| match c {
            Call::CancelRun { .. } => Some("cancel"),
            Call::AppendMessage { .. } => Some("append"),
            _ => None,
        })
        .collect();
    assert_eq!(kinds, vec!["append", "cancel", "append"]);
}

#[tokio::test]
async fn cancelled_mid_batch_cancels_the_paused_run() {
    let api = Arc::new(FakeApi::new().with_runs(vec![script(vec![requires(
        "run_1",
        vec![
            action("call_1", "Hangup", "{}"),
            action("call_2", "SearchProject", r#"{"name":"Project 001"}"#),
        ],
    )])]));
    let cancel = CancellationToken::new();
    let mut registry = default_registry(Arc::new(InMemoryRepository::seeded()));
    registry.register("Hangup", Arc::new(CancelsTurn(cancel.clone())));
    let orchestrator = orchestrator_with_registry(&api, registry);

    let err = orchestrator
        .run_turn(request("s1", "hang up"), &NoopObserver, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Cancelled));
    assert!(api.submissions().is_empty());
    assert_eq!(
        cancel_runs(&api),
        vec![Call::CancelRun {
            thread: "thread_1".into(),
            run: "run_1".into(),
        }]
    );
    let lease = orchestrator.sessions().lookup(&"s1".into()).await.unwrap();
    assert!(!lease.entry().is_busy());
}

#[tokio::test]
async fn failed_cancel_retires_the_session() {
    let api = Arc::new(
        FakeApi::new()
            .failing_cancel()
            .with_runs(vec![
                script(vec![requires("run_1", vec![action("call_1", "Foo", "{}")])]),
                script(vec![requires("run_1", vec![action("call_2", "Foo", "{}")])]),
                script(vec![text("new thread"), completed("run_2")]),
            ]),
    );
    let orchestrator = orchestrator(&api).with_max_tool_rounds(1);

    assert!(run(&orchestrator, request("s1", "loop")).await.is_failed());

    assert_eq!(cancel_runs(&api).len(), 1);
    assert_eq!(api.deleted_threads(), vec!["thread_1".to_string()]);
    assert!(orchestrator.sessions().lookup(&"s1".into()).await.is_none());

    let response = run(&orchestrator, request("s1", "again")).await;
    assert_eq!(response.content, "new thread");
    assert_eq!(api.created_threads(), 2);
}

#[tokio::test]
async fn completed_turn_cancels_nothing() {
    let api = Arc::new(FakeApi::new().with_runs(vec![
        script(vec![requires("run_1", vec![action("call_1", "Foo", "{}")])]),
        script(vec![completed("run_1")]),
    ]));
    let orchestrator = orchestrator(&api);

    run(&orchestrator, request("s1", "hello")).await;

    assert!(cancel_runs(&api).is_empty());
}

#[tokio::test(start_paused = true)]
async fn same_session_turns_do_not_interleave() {
    let api = Arc::new(FakeApi::new().with_runs(vec![
        hanging(vec![text("slow")]),
        script(vec![text("fast"), completed("run_2")]),
    ]));
    let orchestrator = orchestrator(&api)
        .with_reducer(Reducer::new("/api/file", Duration::from_secs(5)));

    let (first, second) = tokio::join!(
        run(&orchestrator, request("s1", "one")),
        run(&orchestrator, request("s1", "two")),
    );

    assert!(first.is_failed() || second.is_failed());
    let kinds: Vec<&str> = api
        .calls()
        .iter()
        .map(|c| match c {
            Call::CreateThread(_) => "create",
            Call::AppendMessage { .. } => "append",
            Call::CreateRun { .. } => "run",
            _ => "other",
        })
        .collect();
    assert_eq!(kinds, vec!["create", "append", "run", "append", "run"]);
}

#[tokio::test]
async fn token_usage_sums_thread_runs() {
    let api = Arc::new(
        FakeApi::new()
            .with_runs(vec![script(vec![completed("run_1")])])
            .with_usage(vec![
                TokenUsage {
                    input_tokens: 120,
                    output_tokens: 30,
                },
                TokenUsage {
                    input_tokens: 80,
                    output_tokens: 20,
                },
            ]),
    );
    let orchestrator = orchestrator(&api);
    run(&orchestrator, request("s1", "hello")).await;

    let tracker = orchestrator.token_usage(&"s1".into()).await.unwrap();
    assert_eq!(tracker.total_tokens(), 250);
    assert_eq!(tracker.run_count(), 2);

    let err = orchestrator.token_usage(&"nope".into()).await.unwrap_err();
    assert!(matches!(err, EngineError::UnknownSession(ref id) if id == "nope"));
}

#[tokio::test]
async fn context_file_swap_replaces_previous_file() {
    let api = Arc::new(FakeApi::new().with_runs(vec![script(vec![completed("run_1")])]));
    let orchestrator = orchestrator(&api);
    run(&orchestrator, request("s1", "hello")).await;
    let session: SessionId = "s1".into();

    let first = orchestrator
        .swap_context_file(&session, "file_a")
        .await
        .unwrap();
    assert_eq!(first.vector_store_id, "vs_1");
    assert_eq!(first.replaced_file_id, None);

    let second = orchestrator
        .swap_context_file(&session, "file_b")
        .await
        .unwrap();
    assert_eq!(second.vector_store_id, "vs_1");
    assert_eq!(second.replaced_file_id.as_deref(), Some("file_a"));

    let calls = api.calls();
    assert_eq!(
        api.count(|c| matches!(c, Call::CreateVectorStore(_))),
        1
    );
    assert!(calls.contains(&Call::RemoveVectorStoreFile {
        vector_store: "vs_1".into(),
        file: "file_a".into(),
    }));
    assert!(calls.contains(&Call::DeleteFile("file_a".into())));
    assert!(calls.contains(&Call::AddVectorStoreFile {
        vector_store: "vs_1".into(),
        file: "file_b".into(),
    }));

    let Some(Call::ModifyThread {
        thread,
        metadata,
        vector_store_ids,
    }) = calls
        .iter()
        .rev()
        .find(|c| matches!(c, Call::ModifyThread { .. }))
        .cloned()
    else {
        panic!("thread was never modified");
    };
    assert_eq!(thread, "thread_1");
    assert_eq!(vector_store_ids, vec!["vs_1".to_string()]);
    assert_eq!(metadata.get("beacon.context_file_id").map(String::as_str), Some("file_b"));
    assert_eq!(metadata.get("beacon.vector_store_id").map(String::as_str), Some("vs_1"));

    let handle = orchestrator
        .sessions()
        .lookup(&session)
        .await
        .unwrap()
        .handle();
    assert_eq!(handle.private("context_file_id"), Some("file_b"));
}

#[tokio::test]
async fn failed_add_leaves_previous_file_and_retry_succeeds() {
    let api = Arc::new(FakeApi::new().with_runs(vec![script(vec![completed("run_1")])]));
    let orchestrator = orchestrator(&api);
    run(&orchestrator, request("s1", "hello")).await;
    let session: SessionId = "s1".into();
    orchestrator
        .swap_context_file(&session, "file_a")
        .await
        .unwrap();

    api.fail_next_adds(1);
    let err = orchestrator
        .swap_context_file(&session, "file_b")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Network(_)));
    assert_eq!(api.store_files("vs_1"), Some(vec!["file_a".to_string()]));
    assert_eq!(api.count(|c| matches!(c, Call::RemoveVectorStoreFile { .. })), 0);

    let swap = orchestrator
        .swap_context_file(&session, "file_b")
        .await
        .unwrap();
    assert_eq!(swap.replaced_file_id.as_deref(), Some("file_a"));
    assert_eq!(api.store_files("vs_1"), Some(vec!["file_b".to_string()]));

    let handle = orchestrator.sessions().lookup(&session).await.unwrap().handle();
    assert_eq!(handle.private("context_file_id"), Some("file_b"));
}

#[tokio::test]
async fn reattaching_the_current_file_only_refreshes_the_thread() {
    let api = Arc::new(FakeApi::new().with_runs(vec![script(vec![completed("run_1")])]));
    let orchestrator = orchestrator(&api);
    run(&orchestrator, request("s1", "hello")).await;
    let session: SessionId = "s1".into();

    orchestrator
        .swap_context_file(&session, "file_a")
        .await
        .unwrap();
    let again = orchestrator
        .swap_context_file(&session, "file_a")
        .await
        .unwrap();

    assert_eq!(again.vector_store_id, "vs_1");
    assert_eq!(again.replaced_file_id, None);
    assert_eq!(api.count(|c| matches!(c, Call::AddVectorStoreFile { .. })), 0);
    assert_eq!(api.count(|c| matches!(c, Call::RemoveVectorStoreFile { .. })), 0);
    assert_eq!(api.count(|c| matches!(c, Call::DeleteFile(_))), 0);
    assert_eq!(api.count(|c| matches!(c, Call::ModifyThread { .. })), 2);
    assert_eq!(api.store_files("vs_1"), Some(vec!["file_a".to_string()]));
}

#[tokio::test]
async fn unattached_vector_store_is_deleted() {
    let api = Arc::new(FakeApi::new().with_runs(vec![script(vec![completed("run_1")])]));
    let orchestrator = orchestrator(&api);
    run(&orchestrator, request("s1", "hello")).await;
    let session: SessionId = "s1".into();

    api.fail_next_modifies(1);
    let err = orchestrator
        .swap_context_file(&session, "file_a")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Network(_)));
    assert!(api.calls().contains(&Call::DeleteVectorStore("vs_1".into())));
    assert_eq!(api.store_files("vs_1"), None);
    let handle = orchestrator.sessions().lookup(&session).await.unwrap().handle();
    assert_eq!(handle.private("vector_store_id"), None);

    let swap = orchestrator
        .swap_context_file(&session, "file_a")
        .await
        .unwrap();
    assert_eq!(swap.vector_store_id, "vs_2");
}

#[tokio::test]
async fn context_file_swap_needs_a_cached_session() {
    let api = Arc::new(FakeApi::new());
    let orchestrator = orchestrator(&api);
    let err = orchestrator
        .swap_context_file(&"ghost".into(), "file_a")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::UnknownSession(_)));
    assert!(api.calls().is_empty());
}

#[tokio::test]
async fn remove_session_deletes_thread() {
    let api = Arc::new(FakeApi::new().with_runs(vec![script(vec![completed("run_1")])]));
    let orchestrator = orchestrator(&api);
    run(&orchestrator, request("s1", "hello")).await;

    assert!(orchestrator.remove_session(&"s1".into()).await);
    assert_eq!(api.deleted_threads(), vec!["thread_1".to_string()]);
    assert!(!orchestrator.remove_session(&"s1".into()).await);
}
