//! End-to-end chat engine tests: streaming, tool loops, client deferral,
//! and error policy, all over the in-memory store with mock LLMs.

use std::sync::Arc;

use chat_event::{ChatDelta, ToolExecutionStatus};
use monad::client::ClientConnectionManager;
use monad::context::MockEmbedder;
use monad::engine::{ChatEngine, ChatTurnRequest, ToolOutput};
use monad::llm::{LlmResponse, MockLlm, ToolCall};
use monad::model::{HostType, MessageRole, WorkspaceRecord, WorkspaceToolRecord};
use monad::session::SessionManager;
use monad::store::Store;
use monad::workspace::WorkspaceStore;

struct Fixture {
    store: Arc<Store>,
    sessions: Arc<SessionManager>,
    session_id: String,
    _root: tempfile::TempDir,
}

async fn fixture() -> Fixture {
    let root = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::open_in_memory().unwrap());
    let connections = Arc::new(ClientConnectionManager::new());
    let workspaces = Arc::new(WorkspaceStore::new(store.clone(), connections.clone()));
    let sessions = Arc::new(SessionManager::new(
        store.clone(),
        workspaces,
        connections,
        Arc::new(MockEmbedder::new(16)),
        None,
        root.path().to_path_buf(),
    ));
    let session = sessions.create_session("test", None).await.unwrap();
    Fixture {
        store,
        sessions,
        session_id: session.id,
        _root: root,
    }
}

fn engine_with(fixture: &Fixture, llm: MockLlm) -> Arc<ChatEngine> {
    Arc::new(ChatEngine::new(
        fixture.sessions.clone(),
        Arc::new(llm),
        Arc::new(MockLlm::with_no_tool_calls("summary")),
    ))
}

async fn collect(mut rx: tokio::sync::mpsc::Receiver<ChatDelta>) -> Vec<ChatDelta> {
    let mut deltas = Vec::new();
    while let Some(delta) = rx.recv().await {
        deltas.push(delta);
    }
    deltas
}

fn user_turn(content: &str) -> ChatTurnRequest {
    ChatTurnRequest {
        content: content.to_string(),
        ..Default::default()
    }
}

/// **Scenario**: A plain turn streams deltas whose concatenation equals the
/// persisted assistant message, and ends with generation + stream completed.
#[tokio::test(flavor = "multi_thread")]
async fn plain_turn_streams_and_persists() {
    let fixture = fixture().await;
    let engine = engine_with(
        &fixture,
        MockLlm::with_no_tool_calls("The answer is 42.").with_stream_by_char(),
    );

    let deltas = collect(engine.stream_turn(&fixture.session_id, user_turn("what is the answer?"))).await;

    let streamed: String = deltas
        .iter()
        .filter_map(|d| match d {
            ChatDelta::Delta { content } => Some(content.clone()),
            _ => None,
        })
        .collect();
    assert!(matches!(deltas.first(), Some(ChatDelta::GenerationContext { .. })));
    assert!(matches!(deltas.last(), Some(ChatDelta::StreamCompleted)));
    assert!(deltas
        .iter()
        .any(|d| matches!(d, ChatDelta::GenerationCompleted { .. })));

    let messages = fixture.store.list_messages(&fixture.session_id).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, MessageRole::User);
    let assistant = &messages[1];
    assert_eq!(assistant.role, MessageRole::Assistant);
    assert_eq!(streamed.trim(), assistant.content);
}

/// **Scenario**: Thinking is streamed as thought deltas, never reaches
/// content, and lands in the persisted message's think field.
#[tokio::test(flavor = "multi_thread")]
async fn thinking_separated_from_content() {
    let fixture = fixture().await;
    let engine = engine_with(
        &fixture,
        MockLlm::with_no_tool_calls("<think>quietly reasoning</think>The answer.")
            .with_stream_by_char(),
    );

    let deltas = collect(engine.stream_turn(&fixture.session_id, user_turn("hm?"))).await;

    let thoughts: String = deltas
        .iter()
        .filter_map(|d| match d {
            ChatDelta::Thought { content } => Some(content.clone()),
            _ => None,
        })
        .collect();
    let content: String = deltas
        .iter()
        .filter_map(|d| match d {
            ChatDelta::Delta { content } => Some(content.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(thoughts, "quietly reasoning");
    assert!(!content.contains("reasoning"));
    assert!(deltas
        .iter()
        .any(|d| matches!(d, ChatDelta::ThoughtCompleted)));

    let messages = fixture.store.list_messages(&fixture.session_id).await.unwrap();
    let assistant = messages.last().unwrap();
    assert_eq!(assistant.content, "The answer.");
    assert_eq!(assistant.think.as_deref(), Some("quietly reasoning"));
}

/// **Scenario**: A server-side tool call executes inline, its result feeds
/// the next iteration, and the loop ends with the final answer.
#[tokio::test(flavor = "multi_thread")]
async fn server_tool_loop() {
    let fixture = fixture().await;
    let engine = engine_with(
        &fixture,
        MockLlm::first_tools_then_end(
            "execute_sql",
            "{\"sql\": \"SELECT 1 AS one\"}",
            "There is one row.",
        ),
    );

    let deltas = collect(engine.stream_turn(&fixture.session_id, user_turn("count rows"))).await;

    assert!(deltas.iter().any(|d| matches!(
        d,
        ChatDelta::ToolExecution {
            status: ToolExecutionStatus::Attempting { .. },
            ..
        }
    )));
    assert!(deltas.iter().any(|d| matches!(
        d,
        ChatDelta::ToolExecution {
            status: ToolExecutionStatus::Success { .. },
            ..
        }
    )));

    let messages = fixture.store.list_messages(&fixture.session_id).await.unwrap();
    let roles: Vec<MessageRole> = messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![
            MessageRole::User,
            MessageRole::Assistant,
            MessageRole::Tool,
            MessageRole::Assistant,
        ]
    );
    assert_eq!(messages.last().unwrap().content, "There is one row.");
}

/// **Scenario**: One server tool and one client tool in a single batch: the
/// server tool runs inline, the client tool defers the loop, and a follow-up
/// turn carrying the tool outputs completes it.
#[tokio::test(flavor = "multi_thread")]
async fn client_tool_defers_then_resumes() {
    let fixture = fixture().await;

    // Client-owned workspace declaring a custom tool; the client is not
    // connected, so dispatch defers.
    let mut record = WorkspaceRecord::new("laptop:/p", HostType::Client);
    record.owner_client_id = Some("laptop-1".into());
    fixture.store.save_workspace(&record).await.unwrap();
    fixture
        .store
        .save_workspace_tool(&WorkspaceToolRecord {
            id: "wt1".into(),
            workspace_id: record.id.clone(),
            tool_id: "open_editor".into(),
            is_known: false,
            schema: Some(serde_json::json!({"type": "object"})),
            description: Some("Opens the client's editor".into()),
        })
        .await
        .unwrap();
    fixture
        .sessions
        .attach_workspace(&record.id, &fixture.session_id, false)
        .await
        .unwrap();

    let engine = engine_with(
        &fixture,
        MockLlm::with_responses(vec![
            LlmResponse {
                content: String::new(),
                tool_calls: vec![
                    ToolCall {
                        id: "c1".into(),
                        name: "execute_sql".into(),
                        arguments: "{\"sql\": \"SELECT 1 AS one\"}".into(),
                    },
                    ToolCall {
                        id: "c2".into(),
                        name: "open_editor".into(),
                        arguments: "{}".into(),
                    },
                ],
                finish_reason: Some("tool_calls".into()),
                ..Default::default()
            },
            LlmResponse {
                content: "Editor opened and rows counted.".into(),
                finish_reason: Some("stop".into()),
                ..Default::default()
            },
        ]),
    );

    // First turn: defers without a completed generation.
    let deltas = collect(engine.stream_turn(&fixture.session_id, user_turn("do both"))).await;
    assert!(matches!(deltas.last(), Some(ChatDelta::StreamCompleted)));
    assert!(!deltas
        .iter()
        .any(|d| matches!(d, ChatDelta::GenerationCompleted { .. })));
    // The server tool ran inline.
    assert!(deltas.iter().any(|d| matches!(
        d,
        ChatDelta::ToolExecution {
            status: ToolExecutionStatus::Success { .. },
            ..
        }
    )));

    let messages = fixture.store.list_messages(&fixture.session_id).await.unwrap();
    let assistant = messages
        .iter()
        .find(|m| m.role == MessageRole::Assistant)
        .unwrap();
    assert_eq!(assistant.tool_calls.len(), 2);
    let replies: Vec<_> = messages
        .iter()
        .filter(|m| m.role == MessageRole::Tool)
        .cloned()
        .collect();
    assert!(assistant.is_unresolved(&replies));

    // Follow-up with both tool outputs completes the loop.
    let follow_up = ChatTurnRequest {
        content: String::new(),
        tool_outputs: vec![
            ToolOutput {
                tool_call_id: "c1".into(),
                content: "[{\"one\": 1}]".into(),
            },
            ToolOutput {
                tool_call_id: "c2".into(),
                content: "editor is open".into(),
            },
        ],
        system_preamble: None,
    };
    let deltas = collect(engine.stream_turn(&fixture.session_id, follow_up)).await;
    assert!(deltas
        .iter()
        .any(|d| matches!(d, ChatDelta::GenerationCompleted { .. })));

    let messages = fixture.store.list_messages(&fixture.session_id).await.unwrap();
    let assistant = messages
        .iter()
        .find(|m| m.role == MessageRole::Assistant && !m.tool_calls.is_empty())
        .unwrap();
    let replies: Vec<_> = messages
        .iter()
        .filter(|m| m.role == MessageRole::Tool)
        .cloned()
        .collect();
    assert!(!assistant.is_unresolved(&replies));
    assert_eq!(
        messages.last().unwrap().content,
        "Editor opened and rows counted."
    );
}

/// **Scenario**: A failing tool is reported, its error becomes the tool
/// message, and the loop still reaches a final answer.
#[tokio::test(flavor = "multi_thread")]
async fn tool_failure_appended_and_loop_continues() {
    let fixture = fixture().await;
    let engine = engine_with(
        &fixture,
        MockLlm::first_tools_then_end(
            "execute_sql",
            "{\"sql\": \"SELECT * FROM missing_table\"}",
            "That table does not exist.",
        ),
    );

    let deltas = collect(engine.stream_turn(&fixture.session_id, user_turn("query it"))).await;

    assert!(deltas
        .iter()
        .any(|d| matches!(d, ChatDelta::ToolCallError { .. })));
    assert!(deltas
        .iter()
        .any(|d| matches!(d, ChatDelta::GenerationCompleted { .. })));

    let messages = fixture.store.list_messages(&fixture.session_id).await.unwrap();
    let tool_reply = messages
        .iter()
        .find(|m| m.role == MessageRole::Tool)
        .unwrap();
    assert!(tool_reply.content.starts_with("Error:"));
    assert_eq!(
        messages.last().unwrap().content,
        "That table does not exist."
    );
}

/// **Scenario**: A turn with neither content nor tool outputs fails with an
/// error delta and a terminated stream.
#[tokio::test(flavor = "multi_thread")]
async fn empty_turn_rejected() {
    let fixture = fixture().await;
    let engine = engine_with(&fixture, MockLlm::with_no_tool_calls("unused"));

    let deltas = collect(engine.stream_turn(&fixture.session_id, user_turn("  "))).await;
    assert!(matches!(deltas.first(), Some(ChatDelta::Error { .. })));
    assert!(matches!(deltas.last(), Some(ChatDelta::StreamCompleted)));
}

/// **Scenario**: A model that never stops calling tools exhausts the turn
/// bound, runs both compression fallbacks, and surfaces an error.
#[tokio::test(flavor = "multi_thread")]
async fn turn_limit_falls_back_then_errors() {
    let fixture = fixture().await;
    // The script's only (and repeating) response always calls a tool.
    let engine = engine_with(
        &fixture,
        MockLlm::with_responses(vec![LlmResponse {
            content: String::new(),
            tool_calls: vec![ToolCall {
                id: "again".into(),
                name: "execute_sql".into(),
                arguments: "{\"sql\": \"SELECT 1\"}".into(),
            }],
            finish_reason: Some("tool_calls".into()),
            ..Default::default()
        }]),
    );

    let deltas = collect(engine.stream_turn(&fixture.session_id, user_turn("loop forever"))).await;
    assert!(deltas.iter().any(|d| matches!(d, ChatDelta::Error { .. })));
    assert!(matches!(deltas.last(), Some(ChatDelta::StreamCompleted)));
    assert!(!deltas
        .iter()
        .any(|d| matches!(d, ChatDelta::GenerationCompleted { .. })));
}

/// **Scenario**: Tool calls embedded as `<tool_call>` blocks in the content
/// are extracted and executed like native ones.
#[tokio::test(flavor = "multi_thread")]
async fn embedded_tool_call_extracted() {
    let fixture = fixture().await;
    let engine = engine_with(
        &fixture,
        MockLlm::with_responses(vec![
            LlmResponse {
                content: "Let me check.\n<tool_call>{\"name\":\"execute_sql\",\"arguments\":{\"sql\":\"SELECT 1 AS one\"}}</tool_call>"
                    .into(),
                finish_reason: Some("stop".into()),
                ..Default::default()
            },
            LlmResponse {
                content: "Done checking.".into(),
                finish_reason: Some("stop".into()),
                ..Default::default()
            },
        ]),
    );

    let deltas = collect(engine.stream_turn(&fixture.session_id, user_turn("check"))).await;
    assert!(deltas.iter().any(|d| matches!(
        d,
        ChatDelta::ToolExecution {
            status: ToolExecutionStatus::Success { .. },
            ..
        }
    )));

    let messages = fixture.store.list_messages(&fixture.session_id).await.unwrap();
    let assistant_with_calls = messages
        .iter()
        .find(|m| !m.tool_calls.is_empty())
        .unwrap();
    assert_eq!(assistant_with_calls.tool_calls[0].name, "execute_sql");
    assert!(!assistant_with_calls.content.contains("tool_call"));
    assert_eq!(messages.last().unwrap().content, "Done checking.");
}
