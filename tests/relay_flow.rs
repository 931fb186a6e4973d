use async_trait::async_trait;
use chat_relay::history::{ ConversationStore, HistoryPolicy, OverwriteFileStore, SnapshotStore };
use chat_relay::llm::LlmConfig;
use chat_relay::llm::chat::new_client;
use chat_relay::models::chat::ChatMessage;
use chat_relay::relay::ChatRelay;
use chat_relay::server::handlers::{
    self,
    ReplyFormat,
    ReplySink,
    DELIVERY_FAILED_REPLY,
    RESET_REPLY,
};
use serde_json::json;
use std::error::Error;
use std::path::{ Path, PathBuf };
use std::sync::{ Arc, Mutex };
use tempfile::TempDir;
use wiremock::matchers::{ body_partial_json, method, path };
use wiremock::{ Mock, MockServer, ResponseTemplate };

#[derive(Default)]
struct RecordingSink {
    sent: Mutex<Vec<(String, ReplyFormat)>>,
    reject_markdown_v2: bool,
}

impl RecordingSink {
    fn rejecting_markdown_v2() -> Self {
        Self { reject_markdown_v2: true, ..Self::default() }
    }

    fn sent(&self) -> Vec<(String, ReplyFormat)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReplySink for RecordingSink {
    async fn send(&self, text: &str, format: ReplyFormat) -> Result<(), Box<dyn Error + Send + Sync>> {
        if self.reject_markdown_v2 && format == ReplyFormat::MarkdownV2 {
            return Err("Bad Request: can't parse entities".into());
        }
        self.sent.lock().unwrap().push((text.to_string(), format));
        Ok(())
    }
}

async fn relay_for(endpoint: String, store_path: &Path) -> ChatRelay {
    let config = LlmConfig {
        api_key: Some("test-key".to_string()),
        base_url: Some(endpoint),
        ..LlmConfig::default()
    };
    let client = new_client(&config).unwrap();
    let snapshots = Arc::new(OverwriteFileStore::new(store_path));
    let store = ConversationStore::open(snapshots, HistoryPolicy::default()).await.unwrap();
    ChatRelay::new(client, Arc::new(store))
}

fn store_path(dir: &TempDir) -> PathBuf {
    dir.path().join("conversations.json")
}

async fn mount_reply(server: &MockServer, content: &str) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(
                json!({ "choices": [{ "message": { "role": "assistant", "content": content } }] })
            )
        )
        .mount(server).await;
}

#[tokio::test]
async fn first_message_is_answered_and_persisted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(
            body_partial_json(
                json!({
                "messages": [
                    { "role": "system", "content": "You are a helpful assistant." },
                    { "role": "user", "content": "hello" }
                ]
            })
            )
        )
        .respond_with(
            ResponseTemplate::new(200).set_body_json(
                json!({ "choices": [{ "message": { "role": "assistant", "content": "hi there" } }] })
            )
        )
        .expect(1)
        .mount(&server).await;

    let dir = TempDir::new().unwrap();
    let relay = relay_for(format!("{}/v1/chat/completions", server.uri()), &store_path(&dir)).await;
    let sink = RecordingSink::default();

    handlers::handle_message(&relay, &sink, "42", "hello").await.unwrap();

    assert_eq!(sink.sent(), vec![("hi there".to_string(), ReplyFormat::MarkdownV2)]);

    let on_disk = OverwriteFileStore::new(store_path(&dir)).load().await.unwrap();
    assert_eq!(
        on_disk.get("42"),
        Some(
            &vec![
                ChatMessage::system("You are a helpful assistant."),
                ChatMessage::user("hello"),
                ChatMessage::assistant("hi there")
            ]
        )
    );
}

#[tokio::test]
async fn reply_is_escaped_for_markdown_v2() {
    let server = MockServer::start().await;
    mount_reply(&server, "Sure! 2 + 2 = 4.").await;

    let dir = TempDir::new().unwrap();
    let relay = relay_for(format!("{}/v1/chat/completions", server.uri()), &store_path(&dir)).await;
    let sink = RecordingSink::default();

    handlers::handle_message(&relay, &sink, "42", "what is 2+2").await.unwrap();

    assert_eq!(sink.sent(), vec![("Sure\\! 2 \\+ 2 \\= 4\\.".to_string(), ReplyFormat::MarkdownV2)]);
    let history = relay.store().conversation("42").await.unwrap();
    assert_eq!(history.last(), Some(&ChatMessage::assistant("Sure! 2 + 2 = 4.")));
}

#[tokio::test]
async fn unreachable_endpoint_yields_error_reply() {
    let dir = TempDir::new().unwrap();
    let relay = relay_for("http://127.0.0.1:9/v1/chat/completions".to_string(), &store_path(&dir)).await;
    let sink = RecordingSink::default();

    handlers::handle_message(&relay, &sink, "42", "hello").await.unwrap();

    let sent = sink.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].0.starts_with("Error: "));
    assert_eq!(sent[0].1, ReplyFormat::MarkdownV2);

    assert_eq!(
        relay.store().conversation("42").await,
        Some(vec![ChatMessage::system("You are a helpful assistant."), ChatMessage::user("hello")])
    );
    assert!(!store_path(&dir).exists());
}

#[tokio::test]
async fn rejected_delivery_falls_back_to_plain_warning() {
    let server = MockServer::start().await;
    mount_reply(&server, "hi there").await;

    let dir = TempDir::new().unwrap();
    let relay = relay_for(format!("{}/v1/chat/completions", server.uri()), &store_path(&dir)).await;
    let sink = RecordingSink::rejecting_markdown_v2();

    handlers::handle_message(&relay, &sink, "42", "hello").await.unwrap();

    assert_eq!(sink.sent(), vec![(DELIVERY_FAILED_REPLY.to_string(), ReplyFormat::Plain)]);
}

#[tokio::test]
async fn reset_command_clears_history_on_disk() {
    let server = MockServer::start().await;
    mount_reply(&server, "hi there").await;

    let dir = TempDir::new().unwrap();
    let relay = relay_for(format!("{}/v1/chat/completions", server.uri()), &store_path(&dir)).await;
    let sink = RecordingSink::default();

    handlers::handle_message(&relay, &sink, "42", "hello").await.unwrap();
    handlers::handle_reset(&relay, &sink, "42").await.unwrap();

    assert_eq!(sink.sent().last(), Some(&(RESET_REPLY.to_string(), ReplyFormat::Markdown)));
    let on_disk = OverwriteFileStore::new(store_path(&dir)).load().await.unwrap();
    assert_eq!(on_disk.get("42"), Some(&vec![ChatMessage::system("You are a helpful assistant.")]));
}

#[tokio::test]
async fn history_survives_restart() {
    let server = MockServer::start().await;
    mount_reply(&server, "hi there").await;
    let dir = TempDir::new().unwrap();
    let endpoint = format!("{}/v1/chat/completions", server.uri());

    {
        let relay = relay_for(endpoint.clone(), &store_path(&dir)).await;
        relay.converse("42", "hello").await;
    }

    let relay = relay_for(endpoint, &store_path(&dir)).await;
    relay.converse("42", "again").await;

    let history = relay.store().conversation("42").await.unwrap();
    assert_eq!(history.len(), 5);
    assert_eq!(history[3], ChatMessage::user("again"));
}

#[tokio::test]
async fn users_do_not_share_history() {
    let server = MockServer::start().await;
    mount_reply(&server, "ok").await;
    let dir = TempDir::new().unwrap();
    let relay = Arc::new(
        relay_for(format!("{}/v1/chat/completions", server.uri()), &store_path(&dir)).await
    );

    let a = {
        let relay = relay.clone();
        tokio::spawn(async move { relay.converse("1", "from one").await })
    };
    let b = {
        let relay = relay.clone();
        tokio::spawn(async move { relay.converse("2", "from two").await })
    };
    assert_eq!(a.await.unwrap(), "ok");
    assert_eq!(b.await.unwrap(), "ok");

    let snapshot = relay.store().snapshot().await;
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot.get("1").unwrap()[1], ChatMessage::user("from one"));
    assert_eq!(snapshot.get("2").unwrap()[1], ChatMessage::user("from two"));
}

#[tokio::test]
async fn reset_is_confirmed_even_when_save_fails() {
    let server = MockServer::start().await;
    mount_reply(&server, "hi there").await;

    let dir = TempDir::new().unwrap();
    let unwritable = dir.path().join("missing").join("conversations.json");
    let relay = relay_for(format!("{}/v1/chat/completions", server.uri()), &unwritable).await;
    let sink = RecordingSink::default();

    let reply = relay.converse("42", "hello").await;
    assert!(reply.starts_with("Error: I/O error on"), "{}", reply);
    assert_eq!(
        relay.store().conversation("42").await.unwrap().last(),
        Some(&ChatMessage::assistant("hi there"))
    );

    handlers::handle_reset(&relay, &sink, "42").await.unwrap();

    assert_eq!(sink.sent(), vec![(RESET_REPLY.to_string(), ReplyFormat::Markdown)]);
    assert_eq!(
        relay.store().conversation("42").await,
        Some(vec![ChatMessage::system("You are a helpful assistant.")])
    );
    assert!(!unwritable.exists());
}
