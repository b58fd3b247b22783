//! Streaming chat tests against a local SSE server

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use futures::StreamExt;
use papo::{Assistant, AssistantState, ChatClient, Error};

mod common;
use common::{MockRecognizer, MockSynthesizer, config_with, sse_body, spawn_chat_server};

fn client_for(base_url: &str) -> ChatClient {
    let config = config_with(&[
        ("GEMINI_API_KEY", "test-key"),
        ("PAPO_CHAT_BASE_URL", base_url),
    ]);
    ChatClient::new(&config, "Você é um assistente.", &AssistantState::new())
}

async fn collect(client: &ChatClient, message: &str) -> Vec<papo::Result<String>> {
    client.send(message).unwrap().collect().await
}

#[tokio::test]
async fn test_fragments_arrive_in_order() {
    let server = spawn_chat_server(StatusCode::OK, sse_body(&["Olá", ", ", "Senhor."])).await;
    let client = client_for(&server.base_url);

    let fragments: Vec<String> = collect(&client, "oi")
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    assert_eq!(fragments, vec!["Olá", ", ", "Senhor."]);
}

#[tokio::test]
async fn test_request_shape() {
    let server = spawn_chat_server(StatusCode::OK, sse_body(&["ok"])).await;
    let client = client_for(&server.base_url);

    collect(&client, "que horas são?").await;

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(
        request.path,
        "/v1beta/models/gemini-2.5-flash:streamGenerateContent"
    );
    assert_eq!(request.api_key.as_deref(), Some("test-key"));

    let body = &request.body;
    assert_eq!(
        body["systemInstruction"]["parts"][0]["text"],
        "Você é um assistente."
    );
    assert_eq!(body["contents"][0]["role"], "user");
    assert_eq!(body["contents"][0]["parts"][0]["text"], "que horas são?");
    assert!(body["tools"][0].get("google_search").is_some());
}

#[tokio::test]
async fn test_history_carries_context() {
    let server = spawn_chat_server(StatusCode::OK, sse_body(&["Bom ", "dia."])).await;
    let client = client_for(&server.base_url);

    collect(&client, "primeira").await;
    let history = client.session().unwrap().history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].text(), "Bom dia.");

    collect(&client, "segunda").await;
    assert_eq!(client.session().unwrap().history().len(), 4);

    let requests = server.requests();
    let contents = requests[1].body["contents"].as_array().unwrap();
    assert_eq!(contents.len(), 3);
    assert_eq!(contents[1]["role"], "model");
    assert_eq!(contents[2]["parts"][0]["text"], "segunda");
}

#[tokio::test]
async fn test_http_error_status() {
    let server = spawn_chat_server(
        StatusCode::INTERNAL_SERVER_ERROR,
        "upstream exploded".to_string(),
    )
    .await;
    let client = client_for(&server.base_url);

    let results = collect(&client, "oi").await;

    assert_eq!(results.len(), 1);
    match &results[0] {
        Err(Error::Chat(message)) => assert!(message.contains("500")),
        other => panic!("expected chat error, got {other:?}"),
    }
    assert!(client.session().unwrap().history().is_empty());
}

#[tokio::test]
async fn test_api_error_payload() {
    let body = "data: {\"error\":{\"code\":429,\"message\":\"quota\",\"status\":\"RESOURCE_EXHAUSTED\"}}\n\n";
    let server = spawn_chat_server(StatusCode::OK, body.to_string()).await;
    let client = client_for(&server.base_url);

    let results = collect(&client, "oi").await;

    assert!(matches!(results.as_slice(), [Err(Error::Chat(_))]));
    assert!(client.session().unwrap().history().is_empty());
}

#[tokio::test]
async fn test_transport_fault_is_yielded() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = client_for(&format!("http://{addr}"));
    let results = collect(&client, "oi").await;

    assert!(matches!(results.as_slice(), [Err(Error::Http(_))]));
}

#[tokio::test]
async fn test_send_is_lazy() {
    let server = spawn_chat_server(StatusCode::OK, sse_body(&["ok"])).await;
    let client = client_for(&server.base_url);

    let mut stream = client.send("oi").unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(server.requests().is_empty());

    assert_eq!(stream.next().await.unwrap().unwrap(), "ok");
    assert_eq!(server.requests().len(), 1);
}

#[test]
fn test_send_without_session() {
    let client = ChatClient::disabled();
    assert!(matches!(client.send("oi"), Err(Error::NotInitialized)));

    // Missing key behaves the same
    let state = AssistantState::new();
    let client = ChatClient::new(&config_with(&[]), "prompt", &state);
    assert!(!state.is_ready());
    assert!(matches!(client.send("oi"), Err(Error::NotInitialized)));
}

#[tokio::test]
async fn test_converse_speaks_sentences_in_order() {
    let server = spawn_chat_server(
        StatusCode::OK,
        sse_body(&["Olá, Senhor. Tu", "do bem? Estou", " às ordens"]),
    )
    .await;
    let config = config_with(&[
        ("GEMINI_API_KEY", "test-key"),
        ("PAPO_CHAT_BASE_URL", &server.base_url),
    ]);
    let synthesizer = MockSynthesizer::new();
    let assistant = Assistant::new(&config, MockRecognizer::new(), synthesizer.clone());
    assert!(assistant.state().is_ready());

    let mut echoed = String::new();
    let reply = assistant
        .converse("tudo bem?", |fragment| echoed.push_str(fragment))
        .await
        .unwrap();

    assert_eq!(reply, "Olá, Senhor. Tudo bem? Estou às ordens");
    assert_eq!(echoed, reply);

    // The locale reaches both the prompt and each utterance
    let prompt = &server.requests()[0].body["systemInstruction"]["parts"][0]["text"];
    assert!(prompt.as_str().unwrap().ends_with("pt-BR."));
    assert_eq!(synthesizer.last_utterance().locale, "pt-BR");

    // One at a time: the rest waits for the engine
    assert_eq!(synthesizer.spoken_texts(), vec!["Olá, Senhor."]);
    assert_eq!(assistant.speech().pending(), 2);
    assert!(assistant.state().is_speaking());

    synthesizer.finish_last();
    synthesizer.finish_last();
    synthesizer.finish_last();
    assert_eq!(
        synthesizer.spoken_texts(),
        vec!["Olá, Senhor.", "Tudo bem?", "Estou às ordens"]
    );
    assert!(!assistant.state().is_speaking());
}

#[tokio::test]
async fn test_converse_runs_as_abortable_task() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Assistant>();

    let server = spawn_chat_server(StatusCode::OK, sse_body(&["Olá, Senhor."])).await;
    let config = config_with(&[
        ("GEMINI_API_KEY", "test-key"),
        ("PAPO_CHAT_BASE_URL", &server.base_url),
    ]);
    let synthesizer = MockSynthesizer::new();
    let assistant = Arc::new(Assistant::new(
        &config,
        MockRecognizer::new(),
        synthesizer.clone(),
    ));

    let task = {
        let assistant = Arc::clone(&assistant);
        tokio::spawn(async move { assistant.converse("oi", |_| {}).await })
    };
    task.abort();

    assert!(task.await.unwrap_err().is_cancelled());
    assert!(assistant.chat().session().unwrap().history().is_empty());
    assert_eq!(synthesizer.spoken_count(), 0);

    // A fresh turn still works after the aborted one
    let reply = assistant.converse("oi", |_| {}).await.unwrap();
    assert_eq!(reply, "Olá, Senhor.");
    assert_eq!(assistant.chat().session().unwrap().history().len(), 2);
}

#[test]
fn test_converse_without_chat_speaks_nothing() {
    let synthesizer = MockSynthesizer::new();
    let assistant = Assistant::new(&config_with(&[]), MockRecognizer::new(), synthesizer.clone());

    let result = tokio_test::block_on(assistant.converse("oi", |_| {}));

    assert!(matches!(result, Err(Error::NotInitialized)));
    assert_eq!(synthesizer.spoken_count(), 0);
    assert!(!assistant.state().is_speaking());
}
