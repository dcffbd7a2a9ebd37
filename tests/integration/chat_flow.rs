//! End-to-end conversation behaviour over the composition root with a
//! scripted inference engine.

use std::time::Duration;

use mica::{App, ChatEvent, ChatRole, MicaError, ScriptedEngine};

use crate::helpers::{drain_events, local_app, ready_chat, test_config};

#[tokio::test]
async fn conversation_is_titled_and_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let app = local_app(test_config(dir.path()));
    let (mut chat, engine) = ready_chat(&app, ScriptedEngine::new()).await;
    let mut events = chat.subscribe();

    engine.push_reply(["Paris", "."]);
    chat.set_input("What is the capital of France?");
    chat.send_input().await.unwrap();
    let id = chat.session().id.clone();

    let events = drain_events(&mut events);
    assert!(events.contains(&ChatEvent::Token("Paris".into())));
    assert!(events.contains(&ChatEvent::TitleUpdated(
        "What is the capital of France?".into()
    )));
    assert!(matches!(events.last(), Some(ChatEvent::ResponseFinished(m)) if m.content == "Paris."));

    tokio::time::sleep(Duration::from_millis(200)).await;
    drop(chat);

    let reopened = App::open(app.config().clone()).unwrap();
    let summaries = reopened.sessions().list();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].id, id);
    assert_eq!(
        summaries[0].title.as_deref(),
        Some("What is the capital of France?")
    );
    assert_eq!(summaries[0].message_count, 2);
}

#[tokio::test]
async fn stop_mid_stream_finalizes_partial_answer() {
    let dir = tempfile::tempdir().unwrap();
    let app = local_app(test_config(dir.path()));
    let engine = ScriptedEngine::new().with_token_delay(Duration::from_millis(50));
    let (mut chat, engine) = ready_chat(&app, engine).await;
    engine.push_reply(["Hel", "lo", ", how", " can I help?"]);

    let stop = chat.stop_handle();
    let mut events = chat.subscribe();
    let task = tokio::spawn(async move {
        let result = chat.send_user_message("hi").await;
        (chat, result)
    });
    loop {
        match events.recv().await.unwrap() {
            ChatEvent::Token(t) if t == "Hel" => break,
            _ => {}
        }
    }
    stop.stop();

    let (chat, result) = task.await.unwrap();
    result.unwrap();
    assert!(!chat.is_generating());
    let last = chat.session().last().unwrap();
    assert_eq!(last.role, ChatRole::Assistant);
    assert_eq!(last.content, "Hel");

    chat.flush().unwrap();
    let stored = app.sessions().load(&chat.session().id).unwrap();
    assert_eq!(stored.last().unwrap().content, "Hel");
}

#[tokio::test]
async fn second_send_within_a_second_is_rate_limited() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.chat.min_generation_interval_ms = 1_000;
    let app = local_app(config);
    let (mut chat, engine) = ready_chat(&app, ScriptedEngine::new()).await;
    engine.push_reply(["first"]);
    engine.push_reply(["second"]);

    chat.send_user_message("one").await.unwrap();
    let err = chat.send_user_message("two").await.unwrap_err();
    assert!(matches!(err, MicaError::RateLimited(_)));
    assert!(chat.error().unwrap().starts_with("Please wait"));

    let users = chat
        .session()
        .messages
        .iter()
        .filter(|m| m.role == ChatRole::User)
        .count();
    assert_eq!(users, 1);
}

#[tokio::test]
async fn regenerate_removes_exactly_the_last_assistant_message() {
    let dir = tempfile::tempdir().unwrap();
    let app = local_app(test_config(dir.path()));
    let (mut chat, engine) = ready_chat(&app, ScriptedEngine::new()).await;
    engine.push_reply(["Answer A"]);
    engine.push_reply(["Answer B"]);
    engine.push_reply(["Answer C"]);

    chat.send_user_message("first question").await.unwrap();
    chat.send_user_message("second question").await.unwrap();
    assert_eq!(chat.session().len(), 4);

    chat.regenerate_last_response().await.unwrap();
    let contents: Vec<&str> = chat
        .session()
        .messages
        .iter()
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(
        contents,
        ["first question", "Answer A", "second question", "Answer C"]
    );

    let prompt = engine.prompts().pop().unwrap();
    assert_eq!(prompt.len(), 4, "system + three history messages");
    assert_eq!(prompt.last().unwrap().content, "second question");
}

#[tokio::test]
async fn empty_reply_leaves_no_phantom_message() {
    let dir = tempfile::tempdir().unwrap();
    let app = local_app(test_config(dir.path()));
    let (mut chat, engine) = ready_chat(&app, ScriptedEngine::new()).await;
    engine.push_reply([" ", "\n\t"]);

    let err = chat.send_user_message("say nothing").await.unwrap_err();
    assert_eq!(err.code(), "EMPTY_GENERATION");
    assert!(chat.error().is_some());

    chat.flush().unwrap();
    let stored = app.sessions().load(&chat.session().id).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored.messages[0].role, ChatRole::User);
}

#[tokio::test]
async fn empty_sessions_are_never_written() {
    let dir = tempfile::tempdir().unwrap();
    let app = local_app(test_config(dir.path()));
    let (mut chat, _engine) = ready_chat(&app, ScriptedEngine::new()).await;

    chat.start_new_session().unwrap();
    chat.start_new_session().unwrap();
    chat.flush().unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    drop(chat);

    let files = std::fs::read_dir(app.sessions().dir()).unwrap().count();
    assert_eq!(files, 0);
    assert_eq!(app.sessions().count(), 0);
}

#[tokio::test]
async fn memory_context_reaches_the_system_prompt() {
    let dir = tempfile::tempdir().unwrap();
    let app = local_app(test_config(dir.path()));
    let memory = app.memory();
    let personal = memory.create_folder("Personal", "person", "blue").unwrap();
    memory.add_block(&personal.id, "Name", "Sam").unwrap();
    let hidden = memory.add_block(&personal.id, "Secret", "hidden").unwrap().unwrap();
    memory.toggle_block_enabled(&personal.id, &hidden.id).unwrap();
    let work = memory.create_folder("Work", "briefcase", "green").unwrap();
    memory.add_block(&work.id, "Role", "Engineer").unwrap();
    memory.toggle_folder_enabled(&work.id).unwrap();

    let (mut chat, engine) = ready_chat(&app, ScriptedEngine::new()).await;
    engine.push_reply(["Hi Sam"]);
    chat.send_user_message("hello").await.unwrap();

    let system = &engine.prompts()[0][0];
    assert_eq!(system.role, ChatRole::System);
    assert!(system.content.starts_with(&app.config().chat.persona));
    assert!(system.content.ends_with("## Personal\n• Name: Sam"));
    assert!(!system.content.contains("hidden"));
    assert!(!system.content.contains("Engineer"));
}

#[tokio::test]
async fn generation_without_a_model_is_not_ready() {
    let dir = tempfile::tempdir().unwrap();
    let app = local_app(test_config(dir.path()));
    let mut chat = app.orchestrator(std::sync::Arc::new(ScriptedEngine::new()));

    chat.set_input("hello");
    assert!(!chat.can_send());
    chat.send_input().await.unwrap();
    assert!(chat.session().is_empty());

    // Regenerating an empty session is a no-op.
    chat.regenerate_last_response().await.unwrap();
    assert!(chat.error().is_none());
}

#[tokio::test]
async fn loaded_model_survives_direct_delete() {
    let dir = tempfile::tempdir().unwrap();
    let app = local_app(test_config(dir.path()));
    let (mut chat, _engine) = ready_chat(&app, ScriptedEngine::new()).await;
    chat.set_input("still there?");
    assert!(chat.can_send());

    let err = app.downloads().delete_model("tiny").unwrap_err();
    assert_eq!(err.code(), "ALREADY_IN_PROGRESS");
    assert!(app.downloads().models_dir().join("tiny.gguf").is_file());
    assert!(app.downloads().is_downloaded("tiny"));
    assert!(chat.can_send());

    // Going through the lifecycle unloads first, then nothing can be sent.
    chat.lifecycle_mut().delete_model("tiny").await.unwrap();
    assert!(!app.downloads().is_downloaded("tiny"));
    assert!(!chat.can_send());
}
