//! Storage survives restarts: sessions, memory, configuration.

use mica::session::{EXPORT_FOOTER, export_as_text};
use mica::{App, ChatMessage, ChatSession, MicaConfig};

use crate::helpers::test_config;

fn session(user: &str, reply: &str) -> ChatSession {
    let mut session = ChatSession::new();
    session.push(ChatMessage::user(user));
    session.push(ChatMessage::assistant(reply));
    session
}

#[test]
fn export_is_stable_across_reload() {
    let dir = tempfile::tempdir().unwrap();
    let app = App::open(test_config(dir.path())).unwrap();
    let mut original = session("Plan a trip to Lisbon", "Start at the Alfama.");
    original.set_title("Lisbon trip");
    app.sessions().save(&original).unwrap();

    let reopened = App::open(test_config(dir.path())).unwrap();
    let loaded = reopened.sessions().load(&original.id).unwrap();
    let text = export_as_text(&loaded);
    assert_eq!(text, export_as_text(&loaded));
    assert_eq!(text, export_as_text(&original));
    assert!(text.starts_with("Chat: Lisbon trip\n"));
    assert!(text.contains("] You:\nPlan a trip to Lisbon\n\n"));
    assert!(text.trim_end().ends_with(EXPORT_FOOTER));
}

#[test]
fn search_rename_and_delete_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let app = App::open(test_config(dir.path())).unwrap();
    let bread = session("How long should sourdough proof?", "Overnight in the fridge.");
    let rust = session("Explain lifetimes", "They name borrow scopes.");
    app.sessions().save(&bread).unwrap();
    app.sessions().save(&rust).unwrap();

    app.sessions().rename(&rust.id, "Rust lifetimes").unwrap();
    app.sessions().delete(&bread.id).unwrap();

    let reopened = App::open(test_config(dir.path())).unwrap();
    assert!(reopened.sessions().search("sourdough").is_empty());
    let hits = reopened.sessions().search("LIFETIMES");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].title.as_deref(), Some("Rust lifetimes"));
}

#[test]
fn memory_survives_restart_and_respects_flags() {
    let dir = tempfile::tempdir().unwrap();
    let app = App::open(test_config(dir.path())).unwrap();
    let memory = app.memory();
    let folder = memory.create_folder("Preferences", "star", "yellow").unwrap();
    memory.add_block(&folder.id, "Units", "metric").unwrap();
    let off = memory.add_block(&folder.id, "Diet", "vegetarian").unwrap().unwrap();
    memory.toggle_block_enabled(&folder.id, &off.id).unwrap();

    let reopened = App::open(test_config(dir.path())).unwrap();
    let memory = reopened.memory();
    assert_eq!(memory.formatted_context(), "## Preferences\n• Units: metric");
    assert_eq!(memory.enabled_block_count(), 1);
    assert_eq!(memory.total_enabled_tokens(), ("Units".len() + "metric".len()) / 4);

    memory.toggle_folder_enabled(&folder.id).unwrap();
    assert_eq!(memory.formatted_context(), "");

    // Unknown ids are silent no-ops.
    assert!(!memory.delete_folder("missing").unwrap());
    assert!(memory.add_block("missing", "t", "c").unwrap().is_none());
}

#[test]
fn config_file_drives_data_location() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config").join("config.toml");
    let mut config = MicaConfig::with_data_dir(dir.path().join("data"));
    config.storage.models_dir = Some(dir.path().join("weights"));
    config.chat.persona = "You are a pirate.".into();
    config.save_to_file(&config_path).unwrap();

    let loaded = MicaConfig::from_file(&config_path).unwrap();
    let app = App::open(loaded).unwrap();
    assert_eq!(app.downloads().models_dir(), dir.path().join("weights"));
    assert!(dir.path().join("data").join("sessions").is_dir());
    assert_eq!(app.config().chat.persona, "You are a pirate.");
}
