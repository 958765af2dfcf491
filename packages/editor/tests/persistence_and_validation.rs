//! Saving edited styles and validating references through a session

use std::sync::{Arc, Mutex};
use trellis_editor::persistence::load_styles;
use trellis_editor::{
    parse_stylesheet, Breakpoint, EditorError, EditorEvent, EditorSession, EngineConfig, FileStore,
    MockFileSystem, NodePath, RealFileSystem, SerializedNode, WarningKind,
};

fn cards() -> SerializedNode {
    SerializedNode::element("body")
        .with_child(
            SerializedNode::element("div")
                .with_attr("class", "card")
                .with_attr("data-tr-id", "a"),
        )
        .with_child(
            SerializedNode::element("div")
                .with_attr("class", "card")
                .with_attr("data-tr-id", "b"),
        )
}

fn open(store: &dyn FileStore) -> EditorSession {
    let sheet = load_styles(store, "styles.css").unwrap();
    EditorSession::new(EngineConfig::default(), "index.html", &cards(), sheet).unwrap()
}

fn record_events(session: &mut EditorSession) -> Arc<Mutex<Vec<EditorEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    session.subscribe(move |e| sink.lock().unwrap().push(e.clone()));
    events
}

#[test]
fn test_save_merges_into_changed_file() {
    let mut store = MockFileSystem::new();
    store.add_file("styles.css", ".card {\n  width: 200px;\n}\n");
    let mut session = open(&store);
    let events = record_events(&mut session);

    session
        .set_style(&NodePath::from_id("a"), "width", "350px", &[Breakpoint::base()])
        .unwrap();

    // someone else edits the file before we save
    store.add_file(
        "styles.css",
        ".card {\n  width: 200px;\n  color: navy;\n}\n\n.extra {\n  margin: 0;\n}\n",
    );
    let text = session.save_styles(&mut store, "styles.css").unwrap();

    let saved = parse_stylesheet(&text).unwrap();
    let card = &saved.rule(None, ".card").unwrap().declarations;
    assert_eq!(card.get("width"), Some("200px"));
    assert_eq!(card.get("color"), Some("navy"));
    assert_eq!(saved.rule(None, ".extra").unwrap().declarations.get("margin"), Some("0"));
    assert_eq!(saved.rule(None, ".tr-a").unwrap().declarations.get("width"), Some("350px"));
    assert_eq!(
        saved
            .rule(Some("@media (max-width: 991px)"), ".tr-a")
            .unwrap()
            .declarations
            .get("width"),
        Some("200px")
    );
    assert!(session.engine().touched().is_empty());
    assert!(matches!(
        events.lock().unwrap().last(),
        Some(EditorEvent::Saved { file }) if file == "styles.css"
    ));

    // nothing new to merge: saving again writes the same text
    assert_eq!(session.save_styles(&mut store, "styles.css").unwrap(), text);
}

#[test]
fn test_failed_save_can_be_retried() {
    let mut store = MockFileSystem::new();
    store.add_file("styles.css", ".card {\n  width: 200px;\n}\n");
    let mut session = open(&store);
    let events = record_events(&mut session);

    session
        .set_style(&NodePath::from_id("b"), "width", "10px", &[Breakpoint::base()])
        .unwrap();

    store.fail_writes = true;
    let result = session.save_styles(&mut store, "styles.css");
    assert!(matches!(result, Err(EditorError::Persistence { .. })));
    assert!(!session.engine().touched().is_empty());
    assert_eq!(store.files["styles.css"], ".card {\n  width: 200px;\n}\n");
    assert!(matches!(
        events.lock().unwrap().last(),
        Some(EditorEvent::PersistenceFailed { .. })
    ));

    store.fail_writes = false;
    session.save_styles(&mut store, "styles.css").unwrap();
    assert_eq!(store.write_count, 1);
    let saved = load_styles(&store, "styles.css").unwrap();
    assert_eq!(saved.rule(None, ".tr-b").unwrap().declarations.get("width"), Some("10px"));
}

#[test]
fn test_save_to_directory_store() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = RealFileSystem::new(dir.path());
    let mut session = open(&store);

    session
        .set_style(&NodePath::from_id("a"), "color", "red", &[Breakpoint::base()])
        .unwrap();
    session.save_styles(&mut store, "css/site.css").unwrap();

    let text = std::fs::read_to_string(dir.path().join("css/site.css")).unwrap();
    assert!(text.contains("color: red;"));
}

fn page_with_references() -> SerializedNode {
    SerializedNode::element("body")
        .with_child(
            SerializedNode::element("img")
                .with_attr("data-tr-id", "hero")
                .with_attr("src", "images/missing.png"),
        )
        .with_child(
            SerializedNode::element("img")
                .with_attr("data-tr-id", "logo")
                .with_attr("src", "images/logo.png"),
        )
        .with_child(
            SerializedNode::element("script")
                .with_attr("data-tr-id", "app")
                .with_attr("src", "http://cdn.example.com/app.js"),
        )
        .with_child(
            SerializedNode::element("link")
                .with_attr("data-tr-id", "font")
                .with_attr("href", "https://fonts.untrusted.test/a.css"),
        )
}

fn validating_session() -> EditorSession {
    let mut config = EngineConfig::default();
    config.validation.allowed_hosts = vec!["example.com".to_string()];
    config.validation.placeholder_image = Some("images/placeholder.png".to_string());
    EditorSession::new(config, "index.html", &page_with_references(), Default::default()).unwrap()
}

fn assets() -> MockFileSystem {
    let mut store = MockFileSystem::new();
    store.add_file("images/logo.png", "");
    store.add_file("images/placeholder.png", "");
    store
}

fn attribute(session: &EditorSession, id: &str, name: &str) -> Option<String> {
    let node = session.document().find_by_id(id)?;
    session.document().attribute(node, name).map(str::to_string)
}

#[tokio::test]
async fn test_validation_fixes_are_one_undo_step() {
    let mut session = validating_session();
    let events = record_events(&mut session);

    let fixed = session.validate(&assets()).await.unwrap();
    assert_eq!(fixed, 2);
    assert_eq!(attribute(&session, "hero", "src").as_deref(), Some("images/placeholder.png"));
    assert_eq!(
        attribute(&session, "app", "src").as_deref(),
        Some("https://cdn.example.com/app.js")
    );
    // no safe substitute for a stylesheet on a foreign host
    assert_eq!(
        attribute(&session, "font", "href").as_deref(),
        Some("https://fonts.untrusted.test/a.css")
    );

    let kinds: Vec<WarningKind> = events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            EditorEvent::ValidationWarning(w) => Some(w.kind),
            _ => None,
        })
        .collect();
    assert_eq!(
        kinds,
        vec![
            WarningKind::BrokenReference,
            WarningKind::InsecureReference,
            WarningKind::DisallowedDependency,
        ]
    );

    assert_eq!(session.history().undo_levels(), 1);
    assert_eq!(session.history().undo_description(), Some("Validation fixes"));
    session.undo().unwrap();
    assert_eq!(attribute(&session, "hero", "src").as_deref(), Some("images/missing.png"));
    assert_eq!(
        attribute(&session, "app", "src").as_deref(),
        Some("http://cdn.example.com/app.js")
    );
}

#[test]
fn test_stale_findings_are_skipped() {
    let mut session = validating_session();
    let warnings = session.validation_job(&assets()).run_blocking();
    assert_eq!(warnings.len(), 3);

    // the user fixes the image before the findings come back
    session
        .set_attribute(&NodePath::from_id("hero"), "src", Some("images/logo.png"))
        .unwrap();
    session.delete_node(&NodePath::from_id("app")).unwrap();

    assert_eq!(session.apply_validation(warnings).unwrap(), 0);
    assert_eq!(attribute(&session, "hero", "src").as_deref(), Some("images/logo.png"));
    assert_eq!(session.history().undo_levels(), 2);
}
