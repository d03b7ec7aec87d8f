use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Lays out a config file, the shipped template and an output dir inside a
/// scratch directory, using relative paths in the YAML.
fn create_workspace() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("Creating temp dir failed");
    let templates = dir.path().join("templates");
    fs::create_dir_all(&templates).expect("Creating template dir failed");
    let shipped = Path::new(env!("CARGO_MANIFEST_DIR")).join("templates/catalog.html");
    fs::copy(&shipped, templates.join("catalog.html")).expect("Copying template failed");

    let config = dir.path().join("catalog.yaml");
    fs::write(
        &config,
        "render:\n  template_dir: ./templates\noutput:\n  output_dir: ./output\n  source_tag: test\n",
    )
    .expect("Writing temp config failed");
    (dir, config)
}

fn write_selection(dir: &Path) -> PathBuf {
    let selection = dir.join("selection.json");
    fs::write(
        &selection,
        r#"[
            {"name": "Parafuso Sextavado", "price": 1234.5, "sku": "PS-01", "barcode": "7891234567890"},
            {"name": "Arruela Lisa", "price": null, "sku": "AL-02", "barcode": ""}
        ]"#,
    )
    .expect("Writing selection failed");
    selection
}

#[test]
fn help_lists_all_subcommands() {
    let mut cmd = Command::cargo_bin("notion-catalog").expect("Binary exists");
    cmd.arg("--help").assert().success().stdout(
        predicate::str::contains("generate")
            .and(predicate::str::contains("products"))
            .and(predicate::str::contains("update-price"))
            .and(predicate::str::contains("list")),
    );
}

#[test]
fn generate_fails_on_missing_config_file() {
    let mut cmd = Command::cargo_bin("notion-catalog").expect("Binary exists");
    cmd.arg("generate")
        .arg("--config")
        .arg("/definitely/not/here.yaml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read config file"));
}

#[test]
fn generate_from_selection_writes_named_pdf_and_list_shows_it() {
    let (dir, config) = create_workspace();
    let selection = write_selection(dir.path());

    let mut cmd = Command::cargo_bin("notion-catalog").expect("Binary exists");
    cmd.arg("generate")
        .arg("--config")
        .arg(&config)
        .arg("--selection")
        .arg(&selection)
        .arg("--filename")
        .arg("ferragens")
        .env_remove("NOTION_API_TOKEN")
        .env_remove("NOTION_DATABASE_ID")
        .assert()
        .success()
        .stdout(predicate::str::contains("ferragens.pdf"));

    let pdf = dir.path().join("output/ferragens.pdf");
    let bytes = fs::read(&pdf).expect("PDF should exist");
    assert!(bytes.starts_with(b"%PDF"), "Output is not a PDF");

    let mut list = Command::cargo_bin("notion-catalog").expect("Binary exists");
    list.arg("list")
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("ferragens.pdf"));
}

#[test]
fn generate_with_empty_selection_is_rejected() {
    let (dir, config) = create_workspace();
    let selection = dir.path().join("empty.json");
    fs::write(&selection, "[]").expect("Writing selection failed");

    let mut cmd = Command::cargo_bin("notion-catalog").expect("Binary exists");
    cmd.arg("generate")
        .arg("--config")
        .arg(&config)
        .arg("--selection")
        .arg(&selection)
        .assert()
        .failure()
        .stderr(predicate::str::contains("No products provided"));

    assert!(!dir.path().join("output").exists());
}

#[test]
fn products_requires_notion_credentials() {
    let (_dir, config) = create_workspace();

    let mut cmd = Command::cargo_bin("notion-catalog").expect("Binary exists");
    cmd.arg("products")
        .arg("--config")
        .arg(&config)
        .env_remove("NOTION_API_TOKEN")
        .env_remove("NOTION_DATABASE_ID")
        .assert()
        .failure()
        .stderr(predicate::str::contains("NOTION_API_TOKEN"));
}

use std::sync::{Arc, Mutex};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{layer::Context, Layer, Registry};

/// Custom Layer to collect emitted event messages.
struct EventCollector {
    events: Arc<Mutex<Vec<String>>>,
}

impl<S> Layer<S> for EventCollector
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        use std::fmt::Write as FmtWrite;
        let mut msg = String::new();
        let _ = write!(&mut msg, "{:?}", event);
        self.events.lock().unwrap().push(msg);
    }
}

#[tokio::test]
async fn emits_trace_initialised_event() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let collector = EventCollector {
        events: events.clone(),
    };
    let subscriber = Registry::default().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    use notion_catalog::cli::{run, Cli, Commands};

    let cli = Cli {
        debug: false,
        command: Commands::List {
            config: PathBuf::from("dummy.yaml"),
        },
    };

    let _ = run(cli).await;

    let event_msgs = events.lock().unwrap();
    assert!(
        event_msgs.iter().any(|msg| msg.contains("trace_initialised")),
        "Expected a 'trace_initialised' trace event, got: {:?}",
        event_msgs
    );
}
