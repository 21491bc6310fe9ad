//! CLI Integration Tests
//!
//! These tests run the `emotionaid` binary end-to-end against a temporary
//! data directory. A fixed data key replaces the OS credential store and the
//! server URL points at a port nothing listens on.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const TEST_KEY: &str = "0101010101010101010101010101010101010101010101010101010101010101";

// ============================================================================
// Test Utilities
// ============================================================================

/// Create a CLI command with a temporary data directory and no server
fn cli_cmd(data_dir: &TempDir) -> Command {
    std::fs::write(
        data_dir.path().join("config.toml"),
        "[api]\nbase_url = \"http://127.0.0.1:9/\"\ntimeout_secs = 2\nmax_retries = 0\n",
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("emotionaid").expect("Failed to find emotionaid binary");
    cmd.env("EMOTIONAID_DATA_KEY", TEST_KEY)
        .env_remove("EMOTIONAID_API_BASE_URL")
        .env_remove("EMOTIONAID_API_TOKEN")
        .env_remove("EMOTIONAID_MODEL")
        .env_remove("RUST_LOG")
        .arg("--data-dir")
        .arg(data_dir.path());
    cmd
}

/// Extract the profile id from `profile create` output ("  ID: <ulid>")
fn extract_id(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|line| line.strip_prefix("  ID: "))
        .map(|id| id.trim().to_string())
}

fn create_profile(data_dir: &TempDir, name: &str) -> String {
    let output = cli_cmd(data_dir)
        .args(["profile", "create", name])
        .output()
        .unwrap();
    assert!(output.status.success());
    extract_id(&String::from_utf8_lossy(&output.stdout)).expect("profile id in output")
}

// ============================================================================
// Profile Command Tests
// ============================================================================

#[test]
fn test_profile_create_and_list() {
    let data_dir = TempDir::new().unwrap();
    let id = create_profile(&data_dir, "Alice");

    cli_cmd(&data_dir)
        .args(["profile", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains(id))
        .stdout(predicate::str::contains("Alice"));
}

#[test]
fn test_profile_avatar() {
    let data_dir = TempDir::new().unwrap();
    let id = create_profile(&data_dir, "Alice");
    let image = data_dir.path().join("me.png");
    std::fs::write(&image, b"not really a png").unwrap();

    cli_cmd(&data_dir)
        .args(["profile", "avatar"])
        .arg(data_dir.path().join("missing.png"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid avatar file path"));

    cli_cmd(&data_dir)
        .args(["profile", "avatar"])
        .arg(&image)
        .assert()
        .success()
        .stdout(predicate::str::contains("Saved avatar (16 bytes)"));

    let out = data_dir.path().join("out");
    cli_cmd(&data_dir)
        .args(["profile", "export-avatar"])
        .arg(&out)
        .assert()
        .success();
    let exported = out.join(format!("avatar_{}.png", id));
    assert_eq!(std::fs::read(exported).unwrap(), b"not really a png");
}

#[test]
fn test_commands_need_a_profile() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args(["diary", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No profile yet"));
}

// ============================================================================
// Chat and Queue Command Tests
// ============================================================================

#[test]
fn test_chat_send_offline_is_queued() {
    let data_dir = TempDir::new().unwrap();
    create_profile(&data_dir, "Alice");

    cli_cmd(&data_dir)
        .args(["chat", "send", "hello there"])
        .assert()
        .success()
        .stdout(predicate::str::contains("queued"));

    cli_cmd(&data_dir)
        .args(["queue", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Pending actions: 1"))
        .stdout(predicate::str::contains("SendMessage"));

    cli_cmd(&data_dir)
        .args(["chat", "history"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No messages"));
}

#[test]
fn test_sync_offline_keeps_queue() {
    let data_dir = TempDir::new().unwrap();
    create_profile(&data_dir, "Alice");
    cli_cmd(&data_dir).args(["chat", "send", "hi"]).assert().success();

    cli_cmd(&data_dir)
        .arg("sync")
        .assert()
        .success()
        .stdout(predicate::str::contains("nothing synced"));

    cli_cmd(&data_dir)
        .args(["queue", "clear"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 1"));
}

// ============================================================================
// Diary Command Tests
// ============================================================================

#[test]
fn test_diary_add_and_list() {
    let data_dir = TempDir::new().unwrap();
    create_profile(&data_dir, "Alice");

    cli_cmd(&data_dir)
        .args(["diary", "add", "Day 1", "ok", "--tag", "calm"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Saved diary entry"));

    cli_cmd(&data_dir)
        .args(["diary", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Day 1"))
        .stdout(predicate::str::contains("tags: calm"));

    cli_cmd(&data_dir)
        .args(["diary", "tags"])
        .assert()
        .success()
        .stdout(predicate::str::contains("calm"));

    cli_cmd(&data_dir)
        .args(["mood", "points"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Points: 10"));
}

#[test]
fn test_diary_export() {
    let data_dir = TempDir::new().unwrap();
    create_profile(&data_dir, "Alice");
    cli_cmd(&data_dir)
        .args(["diary", "add", "Day 1", "ok"])
        .assert()
        .success();

    let out = data_dir.path().join("export.json");
    cli_cmd(&data_dir)
        .args(["diary", "export"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Exported 1 entries"));
    assert!(std::fs::read_to_string(&out).unwrap().contains("Day 1"));
}

// ============================================================================
// Mood Command Tests
// ============================================================================

#[test]
fn test_mood_rating_bounds() {
    let data_dir = TempDir::new().unwrap();
    create_profile(&data_dir, "Alice");

    cli_cmd(&data_dir).args(["mood", "rate", "4"]).assert().success();
    cli_cmd(&data_dir).args(["mood", "rate", "9"]).assert().failure();

    cli_cmd(&data_dir)
        .args(["mood", "week"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Average: 4.0"));
}

#[test]
fn test_mood_analyze() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args(["mood", "analyze", "I am so happy today"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Emotion: joy"));
}

// ============================================================================
// Config and Wipe Command Tests
// ============================================================================

#[test]
fn test_config_show_uses_flag_override() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args(["--api-url", "https://flag.example.com/", "config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("https://flag.example.com/"))
        .stdout(predicate::str::contains("max_retries = 0"));
}

#[test]
fn test_logs_show_recorded_events() {
    let data_dir = TempDir::new().unwrap();

    cli_cmd(&data_dir)
        .args(["-v", "profile", "create", "Alice"])
        .assert()
        .success();

    cli_cmd(&data_dir)
        .arg("logs")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created profile"));

    cli_cmd(&data_dir)
        .args(["logs", "--level", "error"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No log records."));
}

#[test]
fn test_wipe_requires_force() {
    let data_dir = TempDir::new().unwrap();
    create_profile(&data_dir, "Alice");

    cli_cmd(&data_dir).arg("wipe").assert().failure();

    cli_cmd(&data_dir)
        .args(["wipe", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("All local data deleted"));

    cli_cmd(&data_dir)
        .args(["profile", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No profiles yet"));
}
