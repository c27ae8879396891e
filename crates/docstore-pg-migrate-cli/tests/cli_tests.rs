//! CLI integration tests for docstore-pg-migrate.
//!
//! These tests verify command-line argument parsing, help output,
//! exit codes, and dry runs against an export directory.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;

/// Get a command for the docstore-pg-migrate binary.
fn cmd() -> Command {
    Command::cargo_bin("docstore-pg-migrate").unwrap()
}

/// Export directory plus a config pointing at it.
struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("export")).unwrap();
        let config = format!(
            "source:\n  path: {}\ntarget:\n  host: localhost\n  database: app\n  user: postgres\nmigration:\n  batch_delay_ms: 0\n",
            dir.path().join("export").display()
        );
        std::fs::write(dir.path().join("config.yaml"), config).unwrap();
        Self { dir }
    }

    fn export(&self, file: &str, content: &str) -> &Self {
        std::fs::write(self.dir.path().join("export").join(file), content).unwrap();
        self
    }

    fn config(&self) -> String {
        self.dir.path().join("config.yaml").display().to_string()
    }

    fn path(&self, name: &str) -> std::path::PathBuf {
        self.dir.path().join(name)
    }
}

fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

const USERS: &str = r#"[
  {"id": "u1", "email": "ada@example.com", "displayName": "Ada"},
  {"id": "u2", "displayName": "No Email"},
  {"id": "u3", "email": "bob@example.com"}
]"#;

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("schema"))
        .stdout(predicate::str::contains("migrate"));
}

#[test]
fn test_schema_subcommand_help() {
    cmd()
        .args(["schema", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("provision"))
        .stdout(predicate::str::contains("show"))
        .stdout(predicate::str::contains("verify"));
}

#[test]
fn test_provision_help() {
    cmd()
        .args(["schema", "provision", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--phase"))
        .stdout(predicate::str::contains("--skip-dependency-check"))
        .stdout(predicate::str::contains("--no-extras"));
}

#[test]
fn test_migrate_run_help() {
    cmd()
        .args(["migrate", "run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--collection"))
        .stdout(predicate::str::contains("--dry-run"))
        .stdout(predicate::str::contains("--batch-size"))
        .stdout(predicate::str::contains("BATCH_SIZE"))
        .stdout(predicate::str::contains("DELAY_BETWEEN_BATCHES"));
}

#[test]
fn test_health_check_help() {
    cmd()
        .args(["health-check", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--dry-run"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("docstore-pg-migrate"));
}

// =============================================================================
// Global Flags Tests
// =============================================================================

#[test]
fn test_global_flags_exist() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--progress"))
        .stdout(predicate::str::contains("--output-json"))
        .stdout(predicate::str::contains("--report-file"))
        .stdout(predicate::str::contains("[default: config.yaml]"));
}

#[test]
fn test_log_flags_defaults() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--log-format"))
        .stdout(predicate::str::contains("[default: text]"))
        .stdout(predicate::str::contains("--verbosity"))
        .stdout(predicate::str::contains("[default: info]"));
}

#[test]
fn test_no_subcommand_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

// =============================================================================
// Exit Code Tests - Config Errors (Exit Code 1)
// =============================================================================

#[test]
fn test_missing_config_exits_with_code_1() {
    cmd()
        .args(["--config", "nonexistent_config_file.yaml", "migrate", "run"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Configuration file not found"));
}

#[test]
fn test_invalid_yaml_exits_with_code_1() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "invalid: yaml: content: [").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "migrate", "run"])
        .assert()
        .code(1);
}

#[test]
fn test_wrong_source_type_exits_with_code_1() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "source:\n  type: mongodb\n  path: ./export").unwrap();
    writeln!(file, "target:\n  host: localhost\n  database: app\n  user: postgres").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "schema", "verify"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("source.type"));
}

#[test]
fn test_unmapped_collection_exits_with_code_1() {
    let fixture = Fixture::new();
    cmd()
        .args(["--config", &fixture.config(), "migrate", "run", "--dry-run"])
        .args(["--collection", "analytics"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Available collections: users, investments"));
}

#[test]
fn test_unknown_phase_exits_with_code_1() {
    cmd()
        .args(["schema", "show", "--phase", "99"])
        .assert()
        .code(1);
}

// =============================================================================
// Offline Commands
// =============================================================================

#[test]
fn test_schema_show_phase() {
    cmd()
        .args(["schema", "show", "--phase", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "CREATE TABLE IF NOT EXISTS \"public\".\"users\"",
        ))
        .stdout(predicate::str::contains("CREATE POLICY").not());
}

#[test]
fn test_schema_show_all_includes_extras() {
    cmd()
        .args(["schema", "show", "--schema", "app"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"app\".\"update_updated_at_column\""))
        .stdout(predicate::str::contains("CREATE INDEX IF NOT EXISTS"))
        .stdout(predicate::str::contains("ENABLE ROW LEVEL SECURITY"))
        .stdout(predicate::str::contains("CREATE POLICY"));
}

#[test]
fn test_migrate_list_json() {
    let output = cmd()
        .args(["--config", "missing.yaml", "--output-json", "migrate", "list"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let entries: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let entries = entries.as_array().unwrap();
    assert_eq!(entries.len(), 15);
    assert!(entries
        .iter()
        .any(|e| e["collection"] == "kyc-results" && e["table"] == "kyc_verifications"));
}

// =============================================================================
// Dry Runs
// =============================================================================

#[test]
fn test_dry_run_writes_report() {
    let fixture = Fixture::new();
    fixture.export("users.json", USERS);
    let report = fixture.path("report.json");

    cmd()
        .args(["--config", &fixture.config()])
        .args(["--report-file", report.to_str().unwrap()])
        .args(["migrate", "run", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Dry run completed!"));

    let json = read_json(&report);
    assert_eq!(json["success"], true);
    assert_eq!(json["dry_run"], true);
    let users = json["collections"]
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["collection"] == "users")
        .unwrap();
    assert_eq!(users["table"], "users");
    assert_eq!(users["extracted"], 3);
    assert_eq!(users["inserted"], 3);
    assert_eq!(users["failed"], 0);
}

#[test]
fn test_dry_run_json_output_and_progress() {
    let fixture = Fixture::new();
    fixture.export("users.json", USERS);

    let output = cmd()
        .args(["--config", &fixture.config(), "--output-json", "--progress"])
        .args(["migrate", "run", "--dry-run", "--collection", "users", "--batch-size", "2"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["collections"].as_array().unwrap().len(), 1);
    assert_eq!(summary["totals"]["inserted"], 3);

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("\"batches\":2"));
}

#[test]
fn test_batch_size_env_override() {
    let fixture = Fixture::new();
    fixture.export("users.json", USERS);

    let output = cmd()
        .env("BATCH_SIZE", "1")
        .args(["--config", &fixture.config(), "--progress"])
        .args(["migrate", "run", "--dry-run", "--collection", "users"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("\"batches\":3"));
}

#[test]
fn test_rejected_batches_exit_with_code_3() {
    let fixture = Fixture::new();
    fixture.export(
        "transactions-mangopay.jsonl",
        "{\"id\": \"a\", \"transferId\": \"T1\", \"amount\": 5}\n{\"id\": \"b\", \"transferId\": \"T1\", \"amount\": 7}\n",
    );

    cmd()
        .args(["--config", &fixture.config(), "migrate", "run", "--dry-run"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("transactions-mangopay"));
}

#[test]
fn test_extraction_failure_exits_with_code_5() {
    let fixture = Fixture::new();
    fixture.export("users.json", "{ not json");

    cmd()
        .args(["--config", &fixture.config(), "migrate", "run", "--dry-run"])
        .args(["--collection", "users"])
        .assert()
        .code(5);
}

#[test]
fn test_missing_export_dir_fails_collections() {
    let fixture = Fixture::new();
    std::fs::remove_dir(fixture.path("export")).unwrap();

    cmd()
        .args(["--config", &fixture.config(), "migrate", "run", "--dry-run"])
        .assert()
        .code(3);
}

// =============================================================================
// Health Check
// =============================================================================

#[test]
fn test_health_check_dry_run_healthy() {
    let fixture = Fixture::new();
    fixture.export("users.json", USERS).export("wallets.jsonl", "");

    cmd()
        .args(["--config", &fixture.config(), "health-check", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Source (JSON export): OK"))
        .stdout(predicate::str::contains("2 collections"))
        .stdout(predicate::str::contains("Overall: HEALTHY"));
}

#[test]
fn test_health_check_missing_export_dir_is_unhealthy() {
    let fixture = Fixture::new();
    std::fs::remove_dir(fixture.path("export")).unwrap();

    let output = cmd()
        .args(["--config", &fixture.config(), "--output-json"])
        .args(["health-check", "--dry-run"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));

    let result: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["healthy"], false);
    assert_eq!(result["source_connected"], false);
    assert_eq!(result["target_connected"], true);
    assert!(String::from_utf8_lossy(&output.stderr).contains("Health check failed"));
}
