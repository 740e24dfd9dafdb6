//! End-to-end runs of the `relay` binary against a temp settings file

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn relay(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("relay").unwrap();
    cmd.current_dir(dir.path())
        .env("HOME", dir.path())
        .env_remove("RUST_LOG")
        .arg("--settings")
        .arg(dir.path().join("settings.json"));
    cmd
}

fn read_profiles(settings: &Path) -> Vec<serde_json::Value> {
    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(settings).unwrap()).unwrap();
    raw["providerProfiles"].as_array().cloned().unwrap_or_default()
}

fn add_profile(dir: &TempDir, name: &str, base_url: &str, extra: &[&str]) -> String {
    relay(dir)
        .args([
            "profiles",
            "add",
            "--name",
            name,
            "--type",
            "openai-compatible",
            "--base-url",
            base_url,
            "--api-key",
            "sk-test",
        ])
        .args(extra)
        .assert()
        .success();

    read_profiles(&dir.path().join("settings.json"))
        .iter()
        .find(|p| p["name"] == name)
        .and_then(|p| p["id"].as_str().map(str::to_string))
        .unwrap()
}

#[test]
fn test_help_lists_commands() {
    let dir = TempDir::new().unwrap();
    relay(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("query"))
        .stdout(predicate::str::contains("profiles"));
}

#[test]
fn test_empty_profile_list() {
    let dir = TempDir::new().unwrap();
    relay(&dir)
        .args(["profiles", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No provider profiles configured."));
}

#[test]
fn test_add_list_disable_remove() {
    let dir = TempDir::new().unwrap();
    let id = add_profile(
        &dir,
        "Proxy",
        "https://proxy.example.com/",
        &["--map", "gpt-4o=gpt-4o-mini", "--priority", "3"],
    );

    relay(&dir)
        .args(["profiles", "list", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"apiKey\": \"***\""))
        .stdout(predicate::str::contains("sk-test").not())
        .stdout(predicate::str::contains("gpt-4o-mini"));

    relay(&dir)
        .args(["profiles", "disable", &id])
        .assert()
        .success();
    let profiles = read_profiles(&dir.path().join("settings.json"));
    assert_eq!(profiles[0]["isActive"], false);

    relay(&dir).args(["profiles", "remove", &id]).assert().success();
    assert!(read_profiles(&dir.path().join("settings.json")).is_empty());
}

#[test]
fn test_internal_url_rejected_without_opt_in() {
    let dir = TempDir::new().unwrap();
    relay(&dir)
        .args([
            "profiles",
            "add",
            "--name",
            "Local",
            "--type",
            "openai-compatible",
            "--base-url",
            "http://127.0.0.1:8080",
            "--api-key",
            "k",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("base URL rejected"));

    assert!(!dir.path().join("settings.json").exists());
}

#[test]
fn test_remove_unknown_profile_fails() {
    let dir = TempDir::new().unwrap();
    relay(&dir)
        .args(["profiles", "remove", "missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("profile not found: missing"));
}

#[test]
fn test_reorder_puts_first_id_on_top() {
    let dir = TempDir::new().unwrap();
    let a = add_profile(&dir, "A", "https://a.example.com", &["--priority", "5"]);
    let b = add_profile(&dir, "B", "https://b.example.com", &[]);

    relay(&dir)
        .args(["profiles", "reorder", &b, &a])
        .assert()
        .success();

    let profiles = read_profiles(&dir.path().join("settings.json"));
    let priority = |id: &str| {
        profiles
            .iter()
            .find(|p| p["id"] == id)
            .and_then(|p| p["priority"].as_i64())
            .unwrap()
    };
    assert!(priority(&b) > priority(&a));
}

#[test]
fn test_route_shows_profile_then_default() {
    let dir = TempDir::new().unwrap();
    let id = add_profile(
        &dir,
        "Proxy",
        "https://proxy.example.com",
        &["--map", "gpt-4o=gpt-4o-mini"],
    );

    relay(&dir)
        .args(["route", "gpt-4o"])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("1. profile:{}", id)))
        .stdout(predicate::str::contains("-> gpt-4o-mini"))
        .stdout(predicate::str::contains("2. claude"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_query_streams_through_profile() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(serde_json::json!({ "model": "gpt-4o-mini" })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hel\"}}]}\n\ndata: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"lo\"}}]}\n\ndata: [DONE]\n\n",
            "text/event-stream",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let uri = server.uri();
    let output = tokio::task::spawn_blocking(move || {
        add_profile(
            &dir,
            "Mock",
            &uri,
            &["--map", "gpt-4o=gpt-4o-mini", "--allow-internal-urls"],
        );
        relay(&dir)
            .args(["query", "--model", "gpt-4o", "say hello"])
            .output()
            .unwrap()
    })
    .await
    .unwrap();

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "Hello\n");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_query_json_events() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hi\"}}]}\n\ndata: [DONE]\n\n",
            "text/event-stream",
        ))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let uri = server.uri();
    let output = tokio::task::spawn_blocking(move || {
        add_profile(&dir, "Mock", &uri, &["--allow-internal-urls"]);
        relay(&dir)
            .args(["query", "--model", "gpt-4o", "--json", "hi"])
            .output()
            .unwrap()
    })
    .await
    .unwrap();

    assert!(output.status.success());
    let lines: Vec<serde_json::Value> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["type"], "assistant_text_delta");
    assert_eq!(lines[1]["type"], "result");
    assert_eq!(lines[1]["result"], "Hi");
}
