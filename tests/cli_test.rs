//! End-to-end tests for the `bearer-policy` binary

use assert_cmd::Command;
use base64::Engine;
use predicates::prelude::*;
use wiremock::matchers::{header, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;

fn bearer_policy() -> Command {
    let mut cmd = Command::cargo_bin("bearer-policy").unwrap();
    cmd.arg("--config").arg("/nonexistent/bearer-policy.yaml");
    cmd
}

#[test]
fn test_challenge_prints_json_report() {
    let claims = base64::engine::general_purpose::STANDARD.encode(r#"{"access_token":{"foo":1}}"#);
    let value = format!(r#"Bearer realm="", error="insufficient_claims", claims="{claims}""#);

    let output = bearer_policy()
        .arg("challenge")
        .arg(value)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let report: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(report["exhaustive"], true);
    assert_eq!(report["bearer_count"], 1);
    assert_eq!(
        report["step_up"]["params"]["claims"],
        r#"{"access_token":{"foo":1}}"#
    );
}

#[test]
fn test_challenge_reports_non_exhaustive_input() {
    bearer_policy()
        .arg("challenge")
        .arg(r#"Bearer realm="a" trailing-garbage"#)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""exhaustive": false"#));
}

#[test]
fn test_challenge_invalid_claims_fails() {
    bearer_policy()
        .arg("challenge")
        .arg(r#"Bearer error="insufficient_claims", claims="%%%""#)
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid claims"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let (_temp_dir, config_path) =
        common::temp_config_file("transport:\n  timeout_seconds: 0\n");

    let mut cmd = Command::cargo_bin("bearer-policy").unwrap();
    cmd.arg("--config")
        .arg(config_path)
        .arg("challenge")
        .arg(r#"Bearer realm="x""#);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("must be greater than 0"));
}

#[test]
fn test_get_refuses_plain_http_by_default() {
    bearer_policy()
        .env("BEARER_POLICY_TOKEN", "secret")
        .arg("get")
        .arg("http://127.0.0.1:9/")
        .assert()
        .failure()
        .stderr(predicate::str::contains("non TLS protected"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_get_sends_token_from_environment() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
        .expect(1)
        .mount(&server)
        .await;

    let url = server.uri();
    let assert = tokio::task::spawn_blocking(move || {
        bearer_policy()
            .env("CLI_TEST_TOKEN", "secret")
            .args(["get", &url, "--allow-insecure", "--token-env", "CLI_TEST_TOKEN"])
            .assert()
    })
    .await
    .unwrap();

    assert
        .success()
        .stdout(predicate::str::contains("HTTP 200").and(predicate::str::contains("hello")));
}
