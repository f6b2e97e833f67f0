//! End-to-end CLI tests for the courier binary.

// `Command::cargo_bin` is deprecated in assert_cmd >=2.0.17 in favor of
// `cargo::cargo_bin_cmd!` macro. Suppressed until migration to the new API.
#![allow(deprecated)]

use assert_cmd::Command;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use predicates::prelude::*;
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, ResponseTemplate};

mod support;
use support::socket_guard::start_mock_server_or_skip;

#[test]
fn test_binary_help_displays_usage() {
    let mut cmd = Command::cargo_bin("courier").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Fetch a URL"))
        .stdout(predicate::str::contains("--max-challenge-rounds"));
}

#[test]
fn test_binary_version_displays_version() {
    let mut cmd = Command::cargo_bin("courier").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("courier"));
}

#[test]
fn test_binary_missing_url_returns_error() {
    let mut cmd = Command::cargo_bin("courier").unwrap();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_binary_malformed_header_returns_error() {
    let mut cmd = Command::cargo_bin("courier").unwrap();
    cmd.args(["http://127.0.0.1:9/", "-H", "no-colon-here"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Name: value"));
}

#[tokio::test]
async fn test_binary_fetches_with_basic_credentials() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    let authorization = format!("Basic {}", STANDARD.encode("user:passwd"));
    Mock::given(method("GET"))
        .and(path("/basic-auth/user/passwd"))
        .and(header("authorization", authorization.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"authenticated\":true}"))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/basic-auth/user/passwd"))
        .respond_with(
            ResponseTemplate::new(401)
                .insert_header("WWW-Authenticate", r#"Basic realm="Fake Realm""#),
        )
        .mount(&mock_server)
        .await;

    let mut cmd = Command::cargo_bin("courier").unwrap();
    cmd.arg(format!("{}/basic-auth/user/passwd", mock_server.uri()))
        .args(["-u", "user:passwd", "-q"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"authenticated\":true"))
        .stderr(predicate::str::contains("HTTP 200"));
}

#[tokio::test]
async fn test_binary_without_credentials_exits_nonzero_on_401() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/private"))
        .respond_with(
            ResponseTemplate::new(401)
                .insert_header("WWW-Authenticate", r#"Basic realm="private""#)
                .set_body_string("no entry"),
        )
        .mount(&mock_server)
        .await;

    let mut cmd = Command::cargo_bin("courier").unwrap();
    cmd.arg(format!("{}/private", mock_server.uri()))
        .arg("-q")
        .assert()
        .failure()
        .stdout(predicate::str::contains("no entry"))
        .stderr(predicate::str::contains("HTTP 401"));
}

#[tokio::test]
async fn test_binary_streams_request_body() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("POST"))
        .and(path("/post"))
        .and(body_string("hello=world"))
        .respond_with(ResponseTemplate::new(200).set_body_string("stored"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut cmd = Command::cargo_bin("courier").unwrap();
    cmd.arg(format!("{}/post", mock_server.uri()))
        .args(["-X", "post", "-d", "hello=world", "--data-stream", "-q"])
        .assert()
        .success()
        .stdout(predicate::str::contains("stored"));
}
