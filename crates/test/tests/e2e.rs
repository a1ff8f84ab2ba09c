use std::{
    path::Path,
    process::{Child, Command as StdCommand, Stdio},
    time::Duration,
};

use anyhow::{Context, Result, bail};
use dronetrigger_core::JsonResponse;
use dronetrigger_test::{
    ChildGuard, FakeDrone, REPO, binary_path, ensure_binaries_built, free_port, write_config,
};
use reqwest::StatusCode;
use tempfile::tempdir;
use tokio::{process::Command as TokioCommand, time::sleep};

const BEARER_TOKEN: &str = "0ct0cat-s3cret";

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn webhook_restarts_builds() -> Result<()> {
    let drone = FakeDrone::start().await?;
    let port = free_port()?;
    let config_dir = tempdir().context("create temp config dir")?;
    let config = write_config(
        config_dir.path(),
        &drone.url,
        &format!("127.0.0.1:{port}"),
        BEARER_TOKEN,
    )?;

    let web = spawn_web(&config)?;
    let mut web_guard = ChildGuard::new(web);
    let url = format!("http://127.0.0.1:{port}/");
    wait_for_web(&url).await?;

    // last build of a branch
    let (status, resp) = post_webhook(
        &url,
        BEARER_TOKEN,
        serde_json::json!({ "repo": REPO, "branch": "main" }),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp, JsonResponse::ok());
    assert_eq!(drone.triggered(), vec![10]);

    // last tag
    let (status, resp) = post_webhook(
        &url,
        BEARER_TOKEN,
        serde_json::json!({ "repo": REPO, "release_only": true }),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp, JsonResponse::ok());
    assert_eq!(drone.triggered(), vec![10, 11]);

    // rejected before reaching drone
    let (status, resp) = post_webhook(
        &url,
        "wrong-token",
        serde_json::json!({ "repo": REPO, "branch": "main" }),
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(resp, JsonResponse::error("invalid bearer token"));

    let (status, resp) = post_webhook(
        &url,
        BEARER_TOKEN,
        serde_json::json!({ "repo": "octocat/other" }),
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(resp, JsonResponse::error("invalid repository"));
    assert_eq!(drone.triggered(), vec![10, 11]);

    web_guard.kill()?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn web_refuses_short_tokens() -> Result<()> {
    ensure_binaries_built()?;
    let config_dir = tempdir().context("create temp config dir")?;
    let config = write_config(
        config_dir.path(),
        "http://127.0.0.1:9",
        &format!("127.0.0.1:{}", free_port()?),
        "short",
    )?;

    let output = TokioCommand::new(binary_path("dronetrigger-web")?)
        .arg("--config")
        .arg(&config)
        .output()
        .await
        .context("run dronetrigger-web")?;

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("is too short"), "stderr:\n{stderr}");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cli_restarts_last_build() -> Result<()> {
    let drone = FakeDrone::start().await?;
    let config_dir = tempdir().context("create temp config dir")?;
    let config = write_config(config_dir.path(), &drone.url, ":8080", BEARER_TOKEN)?;

    let stdout = run_cli(&config, &["--repo", REPO, "-v"]).await?;
    assert!(stdout.contains("started build 112"), "stdout:\n{stdout}");
    assert_eq!(drone.triggered(), vec![12]);

    run_cli(&config, &["--repo", REPO, "--release"]).await?;
    assert_eq!(drone.triggered(), vec![12, 11]);

    run_cli(&config, &["--repo", REPO, "--ref", "main"]).await?;
    assert_eq!(drone.triggered(), vec![12, 11, 10]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cli_reports_drone_errors() -> Result<()> {
    ensure_binaries_built()?;
    let drone = FakeDrone::start().await?;
    let config_dir = tempdir().context("create temp config dir")?;
    let config = write_config(config_dir.path(), &drone.url, ":8080", BEARER_TOKEN)?;

    let output = TokioCommand::new(binary_path("dronetrigger")?)
        .arg("--config")
        .arg(&config)
        .arg("--repo")
        .arg("octocat/unknown")
        .output()
        .await
        .context("run dronetrigger")?;

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("404 Not Found"), "stderr:\n{stderr}");
    assert!(drone.triggered().is_empty());
    Ok(())
}

fn spawn_web(config: &Path) -> Result<Child> {
    ensure_binaries_built()?;

    let binary = binary_path("dronetrigger-web")?;
    println!("Launching webhook server at {}", binary.display());
    StdCommand::new(binary)
        .arg("--config")
        .arg(config)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .context("spawn dronetrigger-web")
}

async fn wait_for_web(url: &str) -> Result<()> {
    let client = reqwest::Client::new();

    // Any response means the server is up; GET on the webhook is a 405.
    for _ in 0..30 {
        if client.get(url).send().await.is_ok() {
            return Ok(());
        }
        sleep(Duration::from_millis(500)).await;
    }

    bail!("webhook server did not come up at {url}")
}

async fn post_webhook(
    url: &str,
    bearer_token: &str,
    payload: serde_json::Value,
) -> Result<(StatusCode, JsonResponse)> {
    let resp = reqwest::Client::new()
        .post(url)
        .bearer_auth(bearer_token)
        .json(&payload)
        .send()
        .await
        .context("call webhook")?;

    let status = resp.status();
    let body = resp.json().await.context("decode webhook response")?;
    Ok((status, body))
}

async fn run_cli(config: &Path, args: &[&str]) -> Result<String> {
    ensure_binaries_built()?;

    let output = TokioCommand::new(binary_path("dronetrigger")?)
        .arg("--config")
        .arg(config)
        .args(args)
        .output()
        .await
        .context("run dronetrigger")?;

    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "dronetrigger {args:?} failed\nstatus: {:?}\nstdout:\n{}\nstderr:\n{}",
            output.status,
            stdout,
            stderr
        );
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
