use anyhow::Result;
use assert_cmd::Command;
use predicates::str::contains;

fn server() -> Result<Command> {
    let mut cmd = Command::cargo_bin("channel_creation_server")?;
    cmd.args([
        "--host-node-url",
        "http://127.0.0.1:1",
        "--swap-api-url",
        "http://127.0.0.1:1",
        "--swap-service-pubkey",
        "02deadbeef",
        // never opened: both cases fail before the store
        "--store-path",
        "unused.sqlite3",
    ]);
    Ok(cmd)
}

#[test]
fn zero_poll_interval_is_refused() -> Result<()> {
    server()?
        .args(["--poll-interval-secs", "0"])
        .assert()
        .failure()
        .stderr(contains("--poll-interval-secs"));
    Ok(())
}

#[test]
fn bad_service_key_is_refused_at_startup() -> Result<()> {
    server()?
        .args(["--poll-interval-secs", "1"])
        .assert()
        .failure()
        .stderr(contains("parse swap_service_pubkey"));
    Ok(())
}
