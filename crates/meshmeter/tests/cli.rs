//! Runs of the `meshmeter` binary: exit status, stdout and stderr.

use std::path::Path;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BIN: &str = env!("CARGO_BIN_EXE_meshmeter");

const NODES: &str = r#"{
    "nodes": [
        {"hostname": "ffrn-hd-1", "is_online": true, "clients": 3},
        {"hostname": "ffrn-hd-2", "is_online": false, "clients": 10},
        {"hostname": "ffrn-wo-1", "is_online": true, "clients": 0}
    ]
}"#;
const READING: &str = r#"{"1.8.0": 45000, "account": "acct123"}"#;
const EMISSION: &str = r#"{
    "co2": 12000,
    "compensation": {"base_haben": 5000, "balance_base": -7000}
}"#;

fn write_config(dir: &Path, base_url: &str, store: &Path) -> std::path::PathBuf {
    let yaml = format!(
        "node_list_url: \"{base_url}/data/meshviewer.json\"\n\
         reading_url: \"{base_url}/core/reading\"\n\
         emission_url: \"{base_url}/core/emission\"\n\
         store_path: \"{}\"\n\
         timeout_secs: 5\n",
        store.display()
    );
    let config_path = dir.join("meshmeter.yaml");
    std::fs::write(&config_path, yaml).unwrap();
    config_path
}

async fn mount_services(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/data/meshviewer.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(NODES))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/core/reading"))
        .respond_with(ResponseTemplate::new(200).set_body_string(READING))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/core/emission"))
        .and(query_param("account", "acct123"))
        .respond_with(ResponseTemplate::new(200).set_body_string(EMISSION))
        .mount(server)
        .await;
}

#[test]
fn unreachable_node_list_exits_with_status_1() {
    let dir = tempfile::tempdir().unwrap();
    // nothing listens on the discard port
    let config = write_config(dir.path(), "http://127.0.0.1:9", &dir.path().join("meter.db"));

    let output = std::process::Command::new(BIN)
        .arg("-c")
        .arg(&config)
        .env_remove("MESHMETER_STORE")
        .env("RUST_LOG", "off")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(
        stderr.contains("unable to retrieve node list"),
        "stderr: {stderr}"
    );
    // the cause is printed once, not once per error layer
    assert_eq!(stderr.matches("HTTP error").count(), 1, "stderr: {stderr}");
}

#[test]
fn missing_config_file_exits_with_status_1() {
    let dir = tempfile::tempdir().unwrap();

    let output = std::process::Command::new(BIN)
        .arg("-c")
        .arg(dir.path().join("absent.yaml"))
        .env("RUST_LOG", "off")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("failed to load config"), "stderr: {stderr}");
}

#[tokio::test(flavor = "multi_thread")]
async fn successful_run_prints_eight_lines() {
    let server = MockServer::start().await;
    mount_services(&server).await;
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), &server.uri(), &dir.path().join("meter.db"));

    let output = tokio::process::Command::new(BIN)
        .arg("-c")
        .arg(&config)
        .env_remove("MESHMETER_STORE")
        .output()
        .await
        .unwrap();

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 8, "stdout: {stdout}");
    assert!(lines[0].starts_with("Meter Id: freifunk_rrnk"));
    assert_eq!(lines[1], "Current Power Load (kW): 0.013");
    assert_eq!(lines[2], "Total Consumption/Meter Reading (kWh): 45");
    assert_eq!(
        lines[3],
        format!(
            "Immutable URL of virtual meter reading: {}/core/reading?account=acct123",
            server.uri()
        )
    );
    assert_eq!(
        lines[4],
        format!(
            "Immutable URL for CO2 emission of virtual meter: {}/core/emission?account=acct123",
            server.uri()
        )
    );
    assert_eq!(lines[5], "Total CO2 emission (kg): 12");
    assert_eq!(lines[6], "Compensated CO2 (kg): 5");
    assert_eq!(lines[7], "Waiting for Compensation (kg): 7");
}

#[tokio::test(flavor = "multi_thread")]
async fn store_variable_overrides_config_path() {
    let server = MockServer::start().await;
    mount_services(&server).await;
    let dir = tempfile::tempdir().unwrap();
    let configured = dir.path().join("configured.db");
    let overridden = dir.path().join("override").join("meter.db");
    let config = write_config(dir.path(), &server.uri(), &configured);

    let output = tokio::process::Command::new(BIN)
        .arg("-c")
        .arg(&config)
        .env("MESHMETER_STORE", &overridden)
        .output()
        .await
        .unwrap();

    assert_eq!(output.status.code(), Some(0));
    assert!(overridden.exists());
    assert!(!configured.exists());
}
