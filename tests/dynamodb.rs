use std::time::Duration;

use assert_cmd::Command;
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::config::{Credentials, Region};
use color_eyre::Result;
use tablemate::{
    remote::{DynamoTableService, RemoteError, RemoteTableService},
    table::{Fields, Patch, Row, Scalar, SortSpec},
};
use testcontainers::{
    ContainerAsync, GenericImage, ImageExt,
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
};

#[allow(dead_code)]
struct DynamoDBEnv {
    container: ContainerAsync<GenericImage>,
    endpoint_url: String,
}

const INIT_TABLE_MAX_ATTEMPTS: u32 = 6;
const INIT_TABLE_RETRY_DELAY_MS: u64 = 150;

async fn new_dynamodb_env() -> Result<DynamoDBEnv> {
    let container = GenericImage::new("amazon/dynamodb-local", "2.5.2")
        .with_exposed_port(8000.tcp())
        .with_wait_for(WaitFor::message_on_stdout("CorsParams"))
        .with_user("root")
        .with_cmd(vec!["-jar", "DynamoDBLocal.jar", "-inMemory", "-sharedDb"])
        .start()
        .await
        .expect("Failed to start DynamoDB");
    let port = container.get_host_port_ipv4(8000).await?;
    Ok(DynamoDBEnv {
        container,
        endpoint_url: format!("http://127.0.0.1:{port}"),
    })
}

async fn new_local_client(endpoint_url: &str) -> aws_sdk_dynamodb::Client {
    let config = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(Credentials::new("local", "local", None, None, "test"))
        .endpoint_url(endpoint_url)
        .load()
        .await;
    aws_sdk_dynamodb::Client::new(&config)
}

fn tablemate(endpoint_url: &str, table: &str) -> Command {
    let mut cmd = Command::cargo_bin("tablemate").unwrap();
    cmd.env("AWS_REGION", "us-east-1")
        .env("AWS_ACCESS_KEY_ID", "local")
        .env("AWS_SECRET_ACCESS_KEY", "local")
        .env("XDG_CONFIG_HOME", std::env::temp_dir().join("tablemate-dynamodb"))
        .arg("--endpoint-url")
        .arg(endpoint_url)
        .arg("--table")
        .arg(table);
    cmd
}

/// DynamoDB Local sometimes drops the first connections right after start.
fn init_table(endpoint_url: &str, table: &str) {
    for attempt in 1..=INIT_TABLE_MAX_ATTEMPTS {
        let output = tablemate(endpoint_url, table)
            .arg("init-table")
            .output()
            .unwrap();
        if output.status.success() {
            return;
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let transient = stderr.contains("DispatchFailure")
            || stderr.contains("dispatch failure")
            || stderr.contains("IncompleteMessage");
        assert!(
            transient && attempt < INIT_TABLE_MAX_ATTEMPTS,
            "init-table failed after {attempt} attempt(s): {stderr}"
        );
        std::thread::sleep(Duration::from_millis(
            INIT_TABLE_RETRY_DELAY_MS * u64::from(attempt),
        ));
    }
}

fn json_stdout(cmd: &mut Command) -> serde_json::Value {
    let stdout = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&stdout).expect("output is valid JSON")
}

#[tokio::test]
async fn rows_round_trip_through_the_cli() {
    let env = new_dynamodb_env().await.unwrap();
    let endpoint_url = env.endpoint_url.as_str();
    init_table(endpoint_url, "brands");

    for (name, country) in [("Porsche", "Germany"), ("Alfa Romeo", "Italy"), ("Mazda", "Japan")] {
        tablemate(endpoint_url, "brands")
            .args(["create-row", &format!("name={name}"), &format!("country={country}")])
            .assert()
            .success();
    }

    let output = json_stdout(tablemate(endpoint_url, "brands").args(["list-rows", "--json"]));
    assert_eq!(output["total"], 3);
    let rows = output["rows"].as_array().unwrap();
    let listed: Vec<(i64, &str)> = rows
        .iter()
        .map(|row| (row["id"].as_i64().unwrap(), row["name"].as_str().unwrap()))
        .collect();
    assert_eq!(listed, [(2, "Alfa Romeo"), (3, "Mazda"), (1, "Porsche")]);

    let output = json_stdout(tablemate(endpoint_url, "brands").args([
        "update-row",
        "3",
        "country=Hiroshima",
        "--json",
    ]));
    assert_eq!(output["country"], "Hiroshima");
    assert_eq!(output["name"], "Mazda");

    tablemate(endpoint_url, "brands")
        .args(["delete-row", "1"])
        .assert()
        .success();
    let output = json_stdout(tablemate(endpoint_url, "brands").args([
        "list-rows",
        "--sort",
        "id:desc",
        "--json",
    ]));
    let ids: Vec<i64> = output["rows"]
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, [3, 2]);
}

#[tokio::test]
async fn service_reports_conflicts_and_missing_rows() {
    let env = new_dynamodb_env().await.unwrap();
    let endpoint_url = env.endpoint_url.as_str();
    init_table(endpoint_url, "models");
    let client = new_local_client(endpoint_url).await;
    let service = DynamoTableService::new(client, "models", SortSpec::asc("name"));

    assert_eq!(service.fetch_max_identifier().await.unwrap(), None);
    let row = Row::new(7).with("name", "Miura").with("brand_id", 9);
    assert_eq!(service.insert(row.clone()).await.unwrap(), row);
    assert!(matches!(
        service.insert(row.clone()).await,
        Err(RemoteError::Conflict(_))
    ));
    assert_eq!(service.fetch_max_identifier().await.unwrap(), Some(7));

    let mut fields = Fields::new();
    fields.insert("name".to_string(), Scalar::from("Miura SV"));
    fields.insert("brand_id".to_string(), Scalar::Null);
    let updated = service.update(7, Patch(fields.clone())).await.unwrap();
    assert_eq!(updated, Row::new(7).with("name", "Miura SV"));
    assert!(matches!(
        service.update(8, Patch(fields)).await,
        Err(RemoteError::NotFound(8))
    ));

    let page = service.fetch_page(0, 9, None).await.unwrap();
    assert_eq!(page.total_count, 1);
    assert_eq!(page.rows, vec![updated]);

    service.delete(7).await.unwrap();
    assert_eq!(service.fetch_page(0, 9, None).await.unwrap().total_count, 0);
}
