use aws_config::BehaviorVersion;
use aws_config::environment::{
    credentials::EnvironmentVariableCredentialsProvider, region::EnvironmentVariableRegionProvider,
};
use aws_config::meta::region::ProvideRegion;
use aws_sdk_dynamodb::config::ProvideCredentials;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, BillingMode, KeySchemaElement, KeyType, ScalarAttributeType,
};
use color_eyre::eyre::{Context, Result, eyre};

use crate::remote::dynamodb::ID_ATTRIBUTE;

pub async fn new_client(endpoint_url: Option<&str>) -> Result<aws_sdk_dynamodb::Client> {
    let region_provider = EnvironmentVariableRegionProvider::new();
    let region = region_provider
        .region()
        .await
        .ok_or_else(|| eyre!("AWS region not set. Use AWS_REGION or AWS_DEFAULT_REGION."))?;

    let credential_check = EnvironmentVariableCredentialsProvider::new();
    credential_check
        .provide_credentials()
        .await
        .map_err(|err| eyre!("AWS credentials not found in environment: {err}"))?;

    let credentials_provider = EnvironmentVariableCredentialsProvider::new();
    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .region(region)
        .credentials_provider(credentials_provider);

    if let Some(url) = endpoint_url {
        loader = loader.endpoint_url(url);
    }

    let config = loader.load().await;
    Ok(aws_sdk_dynamodb::Client::new(&config))
}

/// Fails early with a readable message when the table is missing or the
/// endpoint is unreachable.
pub async fn validate_table(client: &aws_sdk_dynamodb::Client, table_name: &str) -> Result<()> {
    client
        .describe_table()
        .table_name(table_name)
        .send()
        .await
        .map(|_| ())
        .wrap_err_with(|| format!("Failed to open DynamoDB table {table_name}"))
}

/// Creates `table_name` keyed by a numeric `id`, billed on demand.
pub async fn create_table(client: &aws_sdk_dynamodb::Client, table_name: &str) -> Result<()> {
    let key_schema = KeySchemaElement::builder()
        .attribute_name(ID_ATTRIBUTE)
        .key_type(KeyType::Hash)
        .build()
        .wrap_err("building key schema")?;
    let attribute = AttributeDefinition::builder()
        .attribute_name(ID_ATTRIBUTE)
        .attribute_type(ScalarAttributeType::N)
        .build()
        .wrap_err("building attribute definition")?;
    client
        .create_table()
        .table_name(table_name)
        .key_schema(key_schema)
        .attribute_definitions(attribute)
        .billing_mode(BillingMode::PayPerRequest)
        .send()
        .await
        .map(|_| ())
        .wrap_err_with(|| format!("Failed to create DynamoDB table {table_name}"))
}
