use color_eyre::Result;

use tablemate::aws;

pub struct Options {
    pub table_name: String,
}

pub async fn command(client: &aws_sdk_dynamodb::Client, options: Options) -> Result<()> {
    aws::create_table(client, &options.table_name).await?;
    println!("Created table {}", options.table_name);
    Ok(())
}
