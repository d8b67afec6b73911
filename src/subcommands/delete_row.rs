use color_eyre::Result;
use tablemate::table::TableManager;

use super::{check_notice, open};

pub struct Options {
    pub id: i64,
}

pub async fn command(manager: &mut TableManager, options: Options) -> Result<()> {
    open(manager).await?;
    manager.on_delete_requested(options.id);
    manager.settle().await;
    check_notice(manager)?;
    println!(
        "Deleted {} {}",
        manager.schema().label.to_lowercase(),
        options.id
    );
    Ok(())
}
