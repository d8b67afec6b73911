use color_eyre::{Result, eyre::bail};
use tablemate::table::TableManager;

use super::{fill_draft, open, submit};

pub struct Options {
    pub values: Vec<(String, String)>,
    pub json: bool,
}

pub async fn command(manager: &mut TableManager, options: Options) -> Result<()> {
    open(manager).await?;
    manager.on_create_requested();
    manager.settle().await;
    if let Some(hint) = manager.dialog().session().and_then(|session| session.hint()) {
        tracing::info!(proposed = hint.value, "identifier_proposed");
    }
    fill_draft(manager, &options.values)?;
    submit(manager).await?;

    let Some(row) = manager.last_saved() else {
        bail!("{} was not created", manager.schema().label);
    };
    if options.json {
        println!("{}", serde_json::to_string(row)?);
    } else {
        println!("Created {} {}", manager.schema().label.to_lowercase(), row.id);
    }
    Ok(())
}
