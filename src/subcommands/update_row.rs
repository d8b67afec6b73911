use color_eyre::{Result, eyre::bail};
use tablemate::table::{Row, TableManager};

use super::{ensure_loaded, fill_draft, open, submit};

pub struct Options {
    pub id: i64,
    pub values: Vec<(String, String)>,
    pub json: bool,
}

pub async fn command(manager: &mut TableManager, options: Options) -> Result<()> {
    if options.values.is_empty() {
        bail!("nothing to update; pass field=value pairs");
    }
    open(manager).await?;
    let Some(row) = find_row(manager, options.id).await? else {
        bail!("{} {} not found", manager.schema().label, options.id);
    };
    manager.on_edit_requested(&row);
    fill_draft(manager, &options.values)?;
    submit(manager).await?;

    let saved = manager.last_saved().unwrap_or(&row);
    if options.json {
        println!("{}", serde_json::to_string(saved)?);
    } else {
        println!("Updated {} {}", manager.schema().label.to_lowercase(), saved.id);
    }
    Ok(())
}

/// Walks pages in the current order until the row turns up.
async fn find_row(manager: &mut TableManager, id: i64) -> Result<Option<Row>> {
    loop {
        if let Some(row) = manager.controller().rows().iter().find(|row| row.id == id) {
            return Ok(Some(row.clone()));
        }
        if !manager.controller().page_state().can_next() {
            return Ok(None);
        }
        manager.on_next_page();
        manager.settle().await;
        ensure_loaded(manager)?;
    }
}
