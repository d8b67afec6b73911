use color_eyre::eyre::{Result, bail, eyre};
use tablemate::table::{NoticeKind, TableManager};

pub mod create_row;
pub mod delete_row;
pub mod init_table;
pub mod list_rows;
pub mod update_row;

/// Parses a `field=value` argument.
pub fn parse_assignment(raw: &str) -> Result<(String, String), String> {
    let (field, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected field=value, got {raw:?}"))?;
    let field = field.trim();
    if field.is_empty() {
        return Err(format!("missing field name in {raw:?}"));
    }
    Ok((field.to_string(), value.to_string()))
}

/// Loads the first page and fails if the backend could not be read.
pub async fn open(manager: &mut TableManager) -> Result<()> {
    manager.start();
    manager.settle().await;
    ensure_loaded(manager)
}

pub fn ensure_loaded(manager: &TableManager) -> Result<()> {
    match manager.controller().error() {
        Some(err) => Err(eyre!("Failed to load {}: {err}", manager.schema().name)),
        None => Ok(()),
    }
}

/// Copies `values` into the open dialog, rejecting fields the table does
/// not declare.
pub fn fill_draft(manager: &mut TableManager, values: &[(String, String)]) -> Result<()> {
    for (field, value) in values {
        if manager.schema().field(field).is_none() {
            let known: Vec<&str> = manager
                .schema()
                .fields
                .iter()
                .map(|field| field.name.as_str())
                .collect();
            bail!(
                "{} has no field {field} (fields: {})",
                manager.schema().name,
                known.join(", ")
            );
        }
        manager.on_draft_field_change(field, value.as_str());
    }
    Ok(())
}

/// Submits the open dialog and waits for the backend to answer.
pub async fn submit(manager: &mut TableManager) -> Result<()> {
    manager.on_submit();
    manager.settle().await;
    if let Some(session) = manager.dialog().session() {
        let err = session
            .error()
            .map(ToString::to_string)
            .unwrap_or_else(|| "the dialog did not accept the submission".to_string());
        bail!(err);
    }
    Ok(())
}

/// Turns an error notice left by an inline action into a failure.
pub fn check_notice(manager: &mut TableManager) -> Result<()> {
    match manager.take_notice() {
        Some(notice) if notice.kind == NoticeKind::Error => Err(eyre!(notice.message)),
        Some(notice) => {
            tracing::info!(message = %notice.message, "done");
            Ok(())
        }
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::parse_assignment;

    #[test]
    fn assignments_split_on_first_equals() {
        assert_eq!(
            parse_assignment("name=A=B").unwrap(),
            ("name".to_string(), "A=B".to_string())
        );
        assert_eq!(
            parse_assignment(" country =").unwrap(),
            ("country".to_string(), String::new())
        );
        assert!(parse_assignment("name").is_err());
        assert!(parse_assignment("=x").is_err());
    }
}
