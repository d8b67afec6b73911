use color_eyre::Result;
use serde_json::json;
use tablemate::table::{SortSpec, TableManager};
use unicode_width::UnicodeWidthStr;

use super::{ensure_loaded, open};

pub struct Options {
    /// 1-based page number.
    pub page: usize,
    pub sort: Option<SortSpec>,
    pub json: bool,
}

pub async fn command(manager: &mut TableManager, options: Options) -> Result<()> {
    open(manager).await?;
    if let Some(sort) = options.sort {
        manager.on_sort_change(Some(sort));
        manager.settle().await;
        super::check_notice(manager)?;
        ensure_loaded(manager)?;
    }
    if options.page > 1 {
        manager.on_page_change(options.page - 1);
        manager.settle().await;
        ensure_loaded(manager)?;
    }

    let controller = manager.controller();
    let state = controller.page_state();
    if options.json {
        let output = json!({
            "table": controller.table_name(),
            "page": state.page_index() + 1,
            "pages": state.total_pages(),
            "page_size": state.page_size(),
            "total": state.total_count(),
            "sort": state.sort().map(ToString::to_string),
            "rows": controller.rows(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let mut columns = vec![("id".to_string(), "ID".to_string())];
    columns.extend(
        manager
            .schema()
            .fields
            .iter()
            .map(|field| (field.name.clone(), field.label.clone())),
    );
    let cells: Vec<Vec<String>> = controller
        .rows()
        .iter()
        .map(|row| columns.iter().map(|(name, _)| row.display(name)).collect())
        .collect();
    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(idx, (_, label))| {
            cells
                .iter()
                .map(|row| row[idx].width())
                .chain(std::iter::once(label.width()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let labels: Vec<&str> = columns.iter().map(|(_, label)| label.as_str()).collect();
    println!("{}", format_line(&labels, &widths));
    for row in &cells {
        let values: Vec<&str> = row.iter().map(String::as_str).collect();
        println!("{}", format_line(&values, &widths));
    }
    println!(
        "Page {} of {} ({} rows)",
        state.page_index() + 1,
        state.total_pages(),
        state.total_count()
    );
    Ok(())
}

fn format_line(values: &[&str], widths: &[usize]) -> String {
    let mut line = String::new();
    for (idx, (value, width)) in values.iter().zip(widths).enumerate() {
        if idx > 0 {
            line.push_str("  ");
        }
        line.push_str(value);
        if idx + 1 < values.len() {
            line.push_str(&" ".repeat(width.saturating_sub(value.width())));
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::format_line;

    #[test]
    fn pads_by_display_width() {
        let widths = [2, 6, 3];
        assert_eq!(format_line(&["1", "Škoda", "CZ"], &widths), "1   Škoda   CZ");
        assert_eq!(format_line(&["12", "日本", "JP"], &widths), "12  日本    JP");
    }
}
