use serde::Serialize;
use std::path::Path;
use tabled::{settings::Style, Table, Tabled};

use crate::error::{AnalysisError, Result};

pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    for r in rows {
        wtr.serialize(r)?;
    }
    wtr.flush().map_err(|e| AnalysisError::io(path, e))?;
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let s = serde_json::to_string_pretty(value)?;
    std::fs::write(path, s).map_err(|e| AnalysisError::io(path, e))?;
    Ok(())
}

/// Render up to `max_rows` rows as a Markdown table.
pub fn render_table<T>(rows: &[T], max_rows: usize) -> String
where
    T: Tabled + Clone,
{
    let slice: Vec<T> = rows.iter().take(max_rows).cloned().collect();
    if slice.is_empty() {
        return "(no rows)".to_string();
    }
    Table::new(slice).with(Style::markdown()).to_string()
}

pub fn preview_table<T>(title: &str, note: Option<&str>, rows: &[T], max_rows: usize)
where
    T: Tabled + Clone,
{
    println!("\n{}", title);
    if let Some(n) = note {
        println!("({})", n);
    }
    println!();
    println!("{}\n", render_table(rows, max_rows));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NeighborhoodRankingRow;

    #[test]
    fn markdown_table_has_header_and_limited_rows() {
        let rows: Vec<NeighborhoodRankingRow> = (1..=3)
            .map(|rank| NeighborhoodRankingRow {
                rank,
                neighborhood: format!("Barrio {rank}"),
                value: "1.00".into(),
                listings: 1,
            })
            .collect();
        let rendered = render_table(&rows, 2);
        assert!(rendered.contains("Neighborhood"));
        assert!(rendered.contains("Barrio 2"));
        assert!(!rendered.contains("Barrio 3"));
        assert_eq!(render_table::<NeighborhoodRankingRow>(&[], 5), "(no rows)");
    }
}
