//! 端末向けの整形表

use repair_dash_common::columns::Column;
use repair_dash_common::{format_for_display, DisplayRecord};

/// セル幅の上限（文字数）
const MAX_CELL_WIDTH: usize = 40;

fn clip(value: &str) -> String {
    let single_line = value.replace(['\r', '\n'], " ");
    if single_line.chars().count() <= MAX_CELL_WIDTH {
        return single_line;
    }
    let mut clipped: String = single_line.chars().take(MAX_CELL_WIDTH - 1).collect();
    clipped.push('…');
    clipped
}

/// 列を揃えた表を生成
pub fn render_table(rows: &[DisplayRecord], columns: &[Column]) -> String {
    let header: Vec<String> = columns.iter().map(|c| c.header().to_string()).collect();
    let body: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|c| clip(&format_for_display(&c.value(row))))
                .collect()
        })
        .collect();

    let widths: Vec<usize> = (0..columns.len())
        .map(|i| {
            std::iter::once(&header)
                .chain(body.iter())
                .map(|cells| cells[i].chars().count())
                .max()
                .unwrap_or(0)
        })
        .collect();

    let format_line = |cells: &[String]| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| {
                let pad = width.saturating_sub(cell.chars().count());
                format!("{}{}", cell, " ".repeat(pad))
            })
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut out = String::new();
    out.push_str(&format_line(&header));
    out.push('\n');
    out.push_str(
        &widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("  "),
    );
    out.push('\n');
    for cells in &body {
        out.push_str(&format_line(cells));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use repair_dash_common::MergedRecord;

    #[test]
    fn test_render_table_aligns_columns() {
        let rows = vec![DisplayRecord {
            record: MergedRecord {
                barcode: "RV1".into(),
                location: "Atlanta".into(),
                ..Default::default()
            },
            last_updated: None,
        }];
        let text = render_table(&rows, &[Column::Barcode, Column::Location]);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Barcode#  Location");
        assert_eq!(lines[1], "--------  --------");
        assert_eq!(lines[2], "RV1       Atlanta");
    }

    #[test]
    fn test_clip_long_values() {
        let long = "x".repeat(100);
        assert_eq!(clip(&long).chars().count(), MAX_CELL_WIDTH);
        assert_eq!(clip("a\nb"), "a b");
    }
}
