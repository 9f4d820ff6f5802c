//! Row Rendering

use crate::OutputFormat;
use crate::row::{ROW_FIELDS, ResultRow};

/// Render rows for the terminal, as JSON, or back to CSV
pub fn render_rows(rows: &[ResultRow], format: OutputFormat) -> Result<String, String> {
    match format {
        OutputFormat::Human => Ok(render_human(rows)),
        OutputFormat::Json => serde_json::to_string_pretty(rows).map_err(|e| e.to_string()),
        OutputFormat::Csv => render_csv(rows).map_err(|e| e.to_string()),
    }
}

fn render_human(rows: &[ResultRow]) -> String {
    let columns = ROW_FIELDS.len().min(
        rows.iter()
            .map(|row| row.fields().len())
            .max()
            .unwrap_or(9),
    );
    let header: Vec<String> = ROW_FIELDS[..columns]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let body: Vec<Vec<String>> = rows.iter().map(ResultRow::fields).collect();

    let mut widths: Vec<usize> = header.iter().map(String::len).collect();
    for fields in &body {
        for (width, field) in widths.iter_mut().zip(fields) {
            *width = (*width).max(field.len());
        }
    }

    let mut out = String::new();
    for fields in std::iter::once(&header).chain(body.iter()) {
        let line: Vec<String> = fields
            .iter()
            .zip(&widths)
            .map(|(field, width)| format!("{:<width$}", field, width = *width))
            .collect();
        out.push_str(line.join("  ").trim_end());
        out.push('\n');
    }
    out.push_str(&format!("\n{} row(s)\n", rows.len()));
    out
}

fn render_csv(rows: &[ResultRow]) -> Result<String, csv::Error> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());
    for row in rows {
        writer.write_record(row.fields())?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
