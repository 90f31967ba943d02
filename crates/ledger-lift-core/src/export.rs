use std::path::Path;

use csv::{Writer, WriterBuilder};

use crate::error::ExtractError;
use crate::model::Table;

fn write_records<W: std::io::Write>(
    writer: &mut Writer<W>,
    table: &Table,
) -> Result<(), ExtractError> {
    let width = table.width();
    writer.write_record(&table.headers)?;
    for row in &table.rows {
        let mut record = row.clone();
        record.resize(width.max(row.len()), String::new());
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes `table` as CSV, headers first.
pub fn write_table_csv(path: &Path, table: &Table, delimiter: u8) -> Result<(), ExtractError> {
    let mut writer = WriterBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_path(path)?;
    write_records(&mut writer, table)
}

pub fn table_to_csv_string(table: &Table, delimiter: u8) -> Result<String, ExtractError> {
    let mut writer = WriterBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_writer(Vec::<u8>::new());
    write_records(&mut writer, table)?;

    let bytes = writer
        .into_inner()
        .map_err(|error| ExtractError::Csv(error.into_error().into()))?;
    String::from_utf8(bytes)
        .map_err(|error| ExtractError::InvalidOption(format!("invalid utf-8 csv output: {error}")))
}

#[cfg(test)]
mod tests {
    use super::{table_to_csv_string, write_table_csv};
    use crate::model::Table;

    fn table() -> Table {
        Table {
            headers: vec!["Date".to_string(), "Details".to_string()],
            rows: vec![
                vec!["01/02/2024".to_string(), "Coffee, large".to_string()],
                vec!["02/02/2024".to_string()],
            ],
        }
    }

    #[test]
    fn pads_short_rows_and_quotes_delimiters() {
        let csv = table_to_csv_string(&table(), b',').expect("csv should render");
        assert_eq!(
            csv,
            "Date,Details\n01/02/2024,\"Coffee, large\"\n02/02/2024,\n"
        );
    }

    #[test]
    fn writes_csv_to_a_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("out.csv");
        write_table_csv(&path, &table(), b';').expect("csv should write");
        let written = std::fs::read_to_string(&path).expect("csv should read back");
        assert!(written.starts_with("Date;Details\n"));
        assert!(written.contains("01/02/2024;Coffee, large"));
    }
}
