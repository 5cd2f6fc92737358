use std::fs;
use std::path::Path;

use csv::Writer;
use serde::Serialize;

use crate::errors::Result;
use crate::table::RegionTable;

/// Format a table value; undefined values are written as `NaN`
fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else {
        format!("{:.6}", value)
    }
}

fn create_writer(output_path: &Path) -> Result<Writer<fs::File>> {
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(Writer::from_path(output_path)?)
}

/// Write a region table as CSV, with a leading `Label` column
pub fn write_region_table_csv<P: AsRef<Path>>(table: &RegionTable, output_path: P) -> Result<()> {
    let mut writer = create_writer(output_path.as_ref())?;

    let mut header = vec!["Label".to_string()];
    header.extend(table.columns.iter().cloned());
    writer.write_record(&header)?;

    for row in &table.rows {
        let mut record = vec![row.label.clone()];
        record.extend(row.values.iter().map(|&v| format_value(v)));
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

/// Write the batch summary, one row per image, sorted by image name
pub fn write_summary_csv<P: AsRef<Path>>(summary: &RegionTable, output_path: P) -> Result<()> {
    let mut sorted = summary.clone();
    sorted.rows.sort_by(|a, b| a.label.cmp(&b.label));

    let mut writer = create_writer(output_path.as_ref())?;
    let mut header = vec!["Image".to_string()];
    header.extend(sorted.columns.iter().cloned());
    writer.write_record(&header)?;

    for row in &sorted.rows {
        let mut record = vec![row.label.clone()];
        record.extend(row.values.iter().map(|&v| format_value(v)));
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

/// Write any serialisable report as pretty-printed JSON
pub fn write_json_report<T: Serialize, P: AsRef<Path>>(report: &T, output_path: P) -> Result<()> {
    let output_path = output_path.as_ref();
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(report)?;
    fs::write(output_path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join("stem_tissue_output_tests").join(name);
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn region_table_csv_has_label_column_and_nan() {
        let mut table = RegionTable::new(["Mean_Red", "Mean_Blue"]);
        table.push_row("1", vec![10.0, 5.5]).unwrap();
        table.push_row("2", vec![f64::NAN, 1.0]).unwrap();

        let path = scratch_dir("profile").join("Profiles").join("section.csv");
        write_region_table_csv(&table, &path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "Label,Mean_Red,Mean_Blue");
        assert_eq!(lines[1], "1,10.000000,5.500000");
        assert_eq!(lines[2], "2,NaN,1.000000");
    }

    #[test]
    fn summary_rows_are_sorted_by_image() {
        let mut table = RegionTable::new(["LignifiedFraction"]);
        table.push_row("b", vec![0.2]).unwrap();
        table.push_row("a", vec![0.1]).unwrap();

        let path = scratch_dir("summary").join("summary.csv");
        write_summary_csv(&table, &path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "Image,LignifiedFraction");
        assert!(lines[1].starts_with("a,"));
        assert!(lines[2].starts_with("b,"));
    }
}
