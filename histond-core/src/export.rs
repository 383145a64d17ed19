use crate::output::OutputDataset;
use histond_common::{HistondError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::Path;

// --- headless summary output ---

pub fn print_summary(output: &OutputDataset) {
    let dims = output.strides().len().saturating_sub(1);
    println!("{:<16} {}", "Dimensions:", dims);
    println!("{:<16} {}", "Bins:", output.len());
    println!("{:<16} {:?}", "Strides:", output.strides());
    println!("{:<16} {}", "Total:", output.total());
    let aux: Vec<&str> = output
        .column_names()
        .filter(|n| !crate::definition::is_reserved_column(n))
        .collect();
    if !aux.is_empty() {
        println!("{:<16} {}", "Auxiliary:", aux.join(", "));
    }
}

/// One line per bin: flat index, then every column in name order.
pub fn write_table<W: Write>(mut out: W, output: &OutputDataset) -> Result<()> {
    let names: Vec<&str> = output.column_names().collect();
    write!(out, "{:>6}", "bin")?;
    for n in &names {
        write!(out, " {:>14}", n)?;
    }
    writeln!(out)?;
    for k in 0..output.len() {
        write!(out, "{k:>6}")?;
        for n in &names {
            let v = output.get(n).map_or(f64::NAN, |c| c[k]);
            write!(out, " {v:>14.6}")?;
        }
        writeln!(out)?;
    }
    Ok(())
}

// --- JSON export ---

/// JSON has no NaN or infinity: non-finite values are written as `null`.
/// [`read_json`] reads them back as NaN.
pub fn write_json<W: Write>(out: W, output: &OutputDataset) -> Result<()> {
    let doc = serde_json::json!({
        "bins": output.len(),
        "strides": output.strides(),
        "columns": output.iter().collect::<BTreeMap<_, _>>(),
    });
    serde_json::to_writer_pretty(out, &doc).map_err(|e| HistondError::Other(e.to_string()))
}

pub fn export_json(output_path: &Path, output: &OutputDataset) -> Result<()> {
    let file = std::fs::File::create(output_path)?;
    write_json(std::io::BufWriter::new(file), output)
}

#[derive(Deserialize)]
struct JsonDoc {
    strides: Vec<usize>,
    columns: BTreeMap<String, Vec<Option<f64>>>,
}

pub fn read_json<R: Read>(input: R) -> Result<OutputDataset> {
    let doc: JsonDoc =
        serde_json::from_reader(input).map_err(|e| HistondError::Other(e.to_string()))?;
    let mut output = OutputDataset::new(doc.strides);
    for (name, values) in doc.columns {
        if values.len() != output.len() {
            return Err(HistondError::Other(format!(
                "column {name} has {} values for {} bins",
                values.len(),
                output.len()
            )));
        }
        output.insert(name, values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect());
    }
    Ok(output)
}

pub fn import_json(input_path: &Path) -> Result<OutputDataset> {
    let file = std::fs::File::open(input_path)?;
    read_json(std::io::BufReader::new(file))
}

// --- CSV export ---

pub fn write_csv<W: Write>(mut out: W, output: &OutputDataset) -> Result<()> {
    let names: Vec<&str> = output.column_names().collect();
    let header: Vec<String> = std::iter::once("bin".to_string())
        .chain(names.iter().map(|n| csv_escape(n)))
        .collect();
    writeln!(out, "{}", header.join(","))?;
    for k in 0..output.len() {
        let mut row = vec![k.to_string()];
        row.extend(names.iter().map(|n| output.get(n).map_or(String::new(), |c| c[k].to_string())));
        writeln!(out, "{}", row.join(","))?;
    }
    Ok(())
}

pub fn export_csv(output_path: &Path, output: &OutputDataset) -> Result<()> {
    let file = std::fs::File::create(output_path)?;
    write_csv(std::io::BufWriter::new(file), output)
}

// csv-escape: wrap in quotes if contains comma, quote, or newline
fn csv_escape(raw: &str) -> String {
    if raw.contains(',') || raw.contains('"') || raw.contains('\n') {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::HistogramDataSource;
    use crate::definition::{HistogramSpec, Weights};
    use crate::source::MemoryTable;

    fn sample() -> OutputDataset {
        let t = MemoryTable::from_columns([("x", vec![0.5, 1.5, 1.7])]).unwrap();
        let spec = HistogramSpec::new(["x"], vec![2])
            .with_range(vec![Some([0.0, 2.0])])
            .with_histogram("a,b", Weights::Unweighted);
        HistogramDataSource::new(t, spec).unwrap().output().clone()
    }

    #[test]
    fn csv_has_header_and_one_row_per_bin() {
        let mut buf = Vec::new();
        write_csv(&mut buf, &sample()).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("bin,\"a,b\",bin_bottom_0"));
        let header: Vec<&str> = lines[0].split(',').collect();
        let count_col = header.iter().position(|h| *h == "bin_count").unwrap();
        // the quoted "a,b" header spans two comma-separated pieces
        assert_eq!(lines[2].split(',').nth(count_col - 1), Some("2"));
    }

    #[test]
    fn json_carries_strides_and_columns() {
        let mut buf = Vec::new();
        write_json(&mut buf, &sample()).unwrap();
        let doc: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(doc["bins"], 2);
        assert_eq!(doc["strides"], serde_json::json!([1, 2]));
        assert_eq!(doc["columns"]["bin_count"], serde_json::json!([1.0, 2.0]));
        assert_eq!(doc["columns"]["a,b"], serde_json::json!([1.0, 2.0]));
    }

    #[test]
    fn json_nulls_read_back_as_nan() {
        let t = MemoryTable::from_columns([("x", vec![0.5]), ("w", vec![-4.0])]).unwrap();
        let spec = HistogramSpec::new(["x"], vec![1])
            .with_range(vec![Some([0.0, 1.0])])
            .with_weights(Weights::column("w"));
        let ds = HistogramDataSource::new(t, spec).unwrap();

        let mut buf = Vec::new();
        write_json(&mut buf, ds.output()).unwrap();
        let doc: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(doc["columns"]["errorbar_low"], serde_json::json!([null]));

        let back = read_json(buf.as_slice()).unwrap();
        assert_eq!(back.strides(), &[1, 1]);
        assert_eq!(back.bin_count().unwrap(), &[-4.0]);
        assert!(back.errorbar_low().unwrap()[0].is_nan());
        assert!(back.errorbar_high().unwrap()[0].is_nan());
    }

    #[test]
    fn json_with_short_column_is_rejected() {
        let text = r#"{"bins": 2, "strides": [1, 2], "columns": {"bin_count": [1.0]}}"#;
        assert!(read_json(text.as_bytes()).is_err());
    }

    #[test]
    fn table_lists_every_bin() {
        let mut buf = Vec::new();
        write_table(&mut buf, &sample()).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.lines().next().unwrap().contains("errorbar_high"));
    }

    #[test]
    fn export_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("h.json");
        let csv = dir.path().join("h.csv");
        export_json(&json, &sample()).unwrap();
        let back = import_json(&json).unwrap();
        assert_eq!(back.strides(), sample().strides());
        assert_eq!(back.bin_count(), sample().bin_count());
        export_csv(&csv, &sample()).unwrap();
        assert!(std::fs::read_to_string(json).unwrap().contains("\"strides\""));
        assert!(std::fs::read_to_string(csv).unwrap().starts_with("bin,"));
    }
}
