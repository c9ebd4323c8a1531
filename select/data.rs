//! # Sales File Loading
//!
//! Reads a delimited text file of housing sales into a [`SalesTable`]. Only the
//! columns the workflow asks for are converted. Each is cast to `f64`, so fields
//! stored as text in the source (such as a floor count of `"1.5"`) become real
//! numbers here.
//!
//! Failures are assumed to be user-input errors, and `DataError` says which
//! column is at fault.

use crate::table::{SalesTable, TableError};
use ndarray::Array1;
use polars::prelude::*;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

/// Fewer rows than this cannot be meaningfully split three ways.
const MINIMUM_ROWS: usize = 10;

#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error(
        "The required column '{0}' was not found in the input file. Please check spelling and case."
    )]
    ColumnNotFound(String),
    #[error(
        "The required column '{column_name}' could not be converted to the expected type '{expected_type}'. It contains non-numeric data. (Found type: {found_type})"
    )]
    ColumnWrongType {
        column_name: String,
        expected_type: &'static str,
        found_type: String,
    },
    #[error(
        "Missing or null values were found in the required column '{0}'. Complete data is required."
    )]
    MissingValuesFound(String),
    #[error("Input file contains only {found} data rows, but at least {required} are required.")]
    InsufficientRows { found: usize, required: usize },
    #[error("Non-finite values (NaN or Infinity) were found in the required column '{0}'.")]
    NonFiniteValuesFound(String),
    #[error("Could not assemble the loaded columns into a table: {0}")]
    TableError(#[from] TableError),
}

/// Loads `columns` from the delimited file at `path`.
///
/// Duplicate names in `columns` are read once. The resulting table keeps the
/// order in which names first appear.
pub fn load_sales_table(
    path: &Path,
    columns: &[String],
    delimiter: u8,
) -> Result<SalesTable, DataError> {
    log::info!("Loading sales data from '{}'", path.display());

    let df = CsvReader::new(File::open(path)?)
        .with_options(
            CsvReadOptions::default()
                .with_has_header(true)
                .with_parse_options(CsvParseOptions::default().with_separator(delimiter)),
        )
        .finish()?;

    if df.height() < MINIMUM_ROWS {
        return Err(DataError::InsufficientRows {
            found: df.height(),
            required: MINIMUM_ROWS,
        });
    }

    let available: HashSet<String> = df
        .get_column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect();

    let mut wanted: Vec<&String> = Vec::with_capacity(columns.len());
    for name in columns {
        if !available.contains(name) {
            return Err(DataError::ColumnNotFound(name.clone()));
        }
        if !wanted.contains(&name) {
            wanted.push(name);
        }
    }
    log::debug!("Reading {} of {} columns", wanted.len(), available.len());

    let mut loaded = Vec::with_capacity(wanted.len());
    for name in wanted {
        let values = extract_numeric_column(&df, name)?;
        loaded.push((name.clone(), Array1::from_vec(values)));
    }

    let table = SalesTable::new(loaded)?;
    log::info!(
        "Loaded {} sales with {} columns",
        table.n_rows(),
        table.column_names().len()
    );
    Ok(table)
}

fn extract_numeric_column(df: &DataFrame, column_name: &str) -> Result<Vec<f64>, DataError> {
    let series = df.column(column_name)?;
    if series.null_count() > 0 {
        return Err(DataError::MissingValuesFound(column_name.to_string()));
    }

    let wrong_type = || DataError::ColumnWrongType {
        column_name: column_name.to_string(),
        expected_type: "f64 (numeric)",
        found_type: format!("{:?}", series.dtype()),
    };

    let casted = series.cast(&DataType::Float64).map_err(|_| wrong_type())?;
    // A lossy cast turns unparsable text into nulls.
    if casted.null_count() > 0 {
        return Err(wrong_type());
    }

    let values: Vec<f64> = casted.f64()?.rechunk().into_no_null_iter().collect();
    if values.iter().any(|v| !v.is_finite()) {
        return Err(DataError::NonFiniteValuesFound(column_name.to_string()));
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::io::{self, Write};
    use tempfile::NamedTempFile;

    fn create_test_csv(content: &str) -> io::Result<NamedTempFile> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "{}", content)?;
        file.flush()?;
        Ok(file)
    }

    fn repeated(header: &str, row: &str, rows: usize) -> String {
        let body = std::iter::repeat(row)
            .take(rows)
            .collect::<Vec<_>>()
            .join("\n");
        format!("{}\n{}", header, body)
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn loads_requested_columns_only() {
        let mut rows = vec!["id,price,bedrooms,floors,date".to_string()];
        for i in 0..12 {
            rows.push(format!(
                "{},{},{},{},20140502T000000",
                7129300520_u64 + i,
                221900.0 + 1000.0 * i as f64,
                i % 4 + 1,
                if i % 2 == 0 { "1" } else { "1.5" }
            ));
        }
        let file = create_test_csv(&rows.join("\n")).unwrap();
        let table = load_sales_table(
            file.path(),
            &names(&["price", "floors", "bedrooms", "price"]),
            b',',
        )
        .unwrap();

        assert_eq!(table.n_rows(), 12);
        assert_eq!(table.column_names(), &names(&["price", "floors", "bedrooms"]));
        assert_abs_diff_eq!(table.column("price").unwrap()[3], 224900.0, epsilon = 1e-9);
        assert_abs_diff_eq!(table.column("floors").unwrap()[1], 1.5, epsilon = 1e-12);
        assert_eq!(table.row_ids()[11], 11);
    }

    #[test]
    fn honours_tab_delimiter() {
        let content = repeated("price\tbedrooms", "1.0\t2", 10);
        let file = create_test_csv(&content).unwrap();
        let table = load_sales_table(file.path(), &names(&["bedrooms"]), b'\t').unwrap();
        assert_eq!(table.column("bedrooms").unwrap().sum(), 20.0);
    }

    #[test]
    fn missing_column_is_reported() {
        let content = repeated("price,bedrooms", "1.0,2", 10);
        let file = create_test_csv(&content).unwrap();
        let err = load_sales_table(file.path(), &names(&["price", "sqft_lot"]), b',').unwrap_err();
        match err {
            DataError::ColumnNotFound(col) => assert_eq!(col, "sqft_lot"),
            other => panic!("Expected ColumnNotFound(sqft_lot), got {:?}", other),
        }
    }

    #[test]
    fn non_numeric_column_is_rejected() {
        let content = repeated("price,bedrooms", "1.0,three", 10);
        let file = create_test_csv(&content).unwrap();
        let err = load_sales_table(file.path(), &names(&["bedrooms"]), b',').unwrap_err();
        match err {
            DataError::ColumnWrongType { column_name, .. } => assert_eq!(column_name, "bedrooms"),
            other => panic!("Expected ColumnWrongType, got {:?}", other),
        }
    }

    #[test]
    fn empty_fields_are_missing_values() {
        let content = repeated("price,bedrooms", "1.0,", 10);
        let file = create_test_csv(&content).unwrap();
        let err = load_sales_table(file.path(), &names(&["bedrooms"]), b',').unwrap_err();
        match err {
            DataError::MissingValuesFound(col) => assert_eq!(col, "bedrooms"),
            other => panic!("Expected MissingValuesFound, got {:?}", other),
        }
    }

    #[test]
    fn too_few_rows_is_rejected() {
        let content = repeated("price,bedrooms", "1.0,2", 4);
        let file = create_test_csv(&content).unwrap();
        let err = load_sales_table(file.path(), &names(&["price"]), b',').unwrap_err();
        match err {
            DataError::InsufficientRows { found, required } => {
                assert_eq!(found, 4);
                assert_eq!(required, 10);
            }
            other => panic!("Expected InsufficientRows, got {:?}", other),
        }
    }
}
