//! Tabular datasets, CSV loading and deterministic train/test splitting
//!
//! A [`TabularDataset`] is an ordered set of named, typed columns of equal
//! length. Column types are declared by the data (integer, float or text);
//! the schema gate decides which of them are acceptable to the model.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;
use std::path::Path;

use crate::deterministic::LcgRng;
use crate::errors::DatasetError;
use crate::serde_canon::{hash_canonical_hex, CanonicalError};

/// Declared type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Float,
    Text,
}

impl ColumnType {
    /// Integer and floating-point columns are equally acceptable as numeric.
    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Float)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Text => "text",
        };
        f.write_str(name)
    }
}

/// Homogeneous column storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "values", rename_all = "lowercase")]
pub enum ColumnValues {
    Integer(Vec<i64>),
    Float(Vec<f64>),
    Text(Vec<String>),
}

impl ColumnValues {
    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Integer(v) => v.len(),
            ColumnValues::Float(v) => v.len(),
            ColumnValues::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn column_type(&self) -> ColumnType {
        match self {
            ColumnValues::Integer(_) => ColumnType::Integer,
            ColumnValues::Float(_) => ColumnType::Float,
            ColumnValues::Text(_) => ColumnType::Text,
        }
    }

    /// Whole column widened to f64, `None` for text columns
    pub fn to_f64(&self) -> Option<Vec<f64>> {
        match self {
            ColumnValues::Integer(v) => Some(v.iter().map(|&x| x as f64).collect()),
            ColumnValues::Float(v) => Some(v.clone()),
            ColumnValues::Text(_) => None,
        }
    }

    fn take(&self, indices: &[usize]) -> Self {
        match self {
            ColumnValues::Integer(v) => ColumnValues::Integer(indices.iter().map(|&i| v[i]).collect()),
            ColumnValues::Float(v) => ColumnValues::Float(indices.iter().map(|&i| v[i]).collect()),
            ColumnValues::Text(v) => {
                ColumnValues::Text(indices.iter().map(|&i| v[i].clone()).collect())
            }
        }
    }

    fn append(&mut self, other: &ColumnValues) -> bool {
        match (self, other) {
            (ColumnValues::Integer(a), ColumnValues::Integer(b)) => a.extend_from_slice(b),
            (ColumnValues::Float(a), ColumnValues::Float(b)) => a.extend_from_slice(b),
            (ColumnValues::Text(a), ColumnValues::Text(b)) => a.extend_from_slice(b),
            _ => return false,
        }
        true
    }
}

/// A named column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub values: ColumnValues,
}

impl Column {
    pub fn new(name: impl Into<String>, values: ColumnValues) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn float(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self::new(name, ColumnValues::Float(values))
    }

    pub fn integer(name: impl Into<String>, values: Vec<i64>) -> Self {
        Self::new(name, ColumnValues::Integer(values))
    }

    pub fn text(name: impl Into<String>, values: Vec<String>) -> Self {
        Self::new(name, ColumnValues::Text(values))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn column_type(&self) -> ColumnType {
        self.values.column_type()
    }

    /// Numeric values of this column, failing for text columns
    pub fn to_f64(&self) -> Result<Vec<f64>, DatasetError> {
        self.values.to_f64().ok_or_else(|| DatasetError::NonNumeric {
            column: self.name.clone(),
            found: self.column_type(),
        })
    }

    pub fn take(&self, indices: &[usize]) -> Self {
        Self {
            name: self.name.clone(),
            values: self.values.take(indices),
        }
    }
}

/// Ordered collection of equally long, uniquely named columns
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct TabularDataset {
    columns: Vec<Column>,
    rows: usize,
}

impl TabularDataset {
    /// Build a dataset, rejecting duplicate names and ragged columns
    pub fn new(columns: Vec<Column>) -> Result<Self, DatasetError> {
        let mut dataset = Self::default();
        for column in columns {
            dataset = dataset.with_column(column)?;
        }
        Ok(dataset)
    }

    /// Load a headered CSV file
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self, DatasetError> {
        let file = std::fs::File::open(path.as_ref())?;
        Self::from_csv_reader(file)
    }

    /// Read headered CSV data, inferring one type per column:
    /// integer if every cell parses as i64, float if every non-empty cell
    /// parses as f64 (empty cells become NaN), text otherwise.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, DatasetError> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
        let mut cells: Vec<Vec<String>> = vec![Vec::new(); headers.len()];

        for record in rdr.records() {
            let record = record?;
            for (i, field) in record.iter().enumerate() {
                cells[i].push(field.to_string());
            }
        }

        if cells.first().map_or(true, Vec::is_empty) {
            return Err(DatasetError::Empty);
        }

        let columns = headers
            .into_iter()
            .zip(cells)
            .map(|(name, raw)| Column::new(name, infer_values(raw)))
            .collect();

        Self::new(columns)
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.column(name).map(Column::column_type)
    }

    /// Append a column at the end of the column order
    pub fn with_column(mut self, column: Column) -> Result<Self, DatasetError> {
        if self.has_column(&column.name) {
            return Err(DatasetError::DuplicateColumn(column.name));
        }
        if self.columns.is_empty() {
            self.rows = column.len();
        } else if column.len() != self.rows {
            let actual = column.len();
            return Err(DatasetError::LengthMismatch {
                column: column.name,
                expected: self.rows,
                actual,
            });
        }
        self.columns.push(column);
        Ok(self)
    }

    /// Remove a column, failing if it does not exist
    pub fn without_column(mut self, name: &str) -> Result<Self, DatasetError> {
        let position = self
            .columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| DatasetError::UnknownColumn(name.to_string()))?;
        self.columns.remove(position);
        if self.columns.is_empty() {
            self.rows = 0;
        }
        Ok(self)
    }

    /// Rows at `indices`, in that order
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        Self {
            columns: self.columns.iter().map(|c| c.take(indices)).collect(),
            rows: indices.len(),
        }
    }

    /// The first `n` rows
    pub fn head(&self, n: usize) -> Self {
        let indices: Vec<usize> = (0..n.min(self.rows)).collect();
        self.select_rows(&indices)
    }

    /// Columns `names`, in that order
    pub fn select_columns(&self, names: &[String]) -> Result<Self, DatasetError> {
        let columns = names
            .iter()
            .map(|name| {
                self.column(name)
                    .cloned()
                    .ok_or_else(|| DatasetError::UnknownColumn(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(columns)
    }

    /// Stack `other` below `self`. Both must share column names, order and types.
    pub fn concat(&self, other: &TabularDataset) -> Result<Self, DatasetError> {
        if self.column_names() != other.column_names() {
            return Err(DatasetError::Incompatible(format!(
                "column sets differ: {:?} vs {:?}",
                self.column_names(),
                other.column_names()
            )));
        }

        let mut columns = self.columns.clone();
        for (column, extra) in columns.iter_mut().zip(&other.columns) {
            if !column.values.append(&extra.values) {
                return Err(DatasetError::Incompatible(format!(
                    "column '{}' is {} in one dataset and {} in the other",
                    column.name,
                    column.column_type(),
                    extra.column_type()
                )));
            }
        }

        Ok(Self {
            columns,
            rows: self.rows + other.rows,
        })
    }

    /// Row-major numeric matrix of the columns `names`, in that order
    pub fn feature_matrix(&self, names: &[String]) -> Result<Vec<Vec<f64>>, DatasetError> {
        let columns = names
            .iter()
            .map(|name| {
                self.column(name)
                    .ok_or_else(|| DatasetError::UnknownColumn(name.clone()))?
                    .to_f64()
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok((0..self.rows)
            .map(|row| columns.iter().map(|col| col[row]).collect())
            .collect())
    }

    /// BLAKE3 fingerprint of the canonical JSON form of all columns
    pub fn fingerprint(&self) -> Result<String, CanonicalError> {
        hash_canonical_hex(&self.columns)
    }
}

fn infer_values(cells: Vec<String>) -> ColumnValues {
    if let Ok(ints) = cells.iter().map(|c| c.parse::<i64>()).collect::<Result<Vec<_>, _>>() {
        return ColumnValues::Integer(ints);
    }

    let floats = cells
        .iter()
        .map(|c| {
            if c.is_empty() {
                Ok(f64::NAN)
            } else {
                c.parse::<f64>()
            }
        })
        .collect::<Result<Vec<_>, _>>();

    match floats {
        Ok(values) => ColumnValues::Float(values),
        Err(_) => ColumnValues::Text(cells),
    }
}

/// Result of [`train_test_split`]. The index vectors refer to rows of the
/// source dataset and are disjoint.
#[derive(Debug, Clone)]
pub struct TrainTestSplit {
    pub x_train: TabularDataset,
    pub x_test: TabularDataset,
    pub y_train: Column,
    pub y_test: Column,
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
}

/// Number of test rows for `n` samples: `ceil(test_size * n)`, tolerant of
/// representation error so that 0.2 of 1000 is exactly 200.
pub fn test_row_count(n: usize, test_size: f64) -> usize {
    let raw = test_size * n as f64;
    let rounded = raw.round();
    if (raw - rounded).abs() < 1e-9 {
        rounded as usize
    } else {
        raw.ceil() as usize
    }
}

/// Deterministically partition features and target into train and test sets.
///
/// Rows are permuted with a Fisher-Yates shuffle seeded by `random_state`;
/// the first `test_row_count` permuted rows form the test set.
pub fn train_test_split(
    x: &TabularDataset,
    y: &Column,
    test_size: f64,
    random_state: i64,
) -> Result<TrainTestSplit, DatasetError> {
    let n = x.len();
    if y.len() != n {
        return Err(DatasetError::LengthMismatch {
            column: y.name.clone(),
            expected: n,
            actual: y.len(),
        });
    }
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(DatasetError::InvalidSplit(format!(
            "test_size must be in (0, 1), got {test_size}"
        )));
    }

    let n_test = test_row_count(n, test_size);
    if n_test == 0 || n_test >= n {
        return Err(DatasetError::InvalidSplit(format!(
            "test_size {test_size} leaves {n_test} of {n} rows for testing"
        )));
    }

    let mut indices: Vec<usize> = (0..n).collect();
    LcgRng::new(random_state).shuffle(&mut indices);
    let (test_indices, train_indices) = indices.split_at(n_test);

    Ok(TrainTestSplit {
        x_train: x.select_rows(train_indices),
        x_test: x.select_rows(test_indices),
        y_train: y.take(train_indices),
        y_test: y.take(test_indices),
        train_indices: train_indices.to_vec(),
        test_indices: test_indices.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::collections::HashSet;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_csv() -> Result<NamedTempFile> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "MedInc,HouseAge,Ocean,MedHouseVal")?;
        writeln!(file, "8.3252,41,NEAR BAY,4.526")?;
        writeln!(file, "8.3014,21,NEAR BAY,3.585")?;
        writeln!(file, "7.2574,52,INLAND,")?;
        file.flush()?;
        Ok(file)
    }

    fn numbered(n: usize) -> (TabularDataset, Column) {
        let x = TabularDataset::new(vec![
            Column::integer("id", (0..n as i64).collect()),
            Column::float("MedInc", (0..n).map(|i| i as f64 * 0.5).collect()),
        ])
        .unwrap();
        let y = Column::float("MedHouseVal", (0..n).map(|i| i as f64).collect());
        (x, y)
    }

    #[test]
    fn test_load_csv_infers_types() -> Result<()> {
        let file = create_test_csv()?;
        let dataset = TabularDataset::from_csv(file.path())?;

        assert_eq!(dataset.len(), 3);
        assert_eq!(
            dataset.column_names(),
            vec!["MedInc", "HouseAge", "Ocean", "MedHouseVal"]
        );
        assert_eq!(dataset.column_type("MedInc"), Some(ColumnType::Float));
        assert_eq!(dataset.column_type("HouseAge"), Some(ColumnType::Integer));
        assert_eq!(dataset.column_type("Ocean"), Some(ColumnType::Text));

        let target = dataset.column("MedHouseVal").unwrap().to_f64()?;
        assert_eq!(target[0], 4.526);
        assert!(target[2].is_nan());
        Ok(())
    }

    #[test]
    fn test_empty_csv_rejected() -> Result<()> {
        let result = TabularDataset::from_csv_reader("MedInc,HouseAge\n".as_bytes());
        assert!(matches!(result, Err(DatasetError::Empty)));
        Ok(())
    }

    #[test]
    fn test_ragged_and_duplicate_columns_rejected() {
        let ragged = TabularDataset::new(vec![
            Column::float("a", vec![1.0, 2.0]),
            Column::float("b", vec![1.0]),
        ]);
        match ragged {
            Err(DatasetError::LengthMismatch { column, expected, actual }) => {
                assert_eq!(column, "b");
                assert_eq!((expected, actual), (2, 1));
            }
            other => panic!("expected LengthMismatch, got {other:?}"),
        }

        let duplicate = TabularDataset::new(vec![
            Column::float("a", vec![1.0]),
            Column::float("a", vec![2.0]),
        ]);
        assert!(matches!(duplicate, Err(DatasetError::DuplicateColumn(name)) if name == "a"));
    }

    #[test]
    fn test_with_and_without_column() -> Result<()> {
        let (x, y) = numbered(4);
        let joined = x.clone().with_column(y)?;
        assert_eq!(joined.column_names(), vec!["id", "MedInc", "MedHouseVal"]);

        let dropped = joined.without_column("MedInc")?;
        assert_eq!(dropped.column_names(), vec!["id", "MedHouseVal"]);
        assert_eq!(dropped.len(), 4);

        assert!(matches!(
            x.without_column("missing"),
            Err(DatasetError::UnknownColumn(_))
        ));
        Ok(())
    }

    #[test]
    fn test_concat_and_select() -> Result<()> {
        let (x, _) = numbered(6);
        let top = x.select_rows(&[0, 1]);
        let bottom = x.select_rows(&[4, 5]);
        let stacked = top.concat(&bottom)?;

        assert_eq!(stacked.len(), 4);
        assert_eq!(
            stacked.column("id").unwrap().values,
            ColumnValues::Integer(vec![0, 1, 4, 5])
        );

        let narrowed = x.select_columns(&["MedInc".to_string()])?;
        assert!(narrowed.concat(&x).is_err());
        Ok(())
    }

    #[test]
    fn test_feature_matrix_orders_columns() -> Result<()> {
        let (x, _) = numbered(3);
        let matrix = x.feature_matrix(&["MedInc".to_string(), "id".to_string()])?;
        assert_eq!(matrix, vec![vec![0.0, 0.0], vec![0.5, 1.0], vec![1.0, 2.0]]);
        Ok(())
    }

    #[test]
    fn test_split_sizes() -> Result<()> {
        let (x, y) = numbered(1000);
        let split = train_test_split(&x, &y, 0.2, 42)?;

        assert_eq!(split.x_train.len(), 800);
        assert_eq!(split.x_test.len(), 200);
        assert_eq!(split.y_train.len(), 800);
        assert_eq!(split.y_test.len(), 200);
        Ok(())
    }

    #[test]
    fn test_split_is_a_partition() -> Result<()> {
        let (x, y) = numbered(97);
        let split = train_test_split(&x, &y, 0.25, 7)?;

        let train: HashSet<usize> = split.train_indices.iter().copied().collect();
        let test: HashSet<usize> = split.test_indices.iter().copied().collect();
        assert!(train.is_disjoint(&test));
        assert_eq!(train.len() + test.len(), 97);
        assert_eq!(test.len(), 25);

        // Features and target stay aligned row for row
        let ids = split.x_train.column("id").unwrap().to_f64()?;
        let targets = split.y_train.to_f64()?;
        assert_eq!(ids, targets);
        Ok(())
    }

    #[test]
    fn test_split_determinism() -> Result<()> {
        let (x, y) = numbered(200);
        let first = train_test_split(&x, &y, 0.2, 42)?;
        let second = train_test_split(&x, &y, 0.2, 42)?;
        let other = train_test_split(&x, &y, 0.2, 43)?;

        assert_eq!(first.train_indices, second.train_indices);
        assert_eq!(first.x_test, second.x_test);
        assert_ne!(first.test_indices, other.test_indices);
        Ok(())
    }

    #[test]
    fn test_split_rejects_bad_input() {
        let (x, y) = numbered(10);
        assert!(matches!(
            train_test_split(&x, &y, 0.0, 1),
            Err(DatasetError::InvalidSplit(_))
        ));
        assert!(matches!(
            train_test_split(&x, &y, 1.0, 1),
            Err(DatasetError::InvalidSplit(_))
        ));

        let short = Column::float("MedHouseVal", vec![1.0]);
        assert!(matches!(
            train_test_split(&x, &short, 0.2, 1),
            Err(DatasetError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_row_count_rounding() {
        assert_eq!(test_row_count(1000, 0.2), 200);
        assert_eq!(test_row_count(20640, 0.2), 4128);
        assert_eq!(test_row_count(10, 0.25), 3);
    }

    #[test]
    fn test_fingerprint_tracks_content() -> Result<()> {
        let (x, _) = numbered(5);
        assert_eq!(x.fingerprint()?, x.clone().fingerprint()?);
        assert_ne!(x.fingerprint()?, x.head(4).fingerprint()?);
        Ok(())
    }
}
