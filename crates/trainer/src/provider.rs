//! Dataset providers
//!
//! A provider hands the pipeline one feature table and its target column.
//! The CSV provider reads a headered file; the synthetic provider generates
//! California-housing shaped data so the pipeline runs without a download.

use housing_core::deterministic::LcgRng;
use housing_core::{Column, DatasetError, TabularDataset};
use std::path::PathBuf;
use tracing::info;

/// Target column of the California housing data
pub const HOUSING_TARGET: &str = "MedHouseVal";

/// Source of the raw (features, target) pair
pub trait DatasetProvider: Send + Sync {
    fn fetch(&self) -> Result<(TabularDataset, Column), DatasetError>;

    /// Human-readable source description for logs and tags
    fn describe(&self) -> String;
}

/// Split `target` off a full table
pub fn split_target(
    table: TabularDataset,
    target: &str,
) -> Result<(TabularDataset, Column), DatasetError> {
    let y = table
        .column(target)
        .cloned()
        .ok_or_else(|| DatasetError::UnknownColumn(target.to_string()))?;
    let x = table.without_column(target)?;
    Ok((x, y))
}

/// Headered CSV file with the target as one of its columns
#[derive(Debug, Clone)]
pub struct CsvDatasetProvider {
    pub path: PathBuf,
    pub target: String,
}

impl CsvDatasetProvider {
    pub fn new(path: impl Into<PathBuf>, target: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            target: target.into(),
        }
    }
}

impl DatasetProvider for CsvDatasetProvider {
    fn fetch(&self) -> Result<(TabularDataset, Column), DatasetError> {
        let table = TabularDataset::from_csv(&self.path)?;
        info!(
            "Loaded {} rows with {} columns from {}",
            table.len(),
            table.columns().len(),
            self.path.display()
        );
        split_target(table, &self.target)
    }

    fn describe(&self) -> String {
        format!("csv:{}", self.path.display())
    }
}

/// Deterministic California-housing shaped data
#[derive(Debug, Clone, Copy)]
pub struct SyntheticHousingProvider {
    pub rows: usize,
    pub seed: i64,
}

impl SyntheticHousingProvider {
    /// Same row count as the public California housing dataset
    pub const DEFAULT_ROWS: usize = 20_640;

    pub fn new(rows: usize, seed: i64) -> Self {
        Self { rows, seed }
    }
}

impl Default for SyntheticHousingProvider {
    fn default() -> Self {
        Self::new(Self::DEFAULT_ROWS, 0)
    }
}

fn uniform(rng: &mut LcgRng, low: f64, high: f64) -> f64 {
    low + (high - low) * rng.next_unit()
}

/// Round to the given number of decimals, as published data is
fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

impl DatasetProvider for SyntheticHousingProvider {
    fn fetch(&self) -> Result<(TabularDataset, Column), DatasetError> {
        if self.rows == 0 {
            return Err(DatasetError::Empty);
        }

        let mut rng = LcgRng::new(self.seed);
        let n = self.rows;
        let mut med_inc = Vec::with_capacity(n);
        let mut house_age = Vec::with_capacity(n);
        let mut ave_rooms = Vec::with_capacity(n);
        let mut ave_bedrms = Vec::with_capacity(n);
        let mut population = Vec::with_capacity(n);
        let mut ave_occup = Vec::with_capacity(n);
        let mut latitude = Vec::with_capacity(n);
        let mut longitude = Vec::with_capacity(n);
        let mut value = Vec::with_capacity(n);

        for _ in 0..n {
            // Income skews low: square of a uniform draw
            let u = rng.next_unit();
            let inc = 0.5 + 14.5 * u * u;
            let age = 1 + rng.next_index(52) as i64;
            let rooms = uniform(&mut rng, 3.0, 5.0) + 0.25 * inc;
            let bedrms = uniform(&mut rng, 0.9, 1.3);
            let pop = uniform(&mut rng, 100.0, 3500.0).round();
            let occup = uniform(&mut rng, 1.5, 4.5);
            let lat = uniform(&mut rng, 32.5, 42.0);
            let lon = -124.3 + (42.0 - lat) * 0.8 + uniform(&mut rng, 0.0, 2.5);
            let noise = uniform(&mut rng, -0.3, 0.3);

            let coastal = (-118.0 - lon).max(0.0) * 0.15;
            let target = 0.4 * inc + 0.008 * age as f64 - 0.06 * (lat - 34.0).abs() + coastal
                - 0.05 * occup
                + noise;

            med_inc.push(round_to(inc, 4));
            house_age.push(age);
            ave_rooms.push(round_to(rooms, 4));
            ave_bedrms.push(round_to(bedrms, 4));
            population.push(pop);
            ave_occup.push(round_to(occup, 4));
            latitude.push(round_to(lat, 2));
            longitude.push(round_to(lon, 2));
            value.push(round_to(target.clamp(0.15, 5.00001), 5));
        }

        let x = TabularDataset::new(vec![
            Column::float("MedInc", med_inc),
            Column::integer("HouseAge", house_age),
            Column::float("AveRooms", ave_rooms),
            Column::float("AveBedrms", ave_bedrms),
            Column::float("Population", population),
            Column::float("AveOccup", ave_occup),
            Column::float("Latitude", latitude),
            Column::float("Longitude", longitude),
        ])?;
        info!("Generated {} synthetic housing rows (seed {})", n, self.seed);
        Ok((x, Column::float(HOUSING_TARGET, value)))
    }

    fn describe(&self) -> String {
        format!("synthetic:rows={},seed={}", self.rows, self.seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use housing_core::ColumnType;
    use std::io::Write;

    #[test]
    fn test_synthetic_shape_and_determinism() {
        let provider = SyntheticHousingProvider::new(200, 3);
        let (x, y) = provider.fetch().unwrap();
        let (x2, y2) = provider.fetch().unwrap();

        assert_eq!(x.len(), 200);
        assert_eq!(y.len(), 200);
        assert_eq!(x, x2);
        assert_eq!(y, y2);
        assert_eq!(x.column_type("HouseAge"), Some(ColumnType::Integer));
        assert_eq!(y.name, HOUSING_TARGET);

        let incomes = x.column("MedInc").unwrap().to_f64().unwrap();
        assert!(incomes.iter().all(|v| (0.5..=15.0).contains(v)));

        let (other, _) = SyntheticHousingProvider::new(200, 4).fetch().unwrap();
        assert_ne!(x, other);
    }

    #[test]
    fn test_synthetic_rejects_zero_rows() {
        assert!(matches!(
            SyntheticHousingProvider::new(0, 1).fetch(),
            Err(DatasetError::Empty)
        ));
    }

    #[test]
    fn test_csv_provider_splits_target() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "MedInc,HouseAge,MedHouseVal").unwrap();
        writeln!(file, "8.0,41,4.5").unwrap();
        writeln!(file, "3.5,20,2.1").unwrap();
        file.flush().unwrap();

        let provider = CsvDatasetProvider::new(file.path(), "MedHouseVal");
        let (x, y) = provider.fetch().unwrap();
        assert_eq!(x.column_names(), vec!["MedInc".to_string(), "HouseAge".to_string()]);
        assert_eq!(y.to_f64().unwrap(), vec![4.5, 2.1]);
        assert!(provider.describe().starts_with("csv:"));

        let missing = CsvDatasetProvider::new(file.path(), "Price");
        assert!(matches!(missing.fetch(), Err(DatasetError::UnknownColumn(_))));
    }
}
