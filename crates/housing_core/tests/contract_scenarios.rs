use anyhow::Result;
use housing_core::{
    train_test_split, ConfigStore, FeatureTransformer, SchemaContract, SchemaError,
    SchemaValidator, TabularDataset,
};
use std::fmt::Write as _;
use std::fs;
use tempfile::TempDir;

const DATA_YAML: &str = "\
split:
  test_size: 0.2
  random_state: 42
features:
  - MedInc
  - HouseAge
  - AveRooms
  - AveBedrms
  - Population
  - AveOccup
  - Latitude
  - Longitude
target_feature: MedHouseVal
";

const MODEL_YAML: &str = "\
params:
  n_estimators: 10
registered_model_name: housing-random-forest
";

fn write_configs(dir: &TempDir) -> Result<ConfigStore> {
    let data = dir.path().join("raw.yaml");
    let model = dir.path().join("random_forest.yaml");
    fs::write(&data, DATA_YAML)?;
    fs::write(&model, MODEL_YAML)?;
    Ok(ConfigStore::new(data, model))
}

fn housing_csv(rows: usize, skip: Option<&str>) -> Result<TabularDataset> {
    let columns = [
        "MedInc",
        "HouseAge",
        "AveRooms",
        "AveBedrms",
        "Population",
        "AveOccup",
        "Latitude",
        "Longitude",
        "MedHouseVal",
    ];
    let kept: Vec<usize> = (0..columns.len())
        .filter(|i| Some(columns[*i]) != skip)
        .collect();

    let mut csv = String::new();
    let header: Vec<&str> = kept.iter().map(|i| columns[*i]).collect();
    writeln!(csv, "{}", header.join(","))?;
    for r in 0..rows {
        let row: Vec<String> = kept
            .iter()
            .map(|c| format!("{:.3}", 1.0 + ((r * 13 + c * 5) % 50) as f64 / 7.0))
            .collect();
        writeln!(csv, "{}", row.join(","))?;
    }

    Ok(TabularDataset::from_csv_reader(csv.as_bytes())?)
}

#[test]
fn test_split_of_thousand_rows_is_800_200() -> Result<()> {
    let dir = TempDir::new()?;
    let config = write_configs(&dir)?.load()?;

    let full = housing_csv(1000, None)?;
    let target = full
        .column(&config.data.target_feature)
        .cloned()
        .expect("target column");
    let features = full.without_column(&config.data.target_feature)?;

    let split = train_test_split(
        &features,
        &target,
        config.data.split.test_size,
        config.data.split.random_state,
    )?;

    assert_eq!(split.x_train.len(), 800);
    assert_eq!(split.x_test.len(), 200);
    assert_eq!(split.y_train.len(), 800);
    assert_eq!(split.y_test.len(), 200);
    Ok(())
}

#[test]
fn test_missing_ave_rooms_is_reported() -> Result<()> {
    let dir = TempDir::new()?;
    let store = write_configs(&dir)?;
    let contract = SchemaContract::from_config(&store.load_data()?);

    let data = housing_csv(20, Some("AveRooms"))?;
    assert_eq!(
        SchemaValidator::validate(&data, &contract, false),
        Err(SchemaError::MissingColumns(vec!["AveRooms".to_string()]))
    );
    Ok(())
}

#[test]
fn test_income_log_transform_on_csv_row() -> Result<()> {
    let data = TabularDataset::from_csv_reader("MedInc,HouseAge\n8.0,41\n".as_bytes())?;
    let out = FeatureTransformer::default().transform(&data)?;

    assert!(!out.has_column("MedInc"));
    let logged = out.column("MedInc_log").expect("derived column").to_f64()?;
    assert_eq!(logged.len(), 1);
    assert!((logged[0] - 9.0f64.ln()).abs() < 1e-12);
    assert!((logged[0] - 2.1972).abs() < 1e-4);
    Ok(())
}

#[test]
fn test_transformed_splits_satisfy_output_contract() -> Result<()> {
    let dir = TempDir::new()?;
    let config = write_configs(&dir)?.load()?;
    let contract = SchemaContract::from_config(&config.data);
    let transformer = FeatureTransformer::default();

    let full = housing_csv(50, None)?;
    let target = full
        .column("MedHouseVal")
        .cloned()
        .expect("target column");
    let features = full.without_column("MedHouseVal")?;
    let split = train_test_split(&features, &target, 0.2, 42)?;

    let post = transformer.output_contract(&contract);
    for part in [&split.x_train, &split.x_test] {
        SchemaValidator::validate(part, &contract, true)?;
        let transformed = transformer.transform(part)?;
        SchemaValidator::validate(&transformed, &post, true)?;
        assert_eq!(transformed.column_names(), post.required_columns);
    }
    Ok(())
}
