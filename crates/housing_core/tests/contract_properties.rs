use housing_core::{
    test_row_count, train_test_split, Column, ColumnValues, FeatureTransformer, SchemaContract,
    SchemaError, SchemaValidator, TabularDataset,
};
use proptest::prelude::*;
use std::collections::HashSet;

// Property-based tests for the schema gate, the feature transform and the split

const FEATURES: [&str; 8] = [
    "MedInc",
    "HouseAge",
    "AveRooms",
    "AveBedrms",
    "Population",
    "AveOccup",
    "Latitude",
    "Longitude",
];
const TARGET: &str = "MedHouseVal";

fn contract() -> SchemaContract {
    SchemaContract::new(FEATURES.iter().map(|s| s.to_string()).collect(), TARGET)
}

fn housing_table(rows: usize, seed: u64, present: &[&str]) -> TabularDataset {
    let columns = present
        .iter()
        .enumerate()
        .map(|(c, name)| {
            let values = (0..rows)
                .map(|r| ((seed as usize + r * 31 + c * 7) % 97) as f64 / 10.0)
                .collect();
            Column::float(*name, values)
        })
        .collect();
    TabularDataset::new(columns).unwrap()
}

fn numbered(rows: usize) -> (TabularDataset, Column) {
    let ids: Vec<i64> = (0..rows as i64).collect();
    let x = TabularDataset::new(vec![Column::integer("row_id", ids.clone())]).unwrap();
    let y = Column::integer(TARGET, ids);
    (x, y)
}

fn ids(table: &TabularDataset) -> Vec<i64> {
    match &table.column("row_id").unwrap().values {
        ColumnValues::Integer(v) => v.clone(),
        other => panic!("unexpected values {other:?}"),
    }
}

proptest! {
    #[test]
    fn superset_datasets_always_validate(
        rows in 1usize..20,
        seed in any::<u64>(),
        extras in prop::collection::vec("[a-z]{3,8}", 0..4),
    ) {
        let mut names: Vec<&str> = FEATURES.to_vec();
        names.push(TARGET);
        let mut table = housing_table(rows, seed, &names);
        for (i, extra) in extras.iter().enumerate() {
            let name = format!("extra_{i}_{extra}");
            table = table.with_column(Column::float(name, vec![0.0; rows])).unwrap();
        }

        prop_assert!(SchemaValidator::validate(&table, &contract(), false).is_ok());
    }
}

proptest! {
    #[test]
    fn missing_features_are_named_exactly(
        drop_mask in prop::collection::vec(any::<bool>(), FEATURES.len()),
    ) {
        prop_assume!(drop_mask.iter().any(|d| *d));

        let mut present: Vec<&str> = FEATURES
            .iter()
            .zip(&drop_mask)
            .filter(|(_, dropped)| !**dropped)
            .map(|(name, _)| *name)
            .collect();
        present.push(TARGET);
        let table = housing_table(3, 1, &present);

        let expected: Vec<String> = FEATURES
            .iter()
            .zip(&drop_mask)
            .filter(|(_, dropped)| **dropped)
            .map(|(name, _)| name.to_string())
            .collect();

        prop_assert_eq!(
            SchemaValidator::validate(&table, &contract(), false),
            Err(SchemaError::MissingColumns(expected))
        );
    }
}

proptest! {
    #[test]
    fn transform_is_deterministic_and_preserves_rows(
        incomes in prop::collection::vec(0.0f64..20.0, 1..50),
    ) {
        let rows = incomes.len();
        let table = TabularDataset::new(vec![
            Column::float("MedInc", incomes.clone()),
            Column::float("HouseAge", vec![10.0; rows]),
        ])
        .unwrap();

        let transformer = FeatureTransformer::default();
        let first = transformer.transform(&table).unwrap();
        let second = transformer.transform(&table).unwrap();

        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first.len(), rows);
        prop_assert!(!first.has_column("MedInc"));
        prop_assert!(first.has_column("MedInc_log"));

        let logged = first.column("MedInc_log").unwrap().to_f64().unwrap();
        for (v, out) in incomes.iter().zip(&logged) {
            prop_assert_eq!(*out, v.ln_1p());
        }
    }
}

proptest! {
    #[test]
    fn split_is_a_deterministic_partition(
        rows in 2usize..400,
        test_size in 0.05f64..0.95,
        seed in any::<i64>(),
    ) {
        let n_test = test_row_count(rows, test_size);
        prop_assume!(n_test > 0 && n_test < rows);
        let (x, y) = numbered(rows);

        let first = train_test_split(&x, &y, test_size, seed).unwrap();
        let second = train_test_split(&x, &y, test_size, seed).unwrap();

        prop_assert_eq!(&first.train_indices, &second.train_indices);
        prop_assert_eq!(&first.test_indices, &second.test_indices);
        prop_assert_eq!(&first.x_train, &second.x_train);

        prop_assert_eq!(first.x_test.len(), n_test);
        prop_assert_eq!(first.x_train.len() + first.x_test.len(), rows);
        prop_assert_eq!(first.y_train.len(), first.x_train.len());
        prop_assert_eq!(first.y_test.len(), first.x_test.len());

        let train: HashSet<i64> = ids(&first.x_train).into_iter().collect();
        let test: HashSet<i64> = ids(&first.x_test).into_iter().collect();
        prop_assert!(train.is_disjoint(&test));
        prop_assert_eq!(train.len() + test.len(), rows);
    }
}
