use burn::data::dataset::Dataset;
use flate2::write::GzEncoder;
use flate2::Compression;
use icu_tabular::data::dataset::FileReference;
use icu_tabular::{
    BalancedSplitter, DatasetConfig, DatasetMode, FrameLoader, PrepError, SplitConfig, SplitMode,
    TableDataset,
};
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const HEADER: &str = "subject_id,stay_id,hadm_id,HR,MAP,vasoactive/inotropic,Shock_next_12h,ethnicity,Annotation,classes";

/// One CSV row for a MIMIC-style frame
fn row(patient: usize, step: usize, annotation: &str, class: u8) -> String {
    let ethnicity = ["white", "black", "asian"][patient % 3];
    format!(
        "{},{},{},{},{},{},{},{},{},{}",
        patient,
        10_000 + patient,
        50_000 + patient,
        60 + (patient * 7 + step) % 50,
        if step == 1 { "inf".to_string() } else { format!("{}", 65 + step) },
        step % 2,
        (patient + step) % 2,
        ethnicity,
        annotation,
        class
    )
}

fn write_gz(dir: &Path, name: &str, lines: &[String]) -> PathBuf {
    let path = dir.join(name);
    let file = std::fs::File::create(&path).unwrap();
    let mut encoder = GzEncoder::new(file, Compression::default());
    writeln!(encoder, "{}", HEADER).unwrap();
    for line in lines {
        writeln!(encoder, "{}", line).unwrap();
    }
    encoder.finish().unwrap();
    path
}

/// 40 patients in 4 groups; group g carries two extra rows of class g
fn grouped_rows() -> Vec<String> {
    let mut lines = Vec::new();
    for patient in 0..40 {
        let group = (patient % 4) as u8;
        let mut classes = vec![0u8, 1, 2, 3, group, group];
        classes.rotate_left(patient % 6);
        for (step, class) in classes.into_iter().enumerate() {
            let annotation = if step < 3 { "no_circ" } else { "circ" };
            lines.push(row(patient, step, annotation, class));
        }
    }
    lines
}

/// 10 recovery, 10 deterioration and 5 stays that start in circulatory failure
fn trajectory_rows() -> Vec<String> {
    let mut lines = Vec::new();
    for patient in 0..10 {
        for (step, (annotation, class)) in [
            ("no_circ", 0),
            ("no_circ", 1),
            ("no_circ", 3),
            ("circ", 2),
            ("circ", 1),
        ]
        .into_iter()
        .enumerate()
        {
            lines.push(row(patient, step, annotation, class));
        }
    }
    for patient in 10..20 {
        let mut steps = vec![("no_circ", 0), ("no_circ", 1), ("no_circ", 0)];
        steps.extend(std::iter::repeat(("circ", 3)).take(10));
        for (step, (annotation, class)) in steps.into_iter().enumerate() {
            lines.push(row(patient, step, annotation, class));
        }
    }
    for patient in 20..25 {
        for (step, class) in [0, 1, 2, 3].into_iter().enumerate() {
            lines.push(row(patient, step, "circ", class));
        }
    }
    lines
}

#[test]
fn test_grouped_split_within_tolerance() {
    let dir = TempDir::new().unwrap();
    let path = write_gz(dir.path(), "mimic.csv.gz", &grouped_rows());

    let frame = FrameLoader::new().load(&path).unwrap();
    assert_eq!(frame.n_rows(), 240);
    assert!(frame.numeric("MAP").unwrap().iter().all(|v| v.is_finite()));

    let splitter = BalancedSplitter::new(SplitConfig::default(), DatasetMode::Mimic);
    let outcome = splitter.split(&frame).unwrap();
    let report = &outcome.report;

    assert!(report.converged);
    assert!(report.ratio_gap() <= 0.05 + 1e-9);
    assert_eq!(report.train.patients, 28);
    assert_eq!(report.test.patients, 12);

    let train: HashSet<String> = outcome.train.keys("subject_id").unwrap().into_iter().collect();
    let test: HashSet<String> = outcome.test.keys("subject_id").unwrap().into_iter().collect();
    assert!(train.is_disjoint(&test));
    assert_eq!(train.len() + test.len(), 40);
}

#[test]
fn test_train_and_valid_datasets_partition_rows() {
    let dir = TempDir::new().unwrap();
    let path = write_gz(dir.path(), "mimic.csv.gz", &grouped_rows());

    let base = DatasetConfig::new(&path, DatasetMode::Mimic).with_seed(5);
    let train = TableDataset::new(&base.clone().with_split_mode(SplitMode::Train)).unwrap();
    let valid = TableDataset::new(&base.with_split_mode(SplitMode::Valid)).unwrap();

    assert_eq!(train.len() + valid.len(), 240);
    assert_eq!(train.report().train, valid.report().train);
    assert_eq!(train.len(), train.report().train.rows);
    assert_eq!(valid.len(), valid.report().test.rows);
    assert_eq!(train.roles().numeric, vec!["HR", "MAP"]);
    assert_eq!(train.roles().categorical, vec!["vasoactive/inotropic"]);

    // validation rows use the bounds fitted on the training rows
    assert_eq!(train.scaler().bounds(), valid.scaler().bounds());
}

#[test]
fn test_cohort_filter_then_augment() {
    let dir = TempDir::new().unwrap();
    let path = write_gz(dir.path(), "trajectories.csv.gz", &trajectory_rows());

    let config = DatasetConfig::new(&path, DatasetMode::Mimic)
        .with_visualization(true)
        .with_augmentation(true);
    let dataset = TableDataset::new(&config).unwrap();

    let cohort = dataset.cohort().unwrap();
    assert_eq!(cohort.recovery_stays, 10);
    assert_eq!(cohort.deterioration_stays, 10);
    assert_eq!(cohort.output_rows, 10 * 4 + 10 * 13);

    let counts = dataset.balanced_counts().unwrap();
    assert!(counts.iter().all(|&c| c == counts[3]));
    assert_eq!(dataset.len(), counts.iter().sum::<usize>());

    let labels: HashSet<u8> = (0..dataset.len())
        .map(|i| dataset.get(i).unwrap().label as u8)
        .collect();
    assert_eq!(labels.len(), 4);
}

#[test]
fn test_eicu_with_reference_file() {
    let dir = TempDir::new().unwrap();
    let eicu_rows: Vec<String> = grouped_rows();
    let header_eicu = HEADER
        .replace("subject_id", "uniquepid")
        .replace("stay_id", "patientunitstayid")
        .replace("hadm_id,", "");
    let strip_hadm = |line: &String| {
        let mut fields: Vec<&str> = line.split(',').collect();
        fields.remove(2);
        fields.join(",")
    };

    let write_eicu = |name: &str| {
        let path = dir.path().join(name);
        let file = std::fs::File::create(&path).unwrap();
        let mut encoder = GzEncoder::new(file, Compression::default());
        writeln!(encoder, "{}", header_eicu).unwrap();
        for line in &eicu_rows {
            writeln!(encoder, "{}", strip_hadm(line)).unwrap();
        }
        encoder.finish().unwrap();
        path
    };
    let data = write_eicu("eicu.csv.gz");
    let reference = write_eicu("eicu_reference.csv.gz");

    let config = DatasetConfig::new(&data, DatasetMode::Eicu)
        .with_split_mode(SplitMode::Test)
        .with_reference_path(&reference);
    let dataset = TableDataset::new(&config).unwrap();

    // the whole working frame is served regardless of split mode
    assert_eq!(dataset.len(), 240);
    assert_eq!(dataset.roles().numeric, vec!["HR", "MAP"]);

    let missing = DatasetConfig::new(&data, DatasetMode::Eicu);
    let err = TableDataset::with_reference(&missing, None).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PrepError>(),
        Some(PrepError::InvalidConfig(_))
    ));

    let broken = TableDataset::with_reference(
        &missing,
        Some(&FileReference::new(dir.path().join("absent.csv.gz"))),
    );
    assert!(broken.is_err());
}

#[test]
fn test_missing_input_fails_fast() {
    let config = DatasetConfig::new("/nonexistent/mimic.csv.gz", DatasetMode::Mimic);
    assert!(TableDataset::new(&config).is_err());
}
