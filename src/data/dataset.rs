//! Tensor-ready dataset over one resolved partition
//!
//! Construction runs the full pipeline eagerly:
//! load → optional cohort filter → balanced split → optional class balancing →
//! min-max scaling. Afterwards the dataset is immutable.

use crate::data::cohort::{CohortFilter, CohortSummary};
use crate::data::loader::FrameLoader;
use crate::data::preprocessing::{balance_classes, MinMaxScaler};
use crate::data::schema::ColumnRoles;
use crate::data::split::{BalancedSplitter, SplitOutcome, SplitReport};
use crate::data::{DatasetConfig, DatasetMode, Frame, NUM_CLASSES};
use crate::error::PrepError;
use crate::utils::memory;
use anyhow::{Context, Result};
use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use burn::tensor::TensorData;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Source of the frame the eICU scaler is fitted on
pub trait ReferenceDistribution {
    fn load(&self) -> Result<Frame>;

    /// Human-readable origin, for logs
    fn describe(&self) -> String;
}

/// Reference distribution read from a file
#[derive(Debug, Clone)]
pub struct FileReference {
    path: PathBuf,
}

impl FileReference {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl ReferenceDistribution for FileReference {
    fn load(&self) -> Result<Frame> {
        FrameLoader::new()
            .load(&self.path)
            .with_context(|| format!("Failed to load reference distribution {:?}", self.path))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Reference distribution held in memory
#[derive(Debug, Clone)]
pub struct FrameReference(pub Frame);

impl ReferenceDistribution for FrameReference {
    fn load(&self) -> Result<Frame> {
        Ok(self.0.clone())
    }

    fn describe(&self) -> String {
        format!("in-memory frame ({} rows)", self.0.n_rows())
    }
}

/// One row: scaled numeric features, integer categorical features, label
#[derive(Debug, Clone, PartialEq)]
pub struct TableItem {
    pub numeric: Vec<f32>,
    pub categorical: Vec<i64>,
    pub label: f32,
}

/// Prepared dataset for one split mode
#[derive(Debug, Clone)]
pub struct TableDataset {
    items: Vec<TableItem>,
    roles: ColumnRoles,
    scaler: MinMaxScaler,
    report: SplitReport,
    cohort: Option<CohortSummary>,
    balanced_counts: Option<[usize; NUM_CLASSES]>,
}

impl TableDataset {
    /// Load `config.data_path` and prepare it; the reference file comes from
    /// `config.reference_path`
    pub fn new(config: &DatasetConfig) -> Result<Self> {
        let reference = config.reference_path.as_ref().map(FileReference::new);
        Self::with_reference(
            config,
            reference.as_ref().map(|r| r as &dyn ReferenceDistribution),
        )
    }

    /// Load `config.data_path` and prepare it with an injected reference
    pub fn with_reference(
        config: &DatasetConfig,
        reference: Option<&dyn ReferenceDistribution>,
    ) -> Result<Self> {
        let raw = FrameLoader::new().load(&config.data_path)?;
        Self::from_frame(raw, config, reference)
    }

    /// Prepare an already loaded frame
    pub fn from_frame(
        raw: Frame,
        config: &DatasetConfig,
        reference: Option<&dyn ReferenceDistribution>,
    ) -> Result<Self> {
        let mode = config.dataset_mode;
        info!(
            "Preparing {} dataset ({:?} split, augmentation={}, cohort filter={})",
            mode, config.split_mode, config.augmentation, config.visualization
        );

        let roles = ColumnRoles::infer(&raw, mode)?;
        if let Some(expected) = &config.expected_features {
            roles.validate_expected(expected)?;
        }

        let (filtered, cohort) = if config.visualization {
            let filter = CohortFilter::new(mode).with_time_column(config.time_column.clone());
            let (frame, summary) = filter.apply(&raw)?;
            (Some(frame), Some(summary))
        } else {
            (None, None)
        };

        if let Some(bytes) = memory::current_usage() {
            debug!("Resident memory before split search: {}", memory::format_bytes(bytes));
        }

        let splitter = BalancedSplitter::new(config.split, mode);
        let SplitOutcome {
            train,
            test,
            report,
        } = splitter.split(filtered.as_ref().unwrap_or(&raw))?;
        drop(filtered);
        report.log();

        // eICU serves the unsplit working frame, so there is no train partition to balance
        let (train, balanced_counts) = match (config.augmentation, mode) {
            (true, DatasetMode::Mimic) => {
                let (balanced, counts) = balance_classes(&train, config.balance_seed)?;
                (balanced, Some(counts))
            }
            (true, DatasetMode::Eicu) => {
                warn!("Augmentation is ignored for eICU data, the working frame is served as-is");
                (train, None)
            }
            (false, _) => (train, None),
        };

        let mut scaler = MinMaxScaler::new();
        let serving = match mode {
            DatasetMode::Mimic => {
                drop(raw);
                scaler.fit(&train, &roles.numeric)?;
                if config.split_mode.is_train() {
                    train
                } else {
                    test
                }
            }
            DatasetMode::Eicu => {
                let reference = reference.ok_or_else(|| {
                    PrepError::InvalidConfig(
                        "eICU data requires a reference distribution for scaling".to_string(),
                    )
                })?;
                info!("Fitting scaler on reference {}", reference.describe());
                let reference_frame = reference.load()?;
                let reference_split = splitter
                    .split(&reference_frame)
                    .context("Failed to split reference distribution")?;
                scaler.fit(&reference_split.train, &roles.numeric)?;
                raw
            }
        };

        let numeric = scaler.transform(&serving, &roles.numeric)?;
        let categorical = categorical_rows(&serving, &roles.categorical)?;
        let labels = serving.labels()?;

        let items: Vec<TableItem> = numeric
            .into_iter()
            .zip(categorical)
            .zip(labels)
            .map(|((numeric, categorical), label)| TableItem {
                numeric,
                categorical,
                label: label as f32,
            })
            .collect();

        info!(
            "Dataset ready: {} rows, {} numeric and {} categorical features",
            items.len(),
            roles.numeric.len(),
            roles.categorical.len()
        );

        Ok(Self {
            items,
            roles,
            scaler,
            report,
            cohort,
            balanced_counts,
        })
    }

    pub fn roles(&self) -> &ColumnRoles {
        &self.roles
    }

    pub fn scaler(&self) -> &MinMaxScaler {
        &self.scaler
    }

    pub fn report(&self) -> &SplitReport {
        &self.report
    }

    pub fn cohort(&self) -> Option<&CohortSummary> {
        self.cohort.as_ref()
    }

    /// Per-class counts after oversampling, when augmentation ran
    pub fn balanced_counts(&self) -> Option<[usize; NUM_CLASSES]> {
        self.balanced_counts
    }
}

impl Dataset<TableItem> for TableDataset {
    fn get(&self, index: usize) -> Option<TableItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// Categorical columns truncated to integers, row-major
fn categorical_rows(frame: &Frame, columns: &[String]) -> Result<Vec<Vec<i64>>> {
    let mut rows = vec![Vec::with_capacity(columns.len()); frame.n_rows()];
    for name in columns {
        let values = frame.numeric(name)?;
        for (row, &value) in rows.iter_mut().zip(values) {
            row.push(value as i64);
        }
    }
    Ok(rows)
}

/// Collated tensors for a batch of rows
#[derive(Clone, Debug)]
pub struct TableBatch<B: Backend> {
    pub numeric: Tensor<B, 2>,
    pub categorical: Tensor<B, 2, Int>,
    pub labels: Tensor<B, 1>,
}

/// Batcher stacking [`TableItem`]s into tensors
#[derive(Clone, Debug)]
pub struct TableBatcher<B: Backend> {
    device: B::Device,
}

impl<B: Backend> TableBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<TableItem, TableBatch<B>> for TableBatcher<B> {
    fn batch(&self, items: Vec<TableItem>) -> TableBatch<B> {
        let batch_size = items.len();
        let n_numeric = items.first().map(|i| i.numeric.len()).unwrap_or(0);
        let n_categorical = items.first().map(|i| i.categorical.len()).unwrap_or(0);

        let numeric: Vec<f32> = items.iter().flat_map(|i| i.numeric.iter().copied()).collect();
        let categorical: Vec<i64> = items
            .iter()
            .flat_map(|i| i.categorical.iter().copied())
            .collect();
        let labels: Vec<f32> = items.iter().map(|i| i.label).collect();

        let numeric = Tensor::<B, 2>::from_data(
            TensorData::new(numeric, [batch_size, n_numeric]),
            &self.device,
        );
        let categorical = Tensor::<B, 2, Int>::from_data(
            TensorData::new(categorical, [batch_size, n_categorical]),
            &self.device,
        );
        let labels = Tensor::<B, 1>::from_data(TensorData::new(labels, [batch_size]), &self.device);

        TableBatch {
            numeric,
            categorical,
            labels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Column, SplitConfig, SplitMode};
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    /// 20 patients with one stay each; every stay walks through all classes
    fn synthetic_frame(mode: DatasetMode, offset: f64) -> Frame {
        let mut patient = Vec::new();
        let mut stay = Vec::new();
        let mut hr = Vec::new();
        let mut vaso = Vec::new();
        let mut shock = Vec::new();
        let mut annotation = Vec::new();
        let mut classes = Vec::new();
        for p in 0..20 {
            for r in 0..8 {
                patient.push(p as f64);
                stay.push((100 + p) as f64);
                hr.push(offset + (p * 8 + r) as f64);
                vaso.push(((p + r) % 2) as f64);
                shock.push((r % 2) as f64);
                annotation.push(if r < 3 { "no_circ" } else { "circ" }.to_string());
                classes.push(((p + r) % 4) as f64);
            }
        }
        Frame::new(vec![
            Column::numeric(mode.patient_id(), patient),
            Column::numeric(mode.stay_id(), stay),
            Column::numeric("HR", hr),
            Column::numeric("vasoactive/inotropic", vaso),
            Column::numeric("Shock_next_12h", shock),
            Column::text(
                "Annotation",
                annotation.iter().map(|a| a.to_string()).collect(),
            ),
            Column::numeric("classes", classes),
        ])
        .unwrap()
    }

    fn config(mode: DatasetMode, split_mode: SplitMode) -> DatasetConfig {
        DatasetConfig::new("unused.csv.gz", mode)
            .with_split_mode(split_mode)
            .with_split(SplitConfig {
                seed: 11,
                ..SplitConfig::default()
            })
    }

    #[test]
    fn test_train_items_are_scaled() {
        let cfg = config(DatasetMode::Mimic, SplitMode::Train);
        let dataset = TableDataset::from_frame(synthetic_frame(DatasetMode::Mimic, 0.0), &cfg, None)
            .unwrap();

        assert_eq!(dataset.roles().numeric, vec!["HR"]);
        assert_eq!(dataset.roles().categorical, vec!["vasoactive/inotropic"]);
        assert_eq!(dataset.len(), dataset.report().train.rows);

        let item = dataset.get(0).unwrap();
        assert_eq!(item.numeric.len(), 1);
        assert_eq!(item.categorical.len(), 1);
        for i in 0..dataset.len() {
            let v = dataset.get(i).unwrap().numeric[0];
            assert!((0.0..=1.0).contains(&v));
        }
        assert!(dataset.get(dataset.len()).is_none());
    }

    #[test]
    fn test_valid_and_test_read_held_out_partition() {
        let frame = synthetic_frame(DatasetMode::Mimic, 0.0);
        let valid = TableDataset::from_frame(
            frame.clone(),
            &config(DatasetMode::Mimic, SplitMode::Valid),
            None,
        )
        .unwrap();
        let test =
            TableDataset::from_frame(frame, &config(DatasetMode::Mimic, SplitMode::Test), None)
                .unwrap();

        assert_eq!(valid.len(), valid.report().test.rows);
        assert_eq!(valid.get(0), test.get(0));
    }

    #[test]
    fn test_augmentation_balances_train_items() {
        let cfg = config(DatasetMode::Mimic, SplitMode::Train).with_augmentation(true);
        let dataset = TableDataset::from_frame(synthetic_frame(DatasetMode::Mimic, 0.0), &cfg, None)
            .unwrap();

        let counts = dataset.balanced_counts().unwrap();
        assert!(counts.iter().all(|&c| c == counts[0]));
        assert_eq!(dataset.len(), counts.iter().sum::<usize>());
    }

    #[test]
    fn test_eicu_requires_reference() {
        let cfg = config(DatasetMode::Eicu, SplitMode::Train);
        let err = TableDataset::from_frame(synthetic_frame(DatasetMode::Eicu, 0.0), &cfg, None)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PrepError>(),
            Some(PrepError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_eicu_scales_whole_frame_with_reference_bounds() {
        let frame = synthetic_frame(DatasetMode::Eicu, 0.0);
        let reference = FrameReference(synthetic_frame(DatasetMode::Eicu, 1000.0));
        let cfg = config(DatasetMode::Eicu, SplitMode::Valid);

        let dataset = TableDataset::from_frame(frame.clone(), &cfg, Some(&reference)).unwrap();

        assert_eq!(dataset.len(), frame.n_rows());
        let bounds = dataset.scaler().bounds().unwrap();
        assert!(bounds.mins[0] >= 1000.0);
        // working values sit below the reference range
        assert!(dataset.get(0).unwrap().numeric[0] < 0.0);
    }

    #[test]
    fn test_eicu_ignores_augmentation() {
        let frame = synthetic_frame(DatasetMode::Eicu, 0.0);
        let reference = FrameReference(synthetic_frame(DatasetMode::Eicu, 0.0));
        let cfg = config(DatasetMode::Eicu, SplitMode::Train).with_augmentation(true);

        let dataset = TableDataset::from_frame(frame.clone(), &cfg, Some(&reference)).unwrap();

        assert!(dataset.balanced_counts().is_none());
        assert_eq!(dataset.len(), frame.n_rows());
    }

    #[test]
    fn test_batcher_shapes() {
        let device = <TestBackend as Backend>::Device::default();
        let batcher = TableBatcher::<TestBackend>::new(device);
        let items = vec![
            TableItem {
                numeric: vec![0.1, 0.2, 0.3],
                categorical: vec![1, 0],
                label: 3.0,
            },
            TableItem {
                numeric: vec![0.4, 0.5, 0.6],
                categorical: vec![0, 1],
                label: 0.0,
            },
        ];

        let batch = batcher.batch(items);
        assert_eq!(batch.numeric.dims(), [2, 3]);
        assert_eq!(batch.categorical.dims(), [2, 2]);
        assert_eq!(batch.labels.dims(), [2]);
    }
}
