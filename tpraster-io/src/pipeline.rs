//! Multi-file dataset building.
//!
//! Each file is read, clustered and rasterized into its own accumulator.
//! Accumulators of successful files are concatenated in the order the files
//! were given. A file that fails contributes nothing; the rest of the batch
//! continues.

use crate::config::PipelineConfig;
use crate::reader::TpTableReader;
use crate::{Error, Result};
use log::{error, info};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tpraster_algorithms::{BuildReport, Dataset, DatasetAccumulator, DatasetBuilder};

/// Outcome of one input file.
#[derive(Debug)]
pub enum FileStatus {
    /// File processed; its images are part of the dataset.
    Processed(BuildReport),
    /// File aborted; nothing from it was kept.
    Failed(Error),
}

/// Per-file entry of a [`BatchReport`].
#[derive(Debug)]
pub struct FileReport {
    pub path: PathBuf,
    pub status: FileStatus,
}

/// Summary of a multi-file run.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// One entry per input file, in input order.
    pub files: Vec<FileReport>,
    /// Counters summed over processed files.
    pub totals: BuildReport,
}

impl BatchReport {
    /// Number of files that were processed.
    #[must_use]
    pub fn processed(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.status, FileStatus::Processed(_)))
            .count()
    }

    /// Files that failed, with their errors.
    pub fn failures(&self) -> impl Iterator<Item = (&Path, &Error)> {
        self.files.iter().filter_map(|f| match &f.status {
            FileStatus::Failed(err) => Some((f.path.as_path(), err)),
            FileStatus::Processed(_) => None,
        })
    }
}

/// Builds the dataset contributed by a single TP table.
///
/// # Errors
/// Returns an error if the file cannot be read or parsed, or if clustering
/// fails.
pub fn process_file<P: AsRef<Path>>(
    path: P,
    builder: &DatasetBuilder<'_>,
) -> Result<(DatasetAccumulator, BuildReport)> {
    let table = TpTableReader::open(path)?.read()?;
    let mut acc = builder.accumulator();
    let mut report = BuildReport::default();
    builder.build_from_events(table.into_streams(), &mut acc, &mut report)?;
    Ok((acc, report))
}

/// Builds one dataset from several TP tables.
///
/// Output order is file order, then event order, then cluster order.
///
/// # Errors
/// Per-file failures are recorded in the [`BatchReport`], not returned.
/// An error is returned only if per-file results cannot be concatenated.
pub fn build_dataset_from_files<P: AsRef<Path> + Sync>(
    paths: &[P],
    config: &PipelineConfig,
) -> Result<(Dataset, BatchReport)> {
    let builder = config.builder();
    let run = |path: &P| process_file(path, &builder);
    let results: Vec<_> = if config.dataset.parallel {
        paths.par_iter().map(run).collect()
    } else {
        paths.iter().map(run).collect()
    };

    let mut dataset = builder.accumulator();
    let mut batch = BatchReport::default();
    for (path, result) in paths.iter().zip(results) {
        let path = path.as_ref().to_path_buf();
        let status = match result {
            Ok((acc, report)) => {
                info!(
                    "{}: {} events, {} clusters, {} images",
                    path.display(),
                    report.events,
                    report.clusters_seen,
                    report.images
                );
                dataset.append(acc)?;
                batch.totals.merge(&report);
                FileStatus::Processed(report)
            }
            Err(err) => {
                error!("{}: {err}", path.display());
                FileStatus::Failed(err)
            }
        };
        batch.files.push(FileReport { path, status });
    }
    Ok((dataset.finish(), batch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::s;
    use std::fs;
    use tempfile::tempdir;
    use tpraster_core::METADATA_WIDTH;

    const TRACK: &str = "\
event time_start time_over_threshold time_peak channel adc_integral adc_peak
1 100 8 104 1700 1500 200
1 102 8 106 1700 1500 200
1 104 8 108 1700 1500 200
2 500 8 504 1800 1500 200
";

    #[test]
    fn test_batch_skips_broken_file() {
        let dir = tempdir().unwrap();
        let good = dir.path().join("good.txt");
        let missing_column = dir.path().join("bad.txt");
        let absent = dir.path().join("absent.txt");
        fs::write(&good, TRACK).unwrap();
        fs::write(&missing_column, "time_start channel\n1 2\n").unwrap();

        let config = PipelineConfig::default();
        let paths = [good.clone(), missing_column, absent, good];
        let (dataset, report) = build_dataset_from_files(&paths, &config).unwrap();

        assert_eq!(report.files.len(), 4);
        assert_eq!(report.processed(), 2);
        let failures: Vec<_> = report.failures().collect();
        assert_eq!(failures.len(), 2);
        assert!(failures[0].1.is_structural());
        assert!(matches!(failures[1].1, Error::Io(_)));

        // Two clusters per good file.
        assert_eq!(report.totals.images, 4);
        assert_eq!(dataset.len(), 4);
        assert_eq!(dataset.metadata.dim(), (4, METADATA_WIDTH));
        // File order is preserved: both copies start with the same track.
        assert_eq!(
            dataset.images.slice(s![0, .., ..]),
            dataset.images.slice(s![2, .., ..])
        );
    }

    #[test]
    fn test_no_files() {
        let config = PipelineConfig::default();
        let (dataset, report) = build_dataset_from_files::<PathBuf>(&[], &config).unwrap();
        assert!(dataset.is_empty());
        assert_eq!(dataset.images.dim(), (0, 32, 32));
        assert!(report.files.is_empty());
    }
}
