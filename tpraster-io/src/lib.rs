//! tpraster-io: TP table input and dataset output for tpraster.
//!
//! This crate reads trigger-primitive tables through memory-mapped files
//! via memmap2 and writes finished datasets as `.npy`, CSV and, with the
//! `hdf5` feature, HDF5.
//!

pub mod config;
mod error;
#[cfg(feature = "hdf5")]
pub mod hdf5;
pub mod pipeline;
mod reader;
mod writer;

pub use config::PipelineConfig;
pub use error::{Error, Result};
#[cfg(feature = "hdf5")]
pub use hdf5::{read_dataset_hdf5, write_dataset_hdf5, Hdf5WriteOptions};
pub use pipeline::{build_dataset_from_files, process_file, BatchReport, FileReport, FileStatus};
pub use reader::{
    parse_tp_table, MappedFileReader, TableSummary, TpEvent, TpTable, TpTableReader,
};
pub use writer::{write_metadata_csv, write_npy, ClusterFileWriter, DatasetWriter, WrittenFiles};
