//! HDF5 dataset output.
//!
//! Layout: root datasets `images` `(N, H, W)` and `metadata` `(N, K)`, both
//! `f32`. `metadata` carries a `columns` string-array attribute naming its
//! columns in order.

use crate::{Error, Result};
use hdf5::types::VarLenUnicode;
use hdf5::{Dataset as H5Dataset, File, Group};
use ndarray::{Array2, Array3, ArrayView1, Ix2, Ix3};
use std::path::Path;
use std::str::FromStr;
use tpraster_algorithms::Dataset;
use tpraster_core::image::{METADATA_COLUMNS, METADATA_WIDTH};

/// Write configuration.
#[derive(Clone, Debug)]
pub struct Hdf5WriteOptions {
    /// Deflate level, `None` for uncompressed output.
    pub compression: Option<u8>,
    pub shuffle: bool,
}

impl Default for Hdf5WriteOptions {
    fn default() -> Self {
        Self {
            compression: Some(4),
            shuffle: true,
        }
    }
}

/// Creates an `f32` dataset. Filters need chunked storage and chunks cannot
/// be empty, so empty datasets are stored contiguously.
macro_rules! create_dataset {
    ($group:expr, $name:expr, $shape:expr, $chunk:expr, $options:expr) => {{
        let mut builder = $group.new_dataset::<f32>().shape($shape);
        let chunk = $chunk;
        if chunk.iter().all(|&d: &usize| d > 0) {
            builder = builder.chunk(chunk);
            if let Some(level) = $options.compression {
                builder = builder.deflate(level);
            }
            if $options.shuffle {
                builder = builder.shuffle();
            }
        }
        builder.create($name)
    }};
}

/// Writes a dataset to a new HDF5 file.
///
/// # Errors
/// Returns an error if the file or its datasets cannot be created.
pub fn write_dataset_hdf5<P: AsRef<Path>>(
    path: P,
    dataset: &Dataset,
    options: &Hdf5WriteOptions,
) -> Result<()> {
    let file = File::create(path)?;
    set_attr_str(&file, "tpraster_format_version", "0.1")?;

    let (n, height, width) = dataset.images.dim();
    let images: H5Dataset = create_dataset!(
        file,
        "images",
        (n, height, width),
        [1, height, width],
        options
    )?;
    images.write(dataset.images.view())?;

    let metadata: H5Dataset = create_dataset!(
        file,
        "metadata",
        (n, METADATA_WIDTH),
        [n.min(1024), METADATA_WIDTH],
        options
    )?;
    metadata.write(dataset.metadata.view())?;

    let columns: Vec<VarLenUnicode> = METADATA_COLUMNS
        .iter()
        .map(|name| to_var_len_unicode(name))
        .collect::<Result<Vec<_>>>()?;
    metadata
        .new_attr::<VarLenUnicode>()
        .shape((columns.len(),))
        .create("columns")?
        .write(ArrayView1::from(columns.as_slice()))?;
    Ok(())
}

/// Reads a dataset written by [`write_dataset_hdf5`].
///
/// # Errors
/// Returns an error if the file is missing either dataset or the shapes are
/// inconsistent.
pub fn read_dataset_hdf5<P: AsRef<Path>>(path: P) -> Result<Dataset> {
    let file = File::open(path)?;
    let images: Array3<f32> = file.dataset("images")?.read::<f32, Ix3>()?;
    let metadata: Array2<f32> = file.dataset("metadata")?.read::<f32, Ix2>()?;
    if images.dim().0 != metadata.nrows() || metadata.ncols() != METADATA_WIDTH {
        return Err(Error::InvalidFormat(format!(
            "images has {} entries but metadata is {:?}",
            images.dim().0,
            metadata.dim()
        )));
    }
    Ok(Dataset { images, metadata })
}

fn set_attr_str(group: &Group, name: &str, value: &str) -> Result<()> {
    let value = to_var_len_unicode(value)?;
    group
        .new_attr::<VarLenUnicode>()
        .create(name)?
        .write_scalar(&value)?;
    Ok(())
}

fn to_var_len_unicode(value: &str) -> Result<VarLenUnicode> {
    VarLenUnicode::from_str(value)
        .map_err(|e| Error::InvalidFormat(format!("invalid utf-8 attribute: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_hdf5_roundtrip() {
        let mut images = Array3::zeros((2, 4, 3));
        images[[1, 2, 0]] = 150.0f32;
        let mut metadata = Array2::from_elem((2, METADATA_WIDTH), -1.0f32);
        metadata[[1, 10]] = 2.0;
        let dataset = Dataset { images, metadata };

        let file = NamedTempFile::new().unwrap();
        write_dataset_hdf5(file.path(), &dataset, &Hdf5WriteOptions::default()).unwrap();
        let back = read_dataset_hdf5(file.path()).unwrap();
        assert_eq!(back, dataset);

        let h5 = File::open(file.path()).unwrap();
        let columns: Vec<VarLenUnicode> = h5
            .dataset("metadata")
            .unwrap()
            .attr("columns")
            .unwrap()
            .read_raw()
            .unwrap();
        assert_eq!(columns.len(), METADATA_WIDTH);
        assert_eq!(columns[10].as_str(), "plane_id");
    }

    #[test]
    fn test_hdf5_empty_dataset() {
        let file = NamedTempFile::new().unwrap();
        write_dataset_hdf5(file.path(), &Dataset::empty(8, 4), &Hdf5WriteOptions::default())
            .unwrap();
        let back = read_dataset_hdf5(file.path()).unwrap();
        assert_eq!(back.images.dim(), (0, 8, 4));
        assert_eq!(back.metadata.dim(), (0, METADATA_WIDTH));
    }
}
