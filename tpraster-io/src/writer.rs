//! File writers for datasets and clusters.
//!
//! Arrays are written as NumPy `.npy` (format 1.0, little-endian `f32`), so
//! `numpy.load` reads them without extra tooling.

use crate::Result;
use ndarray::{ArrayBase, Data, Dimension};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tpraster_algorithms::Dataset;
use tpraster_core::clustering::Cluster;
use tpraster_core::image::METADATA_COLUMNS;
use tpraster_core::primitive::Primitive;

const NPY_MAGIC: &[u8] = b"\x93NUMPY";
const NPY_ALIGN: usize = 64;

/// Writes an `f32` array of any dimension as `.npy`.
///
/// # Errors
/// Returns an error if the file cannot be created or written.
pub fn write_npy<S, D>(path: impl AsRef<Path>, array: &ArrayBase<S, D>) -> Result<()>
where
    S: Data<Elem = f32>,
    D: Dimension,
{
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(&npy_header(array.shape()))?;
    for value in array {
        writer.write_all(&value.to_le_bytes())?;
    }
    writer.flush()?;
    Ok(())
}

/// `.npy` 1.0 preamble for a C-ordered `<f4` array of the given shape.
fn npy_header(shape: &[usize]) -> Vec<u8> {
    let dims = match shape {
        [n] => format!("({n},)"),
        _ => {
            let parts: Vec<String> = shape.iter().map(ToString::to_string).collect();
            format!("({})", parts.join(", "))
        }
    };
    let mut dict = format!("{{'descr': '<f4', 'fortran_order': False, 'shape': {dims}, }}");
    // magic(6) + version(2) + header_len(2) + dict + '\n' is a multiple of 64.
    let unpadded = NPY_MAGIC.len() + 4 + dict.len() + 1;
    let padding = (NPY_ALIGN - unpadded % NPY_ALIGN) % NPY_ALIGN;
    dict.extend(std::iter::repeat(' ').take(padding));
    dict.push('\n');

    let mut header = Vec::with_capacity(NPY_MAGIC.len() + 4 + dict.len());
    header.extend_from_slice(NPY_MAGIC);
    header.extend_from_slice(&[1, 0]);
    // Header length is bounded by a handful of dimensions.
    #[allow(clippy::cast_possible_truncation)]
    header.extend_from_slice(&(dict.len() as u16).to_le_bytes());
    header.extend_from_slice(dict.as_bytes());
    header
}

/// Paths produced by [`DatasetWriter::write`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WrittenFiles {
    pub images: PathBuf,
    pub metadata: PathBuf,
    pub metadata_csv: PathBuf,
}

/// Writer for a finished dataset.
///
/// Produces `<stem>_images.npy` `(N, H, W)`, `<stem>_metadata.npy`
/// `(N, K)` and `<stem>_metadata.csv` with a header row.
pub struct DatasetWriter {
    dir: PathBuf,
    stem: String,
}

impl DatasetWriter {
    /// Creates a writer targeting `dir`, creating it if needed.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created.
    pub fn create<P: AsRef<Path>>(dir: P, stem: &str) -> Result<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
            stem: stem.to_string(),
        })
    }

    fn path(&self, suffix: &str) -> PathBuf {
        self.dir.join(format!("{}_{suffix}", self.stem))
    }

    /// Writes all dataset files.
    ///
    /// # Errors
    /// Returns an error if any file cannot be written.
    pub fn write(&self, dataset: &Dataset) -> Result<WrittenFiles> {
        let files = WrittenFiles {
            images: self.path("images.npy"),
            metadata: self.path("metadata.npy"),
            metadata_csv: self.path("metadata.csv"),
        };
        write_npy(&files.images, &dataset.images)?;
        write_npy(&files.metadata, &dataset.metadata)?;
        write_metadata_csv(&files.metadata_csv, dataset)?;
        Ok(files)
    }
}

/// Writes the metadata matrix as CSV with the documented column names.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn write_metadata_csv<P: AsRef<Path>>(path: P, dataset: &Dataset) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, "{}", METADATA_COLUMNS.join(","))?;
    for row in dataset.metadata.rows() {
        let fields: Vec<String> = row.iter().map(ToString::to_string).collect();
        writeln!(writer, "{}", fields.join(","))?;
    }
    writer.flush()?;
    Ok(())
}

/// Writer for human-readable cluster output.
pub struct ClusterFileWriter {
    writer: BufWriter<File>,
}

impl ClusterFileWriter {
    /// Creates a new file writer.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        Ok(Self { writer })
    }

    /// Writes clusters as text: one TP per line, a blank line after each
    /// cluster.
    ///
    /// Columns: `time_start samples_over_threshold samples_to_peak channel
    /// adc_integral adc_peak detid`.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_clusters<P: Primitive>(&mut self, clusters: &[Cluster<P>]) -> Result<()> {
        for cluster in clusters {
            for tp in cluster.iter().map(Primitive::tp) {
                writeln!(
                    self.writer,
                    "{} {} {} {} {} {} {}",
                    tp.time_start,
                    tp.samples_over_threshold,
                    tp.samples_to_peak,
                    tp.channel,
                    tp.adc_integral,
                    tp.adc_peak,
                    tp.detid
                )?;
            }
            writeln!(self.writer)?;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Writes one summary row per cluster as CSV.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_summary_csv<P: Primitive>(&mut self, clusters: &[Cluster<P>]) -> Result<()> {
        writeln!(
            self.writer,
            "cluster,n_tps,channel_min,channel_max,time_min,time_max,total_adc_integral,max_adc_peak,true_label,marley_fraction"
        )?;
        for (i, cluster) in clusters.iter().enumerate() {
            let Some(s) = cluster.summary() else {
                continue;
            };
            let (label, fraction) = match cluster.truth() {
                Some(t) => (t.true_label.code().to_string(), t.marley_fraction.to_string()),
                None => (String::new(), String::new()),
            };
            writeln!(
                self.writer,
                "{i},{},{},{},{},{},{},{},{label},{fraction}",
                s.n_tps,
                s.channel_min,
                s.channel_max,
                s.time_min,
                s.time_max,
                s.total_adc_integral,
                s.max_adc_peak
            )?;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Flushes the writer.
    ///
    /// # Errors
    /// Returns an error if flushing fails.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array3};
    use tempfile::{tempdir, NamedTempFile};
    use tpraster_core::primitive::TriggerPrimitive;
    use tpraster_core::METADATA_WIDTH;

    fn header_len(bytes: &[u8]) -> usize {
        usize::from(u16::from_le_bytes([bytes[8], bytes[9]]))
    }

    #[test]
    fn test_npy_header_layout() {
        let header = npy_header(&[3, 32, 16]);
        assert_eq!(&header[..6], NPY_MAGIC);
        assert_eq!(header.len() % NPY_ALIGN, 0);
        assert_eq!(header.len(), 10 + header_len(&header));
        let dict = std::str::from_utf8(&header[10..]).unwrap();
        assert!(dict.starts_with("{'descr': '<f4', 'fortran_order': False, 'shape': (3, 32, 16), }"));
        assert!(dict.ends_with('\n'));

        let one_d = npy_header(&[5]);
        assert!(std::str::from_utf8(&one_d[10..]).unwrap().contains("(5,)"));
    }

    #[test]
    fn test_write_npy_data() {
        let file = NamedTempFile::new().unwrap();
        let array = Array2::from_shape_vec((2, 2), vec![1.0f32, 2.0, 3.0, 4.5]).unwrap();
        write_npy(file.path(), &array).unwrap();

        let bytes = std::fs::read(file.path()).unwrap();
        let offset = 10 + header_len(&bytes);
        assert_eq!(bytes.len(), offset + 4 * 4);
        let values: Vec<f32> = bytes[offset..]
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0, 4.5]);
    }

    #[test]
    fn test_dataset_writer_empty() {
        let dir = tempdir().unwrap();
        let dataset = Dataset::empty(8, 4);
        let files = DatasetWriter::create(dir.path(), "run1")
            .unwrap()
            .write(&dataset)
            .unwrap();
        assert!(files.images.ends_with("run1_images.npy"));
        let bytes = std::fs::read(&files.images).unwrap();
        let dict = String::from_utf8_lossy(&bytes[10..]).to_string();
        assert!(dict.contains("'shape': (0, 8, 4)"));
        assert_eq!(bytes.len(), 10 + header_len(&bytes));

        let csv = std::fs::read_to_string(&files.metadata_csv).unwrap();
        assert_eq!(csv.lines().count(), 1);
        assert_eq!(csv.lines().next().unwrap().split(',').count(), METADATA_WIDTH);
    }

    #[test]
    fn test_metadata_csv_rows() {
        let file = NamedTempFile::new().unwrap();
        let mut metadata = Array2::from_elem((2, METADATA_WIDTH), -1.0f32);
        metadata[[0, 0]] = 1.0;
        let dataset = Dataset {
            images: Array3::zeros((2, 2, 2)),
            metadata,
        };
        write_metadata_csv(file.path(), &dataset).unwrap();
        let csv = std::fs::read_to_string(file.path()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert!(lines[0].starts_with("is_signal,is_main_track,true_x"));
        assert!(lines[1].starts_with("1,-1,"));
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_write_clusters_and_summary() {
        let tp = |t, ch| TriggerPrimitive::new(t, 4, 2, ch, 400.0, 90.0, 1).unwrap();
        let clusters: Vec<Cluster> = vec![
            [tp(100, 10), tp(101, 11)].into_iter().collect(),
            [tp(300, 20)].into_iter().collect(),
        ];

        let dump = NamedTempFile::new().unwrap();
        ClusterFileWriter::create(dump.path())
            .unwrap()
            .write_clusters(&clusters)
            .unwrap();
        let text = std::fs::read_to_string(dump.path()).unwrap();
        assert_eq!(text, "100 4 2 10 400 90 1\n101 4 2 11 400 90 1\n\n300 4 2 20 400 90 1\n\n");

        let summary = NamedTempFile::new().unwrap();
        ClusterFileWriter::create(summary.path())
            .unwrap()
            .write_summary_csv(&clusters)
            .unwrap();
        let csv = std::fs::read_to_string(summary.path()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "0,2,10,11,100,105,800,90,,");
    }
}
