//! Memory-mapped TP table reader.
//!
//! A TP table is plain text: one trigger primitive per line, fields separated
//! by commas and/or whitespace. Lines starting with `#` are comments. The
//! first non-comment line is a header unless its first field is numeric, in
//! which case the positional layout
//! `time_start time_over_threshold time_peak channel adc_integral adc_peak detid`
//! is assumed.
#![allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]

use crate::{Error, Result};
use log::{debug, warn};
use memmap2::Mmap;
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tpraster_core::primitive::{TaggedPrimitive, TriggerPrimitive};
use tpraster_core::truth::{GeneratorLabel, TpTruth};
use tpraster_detector::{DetectorConfig, Plane};

/// Positional layout of headerless tables.
const DEFAULT_COLUMNS: [&str; 7] = [
    "time_start",
    "time_over_threshold",
    "time_peak",
    "channel",
    "adc_integral",
    "adc_peak",
    "detid",
];

/// A memory-mapped file reader.
///
/// Uses memmap2 to access file contents without loading the entire file
/// into memory.
pub struct MappedFileReader {
    mmap: Option<Arc<Mmap>>,
    path: PathBuf,
}

impl MappedFileReader {
    /// Opens a file for memory-mapped reading.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or memory-mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        // Zero-length files cannot be mapped on every platform.
        let mmap = if file.metadata()?.len() == 0 {
            None
        } else {
            // SAFETY: The file is opened read-only and we assume it is not modified concurrently.
            // This is the standard safety contract for memory mapping.
            #[allow(unsafe_code)]
            let mmap = unsafe { Mmap::map(&file)? };
            Some(Arc::new(mmap))
        };
        Ok(Self {
            mmap,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Returns the file contents as a byte slice.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match &self.mmap {
            Some(mmap) => &mmap[..],
            None => &[],
        }
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Returns true if the file is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Path the reader was opened with.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// All TPs of one event, in file order.
#[derive(Clone, Debug, PartialEq)]
pub struct TpEvent {
    /// Event number, `0` for tables without an `event` column.
    pub id: i64,
    /// Trigger primitives of the event.
    pub tps: Vec<TaggedPrimitive>,
}

/// A parsed TP table.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TpTable {
    /// Events in order of first appearance.
    pub events: Vec<TpEvent>,
    /// Column names as resolved from the header (or the default layout).
    pub columns: Vec<String>,
    /// Whether rows carry simulation truth.
    pub has_truth: bool,
    /// Rows dropped because the TP failed validation.
    pub skipped_rows: usize,
}

impl TpTable {
    /// Total number of TPs.
    #[must_use]
    pub fn n_tps(&self) -> usize {
        self.events.iter().map(|e| e.tps.len()).sum()
    }

    /// Consumes the table and returns one TP stream per event.
    #[must_use]
    pub fn into_streams(self) -> Vec<Vec<TaggedPrimitive>> {
        self.events.into_iter().map(|e| e.tps).collect()
    }

    /// Channel, time and plane occupancy summary.
    #[must_use]
    pub fn summary(&self, detector: &DetectorConfig) -> TableSummary {
        let mut summary = TableSummary {
            n_tps: self.n_tps(),
            n_events: self.events.len(),
            has_truth: self.has_truth,
            skipped_rows: self.skipped_rows,
            ..TableSummary::default()
        };
        let mut signal = 0usize;
        for tp in self.events.iter().flat_map(|e| &e.tps) {
            let (t0, t1, ch) = (tp.tp.time_start, tp.tp.time_end(), tp.tp.channel);
            summary.channel_range = Some(match summary.channel_range {
                Some((lo, hi)) => (lo.min(ch), hi.max(ch)),
                None => (ch, ch),
            });
            summary.time_range = Some(match summary.time_range {
                Some((lo, hi)) => (lo.min(t0), hi.max(t1)),
                None => (t0, t1),
            });
            summary.plane_counts[usize::from(detector.plane_of(ch).id())] += 1;
            if tp.truth.is_some_and(|t| t.label.is_signal()) {
                signal += 1;
            }
        }
        summary.signal_tps = signal;
        summary
    }
}

/// Summary statistics of a TP table.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TableSummary {
    pub n_tps: usize,
    pub n_events: usize,
    pub has_truth: bool,
    pub skipped_rows: usize,
    /// Inclusive channel range.
    pub channel_range: Option<(u32, u32)>,
    /// Earliest start and latest end tick.
    pub time_range: Option<(i64, i64)>,
    /// TP count per plane, indexed by plane id.
    pub plane_counts: [usize; 3],
    /// TPs labelled as signal.
    pub signal_tps: usize,
}

impl TableSummary {
    /// TP count of one plane.
    #[must_use]
    pub fn plane_count(&self, plane: Plane) -> usize {
        self.plane_counts[usize::from(plane.id())]
    }
}

/// A TP table file reader with memory-mapped I/O.
pub struct TpTableReader {
    reader: MappedFileReader,
}

impl TpTableReader {
    /// Opens a TP table for reading.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or memory-mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            reader: MappedFileReader::open(path)?,
        })
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub fn file_size(&self) -> usize {
        self.reader.len()
    }

    /// Parses the whole table.
    ///
    /// # Errors
    /// Returns [`Error::InvalidFormat`] for empty or non-UTF-8 files,
    /// [`Error::SchemaMismatch`] when required columns are missing and
    /// [`Error::Parse`] for malformed rows.
    pub fn read(&self) -> Result<TpTable> {
        let text = std::str::from_utf8(self.reader.as_bytes()).map_err(|e| {
            Error::InvalidFormat(format!("{}: not UTF-8 text: {e}", self.reader.path().display()))
        })?;
        let table = parse_tp_table(text)?;
        debug!(
            "{}: {} trigger primitives in {} events",
            self.reader.path().display(),
            table.n_tps(),
            table.events.len()
        );
        Ok(table)
    }
}

/// Resolved column indices.
struct Layout {
    width: usize,
    time_start: usize,
    tot: usize,
    peak: PeakColumn,
    channel: usize,
    adc_integral: usize,
    adc_peak: usize,
    detid: Option<usize>,
    event: Option<usize>,
    truth: Option<TruthColumns>,
}

enum PeakColumn {
    /// Absolute tick of the peak.
    Absolute(usize),
    /// Ticks from `time_start` to the peak.
    Offset(usize),
}

struct TruthColumns {
    label: usize,
    is_main_track: Option<usize>,
    position: Option<[usize; 3]>,
    direction: Option<[usize; 3]>,
    neutrino_energy: Option<usize>,
    particle_energy: Option<usize>,
    interaction_type: Option<usize>,
}

impl Layout {
    fn resolve(columns: &[String]) -> Result<Self> {
        let find = |names: &[&str]| {
            columns
                .iter()
                .position(|c| names.iter().any(|n| c.eq_ignore_ascii_case(n)))
        };
        let triple = |names: [&str; 3]| -> Option<[usize; 3]> {
            Some([find(&[names[0]])?, find(&[names[1]])?, find(&[names[2]])?])
        };

        let mut missing = Vec::new();
        let mut require = |names: &[&str]| {
            let idx = find(names);
            if idx.is_none() {
                missing.push(names[0].to_string());
            }
            idx.unwrap_or(0)
        };
        let time_start = require(&["time_start"]);
        let tot = require(&["time_over_threshold", "samples_over_threshold"]);
        let channel = require(&["channel"]);
        let adc_integral = require(&["adc_integral"]);
        let adc_peak = require(&["adc_peak"]);
        let peak = match (find(&["time_peak"]), find(&["samples_to_peak"])) {
            (Some(idx), _) => PeakColumn::Absolute(idx),
            (None, Some(idx)) => PeakColumn::Offset(idx),
            (None, None) => {
                missing.push("time_peak".to_string());
                PeakColumn::Offset(0)
            }
        };
        if !missing.is_empty() {
            return Err(Error::SchemaMismatch { missing });
        }

        let truth = find(&["label", "ptype", "generator"]).map(|label| TruthColumns {
            label,
            is_main_track: find(&["is_main_track"]),
            position: triple(["true_x", "true_y", "true_z"]),
            direction: triple(["true_dir_x", "true_dir_y", "true_dir_z"]),
            neutrino_energy: find(&["true_neutrino_energy"]),
            particle_energy: find(&["true_particle_energy"]),
            interaction_type: find(&["interaction_type"]),
        });

        Ok(Self {
            width: columns.len(),
            time_start,
            tot,
            peak,
            channel,
            adc_integral,
            adc_peak,
            detid: find(&["detid", "detector"]),
            event: find(&["event"]),
            truth,
        })
    }
}

/// Parses TP table text.
///
/// # Errors
/// See [`TpTableReader::read`].
pub fn parse_tp_table(text: &str) -> Result<TpTable> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .peekable();

    let Some(&(_, first)) = lines.peek() else {
        return Err(Error::InvalidFormat("empty TP table".to_string()));
    };
    let first_token = tokens(first).next().unwrap_or_default();
    let columns: Vec<String> = if first_token.parse::<f64>().is_ok() {
        DEFAULT_COLUMNS.iter().map(|c| (*c).to_string()).collect()
    } else {
        lines.next();
        tokens(first).map(str::to_string).collect()
    };
    let layout = Layout::resolve(&columns)?;

    let mut table = TpTable {
        columns,
        has_truth: layout.truth.is_some(),
        ..TpTable::default()
    };
    let mut event_index: HashMap<i64, usize> = HashMap::new();
    let mut fields: Vec<&str> = Vec::with_capacity(layout.width);

    for (line_no, line) in lines {
        fields.clear();
        fields.extend(tokens(line));
        if fields.len() != layout.width {
            return Err(Error::Parse {
                line: line_no,
                message: format!("expected {} fields, found {}", layout.width, fields.len()),
            });
        }
        let row = Row {
            fields: &fields,
            line: line_no,
        };

        let event = match layout.event {
            Some(idx) => row.int(idx)?,
            None => 0,
        };
        let tp = match row.primitive(&layout) {
            Ok(tp) => tp,
            Err(Error::CoreError(err)) => {
                warn!("line {line_no}: skipping trigger primitive: {err}");
                table.skipped_rows += 1;
                continue;
            }
            Err(err) => return Err(err),
        };
        let truth = match &layout.truth {
            Some(columns) => Some(row.truth(columns)?),
            None => None,
        };

        let slot = *event_index.entry(event).or_insert_with(|| {
            table.events.push(TpEvent {
                id: event,
                tps: Vec::new(),
            });
            table.events.len() - 1
        });
        table.events[slot].tps.push(TaggedPrimitive::new(tp, truth));
    }

    if table.events.is_empty() && table.skipped_rows == 0 {
        return Err(Error::InvalidFormat(
            "TP table has a header but no rows".to_string(),
        ));
    }
    Ok(table)
}

fn tokens(line: &str) -> impl Iterator<Item = &str> {
    line.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
}

struct Row<'a> {
    fields: &'a [&'a str],
    line: usize,
}

impl Row<'_> {
    fn error(&self, idx: usize, what: &str) -> Error {
        Error::Parse {
            line: self.line,
            message: format!("field {} ({:?}) is not {what}", idx + 1, self.fields[idx]),
        }
    }

    fn float(&self, idx: usize) -> Result<f64> {
        self.fields[idx]
            .parse::<f64>()
            .map_err(|_| self.error(idx, "a number"))
    }

    /// Integers may be written in float notation, e.g. `1.2e6`.
    fn int(&self, idx: usize) -> Result<i64> {
        if let Ok(v) = self.fields[idx].parse::<i64>() {
            return Ok(v);
        }
        let v = self.float(idx)?;
        if v.is_finite() && v.fract() == 0.0 && v.abs() < 9.0e15 {
            Ok(v as i64)
        } else {
            Err(self.error(idx, "an integer"))
        }
    }

    fn unsigned(&self, idx: usize) -> Result<u32> {
        u32::try_from(self.int(idx)?).map_err(|_| self.error(idx, "a non-negative 32-bit integer"))
    }

    fn primitive(&self, layout: &Layout) -> Result<TriggerPrimitive> {
        let time_start = self.int(layout.time_start)?;
        let tot = self.unsigned(layout.tot)?;
        let samples_to_peak = match layout.peak {
            PeakColumn::Offset(idx) => self.unsigned(idx)?,
            PeakColumn::Absolute(idx) => {
                let offset = (self.int(idx)? - time_start).max(0);
                u32::try_from(offset).unwrap_or(u32::MAX)
            }
        };
        let detid = match layout.detid {
            Some(idx) => self.unsigned(idx)?,
            None => 0,
        };
        Ok(TriggerPrimitive::new(
            time_start,
            tot,
            samples_to_peak,
            self.unsigned(layout.channel)?,
            self.float(layout.adc_integral)?,
            self.float(layout.adc_peak)?,
            detid,
        )?)
    }

    fn truth(&self, columns: &TruthColumns) -> Result<TpTruth> {
        let label = i32::try_from(self.int(columns.label)?)
            .map_err(|_| self.error(columns.label, "a generator code"))?;
        let optional = |idx: Option<usize>| -> Result<Option<f64>> {
            idx.map(|i| self.float(i)).transpose()
        };
        let vector = |idx: Option<[usize; 3]>| -> Result<Option<[f64; 3]>> {
            idx.map(|[a, b, c]| Ok([self.float(a)?, self.float(b)?, self.float(c)?]))
                .transpose()
        };
        let interaction_type = match columns.interaction_type {
            Some(idx) => Some(
                i32::try_from(self.int(idx)?)
                    .map_err(|_| self.error(idx, "an interaction code"))?,
            ),
            None => None,
        };
        Ok(TpTruth {
            label: GeneratorLabel::from_code(label),
            is_main_track: optional(columns.is_main_track)?.is_some_and(|v| v != 0.0),
            position: vector(columns.position)?,
            direction: vector(columns.direction)?,
            neutrino_energy: optional(columns.neutrino_energy)?,
            particle_energy: optional(columns.particle_energy)?,
            interaction_type,
        })
    }
}
