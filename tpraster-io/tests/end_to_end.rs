#![allow(clippy::float_cmp)]
use std::fs;
use tempfile::tempdir;
use tpraster_core::{METADATA_COLUMNS, METADATA_WIDTH};
use tpraster_io::{build_dataset_from_files, DatasetWriter, PipelineConfig};

const TABLE: &str = "\
# event time_start time_over_threshold time_peak channel adc_integral adc_peak label is_main_track true_x true_y true_z
event,time_start,time_over_threshold,time_peak,channel,adc_integral,adc_peak,label,is_main_track,true_x,true_y,true_z
1,1000,10,1004,1700,2400,300,1,1,10.5,-20,300
1,1002,12,1007,1700,2600,280,1,1,10.5,-20,300
1,1003,8,1006,1701,1500,200,0,0,-1,-1,-1
1,5000,6,5002,1900,600,120,0,0,-1,-1,-1
2,800,9,804,12,1800,220,0,0,-1,-1,-1
";

fn npy_shape(bytes: &[u8]) -> String {
    let len = usize::from(u16::from_le_bytes([bytes[8], bytes[9]]));
    let dict = std::str::from_utf8(&bytes[10..10 + len]).unwrap();
    let start = dict.find("'shape': ").unwrap() + "'shape': ".len();
    let end = dict[start..].find(')').unwrap() + start + 1;
    dict[start..end].to_string()
}

#[test]
fn table_to_npy_files() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("tps.csv");
    fs::write(&input, TABLE).unwrap();

    let config = PipelineConfig::from_json(
        r#"{"clustering": {"channel_limit": 2}, "image": {"width": 8, "height": 24}}"#,
    )
    .unwrap();
    let (dataset, report) = build_dataset_from_files(&[&input], &config).unwrap();
    assert_eq!(report.processed(), 1);
    // Event 1: the 1000-1003 group and the isolated 5000 hit; event 2: one hit.
    assert_eq!(dataset.len(), 3);

    // Truth of the signal track reaches the metadata.
    let first = dataset.metadata.row(0);
    assert_eq!(first[0], 1.0);
    assert_eq!(first[1], 1.0);
    assert_eq!(first[2], 10.5);
    assert_eq!(first[10], 2.0);
    // Background hits keep sentinels; the induction hit is on plane 0.
    assert_eq!(dataset.metadata[[2, 0]], 0.0);
    assert_eq!(dataset.metadata[[2, 10]], 0.0);

    let files = DatasetWriter::create(dir.path().join("out"), "run")
        .unwrap()
        .write(&dataset)
        .unwrap();
    assert_eq!(npy_shape(&fs::read(&files.images).unwrap()), "(3, 24, 8)");
    assert_eq!(
        npy_shape(&fs::read(&files.metadata).unwrap()),
        format!("(3, {METADATA_WIDTH})")
    );
    let csv = fs::read_to_string(&files.metadata_csv).unwrap();
    assert_eq!(csv.lines().next().unwrap(), METADATA_COLUMNS.join(","));
    assert_eq!(csv.lines().count(), 4);
}
