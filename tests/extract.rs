use attmem::config::ExtractConfig;
use attmem::error::Error;
use attmem::{extractor, npy, Resolution};
use ndarray::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn write_map(dir: &Path, frame: i64, step: u64, map: &Array2<f32>) {
    let name = format!("img{:06}_step{}.npy", frame, step);
    fs::write(dir.join(name), npy::encode(map.view())).unwrap();
}

struct Fixture {
    _dir: tempfile::TempDir,
    config: ExtractConfig,
}

/// Maps are 480x640 against a 1280x960 source so every box halves
fn fixture(mot: &str) -> Fixture {
    let dir = tempdir().unwrap();
    let att = dir.path().join("att");
    fs::create_dir(&att).unwrap();

    // frame 1: the refined step is all 2.0, older steps would give other scores
    write_map(&att, 1, 0, &Array2::from_elem((480, 640), 100.0));
    write_map(&att, 1, 2, &Array2::from_elem((480, 640), 2.0));
    write_map(&att, 1, 10, &{
        let mut m = Array2::from_elem((480, 640), 2.0f32);
        m.slice_mut(s![50..55, 50..60]).fill(4.0);
        m
    });
    write_map(&att, 1, 9, &Array2::from_elem((480, 640), 50.0));

    // frame 2: single step
    write_map(&att, 2, 0, &Array2::from_elem((480, 640), 1.0));

    fs::write(dir.path().join("mot.txt"), mot).unwrap();

    let config = ExtractConfig {
        tracks: dir.path().join("mot.txt"),
        attention_dir: att,
        original: Resolution::new(1280, 960),
        ..Default::default()
    }
    .with_output_dir(dir.path());

    Fixture { _dir: dir, config }
}

fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn scores_tracks_against_latest_step() {
    let fx = fixture(
        "1,5,100,100,20,20,0.9,-1,-1,-1\n\
         1,3,0,0,40,40,0.8,-1,-1,-1\n\
         2,5,100,100,20,20,0.9,-1,-1,-1\n\
         3,5,100,100,20,20,0.9,-1,-1,-1\n\
         2,3,5000,5000,10,10,0.7,-1,-1,-1\n",
    );

    let (report, stats) = extractor::run(&fx.config).unwrap();
    assert_eq!(stats.records, 5);
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.duplicates, 0);

    let series = read_json(&fx.config.series_output);
    assert_eq!(
        series,
        serde_json::json!({
            // (50..60, 50..60) on step 10: half the cells are 4.0
            "5": [{"frame": 1, "score": 3.0}, {"frame": 2, "score": 1.0}],
            // second box lands outside the map on frame 2
            "3": [{"frame": 1, "score": 2.0}, {"frame": 2, "score": 0.0}],
        })
    );

    let totals = read_json(&fx.config.totals_output);
    assert_eq!(totals, serde_json::json!({"5": 4.0, "3": 2.0}));

    for (id, entries) in report.series() {
        let total = report
            .totals()
            .into_iter()
            .find(|(t, _)| t == id)
            .map(|(_, v)| v)
            .unwrap();
        assert_eq!(entries.iter().map(|e| e.score).sum::<f64>(), total);
    }
}

#[test]
fn track_without_any_map_is_absent() {
    let fx = fixture(
        "7,42,0,0,10,10,1,-1,-1,-1\n\
         1,1,0,0,10,10,1,-1,-1,-1\n\
         8,42,0,0,10,10,1,-1,-1,-1\n",
    );

    extractor::run(&fx.config).unwrap();

    let series = read_json(&fx.config.series_output);
    let totals = read_json(&fx.config.totals_output);
    assert!(series.get("42").is_none());
    assert!(totals.get("42").is_none());
    assert!(series.get("1").is_some());
}

#[test]
fn duplicate_frame_is_counted_once() {
    let fx = fixture(
        "1,5,100,100,20,20,0.9,-1,-1,-1\n\
         1,5,0,0,40,40,0.9,-1,-1,-1\n",
    );

    let (report, stats) = extractor::run(&fx.config).unwrap();
    assert_eq!(stats.duplicates, 1);
    assert_eq!(report.series()[0].1.len(), 1);
    assert_eq!(report.totals(), vec![(5, 3.0)]);
}

#[test]
fn consecutive_records_decode_a_frame_once() {
    let fx = fixture(
        "1,1,0,0,10,10,1,-1,-1,-1\n\
         1,2,0,0,10,10,1,-1,-1,-1\n\
         1,3,0,0,10,10,1,-1,-1,-1\n\
         2,1,0,0,10,10,1,-1,-1,-1\n",
    );

    let (_, stats) = extractor::run(&fx.config).unwrap();
    assert_eq!(stats.maps_loaded, 2);
}

#[test]
fn malformed_map_fails_the_run() {
    let fx = fixture("1,1,0,0,10,10,1,-1,-1,-1\n");
    fs::write(fx.config.attention_dir.join("img000001_step11.npy"), b"garbage").unwrap();

    let err = extractor::run(&fx.config).unwrap_err();
    assert!(matches!(err, Error::Decode { .. }));
    assert!(!fx.config.series_output.exists());
}

#[test]
fn maps_of_different_size_fail_the_run() {
    let fx = fixture(
        "1,1,0,0,10,10,1,-1,-1,-1\n\
         2,1,0,0,10,10,1,-1,-1,-1\n",
    );
    write_map(
        &fx.config.attention_dir,
        2,
        1,
        &Array2::from_elem((90, 160), 1.0),
    );

    let err = extractor::run(&fx.config).unwrap_err();
    match err {
        Error::GridMismatch {
            path,
            expected,
            found,
        } => {
            assert!(path.ends_with("img000002_step1.npy"));
            assert_eq!(expected, (480, 640));
            assert_eq!(found, (90, 160));
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(!fx.config.series_output.exists());
}

#[test]
fn malformed_row_fails_the_run() {
    let fx = fixture("1,1,0,0,10,10,1,-1,-1,-1\n1,2,0,0\n");

    let err = extractor::run(&fx.config).unwrap_err();
    assert!(matches!(err, Error::Parse { line: 2, .. }));
}

#[test]
fn missing_tracking_file() {
    let mut fx = fixture("");
    fx.config.tracks = fx.config.attention_dir.join("nope.txt");

    assert!(matches!(
        extractor::run(&fx.config),
        Err(Error::FileNotFound { .. })
    ));
}
