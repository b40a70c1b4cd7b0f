//! Integration tests for the detection enricher against a real warehouse

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use tempfile::tempdir;

use telegram_pipeline::db::Database;
use telegram_pipeline::detection::{Detection, Detector};
use telegram_pipeline::enricher::Enricher;
use telegram_pipeline::error::{PipelineError, Result};
use telegram_pipeline::models::{BoundingBox, MessageRecord, RawMessage};

/// Returns canned detections per file name and records what it was asked
struct StubDetector {
    seen: Mutex<Vec<PathBuf>>,
}

impl StubDetector {
    fn new() -> Self {
        Self {
            seen: Mutex::new(Vec::new()),
        }
    }
}

impl Detector for StubDetector {
    fn detect(&self, image: &Path) -> Result<Vec<Detection>> {
        self.seen.lock().unwrap().push(image.to_path_buf());
        match image.file_name().and_then(|n| n.to_str()) {
            Some("corrupt.jpg") => Err(PipelineError::Detection("cannot decode image".into())),
            Some("empty.jpg") => Ok(Vec::new()),
            _ => Ok(vec![
                Detection {
                    label: "bottle".into(),
                    confidence: 0.9,
                    x1: 10.0,
                    y1: 10.0,
                    x2: 50.0,
                    y2: 50.0,
                },
                Detection {
                    label: "person".into(),
                    confidence: 0.31,
                    x1: 0.0,
                    y1: 5.5,
                    x2: 20.0,
                    y2: 60.0,
                },
            ]),
        }
    }
}

fn photo_row(id: i64, path: &Path) -> RawMessage {
    let ts = Utc.with_ymd_and_hms(2024, 5, 2, 9, 0, 0).unwrap();
    RawMessage {
        record: MessageRecord::new(id, "demo", ts, None, true).attach_photo(path.to_string_lossy()),
        raw_data: "{}".into(),
    }
}

fn open(dir: &Path) -> Database {
    Database::new(&dir.join("warehouse.db"), 2, Duration::from_secs(5)).unwrap()
}

#[test]
fn test_detections_are_stored_with_converted_boxes() {
    let dir = tempdir().unwrap();
    let image = dir.path().join("1.jpg");
    fs::write(&image, b"jpg").unwrap();
    let db = open(dir.path());
    db.insert_raw_messages(&[photo_row(1, &image)]).unwrap();

    let detector = StubDetector::new();
    let report = Enricher::new(&db, &detector).run().unwrap();
    assert_eq!(report.images_scanned, 1);
    assert_eq!(report.detections_inserted, 2);

    let stored = db.detections().unwrap();
    assert_eq!(stored[0].product_label, "bottle");
    assert_eq!(stored[0].message_id, 1);
    assert_eq!(stored[0].channel_name, "demo");
    assert_eq!(
        stored[1].bounding_box,
        BoundingBox {
            x: 0.0,
            y: 5.5,
            width: 20.0,
            height: 54.5
        }
    );
}

#[test]
fn test_missing_and_failing_images_do_not_stop_the_batch() {
    let dir = tempdir().unwrap();
    let good = dir.path().join("2.jpg");
    let corrupt = dir.path().join("corrupt.jpg");
    fs::write(&good, b"jpg").unwrap();
    fs::write(&corrupt, b"???").unwrap();
    let db = open(dir.path());
    db.insert_raw_messages(&[
        photo_row(1, &corrupt),
        photo_row(2, &dir.path().join("deleted.jpg")),
        photo_row(3, &good),
    ])
    .unwrap();

    let detector = StubDetector::new();
    let report = Enricher::new(&db, &detector).run().unwrap();
    assert_eq!(report.images_failed, 1);
    assert_eq!(report.images_missing, 1);
    assert_eq!(report.images_scanned, 2);
    assert_eq!(report.detections_inserted, 2);
    assert_eq!(db.count_detections().unwrap(), 2);
    // The detector is never asked about files that are gone
    assert_eq!(*detector.seen.lock().unwrap(), vec![corrupt, good]);
}

#[test]
fn test_zero_detections_leaves_table_empty() {
    let dir = tempdir().unwrap();
    let image = dir.path().join("empty.jpg");
    fs::write(&image, b"jpg").unwrap();
    let db = open(dir.path());
    db.insert_raw_messages(&[photo_row(1, &image)]).unwrap();

    let report = Enricher::new(&db, &StubDetector::new()).run().unwrap();
    assert_eq!(report.detections_inserted, 0);
    assert_eq!(db.count_detections().unwrap(), 0);
}

#[test]
fn test_text_only_messages_are_not_scanned() {
    let dir = tempdir().unwrap();
    let db = open(dir.path());
    let ts = Utc.with_ymd_and_hms(2024, 5, 2, 9, 0, 0).unwrap();
    db.insert_raw_messages(&[
        RawMessage {
            record: MessageRecord::new(1, "demo", ts, Some("text".into()), false),
            raw_data: "{}".into(),
        },
        // Media that failed to download has no path
        RawMessage {
            record: MessageRecord::new(2, "demo", ts, None, true),
            raw_data: "{}".into(),
        },
    ])
    .unwrap();

    let detector = StubDetector::new();
    let report = Enricher::new(&db, &detector).run().unwrap();
    assert_eq!(report.images_scanned, 0);
    assert!(detector.seen.lock().unwrap().is_empty());
}

proptest! {
    #[test]
    fn prop_box_conversion_is_exact(
        x1 in -1e6f64..1e6,
        y1 in -1e6f64..1e6,
        w in 0f64..1e6,
        h in 0f64..1e6,
    ) {
        let detection = Detection {
            label: "cup".into(),
            confidence: 0.5,
            x1,
            y1,
            x2: x1 + w,
            y2: y1 + h,
        };
        let bbox = detection.bounding_box();
        prop_assert_eq!(bbox.x, x1);
        prop_assert_eq!(bbox.y, y1);
        prop_assert_eq!(bbox.width, detection.x2 - x1);
        prop_assert_eq!(bbox.height, detection.y2 - y1);
    }
}
