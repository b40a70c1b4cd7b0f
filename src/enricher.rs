//! Detection enricher: runs object detection over downloaded photos.
//!
//! Every photo is processed independently. Missing files and detector
//! failures are logged and skipped. Detections are buffered for the whole
//! run and written in one bulk insert at the end; a run that finds nothing
//! writes nothing.

use std::path::Path;

use tracing::{error, info, warn};

use crate::db::Database;
use crate::detection::Detector;
use crate::error::Result;
use crate::metrics::{self, DETECTIONS_INSERTED};
use crate::models::{DetectionRecord, PhotoMessage};

/// Storage the enricher reads photos from and writes detections to
#[cfg_attr(test, mockall::automock)]
pub trait DetectionStore {
    /// Raw messages with a downloaded photo
    fn photo_messages(&self) -> Result<Vec<PhotoMessage>>;

    /// Insert all detections atomically, returning the number written
    fn insert_detections(&self, detections: &[DetectionRecord]) -> Result<usize>;
}

impl DetectionStore for Database {
    fn photo_messages(&self) -> Result<Vec<PhotoMessage>> {
        Self::photo_messages(self)
    }

    fn insert_detections(&self, detections: &[DetectionRecord]) -> Result<usize> {
        Self::insert_detections(self, detections)
    }
}

/// Outcome of an enrichment run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichReport {
    pub images_scanned: usize,
    pub images_missing: usize,
    pub images_failed: usize,
    pub detections_inserted: usize,
}

pub struct Enricher<'a, S: ?Sized, D: ?Sized> {
    store: &'a S,
    detector: &'a D,
}

impl<'a, S, D> Enricher<'a, S, D>
where
    S: DetectionStore + ?Sized,
    D: Detector + ?Sized,
{
    pub const fn new(store: &'a S, detector: &'a D) -> Self {
        Self { store, detector }
    }

    pub fn run(&self) -> Result<EnrichReport> {
        let photos = self.store.photo_messages()?;
        let mut report = EnrichReport::default();

        if photos.is_empty() {
            warn!("No images found in the raw message table");
            return Ok(report);
        }

        let mut detections = Vec::new();
        for photo in &photos {
            let path = Path::new(&photo.media_path);
            if !path.exists() {
                warn!(path = %photo.media_path, "Image not found");
                report.images_missing += 1;
                continue;
            }

            report.images_scanned += 1;
            match self.detector.detect(path) {
                Ok(found) => {
                    for detection in found {
                        info!(
                            label = %detection.label,
                            confidence = detection.confidence,
                            path = %photo.media_path,
                            "Detected object"
                        );
                        detections.push(DetectionRecord {
                            message_id: photo.message_id,
                            channel_name: photo.channel_name.clone(),
                            bounding_box: detection.bounding_box(),
                            product_label: detection.label,
                            confidence: detection.confidence,
                        });
                    }
                }
                Err(e) => {
                    error!(path = %photo.media_path, error = %e, "Failed to process image");
                    report.images_failed += 1;
                }
            }
        }

        if detections.is_empty() {
            warn!("No detections to insert");
        } else {
            report.detections_inserted = self.store.insert_detections(&detections)?;
            metrics::increment(DETECTIONS_INSERTED, report.detections_inserted);
            info!(count = report.detections_inserted, "Inserted detections");
        }

        info!(
            scanned = report.images_scanned,
            missing = report.images_missing,
            failed = report.images_failed,
            "Finished detection enrichment"
        );
        Ok(report)
    }
}
