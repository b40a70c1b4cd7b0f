use std::path::Path;
use std::process::Command;

use serde::Deserialize;
use tracing::debug;

use crate::config::DetectionConfig;
use crate::error::{PipelineError, Result};
use crate::models::BoundingBox;

/// One object found in an image, with its box as two corner points
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f64,
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl Detection {
    #[must_use]
    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_corners(self.x1, self.y1, self.x2, self.y2)
    }
}

/// Pluggable object detection capability
#[cfg_attr(test, mockall::automock)]
pub trait Detector: Send + Sync {
    /// Detect objects in the image at `image`
    fn detect(&self, image: &Path) -> Result<Vec<Detection>>;
}

/// Runs an external detector program once per image.
///
/// The program gets the configured arguments followed by the image path and
/// must print a JSON array of `{label, confidence, x1, y1, x2, y2}` objects.
#[derive(Debug, Clone)]
pub struct CommandDetector {
    program: String,
    args: Vec<String>,
}

impl CommandDetector {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    #[must_use]
    pub fn from_config(config: &DetectionConfig) -> Self {
        Self::new(config.command.clone(), config.args.clone())
    }
}

impl Detector for CommandDetector {
    fn detect(&self, image: &Path) -> Result<Vec<Detection>> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(image)
            .output()
            .map_err(|e| PipelineError::Detection(format!("failed to run {}: {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::Detection(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let detections: Vec<Detection> = serde_json::from_slice(&output.stdout)
            .map_err(|e| PipelineError::Detection(format!("unparsable detector output: {e}")))?;
        debug!(image = %image.display(), count = detections.len(), "Detector finished");
        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection_converts_corners() {
        let detection = Detection {
            label: "bottle".into(),
            confidence: 0.9,
            x1: 10.0,
            y1: 10.0,
            x2: 50.0,
            y2: 50.0,
        };
        let bbox = detection.bounding_box();
        assert_eq!((bbox.x, bbox.y, bbox.width, bbox.height), (10.0, 10.0, 40.0, 40.0));
    }

    #[test]
    fn parses_detector_json() {
        let json = r#"[{"label": "cup", "confidence": 0.42, "x1": 1.5, "y1": 2.0, "x2": 11.5, "y2": 22.0}]"#;
        let detections: Vec<Detection> = serde_json::from_str(json).unwrap();
        assert_eq!(detections[0].label, "cup");
        assert_eq!(detections[0].bounding_box().width, 10.0);
    }

    #[cfg(unix)]
    #[test]
    fn command_detector_reads_stdout() {
        let detector = CommandDetector::new(
            "sh",
            vec![
                "-c".into(),
                r#"echo '[{"label":"bottle","confidence":0.9,"x1":10,"y1":10,"x2":50,"y2":50}]'"#.into(),
            ],
        );
        let detections = detector.detect(Path::new("ignored.jpg")).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].label, "bottle");
    }

    #[cfg(unix)]
    #[test]
    fn command_detector_reports_failure() {
        let detector = CommandDetector::new("sh", vec!["-c".into(), "exit 3".into()]);
        assert!(matches!(
            detector.detect(Path::new("ignored.jpg")),
            Err(PipelineError::Detection(_))
        ));
    }
}
