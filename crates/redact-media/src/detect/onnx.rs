//! Object detection using YOLO-family ONNX models.
//!
//! Both the primary/secondary explicit-region detector and the tertiary
//! cross-check classifier are YOLO-style single-tensor models; they
//! differ only in weight file and label table.

use std::path::Path;
use std::sync::Mutex;

use image::{imageops::FilterType, DynamicImage, RgbImage};
use ndarray::Array;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, Value};
use tracing::{debug, info};

use crate::error::{MediaError, MediaResult};

use super::{DetectorLayer, RawDetection};

/// Configuration for an ONNX detector layer.
#[derive(Debug, Clone)]
pub struct OnnxDetectorConfig {
    /// Path to the ONNX model file
    pub model_path: String,
    /// Confidence threshold for detections
    pub confidence_threshold: f32,
    /// IoU threshold for per-layer NMS
    pub nms_threshold: f32,
    /// Input image size (model expects square input)
    pub input_size: u32,
    /// Class index to label mapping, in model order
    pub labels: Vec<String>,
}

impl OnnxDetectorConfig {
    /// Configuration for the explicit-region detector taxonomy.
    pub fn explicit_regions(model_path: impl Into<String>, confidence_threshold: f32) -> Self {
        Self {
            model_path: model_path.into(),
            confidence_threshold,
            nms_threshold: 0.3,
            input_size: 640,
            labels: ["anus", "make_love", "nipple", "penis", "vagina"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    /// Configuration for the tertiary exposed/covered taxonomy.
    pub fn exposure_classes(model_path: impl Into<String>, confidence_threshold: f32) -> Self {
        Self {
            model_path: model_path.into(),
            confidence_threshold,
            nms_threshold: 0.3,
            input_size: 320,
            labels: [
                "FEMALE_GENITALIA_COVERED",
                "FACE_FEMALE",
                "BUTTOCKS_EXPOSED",
                "FEMALE_BREAST_EXPOSED",
                "FEMALE_GENITALIA_EXPOSED",
                "MALE_BREAST_EXPOSED",
                "ANUS_EXPOSED",
                "FEET_EXPOSED",
                "BELLY_COVERED",
                "FEET_COVERED",
                "ARMPITS_COVERED",
                "ARMPITS_EXPOSED",
                "FACE_MALE",
                "BELLY_EXPOSED",
                "MALE_GENITALIA_EXPOSED",
                "ANUS_COVERED",
                "FEMALE_BREAST_COVERED",
                "BUTTOCKS_COVERED",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Stateless ONNX detector layer.
///
/// Uses ONNX Runtime for CPU inference. The session is wrapped in a
/// mutex because `ort` requires exclusive access per run.
pub struct OnnxDetector {
    session: Mutex<Session>,
    config: OnnxDetectorConfig,
    name: &'static str,
}

impl OnnxDetector {
    /// Load a detector from config.
    ///
    /// Returns `ModelNotFound` if the weight file is absent.
    pub fn new(config: OnnxDetectorConfig, name: &'static str) -> MediaResult<Self> {
        let model_path = Path::new(&config.model_path);
        if !model_path.exists() {
            return Err(MediaError::model_not_found(&config.model_path));
        }

        let session = Mutex::new(create_session(model_path)?);
        info!(
            model_path = %config.model_path,
            input_size = config.input_size,
            layer = name,
            "Detector initialized"
        );

        Ok(Self {
            session,
            config,
            name,
        })
    }

    /// Preprocess a frame for inference.
    ///
    /// - Resize to model input size
    /// - Normalize pixel values to [0, 1]
    /// - Convert to NCHW format (batch, channels, height, width)
    fn preprocess(&self, frame: &RgbImage) -> MediaResult<Value> {
        let input_size = self.config.input_size;

        let resized = DynamicImage::ImageRgb8(frame.clone())
            .resize_exact(input_size, input_size, FilterType::Triangle)
            .to_rgb8();

        let (w, h) = (input_size as usize, input_size as usize);
        let mut chw_data: Vec<f32> = Vec::with_capacity(3 * h * w);

        // HWC -> CHW with normalization to [0, 1]
        for c in 0..3 {
            for y in 0..h {
                for x in 0..w {
                    let pixel = resized.get_pixel(x as u32, y as u32);
                    chw_data.push(pixel[c] as f32 / 255.0);
                }
            }
        }

        let shape = vec![1usize, 3, h, w];
        Tensor::from_array((shape, chw_data.into_boxed_slice()))
            .map(Value::from)
            .map_err(|e| MediaError::detector_failed(format!("Failed to create tensor: {e}")))
    }

    fn run_inference(&self, input: Value) -> MediaResult<Vec<f32>> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| MediaError::detector_failed("Session lock poisoned"))?;

        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| MediaError::detector_failed(format!("ONNX inference failed: {e}")))?;

        let output = outputs
            .get("output0")
            .ok_or_else(|| MediaError::detector_failed("Missing output0 tensor"))?;

        let tensor = output
            .try_extract_tensor::<f32>()
            .map_err(|e| MediaError::detector_failed(format!("Failed to extract tensor: {e}")))?;

        Ok(tensor.1.iter().copied().collect())
    }

    /// Decode the YOLO output tensor `[1, 4 + C, N]`.
    fn postprocess(
        &self,
        outputs: &[f32],
        orig_width: u32,
        orig_height: u32,
    ) -> MediaResult<Vec<RawDetection>> {
        let num_classes = self.config.labels.len();
        let num_features = 4 + num_classes;

        if outputs.is_empty() || outputs.len() % num_features != 0 {
            return Err(MediaError::detector_failed(format!(
                "Unexpected output size {} for {} features",
                outputs.len(),
                num_features
            )));
        }
        let num_boxes = outputs.len() / num_features;

        let output_array = Array::from_shape_vec((num_features, num_boxes), outputs.to_vec())
            .map_err(|e| MediaError::detector_failed(format!("Failed to reshape output: {e}")))?;
        let transposed = output_array.t();

        let input_size = self.config.input_size as f32;
        let scale_w = orig_width as f32 / input_size;
        let scale_h = orig_height as f32 / input_size;

        let mut candidates = Vec::new();
        for i in 0..num_boxes {
            let cx = transposed[[i, 0]];
            let cy = transposed[[i, 1]];
            let w = transposed[[i, 2]];
            let h = transposed[[i, 3]];

            let mut best_class = 0;
            let mut best_score = 0.0f32;
            for c in 0..num_classes {
                let score = transposed[[i, 4 + c]];
                if score > best_score {
                    best_score = score;
                    best_class = c;
                }
            }

            if best_score < self.config.confidence_threshold {
                continue;
            }

            // Center format to corner format, scaled to source pixels
            let x1 = ((cx - w / 2.0) * scale_w).clamp(0.0, orig_width as f32);
            let y1 = ((cy - h / 2.0) * scale_h).clamp(0.0, orig_height as f32);
            let x2 = ((cx + w / 2.0) * scale_w).clamp(0.0, orig_width as f32);
            let y2 = ((cy + h / 2.0) * scale_h).clamp(0.0, orig_height as f32);

            if x2 <= x1 || y2 <= y1 {
                continue;
            }

            candidates.push(RawDetection::new(
                [x1, y1, x2, y2],
                self.config.labels[best_class].clone(),
                best_score,
            ));
        }

        Ok(non_maximum_suppression(
            candidates,
            self.config.nms_threshold,
        ))
    }

    /// Get the configuration.
    pub fn config(&self) -> &OnnxDetectorConfig {
        &self.config
    }
}

impl DetectorLayer for OnnxDetector {
    fn detect(&mut self, frame: &RgbImage) -> MediaResult<Vec<RawDetection>> {
        let input = self.preprocess(frame)?;
        let outputs = self.run_inference(input)?;
        let detections = self.postprocess(&outputs, frame.width(), frame.height())?;

        debug!(layer = self.name, count = detections.len(), "Detection completed");
        Ok(detections)
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Suppress overlapping same-class detections, keeping the most confident.
fn non_maximum_suppression(mut detections: Vec<RawDetection>, threshold: f32) -> Vec<RawDetection> {
    if detections.is_empty() {
        return detections;
    }

    detections.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<RawDetection> = Vec::new();
    let mut suppressed = vec![false; detections.len()];

    for i in 0..detections.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(detections[i].clone());

        for j in (i + 1)..detections.len() {
            if suppressed[j] || detections[i].label != detections[j].label {
                continue;
            }
            if super::iou_xyxy(&detections[i].bbox, &detections[j].bbox) > threshold {
                suppressed[j] = true;
            }
        }
    }

    keep
}

/// Create an ONNX Runtime session for CPU inference.
fn create_session(model_path: &Path) -> MediaResult<Session> {
    let model_bytes = std::fs::read(model_path)
        .map_err(|e| MediaError::detector_failed(format!("Failed to read model file: {e}")))?;

    Session::builder()
        .map_err(|e| MediaError::detector_failed(format!("Failed to create session builder: {e}")))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| MediaError::detector_failed(format!("Failed to set optimization level: {e}")))?
        .commit_from_memory(&model_bytes)
        .map_err(|e| MediaError::detector_failed(format!("Failed to load ONNX model: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_regions_config() {
        let config = OnnxDetectorConfig::explicit_regions("models/detector.onnx", 0.10);
        assert_eq!(config.labels.len(), 5);
        assert_eq!(config.labels[3], "penis");
        assert_eq!(config.input_size, 640);
        assert!((config.confidence_threshold - 0.10).abs() < 1e-6);
    }

    #[test]
    fn test_exposure_classes_config() {
        let config = OnnxDetectorConfig::exposure_classes("models/tertiary.onnx", 0.30);
        assert_eq!(config.labels.len(), 18);
        assert!(config.labels.contains(&"ANUS_EXPOSED".to_string()));
    }

    #[test]
    fn test_nms_suppresses_same_label() {
        let dets = vec![
            RawDetection::new([0.0, 0.0, 100.0, 100.0], "penis", 0.9),
            RawDetection::new([5.0, 5.0, 105.0, 105.0], "penis", 0.6),
            RawDetection::new([300.0, 300.0, 400.0, 400.0], "penis", 0.7),
        ];
        let kept = non_maximum_suppression(dets, 0.3);
        assert_eq!(kept.len(), 2);
        assert!((kept[0].score - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_nms_keeps_distinct_labels() {
        let dets = vec![
            RawDetection::new([0.0, 0.0, 100.0, 100.0], "penis", 0.9),
            RawDetection::new([0.0, 0.0, 100.0, 100.0], "vagina", 0.8),
        ];
        let kept = non_maximum_suppression(dets, 0.3);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_missing_model_errors() {
        let config = OnnxDetectorConfig::explicit_regions("/nonexistent/model.onnx", 0.10);
        let result = OnnxDetector::new(config, "primary");
        assert!(matches!(result, Err(MediaError::ModelNotFound(_))));
    }
}
