use anyhow::{Context, Result};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;

use super::estimator::Estimator;
use super::keypoint::JointId;
use super::preprocess::{preprocess_for_movenet, unletterbox_point};
use super::schema::{RawKeypoint, RawPose};
use crate::camera::RasterFrame;
use crate::config::ModelConfig;
use crate::error::EstimatorError;

const INPUT_NAME: &str = "serving_default_input_0";
/// [1, 1, 17, 3] (y, x, score)、座標は入力画像に対する 0.0〜1.0
const OUTPUT_NAME: &str = "StatefulPartitionedCall_0";

/// MoveNet (SinglePose Lightning) を推論エンジンとして使う
pub struct PoseDetector {
    session: Session,
}

impl PoseDetector {
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let path = model_path.as_ref();
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(path)
            .with_context(|| format!("failed to load ONNX model {}", path.display()))?;

        Ok(Self { session })
    }

    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        Self::new(&config.path)
    }

    /// 1フレーム推論し、フレームのピクセル座標で返す（レターボックスは除去済み）
    pub fn detect(&mut self, frame: &RasterFrame) -> Result<RawPose> {
        let (input, letterbox) = preprocess_for_movenet(frame)?;
        let outputs = self
            .session
            .run(ort::inputs![INPUT_NAME => Tensor::from_array(input)?])
            .context("MoveNet inference failed")?;

        let output: ndarray::ArrayViewD<f32> = outputs[OUTPUT_NAME]
            .try_extract_array()
            .with_context(|| format!("missing output tensor {}", OUTPUT_NAME))?;

        let keypoints = (0..JointId::COUNT)
            .map(|i| {
                let (x, y) = unletterbox_point(&letterbox, output[[0, 0, i, 1]], output[[0, 0, i, 0]]);
                RawKeypoint::new(x, y, output[[0, 0, i, 2]])
            })
            .collect();

        Ok(RawPose::Indexed(keypoints))
    }
}

impl Estimator for PoseDetector {
    async fn estimate(&mut self, frame: &RasterFrame) -> Result<Vec<RawPose>, EstimatorError> {
        let pose = self.detect(frame)?;
        // 推論は同期実行なので、ここで一度ランタイムに制御を返す
        tokio::task::yield_now().await;
        Ok(vec![pose])
    }
}
