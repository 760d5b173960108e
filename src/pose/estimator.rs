use std::collections::VecDeque;
use std::io::BufRead;

use anyhow::{Context, Result};

use super::schema::RawPose;
use crate::camera::RasterFrame;
use crate::error::EstimatorError;
use crate::scheduler::StopHandle;

/// 姿勢推定エンジン
///
/// `estimate` は検出ループ唯一の待機点。1フレームにつき0人以上の姿勢を返す。
#[allow(async_fn_in_trait)]
pub trait Estimator {
    async fn estimate(&mut self, frame: &RasterFrame) -> Result<Vec<RawPose>, EstimatorError>;
}

/// 記録済みの推論結果を1フレームずつ返す
///
/// 1行 = 1フレーム分の JSON（[`RawPose::parse_json`] 形式）。
/// 使い切ったらループに停止を要求する。
pub struct ReplayEstimator {
    frames: VecDeque<Vec<RawPose>>,
    stop: Option<StopHandle>,
}

impl ReplayEstimator {
    pub fn new(frames: impl IntoIterator<Item = Vec<RawPose>>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
            stop: None,
        }
    }

    /// JSON Lines を読み込む。空行は無視
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut frames = Vec::new();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let poses = RawPose::parse_json(&line)
                .with_context(|| format!("invalid pose record on line {}", lineno + 1))?;
            frames.push(poses);
        }
        Ok(Self::new(frames))
    }

    pub fn with_stop(mut self, stop: StopHandle) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl Estimator for ReplayEstimator {
    async fn estimate(&mut self, _frame: &RasterFrame) -> Result<Vec<RawPose>, EstimatorError> {
        match self.frames.pop_front() {
            Some(poses) => Ok(poses),
            None => {
                if let Some(stop) = &self.stop {
                    stop.stop();
                }
                Ok(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replay_from_reader() {
        let input = "[{\"keypoints\": [{\"name\": \"nose\", \"x\": 1, \"y\": 2, \"score\": 0.9}]}]\n\n[]\n";
        let mut replay = ReplayEstimator::from_reader(input.as_bytes()).unwrap();
        assert_eq!(replay.remaining(), 2);

        let frame = RasterFrame::filled(4, 4, 0);
        assert_eq!(replay.estimate(&frame).await.unwrap().len(), 1);
        assert!(replay.estimate(&frame).await.unwrap().is_empty());
        assert_eq!(replay.remaining(), 0);
    }

    #[tokio::test]
    async fn test_replay_requests_stop_when_exhausted() {
        let stop = StopHandle::new();
        let mut replay = ReplayEstimator::new(Vec::new()).with_stop(stop.clone());
        let frame = RasterFrame::filled(4, 4, 0);
        assert!(replay.estimate(&frame).await.unwrap().is_empty());
        assert!(stop.is_stopped());
    }

    #[test]
    fn test_replay_reports_bad_line() {
        let input = "[]\n{not json}\n";
        let err = ReplayEstimator::from_reader(input.as_bytes()).err().unwrap();
        assert!(format!("{:#}", err).contains("line 2"));
    }
}
