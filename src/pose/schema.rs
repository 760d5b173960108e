//! 推論エンジン出力の正規化
//!
//! 推論エンジンの出力形式は2種類ある:
//! - 関節順に並んだキーポイント配列（MoveNet の `[17, 3]` 出力など）
//! - `{name, x, y, score}` の名前付きレコード列（tfjs pose-detection など）
//!
//! どちらもここで [`Pose`] に変換し、以降のモジュールは形式を区別しない。

use serde::Deserialize;
use tracing::trace;

use super::keypoint::{JointId, Keypoint, Pose};
use crate::error::OverlayError;

/// 位置インデックスで関節を表すキーポイント
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct RawKeypoint {
    pub x: Option<f32>,
    pub y: Option<f32>,
    #[serde(alias = "confidence")]
    pub score: Option<f32>,
}

impl RawKeypoint {
    pub fn new(x: f32, y: f32, score: f32) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            score: Some(score),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RawPosition {
    pub x: f32,
    pub y: f32,
}

/// 関節名で関節を表すキーポイント
///
/// 座標は `x`/`y` 直下、または `position: {x, y}`（PoseNet 形式）のどちらでもよい。
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct NamedKeypoint {
    #[serde(alias = "part")]
    pub name: Option<String>,
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub position: Option<RawPosition>,
    #[serde(alias = "confidence")]
    pub score: Option<f32>,
}

impl NamedKeypoint {
    pub fn new(name: &str, x: f32, y: f32, score: f32) -> Self {
        Self {
            name: Some(name.to_string()),
            x: Some(x),
            y: Some(y),
            position: None,
            score: Some(score),
        }
    }

    fn coordinates(&self) -> (Option<f32>, Option<f32>) {
        match self.position {
            Some(p) => (Some(p.x), Some(p.y)),
            None => (self.x, self.y),
        }
    }
}

/// 推論エンジン境界での1人分の出力
#[derive(Debug, Clone, PartialEq)]
pub enum RawPose {
    Indexed(Vec<RawKeypoint>),
    Named(Vec<NamedKeypoint>),
}

#[derive(Deserialize)]
struct JsonPose {
    #[serde(default)]
    keypoints: Vec<NamedKeypoint>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonPoses {
    Many(Vec<JsonPose>),
    One(JsonPose),
}

impl RawPose {
    /// JSON の推論結果を読み込む
    ///
    /// `[{"keypoints": [...]}, ...]` または単一の `{"keypoints": [...]}`。
    /// レコードに `name`/`part` があれば名前付き、無ければ位置インデックスとみなす。
    pub fn parse_json(json: &str) -> Result<Vec<RawPose>, serde_json::Error> {
        let poses = match serde_json::from_str::<JsonPoses>(json)? {
            JsonPoses::Many(poses) => poses,
            JsonPoses::One(pose) => vec![pose],
        };
        Ok(poses.into_iter().map(|p| RawPose::from_records(p.keypoints)).collect())
    }

    fn from_records(records: Vec<NamedKeypoint>) -> Self {
        if records.iter().any(|r| r.name.is_some()) {
            return RawPose::Named(records);
        }
        RawPose::Indexed(
            records
                .into_iter()
                .map(|r| {
                    let (x, y) = r.coordinates();
                    RawKeypoint { x, y, score: r.score }
                })
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        match self {
            RawPose::Indexed(kps) => kps.is_empty(),
            RawPose::Named(kps) => kps.is_empty(),
        }
    }
}

/// 推論結果の先頭（主）姿勢を [`Pose`] に変換する
///
/// 入力が無い・空の場合は空の Pose を返す。未知の関節と欠損レコードは捨てる。
pub fn adapt(raw: Option<&RawPose>) -> Pose {
    let mut pose = Pose::new();
    let Some(raw) = raw else {
        return pose;
    };

    match raw {
        RawPose::Indexed(records) => {
            for (index, record) in records.iter().enumerate() {
                let Some(joint) = JointId::from_index(index) else {
                    continue;
                };
                insert_checked(&mut pose, joint, record.x, record.y, record.score);
            }
        }
        RawPose::Named(records) => {
            for record in records {
                let Some(joint) = record.name.as_deref().and_then(JointId::from_name) else {
                    continue;
                };
                let (x, y) = record.coordinates();
                insert_checked(&mut pose, joint, x, y, record.score);
            }
        }
    }
    pose
}

fn insert_checked(pose: &mut Pose, joint: JointId, x: Option<f32>, y: Option<f32>, score: Option<f32>) {
    match validate(joint, x, y, score) {
        Ok(kp) => pose.insert(kp),
        Err(e) => trace!("dropping keypoint: {}", e),
    }
}

/// 欠損・非有限値のレコードを弾く。スコアは [0, 1] に収める
pub fn validate(
    joint: JointId,
    x: Option<f32>,
    y: Option<f32>,
    score: Option<f32>,
) -> Result<Keypoint, OverlayError> {
    match (x, y, score) {
        (Some(x), Some(y), Some(score)) if x.is_finite() && y.is_finite() && score.is_finite() => {
            Ok(Keypoint::new(joint, x, y, score.clamp(0.0, 1.0)))
        }
        _ => Err(OverlayError::MalformedPoseData(format!(
            "{}: x={:?} y={:?} score={:?}",
            joint.name(),
            x,
            y,
            score
        ))),
    }
}
