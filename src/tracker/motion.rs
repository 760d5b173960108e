use serde::Deserialize;
use std::collections::BTreeMap;

use crate::config::{OverlayConfig, TrackerConfig};
use crate::pose::{JointId, Pose};

/// 姿勢が検出されなかったフレームの後の履歴の扱い
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryPolicy {
    /// 履歴を消す。次に検出されたフレームでは移動量を出さない
    #[default]
    ClearOnMiss,
    /// 最後に検出された姿勢を保持する（数フレーム前との比較になりうる）
    Preserve,
}

/// 1関節のフレーム間移動量（推論座標系のピクセル）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Displacement {
    pub dx: f32,
    pub dy: f32,
}

impl Displacement {
    pub fn magnitude(&self) -> f32 {
        (self.dx * self.dx + self.dy * self.dy).sqrt()
    }
}

pub type Displacements = BTreeMap<JointId, Displacement>;

/// 前フレームと今フレームの両方で閾値を超える関節の移動量
pub fn displacements(previous: &Pose, current: &Pose, threshold: f32) -> Displacements {
    current
        .iter()
        .filter(|kp| kp.is_confident(threshold))
        .filter_map(|kp| {
            let prev = previous.get(kp.joint).filter(|p| p.is_confident(threshold))?;
            Some((
                kp.joint,
                Displacement {
                    dx: kp.x - prev.x,
                    dy: kp.y - prev.y,
                },
            ))
        })
        .collect()
}

/// 関節のフレーム間移動を追跡する
///
/// 履歴は直前フレームの姿勢そのもの。毎フレーム丸ごと置き換え、マージしない。
pub struct MotionTracker {
    confidence_threshold: f32,
    policy: HistoryPolicy,
    joints: Vec<JointId>,
    history: Option<Pose>,
}

impl MotionTracker {
    pub fn new(confidence_threshold: f32, policy: HistoryPolicy) -> Self {
        Self {
            confidence_threshold,
            policy,
            joints: Vec::new(),
            history: None,
        }
    }

    pub fn from_config(overlay: &OverlayConfig, config: &TrackerConfig) -> Self {
        Self::new(overlay.confidence_threshold, config.history_policy).with_joints(&config.joints)
    }

    /// 追跡する関節を限定する。空なら全関節
    pub fn with_joints(mut self, joints: &[JointId]) -> Self {
        self.joints = joints.to_vec();
        self
    }

    /// 今フレームの姿勢で更新し、移動量を返す
    ///
    /// `None` または空の姿勢は「検出なし」として扱う。
    pub fn update(&mut self, current: Option<&Pose>) -> Displacements {
        let current = current.filter(|p| !p.is_empty());

        let Some(current) = current else {
            if self.policy == HistoryPolicy::ClearOnMiss {
                self.history = None;
            }
            return Displacements::new();
        };

        let mut result = match &self.history {
            Some(previous) => displacements(previous, current, self.confidence_threshold),
            None => Displacements::new(),
        };
        if !self.joints.is_empty() {
            result.retain(|joint, _| self.joints.contains(joint));
        }

        self.history = Some(current.clone());
        result
    }

    pub fn history(&self) -> Option<&Pose> {
        self.history.as_ref()
    }

    pub fn policy(&self) -> HistoryPolicy {
        self.policy
    }

    pub fn reset(&mut self) {
        self.history = None;
    }
}
