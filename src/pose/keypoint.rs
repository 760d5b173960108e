use serde::Deserialize;

/// COCO / MoveNet の 17 関節
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(usize)]
pub enum JointId {
    Nose = 0,
    LeftEye = 1,
    RightEye = 2,
    LeftEar = 3,
    RightEar = 4,
    LeftShoulder = 5,
    RightShoulder = 6,
    LeftElbow = 7,
    RightElbow = 8,
    LeftWrist = 9,
    RightWrist = 10,
    LeftHip = 11,
    RightHip = 12,
    LeftKnee = 13,
    RightKnee = 14,
    LeftAnkle = 15,
    RightAnkle = 16,
}

impl JointId {
    pub const COUNT: usize = 17;

    pub const ALL: [JointId; JointId::COUNT] = [
        JointId::Nose,
        JointId::LeftEye,
        JointId::RightEye,
        JointId::LeftEar,
        JointId::RightEar,
        JointId::LeftShoulder,
        JointId::RightShoulder,
        JointId::LeftElbow,
        JointId::RightElbow,
        JointId::LeftWrist,
        JointId::RightWrist,
        JointId::LeftHip,
        JointId::RightHip,
        JointId::LeftKnee,
        JointId::RightKnee,
        JointId::LeftAnkle,
        JointId::RightAnkle,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// snake_case の関節名
    pub fn name(self) -> &'static str {
        match self {
            Self::Nose => "nose",
            Self::LeftEye => "left_eye",
            Self::RightEye => "right_eye",
            Self::LeftEar => "left_ear",
            Self::RightEar => "right_ear",
            Self::LeftShoulder => "left_shoulder",
            Self::RightShoulder => "right_shoulder",
            Self::LeftElbow => "left_elbow",
            Self::RightElbow => "right_elbow",
            Self::LeftWrist => "left_wrist",
            Self::RightWrist => "right_wrist",
            Self::LeftHip => "left_hip",
            Self::RightHip => "right_hip",
            Self::LeftKnee => "left_knee",
            Self::RightKnee => "right_knee",
            Self::LeftAnkle => "left_ankle",
            Self::RightAnkle => "right_ankle",
        }
    }

    /// 関節名から解決する
    ///
    /// "left_shoulder" / "leftShoulder" / "LEFT_SHOULDER" / "left-shoulder" を同一視する。
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized: String = name
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        Self::ALL
            .iter()
            .copied()
            .find(|joint| joint.name().replace('_', "") == normalized)
    }
}

/// 単一キーポイント（推論座標系のピクセル座標）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub joint: JointId,
    pub x: f32,
    pub y: f32,
    /// 信頼度スコア (0.0〜1.0)
    pub confidence: f32,
}

impl Keypoint {
    pub fn new(joint: JointId, x: f32, y: f32, confidence: f32) -> Self {
        Self {
            joint,
            x,
            y,
            confidence,
        }
    }

    /// 信頼度が閾値を超えるか（閾値ちょうどは描画しない）
    pub fn is_confident(&self, threshold: f32) -> bool {
        self.confidence > threshold
    }
}

/// 1人分の姿勢。検出されなかった関節は None
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Pose {
    keypoints: [Option<Keypoint>; JointId::COUNT],
}

impl Pose {
    pub fn new() -> Self {
        Self::default()
    }

    /// 同じ関節が既にあれば置き換える
    pub fn insert(&mut self, keypoint: Keypoint) {
        self.keypoints[keypoint.joint.index()] = Some(keypoint);
    }

    pub fn get(&self, joint: JointId) -> Option<&Keypoint> {
        self.keypoints[joint.index()].as_ref()
    }

    /// 存在するキーポイントを関節順に返す
    pub fn iter(&self) -> impl Iterator<Item = &Keypoint> {
        self.keypoints.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.iter().all(Option::is_none)
    }

    /// 閾値を超える関節の数
    pub fn confident_count(&self, threshold: f32) -> usize {
        self.iter().filter(|kp| kp.is_confident(threshold)).count()
    }

    /// 存在する関節の平均信頼度
    pub fn average_confidence(&self) -> f32 {
        let len = self.len();
        if len == 0 {
            return 0.0;
        }
        let sum: f32 = self.iter().map(|k| k.confidence).sum();
        sum / len as f32
    }
}

impl FromIterator<Keypoint> for Pose {
    fn from_iter<I: IntoIterator<Item = Keypoint>>(iter: I) -> Self {
        let mut pose = Pose::new();
        for kp in iter {
            pose.insert(kp);
        }
        pose
    }
}
