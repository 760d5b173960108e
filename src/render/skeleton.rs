use super::surface::{Color, RenderSurface};
use crate::config::OverlayConfig;
use crate::geometry::FrameGeometry;
use crate::pose::{JointId, Keypoint, Pose};

/// 骨格線 (端点A, 端点B)。向きは無い
pub type SkeletonEdge = (JointId, JointId);

/// 体幹・四肢の骨格線
pub const SKELETON_EDGES: [SkeletonEdge; 12] = [
    // 腕
    (JointId::LeftShoulder, JointId::LeftElbow),
    (JointId::LeftElbow, JointId::LeftWrist),
    (JointId::RightShoulder, JointId::RightElbow),
    (JointId::RightElbow, JointId::RightWrist),
    // 上半身
    (JointId::LeftShoulder, JointId::RightShoulder),
    // 脚
    (JointId::LeftHip, JointId::LeftKnee),
    (JointId::LeftKnee, JointId::LeftAnkle),
    (JointId::RightHip, JointId::RightKnee),
    (JointId::RightKnee, JointId::RightAnkle),
    // 胴体
    (JointId::LeftHip, JointId::RightHip),
    (JointId::LeftShoulder, JointId::LeftHip),
    (JointId::RightShoulder, JointId::RightHip),
];

/// 顔の骨格線
pub const FACE_EDGES: [SkeletonEdge; 4] = [
    (JointId::LeftEar, JointId::LeftEye),
    (JointId::LeftEye, JointId::Nose),
    (JointId::Nose, JointId::RightEye),
    (JointId::RightEye, JointId::RightEar),
];

/// 描画スタイル
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkeletonStyle {
    pub marker_radius: f32,
    pub marker_color: Color,
    pub line_width: f32,
    pub line_color: Color,
}

impl Default for SkeletonStyle {
    fn default() -> Self {
        Self {
            marker_radius: 6.0,
            marker_color: Color::YELLOW,
            line_width: 2.0,
            line_color: Color::CYAN,
        }
    }
}

/// 1パスで描いた要素数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrawStats {
    pub markers: usize,
    pub edges: usize,
}

/// 両端点が存在し、どちらも閾値を超えていれば端点を返す
pub fn visible_edge<'a>(pose: &'a Pose, edge: &SkeletonEdge, threshold: f32) -> Option<(&'a Keypoint, &'a Keypoint)> {
    let a = pose.get(edge.0).filter(|kp| kp.is_confident(threshold))?;
    let b = pose.get(edge.1).filter(|kp| kp.is_confident(threshold))?;
    Some((a, b))
}

/// 信頼度でゲートした骨格グラフの描画
pub struct SkeletonRenderer {
    confidence_threshold: f32,
    style: SkeletonStyle,
    face_edges: bool,
}

impl SkeletonRenderer {
    pub fn new(confidence_threshold: f32, style: SkeletonStyle) -> Self {
        Self {
            confidence_threshold,
            style,
            face_edges: false,
        }
    }

    pub fn from_config(config: &OverlayConfig) -> Self {
        let style = SkeletonStyle {
            marker_radius: config.marker_radius,
            marker_color: config.marker_color,
            line_width: config.line_width,
            line_color: config.line_color,
        };
        Self::new(config.confidence_threshold, style).with_face_edges(config.face_edges)
    }

    pub fn with_face_edges(mut self, enabled: bool) -> Self {
        self.face_edges = enabled;
        self
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    /// 描画対象の骨格線
    pub fn edges(&self) -> impl Iterator<Item = &'static SkeletonEdge> {
        let face: &'static [SkeletonEdge] = if self.face_edges { &FACE_EDGES } else { &[] };
        SKELETON_EDGES.iter().chain(face.iter())
    }

    /// 描画面をクリアしてから姿勢を描画
    pub fn draw<S: RenderSurface + ?Sized>(&self, surface: &mut S, pose: &Pose, geometry: &FrameGeometry) -> DrawStats {
        surface.clear();

        let threshold = self.confidence_threshold;
        let mut stats = DrawStats::default();

        // 骨格線を描画
        for edge in self.edges() {
            if let Some((start, end)) = visible_edge(pose, edge, threshold) {
                let (x1, y1) = geometry.apply_keypoint(start);
                let (x2, y2) = geometry.apply_keypoint(end);
                surface.draw_line(x1, y1, x2, y2, self.style.line_color, self.style.line_width);
                stats.edges += 1;
            }
        }

        // キーポイントを描画
        for kp in pose.iter().filter(|kp| kp.is_confident(threshold)) {
            let (x, y) = geometry.apply_keypoint(kp);
            surface.draw_marker(x, y, self.style.marker_radius, self.style.marker_color);
            stats.markers += 1;
        }

        stats
    }
}
