//! 姿勢の検出状態の表示
//!
//! 骨格描画の後、同じパスで描く。

use std::time::Instant;

use crate::config::OverlayConfig;
use crate::pose::{JointId, Pose};
use crate::render::{Color, Font, RenderSurface};

pub const NOT_FOUND_MESSAGE: &str = "POSE NOT FOUND";
pub const LOW_CONFIDENCE_MESSAGE: &str = "LOW CONFIDENCE";

/// 1フレームの検出状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoseStatus {
    /// 十分な数の関節が閾値を超えた
    Detected { confident: usize },
    /// 姿勢はあるが閾値を超えた関節が少ない
    LowConfidence { confident: usize },
    /// 姿勢なし、または空の姿勢
    NotFound,
}

impl PoseStatus {
    pub fn evaluate(pose: Option<&Pose>, confident: usize, min_joints: usize) -> Self {
        match pose {
            None => PoseStatus::NotFound,
            Some(pose) if pose.is_empty() => PoseStatus::NotFound,
            Some(_) if confident < min_joints => PoseStatus::LowConfidence { confident },
            Some(_) => PoseStatus::Detected { confident },
        }
    }

    /// 表示する通知。正常検出時は None
    pub fn notice(&self) -> Option<&'static str> {
        match self {
            PoseStatus::Detected { .. } => None,
            PoseStatus::LowConfidence { .. } => Some(LOW_CONFIDENCE_MESSAGE),
            PoseStatus::NotFound => Some(NOT_FOUND_MESSAGE),
        }
    }

    pub fn confident(&self) -> usize {
        match self {
            PoseStatus::Detected { confident } | PoseStatus::LowConfidence { confident } => *confident,
            PoseStatus::NotFound => 0,
        }
    }
}

/// FPS計測
pub struct FpsCounter {
    frame_count: u32,
    timer: Instant,
    fps: Option<f32>,
}

impl FpsCounter {
    pub fn new() -> Self {
        Self {
            frame_count: 0,
            timer: Instant::now(),
            fps: None,
        }
    }

    /// 1フレーム分カウントし、1秒経過ごとにFPSを更新
    pub fn tick(&mut self) -> Option<f32> {
        self.frame_count += 1;
        let elapsed = self.timer.elapsed().as_secs_f32();
        if elapsed >= 1.0 {
            self.fps = Some(self.frame_count as f32 / elapsed);
            self.frame_count = 0;
            self.timer = Instant::now();
        }
        self.fps
    }

    pub fn fps(&self) -> Option<f32> {
        self.fps
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// 検出状態のテキスト表示
pub struct DiagnosticsOverlay {
    min_joints: usize,
    font: Font,
    text_color: Color,
    warning_color: Color,
    show_point_count: bool,
    show_fps: bool,
    fps: FpsCounter,
}

const MARGIN: f32 = 8.0;

impl DiagnosticsOverlay {
    pub fn new(min_joints: usize) -> Self {
        Self {
            min_joints,
            font: Font::default(),
            text_color: Color::WHITE,
            warning_color: Color::ORANGE,
            show_point_count: false,
            show_fps: false,
            fps: FpsCounter::new(),
        }
    }

    pub fn from_config(config: &OverlayConfig) -> Self {
        Self {
            min_joints: config.min_joints,
            font: Font::new(config.text_scale),
            text_color: config.text_color,
            warning_color: config.warning_color,
            show_point_count: config.show_point_count,
            show_fps: config.show_fps,
            fps: FpsCounter::new(),
        }
    }

    pub fn min_joints(&self) -> usize {
        self.min_joints
    }

    pub fn evaluate(&self, pose: Option<&Pose>, confident: usize) -> PoseStatus {
        PoseStatus::evaluate(pose, confident, self.min_joints)
    }

    /// 状態を描画。骨格描画の後に呼ぶこと（clear はしない）
    pub fn render<S: RenderSurface + ?Sized>(&mut self, surface: &mut S, status: &PoseStatus) {
        let fps = self.fps.tick();
        let line_height = self.font.line_height() as f32;
        let mut y = MARGIN;

        if let Some(notice) = status.notice() {
            let color = match status {
                PoseStatus::NotFound => self.text_color,
                _ => self.warning_color,
            };
            surface.draw_text(notice, MARGIN, y, self.font, color);
            y += line_height;
        }

        if self.show_point_count && *status != PoseStatus::NotFound {
            let text = format!("POINTS: {}/{}", status.confident(), JointId::COUNT);
            surface.draw_text(&text, MARGIN, y, self.font, self.text_color);
            y += line_height;
        }

        if self.show_fps {
            if let Some(fps) = fps {
                surface.draw_text(&format!("FPS: {:.1}", fps), MARGIN, y, self.font, self.text_color);
            }
        }
    }
}
