use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::warn;

use crate::pose::JointId;
use crate::render::Color;
use crate::tracker::HistoryPolicy;

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub overlay: OverlayConfig,
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub window: WindowConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OverlayConfig {
    /// 関節・骨格線を描画する最小信頼度（この値ちょうどは描画しない）
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    /// これ未満の関節数なら低信頼度と表示
    #[serde(default = "default_min_joints")]
    pub min_joints: usize,
    /// 関節マーカーの半径（ピクセル）
    #[serde(default = "default_marker_radius")]
    pub marker_radius: f32,
    /// 骨格線の太さ（ピクセル）
    #[serde(default = "default_line_width")]
    pub line_width: f32,
    #[serde(default = "default_marker_color")]
    pub marker_color: Color,
    #[serde(default = "default_line_color")]
    pub line_color: Color,
    /// 診断メッセージの色
    #[serde(default = "default_text_color")]
    pub text_color: Color,
    /// 低信頼度メッセージの色
    #[serde(default = "default_warning_color")]
    pub warning_color: Color,
    /// 顔（目・耳・鼻）の骨格線も描く
    #[serde(default)]
    pub face_edges: bool,
    /// 検出関節数の表示
    #[serde(default = "default_true")]
    pub show_point_count: bool,
    #[serde(default)]
    pub show_fps: bool,
    /// 診断テキストのドット倍率
    #[serde(default = "default_text_scale")]
    pub text_scale: u32,
}

fn default_confidence_threshold() -> f32 { 0.2 }
fn default_min_joints() -> usize { 5 }
fn default_marker_radius() -> f32 { 6.0 }
fn default_line_width() -> f32 { 2.0 }
fn default_marker_color() -> Color { Color::YELLOW }
fn default_line_color() -> Color { Color::CYAN }
fn default_text_color() -> Color { Color::WHITE }
fn default_warning_color() -> Color { Color::ORANGE }
fn default_true() -> bool { true }
fn default_text_scale() -> u32 { 3 }

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            min_joints: default_min_joints(),
            marker_radius: default_marker_radius(),
            line_width: default_line_width(),
            marker_color: default_marker_color(),
            line_color: default_line_color(),
            text_color: default_text_color(),
            warning_color: default_warning_color(),
            face_edges: false,
            show_point_count: true,
            show_fps: false,
            text_scale: default_text_scale(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TrackerConfig {
    /// 姿勢が検出されなかったフレームの後で履歴を消すか
    #[serde(default)]
    pub history_policy: HistoryPolicy,
    /// 移動量を計算する関節。空なら全関節
    #[serde(default)]
    pub joints: Vec<JointId>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CameraConfig {
    #[serde(default)]
    pub index: i32,
    #[serde(default = "default_camera_width")]
    pub width: u32,
    #[serde(default = "default_camera_height")]
    pub height: u32,
    #[serde(default = "default_camera_fps")]
    pub fps: u32,
}

fn default_camera_width() -> u32 { 640 }
fn default_camera_height() -> u32 { 480 }
fn default_camera_fps() -> u32 { 30 }

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            width: default_camera_width(),
            height: default_camera_height(),
            fps: default_camera_fps(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_model_path")]
    pub path: String,
}

fn default_model_path() -> String { "models/movenet_lightning.onnx".to_string() }

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: default_model_path(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// 描画ループの目標FPS（ディスプレイのリフレッシュ相当）
    #[serde(default = "default_target_fps")]
    pub target_fps: u32,
}

fn default_target_fps() -> u32 { 60 }

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            target_fps: default_target_fps(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WindowConfig {
    #[serde(default = "default_window_width")]
    pub width: usize,
    #[serde(default = "default_window_height")]
    pub height: usize,
}

fn default_window_width() -> usize { 800 }
fn default_window_height() -> usize { 450 }

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: default_window_width(),
            height: default_window_height(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = Self::parse(&content)?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// 読み込めなければ既定値
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("{:#}; using default config", e);
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let overlay = &self.overlay;
        if !(0.0..=1.0).contains(&overlay.confidence_threshold) {
            bail!(
                "overlay.confidence_threshold must be within 0.0..=1.0 (got {})",
                overlay.confidence_threshold
            );
        }
        if overlay.min_joints > JointId::COUNT {
            bail!(
                "overlay.min_joints must be at most {} (got {})",
                JointId::COUNT,
                overlay.min_joints
            );
        }
        if overlay.marker_radius < 0.0 || overlay.line_width <= 0.0 {
            bail!("overlay.marker_radius and overlay.line_width must be positive");
        }
        if self.app.target_fps == 0 {
            bail!("app.target_fps must be greater than 0");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.overlay.confidence_threshold, 0.2);
        assert_eq!(config.overlay.min_joints, 5);
        assert_eq!(config.overlay.marker_radius, 6.0);
        assert_eq!(config.overlay.marker_color, Color::YELLOW);
        assert_eq!(config.overlay.line_color, Color::CYAN);
        assert_eq!(config.tracker.history_policy, HistoryPolicy::ClearOnMiss);
        assert_eq!(config.camera.width, 640);
        assert_eq!(config.camera.height, 480);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_file_is_default() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.overlay.confidence_threshold, 0.2);
        assert_eq!(config.app.target_fps, 60);
    }

    #[test]
    fn test_parse_sections() {
        let config = Config::parse(
            r##"
            [overlay]
            confidence_threshold = 0.5
            line_color = "#00FF00"
            face_edges = true

            [tracker]
            history_policy = "preserve"
            joints = ["left_wrist", "right_wrist"]

            [window]
            width = 1280
            height = 720
            "##,
        )
        .unwrap();
        assert_eq!(config.overlay.confidence_threshold, 0.5);
        assert_eq!(config.overlay.line_color, Color(0x00FF00));
        assert!(config.overlay.face_edges);
        assert_eq!(config.overlay.min_joints, 5);
        assert_eq!(config.tracker.history_policy, HistoryPolicy::Preserve);
        assert_eq!(config.tracker.joints, vec![JointId::LeftWrist, JointId::RightWrist]);
        assert_eq!(config.window.width, 1280);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(Config::parse("[overlay]\nconfidence_threshold = 1.5").is_err());
        assert!(Config::parse("[overlay]\nmin_joints = 18").is_err());
        assert!(Config::parse("[overlay]\nmarker_color = \"yellow\"").is_err());
        assert!(Config::parse("[app]\ntarget_fps = 0").is_err());
        assert!(Config::parse("[tracker]\njoints = [\"left_big_toe\"]").is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = Config::load_or_default("does/not/exist.toml");
        assert_eq!(config.overlay.min_joints, 5);
    }
}
