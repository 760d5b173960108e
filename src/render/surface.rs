use serde::Deserialize;

use crate::camera::RasterFrame;
use crate::error::OverlayError;
use crate::geometry::{Dimensions, FrameGeometry};

/// 0RGB の色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub struct Color(pub u32);

impl Color {
    pub const BLACK: Color = Color(0x000000);
    pub const WHITE: Color = Color(0xFFFFFF);
    pub const RED: Color = Color(0xFF0000);
    pub const YELLOW: Color = Color(0xFFFF00);
    pub const CYAN: Color = Color(0x00FFFF);
    pub const ORANGE: Color = Color(0xFFA500);

    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self(((r as u32) << 16) | ((g as u32) << 8) | b as u32)
    }

    /// "#RRGGBB" または "RRGGBB"
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.trim().trim_start_matches('#');
        if digits.len() != 6 {
            return None;
        }
        u32::from_str_radix(digits, 16).ok().map(Color)
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Color::from_hex(&value).ok_or_else(|| format!("invalid color '{}', expected #RRGGBB", value))
    }
}

/// ビットマップフォントの指定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Font {
    /// 1ドットあたりのピクセル数
    pub scale: u32,
}

impl Font {
    pub const fn new(scale: u32) -> Self {
        Self { scale }
    }

    /// 1行の高さ（行間込み）
    pub fn line_height(&self) -> u32 {
        6 * self.scale
    }
}

impl Default for Font {
    fn default() -> Self {
        Self::new(3)
    }
}

/// オーバーレイの描画先
///
/// 座標はすべて描画座標系（[`FrameGeometry`] 適用後）。
pub trait RenderSurface {
    /// 前フレームの描画をすべて消す
    fn clear(&mut self);

    /// 塗りつぶし円
    fn draw_marker(&mut self, x: f32, y: f32, radius: f32, color: Color);

    fn draw_line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, color: Color, width: f32);

    fn draw_text(&mut self, text: &str, x: f32, y: f32, font: Font, color: Color);

    /// ピクセルバッファのサイズ
    fn pixel_dimensions(&self) -> Dimensions;

    /// 画面上の表示サイズ
    fn layout_dimensions(&self) -> Dimensions {
        self.pixel_dimensions()
    }

    /// 映像をレターボックス表示するコンテナのサイズ。無ければ None
    fn container_dimensions(&self) -> Option<Dimensions> {
        None
    }

    /// 描画パスの前にレイアウト変化（ウィンドウリサイズ等）を取り込む
    fn refresh_layout(&mut self) {}

    /// オーバーレイの下に映像を敷く。`clear` はこの映像まで戻す
    fn set_backdrop(&mut self, _frame: &RasterFrame, _geometry: &FrameGeometry) {}

    /// 描画結果を画面に出す
    fn present(&mut self) -> Result<(), OverlayError> {
        Ok(())
    }

    /// 描画先が閉じられたら false
    fn is_open(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_from_hex() {
        assert_eq!(Color::from_hex("#FFFF00"), Some(Color::YELLOW));
        assert_eq!(Color::from_hex("00ffff"), Some(Color::CYAN));
        assert_eq!(Color::from_hex("#FFF"), None);
        assert_eq!(Color::from_hex("#GGGGGG"), None);
    }

    #[test]
    fn test_color_rgb() {
        assert_eq!(Color::rgb(255, 165, 0), Color::ORANGE);
    }

    #[test]
    fn test_color_try_from_string() {
        assert!(Color::try_from("#00FF00".to_string()).is_ok());
        let err = Color::try_from("green".to_string()).unwrap_err();
        assert!(err.contains("green"));
    }
}
