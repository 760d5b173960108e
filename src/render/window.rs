use anyhow::Result;
use minifb::{Key, Window, WindowOptions};

use super::buffer::FrameBuffer;
use super::surface::{Color, Font, RenderSurface};
use crate::camera::RasterFrame;
use crate::error::OverlayError;
use crate::geometry::{Dimensions, FrameGeometry};

/// minifbウィンドウへの描画
///
/// ウィンドウ全体をコンテナとして映像をレターボックス表示し、その上に骨格を重ねる。
pub struct MinifbSurface {
    window: Window,
    canvas: FrameBuffer,
}

impl MinifbSurface {
    /// ウィンドウを作成
    pub fn new(title: &str, width: usize, height: usize) -> Result<Self> {
        let mut window = Window::new(
            title,
            width,
            height,
            WindowOptions {
                resize: true,
                ..WindowOptions::default()
            },
        )?;
        // フレームレートは検出ループ側で制御する
        window.set_target_fps(0);

        Ok(Self {
            window,
            canvas: FrameBuffer::new(width, height).letterboxed(),
        })
    }
}

impl RenderSurface for MinifbSurface {
    fn clear(&mut self) {
        self.canvas.clear();
    }

    fn draw_marker(&mut self, x: f32, y: f32, radius: f32, color: Color) {
        self.canvas.draw_marker(x, y, radius, color);
    }

    fn draw_line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, color: Color, width: f32) {
        self.canvas.draw_line(x1, y1, x2, y2, color, width);
    }

    fn draw_text(&mut self, text: &str, x: f32, y: f32, font: Font, color: Color) {
        self.canvas.draw_text(text, x, y, font, color);
    }

    fn pixel_dimensions(&self) -> Dimensions {
        self.canvas.pixel_dimensions()
    }

    fn container_dimensions(&self) -> Option<Dimensions> {
        self.canvas.container_dimensions()
    }

    /// ウィンドウサイズに合わせてバッファを作り直す
    fn refresh_layout(&mut self) {
        let (width, height) = self.window.get_size();
        if width > 0 && height > 0 {
            self.canvas.resize(width, height);
        }
    }

    fn set_backdrop(&mut self, frame: &RasterFrame, geometry: &FrameGeometry) {
        self.canvas.set_backdrop(frame, geometry);
    }

    /// バッファをウィンドウに表示
    fn present(&mut self) -> Result<(), OverlayError> {
        self.window
            .update_with_buffer(self.canvas.buffer(), self.canvas.width(), self.canvas.height())
            .map_err(|e| OverlayError::Surface(e.to_string()))
    }

    /// ウィンドウが開いているか
    fn is_open(&self) -> bool {
        self.window.is_open() && !self.window.is_key_down(Key::Escape)
    }
}
