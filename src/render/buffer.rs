use super::font;
use super::surface::{Color, Font, RenderSurface};
use crate::camera::RasterFrame;
use crate::geometry::{Dimensions, FrameGeometry};

/// ソフトウェア描画の 0RGB フレームバッファ
pub struct FrameBuffer {
    buffer: Vec<u32>,
    width: usize,
    height: usize,
    clear_color: Color,
    /// clear 時に戻す映像。バッファと同サイズ
    backdrop: Option<Vec<u32>>,
    letterbox: bool,
}

impl FrameBuffer {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            buffer: vec![0u32; width * height],
            width,
            height,
            clear_color: Color::BLACK,
            backdrop: None,
            letterbox: false,
        }
    }

    /// 映像をアスペクト比を保って中央に収める（ウィンドウ表示用）
    pub fn letterboxed(mut self) -> Self {
        self.letterbox = true;
        self
    }

    pub fn with_clear_color(mut self, color: Color) -> Self {
        self.clear_color = color;
        self
    }

    pub fn buffer(&self) -> &[u32] {
        &self.buffer
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.buffer[y * self.width + x])
    }

    /// サイズを変更し、内容と映像を破棄する
    pub fn resize(&mut self, width: usize, height: usize) {
        if width == self.width && height == self.height {
            return;
        }
        self.width = width;
        self.height = height;
        self.buffer = vec![self.clear_color.0; width * height];
        self.backdrop = None;
    }

    /// Bresenhamのアルゴリズムで線を描画
    ///
    /// 端点はバッファ近傍にクリップ済みであること。
    fn line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, color: u32, radius: i32) {
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;

        let mut x = x0;
        let mut y = y0;

        loop {
            if radius > 0 {
                self.circle(x, y, radius, color);
            } else {
                self.set_pixel(x, y, color);
            }

            if x == x1 && y == y1 {
                break;
            }

            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    /// 円を描画（塗りつぶし）。バッファ内の範囲だけ走査する
    fn circle(&mut self, cx: i32, cy: i32, radius: i32, color: u32) {
        let (cx, cy, r) = (cx as i64, cy as i64, radius.max(0) as i64);
        let (w, h) = (self.width as i64, self.height as i64);

        let y_range = (cy - r).max(0)..=(cy + r).min(h - 1);
        let x_range = (cx - r).max(0)..=(cx + r).min(w - 1);
        for y in y_range {
            for x in x_range.clone() {
                let (dx, dy) = (x - cx, y - cy);
                if dx * dx + dy * dy <= r * r {
                    self.buffer[y as usize * self.width + x as usize] = color;
                }
            }
        }
    }

    /// 線分をバッファを margin だけ広げた矩形にクリップ (Liang-Barsky)
    ///
    /// 遠方の端点でも精度が落ちないよう f64 で計算する。
    fn clip_segment(&self, x1: f32, y1: f32, x2: f32, y2: f32, margin: f32) -> Option<(f32, f32, f32, f32)> {
        if ![x1, y1, x2, y2].iter().all(|v| v.is_finite()) {
            return None;
        }
        let (x1, y1, x2, y2, margin) = (x1 as f64, y1 as f64, x2 as f64, y2 as f64, margin as f64);
        let (xmin, ymin) = (-margin, -margin);
        let (xmax, ymax) = (self.width as f64 + margin, self.height as f64 + margin);
        let (dx, dy) = (x2 - x1, y2 - y1);

        let mut t0 = 0.0f64;
        let mut t1 = 1.0f64;
        for (p, q) in [(-dx, x1 - xmin), (dx, xmax - x1), (-dy, y1 - ymin), (dy, ymax - y1)] {
            if p == 0.0 {
                if q < 0.0 {
                    return None;
                }
            } else {
                let t = q / p;
                if p < 0.0 {
                    t0 = t0.max(t);
                } else {
                    t1 = t1.min(t);
                }
                if t0 > t1 {
                    return None;
                }
            }
        }
        Some((
            (x1 + t0 * dx) as f32,
            (y1 + t0 * dy) as f32,
            (x1 + t1 * dx) as f32,
            (y1 + t1 * dy) as f32,
        ))
    }

    /// 座標がバッファ近傍（margin 以内）にあるか
    fn near_buffer(&self, x: f32, y: f32, margin: f32) -> bool {
        x.is_finite()
            && y.is_finite()
            && x >= -margin
            && y >= -margin
            && x <= self.width as f32 + margin
            && y <= self.height as f32 + margin
    }

    /// ピクセルをセット（境界チェック付き）
    fn set_pixel(&mut self, x: i32, y: i32, color: u32) {
        if x >= 0 && x < self.width as i32 && y >= 0 && y < self.height as i32 {
            self.buffer[y as usize * self.width + x as usize] = color;
        }
    }
}

impl RenderSurface for FrameBuffer {
    fn clear(&mut self) {
        match &self.backdrop {
            Some(backdrop) if backdrop.len() == self.buffer.len() => {
                self.buffer.copy_from_slice(backdrop);
            }
            _ => self.buffer.fill(self.clear_color.0),
        }
    }

    fn draw_marker(&mut self, x: f32, y: f32, radius: f32, color: Color) {
        let radius = radius.max(0.0).min(self.width.max(self.height) as f32);
        if !self.near_buffer(x, y, radius) {
            return;
        }
        self.circle(x.round() as i32, y.round() as i32, radius.round() as i32, color.0);
    }

    fn draw_line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, color: Color, width: f32) {
        let radius = ((width - 1.0) / 2.0).round().max(0.0).min(self.width.max(self.height) as f32);
        let Some((x1, y1, x2, y2)) = self.clip_segment(x1, y1, x2, y2, radius + 1.0) else {
            return;
        };
        self.line(
            x1.round() as i32,
            y1.round() as i32,
            x2.round() as i32,
            y2.round() as i32,
            color.0,
            radius as i32,
        );
    }

    fn draw_text(&mut self, text: &str, x: f32, y: f32, font: Font, color: Color) {
        if !self.near_buffer(x, y, 0.0) {
            return;
        }
        font::for_each_pixel(text, x.round() as i32, y.round() as i32, font.scale, |px, py| {
            self.set_pixel(px, py, color.0)
        });
    }

    fn pixel_dimensions(&self) -> Dimensions {
        Dimensions::new(self.width as u32, self.height as u32)
    }

    fn container_dimensions(&self) -> Option<Dimensions> {
        self.letterbox.then(|| self.pixel_dimensions())
    }

    /// 描画座標の各ピクセルについて映像上の最近傍ピクセルを引く。余白は clear_color
    fn set_backdrop(&mut self, frame: &RasterFrame, geometry: &FrameGeometry) {
        let mut backdrop = vec![self.clear_color.0; self.buffer.len()];
        for y in 0..self.height {
            for x in 0..self.width {
                let (rx, ry) = (x as f32 + 0.5, y as f32 + 0.5);
                if !geometry.contains_render_point(rx, ry) {
                    continue;
                }
                let (fx, fy) = geometry.invert(rx, ry);
                if let Some(pixel) = frame.pixel(fx as u32, fy as u32) {
                    backdrop[y * self.width + x] = pixel;
                }
            }
        }
        self.backdrop = Some(backdrop);
    }
}
