use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use ndarray::Array4;

use crate::camera::RasterFrame;
use crate::error::OverlayError;
use crate::geometry::{Dimensions, FrameGeometry};

/// MoveNet用の入力サイズ
pub const MOVENET_INPUT_SIZE: u32 = 192;

/// RasterFrame を MoveNet用の入力テンソルに変換
///
/// - アスペクト比を保って 192x192 にレターボックス（余白は 0）
/// - [1, 192, 192, 3] の f32 テンソル (RGB, 0.0-255.0)
///
/// 返り値のジオメトリは フレーム座標 → 入力テンソル座標 の変換。
/// 推論結果は [`unletterbox_point`] でフレーム座標に戻す。
pub fn preprocess_for_movenet(frame: &RasterFrame) -> Result<(Array4<f32>, FrameGeometry), OverlayError> {
    let size = MOVENET_INPUT_SIZE;
    let letterbox = FrameGeometry::letterboxed(frame.dimensions(), Dimensions::new(size, size))?;

    // 0RGB -> RGB
    let rgb = RgbImage::from_fn(frame.width(), frame.height(), |x, y| {
        let pixel = frame.pixel(x, y).unwrap_or(0);
        Rgb([(pixel >> 16) as u8, (pixel >> 8) as u8, pixel as u8])
    });

    // 縮小して中央に貼る
    let width = ((frame.width() as f32 * letterbox.scale_x).round() as u32).clamp(1, size);
    let height = ((frame.height() as f32 * letterbox.scale_y).round() as u32).clamp(1, size);
    let resized = imageops::resize(&rgb, width, height, FilterType::Triangle);
    let mut input = RgbImage::new(size, size);
    imageops::overlay(
        &mut input,
        &resized,
        letterbox.offset_x.round() as i64,
        letterbox.offset_y.round() as i64,
    );

    let mut tensor = Array4::<f32>::zeros((1, size as usize, size as usize, 3));
    for (x, y, pixel) in input.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, y as usize, x as usize, c]] = pixel[c] as f32;
        }
    }

    Ok((tensor, letterbox))
}

/// 入力テンソル上の正規化座標 (0.0〜1.0) をフレームのピクセル座標に戻す
pub fn unletterbox_point(letterbox: &FrameGeometry, nx: f32, ny: f32) -> (f32, f32) {
    letterbox.invert(nx * letterbox.render_width as f32, ny * letterbox.render_height as f32)
}
