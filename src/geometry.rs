//! 推論座標系 → 描画座標系の変換
//!
//! 推論エンジンはフレームの実寸（intrinsic）ピクセル座標でキーポイントを返す。
//! 描画面はそれと異なるサイズで表示されることがある（ウィンドウ拡縮、
//! アスペクト比の違うコンテナ内でのレターボックス表示）。

use std::fmt;

use serde::Deserialize;
use tracing::debug;

use crate::error::OverlayError;
use crate::pose::Keypoint;

/// 幅・高さ（ピクセル）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// 幅・高さともに 0 より大きいか
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl From<(u32, u32)> for Dimensions {
    fn from((width, height): (u32, u32)) -> Self {
        Self::new(width, height)
    }
}

/// 座標変換の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitMode {
    /// 表示サイズ == 実寸
    Direct,
    /// 軸ごとに独立に拡縮（CSSスケーリング・デバイスピクセル比）
    Scaled,
    /// 一様スケール + 中央寄せ
    Letterboxed,
}

/// 推論座標 → 描画座標のアフィン変換
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameGeometry {
    pub intrinsic_width: u32,
    pub intrinsic_height: u32,
    pub render_width: u32,
    pub render_height: u32,
    pub offset_x: f32,
    pub offset_y: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub mode: FitMode,
}

impl FrameGeometry {
    /// 恒等変換
    pub fn identity(intrinsic: Dimensions) -> Self {
        Self {
            intrinsic_width: intrinsic.width,
            intrinsic_height: intrinsic.height,
            render_width: intrinsic.width,
            render_height: intrinsic.height,
            offset_x: 0.0,
            offset_y: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            mode: FitMode::Direct,
        }
    }

    /// 実寸・表示サイズ・（任意の）コンテナサイズから変換を求める
    ///
    /// コンテナが与えられればレターボックス、表示サイズが実寸と異なれば
    /// 軸独立スケール、それ以外は恒等変換。
    pub fn reconcile(
        intrinsic: Dimensions,
        displayed: Dimensions,
        container: Option<Dimensions>,
    ) -> Result<Self, OverlayError> {
        match container {
            Some(container) => Self::letterboxed(intrinsic, container),
            None if displayed == intrinsic && intrinsic.is_valid() => Ok(Self::identity(intrinsic)),
            None => Self::scaled(intrinsic, displayed),
        }
    }

    /// 軸ごとに displayed / intrinsic でスケール
    pub fn scaled(intrinsic: Dimensions, displayed: Dimensions) -> Result<Self, OverlayError> {
        ensure_valid(intrinsic, displayed)?;
        Ok(Self {
            intrinsic_width: intrinsic.width,
            intrinsic_height: intrinsic.height,
            render_width: displayed.width,
            render_height: displayed.height,
            offset_x: 0.0,
            offset_y: 0.0,
            scale_x: displayed.width as f32 / intrinsic.width as f32,
            scale_y: displayed.height as f32 / intrinsic.height as f32,
            mode: FitMode::Scaled,
        })
    }

    /// アスペクト比を保ったままコンテナに収め、余白を左右または上下に均等配分
    pub fn letterboxed(intrinsic: Dimensions, container: Dimensions) -> Result<Self, OverlayError> {
        ensure_valid(intrinsic, container)?;

        let (iw, ih) = (intrinsic.width as f32, intrinsic.height as f32);
        let (cw, ch) = (container.width as f32, container.height as f32);
        let scale = (cw / iw).min(ch / ih);

        Ok(Self {
            intrinsic_width: intrinsic.width,
            intrinsic_height: intrinsic.height,
            render_width: container.width,
            render_height: container.height,
            offset_x: (cw - iw * scale) / 2.0,
            offset_y: (ch - ih * scale) / 2.0,
            scale_x: scale,
            scale_y: scale,
            mode: FitMode::Letterboxed,
        })
    }

    /// 表示（レイアウト）座標系の変換をピクセルバッファ座標系に移す
    ///
    /// 描画先がバッファを表示サイズに拡大縮小して見せる場合、描画命令はバッファの
    /// ピクセルで出す必要がある。両者が同じなら変換はそのまま。
    pub fn onto_pixels(&self, layout: Dimensions, pixel: Dimensions) -> Result<Self, OverlayError> {
        if layout == pixel {
            return Ok(*self);
        }
        ensure_valid(layout, pixel)?;

        let rx = pixel.width as f32 / layout.width as f32;
        let ry = pixel.height as f32 / layout.height as f32;
        Ok(Self {
            render_width: pixel.width,
            render_height: pixel.height,
            offset_x: self.offset_x * rx,
            offset_y: self.offset_y * ry,
            scale_x: self.scale_x * rx,
            scale_y: self.scale_y * ry,
            ..*self
        })
    }

    pub fn intrinsic(&self) -> Dimensions {
        Dimensions::new(self.intrinsic_width, self.intrinsic_height)
    }

    pub fn render(&self) -> Dimensions {
        Dimensions::new(self.render_width, self.render_height)
    }

    /// 推論座標 → 描画座標
    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (x * self.scale_x + self.offset_x, y * self.scale_y + self.offset_y)
    }

    pub fn apply_keypoint(&self, kp: &Keypoint) -> (f32, f32) {
        self.apply(kp.x, kp.y)
    }

    /// 描画座標 → 推論座標
    pub fn invert(&self, rx: f32, ry: f32) -> (f32, f32) {
        ((rx - self.offset_x) / self.scale_x, (ry - self.offset_y) / self.scale_y)
    }

    /// 描画座標が映像の内側（レターボックスの余白ではない）か
    pub fn contains_render_point(&self, rx: f32, ry: f32) -> bool {
        let (x, y) = self.invert(rx, ry);
        x >= 0.0 && y >= 0.0 && x < self.intrinsic_width as f32 && y < self.intrinsic_height as f32
    }
}

fn ensure_valid(intrinsic: Dimensions, displayed: Dimensions) -> Result<(), OverlayError> {
    if intrinsic.is_valid() && displayed.is_valid() {
        Ok(())
    } else {
        Err(OverlayError::GeometryMismatch {
            intrinsic,
            displayed,
        })
    }
}

/// 入力寸法が変わったときだけ再計算するキャッシュ
///
/// 寸法が不正な間はジオメトリを保持しない（古い変換で描画しない）。
#[derive(Debug, Default)]
pub struct GeometryCache {
    key: Option<(Dimensions, Dimensions, Option<Dimensions>)>,
    geometry: Option<FrameGeometry>,
}

impl GeometryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(
        &mut self,
        intrinsic: Dimensions,
        displayed: Dimensions,
        container: Option<Dimensions>,
    ) -> Result<FrameGeometry, OverlayError> {
        let key = (intrinsic, displayed, container);
        if self.key == Some(key) {
            if let Some(geometry) = self.geometry {
                return Ok(geometry);
            }
        }

        self.invalidate();
        let geometry = FrameGeometry::reconcile(intrinsic, displayed, container)?;
        debug!(
            "geometry recomputed: intrinsic={} render={} scale=({:.4}, {:.4}) offset=({:.1}, {:.1}) mode={:?}",
            intrinsic,
            geometry.render(),
            geometry.scale_x,
            geometry.scale_y,
            geometry.offset_x,
            geometry.offset_y,
            geometry.mode
        );
        self.key = Some(key);
        self.geometry = Some(geometry);
        Ok(geometry)
    }

    pub fn current(&self) -> Option<FrameGeometry> {
        self.geometry
    }

    pub fn invalidate(&mut self) {
        self.key = None;
        self.geometry = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn test_direct_fit() {
        let dims = Dimensions::new(640, 480);
        let g = FrameGeometry::reconcile(dims, dims, None).unwrap();
        assert_eq!(g.mode, FitMode::Direct);
        assert_eq!(g.scale_x, 1.0);
        assert_eq!(g.scale_y, 1.0);
        assert_eq!(g.offset_x, 0.0);
        assert_eq!(g.offset_y, 0.0);
        assert_eq!(g.apply(123.0, 45.0), (123.0, 45.0));
    }

    #[test]
    fn test_letterbox_wider_container() {
        let g = FrameGeometry::reconcile(
            Dimensions::new(640, 480),
            Dimensions::new(800, 450),
            Some(Dimensions::new(800, 450)),
        )
        .unwrap();
        assert_eq!(g.mode, FitMode::Letterboxed);
        assert!(approx_eq(g.scale_x, 0.9375));
        assert!(approx_eq(g.scale_y, 0.9375));
        assert!(approx_eq(g.offset_x, 100.0));
        assert!(approx_eq(g.offset_y, 0.0));
    }

    #[test]
    fn test_letterbox_taller_container() {
        // 640x480 を 480x800 に収める: scale = 0.75, 上下に余白
        let g = FrameGeometry::letterboxed(Dimensions::new(640, 480), Dimensions::new(480, 800)).unwrap();
        assert!(approx_eq(g.scale_x, 0.75));
        assert!(approx_eq(g.offset_x, 0.0));
        assert!(approx_eq(g.offset_y, (800.0 - 480.0 * 0.75) / 2.0));
    }

    #[test]
    fn test_letterbox_center_maps_to_container_center() {
        let cases = [
            ((640, 480), (800, 450)),
            ((640, 480), (480, 800)),
            ((1920, 1080), (1000, 1000)),
            ((192, 192), (640, 360)),
            ((1280, 720), (1280, 720)),
        ];
        for ((iw, ih), (cw, ch)) in cases {
            let g = FrameGeometry::letterboxed(Dimensions::new(iw, ih), Dimensions::new(cw, ch)).unwrap();
            let (rx, ry) = g.apply(iw as f32 / 2.0, ih as f32 / 2.0);
            assert!(approx_eq(rx, cw as f32 / 2.0), "{}x{} in {}x{}: x={}", iw, ih, cw, ch, rx);
            assert!(approx_eq(ry, ch as f32 / 2.0), "{}x{} in {}x{}: y={}", iw, ih, cw, ch, ry);
        }
    }

    #[test]
    fn test_scaled_fit_is_per_axis() {
        let g = FrameGeometry::reconcile(Dimensions::new(640, 480), Dimensions::new(320, 360), None).unwrap();
        assert_eq!(g.mode, FitMode::Scaled);
        assert!(approx_eq(g.scale_x, 0.5));
        assert!(approx_eq(g.scale_y, 0.75));
        assert_eq!(g.apply(640.0, 480.0), (320.0, 360.0));
    }

    #[test]
    fn test_invert_round_trips_apply() {
        let g = FrameGeometry::letterboxed(Dimensions::new(640, 480), Dimensions::new(800, 450)).unwrap();
        let (rx, ry) = g.apply(10.0, 470.0);
        let (x, y) = g.invert(rx, ry);
        assert!(approx_eq(x, 10.0));
        assert!(approx_eq(y, 470.0));
    }

    #[test]
    fn test_onto_pixels_undoes_display_scaling() {
        // バッファは映像と同サイズ、表示は半分
        let intrinsic = Dimensions::new(640, 480);
        let layout = Dimensions::new(320, 240);
        let g = FrameGeometry::reconcile(intrinsic, layout, None).unwrap();
        assert!((g.scale_x - 0.5).abs() < 1e-6);

        let g = g.onto_pixels(layout, intrinsic).unwrap();
        let (x, y) = g.apply(640.0, 480.0);
        assert!((x - 640.0).abs() < 1e-4);
        assert!((y - 480.0).abs() < 1e-4);
        assert_eq!(g.render(), intrinsic);
    }

    #[test]
    fn test_onto_pixels_letterboxed() {
        // 800x450 のコンテナに表示される 400x225 のバッファ
        let container = Dimensions::new(800, 450);
        let g = FrameGeometry::letterboxed(Dimensions::new(640, 480), container).unwrap();
        let g = g.onto_pixels(container, Dimensions::new(400, 225)).unwrap();
        assert!((g.offset_x - 50.0).abs() < 1e-4);
        let (x, y) = g.apply(320.0, 240.0);
        assert!((x - 200.0).abs() < 1e-4);
        assert!((y - 112.5).abs() < 1e-4);

        assert!(matches!(
            g.onto_pixels(container, Dimensions::new(0, 225)),
            Err(OverlayError::GeometryMismatch { .. })
        ));
    }

    #[test]
    fn test_contains_render_point_excludes_bars() {
        let g = FrameGeometry::letterboxed(Dimensions::new(640, 480), Dimensions::new(800, 450)).unwrap();
        assert!(!g.contains_render_point(50.0, 200.0));
        assert!(g.contains_render_point(400.0, 225.0));
        assert!(!g.contains_render_point(750.0, 200.0));
    }

    #[test]
    fn test_zero_dimensions_are_rejected() {
        let err = FrameGeometry::reconcile(Dimensions::new(0, 0), Dimensions::new(640, 480), None).unwrap_err();
        assert!(matches!(err, OverlayError::GeometryMismatch { .. }));

        let err = FrameGeometry::letterboxed(Dimensions::new(640, 480), Dimensions::new(800, 0)).unwrap_err();
        assert!(matches!(err, OverlayError::GeometryMismatch { .. }));

        // 実寸・表示ともに 0 でも恒等変換にはならない
        let zero = Dimensions::new(0, 0);
        assert!(FrameGeometry::reconcile(zero, zero, None).is_err());
    }

    #[test]
    fn test_cache_recomputes_on_resize() {
        let mut cache = GeometryCache::new();
        let intrinsic = Dimensions::new(640, 480);

        let g1 = cache.resolve(intrinsic, intrinsic, Some(Dimensions::new(800, 450))).unwrap();
        let g2 = cache.resolve(intrinsic, intrinsic, Some(Dimensions::new(800, 450))).unwrap();
        assert_eq!(g1, g2);

        // ウィンドウのリサイズ
        let g3 = cache.resolve(intrinsic, intrinsic, Some(Dimensions::new(480, 800))).unwrap();
        assert_ne!(g1, g3);
        assert_eq!(g3.render(), Dimensions::new(480, 800));

        // カメラの回転（実寸の変化）
        let g4 = cache.resolve(Dimensions::new(480, 640), Dimensions::new(480, 640), None).unwrap();
        assert_eq!(g4.mode, FitMode::Direct);
        assert_eq!(cache.current(), Some(g4));
    }

    #[test]
    fn test_cache_drops_geometry_on_invalid_dimensions() {
        let mut cache = GeometryCache::new();
        let intrinsic = Dimensions::new(640, 480);
        cache.resolve(intrinsic, intrinsic, None).unwrap();
        assert!(cache.current().is_some());

        assert!(cache.resolve(Dimensions::new(0, 480), intrinsic, None).is_err());
        assert!(cache.current().is_none());
    }
}
