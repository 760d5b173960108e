#[cfg(feature = "desktop")]
pub mod capture;

#[cfg(feature = "desktop")]
pub use capture::OpenCvCamera;

use crate::error::SourceError;
use crate::geometry::Dimensions;

/// ラスタフレーム（0RGB の u32、行優先）
#[derive(Debug, Clone, PartialEq)]
pub struct RasterFrame {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
}

impl RasterFrame {
    /// ピクセル数が width * height と一致しなければ None
    pub fn new(width: u32, height: u32, pixels: Vec<u32>) -> Option<Self> {
        if pixels.len() != width as usize * height as usize {
            return None;
        }
        Some(Self {
            width,
            height,
            pixels,
        })
    }

    /// 単色フレーム
    pub fn filled(width: u32, height: u32, color: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![color; width as usize * height as usize],
        }
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// 範囲外は None
    pub fn pixel(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels.get(y as usize * self.width as usize + x as usize).copied()
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }
}

/// 映像フレームの供給元
pub trait FrameSource {
    /// ストリームが有効か。無効ならループは開始できない
    fn is_available(&self) -> bool;

    /// フレームの実寸
    fn intrinsic_dimensions(&self) -> Dimensions;

    /// 最新フレームを取得
    fn current_frame(&mut self) -> Result<RasterFrame, SourceError>;
}

/// 同じフレームを返し続けるソース（リプレイ・テスト用）
pub struct StillSource {
    frame: RasterFrame,
}

impl StillSource {
    pub fn new(frame: RasterFrame) -> Self {
        Self { frame }
    }

    /// 黒一色
    pub fn blank(width: u32, height: u32) -> Self {
        Self::new(RasterFrame::filled(width, height, 0))
    }
}

impl FrameSource for StillSource {
    fn is_available(&self) -> bool {
        true
    }

    fn intrinsic_dimensions(&self) -> Dimensions {
        self.frame.dimensions()
    }

    fn current_frame(&mut self) -> Result<RasterFrame, SourceError> {
        Ok(self.frame.clone())
    }
}
