use anyhow::{Context, Result};
use opencv::{
    core::{Mat, Vec3b},
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureAPIs},
};
use tracing::info;

use super::{FrameSource, RasterFrame};
use crate::config::CameraConfig;
use crate::error::SourceError;
use crate::geometry::Dimensions;

/// デバイスが解像度を返さない場合の既定値
const FALLBACK_WIDTH: u32 = 640;
const FALLBACK_HEIGHT: u32 = 480;

/// OpenCVを使用したカメラキャプチャ
pub struct OpenCvCamera {
    capture: VideoCapture,
    width: u32,
    height: u32,
}

impl OpenCvCamera {
    /// 設定に従ってカメラを開く
    pub fn open(config: &CameraConfig) -> Result<Self> {
        Self::open_with_config(config.index, Some(config.width), Some(config.height), Some(config.fps))
    }

    /// 解像度とFPSを指定してカメラを開く
    pub fn open_with_config(index: i32, width: Option<u32>, height: Option<u32>, fps: Option<u32>) -> Result<Self> {
        let mut capture =
            VideoCapture::new(index, VideoCaptureAPIs::CAP_ANY as i32).context("Failed to open camera")?;

        if !capture.is_opened()? {
            anyhow::bail!("Camera {} is not available", index);
        }

        if let Some(w) = width {
            capture.set(videoio::CAP_PROP_FRAME_WIDTH, w as f64)?;
        }
        if let Some(h) = height {
            capture.set(videoio::CAP_PROP_FRAME_HEIGHT, h as f64)?;
        }
        if let Some(f) = fps {
            capture.set(videoio::CAP_PROP_FPS, f as f64)?;
        }
        capture.set(videoio::CAP_PROP_BUFFERSIZE, 1.0)?;

        // 解像度を返さないデバイスでは 640x480 とみなす
        let actual_width = match capture.get(videoio::CAP_PROP_FRAME_WIDTH)? as u32 {
            0 => FALLBACK_WIDTH,
            w => w,
        };
        let actual_height = match capture.get(videoio::CAP_PROP_FRAME_HEIGHT)? as u32 {
            0 => FALLBACK_HEIGHT,
            h => h,
        };
        let actual_fps = capture.get(videoio::CAP_PROP_FPS)?;
        info!("camera {}: {}x{} @ {} fps", index, actual_width, actual_height, actual_fps);

        Ok(Self {
            capture,
            width: actual_width,
            height: actual_height,
        })
    }

    /// 解像度を取得
    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// フレームを読み込む（BGR形式）
    pub fn read_frame(&mut self) -> Result<Mat> {
        let mut frame = Mat::default();
        self.capture
            .read(&mut frame)
            .context("Failed to read frame")?;

        if frame.empty() {
            anyhow::bail!("Empty frame received");
        }

        Ok(frame)
    }
}

/// BGR Mat を 0RGB のラスタに変換
pub fn mat_to_raster(frame: &Mat) -> Result<RasterFrame> {
    let width = frame.cols() as u32;
    let height = frame.rows() as u32;
    let mut pixels = Vec::with_capacity(width as usize * height as usize);

    for y in 0..height as i32 {
        for x in 0..width as i32 {
            let pixel = frame.at_2d::<Vec3b>(y, x)?;
            // BGR -> RGB -> u32
            let r = pixel[2] as u32;
            let g = pixel[1] as u32;
            let b = pixel[0] as u32;
            pixels.push((r << 16) | (g << 8) | b);
        }
    }

    RasterFrame::new(width, height, pixels).context("frame buffer size mismatch")
}

impl FrameSource for OpenCvCamera {
    fn is_available(&self) -> bool {
        self.capture.is_opened().unwrap_or(false)
    }

    fn intrinsic_dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }

    fn current_frame(&mut self) -> Result<RasterFrame, SourceError> {
        let mat = self.read_frame().map_err(|e| SourceError::Read(format!("{:#}", e)))?;
        let frame = mat_to_raster(&mat).map_err(|e| SourceError::Read(format!("{:#}", e)))?;
        // デバイス側で解像度が変わった（回転など）場合は実寸を追従させる
        self.width = frame.width();
        self.height = frame.height();
        Ok(frame)
    }
}
