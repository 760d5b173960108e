use thiserror::Error;

use crate::geometry::Dimensions;

/// 検出ループ全体のエラー分類
///
/// ループ開始時のエラー (`PermissionDenied`) は致命的。
/// 実行中サイクル内のエラーはそのサイクルだけで閉じ、ループは継続する。
#[derive(Debug, Error)]
pub enum OverlayError {
    /// フレームソースが利用できない（カメラ権限拒否・ストリーム無し）
    #[error("camera unavailable: {0}")]
    PermissionDenied(String),

    /// 実行中サイクルでフレームを取得できなかった
    #[error("frame unavailable: {0}")]
    FrameUnavailable(String),

    /// 推論エンジンがフレームを拒否した
    #[error("inference failed: {0}")]
    InferenceFailure(String),

    /// 推論結果のレコードに必要なフィールドが欠けている
    #[error("malformed pose data: {0}")]
    MalformedPoseData(String),

    /// 寸法が 0 のため座標変換を計算できない
    #[error("invalid frame geometry: intrinsic {intrinsic}, displayed {displayed}")]
    GeometryMismatch {
        intrinsic: Dimensions,
        displayed: Dimensions,
    },

    /// 描画先への出力に失敗した
    #[error("render surface error: {0}")]
    Surface(String),

    #[error("detection loop is already {0}")]
    InvalidState(&'static str),
}

/// フレームソース側のエラー
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("no active stream: {0}")]
    Unavailable(String),

    #[error("failed to read frame: {0}")]
    Read(String),
}

/// 推論エンジン側のエラー
#[derive(Debug, Error)]
#[error("{message}")]
pub struct EstimatorError {
    pub message: String,
}

impl EstimatorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for EstimatorError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(format!("{:#}", err))
    }
}

impl From<SourceError> for OverlayError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Unavailable(msg) => OverlayError::PermissionDenied(msg),
            SourceError::Read(msg) => OverlayError::FrameUnavailable(msg),
        }
    }
}

impl From<EstimatorError> for OverlayError {
    fn from(err: EstimatorError) -> Self {
        OverlayError::InferenceFailure(err.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_unavailable_maps_to_permission_denied() {
        let err: OverlayError = SourceError::Unavailable("no device".into()).into();
        assert!(matches!(err, OverlayError::PermissionDenied(ref m) if m == "no device"));
    }

    #[test]
    fn test_estimator_error_from_anyhow_keeps_context() {
        let err = anyhow::anyhow!("tensor shape").context("Inference failed");
        let est = EstimatorError::from(err);
        assert_eq!(est.message, "Inference failed: tensor shape");

        let overlay: OverlayError = est.into();
        assert_eq!(overlay.to_string(), "inference failed: Inference failed: tensor shape");
    }

    #[test]
    fn test_geometry_mismatch_message() {
        let err = OverlayError::GeometryMismatch {
            intrinsic: Dimensions::new(0, 480),
            displayed: Dimensions::new(640, 480),
        };
        assert_eq!(
            err.to_string(),
            "invalid frame geometry: intrinsic 0x480, displayed 640x480"
        );
    }
}
