//! 検出ループ
//!
//! フレーム取得 → 推論（唯一の待機点） → 正規化 → 座標変換 → 骨格描画 →
//! 移動量追跡 → 診断表示 を、リフレッシュ1回につき1サイクル実行する。
//! シングルスレッド協調実行で、同時に走る描画パスは常に1つ。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::camera::FrameSource;
use crate::config::Config;
use crate::diagnostics::{DiagnosticsOverlay, PoseStatus};
use crate::error::OverlayError;
use crate::geometry::{FrameGeometry, GeometryCache};
use crate::pose::{schema, Estimator};
use crate::render::{DrawStats, RenderSurface, SkeletonRenderer};
use crate::tracker::{Displacements, MotionTracker};

/// ディスプレイのリフレッシュ通知
#[allow(async_fn_in_trait)]
pub trait RefreshSignal {
    async fn tick(&mut self);
}

impl RefreshSignal for tokio::time::Interval {
    async fn tick(&mut self) {
        tokio::time::Interval::tick(self).await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Stopped,
}

/// 外部からループを止めるハンドル
///
/// 停止後は推論中のサイクルが完了しても描画しない。
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    fn reset(&self) {
        self.stopped.store(false, Ordering::Release);
    }
}

/// 1サイクル分の描画結果
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub status: PoseStatus,
    pub draw: DrawStats,
    pub displacements: Displacements,
    /// 描画に使った変換（ピクセルバッファ座標系）
    pub geometry: FrameGeometry,
    /// 検出された関節の平均信頼度
    pub average_confidence: f32,
}

/// 1サイクルの結果
#[derive(Debug)]
pub enum CycleOutcome {
    Rendered(CycleReport),
    /// フレーム取得・推論に失敗。描画せず次のサイクルへ
    Skipped(OverlayError),
    /// 寸法が確定していないため描画を見送った
    Deferred(OverlayError),
    /// 停止済み。描画していない
    Stopped,
}

pub struct DetectionLoop<S, E, R> {
    source: S,
    estimator: E,
    surface: R,
    renderer: SkeletonRenderer,
    tracker: MotionTracker,
    diagnostics: DiagnosticsOverlay,
    geometry: GeometryCache,
    state: LoopState,
    stop: StopHandle,
}

impl<S, E, R> DetectionLoop<S, E, R>
where
    S: FrameSource,
    E: Estimator,
    R: RenderSurface,
{
    pub fn new(
        source: S,
        estimator: E,
        surface: R,
        renderer: SkeletonRenderer,
        tracker: MotionTracker,
        diagnostics: DiagnosticsOverlay,
    ) -> Self {
        Self {
            source,
            estimator,
            surface,
            renderer,
            tracker,
            diagnostics,
            geometry: GeometryCache::new(),
            state: LoopState::Idle,
            stop: StopHandle::new(),
        }
    }

    pub fn from_config(source: S, estimator: E, surface: R, config: &Config) -> Self {
        Self::new(
            source,
            estimator,
            surface,
            SkeletonRenderer::from_config(&config.overlay),
            MotionTracker::from_config(&config.overlay, &config.tracker),
            DiagnosticsOverlay::from_config(&config.overlay),
        )
    }

    /// 外部で作った停止ハンドルを共有する
    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn surface(&self) -> &R {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut R {
        &mut self.surface
    }

    pub fn estimator_mut(&mut self) -> &mut E {
        &mut self.estimator
    }

    pub fn tracker(&self) -> &MotionTracker {
        &self.tracker
    }

    /// Idle / Stopped → Running
    ///
    /// フレームソースが無効なら `PermissionDenied` で失敗し、状態は変わらない。
    /// Stopped からの再開では移動量の履歴と座標変換を破棄する。
    pub fn start(&mut self) -> Result<(), OverlayError> {
        if self.state == LoopState::Running {
            return Err(OverlayError::InvalidState("running"));
        }
        if !self.source.is_available() {
            return Err(OverlayError::PermissionDenied("frame source has no active stream".to_string()));
        }

        if self.state == LoopState::Stopped {
            self.tracker.reset();
            self.geometry.invalidate();
            self.stop.reset();
        }
        self.state = LoopState::Running;
        info!("detection loop running (intrinsic {})", self.source.intrinsic_dimensions());
        Ok(())
    }

    /// 以降の描画パスを止める
    pub fn stop(&mut self) {
        self.stop.stop();
        self.enter_stopped();
    }

    fn enter_stopped(&mut self) {
        if self.state != LoopState::Stopped {
            info!("detection loop stopped");
        }
        self.state = LoopState::Stopped;
    }

    /// 1サイクル実行
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        if self.stop.is_stopped() {
            self.enter_stopped();
        }
        if self.state != LoopState::Running {
            return CycleOutcome::Stopped;
        }

        let frame = match self.source.current_frame() {
            Ok(frame) => frame,
            Err(e) => {
                warn!("frame skipped: {}", e);
                self.tracker.update(None);
                return CycleOutcome::Skipped(e.into());
            }
        };

        let estimate = self.estimator.estimate(&frame).await;

        // 推論中に停止された場合は結果を捨てる
        if self.stop.is_stopped() {
            self.enter_stopped();
            return CycleOutcome::Stopped;
        }

        let poses = match estimate {
            Ok(poses) => poses,
            Err(e) => {
                warn!("inference failed, skipping frame: {}", e);
                self.tracker.update(None);
                return CycleOutcome::Skipped(e.into());
            }
        };

        let pose = schema::adapt(poses.first());

        // 表示座標系で合わせてから、描画命令を出すピクセルバッファ座標系に移す
        self.surface.refresh_layout();
        let layout = self.surface.layout_dimensions();
        let geometry = self
            .geometry
            .resolve(self.source.intrinsic_dimensions(), layout, self.surface.container_dimensions())
            .and_then(|g| g.onto_pixels(layout, self.surface.pixel_dimensions()));
        let geometry = match geometry {
            Ok(geometry) => geometry,
            Err(e) => {
                debug!("geometry deferred: {}", e);
                self.tracker.update(None);
                return CycleOutcome::Deferred(e);
            }
        };

        self.surface.set_backdrop(&frame, &geometry);
        let draw = self.renderer.draw(&mut self.surface, &pose, &geometry);

        let detected = Some(&pose).filter(|p| !p.is_empty());
        let displacements = self.tracker.update(detected);

        let status = self.diagnostics.evaluate(detected, draw.markers);
        self.diagnostics.render(&mut self.surface, &status);

        if let Err(e) = self.surface.present() {
            warn!("present failed: {}", e);
        }

        CycleOutcome::Rendered(CycleReport {
            status,
            draw,
            displacements,
            geometry,
            average_confidence: pose.average_confidence(),
        })
    }

    /// 停止されるか描画先が閉じるまでサイクルを回す
    ///
    /// 開始に失敗した場合のみエラーを返す。サイクル内のエラーはそのサイクルだけで閉じる。
    /// 返り値は描画したフレーム数。
    pub async fn run<T: RefreshSignal>(&mut self, refresh: &mut T) -> Result<u64, OverlayError> {
        if self.state != LoopState::Running {
            self.start()?;
        }

        let mut rendered = 0u64;
        loop {
            match self.run_cycle().await {
                CycleOutcome::Rendered(_) => rendered += 1,
                CycleOutcome::Stopped => break,
                CycleOutcome::Skipped(_) | CycleOutcome::Deferred(_) => {}
            }

            if self.stop.is_stopped() || !self.surface.is_open() {
                self.stop();
                break;
            }
            refresh.tick().await;
        }
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{RasterFrame, StillSource};
    use crate::error::{EstimatorError, SourceError};
    use crate::geometry::Dimensions;
    use crate::pose::{JointId, RawKeypoint, RawPose};
    use crate::render::RecordingSurface;
    use crate::tracker::HistoryPolicy;
    use std::collections::VecDeque;

    /// 予め決めた結果を順に返す推論エンジン
    struct ScriptedEstimator {
        script: VecDeque<Result<Vec<RawPose>, EstimatorError>>,
        stop_during_estimate: Option<StopHandle>,
    }

    impl ScriptedEstimator {
        fn new(script: Vec<Result<Vec<RawPose>, EstimatorError>>) -> Self {
            Self {
                script: script.into(),
                stop_during_estimate: None,
            }
        }
    }

    impl Estimator for ScriptedEstimator {
        async fn estimate(&mut self, _frame: &RasterFrame) -> Result<Vec<RawPose>, EstimatorError> {
            if let Some(stop) = &self.stop_during_estimate {
                stop.stop();
            }
            self.script.pop_front().unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    struct UnavailableSource;

    impl FrameSource for UnavailableSource {
        fn is_available(&self) -> bool {
            false
        }

        fn intrinsic_dimensions(&self) -> Dimensions {
            Dimensions::new(0, 0)
        }

        fn current_frame(&mut self) -> Result<RasterFrame, SourceError> {
            Err(SourceError::Unavailable("permission denied".to_string()))
        }
    }

    /// 全関節を (x, y) = (index * 10, index * 10) に置いた姿勢
    fn full_pose(confidence: f32) -> RawPose {
        RawPose::Indexed(
            (0..JointId::COUNT)
                .map(|i| RawKeypoint::new(i as f32 * 10.0, i as f32 * 10.0, confidence))
                .collect(),
        )
    }

    fn new_loop(
        script: Vec<Result<Vec<RawPose>, EstimatorError>>,
    ) -> DetectionLoop<StillSource, ScriptedEstimator, RecordingSurface> {
        DetectionLoop::new(
            StillSource::blank(640, 480),
            ScriptedEstimator::new(script),
            RecordingSurface::new(Dimensions::new(640, 480)),
            SkeletonRenderer::new(0.3, Default::default()),
            MotionTracker::new(0.3, HistoryPolicy::ClearOnMiss),
            DiagnosticsOverlay::new(5),
        )
    }

    fn rendered(outcome: CycleOutcome) -> CycleReport {
        match outcome {
            CycleOutcome::Rendered(report) => report,
            other => panic!("expected Rendered, got {:?}", other),
        }
    }

    #[test]
    fn test_start_fails_without_source() {
        let mut detection = DetectionLoop::new(
            UnavailableSource,
            ScriptedEstimator::new(Vec::new()),
            RecordingSurface::new(Dimensions::new(640, 480)),
            SkeletonRenderer::new(0.3, Default::default()),
            MotionTracker::new(0.3, HistoryPolicy::ClearOnMiss),
            DiagnosticsOverlay::new(5),
        );
        let err = detection.start().unwrap_err();
        assert!(matches!(err, OverlayError::PermissionDenied(_)));
        assert_eq!(detection.state(), LoopState::Idle);
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let mut detection = new_loop(Vec::new());
        detection.start().unwrap();
        assert!(matches!(detection.start(), Err(OverlayError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_cycle_before_start_does_nothing() {
        let mut detection = new_loop(vec![Ok(vec![full_pose(0.9)])]);
        assert!(matches!(detection.run_cycle().await, CycleOutcome::Stopped));
        assert_eq!(detection.surface().clears, 0);
    }

    #[tokio::test]
    async fn test_detected_cycle() {
        let mut detection = new_loop(vec![Ok(vec![full_pose(0.9)])]);
        detection.start().unwrap();
        let report = rendered(detection.run_cycle().await);
        assert_eq!(report.status, PoseStatus::Detected { confident: 17 });
        assert_eq!(report.draw, DrawStats { markers: 17, edges: 12 });
        assert!(report.displacements.is_empty());
        assert!((report.average_confidence - 0.9).abs() < 1e-5);
        assert_eq!(detection.surface().presents, 1);
        assert_eq!(detection.surface().texts().count(), 0);
    }

    #[tokio::test]
    async fn test_zero_poses_not_found_and_history_cleared() {
        let mut detection = new_loop(vec![Ok(vec![full_pose(0.9)]), Ok(Vec::new())]);
        detection.start().unwrap();
        rendered(detection.run_cycle().await);
        assert!(detection.tracker().history().is_some());

        let report = rendered(detection.run_cycle().await);
        assert_eq!(report.status, PoseStatus::NotFound);
        assert_eq!(report.draw, DrawStats::default());
        assert!(detection.tracker().history().is_none());
        assert_eq!(detection.surface().markers().count(), 0);
        assert_eq!(detection.surface().lines().count(), 0);
        assert_eq!(
            detection.surface().texts().collect::<Vec<_>>(),
            vec![crate::diagnostics::NOT_FOUND_MESSAGE]
        );
    }

    #[tokio::test]
    async fn test_inference_failure_skips_and_continues() {
        let mut detection = new_loop(vec![
            Err(EstimatorError::new("backend rejected frame")),
            Ok(vec![full_pose(0.9)]),
        ]);
        detection.start().unwrap();

        let outcome = detection.run_cycle().await;
        assert!(matches!(outcome, CycleOutcome::Skipped(OverlayError::InferenceFailure(_))));
        assert_eq!(detection.surface().clears, 0);
        assert_eq!(detection.state(), LoopState::Running);

        rendered(detection.run_cycle().await);
    }

    #[tokio::test]
    async fn test_stop_during_estimate_prevents_render() {
        let mut detection = new_loop(vec![Ok(vec![full_pose(0.9)])]);
        detection.start().unwrap();
        detection.estimator_mut().stop_during_estimate = Some(detection.stop_handle());

        assert!(matches!(detection.run_cycle().await, CycleOutcome::Stopped));
        assert_eq!(detection.state(), LoopState::Stopped);
        assert_eq!(detection.surface().clears, 0);
        assert_eq!(detection.surface().presents, 0);
    }

    #[tokio::test]
    async fn test_restart_clears_history() {
        let mut detection = new_loop(vec![Ok(vec![full_pose(0.9)])]);
        detection.start().unwrap();
        rendered(detection.run_cycle().await);
        assert!(detection.tracker().history().is_some());

        detection.stop();
        assert_eq!(detection.state(), LoopState::Stopped);
        assert!(matches!(detection.run_cycle().await, CycleOutcome::Stopped));

        detection.start().unwrap();
        assert_eq!(detection.state(), LoopState::Running);
        assert!(detection.tracker().history().is_none());
        assert!(!detection.stop_handle().is_stopped());
    }

    #[tokio::test]
    async fn test_zero_layout_defers_geometry() {
        let mut detection = new_loop(vec![Ok(vec![full_pose(0.9)]), Ok(vec![full_pose(0.9)])]);
        detection.surface_mut().set_layout(Dimensions::new(0, 0));
        detection.start().unwrap();

        let outcome = detection.run_cycle().await;
        assert!(matches!(outcome, CycleOutcome::Deferred(OverlayError::GeometryMismatch { .. })));
        assert_eq!(detection.surface().clears, 0);

        detection.surface_mut().set_layout(Dimensions::new(320, 240));
        let report = rendered(detection.run_cycle().await);
        assert_eq!(report.geometry.render(), Dimensions::new(640, 480));
    }

    #[tokio::test]
    async fn test_draws_in_buffer_pixels_when_layout_differs() {
        // バッファは映像と同じ 640x480、表示は 320x240 に縮小
        let mut corner = vec![RawKeypoint::new(0.0, 0.0, 0.0); JointId::COUNT];
        corner[JointId::Nose.index()] = RawKeypoint::new(640.0, 480.0, 0.9);
        let mut detection = new_loop(vec![Ok(vec![RawPose::Indexed(corner)])]);
        detection.surface_mut().set_layout(Dimensions::new(320, 240));
        detection.start().unwrap();

        let report = rendered(detection.run_cycle().await);
        assert!((report.geometry.scale_x - 1.0).abs() < 1e-6);
        assert_eq!(detection.surface().markers().collect::<Vec<_>>(), vec![(640.0, 480.0)]);
    }

    fn wrist_at(x: f32) -> Result<Vec<RawPose>, EstimatorError> {
        let mut points = vec![RawKeypoint::new(0.0, 0.0, 0.0); JointId::COUNT];
        points[JointId::LeftWrist.index()] = RawKeypoint::new(x, 100.0, 0.9);
        Ok(vec![RawPose::Indexed(points)])
    }

    #[tokio::test]
    async fn test_failed_cycle_clears_history() {
        let mut detection = new_loop(vec![
            wrist_at(100.0),
            Err(EstimatorError::new("timeout")),
            wrist_at(130.0),
        ]);
        detection.start().unwrap();

        rendered(detection.run_cycle().await);
        assert!(matches!(detection.run_cycle().await, CycleOutcome::Skipped(_)));
        assert!(detection.tracker().history().is_none());

        let report = rendered(detection.run_cycle().await);
        assert!(report.displacements.is_empty());
    }

    #[tokio::test]
    async fn test_deferred_cycle_clears_history() {
        let mut detection = new_loop(vec![wrist_at(100.0), wrist_at(110.0), wrist_at(130.0)]);
        detection.start().unwrap();

        rendered(detection.run_cycle().await);
        detection.surface_mut().set_layout(Dimensions::new(0, 0));
        assert!(matches!(detection.run_cycle().await, CycleOutcome::Deferred(_)));
        assert!(detection.tracker().history().is_none());

        detection.surface_mut().set_layout(Dimensions::new(640, 480));
        assert!(rendered(detection.run_cycle().await).displacements.is_empty());
    }

    #[tokio::test]
    async fn test_preserve_policy_survives_failed_cycle() {
        let mut detection = DetectionLoop::new(
            StillSource::blank(640, 480),
            ScriptedEstimator::new(vec![wrist_at(100.0), Err(EstimatorError::new("timeout")), wrist_at(130.0)]),
            RecordingSurface::new(Dimensions::new(640, 480)),
            SkeletonRenderer::new(0.3, Default::default()),
            MotionTracker::new(0.3, HistoryPolicy::Preserve),
            DiagnosticsOverlay::new(5),
        );
        detection.start().unwrap();

        rendered(detection.run_cycle().await);
        assert!(matches!(detection.run_cycle().await, CycleOutcome::Skipped(_)));
        let report = rendered(detection.run_cycle().await);
        assert!((report.displacements[&JointId::LeftWrist].dx - 30.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_run_until_stopped() {
        let mut detection = new_loop(vec![
            Ok(vec![full_pose(0.9)]),
            Err(EstimatorError::new("timeout")),
            Ok(vec![full_pose(0.9)]),
        ]);
        let stop = detection.stop_handle();
        let mut refresh = tokio::time::interval(std::time::Duration::from_millis(16));

        let mut ticks = 0;
        struct CountingRefresh<'a> {
            inner: &'a mut tokio::time::Interval,
            ticks: &'a mut usize,
            stop_after: usize,
            stop: StopHandle,
        }
        impl RefreshSignal for CountingRefresh<'_> {
            async fn tick(&mut self) {
                *self.ticks += 1;
                if *self.ticks >= self.stop_after {
                    self.stop.stop();
                }
                self.inner.tick().await;
            }
        }

        let mut counting = CountingRefresh {
            inner: &mut refresh,
            ticks: &mut ticks,
            stop_after: 3,
            stop,
        };
        let frames = detection.run(&mut counting).await.unwrap();
        assert_eq!(frames, 2);
        assert_eq!(ticks, 3);
        assert_eq!(detection.state(), LoopState::Stopped);
    }
}
