#[cfg(feature = "desktop")]
pub mod detector;
pub mod estimator;
pub mod keypoint;
pub mod preprocess;
pub mod schema;

#[cfg(feature = "desktop")]
pub use detector::PoseDetector;
pub use estimator::{Estimator, ReplayEstimator};
pub use keypoint::{JointId, Keypoint, Pose};
pub use preprocess::{preprocess_for_movenet, unletterbox_point};
pub use schema::{adapt, NamedKeypoint, RawKeypoint, RawPose};
