pub mod motion;

pub use motion::{displacements, Displacement, Displacements, HistoryPolicy, MotionTracker};
