pub mod buffer;
pub mod font;
pub mod recording;
pub mod skeleton;
pub mod surface;
#[cfg(feature = "desktop")]
pub mod window;

pub use buffer::FrameBuffer;
pub use recording::{DrawCommand, RecordingSurface};
pub use skeleton::{DrawStats, SkeletonRenderer, SkeletonStyle, FACE_EDGES, SKELETON_EDGES};
pub use surface::{Color, Font, RenderSurface};
#[cfg(feature = "desktop")]
pub use window::MinifbSurface;
