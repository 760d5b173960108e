pub mod camera;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod geometry;
pub mod pose;
pub mod render;
pub mod scheduler;
pub mod tracker;
