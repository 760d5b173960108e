use super::surface::{Color, Font, RenderSurface};
use crate::geometry::Dimensions;

/// 描画命令
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Marker { x: f32, y: f32, radius: f32, color: Color },
    Line { x1: f32, y1: f32, x2: f32, y2: f32, color: Color, width: f32 },
    Text { text: String, x: f32, y: f32, color: Color },
}

/// 描画命令を記録するだけの描画先（ヘッドレス実行・検証用）
///
/// `clear` で記録を破棄するので、`commands` は常に直近1パス分。
#[derive(Debug, Clone)]
pub struct RecordingSurface {
    pub commands: Vec<DrawCommand>,
    pub clears: usize,
    pub presents: usize,
    pixel: Dimensions,
    layout: Dimensions,
    container: Option<Dimensions>,
}

impl RecordingSurface {
    pub fn new(pixel: Dimensions) -> Self {
        Self {
            commands: Vec::new(),
            clears: 0,
            presents: 0,
            pixel,
            layout: pixel,
            container: None,
        }
    }

    /// 表示サイズを変更（CSSスケーリング相当）
    pub fn with_layout(mut self, layout: Dimensions) -> Self {
        self.layout = layout;
        self
    }

    /// レターボックス表示のコンテナ
    pub fn with_container(mut self, container: Dimensions) -> Self {
        self.container = Some(container);
        self
    }

    pub fn set_layout(&mut self, layout: Dimensions) {
        self.layout = layout;
    }

    pub fn markers(&self) -> impl Iterator<Item = (f32, f32)> + '_ {
        self.commands.iter().filter_map(|c| match c {
            DrawCommand::Marker { x, y, .. } => Some((*x, *y)),
            _ => None,
        })
    }

    pub fn lines(&self) -> impl Iterator<Item = ((f32, f32), (f32, f32))> + '_ {
        self.commands.iter().filter_map(|c| match c {
            DrawCommand::Line { x1, y1, x2, y2, .. } => Some(((*x1, *y1), (*x2, *y2))),
            _ => None,
        })
    }

    pub fn texts(&self) -> impl Iterator<Item = &str> + '_ {
        self.commands.iter().filter_map(|c| match c {
            DrawCommand::Text { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }
}

impl RenderSurface for RecordingSurface {
    fn clear(&mut self) {
        self.commands.clear();
        self.clears += 1;
    }

    fn draw_marker(&mut self, x: f32, y: f32, radius: f32, color: Color) {
        self.commands.push(DrawCommand::Marker { x, y, radius, color });
    }

    fn draw_line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, color: Color, width: f32) {
        self.commands.push(DrawCommand::Line {
            x1,
            y1,
            x2,
            y2,
            color,
            width,
        });
    }

    fn draw_text(&mut self, text: &str, x: f32, y: f32, _font: Font, color: Color) {
        self.commands.push(DrawCommand::Text {
            text: text.to_string(),
            x,
            y,
            color,
        });
    }

    fn pixel_dimensions(&self) -> Dimensions {
        self.pixel
    }

    fn layout_dimensions(&self) -> Dimensions {
        self.layout
    }

    fn container_dimensions(&self) -> Option<Dimensions> {
        self.container
    }

    fn present(&mut self) -> Result<(), crate::error::OverlayError> {
        self.presents += 1;
        Ok(())
    }
}
