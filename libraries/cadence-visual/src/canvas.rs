//! 2D drawing surface
//!
//! Renderers only ever clear the surface and fill axis-aligned rectangles, so
//! that is all `Canvas` asks for. `DisplayList` records the calls; it backs
//! the tests and the CLI's SVG export.

use std::fmt::Write as _;

/// 8-bit RGB color with a float alpha
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f32,
}

impl Rgba {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Parse `#RRGGBB`
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.strip_prefix('#')?;
        if digits.len() != 6 {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(digits.get(i..i + 2)?, 16).ok();
        Some(Self::rgb(channel(0)?, channel(2)?, channel(4)?))
    }

    /// Same color with its alpha multiplied by `alpha`
    pub fn with_alpha(self, alpha: f32) -> Self {
        Self {
            a: (self.a * alpha).clamp(0.0, 1.0),
            ..self
        }
    }

    /// CSS/SVG color string
    pub fn to_css(&self) -> String {
        if self.a >= 1.0 {
            format!("rgb({},{},{})", self.r, self.g, self.b)
        } else {
            format!("rgba({},{},{},{})", self.r, self.g, self.b, self.a)
        }
    }
}

/// How a rectangle is filled
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Fill {
    Solid(Rgba),
    /// Linear gradient from the rectangle's top edge to its bottom edge
    VerticalGradient { top: Rgba, bottom: Rgba },
}

impl Fill {
    /// Same fill drawn at `alpha` opacity
    pub fn with_alpha(self, alpha: f32) -> Self {
        match self {
            Fill::Solid(color) => Fill::Solid(color.with_alpha(alpha)),
            Fill::VerticalGradient { top, bottom } => Fill::VerticalGradient {
                top: top.with_alpha(alpha),
                bottom: bottom.with_alpha(alpha),
            },
        }
    }
}

/// Surface the visualizers draw on
pub trait Canvas: Send {
    /// Backing size in pixels (width, height)
    fn size(&self) -> (u32, u32);

    /// Resize the backing store; contents are discarded
    fn resize(&mut self, width: u32, height: u32);

    /// Erase the whole surface
    fn clear(&mut self);

    fn fill_rect(&mut self, x: f64, y: f64, width: f64, height: f64, fill: Fill);
}

/// One recorded drawing call
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Clear,
    Rect {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        fill: Fill,
    },
}

/// `Canvas` that records the current frame's drawing calls
#[derive(Debug, Clone, Default)]
pub struct DisplayList {
    width: u32,
    height: u32,
    ops: Vec<DrawOp>,
    draw_calls: u64,
    clears: u64,
}

impl DisplayList {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    /// Calls since the last clear
    pub fn ops(&self) -> &[DrawOp] {
        &self.ops
    }

    /// Rectangles drawn since the last clear
    pub fn rects(&self) -> impl Iterator<Item = (f64, f64, f64, f64, Fill)> + '_ {
        self.ops.iter().filter_map(|op| match *op {
            DrawOp::Rect {
                x,
                y,
                width,
                height,
                fill,
            } => Some((x, y, width, height, fill)),
            DrawOp::Clear => None,
        })
    }

    /// Every clear and fill ever issued, across frames
    pub fn draw_calls(&self) -> u64 {
        self.draw_calls
    }

    /// Number of frames started (clears issued)
    pub fn frames(&self) -> u64 {
        self.clears
    }

    /// Render the current frame as a standalone SVG document
    pub fn to_svg(&self) -> String {
        let mut svg = String::new();
        let mut defs = String::new();
        let mut body = String::new();
        let mut gradients = 0usize;

        for (x, y, width, height, fill) in self.rects() {
            let paint = match fill {
                Fill::Solid(color) => color.to_css(),
                Fill::VerticalGradient { top, bottom } => {
                    let id = format!("g{}", gradients);
                    gradients += 1;
                    let _ = write!(
                        defs,
                        r#"<linearGradient id="{id}" x1="0" y1="0" x2="0" y2="1"><stop offset="0" stop-color="{}"/><stop offset="1" stop-color="{}"/></linearGradient>"#,
                        top.to_css(),
                        bottom.to_css(),
                    );
                    format!("url(#{})", id)
                }
            };
            let _ = write!(
                body,
                r#"<rect x="{x:.2}" y="{y:.2}" width="{width:.2}" height="{height:.2}" fill="{paint}"/>"#,
            );
        }

        let _ = write!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            w = self.width,
            h = self.height,
        );
        if !defs.is_empty() {
            let _ = write!(svg, "<defs>{}</defs>", defs);
        }
        svg.push_str(&body);
        svg.push_str("</svg>");
        svg
    }
}

impl Canvas for DisplayList {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.ops.clear();
    }

    fn clear(&mut self) {
        self.ops.clear();
        self.ops.push(DrawOp::Clear);
        self.draw_calls += 1;
        self.clears += 1;
    }

    fn fill_rect(&mut self, x: f64, y: f64, width: f64, height: f64, fill: Fill) {
        self.ops.push(DrawOp::Rect {
            x,
            y,
            width,
            height,
            fill,
        });
        self.draw_calls += 1;
    }
}
