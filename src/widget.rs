/*
 *  widget.rs
 *
 *  Vitrine - put it on glass
 *  (c) 2020-26 Stuart Hunter
 *
 *  Renderable, data-bound theme elements
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use std::time::Duration;

use embedded_graphics::geometry::{Point, Size};
use embedded_graphics::mono_font::ascii::{FONT_6X10, FONT_7X13, FONT_9X15, FONT_10X20};
use embedded_graphics::mono_font::MonoFont;
use embedded_graphics::primitives::Rectangle;

use crate::canvas::Rgb;

/// Index of a widget in the theme's declaration order.
///
/// Declaration order is part of the visual contract: later widgets may
/// legitimately overlap earlier ones, and ties between due widgets are
/// broken by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WidgetId(pub usize);

/// Monospace font choices exposed to themes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontChoice {
    Small,
    Medium,
    Large,
    XLarge,
}

impl FontChoice {
    pub fn mono(&self) -> &'static MonoFont<'static> {
        match self {
            FontChoice::Small => &FONT_6X10,
            FontChoice::Medium => &FONT_7X13,
            FontChoice::Large => &FONT_9X15,
            FontChoice::XLarge => &FONT_10X20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

/// What a widget paints behind itself before drawing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Background {
    /// Flat fill in the given color.
    Solid(Rgb),
    /// Crop of the theme wallpaper matching the widget's bounding box.
    Wallpaper,
}

/// Pre-decoded RGB565 image data. Theme loading (out of scope here) is
/// responsible for decoding file formats; the engine only ever sees raw
/// big-endian RGB565 rows, ready for `ImageRaw`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImage {
    pub width: u16,
    pub height: u16,
    /// Big-endian RGB565, row-major, 2 bytes per pixel.
    pub data: Vec<u8>,
}

impl RawImage {
    /// Build a solid-color image. Used by tests and the demo theme.
    pub fn solid(width: u16, height: u16, color: Rgb) -> Self {
        use embedded_graphics::prelude::IntoStorage;
        let c: embedded_graphics::pixelcolor::Rgb565 = color.into();
        let raw = c.into_storage();
        let mut data = Vec::with_capacity(width as usize * height as usize * 2);
        for _ in 0..(width as usize * height as usize) {
            data.extend_from_slice(&raw.to_be_bytes());
        }
        Self { width, height, data }
    }
}

#[derive(Debug, Clone)]
pub struct TextStyle {
    pub font: FontChoice,
    pub color: Rgb,
    pub background: Background,
    pub align: TextAlign,
    /// Decimal places when the bound value is numeric.
    pub decimals: u8,
    pub prefix: String,
    pub suffix: String,
    /// Append the stat's unit after the value (before `suffix`).
    pub show_unit: bool,
}

#[derive(Debug, Clone)]
pub struct TextWidget {
    pub x: u16,
    pub y: u16,
    pub w: u16,
    pub h: u16,
    pub style: TextStyle,
}

#[derive(Debug, Clone)]
pub struct ImageWidget {
    pub x: u16,
    pub y: u16,
    pub image: RawImage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarDirection {
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone)]
pub struct BarWidget {
    pub x: u16,
    pub y: u16,
    pub w: u16,
    pub h: u16,
    pub min: f64,
    pub max: f64,
    pub direction: BarDirection,
    pub color: Rgb,
    pub background: Background,
    pub outline: Option<Rgb>,
}

/// Radial gauge, optionally stepped.
///
/// Angles are in degrees along the sweep direction; `end` may pass 360 to
/// encode a sweep wider than one turn from `start` (e.g. 60..420 is a full
/// circle starting at 60 degrees).
#[derive(Debug, Clone)]
pub struct GaugeWidget {
    pub cx: u16,
    pub cy: u16,
    pub radius: u16,
    pub line_width: u16,
    pub min: f64,
    pub max: f64,
    pub start_deg: f32,
    pub end_deg: f32,
    /// 1 = continuous arc; >1 = discrete segments.
    pub step_count: u16,
    /// Gap between segments, degrees.
    pub step_sep: f32,
    pub clockwise: bool,
    pub color: Rgb,
    /// Unfilled segments; None leaves them unpainted.
    pub rest_color: Option<Rgb>,
    pub background: Background,
}

#[derive(Debug, Clone)]
pub struct GraphWidget {
    pub x: u16,
    pub y: u16,
    pub w: u16,
    pub h: u16,
    /// Ring buffer depth; oldest sample is evicted first.
    pub history: usize,
    pub autoscale: bool,
    /// Fixed scale, used when autoscale is off.
    pub min: f64,
    pub max: f64,
    pub color: Rgb,
    pub background: Background,
    pub outline: Option<Rgb>,
}

#[derive(Debug, Clone)]
pub enum WidgetKind {
    Text(TextWidget),
    StaticImage(ImageWidget),
    LinearBar(BarWidget),
    RadialGauge(GaugeWidget),
    LineGraph(GraphWidget),
}

/// A single renderable, data-bound element on the canvas.
#[derive(Debug, Clone)]
pub struct Widget {
    /// Human-readable name, used in logs and validation messages.
    pub label: String,
    /// Stat cache key this widget renders; None for static elements.
    pub stat_key: Option<String>,
    pub interval: Duration,
    /// Glyph rendered when the bound value is unavailable.
    pub fallback: String,
    pub kind: WidgetKind,
}

impl Widget {
    /// Declared bounding box; doubles as the widget's dirty rectangle.
    pub fn bbox(&self) -> Rectangle {
        match &self.kind {
            WidgetKind::Text(t) => rect(t.x, t.y, t.w as u32, t.h as u32),
            WidgetKind::StaticImage(i) => {
                rect(i.x, i.y, i.image.width as u32, i.image.height as u32)
            }
            WidgetKind::LinearBar(b) => rect(b.x, b.y, b.w as u32, b.h as u32),
            WidgetKind::RadialGauge(g) => {
                let d = 2 * g.radius as u32;
                rect(
                    g.cx.saturating_sub(g.radius),
                    g.cy.saturating_sub(g.radius),
                    d,
                    d,
                )
            }
            WidgetKind::LineGraph(g) => rect(g.x, g.y, g.w as u32, g.h as u32),
        }
    }
}

fn rect(x: u16, y: u16, w: u32, h: u32) -> Rectangle {
    Rectangle::new(Point::new(x as i32, y as i32), Size::new(w, h))
}
