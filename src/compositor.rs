/*
 *  compositor.rs
 *
 *  Vitrine - put it on glass
 *  (c) 2020-26 Stuart Hunter
 *
 *  Renders due widgets into the canvas and reports the dirty regions
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

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use arrayvec::ArrayString;
use core::fmt::Write;

use embedded_graphics::image::{Image, ImageDrawableExt, ImageRaw};
use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{
    Arc as ArcShape, Polyline, PrimitiveStyle, Rectangle,
};
use embedded_text::alignment::{HorizontalAlignment, VerticalAlignment};
use embedded_text::style::TextBoxStyleBuilder;
use embedded_text::TextBox;

use crate::canvas::{Canvas, FrameSnapshot, Region};
use crate::stats::{StatSnapshot, Value};
use crate::theme::Theme;
use crate::widget::{
    Background, BarDirection, BarWidget, GaugeWidget, GraphWidget, ImageWidget, TextAlign,
    TextStyle, TextWidget, Widget, WidgetId, WidgetKind,
};

/// Relative sweep magnitude in degrees for a gauge at `value`.
///
/// Linear in the clamped value: 0 at `min`, the full |end-start| span at
/// `max`. Direction is a screen-mapping concern (the `clockwise` flag),
/// not part of the magnitude.
pub fn gauge_sweep(min: f64, max: f64, start_deg: f32, end_deg: f32, value: f64) -> f32 {
    let t = ((value - min) / (max - min)).clamp(0.0, 1.0) as f32;
    (end_deg - start_deg).abs() * t
}

/// Fill state for each of `count` segments spread over `total` degrees
/// with `sep` degrees between them. A segment is filled iff its angular
/// midpoint lies within the swept range.
pub fn segment_fill(total: f32, count: u16, sep: f32, sweep: f32) -> Vec<bool> {
    let n = count.max(1);
    let width = (total - (n - 1) as f32 * sep) / n as f32;
    (0..n)
        .map(|i| {
            let midpoint = i as f32 * (width + sep) + width / 2.0;
            midpoint <= sweep
        })
        .collect()
}

/// Per-widget temporal state: the last rendered value (for change
/// detection) and the graph history ring.
#[derive(Debug, Default)]
struct WidgetState {
    rendered: bool,
    last_value: Option<Value>,
    last_sample_at: Option<Instant>,
    history: VecDeque<f64>,
}

/// Owns the canvas; turns due widgets plus a stat snapshot into drawn
/// pixels and dirty regions. Runs on a single execution context and never
/// suspends mid-render.
pub struct Compositor {
    theme: Arc<Theme>,
    canvas: Canvas,
    states: Vec<WidgetState>,
}

impl Compositor {
    pub fn new(theme: Arc<Theme>) -> Self {
        let d = &theme.display;
        let mut canvas = Canvas::new(d.width, d.height, d.background);
        if let Some(wp) = &d.wallpaper {
            let raw = ImageRaw::<Rgb565>::new(&wp.data, wp.width as u32);
            Image::new(&raw, Point::zero()).draw(&mut canvas).ok();
        }
        // The whole surface counts as changed until the first flush.
        canvas.mark_dirty(Rectangle::new(
            Point::zero(),
            Size::new(d.width as u32, d.height as u32),
        ));
        let states = theme.widgets.iter().map(|_| WidgetState::default()).collect();
        Self {
            theme,
            canvas,
            states,
        }
    }

    pub fn snapshot(&self) -> FrameSnapshot {
        self.canvas.snapshot()
    }

    /// Render every due widget whose bound value changed, in theme
    /// declaration order, and return the dirty regions in produced order.
    ///
    /// A widget with an unchanged value is skipped entirely, so its box
    /// never shows up dirty. Graphs count a fresh sample of equal value as
    /// a change (the polyline shifts); scalar widgets compare values only.
    pub fn render_due(&mut self, due: &[WidgetId], stats: &StatSnapshot) -> Vec<Region> {
        let theme = self.theme.clone();
        for &id in due {
            let widget = &theme.widgets[id.0];
            let sample = widget.stat_key.as_deref().and_then(|k| stats.get(k));
            let value = sample.and_then(|s| s.value.clone());
            let sample_at = sample.map(|s| s.updated_at);

            let state = &mut self.states[id.0];
            let changed = if !state.rendered {
                true
            } else if matches!(widget.kind, WidgetKind::LineGraph(_)) {
                value.is_some() && sample_at != state.last_sample_at
            } else {
                value != state.last_value
            };
            if !changed {
                continue;
            }

            if let WidgetKind::LineGraph(g) = &widget.kind {
                if let Some(v) = value.as_ref().and_then(Value::as_f64) {
                    state.history.push_back(v);
                    while state.history.len() > g.history {
                        state.history.pop_front();
                    }
                }
            }

            draw_widget(&mut self.canvas, &theme, widget, &self.states[id.0], &value);

            let state = &mut self.states[id.0];
            state.rendered = true;
            state.last_value = value;
            state.last_sample_at = sample_at;
            self.canvas.mark_dirty(widget.bbox());
        }
        self.canvas.take_dirty()
    }

    #[cfg(test)]
    fn history(&self, id: WidgetId) -> &VecDeque<f64> {
        &self.states[id.0].history
    }
}

fn paint_background(canvas: &mut Canvas, theme: &Theme, bbox: Rectangle, background: Background) {
    match background {
        Background::Solid(color) => {
            bbox.into_styled(PrimitiveStyle::with_fill(color.into()))
                .draw(canvas)
                .ok();
        }
        Background::Wallpaper => {
            // Validated at theme load: wallpaper exists and spans the
            // canvas, so the crop is always in range.
            if let Some(wp) = &theme.display.wallpaper {
                let raw = ImageRaw::<Rgb565>::new(&wp.data, wp.width as u32);
                let crop = raw.sub_image(&bbox);
                Image::new(&crop, bbox.top_left).draw(canvas).ok();
            }
        }
    }
}

fn draw_widget(
    canvas: &mut Canvas,
    theme: &Theme,
    widget: &Widget,
    state: &WidgetState,
    value: &Option<Value>,
) {
    match &widget.kind {
        WidgetKind::Text(t) => draw_text(canvas, theme, t, value, &widget.fallback),
        WidgetKind::StaticImage(i) => draw_image(canvas, i),
        WidgetKind::LinearBar(b) => draw_bar(canvas, theme, b, value, &widget.fallback),
        WidgetKind::RadialGauge(g) => draw_gauge(canvas, theme, g, value, &widget.fallback),
        WidgetKind::LineGraph(g) => draw_graph(canvas, theme, g, state, value, &widget.fallback),
    }
}

/// Render a short string into a box with the style's alignment.
fn draw_boxed_text(
    canvas: &mut Canvas,
    bbox: Rectangle,
    text: &str,
    font: &'static embedded_graphics::mono_font::MonoFont<'static>,
    color: Rgb565,
    align: TextAlign,
) {
    let alignment = match align {
        TextAlign::Left => HorizontalAlignment::Left,
        TextAlign::Center => HorizontalAlignment::Center,
        TextAlign::Right => HorizontalAlignment::Right,
    };
    let character_style = MonoTextStyle::new(font, color);
    let style = TextBoxStyleBuilder::new()
        .alignment(alignment)
        .vertical_alignment(VerticalAlignment::Middle)
        .build();
    TextBox::with_textbox_style(text, bbox, character_style, style)
        .draw(canvas)
        .ok();
}

fn format_value(style: &TextStyle, value: &Value) -> ArrayString<64> {
    let mut out = ArrayString::<64>::new();
    let _ = write!(out, "{}", style.prefix);
    match value {
        Value::Number(v, unit) => {
            let _ = write!(out, "{:.*}", style.decimals as usize, v);
            if style.show_unit {
                let _ = write!(out, "{}", unit.suffix());
            }
        }
        Value::Text(s) => {
            let _ = write!(out, "{}", s);
        }
    }
    let _ = write!(out, "{}", style.suffix);
    out
}

fn draw_text(
    canvas: &mut Canvas,
    theme: &Theme,
    t: &TextWidget,
    value: &Option<Value>,
    fallback: &str,
) {
    let bbox = Rectangle::new(
        Point::new(t.x as i32, t.y as i32),
        Size::new(t.w as u32, t.h as u32),
    );
    paint_background(canvas, theme, bbox, t.style.background);

    match value {
        Some(v) => {
            let text = format_value(&t.style, v);
            draw_boxed_text(
                canvas,
                bbox,
                &text,
                t.style.font.mono(),
                t.style.color.into(),
                t.style.align,
            );
        }
        None => draw_boxed_text(
            canvas,
            bbox,
            fallback,
            t.style.font.mono(),
            t.style.color.into(),
            t.style.align,
        ),
    }
}

fn draw_image(canvas: &mut Canvas, i: &ImageWidget) {
    let raw = ImageRaw::<Rgb565>::new(&i.image.data, i.image.width as u32);
    Image::new(&raw, Point::new(i.x as i32, i.y as i32))
        .draw(canvas)
        .ok();
}

fn draw_bar(
    canvas: &mut Canvas,
    theme: &Theme,
    b: &BarWidget,
    value: &Option<Value>,
    fallback: &str,
) {
    let bbox = Rectangle::new(
        Point::new(b.x as i32, b.y as i32),
        Size::new(b.w as u32, b.h as u32),
    );
    paint_background(canvas, theme, bbox, b.background);

    let Some(v) = value.as_ref().and_then(Value::as_f64) else {
        draw_boxed_text(
            canvas,
            bbox,
            fallback,
            crate::widget::FontChoice::Small.mono(),
            b.color.into(),
            TextAlign::Center,
        );
        return;
    };

    let ratio = ((v - b.min) / (b.max - b.min)).clamp(0.0, 1.0);
    let filled = match b.direction {
        BarDirection::Horizontal => Rectangle::new(
            bbox.top_left,
            Size::new((ratio * b.w as f64).round() as u32, b.h as u32),
        ),
        BarDirection::Vertical => {
            let fh = (ratio * b.h as f64).round() as u32;
            Rectangle::new(
                Point::new(b.x as i32, b.y as i32 + (b.h as u32 - fh) as i32),
                Size::new(b.w as u32, fh),
            )
        }
    };
    filled
        .into_styled(PrimitiveStyle::with_fill(b.color.into()))
        .draw(canvas)
        .ok();

    if let Some(outline) = b.outline {
        bbox.into_styled(PrimitiveStyle::with_stroke(outline.into(), 1))
            .draw(canvas)
            .ok();
    }
}

fn draw_gauge(
    canvas: &mut Canvas,
    theme: &Theme,
    g: &GaugeWidget,
    value: &Option<Value>,
    fallback: &str,
) {
    let bbox = Rectangle::new(
        Point::new(
            g.cx.saturating_sub(g.radius) as i32,
            g.cy.saturating_sub(g.radius) as i32,
        ),
        Size::new(2 * g.radius as u32, 2 * g.radius as u32),
    );
    paint_background(canvas, theme, bbox, g.background);

    let Some(v) = value.as_ref().and_then(Value::as_f64) else {
        draw_boxed_text(
            canvas,
            bbox,
            fallback,
            crate::widget::FontChoice::Medium.mono(),
            g.color.into(),
            TextAlign::Center,
        );
        return;
    };

    let total = (g.end_deg - g.start_deg).abs();
    let sweep = gauge_sweep(g.min, g.max, g.start_deg, g.end_deg, v);
    let center = Point::new(g.cx as i32, g.cy as i32);
    // Stroke is centered on the arc path; shrink the diameter so the
    // painted ring stays inside the declared radius.
    let diameter = (2 * g.radius).saturating_sub(g.line_width) as u32;
    let dir: f32 = if g.clockwise { 1.0 } else { -1.0 };

    let mut arc_segment = |rel_start: f32, width: f32, color: Rgb565| {
        ArcShape::with_center(
            center,
            diameter,
            Angle::from_degrees(g.start_deg + dir * rel_start),
            Angle::from_degrees(dir * width),
        )
        .into_styled(PrimitiveStyle::with_stroke(color, g.line_width as u32))
        .draw(canvas)
        .ok();
    };

    if g.step_count <= 1 {
        if let Some(rest) = g.rest_color {
            arc_segment(0.0, total, rest.into());
        }
        if sweep > 0.0 {
            arc_segment(0.0, sweep, g.color.into());
        }
        return;
    }

    let width = (total - (g.step_count - 1) as f32 * g.step_sep) / g.step_count as f32;
    for (i, filled) in segment_fill(total, g.step_count, g.step_sep, sweep)
        .into_iter()
        .enumerate()
    {
        let rel_start = i as f32 * (width + g.step_sep);
        if filled {
            arc_segment(rel_start, width, g.color.into());
        } else if let Some(rest) = g.rest_color {
            arc_segment(rel_start, width, rest.into());
        }
    }
}

fn draw_graph(
    canvas: &mut Canvas,
    theme: &Theme,
    g: &GraphWidget,
    state: &WidgetState,
    value: &Option<Value>,
    fallback: &str,
) {
    let bbox = Rectangle::new(
        Point::new(g.x as i32, g.y as i32),
        Size::new(g.w as u32, g.h as u32),
    );
    paint_background(canvas, theme, bbox, g.background);

    if value.is_none() && state.history.is_empty() {
        draw_boxed_text(
            canvas,
            bbox,
            fallback,
            crate::widget::FontChoice::Small.mono(),
            g.color.into(),
            TextAlign::Center,
        );
        return;
    }

    let samples = &state.history;
    if samples.len() >= 2 {
        let (mut lo, mut hi) = if g.autoscale {
            samples
                .iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                    (lo.min(v), hi.max(v))
                })
        } else {
            (g.min, g.max)
        };
        if hi - lo < f64::EPSILON {
            // Flat history: pad the scale so the line sits mid-box.
            lo -= 0.5;
            hi += 0.5;
        }

        // Newest sample pinned to the right edge; the polyline slides
        // left until the ring is full.
        let slots = (g.history - 1) as f64;
        let first_slot = g.history - samples.len();
        let points: Vec<Point> = samples
            .iter()
            .enumerate()
            .map(|(i, &v)| {
                let slot = (first_slot + i) as f64;
                let x = g.x as f64 + slot / slots * (g.w - 1) as f64;
                let t = ((v - lo) / (hi - lo)).clamp(0.0, 1.0);
                let y = g.y as f64 + (1.0 - t) * (g.h - 1) as f64;
                Point::new(x.round() as i32, y.round() as i32)
            })
            .collect();

        Polyline::new(&points)
            .into_styled(PrimitiveStyle::with_stroke(g.color.into(), 1))
            .draw(canvas)
            .ok();
    }

    if let Some(outline) = g.outline {
        bbox.into_styled(PrimitiveStyle::with_stroke(outline.into(), 1))
            .draw(canvas)
            .ok();
    }
}

// ---------- tests ----------
#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Rgb;
    use crate::proto::Orientation;
    use crate::stats::{StatSample, Unit};
    use crate::theme::DisplaySettings;
    use crate::widget::FontChoice;
    use std::time::Duration;

    fn text_widget(label: &str, key: &str, x: u16, y: u16) -> Widget {
        Widget {
            label: label.into(),
            stat_key: Some(key.into()),
            interval: Duration::from_millis(100),
            fallback: "-".into(),
            kind: WidgetKind::Text(TextWidget {
                x,
                y,
                w: 60,
                h: 20,
                style: TextStyle {
                    font: FontChoice::Small,
                    color: Rgb::WHITE,
                    background: Background::Solid(Rgb::BLACK),
                    align: TextAlign::Left,
                    decimals: 0,
                    prefix: String::new(),
                    suffix: String::new(),
                    show_unit: false,
                },
            }),
        }
    }

    fn graph_widget(key: &str, history: usize) -> Widget {
        Widget {
            label: "graph".into(),
            stat_key: Some(key.into()),
            interval: Duration::from_millis(100),
            fallback: "-".into(),
            kind: WidgetKind::LineGraph(GraphWidget {
                x: 0,
                y: 100,
                w: 100,
                h: 40,
                history,
                autoscale: true,
                min: 0.0,
                max: 100.0,
                color: Rgb::WHITE,
                background: Background::Solid(Rgb::BLACK),
                outline: None,
            }),
        }
    }

    fn theme_of(widgets: Vec<Widget>) -> Arc<Theme> {
        Arc::new(Theme {
            display: DisplaySettings {
                width: 320,
                height: 480,
                orientation: Orientation::Portrait,
                brightness: 100,
                led_color: None,
                wallpaper: None,
                background: Rgb::BLACK,
            },
            widgets,
        })
    }

    fn snap_with(entries: &[(&str, f64)]) -> StatSnapshot {
        let mut snap = StatSnapshot::default();
        for (key, v) in entries {
            snap.insert(
                key,
                StatSample {
                    value: Some(Value::Number(*v, Unit::None)),
                    updated_at: Instant::now(),
                },
            );
        }
        snap
    }

    #[test]
    fn sweep_is_linear_and_clamped() {
        assert_eq!(gauge_sweep(0.0, 100.0, 0.0, 270.0, 0.0), 0.0);
        assert_eq!(gauge_sweep(0.0, 100.0, 0.0, 270.0, 100.0), 270.0);
        assert_eq!(gauge_sweep(0.0, 100.0, 0.0, 270.0, 50.0), 135.0);
        // Clamped outside the range.
        assert_eq!(gauge_sweep(0.0, 100.0, 0.0, 270.0, -10.0), 0.0);
        assert_eq!(gauge_sweep(0.0, 100.0, 0.0, 270.0, 400.0), 270.0);
    }

    #[test]
    fn wrapped_gauge_fills_half_the_steps() {
        // min=0 max=100 start=60 end=420 -> full turn; value 50 sweeps
        // 180 degrees and fills 10 of 20 steps.
        let sweep = gauge_sweep(0.0, 100.0, 60.0, 420.0, 50.0);
        assert_eq!(sweep, 180.0);
        assert_eq!(60.0 + sweep, 240.0);

        let fill = segment_fill(360.0, 20, 2.0, sweep);
        assert_eq!(fill.iter().filter(|&&f| f).count(), 10);
        assert!(fill[..10].iter().all(|&f| f));
        assert!(fill[10..].iter().all(|&f| !f));
    }

    #[test]
    fn segment_midpoint_rule_at_extremes() {
        let none = segment_fill(270.0, 10, 0.0, 0.0);
        assert!(none.iter().all(|&f| !f));
        let all = segment_fill(270.0, 10, 0.0, 270.0);
        assert!(all.iter().all(|&f| f));
    }

    #[test]
    fn dirty_covers_only_changed_widgets() {
        let theme = theme_of(vec![
            text_widget("a", "k1", 0, 0),
            text_widget("b", "k2", 0, 40),
        ]);
        let mut comp = Compositor::new(theme);
        let due = [WidgetId(0), WidgetId(1)];

        // First render: everything dirty (plus the initial full-surface
        // region).
        let first = comp.render_due(&due, &snap_with(&[("k1", 1.0), ("k2", 2.0)]));
        assert!(first.len() >= 2);

        // Only k1 changes; only widget a's box may be reported.
        let second = comp.render_due(&due, &snap_with(&[("k1", 9.0), ("k2", 2.0)]));
        assert_eq!(second, vec![Region::new(0, 0, 60, 20)]);

        // Nothing changes: no dirty regions at all.
        let third = comp.render_due(&due, &snap_with(&[("k1", 9.0), ("k2", 2.0)]));
        assert!(third.is_empty());
    }

    #[test]
    fn graph_ring_is_bounded_fifo() {
        let theme = theme_of(vec![graph_widget("k", 4)]);
        let mut comp = Compositor::new(theme);
        for i in 0..10 {
            comp.render_due(&[WidgetId(0)], &snap_with(&[("k", i as f64)]));
        }
        let hist: Vec<f64> = comp.history(WidgetId(0)).iter().copied().collect();
        assert_eq!(hist, vec![6.0, 7.0, 8.0, 9.0]);
    }

    #[test]
    fn graph_redraws_on_fresh_equal_sample() {
        let theme = theme_of(vec![graph_widget("k", 8)]);
        let mut comp = Compositor::new(theme);
        comp.render_due(&[WidgetId(0)], &snap_with(&[("k", 5.0)]));

        // Same value, new sample timestamp: the polyline shifts, so the
        // widget is dirty again.
        let regions = comp.render_due(&[WidgetId(0)], &snap_with(&[("k", 5.0)]));
        assert_eq!(regions, vec![Region::new(0, 100, 100, 40)]);
        assert_eq!(comp.history(WidgetId(0)).len(), 2);
    }

    #[test]
    fn unavailable_value_renders_fallback_once() {
        let theme = theme_of(vec![text_widget("a", "k1", 0, 0)]);
        let mut comp = Compositor::new(theme);

        let first = comp.render_due(&[WidgetId(0)], &StatSnapshot::default());
        assert!(!first.is_empty());
        // Still unavailable: no change, no dirty box.
        let second = comp.render_due(&[WidgetId(0)], &StatSnapshot::default());
        assert!(second.is_empty());
    }

    #[test]
    fn text_formatting_applies_prefix_unit_and_decimals() {
        let style = TextStyle {
            font: FontChoice::Small,
            color: Rgb::WHITE,
            background: Background::Solid(Rgb::BLACK),
            align: TextAlign::Left,
            decimals: 1,
            prefix: "CPU ".into(),
            suffix: String::new(),
            show_unit: true,
        };
        let s = format_value(&style, &Value::Number(42.25, Unit::Percent));
        assert_eq!(&s[..], "CPU 42.2%");
    }
}
