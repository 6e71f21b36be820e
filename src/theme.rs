/*
 *  theme.rs
 *
 *  Vitrine - put it on glass
 *  (c) 2020-26 Stuart Hunter
 *
 *  Immutable theme data model and load-time validation
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

use embedded_graphics::geometry::{Point, Size};
use embedded_graphics::primitives::Rectangle;
use thiserror::Error;

use crate::canvas::Rgb;
use crate::proto::capability::{CapabilityModel, Orientation};
use crate::widget::{RawImage, Widget, WidgetKind};

/// Theme problems are fatal at load time and never surface mid-run.
#[derive(Debug, Error)]
pub enum ThemeError {
    #[error("widget '{0}' extends outside the {1}x{2} canvas")]
    OutOfBounds(String, u16, u16),
    #[error("widget '{0}': min must be strictly below max")]
    DegenerateRange(String),
    #[error("widget '{0}': gauge radius must be positive")]
    ZeroRadius(String),
    #[error("widget '{0}': gauge needs a non-empty sweep")]
    EmptySweep(String),
    #[error("widget '{0}': {1} separators leave no room for segments")]
    StepsDontFit(String, u16),
    #[error("widget '{0}': graph history must hold at least 2 samples")]
    ShortHistory(String),
    #[error("widget '{0}': refresh interval must be non-zero")]
    ZeroInterval(String),
    #[error("widget '{0}' renders a stat but is bound to none")]
    MissingStatKey(String),
    #[error("theme size {0}x{1} does not match the panel's {2}x{3}")]
    SizeMismatch(u16, u16, u16, u16),
    #[error("orientation {0:?} is not supported by this panel revision")]
    BadOrientation(Orientation),
    #[error("wallpaper is {0}x{1}, expected the full {2}x{3} canvas")]
    WallpaperSize(u16, u16, u16, u16),
    #[error("widget '{0}' wants the wallpaper but the theme has none")]
    NoWallpaper(String),
}

/// Display-level theme settings, applied once at engine start.
#[derive(Debug, Clone)]
pub struct DisplaySettings {
    pub width: u16,
    pub height: u16,
    pub orientation: Orientation,
    /// Percent, 0-100.
    pub brightness: u8,
    /// Backplate LED color, for panels that have one.
    pub led_color: Option<Rgb>,
    /// Full-canvas background image; widgets may crop from it.
    pub wallpaper: Option<RawImage>,
    /// Fill used where no wallpaper is present.
    pub background: Rgb,
}

/// Ordered collection of widgets plus display settings. Built by the theme
/// loader before the engine starts; immutable afterwards (a theme change is
/// an engine restart, not a mutation).
#[derive(Debug, Clone)]
pub struct Theme {
    pub display: DisplaySettings,
    pub widgets: Vec<Widget>,
}

impl Theme {
    /// Validate everything that must never fail at render time: geometry
    /// within bounds, usable ranges, panel fit. Called by the engine before
    /// the first frame.
    pub fn validate(&self, caps: &CapabilityModel) -> Result<(), ThemeError> {
        let d = &self.display;

        if !caps.orientations.contains(&d.orientation) {
            return Err(ThemeError::BadOrientation(d.orientation));
        }

        let (panel_w, panel_h) = caps.resolution(d.orientation);
        if (d.width, d.height) != (panel_w, panel_h) {
            return Err(ThemeError::SizeMismatch(d.width, d.height, panel_w, panel_h));
        }

        if let Some(wp) = &d.wallpaper {
            if (wp.width, wp.height) != (d.width, d.height) {
                return Err(ThemeError::WallpaperSize(
                    wp.width, wp.height, d.width, d.height,
                ));
            }
        }

        let canvas = Rectangle::new(
            Point::zero(),
            Size::new(d.width as u32, d.height as u32),
        );

        for widget in &self.widgets {
            let bbox = widget.bbox();
            if bbox.intersection(&canvas) != bbox {
                return Err(ThemeError::OutOfBounds(
                    widget.label.clone(),
                    d.width,
                    d.height,
                ));
            }
            if widget.interval.is_zero() {
                return Err(ThemeError::ZeroInterval(widget.label.clone()));
            }
            self.validate_kind(widget)?;
        }
        Ok(())
    }

    fn validate_kind(&self, widget: &Widget) -> Result<(), ThemeError> {
        let label = || widget.label.clone();
        let needs_stat = !matches!(widget.kind, WidgetKind::StaticImage(_));
        if needs_stat && widget.stat_key.is_none() {
            return Err(ThemeError::MissingStatKey(label()));
        }

        match &widget.kind {
            WidgetKind::RadialGauge(g) => {
                if g.radius == 0 {
                    return Err(ThemeError::ZeroRadius(label()));
                }
                if g.min >= g.max {
                    return Err(ThemeError::DegenerateRange(label()));
                }
                let span = (g.end_deg - g.start_deg).abs();
                if span <= 0.0 {
                    return Err(ThemeError::EmptySweep(label()));
                }
                if g.step_count > 1 {
                    let gaps = (g.step_count - 1) as f32 * g.step_sep;
                    if gaps >= span {
                        return Err(ThemeError::StepsDontFit(label(), g.step_count));
                    }
                }
            }
            WidgetKind::LinearBar(b) => {
                if b.min >= b.max {
                    return Err(ThemeError::DegenerateRange(label()));
                }
            }
            WidgetKind::LineGraph(g) => {
                if g.history < 2 {
                    return Err(ThemeError::ShortHistory(label()));
                }
                if !g.autoscale && g.min >= g.max {
                    return Err(ThemeError::DegenerateRange(label()));
                }
            }
            _ => {}
        }

        if uses_wallpaper(widget) && self.display.wallpaper.is_none() {
            return Err(ThemeError::NoWallpaper(label()));
        }
        Ok(())
    }
}

fn uses_wallpaper(widget: &Widget) -> bool {
    use crate::widget::Background::Wallpaper;
    match &widget.kind {
        WidgetKind::Text(t) => t.style.background == Wallpaper,
        WidgetKind::LinearBar(b) => b.background == Wallpaper,
        WidgetKind::RadialGauge(g) => g.background == Wallpaper,
        WidgetKind::LineGraph(g) => g.background == Wallpaper,
        WidgetKind::StaticImage(_) => false,
    }
}
