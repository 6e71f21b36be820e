/*
 *  lib.rs
 *
 *  Vitrine - put it on glass
 *  (c) 2020-26 Stuart Hunter
 *
 *  Library surface so the binary and the integration tests share the
 *  engine
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
//! Drives USB-serial smart screen panels from a declarative theme: stat
//! pollers feed a cache, a multi-rate scheduler picks due widgets, the
//! compositor redraws them into an RGB565 canvas, and the transmitter
//! ships the changed regions through a per-revision protocol session.

pub mod canvas;
pub mod compositor;
pub mod config;
pub mod engine;
pub mod proto;
pub mod scheduler;
pub mod stats;
pub mod theme;
pub mod transmitter;
pub mod widget;

pub use canvas::{Canvas, FrameSnapshot, Region, Rgb};
pub use engine::{start, start_serial, EngineConfig, EngineError, EngineHandle};
pub use theme::{DisplaySettings, Theme, ThemeError};
pub use widget::{Widget, WidgetId, WidgetKind};
