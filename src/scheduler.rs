/*
 *  scheduler.rs
 *
 *  Vitrine - put it on glass
 *  (c) 2020-26 Stuart Hunter
 *
 *  Per-widget refresh timing with drift-free, burst-free catch-up
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

use std::time::{Duration, Instant};

use crate::theme::Theme;
use crate::widget::WidgetId;

/// One timing slot per widget. Owned and mutated only by the scheduler.
#[derive(Debug)]
struct ScheduleEntry {
    id: WidgetId,
    interval: Duration,
    next_due: Instant,
}

/// Drives per-widget refresh timing. Entries are kept in theme declaration
/// order so the due set comes out in stable rendering order.
#[derive(Debug)]
pub struct Scheduler {
    entries: Vec<ScheduleEntry>,
}

impl Scheduler {
    /// All widgets come due immediately at `start`, producing the initial
    /// full render.
    pub fn new(theme: &Theme, start: Instant) -> Self {
        let entries = theme
            .widgets
            .iter()
            .enumerate()
            .map(|(i, w)| ScheduleEntry {
                id: WidgetId(i),
                interval: w.interval,
                next_due: start,
            })
            .collect();
        Self { entries }
    }

    /// Collect every widget due at `now`, advancing each returned entry by
    /// whole intervals until it is in the future again. Advancing from the
    /// previous deadline (not from `now`) keeps long-run cadence drift
    /// free; the whole-interval catch-up means a stall produces each
    /// overdue widget once, not once per missed interval.
    pub fn tick(&mut self, now: Instant) -> Vec<WidgetId> {
        let mut due = Vec::new();
        for entry in &mut self.entries {
            if entry.next_due <= now {
                due.push(entry.id);
                while entry.next_due <= now {
                    entry.next_due += entry.interval;
                }
            }
        }
        due
    }

    /// Earliest upcoming deadline; what the run loop sleeps until.
    pub fn next_wakeup(&self) -> Option<Instant> {
        self.entries.iter().map(|e| e.next_due).min()
    }
}
