/*
 *  stats.rs
 *
 *  Vitrine - put it on glass
 *	(c) 2020-26 Stuart Hunter
 *
 *	TODO: per-core CPU load keys once a theme needs them
 *
 *	This program is free software: you can redistribute it and/or modify
 *	it under the terms of the GNU General Public License as published by
 *	the Free Software Foundation, either version 3 of the License, or
 *	(at your option) any later version.
 *
 *	This program is distributed in the hope that it will be useful,
 *	but WITHOUT ANY WARRANTY; without even the implied warranty of
 *	MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *	GNU General Public License for more details.
 *
 *	See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *	Public License.
 *
 */
//! Stat sources and the cache between pollers and the compositor.
//!
//! Each source runs on its own cadence and may block on slow OS or
//! hardware queries; the compositor only ever reads the cache, so a stuck
//! sensor can never stall frame composition.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chrono::Local;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Unit attached to numeric stat values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    None,
    Percent,
    Celsius,
    Mib,
    Hours,
}

impl Unit {
    pub fn suffix(&self) -> &'static str {
        match self {
            Unit::None => "",
            Unit::Percent => "%",
            Unit::Celsius => "°C",
            Unit::Mib => " MiB",
            Unit::Hours => " h",
        }
    }
}

/// A metric value as delivered by a source.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64, Unit),
    Text(String),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(v, _) => Some(*v),
            Value::Text(_) => None,
        }
    }
}

/// Last-known value of a stat plus when it was written. An absent value
/// means the source reported the stat unavailable; that is a renderable
/// state, not an error.
#[derive(Debug, Clone)]
pub struct StatSample {
    pub value: Option<Value>,
    pub updated_at: Instant,
}

/// Shared cache between pollers (one writer per key) and the compositor
/// (snapshot reads). Lock hold times are bounded to single map operations.
#[derive(Clone, Default)]
pub struct StatCache {
    inner: Arc<RwLock<HashMap<String, StatSample>>>,
}

impl StatCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, key: &str, value: Option<Value>) {
        let sample = StatSample {
            value,
            updated_at: Instant::now(),
        };
        self.inner
            .write()
            .expect("stat cache poisoned")
            .insert(key.to_string(), sample);
    }

    /// Copy of the whole cache; what the compositor renders a tick from.
    pub fn snapshot(&self) -> StatSnapshot {
        StatSnapshot {
            map: self.inner.read().expect("stat cache poisoned").clone(),
        }
    }
}

/// Immutable view of the cache taken at the start of a compositor tick.
#[derive(Debug, Clone, Default)]
pub struct StatSnapshot {
    map: HashMap<String, StatSample>,
}

impl StatSnapshot {
    pub fn get(&self, key: &str) -> Option<&StatSample> {
        self.map.get(key)
    }

    #[cfg(test)]
    pub fn insert(&mut self, key: &str, sample: StatSample) {
        self.map.insert(key.to_string(), sample);
    }
}

/// External provider of named, periodically refreshed metric values.
///
/// `read` may block; it runs on the poller's own execution context, never
/// on the compositor's. Returning `None` for a key marks it unavailable.
pub trait StatSource: Send {
    fn name(&self) -> &str;
    fn interval(&self) -> Duration;
    fn keys(&self) -> Vec<String>;
    fn read(&mut self, key: &str) -> Option<Value>;
}

/// Poll every key of a source once into the cache.
pub fn poll_into(source: &mut dyn StatSource, cache: &StatCache) {
    for key in source.keys() {
        let value = source.read(&key);
        cache.put(&key, value);
    }
}

fn read_first_word(path: &str) -> io::Result<String> {
    let content = fs::read_to_string(path)?;
    content
        .split_whitespace()
        .next()
        .map(str::to_string)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "empty file"))
}

fn read_first_float(path: &str) -> Option<f64> {
    read_first_word(path).ok()?.parse::<f64>().ok()
}

/// Machine metrics straight from /proc and /sys.
pub struct MachineSource {
    interval: Duration,
}

impl MachineSource {
    pub const CPU_LOAD: &'static str = "cpu.load";
    pub const CPU_TEMP: &'static str = "cpu.temp";
    pub const MEM_USED_PCT: &'static str = "mem.used_pct";
    pub const MEM_AVAILABLE: &'static str = "mem.available_mib";
    pub const UPTIME: &'static str = "sys.uptime_hours";

    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// 1-minute load average as a percentage.
    fn cpu_load(&self) -> Option<Value> {
        read_first_float("/proc/loadavg").map(|v| Value::Number(100.0 * v, Unit::Percent))
    }

    /// First thermal zone, reported in millidegrees.
    fn cpu_temp(&self) -> Option<Value> {
        read_first_float("/sys/class/thermal/thermal_zone0/temp")
            .map(|v| Value::Number(v / 1000.0, Unit::Celsius))
    }

    fn uptime_hours(&self) -> Option<Value> {
        read_first_float("/proc/uptime").map(|v| Value::Number(v / 3600.0, Unit::Hours))
    }

    fn meminfo(&self) -> Option<(f64, f64)> {
        let content = fs::read_to_string("/proc/meminfo").ok()?;
        let mut total_kib = None;
        let mut avail_kib = None;
        for line in content.lines() {
            let mut parts = line.split_whitespace();
            match parts.next() {
                Some("MemTotal:") => total_kib = parts.next()?.parse::<f64>().ok(),
                Some("MemAvailable:") => avail_kib = parts.next()?.parse::<f64>().ok(),
                _ => {}
            }
            if total_kib.is_some() && avail_kib.is_some() {
                break;
            }
        }
        Some((total_kib?, avail_kib?))
    }
}

impl StatSource for MachineSource {
    fn name(&self) -> &str {
        "machine"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn keys(&self) -> Vec<String> {
        vec![
            Self::CPU_LOAD.into(),
            Self::CPU_TEMP.into(),
            Self::MEM_USED_PCT.into(),
            Self::MEM_AVAILABLE.into(),
            Self::UPTIME.into(),
        ]
    }

    fn read(&mut self, key: &str) -> Option<Value> {
        match key {
            Self::CPU_LOAD => self.cpu_load(),
            Self::CPU_TEMP => self.cpu_temp(),
            Self::UPTIME => self.uptime_hours(),
            Self::MEM_USED_PCT => self.meminfo().map(|(total, avail)| {
                Value::Number(100.0 * (total - avail) / total, Unit::Percent)
            }),
            Self::MEM_AVAILABLE => self
                .meminfo()
                .map(|(_, avail)| Value::Number(avail / 1024.0, Unit::Mib)),
            _ => None,
        }
    }
}

/// Wall-clock time and date, formatted for text widgets.
pub struct ClockSource {
    interval: Duration,
}

impl ClockSource {
    pub const TIME: &'static str = "clock.time";
    pub const DATE: &'static str = "clock.date";

    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl StatSource for ClockSource {
    fn name(&self) -> &str {
        "clock"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn keys(&self) -> Vec<String> {
        vec![Self::TIME.into(), Self::DATE.into()]
    }

    fn read(&mut self, key: &str) -> Option<Value> {
        let now = Local::now();
        match key {
            Self::TIME => Some(Value::Text(now.format("%H:%M:%S").to_string())),
            Self::DATE => Some(Value::Text(now.format("%a %d %b").to_string())),
            _ => None,
        }
    }
}

/// Random-walk stand-in for real sensors; drives demos and tests without
/// hardware.
pub struct SimulatedSource {
    interval: Duration,
    rng: StdRng,
    channels: Vec<(String, f64, f64, f64)>, // key, min, max, current
}

impl SimulatedSource {
    pub fn new(interval: Duration, seed: u64, channels: Vec<(String, f64, f64)>) -> Self {
        let channels = channels
            .into_iter()
            .map(|(key, min, max)| {
                let mid = (min + max) / 2.0;
                (key, min, max, mid)
            })
            .collect();
        Self {
            interval,
            rng: StdRng::seed_from_u64(seed),
            channels,
        }
    }
}

impl StatSource for SimulatedSource {
    fn name(&self) -> &str {
        "simulated"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn keys(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.0.clone()).collect()
    }

    fn read(&mut self, key: &str) -> Option<Value> {
        let channel = self.channels.iter_mut().find(|c| c.0 == key)?;
        let span = channel.2 - channel.1;
        let step = self.rng.random_range(-0.08..0.08) * span;
        channel.3 = (channel.3 + step).clamp(channel.1, channel.2);
        Some(Value::Number(channel.3, Unit::None))
    }
}

// ---------- tests ----------
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_snapshot_is_detached() {
        let cache = StatCache::new();
        cache.put("k", Some(Value::Number(1.0, Unit::None)));
        let snap = cache.snapshot();
        cache.put("k", Some(Value::Number(2.0, Unit::None)));

        assert_eq!(
            snap.get("k").unwrap().value,
            Some(Value::Number(1.0, Unit::None))
        );
        assert_eq!(
            cache.snapshot().get("k").unwrap().value,
            Some(Value::Number(2.0, Unit::None))
        );
    }

    #[test]
    fn unavailable_values_are_cached_as_none() {
        let cache = StatCache::new();
        cache.put("gone", None);
        let snap = cache.snapshot();
        assert!(snap.get("gone").unwrap().value.is_none());
        assert!(snap.get("never").is_none());
    }

    #[test]
    fn simulated_source_stays_in_range() {
        let mut src = SimulatedSource::new(
            Duration::from_millis(10),
            42,
            vec![("x".into(), 10.0, 20.0)],
        );
        for _ in 0..200 {
            let Some(Value::Number(v, _)) = src.read("x") else {
                panic!("expected a number")
            };
            assert!((10.0..=20.0).contains(&v));
        }
        assert!(src.read("unknown").is_none());
    }

    #[test]
    fn poll_into_writes_every_key() {
        let cache = StatCache::new();
        let mut src = SimulatedSource::new(
            Duration::from_millis(10),
            1,
            vec![("a".into(), 0.0, 1.0), ("b".into(), 0.0, 1.0)],
        );
        poll_into(&mut src, &cache);
        let snap = cache.snapshot();
        assert!(snap.get("a").is_some());
        assert!(snap.get("b").is_some());
    }
}
