/*
 *  engine.rs
 *
 *  Vitrine - put it on glass
 *  (c) 2020-26 Stuart Hunter
 *
 *  Engine control surface: wires pollers, the compositor loop and the
 *  transmitter together and owns their lifecycle
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

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{info, warn};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant as TokioInstant};

use crate::canvas::Rgb;
use crate::compositor::Compositor;
use crate::proto::{
    self, auto_detect, CapabilityModel, Orientation, ProtoError, Revision, SerialTransport,
    Transport,
};
use crate::scheduler::Scheduler;
use crate::stats::{self, StatCache, StatSource};
use crate::theme::{Theme, ThemeError};
use crate::transmitter::{FramePacket, Reconnector, Transmitter, TxMsg};

/// Granularity at which blocking pollers re-check the stop signal.
const POLL_SLICE: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("theme validation failed: {0}")]
    Theme(#[from] ThemeError),
    #[error(transparent)]
    Proto(#[from] ProtoError),
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Per-write serial timeout.
    pub write_timeout: Duration,
    /// Minimum spacing between reconnect attempts after a loss.
    pub reconnect_interval: Duration,
    /// Frame packets in flight between compositor and transmitter.
    pub frame_channel_depth: usize,
    /// How long `stop` waits for pollers before abandoning them.
    pub poller_grace: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            write_timeout: Duration::from_millis(500),
            reconnect_interval: Duration::from_secs(2),
            frame_channel_depth: 4,
            poller_grace: Duration::from_millis(500),
        }
    }
}

/// Running engine. Dropping it abandons the tasks; call [`stop`] for an
/// orderly shutdown that powers the panel down and closes the port.
///
/// [`stop`]: EngineHandle::stop
pub struct EngineHandle {
    tx: mpsc::Sender<TxMsg>,
    stop_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    transmitter: JoinHandle<()>,
    led_was_set: bool,
    cfg: EngineConfig,
}

impl EngineHandle {
    pub async fn set_brightness(&self, percent: u8) {
        let _ = self.tx.send(TxMsg::Brightness(percent)).await;
    }

    pub async fn set_led(&self, color: Rgb) {
        let _ = self.tx.send(TxMsg::Led(color)).await;
    }

    pub async fn set_orientation(&self, orientation: Orientation) {
        let _ = self.tx.send(TxMsg::Orientation(orientation)).await;
    }

    /// Orderly shutdown: stop composition, give pollers a short grace
    /// period, darken the panel, then close the session.
    pub async fn stop(self) {
        info!("engine stopping");
        let _ = self.stop_tx.send(true);
        for task in self.tasks {
            // Pollers are signaled, not awaited beyond the grace period.
            let _ = tokio::time::timeout(self.cfg.poller_grace, task).await;
        }
        if self.led_was_set {
            let _ = self.tx.send(TxMsg::Led(Rgb::BLACK)).await;
        }
        let _ = self.tx.send(TxMsg::Power(false)).await;
        let _ = self.tx.send(TxMsg::Shutdown).await;
        drop(self.tx);
        let _ = self.transmitter.await;
        info!("engine stopped");
    }
}

/// Open the configured serial port (or auto-detect it) and start the
/// engine on it, with a reconnector that reopens the same port.
pub async fn start_serial(
    theme: Theme,
    revision: Revision,
    port: &str,
    baud: u32,
    sources: Vec<Box<dyn StatSource>>,
    cfg: EngineConfig,
) -> Result<EngineHandle, EngineError> {
    let path = if port.eq_ignore_ascii_case("auto") {
        auto_detect(revision)?
    } else {
        port.to_string()
    };
    let transport = SerialTransport::open(&path, baud, cfg.write_timeout)?;
    let reconnect: Reconnector = {
        let path = path.clone();
        let timeout = cfg.write_timeout;
        Box::new(move || {
            let io = SerialTransport::open(&path, baud, timeout)?;
            proto::connect(revision, Box::new(io))
        })
    };
    start(theme, revision, Box::new(transport), sources, cfg, reconnect).await
}

/// Start the engine over an established transport. Surfaces theme
/// validation errors and the initial `HandshakeFailed` to the caller;
/// reconnect policy after a mid-run loss comes from `reconnect`.
pub async fn start(
    theme: Theme,
    revision: Revision,
    transport: Box<dyn Transport>,
    sources: Vec<Box<dyn StatSource>>,
    cfg: EngineConfig,
    reconnect: Reconnector,
) -> Result<EngineHandle, EngineError> {
    let caps = CapabilityModel::for_revision(revision);
    theme.validate(caps)?;

    let mut session = proto::connect(revision, transport)?;
    apply_display_settings(session.as_mut(), &theme)?;

    let theme = Arc::new(theme);
    let cache = StatCache::new();
    let (tx, rx) = mpsc::channel::<TxMsg>(cfg.frame_channel_depth);
    let (stop_tx, stop_rx) = watch::channel(false);

    let mut tasks = Vec::new();
    for source in sources {
        tasks.push(spawn_poller(source, cache.clone(), stop_rx.clone()));
    }
    tasks.push(spawn_render_loop(
        theme.clone(),
        cache,
        tx.clone(),
        stop_rx,
    ));

    let retry = cfg.reconnect_interval;
    let transmitter = tokio::task::spawn_blocking(move || {
        Transmitter::new(session, reconnect, retry).run(rx)
    });

    info!(
        "engine running: {} widgets on a {:?} panel",
        theme.widgets.len(),
        revision
    );
    Ok(EngineHandle {
        tx,
        stop_tx,
        tasks,
        transmitter,
        led_was_set: theme.display.led_color.is_some(),
        cfg,
    })
}

/// Bring the panel to the theme's declared state before the first frame:
/// wake it, set orientation, brightness and LED color.
fn apply_display_settings(
    session: &mut dyn proto::ProtocolSession,
    theme: &Theme,
) -> Result<(), ProtoError> {
    let d = &theme.display;
    match session.power(true) {
        Ok(()) | Err(ProtoError::UnsupportedOperation) => {}
        Err(e) => return Err(e),
    }
    session.set_orientation(d.orientation)?;
    session.set_brightness(d.brightness)?;
    if let Some(color) = d.led_color {
        match session.set_led(color) {
            Ok(()) => {}
            Err(ProtoError::UnsupportedOperation) => {
                warn!("theme sets an LED color but this panel has no LED")
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// One blocking execution context per stat source; it may stall on slow
/// sensors without ever holding up composition.
fn spawn_poller(
    mut source: Box<dyn StatSource>,
    cache: StatCache,
    stop_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        let name = source.name().to_string();
        let interval = source.interval();
        info!("poller '{}' started, every {:?}", name, interval);
        'run: loop {
            if *stop_rx.borrow() {
                break;
            }
            stats::poll_into(source.as_mut(), &cache);
            let mut remaining = interval;
            while !remaining.is_zero() {
                if *stop_rx.borrow() {
                    break 'run;
                }
                let slice = remaining.min(POLL_SLICE);
                std::thread::sleep(slice);
                remaining -= slice;
            }
        }
        info!("poller '{}' stopped", name);
    })
}

/// The scheduler+compositor execution context: sleeps until the earliest
/// deadline, renders the due set from a cache snapshot, ships a packet.
fn spawn_render_loop(
    theme: Arc<Theme>,
    cache: StatCache,
    tx: mpsc::Sender<TxMsg>,
    mut stop_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut compositor = Compositor::new(theme.clone());
        let mut scheduler = Scheduler::new(&theme, Instant::now());
        loop {
            let wake = scheduler
                .next_wakeup()
                .unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));
            tokio::select! {
                _ = stop_rx.changed() => break,
                _ = sleep_until(TokioInstant::from_std(wake)) => {
                    let due = scheduler.tick(Instant::now());
                    if due.is_empty() {
                        continue;
                    }
                    let snapshot = cache.snapshot();
                    let regions = compositor.render_due(&due, &snapshot);
                    if regions.is_empty() {
                        continue;
                    }
                    let packet = FramePacket {
                        frame: compositor.snapshot(),
                        regions,
                    };
                    if tx.send(TxMsg::Frame(packet)).await.is_err() {
                        break;
                    }
                }
            }
        }
        info!("render loop stopped");
    })
}
