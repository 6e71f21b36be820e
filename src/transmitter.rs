/*
 *  transmitter.rs
 *
 *  Vitrine - put it on glass
 *  (c) 2020-26 Stuart Hunter
 *
 *  Feeds dirty regions to the protocol session in device order, with
 *  full-frame fallback and reconnect resync
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

use log::{debug, error, info, warn};
use tokio::sync::mpsc;

use crate::canvas::{FrameSnapshot, Region, Rgb};
use crate::proto::{Orientation, ProtoError, ProtocolSession};

/// One compositor tick's output: the full canvas state plus the regions
/// that changed. Carrying the snapshot keeps the canvas single-owner and
/// lets the transmitter do a full-frame resync at any time.
#[derive(Debug, Clone)]
pub struct FramePacket {
    pub frame: FrameSnapshot,
    pub regions: Vec<Region>,
}

/// Messages consumed by the transmitter. A single ordered lane keeps
/// device commands serialized with frame traffic.
pub enum TxMsg {
    Frame(FramePacket),
    Brightness(u8),
    Led(Rgb),
    Orientation(Orientation),
    Power(bool),
    Shutdown,
}

/// Factory the engine supplies for re-establishing a session after a
/// connection loss; the reconnect policy (cadence) lives here, outside the
/// protocol layer.
pub type Reconnector =
    Box<dyn FnMut() -> Result<Box<dyn ProtocolSession>, ProtoError> + Send>;

/// Merge overlapping or adjacent rectangles from one tick to cut command
/// count. Purely an optimization: every input rectangle is independently
/// valid to transmit. First-touched order is preserved.
pub fn merge_regions(regions: Vec<Region>) -> Vec<Region> {
    let mut merged = regions;
    loop {
        let mut changed = false;
        let mut i = 0;
        while i < merged.len() {
            let mut j = i + 1;
            while j < merged.len() {
                if merged[i].touches(&merged[j]) {
                    merged[i] = merged[i].union(&merged[j]);
                    merged.remove(j);
                    changed = true;
                } else {
                    j += 1;
                }
            }
            i += 1;
        }
        if !changed {
            return merged;
        }
    }
}

/// Push one packet to the device. Partial-capable panels get the merged
/// dirty regions in produced order; everything else (or a forced resync)
/// gets exactly one full-frame write.
pub fn flush_packet(
    session: &mut dyn ProtocolSession,
    packet: &FramePacket,
    force_full: bool,
) -> Result<(), ProtoError> {
    if packet.regions.is_empty() && !force_full {
        return Ok(());
    }
    if force_full || !session.capabilities().partial_update {
        session.send_full_frame(&packet.frame.pixels)
    } else {
        for region in merge_regions(packet.regions.clone()) {
            let pixels = packet.frame.extract(region);
            session.send_frame(region, &pixels)?;
        }
        Ok(())
    }
}

/// Owns the protocol session and the serial channel for its lifetime.
/// Runs on its own blocking execution context; serial I/O is strictly
/// ordered, so nothing else ever touches the session.
pub struct Transmitter {
    session: Option<Box<dyn ProtocolSession>>,
    reconnect: Reconnector,
    retry_interval: Duration,
    last_attempt: Option<Instant>,
    force_full: bool,
}

impl Transmitter {
    pub fn new(
        session: Box<dyn ProtocolSession>,
        reconnect: Reconnector,
        retry_interval: Duration,
    ) -> Self {
        Self {
            session: Some(session),
            reconnect,
            retry_interval,
            // The very first flush replaces whatever the panel was
            // showing before we attached.
            force_full: true,
            last_attempt: None,
        }
    }

    /// Blocking consume loop. Ends on `Shutdown` or when every sender is
    /// gone; the session is closed on the way out.
    pub fn run(mut self, mut rx: mpsc::Receiver<TxMsg>) {
        while let Some(msg) = rx.blocking_recv() {
            match msg {
                TxMsg::Shutdown => break,
                TxMsg::Frame(packet) => self.handle_frame(&packet),
                TxMsg::Brightness(percent) => {
                    self.device_op("set brightness", |s| s.set_brightness(percent));
                }
                TxMsg::Led(color) => {
                    self.device_op("set LED color", |s| s.set_led(color));
                }
                TxMsg::Orientation(o) => {
                    self.device_op("set orientation", |s| s.set_orientation(o));
                }
                TxMsg::Power(on) => self.handle_power(on),
            }
        }
        if let Some(mut session) = self.session.take() {
            session.close();
        }
        info!("transmitter stopped");
    }

    fn handle_frame(&mut self, packet: &FramePacket) {
        if self.session.is_none() {
            self.try_reconnect();
        }
        let Some(session) = self.session.as_mut() else {
            // Still unreachable. Ticks keep coming and the canvas keeps
            // accumulating upstream; the next packet after reconnection
            // carries everything we dropped here.
            return;
        };
        match flush_packet(session.as_mut(), packet, self.force_full) {
            Ok(()) => self.force_full = false,
            Err(ProtoError::ConnectionLost) => self.on_connection_lost(),
            Err(e) => {
                // Session recovered but the frame (partially) missed the
                // panel; resync with a full frame next tick.
                warn!("frame flush failed: {e}");
                self.force_full = true;
            }
        }
    }

    fn handle_power(&mut self, on: bool) {
        let Some(session) = self.session.as_mut() else {
            debug!("panel offline, dropping power command");
            return;
        };
        match session.power(on) {
            Ok(()) => {}
            Err(ProtoError::UnsupportedOperation) => {
                // Panels without power control idle with the backlight
                // dark instead.
                if on {
                    let level = session.brightness();
                    let _ = session.set_brightness(level);
                } else {
                    let _ = session.set_brightness(0);
                }
            }
            Err(ProtoError::ConnectionLost) => self.on_connection_lost(),
            Err(e) => warn!("power command failed: {e}"),
        }
    }

    fn device_op<F>(&mut self, what: &str, op: F)
    where
        F: FnOnce(&mut dyn ProtocolSession) -> Result<(), ProtoError>,
    {
        let Some(session) = self.session.as_mut() else {
            debug!("panel offline, dropping request to {what}");
            return;
        };
        match op(session.as_mut()) {
            Ok(()) => {}
            Err(ProtoError::UnsupportedOperation) => {
                warn!("panel cannot {what}");
            }
            Err(ProtoError::ConnectionLost) => self.on_connection_lost(),
            Err(e) => warn!("failed to {what}: {e}"),
        }
    }

    /// Reported once per transition, not once per failed tick.
    fn on_connection_lost(&mut self) {
        error!("panel connection lost; pausing flushes until it returns");
        if let Some(mut session) = self.session.take() {
            session.close();
        }
        self.force_full = true;
        self.last_attempt = None;
    }

    fn try_reconnect(&mut self) {
        let now = Instant::now();
        if let Some(last) = self.last_attempt {
            if now.duration_since(last) < self.retry_interval {
                return;
            }
        }
        self.last_attempt = Some(now);
        match (self.reconnect)() {
            Ok(session) => {
                info!("panel reconnected; forcing full-frame resync");
                self.session = Some(session);
                self.force_full = true;
            }
            Err(e) => debug!("reconnect attempt failed: {e}"),
        }
    }
}

// ---------- tests ----------
#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{Canvas, Rgb};
    use crate::proto::transport::{MemoryHandle, MemoryTransport};
    use crate::proto::{connect, Revision};

    const REV_B_BITMAP: u8 = 0xCC;
    const REV_A_BITMAP: u8 = 197;

    fn hello_answer_b() -> Vec<u8> {
        let mut buf = vec![0u8; 10];
        buf[0] = 0xCA;
        buf[1..6].copy_from_slice(b"HELLO");
        buf[6] = 0x0A;
        buf[7] = 0x01;
        buf[9] = 0xCA;
        buf
    }

    fn session_b() -> (Box<dyn ProtocolSession>, MemoryHandle) {
        let (io, handle) = MemoryTransport::new();
        handle.push_response(&hello_answer_b());
        let session = connect(Revision::B, Box::new(io)).unwrap();
        handle.clear_writes();
        (session, handle)
    }

    fn session_a() -> (Box<dyn ProtocolSession>, MemoryHandle) {
        let (io, handle) = MemoryTransport::new();
        let session = connect(Revision::A, Box::new(io)).unwrap();
        (session, handle)
    }

    fn packet(width: u16, height: u16, regions: Vec<Region>) -> FramePacket {
        let canvas = Canvas::new(width, height, Rgb::BLACK);
        FramePacket {
            frame: canvas.snapshot(),
            regions,
        }
    }

    fn count_headers(handle: &MemoryHandle, cmd: u8, at: usize) -> usize {
        handle
            .writes()
            .iter()
            .filter(|w| w.get(at) == Some(&cmd))
            .count()
    }

    #[test]
    fn merge_joins_adjacent_keeps_distant() {
        let merged = merge_regions(vec![
            Region::new(0, 0, 10, 10),
            Region::new(10, 0, 10, 10),
            Region::new(100, 100, 5, 5),
        ]);
        assert_eq!(
            merged,
            vec![Region::new(0, 0, 20, 10), Region::new(100, 100, 5, 5)]
        );
    }

    #[test]
    fn no_partial_support_means_one_full_write() {
        let (mut session, handle) = session_b();
        // Two widgets became due in the same tick.
        let packet = packet(
            320,
            480,
            vec![Region::new(0, 0, 10, 10), Region::new(50, 50, 10, 10)],
        );
        flush_packet(session.as_mut(), &packet, false).unwrap();

        // Exactly one DISPLAY_BITMAP header, however many payload chunks.
        assert_eq!(count_headers(&handle, REV_B_BITMAP, 0), 1);
    }

    #[test]
    fn partial_support_writes_each_merged_region() {
        let (mut session, handle) = session_a();
        let packet = packet(
            320,
            480,
            vec![Region::new(0, 0, 10, 10), Region::new(50, 50, 10, 10)],
        );
        flush_packet(session.as_mut(), &packet, false).unwrap();
        // Region headers carry the command byte at offset 5.
        assert_eq!(count_headers(&handle, REV_A_BITMAP, 5), 2);
    }

    #[test]
    fn forced_resync_overrides_partial_path() {
        let (mut session, handle) = session_a();
        let packet = packet(320, 480, vec![Region::new(0, 0, 10, 10)]);
        flush_packet(session.as_mut(), &packet, true).unwrap();
        assert_eq!(count_headers(&handle, REV_A_BITMAP, 5), 1);
        // Full frame: payload bytes add up to width*height*2.
        let payload: usize = handle
            .writes()
            .iter()
            .filter(|w| w.get(5) != Some(&REV_A_BITMAP))
            .map(|w| w.len())
            .sum();
        assert_eq!(payload, 320 * 480 * 2);
    }

    #[test]
    fn reconnect_resyncs_full_then_partials() {
        let (session, handle) = session_a();

        // The replacement session the reconnector will hand out.
        let (new_io, new_handle) = MemoryTransport::new();
        let mut replacement = Some(Box::new(new_io));
        let reconnect: Reconnector = Box::new(move || {
            let io = replacement.take().ok_or(ProtoError::NoPortFound)?;
            connect(Revision::A, io)
        });

        let mut tx = Transmitter::new(session, reconnect, Duration::ZERO);
        // Initial attach always resyncs; flush one packet to clear it.
        tx.handle_frame(&packet(320, 480, vec![Region::new(0, 0, 4, 4)]));
        assert_eq!(count_headers(&handle, REV_A_BITMAP, 5), 1);

        // Kill the link: every write times out, reset fails too.
        handle.fail_next_writes(100);
        tx.handle_frame(&packet(320, 480, vec![Region::new(0, 0, 4, 4)]));
        assert!(tx.session.is_none());

        // Next tick reconnects and must flush the full frame exactly once
        // before partial traffic resumes.
        tx.handle_frame(&packet(320, 480, vec![Region::new(0, 0, 4, 4)]));
        let full_bytes: usize = new_handle
            .writes()
            .iter()
            .filter(|w| w.get(5) != Some(&REV_A_BITMAP))
            .map(|w| w.len())
            .sum();
        assert_eq!(full_bytes, 320 * 480 * 2);

        // A subsequent small region goes out as a partial write again.
        new_handle.clear_writes();
        tx.handle_frame(&packet(320, 480, vec![Region::new(8, 8, 2, 2)]));
        let writes = new_handle.writes();
        assert_eq!(count_headers(&new_handle, REV_A_BITMAP, 5), 1);
        let payload: usize = writes
            .iter()
            .filter(|w| w.get(5) != Some(&REV_A_BITMAP))
            .map(|w| w.len())
            .sum();
        assert_eq!(payload, 2 * 2 * 2);
    }
}
