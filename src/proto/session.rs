/*
 *  proto/session.rs
 *
 *  Vitrine - put it on glass
 *  (c) 2020-26 Stuart Hunter
 *
 *  Per-revision protocol session: connection state machine, bounded write
 *  retries, chunking and checksum application
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

use log::{debug, info, warn};

use crate::canvas::{Region, Rgb};

use super::capability::{CapabilityModel, Orientation, Revision};
use super::error::ProtoError;
use super::transport::Transport;
use super::wire::chunk_payload;
use super::{rev_a::RevA, rev_b::RevB, rev_c::RevC};

/// Write attempts per unit before the session enters error recovery.
/// Two consecutive timeouts on the same payload trip recovery.
const WRITE_ATTEMPTS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Handshaking,
    Ready,
    Sending,
    ErrorRecovery,
}

/// One element of a command plan produced by a revision's framing.
pub(crate) enum Wire {
    /// Framed command bytes, written as a single unit.
    Command(Vec<u8>),
    /// Bulk payload; the session splits it into max-payload chunks and
    /// seals each with the capability's checksum.
    Payload(Vec<u8>),
}

/// Per-revision wire format. Implementations are pure byte-plan builders;
/// all state (connection, retries, chunking) lives in [`Session`], so no
/// revision carries shared mutable base state.
pub(crate) trait Framing: Send {
    /// Identification handshake. May refine the session's capability copy
    /// (sub-revisions). Runs with a bounded transport timeout.
    fn handshake(
        &mut self,
        io: &mut dyn Transport,
        caps: &mut CapabilityModel,
    ) -> Result<(), ProtoError>;

    /// Plan a frame write for `region` (in current-orientation
    /// coordinates) carrying `pixels` row-major RGB565.
    fn frame_write(
        &self,
        region: Region,
        pixels: &[u16],
        orientation: Orientation,
        caps: &CapabilityModel,
    ) -> Vec<Wire>;

    fn set_brightness(&self, percent: u8) -> Vec<Wire>;
    fn set_led(&self, color: Rgb) -> Vec<Wire>;
    fn set_orientation(&self, orientation: Orientation, caps: &CapabilityModel) -> Vec<Wire>;
    fn power(&self, on: bool) -> Vec<Wire>;

    /// Reset/reinit command, when the revision has one.
    fn reset(&self) -> Option<Wire>;

    /// Whether to drop unread input after a frame write (panels that ack
    /// every bitmap without us tracking the acks).
    fn discard_after_frame(&self) -> bool {
        false
    }
}

/// Abstract device operations offered to the transmitter. One
/// implementation per hardware revision, selected once at connect time.
pub trait ProtocolSession: Send {
    fn capabilities(&self) -> &CapabilityModel;
    fn state(&self) -> ConnectionState;
    fn orientation(&self) -> Orientation;

    /// Last brightness accepted by the panel.
    fn brightness(&self) -> u8;

    /// Last LED color accepted by the panel, if one was ever set.
    fn led_color(&self) -> Option<Rgb>;

    /// Write one sub-rectangle. `pixels` is row-major RGB565 matching the
    /// region size. Fails with `UnsupportedOperation` on panels without
    /// partial update.
    fn send_frame(&mut self, region: Region, pixels: &[u16]) -> Result<(), ProtoError>;

    /// Replace the whole display surface.
    fn send_full_frame(&mut self, pixels: &[u16]) -> Result<(), ProtoError>;

    /// Brightness in percent, 0-100.
    fn set_brightness(&mut self, percent: u8) -> Result<(), ProtoError>;

    /// Backplate LED color; `UnsupportedOperation` when absent.
    fn set_led(&mut self, color: Rgb) -> Result<(), ProtoError>;

    fn set_orientation(&mut self, orientation: Orientation) -> Result<(), ProtoError>;

    /// Panel power; `UnsupportedOperation` when the revision has no such
    /// command (callers may fall back to brightness 0).
    fn power(&mut self, on: bool) -> Result<(), ProtoError>;

    /// Best-effort reinitialization; returns the session to `Ready` on
    /// success.
    fn reset(&mut self) -> Result<(), ProtoError>;

    fn close(&mut self);
}

/// Open a session over an established transport. The handshake runs here;
/// a malformed or absent identification response surfaces
/// `HandshakeFailed` with the session left `Disconnected` (no retry at
/// this layer).
pub fn connect(
    revision: Revision,
    io: Box<dyn Transport>,
) -> Result<Box<dyn ProtocolSession>, ProtoError> {
    let caps = CapabilityModel::for_revision(revision).clone();
    let session: Box<dyn ProtocolSession> = match revision {
        Revision::A => Box::new(Session::establish(RevA::new(), io, caps)?),
        Revision::B => Box::new(Session::establish(RevB::new(), io, caps)?),
        Revision::C => Box::new(Session::establish(RevC::new(), io, caps)?),
    };
    Ok(session)
}

/// Shared session machinery, generic over the revision's wire format.
pub(crate) struct Session<F: Framing> {
    framing: F,
    io: Box<dyn Transport>,
    caps: CapabilityModel,
    state: ConnectionState,
    orientation: Orientation,
    brightness: u8,
    led: Option<Rgb>,
}

impl<F: Framing> Session<F> {
    pub(crate) fn establish(
        framing: F,
        io: Box<dyn Transport>,
        caps: CapabilityModel,
    ) -> Result<Self, ProtoError> {
        debug!("handshaking with revision {:?} panel", caps.revision);
        let mut session = Self {
            framing,
            io,
            caps,
            state: ConnectionState::Handshaking,
            orientation: Orientation::Portrait,
            brightness: 0,
            led: None,
        };
        match session
            .framing
            .handshake(session.io.as_mut(), &mut session.caps)
        {
            Ok(()) => {
                info!("revision {:?} panel ready", session.caps.revision);
                session.state = ConnectionState::Ready;
                Ok(session)
            }
            Err(e) => {
                session.state = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    /// Write a plan, honoring command order. Commands are strictly
    /// sequential: each unit's write resolves (ack or timeout) before the
    /// next begins, because the firmware executes in arrival order.
    fn submit(&mut self, wires: Vec<Wire>) -> Result<(), ProtoError> {
        if self.state != ConnectionState::Ready {
            return Err(ProtoError::NotConnected);
        }
        self.state = ConnectionState::Sending;
        for wire in wires {
            match wire {
                Wire::Command(bytes) => self.write_unit(&bytes)?,
                Wire::Payload(payload) => {
                    for chunk in chunk_payload(&payload, self.caps.max_payload, self.caps.checksum)
                    {
                        self.write_unit(&chunk)?;
                    }
                }
            }
        }
        self.state = ConnectionState::Ready;
        Ok(())
    }

    /// One bounded-retry write. Exceeding the bound moves the session to
    /// `ErrorRecovery`; a successful reset returns it to `Ready` (the
    /// failed operation still errors), a failed reset disconnects.
    fn write_unit(&mut self, bytes: &[u8]) -> Result<(), ProtoError> {
        for attempt in 1..=WRITE_ATTEMPTS {
            match self.io.write_all(bytes) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(
                        "write of {} bytes failed (attempt {}/{}): {}",
                        bytes.len(),
                        attempt,
                        WRITE_ATTEMPTS,
                        e
                    );
                }
            }
        }

        self.state = ConnectionState::ErrorRecovery;
        if self.recover() {
            info!("panel recovered after reset");
            self.state = ConnectionState::Ready;
            Err(ProtoError::Transport(super::error::TransportError::Timeout))
        } else {
            warn!("panel reset failed, dropping connection");
            self.state = ConnectionState::Disconnected;
            Err(ProtoError::ConnectionLost)
        }
    }

    /// Single reset attempt: flush stale input, issue the revision's reset
    /// command if it has one, then redo the identification handshake.
    fn recover(&mut self) -> bool {
        if self.io.discard_input().is_err() {
            return false;
        }
        if let Some(Wire::Command(bytes)) = self.framing.reset() {
            if self.io.write_all(&bytes).is_err() {
                return false;
            }
        }
        self.framing
            .handshake(self.io.as_mut(), &mut self.caps)
            .is_ok()
    }

    fn frame_region(&mut self, region: Region, pixels: &[u16]) -> Result<(), ProtoError> {
        debug_assert_eq!(region.area() as usize, pixels.len());
        let plan = self
            .framing
            .frame_write(region, pixels, self.orientation, &self.caps);
        self.submit(plan)?;
        if self.framing.discard_after_frame() {
            self.io.discard_input()?;
        }
        Ok(())
    }
}

impl<F: Framing> ProtocolSession for Session<F> {
    fn capabilities(&self) -> &CapabilityModel {
        &self.caps
    }

    fn state(&self) -> ConnectionState {
        self.state
    }

    fn orientation(&self) -> Orientation {
        self.orientation
    }

    fn brightness(&self) -> u8 {
        self.brightness
    }

    fn led_color(&self) -> Option<Rgb> {
        self.led
    }

    fn send_frame(&mut self, region: Region, pixels: &[u16]) -> Result<(), ProtoError> {
        if !self.caps.partial_update {
            return Err(ProtoError::UnsupportedOperation);
        }
        self.frame_region(region, pixels)
    }

    fn send_full_frame(&mut self, pixels: &[u16]) -> Result<(), ProtoError> {
        let (w, h) = self.caps.resolution(self.orientation);
        self.frame_region(Region::new(0, 0, w, h), pixels)
    }

    fn set_brightness(&mut self, percent: u8) -> Result<(), ProtoError> {
        let percent = percent.min(100);
        let plan = self.framing.set_brightness(percent);
        self.submit(plan)?;
        self.brightness = percent;
        Ok(())
    }

    fn set_led(&mut self, color: Rgb) -> Result<(), ProtoError> {
        if !self.caps.led {
            return Err(ProtoError::UnsupportedOperation);
        }
        let plan = self.framing.set_led(color);
        self.submit(plan)?;
        self.led = Some(color);
        Ok(())
    }

    fn set_orientation(&mut self, orientation: Orientation) -> Result<(), ProtoError> {
        if !self.caps.orientations.contains(&orientation) {
            return Err(ProtoError::UnsupportedOperation);
        }
        let plan = self.framing.set_orientation(orientation, &self.caps);
        self.submit(plan)?;
        self.orientation = orientation;
        Ok(())
    }

    fn power(&mut self, on: bool) -> Result<(), ProtoError> {
        if !self.caps.power_control {
            return Err(ProtoError::UnsupportedOperation);
        }
        let plan = self.framing.power(on);
        self.submit(plan)
    }

    fn reset(&mut self) -> Result<(), ProtoError> {
        self.state = ConnectionState::ErrorRecovery;
        if self.recover() {
            self.state = ConnectionState::Ready;
            Ok(())
        } else {
            self.state = ConnectionState::Disconnected;
            Err(ProtoError::ConnectionLost)
        }
    }

    fn close(&mut self) {
        let _ = self.io.discard_input();
        self.state = ConnectionState::Disconnected;
        debug!("session closed");
    }
}

// ---------- tests ----------
#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::capability::ChecksumKind;
    use crate::proto::transport::MemoryTransport;

    /// Minimal framing: one-byte opcodes, no handshake traffic.
    struct TestFraming;

    impl Framing for TestFraming {
        fn handshake(
            &mut self,
            _io: &mut dyn Transport,
            _caps: &mut CapabilityModel,
        ) -> Result<(), ProtoError> {
            Ok(())
        }

        fn frame_write(
            &self,
            _region: Region,
            pixels: &[u16],
            _orientation: Orientation,
            _caps: &CapabilityModel,
        ) -> Vec<Wire> {
            vec![
                Wire::Command(vec![0xAA]),
                Wire::Payload(pixels.iter().flat_map(|p| p.to_be_bytes()).collect()),
            ]
        }

        fn set_brightness(&self, percent: u8) -> Vec<Wire> {
            vec![Wire::Command(vec![0xBB, percent])]
        }

        fn set_led(&self, color: Rgb) -> Vec<Wire> {
            vec![Wire::Command(vec![0xCC, color.r, color.g, color.b])]
        }

        fn set_orientation(&self, o: Orientation, _caps: &CapabilityModel) -> Vec<Wire> {
            vec![Wire::Command(vec![0xDD, o as u8])]
        }

        fn power(&self, on: bool) -> Vec<Wire> {
            vec![Wire::Command(vec![0xEE, on as u8])]
        }

        fn reset(&self) -> Option<Wire> {
            Some(Wire::Command(vec![0xFF]))
        }
    }

    fn test_caps() -> CapabilityModel {
        let mut caps = CapabilityModel::for_revision(Revision::A).clone();
        caps.max_payload = 8;
        caps.checksum = ChecksumKind::Additive;
        caps
    }

    #[test]
    fn payloads_are_chunked_and_sealed() {
        let (io, handle) = MemoryTransport::new();
        let mut session = Session::establish(TestFraming, Box::new(io), test_caps()).unwrap();

        let pixels = [0x0102u16; 8]; // 16 bytes -> 3 chunks of <=7 data bytes
        session
            .send_frame(Region::new(0, 0, 4, 2), &pixels)
            .unwrap();

        let writes = handle.writes();
        assert_eq!(writes[0], vec![0xAA]);
        assert_eq!(writes.len(), 4);
        for chunk in &writes[1..] {
            assert!(chunk.len() <= 8);
            let (data, sum) = chunk.split_at(chunk.len() - 1);
            assert_eq!(sum[0], crate::proto::wire::additive_checksum(data));
        }
    }

    #[test]
    fn two_timeouts_enter_recovery_then_ready() {
        let (io, handle) = MemoryTransport::new();
        let mut session = Session::establish(TestFraming, Box::new(io), test_caps()).unwrap();

        // Both attempts of the brightness write fail; the reset write and
        // re-handshake then succeed.
        handle.fail_next_writes(WRITE_ATTEMPTS);
        let err = session.set_brightness(50).unwrap_err();
        assert!(matches!(err, ProtoError::Transport(_)));
        assert_eq!(session.state(), ConnectionState::Ready);

        // The session keeps working afterwards.
        session.set_brightness(50).unwrap();
        assert_eq!(handle.writes().last().unwrap(), &vec![0xBB, 50]);
    }

    #[test]
    fn failed_reset_surfaces_connection_lost() {
        let (io, handle) = MemoryTransport::new();
        let mut session = Session::establish(TestFraming, Box::new(io), test_caps()).unwrap();

        // Two write attempts fail, then the reset command write fails too.
        handle.fail_next_writes(WRITE_ATTEMPTS + 1);
        let err = session.set_brightness(10).unwrap_err();
        assert!(matches!(err, ProtoError::ConnectionLost));
        assert_eq!(session.state(), ConnectionState::Disconnected);

        // Further operations refuse cleanly.
        assert!(matches!(
            session.set_brightness(10),
            Err(ProtoError::NotConnected)
        ));
    }

    #[test]
    fn unsupported_led_is_surfaced_immediately() {
        let (io, handle) = MemoryTransport::new();
        let mut caps = test_caps();
        caps.led = false;
        let mut session = Session::establish(TestFraming, Box::new(io), caps).unwrap();
        assert!(matches!(
            session.set_led(Rgb::WHITE),
            Err(ProtoError::UnsupportedOperation)
        ));
        assert!(handle.writes().is_empty());
    }
}
