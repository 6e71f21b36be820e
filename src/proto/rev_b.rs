/*
 *  proto/rev_b.rs
 *
 *  Vitrine - put it on glass
 *  (c) 2020-26 Stuart Hunter
 *
 *  Revision B wire format: 10-byte command-framed packets, HELLO
 *  identification with sub-revisions, additive-checksummed big-endian
 *  pixel data, full-frame updates only
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

use log::{debug, warn};

use crate::canvas::{Region, Rgb};

use super::capability::{CapabilityModel, Orientation, PixelOrder};
use super::error::ProtoError;
use super::session::{Framing, Wire};
use super::transport::Transport;
use super::wire::pack_pixels;

const CMD_HELLO: u8 = 0xCA;
const CMD_SET_ORIENTATION: u8 = 0xCB;
const CMD_DISPLAY_BITMAP: u8 = 0xCC;
const CMD_SET_LIGHTING: u8 = 0xCD;
const CMD_SET_BRIGHTNESS: u8 = 0xCE;

const HELLO_SIGNATURE: [u8; 5] = *b"HELLO";
const PACKET_LEN: usize = 10;

/// Sub-revisions reported in the HELLO answer. They share the wire format
/// but differ in brightness resolution and backplate LED presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubRevision {
    /// Brightness on/off only.
    A01,
    /// "Flagship": on/off brightness, RGB LED.
    A02,
    /// 0-255 brightness.
    A11,
    /// "Flagship": 0-255 brightness, RGB LED.
    A12,
}

impl SubRevision {
    fn from_wire(minor: u8) -> Option<Self> {
        match minor {
            0x01 => Some(SubRevision::A01),
            0x02 => Some(SubRevision::A02),
            0x11 => Some(SubRevision::A11),
            0x12 => Some(SubRevision::A12),
            _ => None,
        }
    }

    fn is_flagship(&self) -> bool {
        matches!(self, SubRevision::A02 | SubRevision::A12)
    }

    fn has_brightness_range(&self) -> bool {
        matches!(self, SubRevision::A11 | SubRevision::A12)
    }
}

/// Frame a command with up to 8 payload bytes: the command byte brackets
/// the packet on both ends.
fn packet(cmd: u8, payload: &[u8]) -> Vec<u8> {
    debug_assert!(payload.len() <= 8);
    let mut buf = vec![0u8; PACKET_LEN];
    buf[0] = cmd;
    buf[1..1 + payload.len()].copy_from_slice(payload);
    buf[9] = cmd;
    buf
}

pub(crate) struct RevB {
    sub_revision: SubRevision,
}

impl RevB {
    pub(crate) fn new() -> Self {
        // Refined by the HELLO answer during the handshake.
        Self {
            sub_revision: SubRevision::A01,
        }
    }
}

impl Framing for RevB {
    /// HELLO exchange: the panel echoes the signature and appends its
    /// sub-revision, which refines the session capabilities.
    fn handshake(
        &mut self,
        io: &mut dyn Transport,
        caps: &mut CapabilityModel,
    ) -> Result<(), ProtoError> {
        io.discard_input()?;
        io.write_all(&packet(CMD_HELLO, &HELLO_SIGNATURE))
            .map_err(|e| ProtoError::HandshakeFailed(format!("hello write failed: {e}")))?;

        let mut response = [0u8; PACKET_LEN];
        io.read_exact(&mut response)
            .map_err(|e| ProtoError::HandshakeFailed(format!("no hello answer: {e}")))?;

        if response[0] != CMD_HELLO || response[9] != CMD_HELLO {
            return Err(ProtoError::HandshakeFailed("bad framing".into()));
        }
        if response[1..6] != HELLO_SIGNATURE {
            return Err(ProtoError::HandshakeFailed("signature mismatch".into()));
        }
        if response[6] != 0x0A {
            return Err(ProtoError::HandshakeFailed(format!(
                "unknown hardware family 0x{:02X}",
                response[6]
            )));
        }
        match SubRevision::from_wire(response[7]) {
            Some(sub) => {
                debug!("HW sub-revision: {:?}", sub);
                self.sub_revision = sub;
            }
            None => {
                // Unknown minor is tolerated; assume the base feature set.
                warn!("unknown sub-revision 0x{:02X}, assuming A01", response[7]);
                self.sub_revision = SubRevision::A01;
            }
        }
        caps.led = self.sub_revision.is_flagship();
        Ok(())
    }

    fn frame_write(
        &self,
        region: Region,
        pixels: &[u16],
        orientation: Orientation,
        _caps: &CapabilityModel,
    ) -> Vec<Wire> {
        let (x0, y0) = (region.x, region.y);
        let (x1, y1) = (region.x + region.w - 1, region.y + region.h - 1);
        let header = packet(
            CMD_DISPLAY_BITMAP,
            &[
                (x0 >> 8) as u8,
                (x0 & 255) as u8,
                (y0 >> 8) as u8,
                (y0 & 255) as u8,
                (x1 >> 8) as u8,
                (x1 & 255) as u8,
                (y1 >> 8) as u8,
                (y1 & 255) as u8,
            ],
        );

        // The panel only rotates between portrait and landscape itself;
        // the reverse orientations are software-managed. Reversing the
        // row-major buffer is a 180-degree rotation.
        let payload = if orientation.is_reverse() {
            let flipped: Vec<u16> = pixels.iter().rev().copied().collect();
            pack_pixels(&flipped, PixelOrder::BigEndian)
        } else {
            pack_pixels(pixels, PixelOrder::BigEndian)
        };

        vec![Wire::Command(header), Wire::Payload(payload)]
    }

    fn set_brightness(&self, percent: u8) -> Vec<Wire> {
        let level = if self.sub_revision.has_brightness_range() {
            ((percent as u16 * 255) / 100) as u8
        } else {
            // 1 turns the backlight off, 0 full brightness.
            if percent == 0 { 1 } else { 0 }
        };
        vec![Wire::Command(packet(CMD_SET_BRIGHTNESS, &[level]))]
    }

    fn set_led(&self, color: Rgb) -> Vec<Wire> {
        vec![Wire::Command(packet(
            CMD_SET_LIGHTING,
            &[color.r, color.g, color.b],
        ))]
    }

    fn set_orientation(&self, orientation: Orientation, _caps: &CapabilityModel) -> Vec<Wire> {
        let value = if orientation.is_portrait() { 0u8 } else { 1u8 };
        vec![Wire::Command(packet(CMD_SET_ORIENTATION, &[value]))]
    }

    fn power(&self, _on: bool) -> Vec<Wire> {
        Vec::new()
    }

    fn reset(&self) -> Option<Wire> {
        // No reset command on this revision; recovery relies on the
        // HELLO re-handshake alone.
        None
    }
}

// ---------- tests ----------
#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::capability::Revision;
    use crate::proto::transport::MemoryTransport;

    fn hello_answer(minor: u8) -> Vec<u8> {
        let mut buf = packet(CMD_HELLO, &HELLO_SIGNATURE);
        buf[6] = 0x0A;
        buf[7] = minor;
        buf
    }

    #[test]
    fn handshake_accepts_flagship_and_enables_led() {
        let (mut io, handle) = MemoryTransport::new();
        handle.push_response(&hello_answer(0x12));

        let mut caps = CapabilityModel::for_revision(Revision::B).clone();
        let mut framing = RevB::new();
        framing.handshake(&mut io, &mut caps).unwrap();

        assert!(caps.led);
        assert!(framing.sub_revision.has_brightness_range());
        // The hello packet itself is command-framed on both ends.
        let hello = &handle.writes()[0];
        assert_eq!(hello.len(), PACKET_LEN);
        assert_eq!(hello[0], CMD_HELLO);
        assert_eq!(hello[9], CMD_HELLO);
        assert_eq!(&hello[1..6], b"HELLO");
    }

    #[test]
    fn handshake_rejects_bad_signature() {
        let (mut io, handle) = MemoryTransport::new();
        let mut bad = hello_answer(0x01);
        bad[2] = b'X';
        handle.push_response(&bad);

        let mut caps = CapabilityModel::for_revision(Revision::B).clone();
        let err = RevB::new().handshake(&mut io, &mut caps).unwrap_err();
        assert!(matches!(err, ProtoError::HandshakeFailed(_)));
    }

    #[test]
    fn handshake_times_out_without_answer() {
        let (mut io, _handle) = MemoryTransport::new();
        let mut caps = CapabilityModel::for_revision(Revision::B).clone();
        let err = RevB::new().handshake(&mut io, &mut caps).unwrap_err();
        assert!(matches!(err, ProtoError::HandshakeFailed(_)));
    }

    #[test]
    fn on_off_brightness_maps_to_flag() {
        let framing = RevB::new(); // A01: no range
        let Wire::Command(off) = &framing.set_brightness(0)[0] else {
            panic!()
        };
        let Wire::Command(on) = &framing.set_brightness(70)[0] else {
            panic!()
        };
        assert_eq!(off[1], 1);
        assert_eq!(on[1], 0);
    }

    #[test]
    fn reverse_orientation_flips_payload() {
        let framing = RevB::new();
        let caps = CapabilityModel::for_revision(Revision::B);
        let pixels = [0x0001u16, 0x0002, 0x0003, 0x0004];
        let wires = framing.frame_write(
            Region::new(0, 0, 2, 2),
            &pixels,
            Orientation::ReversePortrait,
            caps,
        );
        let Wire::Payload(bytes) = &wires[1] else {
            panic!()
        };
        // Big-endian, reversed order: 4,3,2,1
        assert_eq!(bytes, &vec![0, 4, 0, 3, 0, 2, 0, 1]);
    }
}
