/*
 *  proto/rev_a.rs
 *
 *  Vitrine - put it on glass
 *  (c) 2020-26 Stuart Hunter
 *
 *  Revision A wire format: 6-byte bit-packed coordinate headers with a
 *  trailing command byte, unchecksummed little-endian pixel data
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

use crate::canvas::{Region, Rgb};

use super::capability::{CapabilityModel, Orientation, PixelOrder};
use super::error::ProtoError;
use super::session::{Framing, Wire};
use super::transport::Transport;
use super::wire::pack_pixels;

#[derive(Debug, Clone, Copy)]
#[repr(u8)]
enum Command {
    Reset = 101,
    ScreenOff = 108,
    ScreenOn = 109,
    SetBrightness = 110,
    SetOrientation = 121,
    DisplayBitmap = 197,
}

/// Pack a command and two coordinate pairs into the revision's 6-byte
/// header. Coordinates are 10 bits each, packed big-endian across the
/// first five bytes, command last.
fn command(cmd: Command, x: u16, y: u16, ex: u16, ey: u16) -> Vec<u8> {
    vec![
        (x >> 2) as u8,
        (((x & 3) << 6) as u8) | ((y >> 4) as u8),
        (((y & 15) << 4) as u8) | ((ex >> 6) as u8),
        (((ex & 63) << 2) as u8) | ((ey >> 8) as u8),
        (ey & 255) as u8,
        cmd as u8,
    ]
}

/// Legacy 3.5" panel. Identifies itself through its USB descriptor alone;
/// the serial side has no hello, so the handshake phase completes without
/// traffic.
pub(crate) struct RevA;

impl RevA {
    pub(crate) fn new() -> Self {
        RevA
    }
}

impl Framing for RevA {
    fn handshake(
        &mut self,
        io: &mut dyn Transport,
        _caps: &mut CapabilityModel,
    ) -> Result<(), ProtoError> {
        // Nothing to exchange; just drop whatever the panel buffered
        // since the last session.
        io.discard_input()?;
        Ok(())
    }

    fn frame_write(
        &self,
        region: Region,
        pixels: &[u16],
        _orientation: Orientation,
        _caps: &CapabilityModel,
    ) -> Vec<Wire> {
        let header = command(
            Command::DisplayBitmap,
            region.x,
            region.y,
            region.x + region.w - 1,
            region.y + region.h - 1,
        );
        vec![
            Wire::Command(header),
            Wire::Payload(pack_pixels(pixels, PixelOrder::LittleEndian)),
        ]
    }

    fn set_brightness(&self, percent: u8) -> Vec<Wire> {
        // Panel scale is inverted: 0 brightest, 255 darkest.
        let level = 255 - ((percent as u16 * 255) / 100) as u8;
        vec![Wire::Command(command(
            Command::SetBrightness,
            level as u16,
            0,
            0,
            0,
        ))]
    }

    fn set_led(&self, _color: Rgb) -> Vec<Wire> {
        Vec::new()
    }

    fn set_orientation(&self, orientation: Orientation, caps: &CapabilityModel) -> Vec<Wire> {
        let (width, height) = caps.resolution(orientation);
        // Same packed header, followed by mode and the effective
        // resolution, zero-padded to 16 bytes.
        let mut buf = command(Command::SetOrientation, 0, 0, 0, 0);
        buf.push(orientation as u8 + 100);
        buf.push((width >> 8) as u8);
        buf.push((width & 255) as u8);
        buf.push((height >> 8) as u8);
        buf.push((height & 255) as u8);
        buf.resize(16, 0);
        vec![Wire::Command(buf)]
    }

    fn power(&self, on: bool) -> Vec<Wire> {
        let cmd = if on {
            Command::ScreenOn
        } else {
            Command::ScreenOff
        };
        vec![Wire::Command(command(cmd, 0, 0, 0, 0))]
    }

    fn reset(&self) -> Option<Wire> {
        Some(Wire::Command(command(Command::Reset, 0, 0, 0, 0)))
    }
}

// ---------- tests ----------
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_bit_packing_matches_reference() {
        // DISPLAY_BITMAP over the region (10, 20)-(99, 199).
        let bytes = command(Command::DisplayBitmap, 10, 20, 99, 199);
        assert_eq!(
            bytes,
            vec![
                10 >> 2,
                ((10 & 3) << 6) as u8 + (20 >> 4) as u8,
                ((20 & 15) << 4) as u8 + (99u16 >> 6) as u8,
                ((99 & 63) << 2) as u8 + (199u16 >> 8) as u8,
                (199 & 255) as u8,
                197,
            ]
        );
    }

    #[test]
    fn brightness_is_inverted() {
        let wires = RevA.set_brightness(100);
        let Wire::Command(bytes) = &wires[0] else {
            panic!("expected command")
        };
        // 100% -> level 0 (brightest), packed into the x field.
        assert_eq!(bytes[0], 0);
        assert_eq!(bytes[5], 110);

        let wires = RevA.set_brightness(0);
        let Wire::Command(bytes) = &wires[0] else {
            panic!("expected command")
        };
        assert_eq!(bytes[0], 255 >> 2);
    }

    #[test]
    fn orientation_carries_resolution() {
        let caps = CapabilityModel::for_revision(super::super::capability::Revision::A);
        let wires = RevA.set_orientation(Orientation::Landscape, caps);
        let Wire::Command(bytes) = &wires[0] else {
            panic!("expected command")
        };
        assert_eq!(bytes.len(), 16);
        assert_eq!(bytes[5], 121);
        assert_eq!(bytes[6], Orientation::Landscape as u8 + 100);
        // Landscape swaps to 480x320.
        assert_eq!(((bytes[7] as u16) << 8) | bytes[8] as u16, 480);
        assert_eq!(((bytes[9] as u16) << 8) | bytes[10] as u16, 320);
    }
}
