/*
 *  proto/rev_c.rs
 *
 *  Vitrine - put it on glass
 *  (c) 2020-26 Stuart Hunter
 *
 *  Revision C wire format: magic-prefixed variable-length commands, CRC32
 *  protected identification and pixel chunks, sub-rectangle writes
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

use log::debug;

use crate::canvas::{Region, Rgb};

use super::capability::{CapabilityModel, Orientation, PixelOrder};
use super::error::ProtoError;
use super::session::{Framing, Wire};
use super::transport::Transport;
use super::wire::pack_pixels;

/// Every command starts with its opcode followed by this magic pair.
const MAGIC: [u8; 2] = [0xEF, 0x69];

const OP_HELLO: u8 = 0x01;
const OP_SET_BRIGHTNESS: u8 = 0x7B;
const OP_SET_ORIENTATION: u8 = 0x7D;
const OP_POWER: u8 = 0x83;
const OP_RESET: u8 = 0x84;
const OP_BITMAP: u8 = 0xC8;

/// Identification answer: opcode, 'V' 'C', version major/minor, then a
/// CRC32 over those five bytes.
const HELLO_ANSWER_LEN: usize = 9;

/// [op, magic, len_be16, payload...]
fn command(op: u8, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(5 + payload.len());
    buf.push(op);
    buf.extend_from_slice(&MAGIC);
    buf.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// 5" panel. All bulk data is CRC32-checked per chunk by the session; the
/// panel acks every bitmap, which we drain rather than track.
pub(crate) struct RevC;

impl RevC {
    pub(crate) fn new() -> Self {
        RevC
    }
}

impl Framing for RevC {
    fn handshake(
        &mut self,
        io: &mut dyn Transport,
        _caps: &mut CapabilityModel,
    ) -> Result<(), ProtoError> {
        io.discard_input()?;
        io.write_all(&command(OP_HELLO, &[]))
            .map_err(|e| ProtoError::HandshakeFailed(format!("hello write failed: {e}")))?;

        let mut answer = [0u8; HELLO_ANSWER_LEN];
        io.read_exact(&mut answer)
            .map_err(|e| ProtoError::HandshakeFailed(format!("no hello answer: {e}")))?;

        if answer[0] != OP_HELLO || &answer[1..3] != b"VC" {
            return Err(ProtoError::HandshakeFailed("signature mismatch".into()));
        }
        let crc = u32::from_le_bytes([answer[5], answer[6], answer[7], answer[8]]);
        if crc != crc32fast::hash(&answer[..5]) {
            return Err(ProtoError::HandshakeFailed("bad answer checksum".into()));
        }
        debug!("panel firmware {}.{}", answer[3], answer[4]);
        Ok(())
    }

    fn frame_write(
        &self,
        region: Region,
        pixels: &[u16],
        _orientation: Orientation,
        _caps: &CapabilityModel,
    ) -> Vec<Wire> {
        let mut header = Vec::with_capacity(8);
        header.extend_from_slice(&region.x.to_be_bytes());
        header.extend_from_slice(&region.y.to_be_bytes());
        header.extend_from_slice(&region.w.to_be_bytes());
        header.extend_from_slice(&region.h.to_be_bytes());
        vec![
            Wire::Command(command(OP_BITMAP, &header)),
            Wire::Payload(pack_pixels(pixels, PixelOrder::BigEndian)),
        ]
    }

    fn set_brightness(&self, percent: u8) -> Vec<Wire> {
        vec![Wire::Command(command(OP_SET_BRIGHTNESS, &[percent]))]
    }

    fn set_led(&self, _color: Rgb) -> Vec<Wire> {
        Vec::new()
    }

    fn set_orientation(&self, orientation: Orientation, _caps: &CapabilityModel) -> Vec<Wire> {
        vec![Wire::Command(command(
            OP_SET_ORIENTATION,
            &[orientation as u8],
        ))]
    }

    fn power(&self, on: bool) -> Vec<Wire> {
        // 0x00 wakes the panel, 0x01 puts it to sleep.
        vec![Wire::Command(command(OP_POWER, &[if on { 0x00 } else { 0x01 }]))]
    }

    fn reset(&self) -> Option<Wire> {
        Some(Wire::Command(command(OP_RESET, &[])))
    }

    fn discard_after_frame(&self) -> bool {
        true
    }
}
