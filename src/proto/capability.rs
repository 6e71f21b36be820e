/*
 *  proto/capability.rs
 *
 *  Vitrine - put it on glass
 *  (c) 2020-26 Stuart Hunter
 *
 *  Static per-hardware-revision protocol capabilities and limits
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

use serde::{Deserialize, Serialize};

/// Known hardware revisions, each with its own wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Revision {
    /// Legacy 3.5" panel: bit-packed coordinate headers, no checksum,
    /// sub-rectangle writes.
    A,
    /// 3.5" panel with command-framed 10-byte packets, HELLO handshake and
    /// sub-revisions; full-frame only.
    B,
    /// 5" panel: variable-length commands with CRC32-protected chunks and
    /// sub-rectangle writes.
    C,
}

/// Panel orientations. Values match the wire encoding shared by the
/// revisions that take the orientation as a raw byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Orientation {
    Portrait = 0,
    ReversePortrait = 1,
    Landscape = 2,
    ReverseLandscape = 3,
}

impl Orientation {
    pub fn is_portrait(&self) -> bool {
        matches!(self, Orientation::Portrait | Orientation::ReversePortrait)
    }

    pub fn is_reverse(&self) -> bool {
        matches!(
            self,
            Orientation::ReversePortrait | Orientation::ReverseLandscape
        )
    }
}

/// Integrity scheme applied to each payload chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumKind {
    None,
    /// Sum of all chunk bytes, modulo 256, appended as one byte.
    Additive,
    /// CRC32 (IEEE) of the chunk, appended little-endian.
    Crc32,
}

impl ChecksumKind {
    /// Bytes the checksum adds to each chunk on the wire.
    pub fn overhead(&self) -> usize {
        match self {
            ChecksumKind::None => 0,
            ChecksumKind::Additive => 1,
            ChecksumKind::Crc32 => 4,
        }
    }
}

/// Byte order of RGB565 pixel data on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelOrder {
    LittleEndian,
    BigEndian,
}

/// What a given hardware revision supports. One instance per revision,
/// looked up at connect time; a handshake may refine a copy (sub-revisions)
/// but the table entries themselves never change.
#[derive(Debug, Clone)]
pub struct CapabilityModel {
    pub revision: Revision,
    /// Native (portrait) resolution.
    pub native_width: u16,
    pub native_height: u16,
    pub orientations: &'static [Orientation],
    /// Largest single serial write the firmware accepts, checksum included.
    pub max_payload: usize,
    pub checksum: ChecksumKind,
    pub partial_update: bool,
    pub led: bool,
    pub power_control: bool,
    pub pixel_order: PixelOrder,
}

const ALL_ORIENTATIONS: &[Orientation] = &[
    Orientation::Portrait,
    Orientation::ReversePortrait,
    Orientation::Landscape,
    Orientation::ReverseLandscape,
];

static REV_A: CapabilityModel = CapabilityModel {
    revision: Revision::A,
    native_width: 320,
    native_height: 480,
    orientations: ALL_ORIENTATIONS,
    // The firmware drops bytes on long bursts; the stock driver feeds it
    // eight rows at a time.
    max_payload: 320 * 8,
    checksum: ChecksumKind::None,
    partial_update: true,
    led: false,
    power_control: true,
    pixel_order: PixelOrder::LittleEndian,
};

static REV_B: CapabilityModel = CapabilityModel {
    revision: Revision::B,
    native_width: 320,
    native_height: 480,
    orientations: ALL_ORIENTATIONS,
    max_payload: 1024,
    checksum: ChecksumKind::Additive,
    partial_update: false,
    // Only the "flagship" sub-revision has the backplate LED; the HELLO
    // response decides, see rev_b.
    led: false,
    power_control: false,
    pixel_order: PixelOrder::BigEndian,
};

static REV_C: CapabilityModel = CapabilityModel {
    revision: Revision::C,
    native_width: 480,
    native_height: 800,
    orientations: ALL_ORIENTATIONS,
    max_payload: 4096,
    checksum: ChecksumKind::Crc32,
    partial_update: true,
    led: false,
    power_control: true,
    pixel_order: PixelOrder::BigEndian,
};

impl CapabilityModel {
    pub fn for_revision(revision: Revision) -> &'static CapabilityModel {
        match revision {
            Revision::A => &REV_A,
            Revision::B => &REV_B,
            Revision::C => &REV_C,
        }
    }

    /// Effective resolution in the given orientation.
    pub fn resolution(&self, orientation: Orientation) -> (u16, u16) {
        if orientation.is_portrait() {
            (self.native_width, self.native_height)
        } else {
            (self.native_height, self.native_width)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_stable() {
        let caps = CapabilityModel::for_revision(Revision::B);
        assert_eq!(caps.revision, Revision::B);
        assert_eq!(caps.checksum, ChecksumKind::Additive);
        assert!(!caps.partial_update);
    }

    #[test]
    fn landscape_swaps_resolution() {
        let caps = CapabilityModel::for_revision(Revision::C);
        assert_eq!(caps.resolution(Orientation::Portrait), (480, 800));
        assert_eq!(caps.resolution(Orientation::ReverseLandscape), (800, 480));
    }
}
