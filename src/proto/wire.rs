/*
 *  proto/wire.rs
 *
 *  Vitrine - put it on glass
 *  (c) 2020-26 Stuart Hunter
 *
 *  Pixel packing, checksums and payload chunking shared by all revisions
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

use super::capability::{ChecksumKind, PixelOrder};

/// Serialize RGB565 words in the byte order a revision expects.
pub fn pack_pixels(pixels: &[u16], order: PixelOrder) -> Vec<u8> {
    let mut out = Vec::with_capacity(pixels.len() * 2);
    match order {
        PixelOrder::LittleEndian => {
            for &p in pixels {
                out.extend_from_slice(&p.to_le_bytes());
            }
        }
        PixelOrder::BigEndian => {
            for &p in pixels {
                out.extend_from_slice(&p.to_be_bytes());
            }
        }
    }
    out
}

/// Sum of all bytes, modulo 256.
pub fn additive_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Append the configured checksum to a chunk.
pub fn seal_chunk(mut chunk: Vec<u8>, kind: ChecksumKind) -> Vec<u8> {
    match kind {
        ChecksumKind::None => {}
        ChecksumKind::Additive => chunk.push(additive_checksum(&chunk)),
        ChecksumKind::Crc32 => {
            let crc = crc32fast::hash(&chunk);
            chunk.extend_from_slice(&crc.to_le_bytes());
        }
    }
    chunk
}

/// Split a payload into sequential sub-writes, each individually sealed.
///
/// `max_payload` bounds the on-wire size of every chunk, so the data share
/// shrinks by the checksum overhead. Every chunk except the last is full.
pub fn chunk_payload(payload: &[u8], max_payload: usize, kind: ChecksumKind) -> Vec<Vec<u8>> {
    let data_per_chunk = max_payload.saturating_sub(kind.overhead()).max(1);
    payload
        .chunks(data_per_chunk)
        .map(|c| seal_chunk(c.to_vec(), kind))
        .collect()
}

// ---------- tests ----------
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_packing_orders() {
        let px = [0x1234u16, 0xABCD];
        assert_eq!(
            pack_pixels(&px, PixelOrder::LittleEndian),
            vec![0x34, 0x12, 0xCD, 0xAB]
        );
        assert_eq!(
            pack_pixels(&px, PixelOrder::BigEndian),
            vec![0x12, 0x34, 0xAB, 0xCD]
        );
    }

    #[test]
    fn additive_wraps() {
        assert_eq!(additive_checksum(&[0xFF, 0x02]), 0x01);
        assert_eq!(additive_checksum(&[]), 0);
    }

    #[test]
    fn chunking_respects_wire_limit() {
        let payload = vec![0u8; 100];
        let chunks = chunk_payload(&payload, 32, ChecksumKind::Crc32);
        // 28 data bytes per chunk -> 4 chunks of 28/28/28/16 data
        assert_eq!(chunks.len(), 4);
        for chunk in &chunks {
            assert!(chunk.len() <= 32);
            let (data, crc) = chunk.split_at(chunk.len() - 4);
            assert_eq!(crc, &crc32fast::hash(data).to_le_bytes()[..]);
        }
        let total: usize = chunks.iter().map(|c| c.len() - 4).sum();
        assert_eq!(total, 100);
    }

    #[test]
    fn unchecksummed_chunks_are_raw_slices() {
        let payload: Vec<u8> = (0..10).collect();
        let chunks = chunk_payload(&payload, 4, ChecksumKind::None);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], vec![0, 1, 2, 3]);
        assert_eq!(chunks[2], vec![8, 9]);
    }
}
