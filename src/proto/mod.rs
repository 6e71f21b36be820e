/*
 *  proto/mod.rs
 *
 *  Vitrine - put it on glass
 *  (c) 2020-26 Stuart Hunter
 *
 *  Display protocol abstraction layer
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

pub mod capability;
pub mod error;
pub mod session;
pub mod transport;
pub mod wire;

mod rev_a;
mod rev_b;
mod rev_c;

pub use capability::{CapabilityModel, ChecksumKind, Orientation, PixelOrder, Revision};
pub use error::{ProtoError, TransportError};
pub use session::{connect, ConnectionState, ProtocolSession};
pub use transport::{auto_detect, MemoryTransport, SerialTransport, Transport};
