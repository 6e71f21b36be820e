/*
 *  proto/error.rs
 *
 *  Vitrine - put it on glass
 *  (c) 2020-26 Stuart Hunter
 *
 *  Error taxonomy for the device protocol layer
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

use thiserror::Error;

/// Low-level transport failures. Retried a bounded number of times inside
/// the session before escalating.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("write timed out")]
    Timeout,
    #[error("serial I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        match self {
            TransportError::Timeout => true,
            TransportError::Io(e) => e.kind() == std::io::ErrorKind::TimedOut,
        }
    }
}

/// Session-level protocol errors as seen by the transmitter and engine.
#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("could not open {port}: {source}")]
    Connect {
        port: String,
        source: serialport::Error,
    },
    #[error("no matching panel found for auto-detection")]
    NoPortFound,
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),
    #[error("device connection lost")]
    ConnectionLost,
    #[error("operation not supported by this panel")]
    UnsupportedOperation,
    #[error("session is not connected")]
    NotConnected,
    #[error(transparent)]
    Transport(#[from] TransportError),
}
