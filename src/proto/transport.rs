/*
 *  proto/transport.rs
 *
 *  Vitrine - put it on glass
 *  (c) 2020-26 Stuart Hunter
 *
 *  Byte-oriented duplex channel to the panel: USB serial, plus an
 *  in-memory transport for development and tests
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

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::debug;
use serialport::{SerialPort, SerialPortType};

use super::capability::Revision;
use super::error::{ProtoError, TransportError};

/// Blocking byte channel with explicit timeouts. The protocol session is
/// the sole owner for the lifetime of a connection.
pub trait Transport: Send {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError>;
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), TransportError>;
    /// Throw away any unread device chatter (acks we don't track).
    fn discard_input(&mut self) -> Result<(), TransportError>;
}

fn map_io(e: std::io::Error) -> TransportError {
    if e.kind() == std::io::ErrorKind::TimedOut {
        TransportError::Timeout
    } else {
        TransportError::Io(e)
    }
}

/// USB serial transport.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    pub fn open(path: &str, baud: u32, timeout: Duration) -> Result<Self, ProtoError> {
        let port = serialport::new(path, baud)
            .timeout(timeout)
            .open()
            .map_err(|source| ProtoError::Connect {
                port: path.to_string(),
                source,
            })?;
        debug!("opened serial port {} at {} baud", path, baud);
        Ok(Self { port })
    }
}

impl Transport for SerialTransport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.port.write_all(bytes).map_err(map_io)?;
        self.port.flush().map_err(map_io)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
        self.port.read_exact(buf).map_err(map_io)
    }

    fn discard_input(&mut self) -> Result<(), TransportError> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(|e| TransportError::Io(std::io::Error::other(e)))
    }
}

/// Find the serial port of a known panel by its USB fingerprint.
///
/// Each revision enumerates with a fixed serial-number string; scanning for
/// it beats asking the user to chase /dev/ttyACM* names around replugs.
pub fn auto_detect(revision: Revision) -> Result<String, ProtoError> {
    let wanted: &str = match revision {
        Revision::A => "USB35INCHIPSV2",
        Revision::B => "2017-2-25",
        Revision::C => "20080411",
    };
    let ports = serialport::available_ports()
        .map_err(|_| ProtoError::NoPortFound)?;
    for info in ports {
        if let SerialPortType::UsbPort(usb) = &info.port_type {
            if usb.serial_number.as_deref() == Some(wanted) {
                debug!("auto-detected panel on {}", info.port_name);
                return Ok(info.port_name);
            }
        }
    }
    Err(ProtoError::NoPortFound)
}

#[derive(Default)]
struct MemoryInner {
    writes: Vec<Vec<u8>>,
    attempts: usize,
    rx: VecDeque<u8>,
    fail_writes: usize,
}

/// In-memory panel stand-in. Records every write, replays scripted
/// responses, and can be told to time out. Used by the test suite and the
/// `--port sim` development mode.
pub struct MemoryTransport {
    inner: Arc<Mutex<MemoryInner>>,
}

/// Inspection/scripting handle onto a [`MemoryTransport`]; stays usable
/// after the transport moves into a session.
#[derive(Clone)]
pub struct MemoryHandle {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryTransport {
    pub fn new() -> (Self, MemoryHandle) {
        let inner = Arc::new(Mutex::new(MemoryInner::default()));
        (
            Self {
                inner: inner.clone(),
            },
            MemoryHandle { inner },
        )
    }
}

impl MemoryHandle {
    /// All successful writes, in order.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.inner.lock().unwrap().writes.clone()
    }

    /// Total write attempts, including ones that were failed on purpose.
    pub fn attempts(&self) -> usize {
        self.inner.lock().unwrap().attempts
    }

    /// Queue bytes the device will answer with.
    pub fn push_response(&self, bytes: &[u8]) {
        self.inner.lock().unwrap().rx.extend(bytes.iter().copied());
    }

    /// Make the next `n` writes time out.
    pub fn fail_next_writes(&self, n: usize) {
        self.inner.lock().unwrap().fail_writes = n;
    }

    pub fn clear_writes(&self) {
        self.inner.lock().unwrap().writes.clear();
    }
}

impl Transport for MemoryTransport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.attempts += 1;
        if inner.fail_writes > 0 {
            inner.fail_writes -= 1;
            return Err(TransportError::Timeout);
        }
        inner.writes.push(bytes.to_vec());
        Ok(())
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.rx.len() < buf.len() {
            // Nothing (or not enough) to read: behaves like a serial
            // timeout rather than blocking forever.
            return Err(TransportError::Timeout);
        }
        for slot in buf.iter_mut() {
            *slot = inner.rx.pop_front().unwrap();
        }
        Ok(())
    }

    fn discard_input(&mut self) -> Result<(), TransportError> {
        self.inner.lock().unwrap().rx.clear();
        Ok(())
    }
}
