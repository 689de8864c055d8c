//! Blocking state manager client.
//!
//! `StateManagerClient` is a `QuantumRegister` whose states live on a remote
//! server. Several processes share one server, so each client allocates keys
//! from its own `KeySpace` and the server never hands keys out.

use std::net::{TcpStream, ToSocketAddrs};
use std::time::Instant;

use serde::de::DeserializeOwned;
use shared_types::{
    zero_ket, Amplitude, Circuit, KetState, MeasurementMap, QstateKey, QuantumRegister,
    RegisterError,
};
use tracing::{debug, info};

use crate::adapters::framing::{read_frame, write_frame};
use crate::domain::{MessageType, Request, WireMessage};
use crate::error::{ManagerError, Result};
use crate::metrics::ClientMetrics;

/// Disjoint key allocation: `offset`, `offset + stride`, `offset + 2·stride`, ...
///
/// Clients `0..n` of one run use `KeySpace::new(i, n)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    offset: QstateKey,
    stride: QstateKey,
    allocated: u64,
}

impl KeySpace {
    pub fn new(offset: QstateKey, stride: QstateKey) -> Self {
        Self {
            offset,
            stride: stride.max(1),
            allocated: 0,
        }
    }

    pub fn next_key(&mut self) -> QstateKey {
        let key = self.offset + self.allocated * self.stride;
        self.allocated += 1;
        key
    }

    pub fn allocated(&self) -> u64 {
        self.allocated
    }
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new(0, 1)
    }
}

/// Remote quantum register over one TCP connection.
pub struct StateManagerClient {
    stream: TcpStream,
    keys: KeySpace,
    metrics: ClientMetrics,
    closed: bool,
}

impl StateManagerClient {
    /// Connect and complete the CONNECT/CONNECTED handshake.
    pub fn connect<A: ToSocketAddrs>(addr: A, keys: KeySpace) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        let mut client = Self {
            stream,
            keys,
            metrics: ClientMetrics::default(),
            closed: false,
        };
        client.handshake()?;
        Ok(client)
    }

    fn handshake(&mut self) -> Result<()> {
        let reply: WireMessage = self.call(&Request::Connect)?;
        if reply.message_type != MessageType::Connected {
            return Err(ManagerError::UnexpectedResponse {
                request: MessageType::Connect,
                reason: format!("got {}", reply.message_type),
            });
        }
        info!(peer = ?self.stream.peer_addr().ok(), "connected to state manager");
        Ok(())
    }

    fn send(&mut self, request: &Request) -> Result<()> {
        if self.closed {
            return Err(ManagerError::ConnectionClosed);
        }
        let started = Instant::now();
        write_frame(&mut self.stream, &request.encode()?)?;
        self.metrics.record(request.message_type(), started.elapsed());
        debug!(message_type = %request.message_type(), "request sent");
        Ok(())
    }

    /// Send a request that has a response and decode it.
    fn call<T: DeserializeOwned>(&mut self, request: &Request) -> Result<T> {
        if self.closed {
            return Err(ManagerError::ConnectionClosed);
        }
        let started = Instant::now();
        write_frame(&mut self.stream, &request.encode()?)?;
        let frame = read_frame(&mut self.stream)?.ok_or(ManagerError::ConnectionClosed)?;
        self.metrics.record(request.message_type(), started.elapsed());

        serde_json::from_slice(&frame).map_err(|e| ManagerError::UnexpectedResponse {
            request: request.message_type(),
            reason: e.to_string(),
        })
    }

    pub fn get_state(&mut self, key: QstateKey) -> Result<KetState> {
        self.call(&Request::Get { key })
    }

    pub fn set_state(&mut self, keys: &[QstateKey], amplitudes: &[Amplitude]) -> Result<()> {
        self.send(&Request::Set {
            keys: keys.to_vec(),
            amplitudes: amplitudes.to_vec(),
        })
    }

    pub fn run(&mut self, circuit: &Circuit, keys: &[QstateKey]) -> Result<MeasurementMap> {
        let request = Request::run(circuit.clone(), keys.to_vec());
        if request.expects_response() {
            self.call(&request)
        } else {
            self.send(&request)?;
            Ok(MeasurementMap::new())
        }
    }

    pub fn remove_state(&mut self, key: QstateKey) -> Result<()> {
        self.send(&Request::Remove { key })
    }

    /// Close this connection only. Further requests fail.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.send(&Request::Close)?;
        self.closed = true;
        Ok(())
    }

    /// Stop the server for every client.
    pub fn kill(&mut self) -> Result<()> {
        self.send(&Request::Terminate)?;
        self.closed = true;
        Ok(())
    }

    pub fn metrics(&self) -> &ClientMetrics {
        &self.metrics
    }

    pub fn key_space(&self) -> &KeySpace {
        &self.keys
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl QuantumRegister for StateManagerClient {
    fn new_state(
        &mut self,
        amplitudes: Option<&[Amplitude]>,
    ) -> std::result::Result<QstateKey, RegisterError> {
        let key = self.keys.next_key();
        let amplitudes = amplitudes.map_or_else(zero_ket, <[Amplitude]>::to_vec);
        self.set_state(&[key], &amplitudes)?;
        Ok(key)
    }

    fn get(&mut self, key: QstateKey) -> std::result::Result<KetState, RegisterError> {
        Ok(self.get_state(key)?)
    }

    fn set(
        &mut self,
        keys: &[QstateKey],
        amplitudes: &[Amplitude],
    ) -> std::result::Result<(), RegisterError> {
        Ok(self.set_state(keys, amplitudes)?)
    }

    fn run_circuit(
        &mut self,
        circuit: &Circuit,
        keys: &[QstateKey],
    ) -> std::result::Result<MeasurementMap, RegisterError> {
        Ok(self.run(circuit, keys)?)
    }

    fn remove(&mut self, key: QstateKey) -> std::result::Result<(), RegisterError> {
        Ok(self.remove_state(key)?)
    }
}

/// Connect to a server and tell it to terminate.
pub fn kill_server<A: ToSocketAddrs>(addr: A) -> Result<()> {
    let mut stream = TcpStream::connect(addr)?;
    write_frame(&mut stream, &Request::Terminate.encode()?)?;
    info!("sent TERMINATE to state manager");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_spaces_are_disjoint() {
        let mut a = KeySpace::new(0, 2);
        let mut b = KeySpace::new(1, 2);
        let from_a: Vec<_> = (0..3).map(|_| a.next_key()).collect();
        let from_b: Vec<_> = (0..3).map(|_| b.next_key()).collect();
        assert_eq!(from_a, vec![0, 2, 4]);
        assert_eq!(from_b, vec![1, 3, 5]);
        assert_eq!(a.allocated(), 3);
    }

    #[test]
    fn test_zero_stride_behaves_as_one() {
        let mut keys = KeySpace::new(10, 0);
        assert_eq!(keys.next_key(), 10);
        assert_eq!(keys.next_key(), 11);
    }
}
