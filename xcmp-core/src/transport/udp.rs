use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use tracing::{debug, instrument};

use crate::error::{Result, XcmpError};
use crate::transport::ByteTransport;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);
const MAX_DATAGRAM: usize = 64 * 1024;

/// A UDP socket to a fixed host/port. Bind-then-connect semantics: a
/// socket is bound to an ephemeral local port and then `connect`ed to the
/// peer so that `send`/`recv` (rather than `send_to`/`recv_from`) can be
/// used, matching the TCP transport's shape.
pub struct UdpTransport {
    addr: SocketAddr,
    timeout: Duration,
    socket: Option<UdpSocket>,
}

impl UdpTransport {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr, timeout: DEFAULT_TIMEOUT, socket: None }
    }

    pub fn with_timeout(addr: SocketAddr, timeout: Duration) -> Self {
        Self { addr, timeout, socket: None }
    }

    fn socket(&self) -> Result<&UdpSocket> {
        self.socket.as_ref().ok_or(XcmpError::NotConnected)
    }
}

impl ByteTransport for UdpTransport {
    #[instrument(skip(self), fields(addr = %self.addr))]
    fn connect(&mut self) -> Result<()> {
        let bind_addr: SocketAddr = if self.addr.is_ipv6() { "[::]:0" } else { "0.0.0.0:0" }.parse().unwrap();
        let socket = UdpSocket::bind(bind_addr)?;
        socket.connect(self.addr)?;
        socket.set_read_timeout(Some(self.timeout))?;
        socket.set_write_timeout(Some(self.timeout))?;
        debug!("udp transport connected");
        self.socket = Some(socket);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        self.socket = None;
        Ok(())
    }

    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.socket()?.send(bytes)?;
        Ok(())
    }

    fn receive(&mut self) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let n = self.socket()?.recv(&mut buf).map_err(|err| match err.kind() {
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => XcmpError::Timeout,
            _ => XcmpError::Transport(err),
        })?;
        buf.truncate(n);
        Ok(buf)
    }

    fn is_connected(&self) -> bool {
        self.socket.is_some()
    }
}
