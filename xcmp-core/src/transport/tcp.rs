use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use tracing::{debug, instrument};

use crate::error::{Result, XcmpError};
use crate::transport::ByteTransport;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// A TCP socket to a fixed host/port, reading one length-prefixed XCMP
/// frame per [`receive`](ByteTransport::receive).
pub struct TcpTransport {
    addr: SocketAddr,
    timeout: Duration,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr, timeout: DEFAULT_TIMEOUT, stream: None }
    }

    pub fn with_timeout(addr: SocketAddr, timeout: Duration) -> Self {
        Self { addr, timeout, stream: None }
    }

    fn stream(&mut self) -> Result<&mut TcpStream> {
        self.stream.as_mut().ok_or(XcmpError::NotConnected)
    }
}

impl ByteTransport for TcpTransport {
    #[instrument(skip(self), fields(addr = %self.addr))]
    fn connect(&mut self) -> Result<()> {
        let stream = TcpStream::connect_timeout(&self.addr, self.timeout)?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;
        stream.set_nodelay(true)?;
        debug!("tcp transport connected");
        self.stream = Some(stream);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
        Ok(())
    }

    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream()?.write_all(bytes)?;
        Ok(())
    }

    fn receive(&mut self) -> Result<Vec<u8>> {
        let stream = self.stream()?;

        let mut len_bytes = [0u8; 2];
        read_exact_mapped(stream, &mut len_bytes)?;
        let body_len = u16::from_be_bytes(len_bytes) as usize;

        let mut body = vec![0u8; body_len];
        read_exact_mapped(stream, &mut body)?;

        let mut frame = Vec::with_capacity(2 + body_len);
        frame.extend_from_slice(&len_bytes);
        frame.extend_from_slice(&body);
        Ok(frame)
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

fn read_exact_mapped(stream: &mut TcpStream, buf: &mut [u8]) -> Result<()> {
    stream.read_exact(buf).map_err(|err| match err.kind() {
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => XcmpError::Timeout,
        _ => XcmpError::Transport(err),
    })
}
