use std::io::{BufRead, BufReader};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use crate::error::{Result, XcmpError};
use crate::transport::{ByteTransport, TcpTransport};

const AT_TIMEOUT: Duration = Duration::from_secs(5);

/// Dials the radio's internal modem over a serial port and brings up PPP,
/// then delegates to a [`TcpTransport`] dialled at the negotiated remote
/// address.
///
/// This is an external collaborator per the specification: it does not
/// implement a PPP stack or own serial port handling itself. The serial
/// byte pipe is supplied by the caller as any [`ByteTransport`] (e.g. a
/// thin wrapper around an OS serial port handle); this crate only speaks
/// AT commands and scrapes the PPP daemon's announced remote address.
pub struct PppSerialTransport {
    serial: Box<dyn ByteTransport>,
    pppd_path: PathBuf,
    remote_port: u16,
    pppd: Option<Child>,
    inner: Option<TcpTransport>,
}

impl PppSerialTransport {
    pub fn new(serial: Box<dyn ByteTransport>, pppd_path: PathBuf, remote_port: u16) -> Self {
        Self { serial, pppd_path, remote_port, pppd: None, inner: None }
    }

    fn at_command(&mut self, command: &str, expect: &str) -> Result<()> {
        self.serial.send(format!("{command}\r\n").as_bytes())?;
        let deadline = Instant::now() + AT_TIMEOUT;
        let mut collected = Vec::new();
        while Instant::now() < deadline {
            let chunk = self.serial.receive()?;
            collected.extend_from_slice(&chunk);
            if String::from_utf8_lossy(&collected).contains(expect) {
                return Ok(());
            }
        }
        Err(XcmpError::Timeout)
    }

    fn spawn_pppd(&mut self) -> Result<SocketAddr> {
        let mut child = Command::new(&self.pppd_path)
            .arg("noauth")
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let stdout = child.stdout.take().expect("pppd stdout was piped");
        let reader = BufReader::new(stdout);
        let mut remote_ip = None;
        for line in reader.lines() {
            let line = line?;
            debug!(%line, "pppd output");
            if let Some(ip) = scrape_remote_ip(&line) {
                remote_ip = Some(ip);
                break;
            }
        }

        let ip = remote_ip.ok_or_else(|| {
            XcmpError::Config("pppd exited without announcing a remote IP address".into())
        })?;
        self.pppd = Some(child);
        Ok(SocketAddr::new(ip, self.remote_port))
    }
}

/// Parses a line like `remote IP address is 10.64.64.1` (pppd's usual
/// announcement) into the address it names.
fn scrape_remote_ip(line: &str) -> Option<std::net::IpAddr> {
    let marker = "remote IP address is ";
    let idx = line.find(marker)?;
    line[idx + marker.len()..].trim().parse().ok()
}

impl ByteTransport for PppSerialTransport {
    #[instrument(skip(self))]
    fn connect(&mut self) -> Result<()> {
        self.serial.connect()?;
        self.at_command("ATZ", "OK")?;
        self.at_command("ATDT8002", "CONNECT")?;

        let remote_addr = self.spawn_pppd()?;
        info!(%remote_addr, "ppp link up, dialling inner TCP transport");

        let mut inner = TcpTransport::new(remote_addr);
        inner.connect()?;
        self.inner = Some(inner);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        if let Some(mut inner) = self.inner.take() {
            inner.disconnect()?;
        }
        if let Some(mut child) = self.pppd.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        self.serial.disconnect()?;
        Ok(())
    }

    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.as_mut().ok_or(XcmpError::NotConnected)?.send(bytes)
    }

    fn receive(&mut self) -> Result<Vec<u8>> {
        self.inner.as_mut().ok_or(XcmpError::NotConnected)?.receive()
    }

    fn is_connected(&self) -> bool {
        self.inner.as_ref().is_some_and(ByteTransport::is_connected)
    }
}

impl Drop for PppSerialTransport {
    fn drop(&mut self) {
        if let Some(mut child) = self.pppd.take() {
            if let Err(err) = child.kill() {
                warn!(%err, "failed to terminate pppd on drop");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scrapes_remote_ip_from_pppd_line() {
        let line = "local  IP address 10.64.64.2\nremote IP address is 10.64.64.1";
        assert_eq!(scrape_remote_ip(line.lines().nth(1).unwrap()), "10.64.64.1".parse().ok());
    }

    #[test]
    fn ignores_unrelated_lines() {
        assert_eq!(scrape_remote_ip("Serial connection established."), None);
    }
}
