use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Result, XcmpError};
use crate::xnl::TeaKey;

/// Which concrete [`crate::transport::ByteTransport`] to build.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    Tcp,
    Udp,
    PppSerial,
}

/// TEA key material: this is calibration data supplied by the caller, not
/// a secret this crate manages (see spec §4.5/§6).
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct TeaKeyConfig {
    pub tea_keys: [u32; 4],
    #[serde(default = "default_tea_delta")]
    pub tea_delta: u32,
}

const fn default_tea_delta() -> u32 {
    0x9E37_79B9
}

impl From<TeaKeyConfig> for TeaKey {
    fn from(cfg: TeaKeyConfig) -> Self {
        TeaKey { k: cfg.tea_keys, delta: cfg.tea_delta }
    }
}

fn default_timeout_ms() -> u64 {
    1000
}

/// Serial/PPP bring-up parameters, only required when
/// `transport = "ppp-serial"`.
#[derive(Debug, Deserialize, Clone)]
pub struct PppConfig {
    pub serial_port: String,
    pub baud: u32,
    pub pppd_path: String,
    pub remote_port: u16,
}

/// Connection parameters and TEA key material, loaded from TOML.
///
/// Mirrors the shape of `huginn-proxy-lib::config::Config`: a plain
/// `#[derive(Deserialize)]` struct loaded wholesale by
/// [`load_from_path`].
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub transport: TransportKind,
    #[serde(flatten)]
    pub tea: TeaKeyConfig,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub ppp: Option<PppConfig>,
}

impl Config {
    pub fn addr(&self) -> Result<std::net::SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|err| XcmpError::Config(format!("invalid host/port: {err}")))
    }
}

pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Config> {
    let text = fs::read_to_string(path).map_err(XcmpError::Transport)?;
    toml::from_str(&text).map_err(|err| XcmpError::Config(err.to_string()))
}
