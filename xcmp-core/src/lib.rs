#![forbid(unsafe_code)]

//! A client for a two-wire radio control stack: the outer XCMP
//! control-message framing and the inner XNL session layer (addressing,
//! reliability tagging, TEA-family authentication) it carries.

pub mod client;
pub mod config;
pub mod error;
pub mod transport;
pub mod xcmp;
pub mod xnl;

pub use client::{DeviceIdentity, XcmpClient};
pub use error::{Result, XcmpError};
