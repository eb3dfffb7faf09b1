//! Capture file statistics, used as chat context

mod pcap;
mod stats;

pub use pcap::PcapReader;
pub use stats::TrafficSummary;

use std::fmt;
use std::net::Ipv4Addr;
use std::path::Path;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors reading a capture file
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pcapng captures are not supported; convert with `editcap -F pcap`")]
    Pcapng,

    #[error("not a pcap file (magic {0:#010x})")]
    BadMagic(u32),

    #[error("capture truncated: {0}")]
    Truncated(String),

    #[error("frame too large: max {max_frame_bytes} got {got_bytes}")]
    FrameTooLarge {
        max_frame_bytes: usize,
        got_bytes: usize,
    },
}

pub type Result<T> = std::result::Result<T, CaptureError>;

/// Transport protocol of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Protocol {
    Tcp,
    Udp,
    /// IPv4 carrying another protocol, by protocol number
    Ip(u8),
    /// Not IPv4
    Unknown,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => f.write_str("TCP"),
            Protocol::Udp => f.write_str("UDP"),
            Protocol::Ip(1) => f.write_str("ICMP"),
            Protocol::Ip(n) => write!(f, "IP proto {}", n),
            Protocol::Unknown => f.write_str("Unknown"),
        }
    }
}

/// What the statistics need to know about one captured frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRecord {
    pub timestamp: DateTime<Utc>,
    /// Captured length in bytes
    pub length: u32,
    pub src_ip: Option<Ipv4Addr>,
    pub dst_ip: Option<Ipv4Addr>,
    pub src_port: Option<u16>,
    pub dst_port: Option<u16>,
    pub protocol: Protocol,
}

/// Something that can turn a capture file into frame records
pub trait FrameSource {
    fn frames(&self, path: &Path) -> Result<Vec<FrameRecord>>;
}

/// Read a capture and summarize it
pub fn summarize(source: &dyn FrameSource, path: &Path) -> Result<TrafficSummary> {
    let frames = source.frames(path)?;
    tracing::debug!(path = %path.display(), frames = frames.len(), "Capture loaded");
    Ok(TrafficSummary::from_frames(&frames))
}
