//! Traffic summary over decoded frames

use std::collections::{HashMap, HashSet};
use std::fmt::Write;
use std::hash::Hash;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};

use super::{FrameRecord, Protocol};

/// How many source addresses and ports the summary keeps
pub const TOP_N: usize = 5;

/// Aggregate statistics for one capture
#[derive(Debug, Clone, PartialEq)]
pub struct TrafficSummary {
    pub total_frames: usize,
    pub total_bytes: u64,
    /// Most frequent first
    pub protocols: Vec<(Protocol, usize)>,
    /// Top source addresses, most frequent first
    pub top_source_ips: Vec<(Ipv4Addr, usize)>,
    /// Top source ports, most frequent first
    pub top_source_ports: Vec<(u16, usize)>,
    /// Top destination ports, most frequent first
    pub top_destination_ports: Vec<(u16, usize)>,
    /// Distinct IPv4 addresses seen as source or destination
    pub distinct_hosts: usize,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
}

impl TrafficSummary {
    pub fn from_frames(frames: &[FrameRecord]) -> Self {
        let mut protocols = HashMap::new();
        let mut source_ips = HashMap::new();
        let mut source_ports = HashMap::new();
        let mut destination_ports = HashMap::new();
        let mut hosts = HashSet::new();

        for frame in frames {
            *protocols.entry(frame.protocol).or_insert(0) += 1;
            if let Some(ip) = frame.src_ip {
                *source_ips.entry(ip).or_insert(0) += 1;
            }
            if let Some(port) = frame.src_port {
                *source_ports.entry(port).or_insert(0) += 1;
            }
            if let Some(port) = frame.dst_port {
                *destination_ports.entry(port).or_insert(0) += 1;
            }
            hosts.extend(frame.src_ip);
            hosts.extend(frame.dst_ip);
        }

        Self {
            total_frames: frames.len(),
            total_bytes: frames.iter().map(|f| u64::from(f.length)).sum(),
            protocols: ranked(protocols, usize::MAX),
            top_source_ips: ranked(source_ips, TOP_N),
            top_source_ports: ranked(source_ports, TOP_N),
            top_destination_ports: ranked(destination_ports, TOP_N),
            distinct_hosts: hosts.len(),
            first_seen: frames.iter().map(|f| f.timestamp).min(),
            last_seen: frames.iter().map(|f| f.timestamp).max(),
        }
    }

    pub fn total_kb(&self) -> f64 {
        self.total_bytes as f64 / 1024.0
    }

    /// Textual report, also used as chat context
    pub fn report(&self) -> String {
        if self.total_frames == 0 {
            return "No frames found to analyze".to_string();
        }

        let mut out = String::new();
        let _ = writeln!(out, "Total frames: {}", self.total_frames);
        let _ = write!(out, "Total traffic: {:.2} KB", self.total_kb());

        if let (Some(first), Some(last)) = (self.first_seen, self.last_seen) {
            let _ = write!(
                out,
                "\nCapture span: {} - {} ({:.3} s)",
                first.format("%Y-%m-%d %H:%M:%S"),
                last.format("%Y-%m-%d %H:%M:%S"),
                (last - first).num_milliseconds() as f64 / 1000.0
            );
        }

        out.push_str("\n\nProtocol distribution:");
        for (protocol, count) in &self.protocols {
            let _ = write!(out, "\n{}: {} frames", protocol, count);
        }

        if !self.top_source_ips.is_empty() {
            let _ = write!(out, "\n\nDistinct hosts: {}", self.distinct_hosts);
            out.push_str("\n\nMost active source IPs:");
            for (ip, count) in &self.top_source_ips {
                let _ = write!(out, "\n{}: {} frames", ip, count);
            }
        }

        if !self.top_source_ports.is_empty() {
            out.push_str("\n\nMost used source ports:");
            for (port, count) in &self.top_source_ports {
                let _ = write!(out, "\nPort {}: {} uses", port, count);
            }
        }

        if !self.top_destination_ports.is_empty() {
            out.push_str("\n\nMost contacted destination ports:");
            for (port, count) in &self.top_destination_ports {
                let _ = write!(out, "\nPort {}: {} uses", port, count);
            }
        }

        out
    }
}

/// Sort by count descending, ties by key, and keep the first `limit`
fn ranked<K: Ord + Hash>(counts: HashMap<K, usize>, limit: usize) -> Vec<(K, usize)> {
    let mut entries: Vec<(K, usize)> = counts.into_iter().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    entries.truncate(limit);
    entries
}
