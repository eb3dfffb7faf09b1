//! Classic libpcap file reader (Ethernet / raw IPv4, TCP and UDP ports)

use std::net::Ipv4Addr;
use std::path::Path;

use chrono::{DateTime, Utc};

use super::{CaptureError, FrameRecord, FrameSource, Protocol, Result};

const GLOBAL_HEADER_LEN: usize = 24;
const RECORD_HEADER_LEN: usize = 16;

const MAGIC_MICROS: u32 = 0xa1b2_c3d4;
const MAGIC_NANOS: u32 = 0xa1b2_3c4d;
const MAGIC_PCAPNG: u32 = 0x0a0d_0d0a;

const LINKTYPE_ETHERNET: u32 = 1;
const LINKTYPE_RAW: u32 = 101;
const LINKTYPE_IPV4: u32 = 228;

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_VLAN: u16 = 0x8100;

const IPPROTO_TCP: u8 = 6;
const IPPROTO_UDP: u8 = 17;

/// Largest record accepted; real snap lengths stay well below this
pub const DEFAULT_MAX_FRAME_BYTES: usize = 256 * 1024;

#[derive(Debug, Clone, Copy)]
enum Endian {
    Little,
    Big,
}

impl Endian {
    fn u32(self, b: &[u8]) -> u32 {
        let raw = [b[0], b[1], b[2], b[3]];
        match self {
            Endian::Little => u32::from_le_bytes(raw),
            Endian::Big => u32::from_be_bytes(raw),
        }
    }
}

/// Reads `.pcap` captures
#[derive(Debug, Clone)]
pub struct PcapReader {
    max_frame_bytes: usize,
}

impl Default for PcapReader {
    fn default() -> Self {
        Self::new()
    }
}

impl PcapReader {
    pub fn new() -> Self {
        Self {
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }

    /// Decode a whole capture held in memory.
    ///
    /// A record cut off at the end of the data ends the capture with a
    /// warning; frames before it are kept.
    pub fn parse(&self, data: &[u8]) -> Result<Vec<FrameRecord>> {
        if data.len() < GLOBAL_HEADER_LEN {
            return Err(CaptureError::Truncated(format!(
                "global header needs {} bytes, got {}",
                GLOBAL_HEADER_LEN,
                data.len()
            )));
        }

        let magic_le = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let magic_be = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let (endian, nanos) = match (magic_le, magic_be) {
            (MAGIC_MICROS, _) => (Endian::Little, false),
            (MAGIC_NANOS, _) => (Endian::Little, true),
            (_, MAGIC_MICROS) => (Endian::Big, false),
            (_, MAGIC_NANOS) => (Endian::Big, true),
            (MAGIC_PCAPNG, _) => return Err(CaptureError::Pcapng),
            _ => return Err(CaptureError::BadMagic(magic_be)),
        };
        let link_type = endian.u32(&data[20..24]);
        if !matches!(link_type, LINKTYPE_ETHERNET | LINKTYPE_RAW | LINKTYPE_IPV4) {
            tracing::warn!(link_type, "Unsupported link type, frames will not be decoded");
        }

        let mut frames = Vec::new();
        let mut offset = GLOBAL_HEADER_LEN;
        while offset < data.len() {
            if data.len() - offset < RECORD_HEADER_LEN {
                tracing::warn!(offset, "Record header truncated, stopping");
                break;
            }
            let header = &data[offset..offset + RECORD_HEADER_LEN];
            let ts_sec = endian.u32(&header[0..4]);
            let ts_frac = endian.u32(&header[4..8]);
            let incl_len = endian.u32(&header[8..12]) as usize;

            if incl_len > self.max_frame_bytes {
                return Err(CaptureError::FrameTooLarge {
                    max_frame_bytes: self.max_frame_bytes,
                    got_bytes: incl_len,
                });
            }

            let start = offset + RECORD_HEADER_LEN;
            let Some(packet) = data.get(start..start + incl_len) else {
                tracing::warn!(offset, incl_len, "Record body truncated, stopping");
                break;
            };

            let nsecs = if nanos { ts_frac } else { ts_frac.saturating_mul(1000) };
            let timestamp =
                DateTime::<Utc>::from_timestamp(i64::from(ts_sec), nsecs).unwrap_or_default();

            frames.push(decode_frame(timestamp, link_type, packet));
            offset = start + incl_len;
        }

        Ok(frames)
    }
}

impl FrameSource for PcapReader {
    fn frames(&self, path: &Path) -> Result<Vec<FrameRecord>> {
        let data = std::fs::read(path)?;
        self.parse(&data)
    }
}

fn decode_frame(timestamp: DateTime<Utc>, link_type: u32, packet: &[u8]) -> FrameRecord {
    let mut record = FrameRecord {
        timestamp,
        length: packet.len() as u32,
        src_ip: None,
        dst_ip: None,
        src_port: None,
        dst_port: None,
        protocol: Protocol::Unknown,
    };

    let ip = match link_type {
        LINKTYPE_ETHERNET => ethernet_payload(packet),
        LINKTYPE_RAW | LINKTYPE_IPV4 => Some(packet),
        _ => None,
    };
    if let Some(ip) = ip {
        decode_ipv4(ip, &mut record);
    }
    record
}

/// The IPv4 payload of an Ethernet II frame, if it carries one
fn ethernet_payload(frame: &[u8]) -> Option<&[u8]> {
    let mut ethertype = u16::from_be_bytes([*frame.get(12)?, *frame.get(13)?]);
    let mut offset = 14;
    if ethertype == ETHERTYPE_VLAN {
        ethertype = u16::from_be_bytes([*frame.get(16)?, *frame.get(17)?]);
        offset = 18;
    }
    if ethertype != ETHERTYPE_IPV4 {
        return None;
    }
    frame.get(offset..)
}

fn decode_ipv4(ip: &[u8], record: &mut FrameRecord) {
    if ip.len() < 20 || ip[0] >> 4 != 4 {
        return;
    }
    let header_len = usize::from(ip[0] & 0x0f) * 4;
    if header_len < 20 {
        return;
    }

    let proto = ip[9];
    record.src_ip = Some(Ipv4Addr::new(ip[12], ip[13], ip[14], ip[15]));
    record.dst_ip = Some(Ipv4Addr::new(ip[16], ip[17], ip[18], ip[19]));
    record.protocol = match proto {
        IPPROTO_TCP => Protocol::Tcp,
        IPPROTO_UDP => Protocol::Udp,
        other => Protocol::Ip(other),
    };

    // Only the first fragment carries the transport header
    let fragment_offset = u16::from_be_bytes([ip[6], ip[7]]) & 0x1fff;
    if fragment_offset != 0 || !matches!(proto, IPPROTO_TCP | IPPROTO_UDP) {
        return;
    }
    if let Some(ports) = ip.get(header_len..header_len + 4) {
        record.src_port = Some(u16::from_be_bytes([ports[0], ports[1]]));
        record.dst_port = Some(u16::from_be_bytes([ports[2], ports[3]]));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn global_header(big_endian: bool, magic: u32, link_type: u32) -> Vec<u8> {
        let mut out = Vec::new();
        let put32 = |v: u32, out: &mut Vec<u8>| {
            if big_endian {
                out.extend_from_slice(&v.to_be_bytes())
            } else {
                out.extend_from_slice(&v.to_le_bytes())
            }
        };
        put32(magic, &mut out);
        let version: [u8; 4] = if big_endian { [0, 2, 0, 4] } else { [2, 0, 4, 0] };
        out.extend_from_slice(&version);
        put32(0, &mut out); // thiszone
        put32(0, &mut out); // sigfigs
        put32(65535, &mut out); // snaplen
        put32(link_type, &mut out);
        out
    }

    fn record(big_endian: bool, ts_sec: u32, ts_frac: u32, packet: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        for v in [ts_sec, ts_frac, packet.len() as u32, packet.len() as u32] {
            if big_endian {
                out.extend_from_slice(&v.to_be_bytes());
            } else {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        out.extend_from_slice(packet);
        out
    }

    fn ethernet_ipv4(proto: u8, src: [u8; 4], dst: [u8; 4], sport: u16, dport: u16) -> Vec<u8> {
        let mut frame = vec![0u8; 12];
        frame.extend_from_slice(&ETHERTYPE_IPV4.to_be_bytes());
        let mut ip = vec![0x45, 0, 0, 40, 0, 0, 0x40, 0, 64, proto, 0, 0];
        ip.extend_from_slice(&src);
        ip.extend_from_slice(&dst);
        frame.extend_from_slice(&ip);
        frame.extend_from_slice(&sport.to_be_bytes());
        frame.extend_from_slice(&dport.to_be_bytes());
        frame.extend_from_slice(&[0u8; 16]);
        frame
    }

    fn arp_frame() -> Vec<u8> {
        let mut frame = vec![0xffu8; 12];
        frame.extend_from_slice(&0x0806u16.to_be_bytes());
        frame.extend_from_slice(&[0u8; 28]);
        frame
    }

    #[test]
    fn test_parse_little_endian_tcp_udp_and_arp() {
        let mut data = global_header(false, MAGIC_MICROS, LINKTYPE_ETHERNET);
        data.extend(record(
            false,
            1_700_000_000,
            250_000,
            &ethernet_ipv4(IPPROTO_TCP, [10, 0, 0, 1], [10, 0, 0, 2], 443, 51000),
        ));
        data.extend(record(
            false,
            1_700_000_001,
            0,
            &ethernet_ipv4(IPPROTO_UDP, [10, 0, 0, 3], [8, 8, 8, 8], 5353, 53),
        ));
        data.extend(record(false, 1_700_000_002, 0, &arp_frame()));

        let frames = PcapReader::new().parse(&data).unwrap();

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].protocol, Protocol::Tcp);
        assert_eq!(frames[0].src_ip, Some(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(frames[0].dst_ip, Some(Ipv4Addr::new(10, 0, 0, 2)));
        assert_eq!(frames[0].src_port, Some(443));
        assert_eq!(frames[0].dst_port, Some(51000));
        assert_eq!(frames[0].timestamp.timestamp_subsec_micros(), 250_000);
        assert_eq!(frames[1].protocol, Protocol::Udp);
        assert_eq!(frames[1].dst_port, Some(53));
        assert_eq!(frames[2].protocol, Protocol::Unknown);
        assert_eq!(frames[2].src_ip, None);
        assert_eq!(frames[2].length, 42);
    }

    #[test]
    fn test_parse_big_endian_nanos() {
        let mut data = global_header(true, MAGIC_NANOS, LINKTYPE_ETHERNET);
        data.extend(record(
            true,
            1_700_000_000,
            123,
            &ethernet_ipv4(IPPROTO_TCP, [192, 168, 1, 1], [192, 168, 1, 2], 22, 60000),
        ));

        let frames = PcapReader::new().parse(&data).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].timestamp.timestamp(), 1_700_000_000);
        assert_eq!(frames[0].timestamp.timestamp_subsec_nanos(), 123);
        assert_eq!(frames[0].src_port, Some(22));
    }

    #[test]
    fn test_icmp_has_no_ports() {
        let mut data = global_header(false, MAGIC_MICROS, LINKTYPE_ETHERNET);
        data.extend(record(
            false,
            0,
            0,
            &ethernet_ipv4(1, [10, 0, 0, 1], [10, 0, 0, 2], 0x0800, 0),
        ));

        let frames = PcapReader::new().parse(&data).unwrap();
        assert_eq!(frames[0].protocol, Protocol::Ip(1));
        assert_eq!(frames[0].src_port, None);
    }

    #[test]
    fn test_raw_ip_link_type() {
        let ethernet = ethernet_ipv4(IPPROTO_UDP, [1, 2, 3, 4], [5, 6, 7, 8], 1000, 2000);
        let mut data = global_header(false, MAGIC_MICROS, LINKTYPE_RAW);
        data.extend(record(false, 0, 0, &ethernet[14..]));

        let frames = PcapReader::new().parse(&data).unwrap();
        assert_eq!(frames[0].protocol, Protocol::Udp);
        assert_eq!(frames[0].src_ip, Some(Ipv4Addr::new(1, 2, 3, 4)));
    }

    #[test]
    fn test_vlan_tagged_frame() {
        let plain = ethernet_ipv4(IPPROTO_TCP, [10, 1, 1, 1], [10, 1, 1, 2], 80, 40000);
        let mut tagged = plain[..12].to_vec();
        tagged.extend_from_slice(&ETHERTYPE_VLAN.to_be_bytes());
        tagged.extend_from_slice(&[0x00, 0x64]);
        tagged.extend_from_slice(&plain[12..]);

        let mut data = global_header(false, MAGIC_MICROS, LINKTYPE_ETHERNET);
        data.extend(record(false, 0, 0, &tagged));

        let frames = PcapReader::new().parse(&data).unwrap();
        assert_eq!(frames[0].protocol, Protocol::Tcp);
        assert_eq!(frames[0].src_port, Some(80));
    }

    #[test]
    fn test_truncated_record_keeps_earlier_frames() {
        let packet = ethernet_ipv4(IPPROTO_TCP, [10, 0, 0, 1], [10, 0, 0, 2], 1, 2);
        let mut data = global_header(false, MAGIC_MICROS, LINKTYPE_ETHERNET);
        data.extend(record(false, 0, 0, &packet));
        let second = record(false, 1, 0, &packet);
        data.extend_from_slice(&second[..second.len() - 10]);

        let frames = PcapReader::new().parse(&data).unwrap();
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_rejects_pcapng() {
        let data = [0x0a, 0x0d, 0x0d, 0x0a, 0x1c, 0, 0, 0]
            .iter()
            .copied()
            .chain(std::iter::repeat_n(0u8, 24))
            .collect::<Vec<u8>>();
        let err = PcapReader::new().parse(&data).unwrap_err();
        assert!(matches!(err, CaptureError::Pcapng));
    }

    #[test]
    fn test_rejects_garbage_and_short_input() {
        let err = PcapReader::new().parse(b"hello").unwrap_err();
        assert!(matches!(err, CaptureError::Truncated(_)));

        let err = PcapReader::new().parse(&[0x42u8; 24]).unwrap_err();
        assert!(matches!(err, CaptureError::BadMagic(0x4242_4242)));
    }

    #[test]
    fn test_oversized_record_rejected() {
        let packet = vec![0u8; 100];
        let mut data = global_header(false, MAGIC_MICROS, LINKTYPE_ETHERNET);
        data.extend(record(false, 0, 0, &packet));

        let reader = PcapReader { max_frame_bytes: 64 };
        let err = reader.parse(&data).unwrap_err();
        assert!(matches!(
            err,
            CaptureError::FrameTooLarge {
                max_frame_bytes: 64,
                got_bytes: 100
            }
        ));
    }

    #[test]
    fn test_frames_reads_file() {
        let mut data = global_header(false, MAGIC_MICROS, LINKTYPE_ETHERNET);
        data.extend(record(
            false,
            0,
            0,
            &ethernet_ipv4(IPPROTO_UDP, [10, 0, 0, 1], [10, 0, 0, 2], 1, 2),
        ));
        let path = std::env::temp_dir().join(format!("capchat-{}.pcap", uuid::Uuid::new_v4()));
        std::fs::write(&path, &data).unwrap();

        let frames = PcapReader::new().frames(&path);
        std::fs::remove_file(&path).ok();

        assert_eq!(frames.unwrap().len(), 1);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = PcapReader::new()
            .frames(Path::new("/nonexistent/capchat.pcap"))
            .unwrap_err();
        assert!(matches!(err, CaptureError::Io(_)));
    }
}
