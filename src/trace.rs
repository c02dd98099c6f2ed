//! Trace and span identifier generation.
//!
//! A trace ID correlates every log record of one logical operation; a span ID
//! distinguishes nested operations sharing that trace. Both are best-effort
//! unique hex strings built from the host IPv4 address, the clock, the process
//! id and a random component. Generation never fails: an address that cannot
//! be reduced to four bytes contributes zeros.
//!
//! Trace ID layout (32 hex chars):
//!
//! ```text
//! iiiiiiii ssssssss nnnn pppp rrrrrr tt
//! ip       seconds  nano pid  random source tag
//! ```

use rand::Rng;
use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Trailing tag marking IDs minted by this implementation.
pub const SOURCE_TAG: &str = "b1";

/// Length of a trace ID in characters.
pub const TRACE_ID_LEN: usize = 30 + SOURCE_TAG.len();

/// Length of a span ID in characters.
pub const SPAN_ID_LEN: usize = 16;

/// Identifiers for one logical operation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TraceContext {
    pub trace_id: String,
    pub span_id: String,
}

impl TraceContext {
    /// Child context: same trace, fresh span.
    pub fn child(&self, local_ip: &str) -> Self {
        Self {
            trace_id: self.trace_id.clone(),
            span_id: new_span_id(local_ip),
        }
    }
}

impl std::fmt::Display for TraceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.trace_id, self.span_id)
    }
}

/// Generate a new trace ID for the given local IP.
pub fn new_trace_id(local_ip: &str) -> String {
    let now = unix_now();
    let random = rand::thread_rng().gen_range(0..1u32 << 24);
    format_trace_id(parse_ipv4(local_ip), now, std::process::id(), random)
}

/// Generate a new span ID for the given local IP.
pub fn new_span_id(local_ip: &str) -> String {
    let random = rand::thread_rng().gen_range(0..=i32::MAX as u32);
    format_span_id(parse_ipv4(local_ip), unix_now(), random)
}

/// Bundle a fresh trace ID and span ID.
pub fn new_trace_context(local_ip: &str) -> TraceContext {
    TraceContext {
        trace_id: new_trace_id(local_ip),
        span_id: new_span_id(local_ip),
    }
}

fn format_trace_id(ip: Option<Ipv4Addr>, now: Duration, pid: u32, random: u32) -> String {
    let ip_bits = ip.map(u32::from).unwrap_or(0);
    let seconds = (now.as_secs() & 0xffff_ffff) as u32;
    let nanos = (now.as_nanos() & 0xffff) as u16;
    let pid = (pid & 0xffff) as u16;
    let random = random & 0x00ff_ffff;
    format!("{ip_bits:08x}{seconds:08x}{nanos:04x}{pid:04x}{random:06x}{SOURCE_TAG}")
}

fn format_span_id(ip: Option<Ipv4Addr>, now: Duration, random: u32) -> String {
    let ip_bits = ip.map(u32::from).unwrap_or(0);
    let seconds = (now.as_secs() & 0xffff_ffff) as u32;
    format!("{:08x}{:08x}", ip_bits ^ seconds, random & 0x7fff_ffff)
}

/// Reduce an address string to IPv4, accepting IPv4-mapped IPv6.
fn parse_ipv4(ip: &str) -> Option<Ipv4Addr> {
    match ip.trim().parse::<IpAddr>().ok()? {
        IpAddr::V4(v4) => Some(v4),
        IpAddr::V6(v6) => v6.to_ipv4_mapped(),
    }
}

fn unix_now() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}

/// First non-loopback IPv4 address of this host's interfaces.
///
/// When several interfaces qualify, the one the OS would route outbound
/// traffic through wins; no packet is sent. Falls back to loopback when no
/// interface has a usable address.
pub fn local_ipv4() -> Ipv4Addr {
    let candidates: Vec<Ipv4Addr> = match if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces
            .iter()
            .filter_map(|iface| match iface.ip() {
                IpAddr::V4(v4) => Some(v4),
                IpAddr::V6(_) => None,
            })
            .collect(),
        Err(_) => Vec::new(),
    };
    pick_local_ipv4(&candidates, outbound_ipv4())
}

fn outbound_ipv4() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80)).ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(v4) => Some(v4),
        IpAddr::V6(_) => None,
    }
}

fn pick_local_ipv4(candidates: &[Ipv4Addr], routed: Option<Ipv4Addr>) -> Ipv4Addr {
    let usable: Vec<Ipv4Addr> = candidates
        .iter()
        .copied()
        .filter(|ip| !ip.is_loopback() && !ip.is_unspecified())
        .collect();
    match routed {
        Some(ip) if usable.contains(&ip) => ip,
        _ => usable.first().copied().unwrap_or(Ipv4Addr::LOCALHOST),
    }
}

/// Identifier source bound to one local address.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    local_ip: String,
}

impl IdGenerator {
    pub fn new(local_ip: impl Into<String>) -> Self {
        Self {
            local_ip: local_ip.into(),
        }
    }

    /// Generator for the discovered host address.
    pub fn from_host() -> Self {
        Self::new(local_ipv4().to_string())
    }

    pub fn local_ip(&self) -> &str {
        &self.local_ip
    }

    pub fn trace_id(&self) -> String {
        new_trace_id(&self.local_ip)
    }

    pub fn span_id(&self) -> String {
        new_span_id(&self.local_ip)
    }

    pub fn new_trace(&self) -> TraceContext {
        new_trace_context(&self.local_ip)
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::from_host()
    }
}
