//! senso-discovery: mDNS discovery of Senso instances.
//!
//! Browses both the control (`_sensoControl._tcp`) and update
//! (`_sensoUpdate._udp`) service types, parses their TXT records into
//! [`bridge_protocol::Service`] values, and exposes `scan`/`list`/`find`.

pub mod browse;
pub mod scan;
pub mod txt;

pub use bridge_protocol::{Service, ServiceType};
pub use browse::{Browser, MdnsBrowser, RawEntry};
pub use scan::{by_address, by_serial, find, is_dfu, list, scan as scan_services};
pub use txt::{parse_txt, ParsedText};

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("mdns daemon: {0}")]
    Daemon(#[from] mdns_sd::Error),
}
