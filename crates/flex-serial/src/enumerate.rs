//! Serial port discovery. Prefers matching by USB VID, since that's stable
//! across platforms; falls back to a device-name prefix where the OS can't
//! report USB info (observed on some Linux setups inside containers).

use serialport::{available_ports, SerialPortType};

pub const FLEX_USB_VID: u16 = 0x16C0;

const NAME_PREFIXES: &[&str] = &["ttyACM", "cu.usbmodem"];

/// Returns candidate port names, USB-VID matches first.
pub fn candidate_ports(vid: u16) -> Vec<String> {
    let Ok(ports) = available_ports() else {
        return Vec::new();
    };

    let mut by_vid = Vec::new();
    let mut by_name = Vec::new();
    for port in ports {
        if let SerialPortType::UsbPort(info) = &port.port_type {
            if info.vid == vid {
                by_vid.push(port.port_name.clone());
                continue;
            }
        }
        if NAME_PREFIXES.iter().any(|prefix| port.port_name.contains(prefix)) {
            by_name.push(port.port_name);
        }
    }
    by_vid.extend(by_name);
    by_vid
}
