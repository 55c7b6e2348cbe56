//! bridge-protocol: wire types for the device-bridge daemon.
//!
//! Mirrors the JSON shapes the browser clients speak over WebSocket, plus the
//! service-discovery record shared between the discovery, session and
//! firmware-update crates. All client/server messages use a top-level `type`
//! field for discriminated (de)serialization, matching the original
//! dividat-driver wire format byte-for-byte.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Service discovery record
// ---------------------------------------------------------------------------

/// mDNS service type a `Service` was discovered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceType {
    #[serde(rename = "_sensoControl._tcp")]
    SensoControl,
    #[serde(rename = "_sensoUpdate._udp")]
    SensoUpdate,
}

impl ServiceType {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceType::SensoControl => "_sensoControl._tcp",
            ServiceType::SensoUpdate => "_sensoUpdate._udp",
        }
    }
}

/// A discovered Senso instance.
///
/// `serial` is synthesized as `UNKNOWN-N` (monotonic per scan) when the TXT
/// record carries no `ser_no=` field. `mode` is `""` when the TXT record
/// carries no `mode=` field, `"Application"`, or `"Bootloader"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub serial: String,
    pub address: String,
    pub service_type: ServiceType,
    pub mode: String,
    pub port: u16,
}

impl Service {
    /// A service is "in DFU" iff it was discovered under the update service
    /// type, or it self-reports bootloader mode.
    pub fn is_dfu(&self) -> bool {
        self.service_type == ServiceType::SensoUpdate || self.mode == "Bootloader"
    }
}

// ---------------------------------------------------------------------------
// Senso WebSocket commands (browser -> daemon)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SensoCommand {
    GetStatus,
    Connect { address: String },
    Disconnect,
    Discover { duration: u64 },
    UpdateFirmware {
        #[serde(rename = "serialNumber")]
        serial_number: Option<String>,
        image: String,
        #[serde(default)]
        address: Option<String>,
    },
}

// ---------------------------------------------------------------------------
// Senso WebSocket messages (daemon -> browser)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SensoMessage {
    Status {
        address: Option<String>,
    },
    Discovered {
        service: Service,
        ip: Vec<String>,
    },
    FirmwareUpdateProgress {
        message: String,
    },
    FirmwareUpdateSuccess {
        message: String,
    },
    FirmwareUpdateFailure {
        message: String,
    },
}

// ---------------------------------------------------------------------------
// RFID WebSocket messages (daemon -> browser)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RfidMessage {
    Identified { token: String },
    ReadersChanged { readers: Vec<String> },
}

// ---------------------------------------------------------------------------
// HTTP surface types
// ---------------------------------------------------------------------------

/// Body of `GET /`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub message: String,
    pub version: String,
    #[serde(rename = "machineId")]
    pub machine_id: String,
    pub os: String,
    pub arch: String,
}

/// Body of `GET /rfid/readers`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderList {
    pub readers: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_status_round_trips() {
        let cmd = SensoCommand::GetStatus;
        let json = serde_json::to_string(&cmd).unwrap();
        assert_eq!(json, r#"{"type":"GetStatus"}"#);
        let back: SensoCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cmd);
    }

    #[test]
    fn connect_round_trips() {
        let cmd = SensoCommand::Connect {
            address: "127.0.0.1".to_owned(),
        };
        let json = serde_json::to_string(&cmd).unwrap();
        let back: SensoCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cmd);
    }

    #[test]
    fn status_message_serializes_null_address() {
        let msg = SensoMessage::Status { address: None };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"Status","address":null}"#);
    }

    #[test]
    fn update_firmware_decodes_camel_case_fields() {
        let json = r#"{"type":"UpdateFirmware","serialNumber":"S1","image":"QUJD"}"#;
        let cmd: SensoCommand = serde_json::from_str(json).unwrap();
        match cmd {
            SensoCommand::UpdateFirmware {
                serial_number,
                image,
                address,
            } => {
                assert_eq!(serial_number.as_deref(), Some("S1"));
                assert_eq!(image, "QUJD");
                assert_eq!(address, None);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn unknown_command_type_fails_to_decode() {
        let json = r#"{"type":"DoSomethingElse"}"#;
        let result: Result<SensoCommand, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn service_is_dfu_by_service_type() {
        let svc = Service {
            serial: "1234".into(),
            address: "192.168.1.10".into(),
            service_type: ServiceType::SensoUpdate,
            mode: String::new(),
            port: 69,
        };
        assert!(svc.is_dfu());
    }

    #[test]
    fn service_is_dfu_by_bootloader_mode() {
        let svc = Service {
            serial: "5678".into(),
            address: "192.168.1.10".into(),
            service_type: ServiceType::SensoControl,
            mode: "Bootloader".into(),
            port: 55567,
        };
        assert!(svc.is_dfu());
    }

    #[test]
    fn service_application_mode_is_not_dfu() {
        let svc = Service {
            serial: "1234".into(),
            address: "192.168.1.10".into(),
            service_type: ServiceType::SensoControl,
            mode: "Application".into(),
            port: 55567,
        };
        assert!(!svc.is_dfu());
    }

    #[test]
    fn rfid_identified_round_trips() {
        let msg = RfidMessage::Identified {
            token: "04A224".into(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        let back: RfidMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }
}
