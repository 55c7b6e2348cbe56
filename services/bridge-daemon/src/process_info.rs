//! `GET /` process-info: a small, stable fingerprint of this running
//! instance, used by UI clients to confirm they're talking to a bridge
//! and to report version/platform in bug reports.

use bridge_protocol::ProcessInfo;

/// Reads the platform machine ID on Linux; falls back to a UUID kept only
/// in-process for the life of this run. No disk persistence of the fallback
/// — restarting picks a new one.
pub fn machine_id() -> String {
    for candidate in ["/etc/machine-id", "/var/lib/dbus/machine-id"] {
        if let Ok(contents) = std::fs::read_to_string(candidate) {
            let trimmed = contents.trim();
            if !trimmed.is_empty() {
                return trimmed.to_owned();
            }
        }
    }
    uuid::Uuid::new_v4().to_string()
}

/// Builds the `GET /` body from a `machine_id` resolved once at startup and
/// cached by the caller (`AppState`) for the process lifetime — re-deriving
/// it per-request would give a different `machineId` on every call on a
/// host with no platform machine-id file, since the fallback is random.
pub fn current(machine_id: &str) -> ProcessInfo {
    ProcessInfo {
        message: "dividat-bridge".to_owned(),
        version: env!("CARGO_PKG_VERSION").to_owned(),
        machine_id: machine_id.to_owned(),
        os: std::env::consts::OS.to_owned(),
        arch: std::env::consts::ARCH.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_reports_this_crates_version_and_platform() {
        let info = current("fixed-id");
        assert_eq!(info.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(info.os, std::env::consts::OS);
        assert_eq!(info.arch, std::env::consts::ARCH);
        assert_eq!(info.machine_id, "fixed-id");
    }

    #[test]
    fn machine_id_is_never_empty() {
        assert!(!machine_id().is_empty());
    }
}
