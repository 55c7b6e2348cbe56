pub const TRY_POWER_CYCLING: &str =
    "Try turning the Senso off and on, waiting 30 seconds, and running the update tool again.";

#[derive(Debug, thiserror::Error)]
pub enum FirmwareError {
    #[error("Failed to find Senso with serial number {serial}.\n{TRY_POWER_CYCLING}")]
    SerialNotFound { serial: String },

    #[error("Failed to find Senso at address {address}.\n{TRY_POWER_CYCLING}")]
    AddressNotFound { address: String },

    #[error("Expected exactly one Senso, found {count}.\n{TRY_POWER_CYCLING}")]
    AmbiguousTarget { count: usize },

    #[error("Could not send DFU command to Senso at {address}: {source}")]
    DfuFailed { address: String, source: String },

    #[error("Could not rediscover Senso in bootloader mode.\n{TRY_POWER_CYCLING}")]
    RediscoverFailed,

    #[error("Could not upload firmware over TFTP: {0}")]
    Tftp(String),

    #[error("Update was cancelled")]
    Cancelled,
}
