//! senso-firmware: DFU command + TFTP upload workflow for Senso firmware
//! updates.

pub mod backoff;
pub mod dfu;
pub mod error;
pub mod session_owner;
pub mod tftp_upload;
pub mod update;

pub use dfu::{build_dfu_frame, DfuSender, TcpDfuSender, DFU_FRAME_LEN};
pub use error::{FirmwareError, TRY_POWER_CYCLING};
pub use session_owner::SessionOwner;
pub use tftp_upload::{TftpClientUploader, TftpUploader};
pub use update::{update_firmware, UpdateRequest};
