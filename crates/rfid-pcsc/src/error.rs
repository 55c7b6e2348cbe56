#[derive(Debug, thiserror::Error)]
pub enum RfidError {
    #[error("pcsc error: {0}")]
    Pcsc(#[from] pcsc::Error),
    #[error("card returned a response without a valid status trailer")]
    InvalidUidResponse,
}
