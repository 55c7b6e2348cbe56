//! Component F: the PC/SC reader polling engine.

pub mod apdu;
pub mod backoff;
pub mod dedup;
pub mod engine;
pub mod error;
pub mod failure;

pub use engine::run;
pub use error::RfidError;
