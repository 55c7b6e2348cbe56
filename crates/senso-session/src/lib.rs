//! senso-session: the persistent Senso TCP session (component B) and the
//! process-wide Senso handle that owns it (component C).

pub mod backoff;
pub mod handle;
pub mod tcp_session;

pub use handle::{Handle, CONTROL_PORT};
