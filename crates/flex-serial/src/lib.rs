//! Component E: the flex force-plate serial bridge.

pub mod driver;
pub mod enumerate;
pub mod fsm;

pub use driver::{run, PortConfig};
pub use enumerate::{candidate_ports, FLEX_USB_VID};
