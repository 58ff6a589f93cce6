pub mod icmp;
pub mod socket;

pub use icmp::*;
pub use socket::*;
