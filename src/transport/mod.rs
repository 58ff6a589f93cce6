pub mod engine;
pub mod icmp;
pub mod pending;
pub mod worker;

pub use engine::*;
pub use icmp::*;
pub use pending::*;
pub use worker::*;
