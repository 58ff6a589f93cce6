pub mod config;
pub mod dispatch;
pub mod metrics;
pub mod probe;
pub mod state;
pub mod transport;
