pub mod host;
pub mod outcome;

pub use host::*;
pub use outcome::*;
