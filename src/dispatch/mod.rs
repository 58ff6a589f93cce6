pub mod dispatcher;
pub mod shutdown;

pub use dispatcher::*;
pub use shutdown::*;
