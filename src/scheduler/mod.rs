pub mod sequential;
pub mod shutdown;

pub use sequential::{SequentialRunError, SequentialRunner};
pub use shutdown::Shutdown;
