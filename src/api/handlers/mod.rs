pub mod odds;
pub mod system;

pub use odds::*;
pub use system::*;
