pub mod odds;
pub mod state;

pub use odds::*;
pub use state::*;
