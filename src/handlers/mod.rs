pub mod config;
pub mod tunings;

pub use config::*;
pub use tunings::*;
