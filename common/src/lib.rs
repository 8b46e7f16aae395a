pub mod messages;
pub mod config;
pub mod models;
pub mod utils;

pub use messages::*;
pub use config::*;
pub use utils::*;
