// web-server/src/lib.rs
pub mod api;
pub mod auth_gateway;
pub mod middleware;
pub mod nonce;
pub mod randomness;
pub mod session;
pub mod siwe;
pub mod state;
pub mod utils;
pub mod verifier;

pub use state::{AppState, StartupError};
