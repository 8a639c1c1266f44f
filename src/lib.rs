pub mod auth;
pub mod config;
pub mod error;
pub mod query;
pub mod server;
pub mod sim;
pub mod store;
pub mod upload;
pub mod util;
