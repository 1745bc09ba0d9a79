pub mod config;
pub mod duration;
pub mod engine;
pub mod error;
pub mod models;
pub mod portal;
pub mod session;
