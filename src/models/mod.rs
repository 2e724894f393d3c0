pub mod auth;
pub mod common;
pub mod file;
pub mod message;
pub mod task;
