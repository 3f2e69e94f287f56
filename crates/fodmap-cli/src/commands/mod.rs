pub mod auth_cmd;
pub mod category;
pub mod common;
pub mod completions;
pub mod config;
pub mod food;
pub mod list;
pub mod reset;
pub mod sync;
pub mod transfer;
