pub mod adb;
pub mod commands;
pub mod config;
pub mod error;
pub mod feed;
pub mod guard;
pub mod logging;
pub mod models;
pub mod patcher;
pub mod platform;
pub mod prereq;
pub mod process;
pub mod server;
pub mod session;
pub mod state;
pub mod sync;
