pub mod install;
pub mod locator;
pub mod mount;
pub mod parse;
pub mod runner;
