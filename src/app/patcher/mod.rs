pub mod args;
pub mod markers;
pub mod post_build;
pub mod relay;
