//! CLI command implementations.

pub mod init;
pub mod params;
pub mod run;
