//! Process-level infrastructure shared by the client binaries: configuration
//! parsed from the command line and environment, and terminal logging.

pub mod config;
pub mod logging;
