pub mod config;
pub mod idea;
pub mod init;
pub mod log;
pub mod project;
pub mod session;
pub mod stats;
pub mod todo;
pub mod watch;
