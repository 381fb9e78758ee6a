//! CLI subcommand implementations

pub mod campaign;
pub mod consolidate;
pub mod init;
pub mod next_url;
pub mod serve;
