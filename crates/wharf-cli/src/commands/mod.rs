//! CLI command implementations

pub mod create_user;
pub mod jsonpaths;
pub mod transfer;
