//! Command implementations

pub mod edit;
pub mod init;
pub mod list;
pub mod new;
pub mod show;
pub mod sql;
