//! Command implementations for the jx CLI

pub mod env;
pub mod extensions;
pub mod roles;
pub mod team;
pub mod user;
pub mod wait;
