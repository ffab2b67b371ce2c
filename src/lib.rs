//! jx: operate Jenkins X teams, users, environments and extensions on Kubernetes

pub mod commands;
pub mod config;
pub mod extensions;
pub mod k8s;
pub mod utils;
