//! Kubernetes operations

pub mod client;
pub mod crds;
pub mod env;
pub mod kubectl;
pub mod roles;
pub mod wait;

#[cfg(test)]
pub mod fake;

pub use client::{KubeClient, Kubectl};
