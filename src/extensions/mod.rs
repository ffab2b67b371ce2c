//! Extension repository handling, the install/upgrade walk and script execution

pub mod execution;
pub mod repository;
pub mod upgrade;

use thiserror::Error;

pub use execution::{EnvironmentVariable, ExecuteOptions, ExtensionExecution};
pub use repository::{ExtensionConfigList, ExtensionRepositoryLockList, RepositorySource};
pub use upgrade::ExtensionUpgrader;

#[derive(Error, Debug)]
pub enum ExtensionError {
    #[error("Extension {name} has an invalid version '{version}': {source}")]
    InvalidVersion {
        name: String,
        version: String,
        #[source]
        source: semver::Error,
    },

    #[error(
        "Extension {name} has changed UUID. It used to have UUID {old_uuid} and now has UUID {new_uuid}. \
         If this is correct, then you should manually remove the extension using\n\n  kubectl delete ext {kebab_name}\n\n\
         If this is not correct, then contact the extension maintainer and inform them of this change."
    )]
    UuidChanged {
        name: String,
        kebab_name: String,
        old_uuid: String,
        new_uuid: String,
    },

    #[error("Extension {0} does not have a UUID")]
    MissingUuid(String),

    #[error("Extension {extension} requires parameter {parameter} but no value or default was given")]
    MissingParameter { extension: String, parameter: String },

    #[error("Extension {0} lists one of its own ancestors as a child")]
    Cycle(String),

    #[error("Extension script for {name} failed ({status}): {stderr}")]
    ScriptFailed {
        name: String,
        status: String,
        stderr: String,
    },
}
