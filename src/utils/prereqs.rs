//! Prerequisite checking system for required tools

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PrereqError {
    #[error("Tool '{name}' not found")]
    NotFound { name: String, hint: String },
}

/// Trait for checking prerequisites
pub trait Prerequisite {
    /// Name of the prerequisite tool
    fn name(&self) -> &str;

    /// Check if the tool is available
    fn check(&self) -> Result<(), PrereqError>;

    /// Installation hint for the user
    fn install_hint(&self) -> &str;
}

/// Basic prerequisite that checks if a command exists
pub struct CommandPrereq {
    pub name: String,
    pub hint: String,
}

impl CommandPrereq {
    pub fn new(name: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hint: hint.into(),
        }
    }
}

impl Prerequisite for CommandPrereq {
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self) -> Result<(), PrereqError> {
        which::which(&self.name).map_err(|_| PrereqError::NotFound {
            name: self.name.clone(),
            hint: self.hint.clone(),
        })?;
        Ok(())
    }

    fn install_hint(&self) -> &str {
        &self.hint
    }
}

/// Outcome of checking a set of prerequisites
#[derive(Debug, Default)]
pub struct PrereqReport {
    pub found: Vec<String>,
    /// (tool, install hint)
    pub missing: Vec<(String, String)>,
}

impl PrereqReport {
    pub fn is_satisfied(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Common prerequisites for jx
pub struct CommonPrereqs;

impl CommonPrereqs {
    /// Get kubectl prerequisite
    pub fn kubectl() -> CommandPrereq {
        CommandPrereq::new(
            "kubectl",
            "Install from: https://kubernetes.io/docs/tasks/tools/",
        )
    }

    /// Get helm prerequisite
    pub fn helm() -> CommandPrereq {
        CommandPrereq::new("helm", "Install from: https://helm.sh/docs/intro/install/")
    }

    /// Get git prerequisite
    pub fn git() -> CommandPrereq {
        CommandPrereq::new("git", "Install from: https://git-scm.com/downloads")
    }

    /// Get bash prerequisite, used to run extension scripts
    pub fn bash() -> CommandPrereq {
        CommandPrereq::new("bash", "Install bash with your system package manager")
    }

    /// Check all prerequisites and return detailed results
    pub fn check_all(prereqs: &[&dyn Prerequisite]) -> PrereqReport {
        let mut report = PrereqReport::default();

        for prereq in prereqs {
            match prereq.check() {
                Ok(_) => report.found.push(prereq.name().to_string()),
                Err(PrereqError::NotFound { name, hint }) => report.missing.push((name, hint)),
            }
        }

        report
    }
}
