//! Turning extension specs into runnable scripts

use anyhow::{Context, Result};
use colored::Colorize;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use super::ExtensionError;
use super::repository::ExtensionParameterValue;
use crate::k8s::crds::{ExtensionGiven, ExtensionSpec};
use crate::utils::strings::{env_var_name, substitute_env_vars};

pub const TEAM_NAMESPACE_VAR: &str = "TEAM_NAMESPACE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentVariable {
    pub name: String,
    pub value: String,
}

/// A script ready to run, with the environment it needs
#[derive(Debug, Clone)]
pub struct ExtensionExecution {
    pub name: String,
    pub namespace: String,
    pub uuid: String,
    pub script: String,
    pub environment_variables: Vec<EnvironmentVariable>,
    pub given: ExtensionGiven,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExecuteOptions {
    /// Stream script output instead of capturing it
    pub verbose: bool,
    pub dry_run: bool,
}

impl ExtensionSpec {
    /// Resolve parameter values into environment variables.
    ///
    /// Configured values win over defaults. Required parameters with neither
    /// are an error; optional ones are left unset. `TEAM_NAMESPACE` is always
    /// set and, like earlier variables, can be referenced as `${NAME}`.
    pub fn to_executable(
        &self,
        values: &[ExtensionParameterValue],
        team_namespace: &str,
    ) -> Result<ExtensionExecution> {
        let mut known = HashMap::from([(TEAM_NAMESPACE_VAR.to_string(), team_namespace.to_string())]);
        let mut environment_variables = vec![EnvironmentVariable {
            name: TEAM_NAMESPACE_VAR.to_string(),
            value: team_namespace.to_string(),
        }];

        for parameter in &self.parameters {
            let configured = values
                .iter()
                .find(|v| v.name == parameter.name)
                .map(|v| v.value.as_str());
            let raw = match configured {
                Some(value) => value,
                None if !parameter.default_value.is_empty() => parameter.default_value.as_str(),
                None if parameter.required => {
                    return Err(ExtensionError::MissingParameter {
                        extension: self.fully_qualified_name(),
                        parameter: parameter.name.clone(),
                    }
                    .into());
                }
                None => continue,
            };

            let name = if parameter.environment_variable_name.is_empty() {
                env_var_name(&parameter.name)
            } else {
                parameter.environment_variable_name.clone()
            };
            let value = substitute_env_vars(raw, &known);
            known.insert(name.clone(), value.clone());
            environment_variables.push(EnvironmentVariable { name, value });
        }

        Ok(ExtensionExecution {
            name: self.name.clone(),
            namespace: self.namespace.clone(),
            uuid: self.uuid.clone(),
            script: self.script.clone(),
            environment_variables,
            given: self.given,
        })
    }
}

impl ExtensionExecution {
    pub fn fully_qualified_name(&self) -> String {
        format!("{}:{}", self.namespace, self.name)
    }

    /// `A=1, B=2`
    pub fn describe_environment(&self) -> String {
        self.environment_variables
            .iter()
            .map(|v| format!("{}={}", v.name, v.value))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// The command as it would be typed into a shell
    pub fn command_line(&self, script_path: &Path) -> String {
        let mut words: Vec<String> = self
            .environment_variables
            .iter()
            .map(|v| format!("{}={}", v.name, v.value))
            .collect();
        words.push("bash".to_string());
        words.push(script_path.display().to_string());
        shell_words::join(words)
    }

    pub fn execute(&self, options: ExecuteOptions) -> Result<()> {
        let mut file = tempfile::Builder::new()
            .prefix("jx-extension-")
            .suffix(".sh")
            .tempfile()
            .context("Failed to create a temporary script file")?;
        file.write_all(self.script.as_bytes())
            .context("Failed to write extension script")?;
        file.flush()?;

        if options.dry_run {
            println!(
                "  {} {}",
                "[DRY RUN]".cyan().bold(),
                self.command_line(file.path())
            );
            return Ok(());
        }

        crate::log_debug!("Running {} from {}", self.fully_qualified_name(), file.path().display());
        let mut cmd = Command::new("bash");
        cmd.arg(file.path());
        cmd.envs(
            self.environment_variables
                .iter()
                .map(|v| (v.name.as_str(), v.value.as_str())),
        );

        if options.verbose {
            let status = cmd
                .stdin(Stdio::null())
                .status()
                .context("Failed to run bash")?;
            if !status.success() {
                return Err(ExtensionError::ScriptFailed {
                    name: self.fully_qualified_name(),
                    status: status.to_string(),
                    stderr: String::new(),
                }
                .into());
            }
        } else {
            let output = cmd
                .stdin(Stdio::null())
                .output()
                .context("Failed to run bash")?;
            if !output.status.success() {
                return Err(ExtensionError::ScriptFailed {
                    name: self.fully_qualified_name(),
                    status: output.status.to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                }
                .into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::crds::ExtensionParameter;

    fn spec() -> ExtensionSpec {
        ExtensionSpec {
            name: "cleanup".to_string(),
            namespace: "jenkins.io".to_string(),
            uuid: "u1".to_string(),
            version: "1.0.0".to_string(),
            script: "echo $RETENTION_DAYS\n".to_string(),
            parameters: vec![
                ExtensionParameter {
                    name: "retention-days".to_string(),
                    default_value: "7".to_string(),
                    ..Default::default()
                },
                ExtensionParameter {
                    name: "target".to_string(),
                    environment_variable_name: "CLEANUP_TARGET".to_string(),
                    default_value: "${TEAM_NAMESPACE}-previews".to_string(),
                    ..Default::default()
                },
                ExtensionParameter {
                    name: "token".to_string(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        }
    }

    fn value(name: &str, value: &str) -> ExtensionParameterValue {
        ExtensionParameterValue {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn test_to_executable_defaults_and_substitution() {
        let exec = spec().to_executable(&[], "jx").unwrap();
        assert_eq!(
            exec.describe_environment(),
            "TEAM_NAMESPACE=jx, RETENTION_DAYS=7, CLEANUP_TARGET=jx-previews"
        );
        assert_eq!(exec.fully_qualified_name(), "jenkins.io:cleanup");
    }

    #[test]
    fn test_configured_values_win() {
        let exec = spec()
            .to_executable(&[value("retention-days", "30"), value("token", "abc")], "team-a")
            .unwrap();
        assert_eq!(
            exec.describe_environment(),
            "TEAM_NAMESPACE=team-a, RETENTION_DAYS=30, CLEANUP_TARGET=team-a-previews, TOKEN=abc"
        );
    }

    #[test]
    fn test_required_parameter_missing() {
        let mut spec = spec();
        spec.parameters[2].required = true;
        let err = spec.to_executable(&[], "jx").unwrap_err();
        assert!(err.to_string().contains("requires parameter token"));
    }

    #[test]
    fn test_command_line_quotes_values() {
        let exec = spec()
            .to_executable(&[value("token", "a b")], "jx")
            .unwrap();
        let line = exec.command_line(Path::new("/tmp/script.sh"));
        assert!(line.contains("TEAM_NAMESPACE=jx"));
        assert!(line.contains("TOKEN=a b'"));
        assert!(line.ends_with("bash /tmp/script.sh"));
    }

    #[test]
    fn test_execute_runs_script_with_environment() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let mut exec = spec().to_executable(&[], "jx").unwrap();
        exec.script = format!("echo \"$RETENTION_DAYS $CLEANUP_TARGET\" > '{}'\n", out.display());

        exec.execute(ExecuteOptions::default()).unwrap();
        assert_eq!(std::fs::read_to_string(&out).unwrap().trim(), "7 jx-previews");
    }

    #[test]
    fn test_execute_failure_carries_stderr() {
        let mut exec = spec().to_executable(&[], "jx").unwrap();
        exec.script = "echo broken >&2\nexit 3\n".to_string();

        let err = exec.execute(ExecuteOptions::default()).unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn test_dry_run_does_not_execute() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let mut exec = spec().to_executable(&[], "jx").unwrap();
        exec.script = format!("touch '{}'\n", out.display());

        exec.execute(ExecuteOptions { verbose: false, dry_run: true }).unwrap();
        assert!(!out.exists());
    }
}
