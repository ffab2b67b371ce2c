//! Enhanced error types with actionable suggestions

use crate::utils::retry::WaitError;
use colored::Colorize;
use thiserror::Error;

/// Enhanced error with suggestions and documentation links
#[derive(Error, Debug)]
#[error("{message}")]
pub struct JxError {
    pub message: String,
    pub suggestions: Vec<String>,
    pub docs_link: Option<String>,
}

impl JxError {
    /// Create a new error with suggestions
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestions: Vec::new(),
            docs_link: None,
        }
    }

    /// Add a suggestion to the error
    pub fn suggest(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Add a documentation link
    pub fn with_docs(mut self, link: impl Into<String>) -> Self {
        self.docs_link = Some(link.into());
        self
    }

    /// Display the error with suggestions
    pub fn display(&self) {
        eprintln!("{} {}", "error:".red().bold(), self.message);

        if !self.suggestions.is_empty() {
            eprintln!();
            eprintln!("{}", "Suggestions:".yellow().bold());
            for suggestion in &self.suggestions {
                eprintln!("  {} {}", "→".blue(), suggestion);
            }
        }

        if let Some(docs) = &self.docs_link {
            eprintln!();
            eprintln!("{} {}", "Documentation:".cyan(), docs);
        }
    }

    // Common error patterns

    /// A jenkins.io custom resource type is not registered in the cluster
    pub fn crd_not_registered(resource: &str) -> Self {
        Self::new(format!(
            "The custom resource '{}' is not registered in the cluster",
            resource
        ))
        .suggest("Register the Jenkins X resources by running any 'jx create' command")
        .suggest("Check you are pointing at the right cluster: kubectl config current-context")
        .with_docs("https://jenkins-x.io/docs/")
    }

    /// Tool not found error
    pub fn tool_not_found(tool: &str, install_hint: &str) -> Self {
        Self::new(format!("Required tool '{}' not found", tool))
            .suggest(install_hint)
            .suggest("Ensure the tool is in your PATH")
    }

    /// Permission denied error
    pub fn permission_denied(operation: &str) -> Self {
        Self::new(format!("Permission denied: {}", operation))
            .suggest("Verify you have sufficient cluster permissions")
            .suggest("Check if you need cluster-admin role to manage Roles and RoleBindings")
    }

    /// Connection timeout error
    pub fn connection_timeout(resource: &str) -> Self {
        Self::new(format!("Timeout waiting for {}", resource))
            .suggest("Check if the cluster is healthy")
            .suggest("Verify network connectivity")
            .suggest("Increase the timeout with --timeout or wait.timeout_secs")
    }

    /// A readiness wait gave up; keeps what was waited on and its last status
    pub fn wait_failed(err: &WaitError) -> Self {
        let error = Self::new(err.to_string());
        match err {
            WaitError::Timeout { .. } => error
                .suggest("Check the resource with: kubectl describe")
                .suggest("Increase the timeout with --timeout or wait.timeout_secs"),
            WaitError::JobFailed {
                namespace, name, ..
            } => error.suggest(format!(
                "Inspect the job logs with: kubectl logs job/{} -n {}",
                name, namespace
            )),
        }
    }

    /// Already exists error for named jx resources
    pub fn already_exists(kind: &str, name: &str) -> Self {
        Self::new(format!("The {} {} already exists!", kind, name))
            .suggest(format!("List existing resources with: jx get {}s", kind.to_lowercase()))
    }

    /// Missing required option
    pub fn missing_option(option: &str) -> Self {
        Self::new(format!("Missing option: --{}", option))
            .suggest("Run the command with --help to see the available options")
    }

    /// Extension repository could not be read
    pub fn extension_repository_unavailable(location: &str) -> Self {
        Self::new(format!("Unable to open Extensions Repository at {}", location))
            .suggest("Check the path passed to --extensions-repository-file")
            .suggest("Use --extensions-repository github.com/<org>/<repo> to read a published repository")
    }
}

/// Helper to display error and exit
pub fn display_error_and_exit(error: JxError) -> ! {
    error.display();
    std::process::exit(1);
}

/// Convert anyhow error to JxError when possible
pub fn enhance_error(err: anyhow::Error) -> JxError {
    if let Some(jx) = err.downcast_ref::<JxError>() {
        return JxError {
            message: jx.message.clone(),
            suggestions: jx.suggestions.clone(),
            docs_link: jx.docs_link.clone(),
        };
    }

    if let Some(wait) = err.downcast_ref::<WaitError>() {
        return JxError::wait_failed(wait);
    }

    let err_str = format!("{:#}", err);

    if err_str.contains("the server doesn't have a resource type") {
        let resource = extract_resource_type(&err_str).unwrap_or("unknown");
        return JxError::crd_not_registered(resource);
    }

    if err_str.contains("connection refused") {
        return JxError::connection_timeout("cluster");
    }

    if err_str.contains("Unauthorized") || err_str.contains("forbidden") {
        return JxError::permission_denied("cluster operation");
    }

    // Default error with generic suggestion
    JxError::new(err_str).suggest("Run with -vv for more details")
}

/// Extract the resource type from kubectl's unknown resource message
fn extract_resource_type(msg: &str) -> Option<&str> {
    if let Some(start) = msg.find("resource type \"")
        && let Some(end) = msg[start + 15..].find('"')
    {
        return Some(&msg[start + 15..start + 15 + end]);
    }
    None
}
