//! `jx upgrade extensions`

use anyhow::Result;
use colored::Colorize;
use std::time::Duration;

use crate::config::Settings;
use crate::extensions::execution::{ExecuteOptions, ExtensionExecution};
use crate::extensions::repository::{ExtensionConfigList, RepositoryFetcher, RepositorySource};
use crate::extensions::upgrade::ExtensionUpgrader;
use crate::k8s::client::KubeClient;
use crate::k8s::crds::register_crds;
use crate::utils::progress::with_spinner_result;

#[derive(Debug, Clone, Default)]
pub struct UpgradeExtensionsOptions {
    pub repository: Option<String>,
    pub repository_file: Option<String>,
    /// Stream extension script output
    pub verbose_scripts: bool,
    pub dry_run: bool,
}

pub fn upgrade_extensions<C: KubeClient>(
    client: &C,
    ns: &str,
    settings: &Settings,
    options: &UpgradeExtensionsOptions,
) -> Result<()> {
    register_crds(client)?;

    let source = RepositorySource::from_flags(
        options.repository.as_deref(),
        options.repository_file.as_deref(),
        &settings.extensions.repository,
    )?;
    let mut fetcher = RepositoryFetcher::new(
        Duration::from_secs(settings.extensions.http_timeout_secs),
        settings.wait.backoff(),
    )?;
    let repository = if settings.behavior.show_progress {
        with_spinner_result(
            "Reading extensions repository...",
            "Extensions repository loaded",
            || fetcher.load(&source),
        )?
    } else {
        fetcher.load(&source)?
    };
    crate::log_info!(
        "Updating to Extension Repository version {}",
        repository.version.cyan()
    );

    let config = ExtensionConfigList::load_from_config_map(client, &settings.extensions.config_map, ns)?;
    let executions = ExtensionUpgrader::new(client, ns).upgrade(&repository, &config)?;
    run_executions(
        &executions,
        ExecuteOptions {
            verbose: options.verbose_scripts,
            dry_run: options.dry_run,
        },
    )
}

fn run_executions(executions: &[ExtensionExecution], options: ExecuteOptions) -> Result<()> {
    for execution in executions {
        let env = execution.describe_environment();
        if env.is_empty() {
            crate::log_info!("Preparing {}", execution.fully_qualified_name().cyan());
        } else {
            crate::log_info!(
                "Preparing {} with environment {}",
                execution.fully_qualified_name().cyan(),
                env
            );
        }
        execution.execute(options)?;
    }
    Ok(())
}
