//! Install and upgrade walk over the extension tree

use anyhow::{Context, Result};
use colored::Colorize;
use semver::Version;
use std::collections::{BTreeMap, HashMap};

use super::ExtensionError;
use super::execution::ExtensionExecution;
use super::repository::{ExtensionConfig, ExtensionConfigList, ExtensionRepositoryLockList};
use crate::k8s::client::KubeClient;
use crate::k8s::crds::{Extension, ExtensionSpec, ExtensionWhen};

/// Log indent for children of a newly added extension
const ADD_INDENT: usize = 7;
/// Log indent for children of an upgraded extension
const UPGRADE_INDENT: usize = 10;

fn parse_version(spec: &ExtensionSpec, version: &str) -> Result<Version> {
    Version::parse(version).map_err(|source| {
        ExtensionError::InvalidVersion {
            name: spec.fully_qualified_name(),
            version: version.to_string(),
            source,
        }
        .into()
    })
}

/// Brings the Extension resources in a namespace up to date with a repository
pub struct ExtensionUpgrader<'a, C: KubeClient> {
    client: &'a C,
    namespace: String,
}

struct Walk<'w> {
    installed: BTreeMap<String, Extension>,
    lookup: HashMap<&'w str, &'w ExtensionSpec>,
    path: Vec<String>,
}

impl<'a, C: KubeClient> ExtensionUpgrader<'a, C> {
    pub fn new(client: &'a C, namespace: &str) -> Self {
        Self {
            client,
            namespace: namespace.to_string(),
        }
    }

    /// Installed extensions keyed by UUID
    pub fn installed_extensions(&self) -> Result<BTreeMap<String, Extension>> {
        let extensions: Vec<Extension> = self
            .client
            .list(&self.namespace, None)
            .context("Failed to list installed extensions")?;

        let mut installed = BTreeMap::new();
        for ext in extensions {
            if ext.spec.uuid.is_empty() {
                return Err(ExtensionError::MissingUuid(ext.spec.fully_qualified_name()).into());
            }
            installed.insert(ext.spec.uuid.clone(), ext);
        }
        Ok(installed)
    }

    /// Upsert every repository extension the team has configured, returning
    /// the scripts that need to run in the order they were queued.
    pub fn upgrade(
        &self,
        repository: &ExtensionRepositoryLockList,
        config: &ExtensionConfigList,
    ) -> Result<Vec<ExtensionExecution>> {
        let mut walk = Walk {
            installed: self.installed_extensions()?,
            lookup: repository
                .extensions
                .iter()
                .map(|e| (e.uuid.as_str(), e))
                .collect(),
            path: Vec::new(),
        };

        let mut executions = Vec::new();
        for spec in &repository.extensions {
            if let Some(ext_config) = config.find(&spec.name, &spec.namespace) {
                executions.extend(self.upsert(spec, &mut walk, ext_config, 0, 0)?);
            }
        }
        Ok(executions)
    }

    fn upsert(
        &self,
        spec: &ExtensionSpec,
        walk: &mut Walk<'_>,
        config: &ExtensionConfig,
        depth: usize,
        initial_indent: usize,
    ) -> Result<Vec<ExtensionExecution>> {
        let mut result = Vec::new();
        let mut initial_indent = initial_indent;
        let indent = " ".repeat(depth.saturating_sub(1) * 2 + initial_indent);
        let fqn = spec.fully_qualified_name();
        let new_version = parse_version(spec, &spec.version)?;

        match walk.installed.get(&spec.uuid).cloned() {
            None => {
                let kebab_name = spec.fully_qualified_kebab_name();
                if let Some(clash) = self.client.get::<Extension>(&self.namespace, &kebab_name)? {
                    return Err(ExtensionError::UuidChanged {
                        name: fqn,
                        kebab_name,
                        old_uuid: clash.spec.uuid,
                        new_uuid: spec.uuid.clone(),
                    }
                    .into());
                }

                let created = self
                    .client
                    .create(&self.namespace, &Extension::new(&kebab_name, spec.clone()))
                    .with_context(|| format!("Failed to create extension {}", fqn))?;
                if depth == 0 {
                    initial_indent = ADD_INDENT;
                    crate::log_info!("Adding {} version {}", fqn.cyan(), new_version.to_string().cyan());
                } else {
                    crate::log_info!("{}└ {} version {}", indent, fqn.cyan(), spec.version.cyan());
                }
                walk.installed.insert(spec.uuid.clone(), created);

                if spec.runs_on(ExtensionWhen::Install) {
                    result.push(spec.to_executable(&config.parameters, &self.namespace)?);
                }
            }
            Some(mut existing) if !existing.spec.version.is_empty() => {
                let existing_version = parse_version(spec, &existing.spec.version)?;
                if existing_version < new_version {
                    existing.spec = spec.clone();
                    let updated = self
                        .client
                        .update(&self.namespace, &existing)
                        .with_context(|| format!("Failed to update extension {}", fqn))?;
                    walk.installed.insert(spec.uuid.clone(), updated);

                    if spec.runs_on(ExtensionWhen::Upgrade) {
                        result.push(spec.to_executable(&config.parameters, &self.namespace)?);
                    }
                    if depth == 0 {
                        initial_indent = UPGRADE_INDENT;
                        crate::log_info!(
                            "Upgrading {} from {} to {}",
                            fqn.cyan(),
                            existing_version.to_string().cyan(),
                            new_version.to_string().cyan()
                        );
                    } else {
                        crate::log_info!("{}└ {} version {}", indent, fqn.cyan(), spec.version.cyan());
                    }
                }
            }
            Some(_) => {}
        }

        walk.path.push(spec.uuid.clone());
        for child_uuid in &spec.children {
            if walk.path.iter().any(|u| u == child_uuid) {
                return Err(ExtensionError::Cycle(fqn).into());
            }
            let Some(child) = walk.lookup.get(child_uuid.as_str()).copied() else {
                crate::log_warn!("Unable to locate extension {} (child of {})", child_uuid, fqn);
                continue;
            };
            result.extend(self.upsert(child, walk, config, depth + 1, initial_indent)?);
        }
        walk.path.pop();

        Ok(result)
    }
}
