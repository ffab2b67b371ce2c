//! Environment commands

use anyhow::{Context, Result, bail};
use kube::ResourceExt;

use crate::k8s::client::KubeClient;
use crate::k8s::crds::{Environment, PromotionStrategy, register_crds};
use crate::k8s::env::{new_permanent_environment, new_preview_environment, sort_environments};
use crate::utils::errors::JxError;

/// Gap left between the promotion order of consecutive environments
const ORDER_STEP: i32 = 100;

#[derive(Debug, Clone, Default)]
pub struct CreateEnvOptions {
    pub name: String,
    pub namespace: Option<String>,
    pub promotion: Option<PromotionStrategy>,
    /// Defaults to one step after the highest existing order
    pub order: Option<i32>,
    pub preview: bool,
}

pub fn parse_promotion_strategy(value: &str) -> Result<PromotionStrategy> {
    match value.to_ascii_lowercase().as_str() {
        "auto" => Ok(PromotionStrategy::Auto),
        "manual" => Ok(PromotionStrategy::Manual),
        "never" => Ok(PromotionStrategy::Never),
        other => bail!(
            "Invalid promotion strategy '{}': expected one of auto, manual, never",
            other
        ),
    }
}

/// Build the Environment `create env` would write, given the existing ones
pub fn build_environment(options: &CreateEnvOptions, existing: &[Environment]) -> Environment {
    let mut env = if options.preview {
        new_preview_environment(&options.name)
    } else {
        new_permanent_environment(&options.name)
    };
    if let Some(ns) = options.namespace.as_ref().filter(|ns| !ns.is_empty()) {
        env.spec.namespace = ns.clone();
    }
    if let Some(promotion) = options.promotion {
        env.spec.promotion_strategy = promotion;
    }
    env.spec.order = options.order.unwrap_or_else(|| {
        existing.iter().map(|e| e.spec.order).max().unwrap_or(0) + ORDER_STEP
    });
    env
}

pub fn create_env<C: KubeClient>(client: &C, ns: &str, options: &CreateEnvOptions) -> Result<()> {
    if options.name.is_empty() {
        return Err(JxError::missing_option("name").into());
    }
    register_crds(client)?;

    let existing: Vec<Environment> = client.list(ns, None)?;
    if existing.iter().any(|e| e.name_any() == options.name) {
        return Err(JxError::already_exists("Environment", &options.name).into());
    }

    let env = build_environment(options, &existing);
    client
        .create(ns, &env)
        .with_context(|| format!("Failed to create Environment {}", options.name))?;
    client.ensure_namespace(&env.spec.namespace)?;
    crate::log_info!(
        "Created Environment {} in namespace {} with promotion {:?}",
        options.name,
        env.spec.namespace,
        env.spec.promotion_strategy
    );
    Ok(())
}

pub fn get_environments<C: KubeClient>(client: &C, ns: &str) -> Result<()> {
    let mut environments: Vec<Environment> = client.list(ns, None)?;
    if environments.is_empty() {
        crate::log_info!("No environments found in namespace {}", ns);
        return Ok(());
    }
    sort_environments(&mut environments);
    print!("{}", format_environments(&environments));
    Ok(())
}

pub fn format_environments(environments: &[Environment]) -> String {
    let mut out = format!(
        "{:<16} {:<16} {:<10} {:<24} {:<6} {}\n",
        "NAME", "LABEL", "KIND", "NAMESPACE", "ORDER", "PROMOTE"
    );
    for env in environments {
        out.push_str(&format!(
            "{:<16} {:<16} {:<10} {:<24} {:<6} {:?}\n",
            env.name_any(),
            env.spec.label,
            format!("{:?}", env.spec.kind),
            env.spec.namespace,
            env.spec.order,
            env.spec.promotion_strategy
        ));
    }
    out
}
