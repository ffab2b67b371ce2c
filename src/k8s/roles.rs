//! Team roles and EnvironmentRoleBinding reconciliation
//!
//! A team hands out permissions by labelling Roles in its dev namespace with
//! `jenkins.io/kind=EnvironmentRole`. Each such Role gets an
//! EnvironmentRoleBinding listing the users holding it, and the role
//! controller copies Role + RoleBinding into every environment namespace the
//! binding's filters select.

use anyhow::{Context, Result};
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use std::collections::{BTreeMap, BTreeSet};

use crate::k8s::client::KubeClient;
use crate::k8s::crds::{
    Environment, EnvironmentRoleBinding, LABEL_KIND, Subject, VALUE_KIND_ENVIRONMENT_ROLE,
    environment_role_labels, new_environment_role_binding,
};
use crate::k8s::env::{DEV_ENVIRONMENT, filters_match, sort_environments};
use crate::utils::strings::diff_slices;

pub const USER_KIND: &str = "User";
pub const SERVICE_ACCOUNT_KIND: &str = "ServiceAccount";

/// Roles in `ns` labelled as environment roles, with their sorted names
pub fn get_team_roles<C: KubeClient>(
    client: &C,
    ns: &str,
) -> Result<(BTreeMap<String, Role>, Vec<String>)> {
    let selector = format!("{}={}", LABEL_KIND, VALUE_KIND_ENVIRONMENT_ROLE);
    let roles: Vec<Role> = client
        .list(ns, Some(&selector))
        .with_context(|| format!("Failed to list team roles in namespace {}", ns))?;

    let map: BTreeMap<String, Role> = roles
        .into_iter()
        .filter(|r| !r.name_any().is_empty())
        .map(|r| (r.name_any(), r))
        .collect();
    let names = map.keys().cloned().collect();
    Ok((map, names))
}

/// All EnvironmentRoleBindings in `ns`, with their sorted names
pub fn get_environment_roles<C: KubeClient>(
    client: &C,
    ns: &str,
) -> Result<(BTreeMap<String, EnvironmentRoleBinding>, Vec<String>)> {
    let bindings: Vec<EnvironmentRoleBinding> = client.list(ns, None).with_context(|| {
        format!(
            "Failed to retrieve EnvironmentRoleBinding list for namespace {}",
            ns
        )
    })?;

    let map: BTreeMap<String, EnvironmentRoleBinding> =
        bindings.into_iter().map(|b| (b.name_any(), b)).collect();
    let names = map.keys().cloned().collect();
    Ok((map, names))
}

/// Names of the bindings that list the given subject, sorted
pub fn user_roles_for(
    kind: &str,
    name: &str,
    bindings: &BTreeMap<String, EnvironmentRoleBinding>,
) -> Vec<String> {
    bindings
        .iter()
        .filter(|(_, b)| b.spec.subjects.iter().any(|s| s.is(kind, name)))
        .map(|(n, _)| n.clone())
        .collect()
}

/// Roles currently held by a user or service account
pub fn get_user_roles<C: KubeClient>(
    client: &C,
    ns: &str,
    kind: &str,
    name: &str,
) -> Result<Vec<String>> {
    let (bindings, _) = get_environment_roles(client, ns)?;
    Ok(user_roles_for(kind, name, &bindings))
}

/// Create an empty binding for every team role that lacks one. Returns the
/// names of the bindings created.
pub fn ensure_environment_role_bindings<C: KubeClient>(
    client: &C,
    ns: &str,
    roles: &BTreeMap<String, Role>,
    bindings: &mut BTreeMap<String, EnvironmentRoleBinding>,
) -> Result<Vec<String>> {
    let mut created = Vec::new();
    for name in roles.keys() {
        if bindings.contains_key(name) {
            continue;
        }
        let binding = new_environment_role_binding(name);
        let binding = client
            .create(ns, &binding)
            .with_context(|| format!("Failed to create EnvironmentRoleBinding {}", name))?;
        crate::log_info!("Created EnvironmentRoleBinding {}", name);
        bindings.insert(name.clone(), binding);
        created.push(name.clone());
    }
    Ok(created)
}

/// Role changes applied to one subject
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RoleChanges {
    pub removed: Vec<String>,
    pub added: Vec<String>,
}

impl RoleChanges {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty()
    }
}

/// Make `desired_roles` the exact set of bindings listing the subject.
/// `kind` is `User` or `ServiceAccount`.
pub fn update_user_roles<C: KubeClient>(
    client: &C,
    ns: &str,
    kind: &str,
    name: &str,
    desired_roles: &[String],
    roles: &BTreeMap<String, Role>,
) -> Result<RoleChanges> {
    let (mut bindings, _) = get_environment_roles(client, ns)?;
    ensure_environment_role_bindings(client, ns, roles, &mut bindings)?;

    let current = user_roles_for(kind, name, &bindings);
    let (to_remove, to_add) = diff_slices(&current, desired_roles);
    let mut changes = RoleChanges::default();

    for role in &to_remove {
        let Some(binding) = bindings.get_mut(role) else {
            crate::log_warn!(
                "Could not remove user {} kind {} from EnvironmentRoleBinding {} as it does not exist",
                name,
                kind,
                role
            );
            continue;
        };
        let before = binding.spec.subjects.len();
        binding.spec.subjects.retain(|s| !s.is(kind, name));
        if binding.spec.subjects.len() == before {
            crate::log_warn!(
                "User {} kind {} is not a Subject of EnvironmentRoleBinding {}",
                name,
                kind,
                role
            );
            continue;
        }
        *binding = client.update(ns, &*binding).with_context(|| {
            format!(
                "Failed to remove User {} kind {} as a Subject of EnvironmentRoleBinding {}",
                name, kind, role
            )
        })?;
        changes.removed.push(role.clone());
    }

    for role in &to_add {
        let Some(binding) = bindings.get(role) else {
            crate::log_warn!(
                "Could not add user {} to EnvironmentRoleBinding {} as it does not exist!",
                name,
                role
            );
            continue;
        };
        if binding.spec.subjects.iter().any(|s| s.is(kind, name)) {
            crate::log_warn!(
                "User {} kind {} is already a Subject of EnvironmentRoleBinding {}",
                name,
                kind,
                role
            );
            continue;
        }

        let latest: Option<EnvironmentRoleBinding> = client.get(ns, role)?;
        let exists = latest.is_some();
        let mut updated = latest.unwrap_or_else(|| binding.clone());
        updated.spec = binding.spec.clone();
        updated.spec.subjects.push(Subject::new(kind, name, ns));

        let result = if exists {
            client.update(ns, &updated)
        } else {
            client.create(ns, &updated)
        };
        result.with_context(|| {
            format!(
                "Failed to add User {} kind {} as a Subject of EnvironmentRoleBinding {}",
                name, kind, role
            )
        })?;
        changes.added.push(role.clone());
    }

    Ok(changes)
}

/// Drop a subject from every binding, returning the bindings changed
pub fn remove_subject_from_all<C: KubeClient>(
    client: &C,
    ns: &str,
    kind: &str,
    name: &str,
) -> Result<Vec<String>> {
    let changes = update_user_roles(client, ns, kind, name, &[], &BTreeMap::new())?;
    Ok(changes.removed)
}

/// What one reconcile pass did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub created_bindings: Vec<String>,
    pub bindings: usize,
    pub namespaces: BTreeSet<String>,
    pub role_bindings_applied: usize,
}

fn role_copy(source: &Role, namespace: &str) -> Role {
    Role {
        metadata: ObjectMeta {
            name: source.metadata.name.clone(),
            namespace: Some(namespace.to_string()),
            labels: source.metadata.labels.clone(),
            annotations: source.metadata.annotations.clone(),
            ..Default::default()
        },
        rules: source.rules.clone(),
    }
}

fn role_binding_for(binding: &EnvironmentRoleBinding, namespace: &str) -> RoleBinding {
    RoleBinding {
        metadata: ObjectMeta {
            name: Some(binding.name_any()),
            namespace: Some(namespace.to_string()),
            labels: Some(environment_role_labels()),
            ..Default::default()
        },
        role_ref: (&binding.spec.role_ref).into(),
        subjects: Some(binding.spec.subjects.iter().map(Into::into).collect()),
    }
}

/// Namespaces a binding applies to: the dev namespace plus every matching
/// environment's namespace
pub fn target_namespaces(
    binding: &EnvironmentRoleBinding,
    environments: &[Environment],
    dev_ns: &str,
) -> BTreeSet<String> {
    let mut targets = BTreeSet::from([dev_ns.to_string()]);
    for env in environments {
        let ns = &env.spec.namespace;
        if env.name_any() == DEV_ENVIRONMENT || ns.is_empty() || ns == dev_ns {
            continue;
        }
        if filters_match(&binding.spec.environments, &env.name_any()) {
            targets.insert(ns.clone());
        }
    }
    targets
}

/// One pass of the role controller over the dev namespace
pub fn reconcile_environment_role_bindings<C: KubeClient>(
    client: &C,
    dev_ns: &str,
) -> Result<ReconcileSummary> {
    let (roles, _) = get_team_roles(client, dev_ns)?;
    let (mut bindings, _) = get_environment_roles(client, dev_ns)?;
    let mut summary = ReconcileSummary {
        created_bindings: ensure_environment_role_bindings(client, dev_ns, &roles, &mut bindings)?,
        bindings: bindings.len(),
        ..Default::default()
    };

    let mut environments: Vec<Environment> = client
        .list(dev_ns, None)
        .with_context(|| format!("Failed to list Environments in namespace {}", dev_ns))?;
    sort_environments(&mut environments);

    for binding in bindings.values() {
        let role_ref = &binding.spec.role_ref;
        let source_role: Option<Role> = if role_ref.kind == "Role" {
            let role = client.get(dev_ns, &role_ref.name)?;
            if role.is_none() {
                crate::log_warn!(
                    "EnvironmentRoleBinding {} refers to Role {} which does not exist in namespace {}",
                    binding.name_any(),
                    role_ref.name,
                    dev_ns
                );
            }
            role
        } else {
            None
        };

        for ns in target_namespaces(binding, &environments, dev_ns) {
            if ns != dev_ns {
                client.ensure_namespace(&ns)?;
                if let Some(role) = &source_role {
                    client
                        .apply(&ns, &role_copy(role, &ns))
                        .with_context(|| format!("Failed to copy Role {} to {}", role_ref.name, ns))?;
                }
            }
            client
                .apply(&ns, &role_binding_for(binding, &ns))
                .with_context(|| {
                    format!("Failed to apply RoleBinding {} in {}", binding.name_any(), ns)
                })?;
            crate::log_debug!("RoleBinding {} applied in {}", binding.name_any(), ns);
            summary.role_bindings_applied += 1;
            summary.namespaces.insert(ns);
        }
    }

    Ok(summary)
}
