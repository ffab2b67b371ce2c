//! Jenkins X custom resources (`jenkins.io/v1`)

use anyhow::{Context, Result};
use k8s_openapi::api::rbac::v1 as rbacv1;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::{CustomResource, CustomResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::k8s::client::KubeClient;

/// Label carrying the jx kind of a plain Kubernetes object
pub const LABEL_KIND: &str = "jenkins.io/kind";

/// `LABEL_KIND` value marking a Role that teams can hand out
pub const VALUE_KIND_ENVIRONMENT_ROLE: &str = "EnvironmentRole";

pub const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
pub enum PromotionStrategy {
    Auto,
    #[default]
    Manual,
    Never,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
pub enum EnvironmentKind {
    #[default]
    Permanent,
    Preview,
    Test,
    Development,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct EnvironmentRepository {
    #[serde(default)]
    pub url: String,
    #[serde(default, rename = "ref")]
    pub git_ref: String,
}

/// A deployment target such as staging, production or a pull request preview
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "jenkins.io",
    version = "v1",
    kind = "Environment",
    plural = "environments",
    shortname = "env",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentSpec {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub cluster: String,
    #[serde(default)]
    pub promotion_strategy: PromotionStrategy,
    #[serde(default)]
    pub order: i32,
    #[serde(default)]
    pub kind: EnvironmentKind,
    #[serde(default)]
    pub source: EnvironmentRepository,
    #[serde(default, rename = "pullRequestURL", skip_serializing_if = "String::is_empty")]
    pub pull_request_url: String,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
pub enum TeamProvisionStatus {
    #[default]
    Pending,
    Complete,
    Error,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TeamStatus {
    #[serde(default)]
    pub provision_status: TeamProvisionStatus,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// A team waiting to be provisioned with its own dev namespace
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "jenkins.io",
    version = "v1",
    kind = "Team",
    plural = "teams",
    status = "TeamStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct TeamSpec {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub members: Vec<String>,
}

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "jenkins.io",
    version = "v1",
    kind = "User",
    plural = "users",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct UserSpec {
    #[serde(default)]
    pub login: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub avatar_url: String,
}

/// RBAC subject as stored on an EnvironmentRoleBinding
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_group: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoleRef {
    #[serde(default)]
    pub api_group: String,
    pub kind: String,
    pub name: String,
}

/// Which environments a binding applies to, by environment name
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct EnvironmentFilter {
    #[serde(default)]
    pub includes: Vec<String>,
    #[serde(default)]
    pub excludes: Vec<String>,
}

/// A RoleBinding that is replicated into every matching environment namespace
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "jenkins.io",
    version = "v1",
    kind = "EnvironmentRoleBinding",
    plural = "environmentrolebindings",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentRoleBindingSpec {
    #[serde(default)]
    pub subjects: Vec<Subject>,
    pub role_ref: RoleRef,
    #[serde(default)]
    pub environments: Vec<EnvironmentFilter>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ExtensionWhen {
    Pre,
    Post,
    Install,
    Upgrade,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
pub enum ExtensionGiven {
    #[default]
    Always,
    Failure,
    Success,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionParameter {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub environment_variable_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub default_value: String,
    #[serde(default)]
    pub required: bool,
}

/// An installable extension; also the entry format of the extension
/// repository lock file
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "jenkins.io",
    version = "v1",
    kind = "Extension",
    plural = "extensions",
    shortname = "ext",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionSpec {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub uuid: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub script: String,
    #[serde(default)]
    pub when: Vec<ExtensionWhen>,
    #[serde(default)]
    pub given: ExtensionGiven,
    #[serde(default)]
    pub parameters: Vec<ExtensionParameter>,
    /// UUIDs of the extensions installed alongside this one
    #[serde(default)]
    pub children: Vec<String>,
}

impl ExtensionSpec {
    /// `<namespace>:<name>`
    pub fn fully_qualified_name(&self) -> String {
        format!("{}:{}", self.namespace, self.name)
    }

    /// `<namespace>-<name>` lower-cased, usable as an object name
    pub fn fully_qualified_kebab_name(&self) -> String {
        format!("{}-{}", self.namespace, self.name).to_lowercase()
    }

    pub fn runs_on(&self, when: ExtensionWhen) -> bool {
        self.when.contains(&when)
    }
}

impl Subject {
    pub fn new(kind: &str, name: &str, namespace: &str) -> Self {
        Self {
            kind: kind.to_string(),
            name: name.to_string(),
            namespace: Some(namespace.to_string()).filter(|ns| !ns.is_empty()),
            api_group: None,
        }
    }

    pub fn is(&self, kind: &str, name: &str) -> bool {
        self.kind == kind && self.name == name
    }
}

impl From<&Subject> for rbacv1::Subject {
    fn from(s: &Subject) -> Self {
        rbacv1::Subject {
            api_group: s.api_group.clone(),
            kind: s.kind.clone(),
            name: s.name.clone(),
            namespace: s.namespace.clone(),
        }
    }
}

impl From<&RoleRef> for rbacv1::RoleRef {
    fn from(r: &RoleRef) -> Self {
        rbacv1::RoleRef {
            api_group: r.api_group.clone(),
            kind: r.kind.clone(),
            name: r.name.clone(),
        }
    }
}

/// Labels marking an object as belonging to the environment role machinery
pub fn environment_role_labels() -> BTreeMap<String, String> {
    BTreeMap::from([(LABEL_KIND.to_string(), VALUE_KIND_ENVIRONMENT_ROLE.to_string())])
}

/// Binding for `role_name` with no subjects and no environment filter
pub fn new_environment_role_binding(role_name: &str) -> EnvironmentRoleBinding {
    let mut binding = EnvironmentRoleBinding::new(
        role_name,
        EnvironmentRoleBindingSpec {
            subjects: Vec::new(),
            role_ref: RoleRef {
                api_group: RBAC_API_GROUP.to_string(),
                kind: "Role".to_string(),
                name: role_name.to_string(),
            },
            environments: Vec::new(),
        },
    );
    binding.metadata.labels = Some(environment_role_labels());
    binding
}

pub fn new_team(name: &str, members: &[String]) -> Team {
    let mut team = Team::new(
        name,
        TeamSpec {
            label: name.to_string(),
            members: members.to_vec(),
        },
    );
    team.status = Some(TeamStatus::default());
    team
}

pub fn new_user(login: &str, name: &str, email: &str) -> User {
    User::new(
        login,
        UserSpec {
            login: login.to_string(),
            name: name.to_string(),
            email: email.to_string(),
            ..Default::default()
        },
    )
}

/// Definitions for every custom resource jx reads or writes
pub fn definitions() -> Vec<CustomResourceDefinition> {
    vec![
        Environment::crd(),
        Team::crd(),
        User::crd(),
        EnvironmentRoleBinding::crd(),
        Extension::crd(),
    ]
}

/// Register (or refresh) the custom resource definitions in the cluster
pub fn register_crds<C: KubeClient>(client: &C) -> Result<()> {
    for crd in definitions() {
        let name = crd.metadata.name.clone().unwrap_or_default();
        crate::log_debug!("Registering CRD {}", name);
        client
            .apply("", &crd)
            .with_context(|| format!("Failed to register CRD {}", name))?;
    }
    Ok(())
}
