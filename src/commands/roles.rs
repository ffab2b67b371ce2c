//! Role commands and the role controller

use anyhow::Result;
use colored::Colorize;
use std::time::Duration;

use crate::k8s::client::KubeClient;
use crate::k8s::crds::EnvironmentRoleBinding;
use crate::k8s::roles::{
    ReconcileSummary, SERVICE_ACCOUNT_KIND, USER_KIND, get_environment_roles, get_team_roles,
    get_user_roles, reconcile_environment_role_bindings, update_user_roles,
};
use crate::utils::errors::JxError;

/// Team roles with the subjects bound to them
pub fn get_roles<C: KubeClient>(client: &C, ns: &str) -> Result<()> {
    let (_, role_names) = get_team_roles(client, ns)?;
    if role_names.is_empty() {
        crate::log_info!("No environment roles found in namespace {}", ns);
        return Ok(());
    }
    let (bindings, _) = get_environment_roles(client, ns)?;
    print!("{}", format_roles(&role_names, |name| bindings.get(name)));
    Ok(())
}

pub fn format_roles<'a>(
    role_names: &[String],
    binding_for: impl Fn(&str) -> Option<&'a EnvironmentRoleBinding>,
) -> String {
    let mut out = format!("{:<24} {}\n", "NAME", "SUBJECTS");
    for name in role_names {
        let subjects = binding_for(name)
            .map(|b| {
                b.spec
                    .subjects
                    .iter()
                    .map(|s| format!("{}/{}", s.kind, s.name))
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default();
        out.push_str(&format!("{:<24} {}\n", name, subjects));
    }
    out
}

#[derive(Debug, Clone, Default)]
pub struct EditUserRolesOptions {
    pub login: String,
    pub roles: Vec<String>,
    /// Treat `login` as a ServiceAccount name
    pub service_account: bool,
}

pub fn edit_user_roles<C: KubeClient>(client: &C, ns: &str, options: &EditUserRolesOptions) -> Result<()> {
    if options.login.is_empty() {
        return Err(JxError::missing_option("login").into());
    }
    let kind = if options.service_account {
        SERVICE_ACCOUNT_KIND
    } else {
        USER_KIND
    };

    if options.roles.is_empty() {
        let current = get_user_roles(client, ns, kind, &options.login)?;
        if current.is_empty() {
            crate::log_info!("{} {} has no roles", kind, options.login);
        } else {
            println!("{}", current.join("\n"));
        }
        return Ok(());
    }

    let (roles, role_names) = get_team_roles(client, ns)?;
    if let Some(unknown) = options.roles.iter().find(|r| !roles.contains_key(*r)) {
        return Err(JxError::new(format!("Unknown role {}", unknown))
            .suggest(format!("Available roles: {}", role_names.join(", ")))
            .into());
    }

    let changes = update_user_roles(client, ns, kind, &options.login, &options.roles, &roles)?;
    if changes.is_empty() {
        crate::log_info!("No role changes for {} {}", kind, options.login);
    }
    for role in &changes.removed {
        crate::log_info!("Removed {} {} from role {}", kind, options.login, role.yellow());
    }
    for role in &changes.added {
        crate::log_info!("Added {} {} to role {}", kind, options.login, role.green());
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub watch: bool,
    pub resync_interval: Duration,
}

fn log_summary(summary: &ReconcileSummary) {
    crate::log_info!(
        "Reconciled {} EnvironmentRoleBindings into {} RoleBindings across {} namespaces",
        summary.bindings,
        summary.role_bindings_applied,
        summary.namespaces.len()
    );
}

/// Reconcile once, or keep reconciling every resync interval when watching.
/// In watch mode failed passes are logged and retried on the next interval.
pub fn controller_role<C: KubeClient>(client: &C, ns: &str, options: &ControllerOptions) -> Result<()> {
    if !options.watch {
        let summary = reconcile_environment_role_bindings(client, ns)?;
        log_summary(&summary);
        return Ok(());
    }

    crate::log_info!(
        "Watching EnvironmentRoleBindings in {} (resync every {}s)",
        ns,
        options.resync_interval.as_secs()
    );
    loop {
        match reconcile_environment_role_bindings(client, ns) {
            Ok(summary) => log_summary(&summary),
            Err(e) => crate::log_error!("Role reconcile failed: {:#}", e),
        }
        std::thread::sleep(options.resync_interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::crds::{Subject, environment_role_labels, new_environment_role_binding};
    use crate::k8s::fake::FakeKube;
    use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn team_role(name: &str) -> Role {
        Role {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(environment_role_labels()),
                ..Default::default()
            },
            rules: None,
        }
    }

    fn setup() -> FakeKube {
        let kube = FakeKube::new();
        kube.insert("jx", team_role("viewer"))
            .insert("jx", team_role("committer"));
        kube
    }

    #[test]
    fn test_edit_user_roles_adds_and_removes() {
        let kube = setup();
        let mut viewer = new_environment_role_binding("viewer");
        viewer.spec.subjects.push(Subject::new(USER_KIND, "jane", "jx"));
        kube.insert("jx", viewer);

        edit_user_roles(
            &kube,
            "jx",
            &EditUserRolesOptions {
                login: "jane".to_string(),
                roles: vec!["committer".to_string()],
                service_account: false,
            },
        )
        .unwrap();

        assert_eq!(
            get_user_roles(&kube, "jx", USER_KIND, "jane").unwrap(),
            vec!["committer".to_string()]
        );
    }

    #[test]
    fn test_edit_user_roles_unknown_role() {
        let kube = setup();
        let err = edit_user_roles(
            &kube,
            "jx",
            &EditUserRolesOptions {
                login: "jane".to_string(),
                roles: vec!["admin".to_string()],
                service_account: false,
            },
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Unknown role admin");
    }

    #[test]
    fn test_service_account_kind() {
        let kube = setup();
        edit_user_roles(
            &kube,
            "jx",
            &EditUserRolesOptions {
                login: "bot".to_string(),
                roles: vec!["viewer".to_string()],
                service_account: true,
            },
        )
        .unwrap();
        assert_eq!(
            get_user_roles(&kube, "jx", SERVICE_ACCOUNT_KIND, "bot").unwrap(),
            vec!["viewer".to_string()]
        );
        assert!(get_user_roles(&kube, "jx", USER_KIND, "bot").unwrap().is_empty());
    }

    #[test]
    fn test_controller_single_pass() {
        let kube = setup();
        controller_role(
            &kube,
            "jx",
            &ControllerOptions {
                watch: false,
                resync_interval: Duration::from_secs(60),
            },
        )
        .unwrap();

        let bindings: Vec<RoleBinding> = kube.list("jx", None).unwrap();
        assert_eq!(bindings.len(), 2);
    }

    #[test]
    fn test_format_roles() {
        let mut viewer = new_environment_role_binding("viewer");
        viewer.spec.subjects.push(Subject::new(USER_KIND, "jane", "jx"));
        let names = vec!["committer".to_string(), "viewer".to_string()];

        let out = format_roles(&names, |n| (n == "viewer").then_some(&viewer));
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines[1].trim_end(), "committer");
        assert!(lines[2].ends_with("User/jane"));
    }
}
