//! User commands

use anyhow::{Context, Result};
use kube::ResourceExt;

use crate::k8s::client::KubeClient;
use crate::k8s::crds::{User, new_user, register_crds};
use crate::k8s::roles::{USER_KIND, remove_subject_from_all};
use crate::utils::errors::JxError;
use crate::utils::prompt::confirm_destructive;
use crate::utils::strings::title_case;

#[derive(Debug, Clone, Default)]
pub struct CreateUserOptions {
    pub login: String,
    /// Defaults to the title-cased login
    pub name: Option<String>,
    pub email: Option<String>,
}

pub fn create_user<C: KubeClient>(client: &C, ns: &str, options: &CreateUserOptions) -> Result<()> {
    let login = options.login.as_str();
    if login.is_empty() {
        return Err(JxError::missing_option("login").into());
    }
    register_crds(client)?;

    if client.get::<User>(ns, login)?.is_some() {
        return Err(JxError::already_exists("User", login).into());
    }

    let name = options.name.clone().unwrap_or_else(|| title_case(login));
    let user = new_user(login, &name, options.email.as_deref().unwrap_or_default());
    client
        .create(ns, &user)
        .with_context(|| format!("Failed to create User {}", login))?;
    crate::log_info!("Created User {} ({})", login, name);
    Ok(())
}

/// Delete a user and strip it from every EnvironmentRoleBinding
pub fn delete_user<C: KubeClient>(client: &C, ns: &str, login: &str, skip_confirm: bool) -> Result<()> {
    if client.get::<User>(ns, login)?.is_none() {
        return Err(JxError::new(format!("User {} does not exist in namespace {}", login, ns))
            .suggest("List users with: jx get users")
            .into());
    }
    if !confirm_destructive(&format!("Delete User {}?", login), skip_confirm)? {
        crate::log_info!("Aborted");
        return Ok(());
    }

    let removed = remove_subject_from_all(client, ns, USER_KIND, login)?;
    for role in &removed {
        crate::log_info!("Removed User {} from EnvironmentRoleBinding {}", login, role);
    }
    client
        .delete::<User>(ns, login)
        .with_context(|| format!("Failed to delete User {}", login))?;
    crate::log_info!("Deleted User {}", login);
    Ok(())
}

pub fn get_users<C: KubeClient>(client: &C, ns: &str) -> Result<()> {
    let mut users: Vec<User> = client.list(ns, None)?;
    if users.is_empty() {
        crate::log_info!("No users found in namespace {}", ns);
        return Ok(());
    }
    users.sort_by_key(|u| u.name_any());
    print!("{}", format_users(&users));
    Ok(())
}

pub fn format_users(users: &[User]) -> String {
    let mut out = format!("{:<20} {:<24} {}\n", "LOGIN", "NAME", "EMAIL");
    for user in users {
        out.push_str(&format!(
            "{:<20} {:<24} {}\n",
            user.spec.login, user.spec.name, user.spec.email
        ));
    }
    out
}
