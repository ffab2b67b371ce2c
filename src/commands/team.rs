//! Team commands

use anyhow::{Context, Result};
use kube::ResourceExt;

use crate::k8s::client::KubeClient;
use crate::k8s::crds::{Team, new_team, register_crds};
use crate::utils::errors::JxError;
use crate::utils::prompt::confirm_destructive;

/// Create a Team resource in the dev namespace
pub fn create_team<C: KubeClient>(client: &C, ns: &str, name: &str, members: &[String]) -> Result<()> {
    if name.is_empty() {
        return Err(JxError::missing_option("name").into());
    }
    register_crds(client)?;

    if client.get::<Team>(ns, name)?.is_some() {
        return Err(JxError::already_exists("Team", name).into());
    }

    client
        .create(ns, &new_team(name, members))
        .with_context(|| format!("Failed to create Team {}", name))?;
    crate::log_info!("Created Team {} in namespace {}", name, ns);
    Ok(())
}

/// Delete a Team after confirmation
pub fn delete_team<C: KubeClient>(client: &C, ns: &str, name: &str, skip_confirm: bool) -> Result<()> {
    if client.get::<Team>(ns, name)?.is_none() {
        return Err(JxError::new(format!("Team {} does not exist in namespace {}", name, ns))
            .suggest("List teams with: jx get teams")
            .into());
    }
    if !confirm_destructive(&format!("Delete Team {}?", name), skip_confirm)? {
        crate::log_info!("Aborted");
        return Ok(());
    }

    client
        .delete::<Team>(ns, name)
        .with_context(|| format!("Failed to delete Team {}", name))?;
    crate::log_info!("Deleted Team {}", name);
    Ok(())
}

pub fn get_teams<C: KubeClient>(client: &C, ns: &str) -> Result<()> {
    let mut teams: Vec<Team> = client.list(ns, None)?;
    if teams.is_empty() {
        crate::log_info!("No teams found in namespace {}", ns);
        return Ok(());
    }
    teams.sort_by_key(|t| t.name_any());
    print!("{}", format_teams(&teams));
    Ok(())
}

pub fn format_teams(teams: &[Team]) -> String {
    let mut out = format!("{:<24} {:<10} {}\n", "NAME", "STATUS", "MEMBERS");
    for team in teams {
        let status = team
            .status
            .as_ref()
            .map(|s| format!("{:?}", s.provision_status))
            .unwrap_or_default();
        out.push_str(&format!(
            "{:<24} {:<10} {}\n",
            team.name_any(),
            status,
            team.spec.members.join(", ")
        ));
    }
    out
}
