//! Kubectl wrapper utilities

use anyhow::{Context, Result, anyhow};
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

fn kubectl_command(kubeconfig: Option<&Path>) -> Command {
    let mut cmd = Command::new("kubectl");

    if let Some(kc) = kubeconfig {
        cmd.env("KUBECONFIG", kc);
    }

    cmd
}

/// Run a kubectl command with optional kubeconfig
pub fn run_kubectl(args: &[&str], kubeconfig: Option<&Path>) -> Result<()> {
    crate::log_debug!("kubectl {}", args.join(" "));

    let status = kubectl_command(kubeconfig)
        .args(args)
        .status()
        .context("Failed to run kubectl command")?;

    if !status.success() {
        return Err(anyhow!("kubectl command failed: {}", args.join(" ")));
    }

    Ok(())
}

/// Run kubectl and capture output
pub fn run_kubectl_output(args: &[&str], kubeconfig: Option<&Path>) -> Result<String> {
    crate::log_debug!("kubectl {}", args.join(" "));

    let output = kubectl_command(kubeconfig)
        .args(args)
        .output()
        .context("Failed to run kubectl command")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!(
            "kubectl command failed: {}\n{}",
            args.join(" "),
            stderr.trim_end()
        ));
    }

    Ok(String::from_utf8(output.stdout)?)
}

/// Run kubectl with `input` on stdin and capture stdout
pub fn run_kubectl_with_input(
    args: &[&str],
    input: &str,
    kubeconfig: Option<&Path>,
) -> Result<String> {
    crate::log_debug!("kubectl {} (with stdin)", args.join(" "));

    let mut child = kubectl_command(kubeconfig)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to spawn kubectl {}", args.join(" ")))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(input.as_bytes())
            .context("Failed to write manifest to kubectl")?;
    }

    let output = child
        .wait_with_output()
        .context("Failed to wait for kubectl")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!(
            "kubectl command failed: {}\n{}",
            args.join(" "),
            stderr.trim_end()
        ));
    }

    Ok(String::from_utf8(output.stdout)?)
}

/// Apply a YAML manifest from string
pub fn apply_yaml(yaml: &str, kubeconfig: Option<&Path>) -> Result<()> {
    run_kubectl_with_input(&["apply", "-f", "-"], yaml, kubeconfig)
        .context("kubectl apply failed")?;
    Ok(())
}

/// True when the error came from kubectl reporting a missing object
pub fn is_not_found(err: &anyhow::Error) -> bool {
    let msg = format!("{:#}", err);
    msg.contains("(NotFound)") || (msg.contains("NotFound") && msg.contains("not found"))
}

/// Kubectl's resource argument: `<plural>` for the core group, otherwise
/// `<plural>.<group>`
pub fn resource_arg(plural: &str, group: &str) -> String {
    if group.is_empty() {
        plural.to_string()
    } else {
        format!("{}.{}", plural, group)
    }
}

/// Append `-n <namespace>` unless the resource is cluster scoped
pub fn push_namespace<'a>(args: &mut Vec<&'a str>, namespace: &'a str) {
    if !namespace.is_empty() {
        args.push("-n");
        args.push(namespace);
    }
}
