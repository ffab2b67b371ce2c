//! `jx wait` commands

use anyhow::Result;
use std::time::Duration;

use crate::config::Settings;
use crate::k8s::client::KubeClient;
use crate::k8s::wait::{wait_for_deployment_ready, wait_for_job_complete, wait_for_pods_ready};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitTarget<'a> {
    Pods { selector: &'a str },
    Deployment { name: &'a str },
    Job { name: &'a str },
}

/// Block until the target is ready. `timeout` overrides the configured wait
/// timeout.
pub fn wait<C: KubeClient>(
    client: &C,
    ns: &str,
    target: WaitTarget<'_>,
    timeout: Option<Duration>,
    settings: &Settings,
) -> Result<()> {
    let mut poller = settings.wait.poller(timeout);
    let show_progress = settings.behavior.show_progress;

    match target {
        WaitTarget::Pods { selector } => {
            let count = wait_for_pods_ready(client, ns, selector, &mut poller, show_progress)?;
            crate::log_info!("{} pod(s) matching '{}' are ready", count, selector);
        }
        WaitTarget::Deployment { name } => {
            wait_for_deployment_ready(client, ns, name, &mut poller, show_progress)?;
            crate::log_info!("Deployment {}/{} is ready", ns, name);
        }
        WaitTarget::Job { name } => {
            wait_for_job_complete(client, ns, name, &mut poller, show_progress)?;
            crate::log_info!("Job {}/{} completed", ns, name);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::fake::FakeKube;
    use k8s_openapi::api::batch::v1::{Job, JobCondition, JobStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn settings() -> Settings {
        let mut settings = Settings::default();
        settings.behavior.show_progress = false;
        settings
    }

    fn job(name: &str, condition: &str) -> Job {
        Job {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            status: Some(JobStatus {
                conditions: Some(vec![JobCondition {
                    type_: condition.to_string(),
                    status: "True".to_string(),
                    reason: Some("BackoffLimitExceeded".to_string()),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_wait_for_completed_job() {
        let kube = FakeKube::new();
        kube.insert("jx", job("migrate", "Complete"));
        wait(&kube, "jx", WaitTarget::Job { name: "migrate" }, None, &settings()).unwrap();
    }

    #[test]
    fn test_failed_job_returns_immediately() {
        let kube = FakeKube::new();
        kube.insert("jx", job("migrate", "Failed"));
        let err = wait(&kube, "jx", WaitTarget::Job { name: "migrate" }, None, &settings())
            .unwrap_err();
        assert!(err.to_string().contains("BackoffLimitExceeded"));
    }
}
