//! Readiness checks for pods, deployments and jobs

use anyhow::Result;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;

use crate::k8s::client::KubeClient;
use crate::utils::progress::WaitProgress;
use crate::utils::retry::{Poll, Poller, WaitError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Running,
    Complete,
    Failed(String),
}

/// Running with the Ready condition true, or already Succeeded
pub fn is_pod_ready(pod: &Pod) -> bool {
    let Some(status) = &pod.status else {
        return false;
    };
    match status.phase.as_deref() {
        Some("Succeeded") => true,
        Some("Running") => status
            .conditions
            .iter()
            .flatten()
            .any(|c| c.type_ == "Ready" && c.status == "True"),
        _ => false,
    }
}

/// Rollout finished: the controller has seen the latest spec and every
/// desired replica is updated and available with no old replicas left.
pub fn is_deployment_ready(deployment: &Deployment) -> bool {
    deployment_pending_reason(deployment).is_none()
}

fn deployment_pending_reason(deployment: &Deployment) -> Option<String> {
    let desired = deployment
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(1);
    let Some(status) = &deployment.status else {
        return Some("no status reported yet".to_string());
    };

    let generation = deployment.metadata.generation.unwrap_or(0);
    if status.observed_generation.unwrap_or(0) < generation {
        return Some("waiting for the rollout to be observed".to_string());
    }

    let updated = status.updated_replicas.unwrap_or(0);
    let available = status.available_replicas.unwrap_or(0);
    let total = status.replicas.unwrap_or(0);
    if updated < desired {
        return Some(format!("{} of {} replicas updated", updated, desired));
    }
    if total > updated {
        return Some(format!("{} old replicas pending termination", total - updated));
    }
    if available < desired {
        return Some(format!("{} of {} replicas available", available, desired));
    }
    None
}

pub fn job_state(job: &Job) -> JobState {
    let Some(status) = &job.status else {
        return JobState::Running;
    };

    for condition in status.conditions.iter().flatten() {
        if condition.status != "True" {
            continue;
        }
        match condition.type_.as_str() {
            "Complete" => return JobState::Complete,
            "Failed" => {
                return JobState::Failed(
                    condition
                        .reason
                        .clone()
                        .or_else(|| condition.message.clone())
                        .unwrap_or_else(|| "Failed".to_string()),
                );
            }
            _ => {}
        }
    }

    let completions = job.spec.as_ref().and_then(|s| s.completions).unwrap_or(1);
    if status.succeeded.unwrap_or(0) >= completions {
        JobState::Complete
    } else {
        JobState::Running
    }
}

/// Wait until at least one pod matches `selector` and all matching pods are
/// ready. Returns the number of pods.
pub fn wait_for_pods_ready<C: KubeClient>(
    client: &C,
    ns: &str,
    selector: &str,
    poller: &mut Poller,
    show_progress: bool,
) -> Result<usize> {
    let what = format!("pods matching '{}' in {}", selector, ns);
    let progress = WaitProgress::new(&what, "ready", show_progress);

    let result = poller.poll(&what, || {
        let pods: Vec<Pod> = client.list(ns, Some(selector))?;
        if pods.is_empty() {
            progress.update("no pods yet");
            return Ok(Poll::Pending("no matching pods".to_string()));
        }
        let not_ready: Vec<String> = pods
            .iter()
            .filter(|p| !is_pod_ready(p))
            .map(|p| p.name_any())
            .collect();
        if not_ready.is_empty() {
            Ok(Poll::Ready(pods.len()))
        } else {
            let status = format!("{}/{} ready", pods.len() - not_ready.len(), pods.len());
            progress.update(&status);
            Ok(Poll::Pending(format!("{} (waiting on {})", status, not_ready.join(", "))))
        }
    });

    finish(&progress, result)
}

pub fn wait_for_deployment_ready<C: KubeClient>(
    client: &C,
    ns: &str,
    name: &str,
    poller: &mut Poller,
    show_progress: bool,
) -> Result<()> {
    let what = format!("deployment {}/{}", ns, name);
    let progress = WaitProgress::new(&what, "ready", show_progress);

    let result = poller.poll(&what, || {
        let deployment: Option<Deployment> = client.get(ns, name)?;
        let Some(deployment) = deployment else {
            progress.update("not created yet");
            return Ok(Poll::Pending("deployment does not exist yet".to_string()));
        };
        match deployment_pending_reason(&deployment) {
            None => Ok(Poll::Ready(())),
            Some(reason) => {
                progress.update(&reason);
                Ok(Poll::Pending(reason))
            }
        }
    });

    finish(&progress, result)
}

/// A failed job ends the wait immediately
pub fn wait_for_job_complete<C: KubeClient>(
    client: &C,
    ns: &str,
    name: &str,
    poller: &mut Poller,
    show_progress: bool,
) -> Result<()> {
    let what = format!("job {}/{}", ns, name);
    let progress = WaitProgress::new(&what, "complete", show_progress);

    let result = poller.poll(&what, || {
        let job: Option<Job> = client.get(ns, name)?;
        let Some(job) = job else {
            return Ok(Poll::Pending("job does not exist yet".to_string()));
        };
        match job_state(&job) {
            JobState::Complete => Ok(Poll::Ready(())),
            JobState::Running => {
                progress.update("running");
                Ok(Poll::Pending("running".to_string()))
            }
            JobState::Failed(reason) => Err(WaitError::JobFailed {
                namespace: ns.to_string(),
                name: name.to_string(),
                reason,
            }
            .into()),
        }
    });

    finish(&progress, result)
}

fn finish<T>(progress: &WaitProgress, result: Result<T>) -> Result<T> {
    match &result {
        Ok(_) => progress.finish_success(),
        Err(e) => progress.finish_error(&e.to_string()),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::fake::FakeKube;
    use k8s_openapi::api::apps::v1::{DeploymentSpec, DeploymentStatus};
    use k8s_openapi::api::batch::v1::{JobCondition, JobSpec, JobStatus};
    use k8s_openapi::api::core::v1::{PodCondition, PodStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn meta(name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(BTreeMap::from([("app".to_string(), "jenkins".to_string())])),
            ..Default::default()
        }
    }

    fn pod(name: &str, phase: &str, ready: bool) -> Pod {
        Pod {
            metadata: meta(name),
            spec: None,
            status: Some(PodStatus {
                phase: Some(phase.to_string()),
                conditions: Some(vec![PodCondition {
                    type_: "Ready".to_string(),
                    status: if ready { "True" } else { "False" }.to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
        }
    }

    fn deployment(replicas: i32, updated: i32, available: i32, total: i32) -> Deployment {
        Deployment {
            metadata: ObjectMeta {
                generation: Some(2),
                ..meta("jenkins")
            },
            spec: Some(DeploymentSpec {
                replicas: Some(replicas),
                ..Default::default()
            }),
            status: Some(DeploymentStatus {
                observed_generation: Some(2),
                updated_replicas: Some(updated),
                available_replicas: Some(available),
                replicas: Some(total),
                ..Default::default()
            }),
        }
    }

    fn job(conditions: Vec<(&str, &str)>, succeeded: i32) -> Job {
        Job {
            metadata: meta("release"),
            spec: Some(JobSpec::default()),
            status: Some(JobStatus {
                succeeded: Some(succeeded),
                conditions: Some(
                    conditions
                        .into_iter()
                        .map(|(t, s)| JobCondition {
                            type_: t.to_string(),
                            status: s.to_string(),
                            reason: Some("BackoffLimitExceeded".to_string()),
                            ..Default::default()
                        })
                        .collect(),
                ),
                ..Default::default()
            }),
        }
    }

    fn instant_poller(timeout_secs: u64) -> Poller {
        Poller::new(Duration::from_secs(1), Duration::from_secs(timeout_secs))
            .with_sleeper(Box::new(|_| {}))
    }

    #[test]
    fn test_is_pod_ready() {
        assert!(is_pod_ready(&pod("a", "Running", true)));
        assert!(!is_pod_ready(&pod("a", "Running", false)));
        assert!(!is_pod_ready(&pod("a", "Pending", false)));
        assert!(is_pod_ready(&pod("a", "Succeeded", false)));
        assert!(!is_pod_ready(&Pod::default()));
    }

    #[test]
    fn test_is_deployment_ready() {
        assert!(is_deployment_ready(&deployment(2, 2, 2, 2)));
        assert!(!is_deployment_ready(&deployment(2, 1, 2, 2)));
        assert!(!is_deployment_ready(&deployment(2, 2, 1, 2)));
        assert!(!is_deployment_ready(&deployment(2, 2, 2, 3)));

        let mut stale = deployment(1, 1, 1, 1);
        stale.metadata.generation = Some(3);
        assert!(!is_deployment_ready(&stale));
        assert!(!is_deployment_ready(&Deployment::default()));
    }

    #[test]
    fn test_job_state() {
        assert_eq!(job_state(&job(vec![("Complete", "True")], 1)), JobState::Complete);
        assert_eq!(
            job_state(&job(vec![("Failed", "True")], 0)),
            JobState::Failed("BackoffLimitExceeded".to_string())
        );
        assert_eq!(job_state(&job(vec![("Failed", "False")], 0)), JobState::Running);
        assert_eq!(job_state(&job(vec![], 1)), JobState::Complete);
    }

    #[test]
    fn test_wait_for_pods_ready() {
        let kube = FakeKube::new();
        kube.insert("jx", pod("jenkins-0", "Running", true))
            .insert("jx", pod("jenkins-1", "Running", true));
        let count = wait_for_pods_ready(&kube, "jx", "app=jenkins", &mut instant_poller(5), false)
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_wait_for_pods_times_out() {
        let kube = FakeKube::new();
        kube.insert("jx", pod("jenkins-0", "Running", false));
        let err = wait_for_pods_ready(&kube, "jx", "app=jenkins", &mut instant_poller(3), false)
            .unwrap_err();
        assert!(err.to_string().contains("Timeout waiting for pods matching"));
        assert!(err.to_string().contains("jenkins-0"));
    }

    #[test]
    fn test_wait_for_deployment() {
        let kube = FakeKube::new();
        kube.insert("jx", deployment(1, 1, 1, 1));
        wait_for_deployment_ready(&kube, "jx", "jenkins", &mut instant_poller(5), false).unwrap();
        let missing =
            wait_for_deployment_ready(&kube, "jx", "nexus", &mut instant_poller(2), false);
        assert!(missing.is_err());
    }

    #[test]
    fn test_wait_for_failed_job() {
        let kube = FakeKube::new();
        kube.insert("jx", job(vec![("Failed", "True")], 0));
        let err = wait_for_job_complete(&kube, "jx", "release", &mut instant_poller(60), false)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<WaitError>(),
            Some(WaitError::JobFailed { .. })
        ));
    }
}
