//! Typed access to cluster objects through kubectl

use anyhow::{Context, Result, anyhow};
use kube::Resource;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

use crate::k8s::kubectl;
use crate::utils::dryrun;

/// Anything we read from or write to the cluster: k8s-openapi types and our
/// own custom resources alike.
pub trait Object: Resource<DynamicType = ()> + Serialize + DeserializeOwned + Clone {}

impl<K> Object for K where K: Resource<DynamicType = ()> + Serialize + DeserializeOwned + Clone {}

/// Cluster operations the commands are written against. An empty namespace
/// means the object is cluster scoped.
pub trait KubeClient {
    fn list<K: Object>(&self, namespace: &str, label_selector: Option<&str>) -> Result<Vec<K>>;

    /// `None` when the object does not exist
    fn get<K: Object>(&self, namespace: &str, name: &str) -> Result<Option<K>>;

    /// Fails if the object already exists
    fn create<K: Object>(&self, namespace: &str, obj: &K) -> Result<K>;

    /// Fails if the object does not exist
    fn update<K: Object>(&self, namespace: &str, obj: &K) -> Result<K>;

    /// Create or replace
    fn apply<K: Object>(&self, namespace: &str, obj: &K) -> Result<()>;

    /// Deleting a missing object is not an error
    fn delete<K: Object>(&self, namespace: &str, name: &str) -> Result<()>;

    fn ensure_namespace(&self, name: &str) -> Result<()>;
}

/// `<plural>[.<group>]` as understood by kubectl
pub fn resource_name<K: Object>() -> String {
    kubectl::resource_arg(&K::plural(&()), &K::group(&()))
}

/// Name of an object, or an error for objects built without one
pub fn object_name<K: Object>(obj: &K) -> Result<String> {
    obj.meta()
        .name
        .clone()
        .ok_or_else(|| anyhow!("{} has no metadata.name", K::kind(&())))
}

fn with_namespace<K: Object>(obj: &K, namespace: &str) -> K {
    let mut copy = obj.clone();
    if !namespace.is_empty() {
        copy.meta_mut().namespace = Some(namespace.to_string());
    }
    copy
}

#[derive(serde::Deserialize)]
struct ObjectList<K> {
    #[serde(default = "Vec::new")]
    items: Vec<K>,
}

/// `KubeClient` backed by the kubectl binary
#[derive(Debug, Clone, Default)]
pub struct Kubectl {
    kubeconfig: Option<PathBuf>,
}

impl Kubectl {
    pub fn new(kubeconfig: Option<PathBuf>) -> Self {
        Self { kubeconfig }
    }

    fn kubeconfig(&self) -> Option<&Path> {
        self.kubeconfig.as_deref()
    }

    fn write_json<K: Object>(&self, verb: &str, namespace: &str, obj: &K) -> Result<K> {
        let obj = with_namespace(obj, namespace);
        let name = object_name(&obj)?;
        let resource = resource_name::<K>();
        let action = format!("kubectl {} {}/{} -n {}", verb, resource, name, namespace);

        dryrun::exec_unless_dry_run_with_default(&action, obj.clone(), || {
            let json = serde_json::to_string(&obj)
                .with_context(|| format!("Failed to serialize {}/{}", resource, name))?;
            let mut args = vec![verb, "-f", "-", "-o", "json"];
            kubectl::push_namespace(&mut args, namespace);
            let out = kubectl::run_kubectl_with_input(&args, &json, self.kubeconfig())
                .with_context(|| format!("Failed to {} {}/{}", verb, resource, name))?;
            serde_json::from_str(&out)
                .with_context(|| format!("Failed to parse kubectl {} output", verb))
        })
    }
}

impl KubeClient for Kubectl {
    fn list<K: Object>(&self, namespace: &str, label_selector: Option<&str>) -> Result<Vec<K>> {
        let resource = resource_name::<K>();
        let mut args = vec!["get", resource.as_str(), "-o", "json"];
        kubectl::push_namespace(&mut args, namespace);
        if let Some(selector) = label_selector {
            args.push("-l");
            args.push(selector);
        }

        let out = kubectl::run_kubectl_output(&args, self.kubeconfig())?;
        let list: ObjectList<K> = serde_json::from_str(&out)
            .with_context(|| format!("Failed to parse {} list", resource))?;
        Ok(list.items)
    }

    fn get<K: Object>(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        let resource = resource_name::<K>();
        let mut args = vec!["get", resource.as_str(), name, "-o", "json"];
        kubectl::push_namespace(&mut args, namespace);

        match kubectl::run_kubectl_output(&args, self.kubeconfig()) {
            Ok(out) => {
                let obj = serde_json::from_str(&out)
                    .with_context(|| format!("Failed to parse {}/{}", resource, name))?;
                Ok(Some(obj))
            }
            Err(e) if kubectl::is_not_found(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn create<K: Object>(&self, namespace: &str, obj: &K) -> Result<K> {
        self.write_json("create", namespace, obj)
    }

    fn update<K: Object>(&self, namespace: &str, obj: &K) -> Result<K> {
        self.write_json("replace", namespace, obj)
    }

    fn apply<K: Object>(&self, namespace: &str, obj: &K) -> Result<()> {
        let obj = with_namespace(obj, namespace);
        let name = object_name(&obj)?;
        let resource = resource_name::<K>();

        dryrun::exec_unless_dry_run(&format!("kubectl apply {}/{}", resource, name), || {
            let yaml = serde_yaml::to_string(&obj)
                .with_context(|| format!("Failed to serialize {}/{}", resource, name))?;
            kubectl::apply_yaml(&yaml, self.kubeconfig())
                .with_context(|| format!("Failed to apply {}/{}", resource, name))
        })
    }

    fn delete<K: Object>(&self, namespace: &str, name: &str) -> Result<()> {
        let resource = resource_name::<K>();
        dryrun::exec_unless_dry_run(&format!("kubectl delete {}/{}", resource, name), || {
            let mut args = vec!["delete", resource.as_str(), name, "--ignore-not-found"];
            kubectl::push_namespace(&mut args, namespace);
            kubectl::run_kubectl_output(&args, self.kubeconfig())?;
            Ok(())
        })
    }

    fn ensure_namespace(&self, name: &str) -> Result<()> {
        let exists = kubectl::run_kubectl_output(&["get", "namespace", name], self.kubeconfig());
        match exists {
            Ok(_) => Ok(()),
            Err(e) if kubectl::is_not_found(&e) => {
                dryrun::exec_unless_dry_run(&format!("kubectl create namespace {}", name), || {
                    crate::log_info!("Creating namespace {}", name);
                    kubectl::run_kubectl(&["create", "namespace", name], self.kubeconfig())
                })
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::Deployment;
    use k8s_openapi::api::core::v1::Pod;
    use k8s_openapi::api::rbac::v1::RoleBinding;

    #[test]
    fn test_resource_names() {
        assert_eq!(resource_name::<Pod>(), "pods");
        assert_eq!(resource_name::<Deployment>(), "deployments.apps");
        assert_eq!(
            resource_name::<RoleBinding>(),
            "rolebindings.rbac.authorization.k8s.io"
        );
    }

    #[test]
    fn test_object_name_required() {
        let pod = Pod::default();
        assert!(object_name(&pod).is_err());
    }

    #[test]
    fn test_with_namespace() {
        let pod = Pod::default();
        let namespaced = with_namespace(&pod, "jx");
        assert_eq!(namespaced.metadata.namespace.as_deref(), Some("jx"));
        let cluster = with_namespace(&pod, "");
        assert!(cluster.metadata.namespace.is_none());
    }
}
