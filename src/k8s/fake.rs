//! In-memory `KubeClient` used by the unit tests

use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};

use crate::k8s::client::{KubeClient, Object, object_name, resource_name};

type Key = (String, String, String);

/// Objects are stored as JSON keyed by (resource, namespace, name), the same
/// shape kubectl hands back.
#[derive(Debug, Default)]
pub struct FakeKube {
    objects: RefCell<BTreeMap<Key, Value>>,
    namespaces: RefCell<BTreeSet<String>>,
    writes: Cell<usize>,
}

fn key<K: Object>(namespace: &str, name: &str) -> Key {
    (resource_name::<K>(), namespace.to_string(), name.to_string())
}

fn matches_selector(value: &Value, selector: Option<&str>) -> bool {
    let Some(selector) = selector else {
        return true;
    };
    let labels = value.pointer("/metadata/labels");
    selector.split(',').filter(|s| !s.is_empty()).all(|term| {
        match term.split_once('=') {
            Some((k, v)) => labels
                .and_then(|l| l.get(k))
                .and_then(Value::as_str)
                .is_some_and(|actual| actual == v),
            None => labels.and_then(|l| l.get(term)).is_some(),
        }
    })
}

impl FakeKube {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object without counting it as a write
    pub fn insert<K: Object>(&self, namespace: &str, obj: K) -> &Self {
        let mut obj = obj;
        obj.meta_mut().namespace = Some(namespace.to_string()).filter(|ns| !ns.is_empty());
        let name = obj.meta().name.clone().unwrap_or_default();
        let value = serde_json::to_value(&obj).expect("fake objects serialize");
        self.objects.borrow_mut().insert(key::<K>(namespace, &name), value);
        self
    }

    pub fn namespaces(&self) -> Vec<String> {
        self.namespaces.borrow().iter().cloned().collect()
    }

    /// Number of create/update/apply/delete calls made so far
    pub fn writes(&self) -> usize {
        self.writes.get()
    }

    fn store<K: Object>(&self, namespace: &str, obj: &K) -> Result<K> {
        let mut obj = obj.clone();
        if !namespace.is_empty() {
            obj.meta_mut().namespace = Some(namespace.to_string());
        }
        let name = object_name(&obj)?;
        let value = serde_json::to_value(&obj).context("serialize")?;
        self.objects.borrow_mut().insert(key::<K>(namespace, &name), value);
        self.writes.set(self.writes.get() + 1);
        Ok(obj)
    }
}

impl KubeClient for FakeKube {
    fn list<K: Object>(&self, namespace: &str, label_selector: Option<&str>) -> Result<Vec<K>> {
        let resource = resource_name::<K>();
        self.objects
            .borrow()
            .iter()
            .filter(|((r, ns, _), _)| *r == resource && ns == namespace)
            .filter(|(_, v)| matches_selector(v, label_selector))
            .map(|(_, v)| serde_json::from_value(v.clone()).context("deserialize"))
            .collect()
    }

    fn get<K: Object>(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        match self.objects.borrow().get(&key::<K>(namespace, name)) {
            Some(v) => Ok(Some(serde_json::from_value(v.clone()).context("deserialize")?)),
            None => Ok(None),
        }
    }

    fn create<K: Object>(&self, namespace: &str, obj: &K) -> Result<K> {
        let name = object_name(obj)?;
        if self.objects.borrow().contains_key(&key::<K>(namespace, &name)) {
            return Err(anyhow!(
                "Error from server (AlreadyExists): {} \"{}\" already exists",
                resource_name::<K>(),
                name
            ));
        }
        self.store(namespace, obj)
    }

    fn update<K: Object>(&self, namespace: &str, obj: &K) -> Result<K> {
        let name = object_name(obj)?;
        if !self.objects.borrow().contains_key(&key::<K>(namespace, &name)) {
            return Err(anyhow!(
                "Error from server (NotFound): {} \"{}\" not found",
                resource_name::<K>(),
                name
            ));
        }
        self.store(namespace, obj)
    }

    fn apply<K: Object>(&self, namespace: &str, obj: &K) -> Result<()> {
        self.store(namespace, obj).map(|_| ())
    }

    fn delete<K: Object>(&self, namespace: &str, name: &str) -> Result<()> {
        self.objects.borrow_mut().remove(&key::<K>(namespace, name));
        self.writes.set(self.writes.get() + 1);
        Ok(())
    }

    fn ensure_namespace(&self, name: &str) -> Result<()> {
        self.namespaces.borrow_mut().insert(name.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    fn config_map(name: &str, labels: &[(&str, &str)]) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(
                    labels
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect::<BTreeMap<_, _>>(),
                ),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_create_get_update() {
        let kube = FakeKube::new();
        let cm = config_map("settings", &[]);
        kube.create("jx", &cm).unwrap();
        assert!(kube.create("jx", &cm).is_err());

        let found: ConfigMap = kube.get("jx", "settings").unwrap().unwrap();
        assert_eq!(found.metadata.namespace.as_deref(), Some("jx"));
        assert!(kube.get::<ConfigMap>("other", "settings").unwrap().is_none());

        assert!(kube.update("jx", &config_map("missing", &[])).is_err());
        assert_eq!(kube.writes(), 1);
    }

    #[test]
    fn test_writes_count_apply_and_delete() {
        let kube = FakeKube::new();
        kube.insert("jx", config_map("seeded", &[]));
        assert_eq!(kube.writes(), 0);

        kube.apply("jx", &config_map("settings", &[])).unwrap();
        kube.apply("jx", &config_map("settings", &[])).unwrap();
        kube.delete::<ConfigMap>("jx", "seeded").unwrap();
        assert_eq!(kube.writes(), 3);
        assert!(kube.get::<ConfigMap>("jx", "seeded").unwrap().is_none());
    }

    #[test]
    fn test_list_with_selector() {
        let kube = FakeKube::new();
        kube.insert("jx", config_map("a", &[("jenkins.io/kind", "EnvironmentRole")]))
            .insert("jx", config_map("b", &[]))
            .insert("jx-staging", config_map("c", &[("jenkins.io/kind", "EnvironmentRole")]));

        let all: Vec<ConfigMap> = kube.list("jx", None).unwrap();
        assert_eq!(all.len(), 2);

        let labelled: Vec<ConfigMap> = kube
            .list("jx", Some("jenkins.io/kind=EnvironmentRole"))
            .unwrap();
        assert_eq!(labelled.len(), 1);
        assert_eq!(labelled[0].metadata.name.as_deref(), Some("a"));
    }

    #[test]
    fn test_delete_missing_is_ok() {
        let kube = FakeKube::new();
        assert!(kube.delete::<ConfigMap>("jx", "nothing").is_ok());
    }
}
