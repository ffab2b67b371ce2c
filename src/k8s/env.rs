//! Environment helpers

use kube::ResourceExt;

use crate::k8s::crds::{
    Environment, EnvironmentFilter, EnvironmentKind, EnvironmentSpec, PromotionStrategy,
};
use crate::utils::strings::string_matches_any;

/// Name of the environment that represents the dev namespace itself
pub const DEV_ENVIRONMENT: &str = "dev";

/// Sort by promotion order, then by name. Stable for equal keys.
pub fn sort_environments(environments: &mut [Environment]) {
    environments.sort_by(|a, b| {
        a.spec
            .order
            .cmp(&b.spec.order)
            .then_with(|| a.name_any().cmp(&b.name_any()))
    });
}

/// A long lived environment such as `staging` living in `jx-<name>`
pub fn new_permanent_environment(name: &str) -> Environment {
    let promotion_strategy = if name == "staging" {
        PromotionStrategy::Auto
    } else {
        PromotionStrategy::Manual
    };
    Environment::new(
        name,
        EnvironmentSpec {
            label: crate::utils::strings::title_case(name),
            namespace: format!("jx-{}", name),
            promotion_strategy,
            kind: EnvironmentKind::Permanent,
            ..Default::default()
        },
    )
}

/// A pull request preview living in `jx-preview-<name>`
pub fn new_preview_environment(name: &str) -> Environment {
    Environment::new(
        name,
        EnvironmentSpec {
            label: name.to_string(),
            namespace: format!("jx-preview-{}", name),
            promotion_strategy: PromotionStrategy::Never,
            kind: EnvironmentKind::Preview,
            ..Default::default()
        },
    )
}

impl EnvironmentFilter {
    /// No includes means everything is included; excludes always win
    pub fn matches(&self, environment: &str) -> bool {
        let included =
            self.includes.is_empty() || string_matches_any(environment, &self.includes);
        included && !string_matches_any(environment, &self.excludes)
    }
}

/// True if any filter matches. An empty filter list matches every environment.
pub fn filters_match(filters: &[EnvironmentFilter], environment: &str) -> bool {
    filters.is_empty() || filters.iter().any(|f| f.matches(environment))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(name: &str, order: i32) -> Environment {
        Environment::new(
            name,
            EnvironmentSpec {
                order,
                ..Default::default()
            },
        )
    }

    fn names(envs: &[Environment]) -> Vec<String> {
        envs.iter().map(|e| e.name_any()).collect()
    }

    #[test]
    fn test_sort_environments() {
        let mut envs = vec![env("c", 100), env("z", 5), env("d", 100), env("a", 150)];
        sort_environments(&mut envs);
        assert_eq!(names(&envs), vec!["z", "c", "d", "a"]);
    }

    #[test]
    fn test_sort_environments_dev_first() {
        let mut envs = vec![env("dev", 0), env("prod", 200), env("staging", 100)];
        sort_environments(&mut envs);
        assert_eq!(names(&envs), vec!["dev", "staging", "prod"]);
    }

    #[test]
    fn test_new_environments() {
        let staging = new_permanent_environment("staging");
        assert_eq!(staging.spec.namespace, "jx-staging");
        assert_eq!(staging.spec.promotion_strategy, PromotionStrategy::Auto);
        let production = new_permanent_environment("production");
        assert_eq!(production.spec.promotion_strategy, PromotionStrategy::Manual);

        let preview = new_preview_environment("jx-jstrachan-demo96-pr-1");
        assert_eq!(preview.spec.namespace, "jx-preview-jx-jstrachan-demo96-pr-1");
        assert_eq!(preview.spec.kind, EnvironmentKind::Preview);
    }

    #[test]
    fn test_environment_filter() {
        let all = EnvironmentFilter {
            includes: vec!["*".to_string()],
            excludes: vec![],
        };
        assert!(all.matches("production"));

        let no_previews = EnvironmentFilter {
            includes: vec![],
            excludes: vec!["pr-*".to_string()],
        };
        assert!(no_previews.matches("staging"));
        assert!(!no_previews.matches("pr-42"));

        assert!(filters_match(&[], "anything"));
        let only_staging = EnvironmentFilter {
            includes: vec!["staging".to_string()],
            excludes: vec![],
        };
        assert!(!filters_match(&[only_staging], "production"));
    }
}
