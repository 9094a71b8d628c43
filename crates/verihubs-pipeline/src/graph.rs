//! Asset dependency graph
//!
//! Assets are registered with their declared upstream names; [`AssetGraph::build`]
//! validates the edges and fixes a deterministic topological order.

use crate::assets::{default_assets, Asset};
use crate::error::{PipelineError, Result};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct AssetGraph {
    assets: BTreeMap<String, Arc<dyn Asset>>,
    dependencies: BTreeMap<String, BTreeSet<String>>,
    topological_order: Vec<String>,
}

impl std::fmt::Debug for AssetGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetGraph")
            .field("dependencies", &self.dependencies)
            .field("topological_order", &self.topological_order)
            .finish()
    }
}

impl AssetGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an asset; names must be unique
    pub fn register(&mut self, asset: Arc<dyn Asset>) -> Result<()> {
        let name = asset.name().to_string();
        if self.assets.contains_key(&name) {
            return Err(PipelineError::graph(format!("asset '{}' is registered twice", name)));
        }
        self.dependencies
            .insert(name.clone(), asset.deps().iter().cloned().collect());
        self.assets.insert(name, asset);
        self.topological_order.clear();
        Ok(())
    }

    /// Validate edges and compute the execution order
    pub fn build(mut self) -> Result<Self> {
        for (node, deps) in &self.dependencies {
            if deps.contains(node) {
                return Err(PipelineError::graph(format!("asset '{}' depends on itself", node)));
            }
            if let Some(missing) = deps.iter().find(|dep| !self.assets.contains_key(*dep)) {
                return Err(PipelineError::graph(format!(
                    "asset '{}' depends on unknown asset '{}'",
                    node, missing
                )));
            }
        }
        self.topological_sort()?;
        Ok(self)
    }

    /// Kahn's algorithm; ties are broken by name
    fn topological_sort(&mut self) -> Result<()> {
        let mut in_degree: BTreeMap<&str, usize> =
            self.assets.keys().map(|name| (name.as_str(), 0usize)).collect();
        let mut outgoing: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (node, deps) in &self.dependencies {
            for dep in deps {
                *in_degree.entry(node.as_str()).or_default() += 1;
                outgoing.entry(dep.as_str()).or_default().push(node.as_str());
            }
        }

        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(name, _)| *name)
            .collect();
        let mut order = Vec::with_capacity(self.assets.len());

        while let Some(node) = queue.pop_front() {
            order.push(node.to_string());
            for child in outgoing.get(node).into_iter().flatten() {
                if let Some(entry) = in_degree.get_mut(child) {
                    *entry = entry.saturating_sub(1);
                    if *entry == 0 {
                        queue.push_back(child);
                    }
                }
            }
        }

        if order.len() != self.assets.len() {
            let stuck: Vec<&str> = in_degree
                .iter()
                .filter(|(_, degree)| **degree > 0)
                .map(|(name, _)| *name)
                .collect();
            return Err(PipelineError::graph(format!(
                "dependency cycle among assets: {}",
                stuck.join(", ")
            )));
        }

        self.topological_order = order;
        Ok(())
    }

    /// Names in execution order (empty until [`build`](Self::build))
    pub fn topological_order(&self) -> &[String] {
        &self.topological_order
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Asset>> {
        self.assets.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.assets.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Direct upstream names of an asset
    pub fn dependencies(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.dependencies.get(name)
    }

    /// Every asset `name` transitively depends on
    pub fn upstream_closure(&self, name: &str) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        let mut queue = VecDeque::from([name.to_string()]);
        while let Some(node) = queue.pop_front() {
            for dep in self.dependencies.get(&node).into_iter().flatten() {
                if out.insert(dep.clone()) {
                    queue.push_back(dep.clone());
                }
            }
        }
        out
    }

    /// Every asset that transitively depends on `name`
    pub fn downstream_closure(&self, name: &str) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        let mut queue = VecDeque::from([name.to_string()]);
        while let Some(node) = queue.pop_front() {
            for (candidate, deps) in &self.dependencies {
                if deps.contains(&node) && out.insert(candidate.clone()) {
                    queue.push_back(candidate.clone());
                }
            }
        }
        out
    }

    /// Resolve a selection of asset names, optionally pulling in their
    /// upstream closure. An empty selection means every asset.
    pub fn select(&self, names: &[String], with_upstream: bool) -> Result<BTreeSet<String>> {
        if names.is_empty() {
            return Ok(self.assets.keys().cloned().collect());
        }

        let mut selected = BTreeSet::new();
        for name in names {
            if !self.contains(name) {
                return Err(PipelineError::UnknownAsset(name.clone()));
            }
            selected.insert(name.clone());
            if with_upstream {
                selected.extend(self.upstream_closure(name));
            }
        }
        Ok(selected)
    }
}

/// `raw_amazon_data` feeding `monthly_category_sales` and `daily_order_status`
pub fn default_graph() -> Result<AssetGraph> {
    let mut graph = AssetGraph::new();
    for asset in default_assets() {
        graph.register(asset)?;
    }
    graph.build()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::assets::{AssetContext, Materialization};
    use async_trait::async_trait;

    /// Asset with fixed edges that does no work
    struct Stub {
        name: String,
        deps: Vec<String>,
    }

    impl Stub {
        fn arc(name: &str, deps: &[&str]) -> Arc<dyn Asset> {
            Arc::new(Self {
                name: name.to_string(),
                deps: deps.iter().map(|d| d.to_string()).collect(),
            })
        }
    }

    #[async_trait]
    impl Asset for Stub {
        fn name(&self) -> &str {
            &self.name
        }

        fn deps(&self) -> &[String] {
            &self.deps
        }

        fn description(&self) -> &str {
            "stub"
        }

        async fn materialize(&self, _ctx: &AssetContext) -> Result<Materialization> {
            Ok(Materialization::new(self.name.clone(), self.name.clone(), 0))
        }
    }

    fn graph(nodes: &[(&str, &[&str])]) -> Result<AssetGraph> {
        let mut graph = AssetGraph::new();
        for (name, deps) in nodes {
            graph.register(Stub::arc(name, deps))?;
        }
        graph.build()
    }

    #[test]
    fn test_default_graph_order() {
        let graph = default_graph().unwrap();
        assert_eq!(
            graph.topological_order(),
            ["raw_amazon_data", "daily_order_status", "monthly_category_sales"]
        );
        assert_eq!(
            graph.downstream_closure("raw_amazon_data"),
            BTreeSet::from(["daily_order_status".to_string(), "monthly_category_sales".to_string()])
        );
    }

    #[test]
    fn test_order_respects_edges() {
        let graph = graph(&[("d", &["b", "c"]), ("c", &["a"]), ("b", &["a"]), ("a", &[])]).unwrap();
        assert_eq!(graph.topological_order(), ["a", "b", "c", "d"]);
        assert_eq!(
            graph.upstream_closure("d"),
            BTreeSet::from(["a".to_string(), "b".to_string(), "c".to_string()])
        );
    }

    #[test]
    fn test_rejects_cycle() {
        let err = graph(&[("a", &["c"]), ("b", &["a"]), ("c", &["b"]), ("root", &[])]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("cycle"), "{msg}");
        assert!(msg.contains("a, b, c"), "{msg}");
    }

    #[test]
    fn test_rejects_unknown_and_self_dependency() {
        assert!(graph(&[("a", &["ghost"])]).unwrap_err().to_string().contains("ghost"));
        assert!(graph(&[("a", &["a"])]).unwrap_err().to_string().contains("itself"));
    }

    #[test]
    fn test_rejects_duplicate_registration() {
        let mut graph = AssetGraph::new();
        graph.register(Stub::arc("a", &[])).unwrap();
        assert!(matches!(graph.register(Stub::arc("a", &[])), Err(PipelineError::Graph(_))));
    }

    #[test]
    fn test_select() {
        let graph = default_graph().unwrap();
        assert_eq!(graph.select(&[], false).unwrap().len(), 3);

        let only = graph.select(&["daily_order_status".to_string()], false).unwrap();
        assert_eq!(only, BTreeSet::from(["daily_order_status".to_string()]));

        let with_up = graph.select(&["daily_order_status".to_string()], true).unwrap();
        assert!(with_up.contains("raw_amazon_data"));

        assert!(matches!(
            graph.select(&["nope".to_string()], false),
            Err(PipelineError::UnknownAsset(_))
        ));
    }
}
