//! Native manifest comparison
//!
//! Diffs the local manifest against production node by node and expands
//! each change to its downstream children.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use dbt_ci_core::{Selection, Selector};
use dbt_ci_dbt::{DependencyGraph, Manifest, ManifestNode};

/// What differs between the production and local version of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChangeKind {
    /// Only present locally
    Added,
    /// File contents (checksum) differ
    Body,
    Columns,
    Dependencies,
    Contract,
    Materialization,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChangeKind::Added => "added",
            ChangeKind::Body => "body",
            ChangeKind::Columns => "columns",
            ChangeKind::Dependencies => "dependencies",
            ChangeKind::Contract => "contract",
            ChangeKind::Materialization => "materialization",
        })
    }
}

type Check = fn(&ManifestNode, &ManifestNode) -> bool;

/// Checks run on nodes present in both manifests, in reporting order
const CHECKS: [(ChangeKind, Check); 5] = [
    (ChangeKind::Body, body_changed),
    (ChangeKind::Columns, columns_changed),
    (ChangeKind::Dependencies, dependencies_changed),
    (ChangeKind::Contract, contract_changed),
    (ChangeKind::Materialization, materialization_changed),
];

/// One changed model, seed, snapshot or test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeChange {
    pub unique_id: String,
    pub name: String,
    pub resource_type: String,
    pub kinds: Vec<ChangeKind>,
    /// Every node downstream of this one in the local manifest
    pub downstream: Vec<String>,
}

impl NodeChange {
    pub fn is_added(&self) -> bool {
        self.kinds.contains(&ChangeKind::Added)
    }
}

/// Result of [`diff_manifests`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestDiff {
    /// Changed and added nodes, ordered by unique id
    pub changed: Vec<NodeChange>,
    /// Nodes only present in production
    pub removed: Vec<String>,
}

impl ManifestDiff {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.removed.is_empty()
    }

    pub fn added(&self) -> impl Iterator<Item = &NodeChange> {
        self.changed.iter().filter(|change| change.is_added())
    }

    /// Changed nodes together with everything downstream of them
    pub fn affected(&self) -> BTreeSet<&str> {
        self.changed
            .iter()
            .flat_map(|change| {
                std::iter::once(change.unique_id.as_str())
                    .chain(change.downstream.iter().map(String::as_str))
            })
            .collect()
    }

    /// `name+` for every changed or added node, sorted by name
    ///
    /// Removed nodes have nothing left to run, so a diff holding only
    /// removals selects nothing.
    pub fn selection(&self) -> Selection {
        selection_of(self.changed.iter())
    }

    /// Like [`ManifestDiff::selection`], keeping only changes whose `name+`
    /// reaches a node of `resource_type` in `local`
    ///
    /// Mirrors `dbt ls --resource-type`: with `seed`, an edited model that
    /// feeds no seed selects nothing. `None` keeps every change.
    pub fn selection_for(&self, local: &Manifest, resource_type: Option<&str>) -> Selection {
        let Some(resource_type) = resource_type else {
            return self.selection();
        };

        let is_type = |id: &str| {
            local
                .get_node(id)
                .is_some_and(|node| node.resource_type == resource_type)
        };
        selection_of(self.changed.iter().filter(|change| {
            change.resource_type == resource_type
                || change.downstream.iter().map(String::as_str).any(&is_type)
        }))
    }
}

fn selection_of<'a>(changes: impl Iterator<Item = &'a NodeChange>) -> Selection {
    let names: BTreeSet<&str> = changes.map(|change| change.name.as_str()).collect();
    Selector::from_models(names).into()
}

/// Compare the enabled selectable nodes of `local` against `production`
pub fn diff_manifests(local: &Manifest, production: &Manifest) -> ManifestDiff {
    let graph = DependencyGraph::from_manifest(local);
    let local_nodes = local.selectable_nodes();
    let production_nodes = production.selectable_nodes();

    let changed = local_nodes
        .iter()
        .filter_map(|(id, node)| {
            let kinds: Vec<ChangeKind> = match production_nodes.get(id) {
                None => vec![ChangeKind::Added],
                Some(previous) => CHECKS
                    .iter()
                    .filter(|(_, check)| check(*node, *previous))
                    .map(|(kind, _)| *kind)
                    .collect(),
            };
            if kinds.is_empty() {
                return None;
            }

            Some(NodeChange {
                unique_id: id.to_string(),
                name: node.name.clone(),
                resource_type: node.resource_type.clone(),
                kinds,
                downstream: graph.downstream(id),
            })
        })
        .collect();

    let removed = production_nodes
        .into_keys()
        .filter(|id| !local_nodes.contains_key(id))
        .map(String::from)
        .collect();

    ManifestDiff { changed, removed }
}

/// dbt checksums the raw file; older manifests without one fall back to paths
fn body_changed(local: &ManifestNode, production: &ManifestNode) -> bool {
    match (&local.checksum, &production.checksum) {
        (Some(a), Some(b)) => a != b,
        _ => local.path != production.path || local.original_file_path != production.original_file_path,
    }
}

fn columns_changed(local: &ManifestNode, production: &ManifestNode) -> bool {
    let types = |node: &ManifestNode| -> BTreeMap<String, Option<String>> {
        node.columns
            .iter()
            .map(|(name, column)| (name.clone(), column.data_type.clone()))
            .collect()
    };
    types(local) != types(production)
}

fn dependencies_changed(local: &ManifestNode, production: &ManifestNode) -> bool {
    let parents = |node: &ManifestNode| node.depends_on.nodes.iter().cloned().collect::<BTreeSet<_>>();
    parents(local) != parents(production)
}

fn contract_changed(local: &ManifestNode, production: &ManifestNode) -> bool {
    let enforced = |node: &ManifestNode| node.config.contract.as_ref().map(|contract| contract.enforced);
    enforced(local) != enforced(production)
}

fn materialization_changed(local: &ManifestNode, production: &ManifestNode) -> bool {
    local.config.materialized != production.config.materialized
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbt_ci_dbt::{ColumnDefinition, ContractConfig, DependsOn, FileChecksum, NodeConfig};
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn model(name: &str, parents: &[&str]) -> ManifestNode {
        ManifestNode {
            unique_id: format!("model.shop.{name}"),
            name: name.to_string(),
            resource_type: "model".to_string(),
            package_name: "shop".to_string(),
            path: format!("{name}.sql"),
            original_file_path: format!("models/{name}.sql"),
            checksum: Some(FileChecksum {
                name: "sha256".to_string(),
                checksum: format!("{name}@1"),
            }),
            config: NodeConfig::default(),
            columns: HashMap::new(),
            depends_on: DependsOn {
                nodes: parents.iter().map(|p| format!("model.shop.{p}")).collect(),
                macros: Vec::new(),
            },
            fqn: vec!["shop".to_string(), name.to_string()],
        }
    }

    fn manifest(models: impl IntoIterator<Item = ManifestNode>) -> Manifest {
        Manifest {
            metadata: Default::default(),
            nodes: models
                .into_iter()
                .map(|node| (node.unique_id.clone(), node))
                .collect(),
            child_map: HashMap::new(),
        }
    }

    /// Non-model node; `parents` are full unique ids
    fn other(resource_type: &str, name: &str, parents: &[&str]) -> ManifestNode {
        let mut node = model(name, &[]);
        node.resource_type = resource_type.to_string();
        node.unique_id = format!("{resource_type}.shop.{name}");
        node.depends_on.nodes = parents.iter().map(|p| p.to_string()).collect();
        node
    }

    fn add(manifest: &mut Manifest, node: ManifestNode) {
        manifest.nodes.insert(node.unique_id.clone(), node);
    }

    /// stg_orders -> orders -> revenue, plus an unrelated customers model
    fn shop() -> Manifest {
        manifest([
            model("stg_orders", &[]),
            model("orders", &["stg_orders"]),
            model("revenue", &["orders"]),
            model("customers", &[]),
        ])
    }

    fn node<'a>(manifest: &'a mut Manifest, name: &str) -> &'a mut ManifestNode {
        manifest.nodes.get_mut(&format!("model.shop.{name}")).unwrap()
    }

    fn edit(manifest: &mut Manifest, name: &str) {
        if let Some(checksum) = node(manifest, name).checksum.as_mut() {
            checksum.checksum = format!("{name}@2");
        }
    }

    fn expression(diff: &ManifestDiff) -> String {
        diff.selection()
            .selector()
            .map(|selector| selector.expression().to_string())
            .unwrap_or_default()
    }

    #[test]
    fn identical_manifests_select_nothing() {
        let diff = diff_manifests(&shop(), &shop());

        assert!(diff.is_empty());
        assert_eq!(diff.selection(), Selection::Empty);
    }

    #[test]
    fn edited_model_selects_itself_and_children() {
        let mut local = shop();
        edit(&mut local, "orders");

        let diff = diff_manifests(&local, &shop());

        assert_eq!(diff.changed.len(), 1);
        assert_eq!(diff.changed[0].kinds, [ChangeKind::Body]);
        assert_eq!(diff.changed[0].downstream, ["model.shop.revenue"]);
        assert_eq!(expression(&diff), "orders+");
        assert_eq!(
            diff.affected().into_iter().collect::<Vec<_>>(),
            ["model.shop.orders", "model.shop.revenue"]
        );
    }

    #[test]
    fn selection_is_sorted_by_name() {
        let mut local = shop();
        edit(&mut local, "revenue");
        edit(&mut local, "customers");
        edit(&mut local, "stg_orders");

        let diff = diff_manifests(&local, &shop());
        assert_eq!(expression(&diff), "customers+ revenue+ stg_orders+");
        assert_eq!(diff.affected().len(), 4);
    }

    #[test]
    fn paths_stand_in_for_missing_checksums() {
        let mut local = shop();
        let orders = node(&mut local, "orders");
        orders.checksum = None;
        orders.original_file_path = "models/marts/orders.sql".to_string();

        let diff = diff_manifests(&local, &shop());
        assert_eq!(diff.changed[0].kinds, [ChangeKind::Body]);

        let mut moved_back = local.clone();
        node(&mut moved_back, "orders").original_file_path = "models/orders.sql".to_string();
        assert!(diff_manifests(&moved_back, &shop()).is_empty());
    }

    #[test]
    fn added_model_is_selected() {
        let mut local = shop();
        let refunds = model("refunds", &["orders"]);
        local.nodes.insert(refunds.unique_id.clone(), refunds);

        let diff = diff_manifests(&local, &shop());

        let added: Vec<&str> = diff.added().map(|change| change.name.as_str()).collect();
        assert_eq!(added, ["refunds"]);
        assert_eq!(expression(&diff), "refunds+");
    }

    #[test]
    fn removed_models_are_reported_but_not_selected() {
        let mut local = shop();
        local.nodes.remove("model.shop.customers");

        let diff = diff_manifests(&local, &shop());

        assert!(!diff.is_empty());
        assert_eq!(diff.removed, ["model.shop.customers"]);
        assert_eq!(diff.selection(), Selection::Empty);
    }

    #[test]
    fn disabled_nodes_and_analyses_are_ignored() {
        let mut local = shop();
        node(&mut local, "customers").config.enabled = false;
        add(&mut local, other("analysis", "weekly_report", &["model.shop.orders"]));

        let mut production = shop();
        node(&mut production, "customers").config.enabled = false;

        assert!(diff_manifests(&local, &production).is_empty());
    }

    #[test]
    fn edited_seed_is_selected_for_seed_and_downstream_modes() {
        let with_seed = || {
            let mut manifest = shop();
            add(&mut manifest, other("seed", "country_codes", &[]));
            node(&mut manifest, "customers")
                .depends_on
                .nodes
                .push("seed.shop.country_codes".to_string());
            manifest
        };
        let mut local = with_seed();
        if let Some(checksum) = local
            .nodes
            .get_mut("seed.shop.country_codes")
            .and_then(|seed| seed.checksum.as_mut())
        {
            checksum.checksum = "country_codes@2".to_string();
        }

        let diff = diff_manifests(&local, &with_seed());

        assert_eq!(diff.changed.len(), 1);
        assert_eq!(diff.changed[0].resource_type, "seed");
        assert_eq!(diff.changed[0].downstream, ["model.shop.customers"]);
        for resource_type in [None, Some("seed"), Some("model")] {
            let selection = diff.selection_for(&local, resource_type);
            assert_eq!(
                selection.selector().map(|s| s.expression()),
                Some("country_codes+"),
                "{resource_type:?}"
            );
        }
        assert_eq!(diff.selection_for(&local, Some("snapshot")), Selection::Empty);
    }

    #[test]
    fn mode_filter_keeps_changes_reaching_that_node_type() {
        let with_test = || {
            let mut manifest = shop();
            add(&mut manifest, other("test", "not_null_revenue_id", &["model.shop.revenue"]));
            manifest
        };
        let mut local = with_test();
        edit(&mut local, "orders");

        let diff = diff_manifests(&local, &with_test());

        assert_eq!(
            diff.changed[0].downstream,
            ["model.shop.revenue", "test.shop.not_null_revenue_id"]
        );
        let expression_for = |resource_type| {
            diff.selection_for(&local, resource_type)
                .selector()
                .map(|s| s.expression().to_string())
        };
        assert_eq!(expression_for(Some("model")).as_deref(), Some("orders+"));
        assert_eq!(expression_for(Some("test")).as_deref(), Some("orders+"));
        assert_eq!(expression_for(None).as_deref(), Some("orders+"));
        assert_eq!(expression_for(Some("seed")), None);
        assert_eq!(expression_for(Some("snapshot")), None);
    }

    #[test]
    fn config_and_schema_changes_are_classified() {
        let mut local = shop();
        let orders = node(&mut local, "orders");
        orders.depends_on.nodes.push("model.shop.customers".to_string());
        orders.config.materialized = Some("incremental".to_string());
        orders.config.contract = Some(ContractConfig { enforced: true });
        orders.columns.insert(
            "order_id".to_string(),
            ColumnDefinition {
                name: "order_id".to_string(),
                data_type: Some("bigint".to_string()),
            },
        );

        let diff = diff_manifests(&local, &shop());
        assert_eq!(
            diff.changed[0].kinds,
            [
                ChangeKind::Columns,
                ChangeKind::Dependencies,
                ChangeKind::Contract,
                ChangeKind::Materialization,
            ]
        );
    }

    #[test]
    fn dependency_order_does_not_matter() {
        let mut local = shop();
        let mut production = shop();
        node(&mut local, "revenue").depends_on.nodes =
            vec!["model.shop.orders".to_string(), "model.shop.customers".to_string()];
        node(&mut production, "revenue").depends_on.nodes =
            vec!["model.shop.customers".to_string(), "model.shop.orders".to_string()];

        assert!(diff_manifests(&local, &production).is_empty());
    }
}
