#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde_json::Value;
use state_tree::{
    apply_splices, ChangeKind, ConstantKey, Facet, FacetDiff, FacetId, FacetRegistry, FacetSpec,
    FacetValue, FlushBatch, NodeId, StateTree,
};

/// Facet ids of the registry built by [`registry`].
#[derive(Debug, Clone, Copy)]
pub struct Facets {
    pub props: FacetId,
    pub items: FacetId,
    pub children: FacetId,
    pub slots: FacetId,
}

pub fn registry() -> (Arc<FacetRegistry>, Facets) {
    let registry = FacetRegistry::bootstrap([
        FacetSpec::map("props"),
        FacetSpec::list("items"),
        FacetSpec::node_list("children"),
        FacetSpec::map("slots"),
    ])
    .expect("fixture registry must build");
    let facets = Facets {
        props: registry.id_of("props").expect("props registered"),
        items: registry.id_of("items").expect("items registered"),
        children: registry.id_of("children").expect("children registered"),
        slots: registry.id_of("slots").expect("slots registered"),
    };
    (registry, facets)
}

pub fn tree() -> (StateTree, Facets) {
    let (registry, facets) = registry();
    (StateTree::new(registry), facets)
}

/// Create a node and append it to `parent`'s children.
pub fn add_child(tree: &mut StateTree, facets: &Facets, parent: NodeId) -> NodeId {
    let child = tree.create_node();
    tree.list(parent, facets.children)
        .expect("children list must open")
        .add(child)
        .expect("child must link");
    child
}

/// Client-side replica rebuilt purely from flush batches.
#[derive(Debug, Default)]
pub struct Mirror {
    nodes: BTreeMap<NodeId, MirrorNode>,
    constants: HashMap<ConstantKey, Value>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct MirrorNode {
    pub maps: BTreeMap<FacetId, BTreeMap<String, FacetValue>>,
    pub lists: BTreeMap<FacetId, Vec<FacetValue>>,
}

impl Mirror {
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(NodeId::ROOT, MirrorNode::default());
        Self {
            nodes,
            constants: HashMap::new(),
        }
    }

    pub fn apply(&mut self, batch: &FlushBatch) {
        for (key, payload) in &batch.constants {
            assert!(
                self.constants.insert(key.clone(), payload.clone()).is_none(),
                "constant {key} transmitted twice"
            );
        }
        for change in &batch.changes {
            match &change.kind {
                ChangeKind::Attach => {
                    self.nodes.insert(change.node, MirrorNode::default());
                }
                ChangeKind::Detach => {
                    self.nodes.remove(&change.node);
                }
                ChangeKind::Facet { facet, diff } => {
                    for value in diff.values() {
                        if let FacetValue::Constant(key) = value {
                            assert!(
                                self.constants.contains_key(key),
                                "constant {key} referenced before transmission"
                            );
                        }
                    }
                    let node = self
                        .nodes
                        .get_mut(&change.node)
                        .unwrap_or_else(|| panic!("change for unknown node {}", change.node));
                    match diff {
                        FacetDiff::Put { key, value } => {
                            node.maps
                                .entry(*facet)
                                .or_default()
                                .insert(key.clone(), value.clone());
                        }
                        FacetDiff::Remove { key } => {
                            node.maps.entry(*facet).or_default().remove(key);
                        }
                        FacetDiff::Splice { .. } => {
                            apply_splices(node.lists.entry(*facet).or_default(), [diff])
                                .expect("splice must apply to mirror");
                        }
                    }
                }
            }
        }
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, node: NodeId) -> Option<&MirrorNode> {
        self.nodes.get(&node)
    }

    pub fn map(&self, node: NodeId, facet: FacetId) -> BTreeMap<String, FacetValue> {
        self.nodes
            .get(&node)
            .and_then(|n| n.maps.get(&facet))
            .cloned()
            .unwrap_or_default()
    }

    pub fn list(&self, node: NodeId, facet: FacetId) -> Vec<FacetValue> {
        self.nodes
            .get(&node)
            .and_then(|n| n.lists.get(&facet))
            .cloned()
            .unwrap_or_default()
    }

    pub fn constant(&self, key: &ConstantKey) -> Option<&Value> {
        self.constants.get(key)
    }
}

/// What the server holds for one node, in mirror form.
pub fn server_view(tree: &StateTree, id: NodeId) -> MirrorNode {
    let mut view = MirrorNode::default();
    let node = tree.node(id).expect("node must exist");
    for (facet_id, facet) in node.facets() {
        match facet {
            Facet::Map(map) => {
                if !map.is_empty() {
                    let entries = map.iter().map(|(k, v)| (k.to_owned(), v.clone())).collect();
                    view.maps.insert(facet_id, entries);
                }
            }
            Facet::List(list) => {
                if !list.is_empty() {
                    view.lists.insert(facet_id, list.as_slice().to_vec());
                }
            }
        }
    }
    view
}

fn normalized(mut node: MirrorNode) -> MirrorNode {
    node.maps.retain(|_, m| !m.is_empty());
    node.lists.retain(|_, l| !l.is_empty());
    node
}

/// Attached node ids reachable from the root, parents first.
pub fn attached_nodes(tree: &StateTree) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut stack = vec![NodeId::ROOT];
    while let Some(id) = stack.pop() {
        out.push(id);
        let mut children = tree.node(id).expect("attached node must exist").children();
        children.reverse();
        stack.extend(children);
    }
    out
}

/// Assert that `mirror` reproduces every attached node and nothing else.
pub fn assert_mirrors(tree: &StateTree, mirror: &Mirror) {
    let attached = attached_nodes(tree);
    for &id in &attached {
        assert!(tree.is_attached(id), "reachable node {id} must be attached");
        let client = mirror
            .node(id)
            .cloned()
            .unwrap_or_else(|| panic!("mirror is missing node {id}"));
        assert_eq!(
            normalized(client),
            server_view(tree, id),
            "mirror diverged for node {id}"
        );
    }
    assert_eq!(mirror.len(), attached.len(), "mirror holds detached nodes");
}
