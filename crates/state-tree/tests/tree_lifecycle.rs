mod common;

use std::sync::{Arc, Mutex};

use common::{add_child, assert_mirrors, tree, Mirror};
use serde_json::json;
use state_tree::{
    Facet, FacetDiff, FacetId, FacetRegistry, FacetShape, FacetSpec, FacetValue, NodeChange,
    NodeId, StateTree, StateTreeError,
};

type Log = Arc<Mutex<Vec<String>>>;

fn log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn record(log: &Log, tag: &'static str) -> impl FnMut(&mut StateTree, NodeId) + Send + 'static {
    let log = Arc::clone(log);
    move |_, id| log.lock().unwrap().push(format!("{tag} {id}"))
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

// ── Root ──────────────────────────────────────────────────────────────────

#[test]
fn root_has_id_one_and_is_never_announced() {
    let (mut tree, facets) = tree();
    let root = tree.root();
    assert_eq!(root, NodeId::ROOT);
    assert_eq!(root.get(), 1);
    assert!(tree.is_attached(root));
    assert!(tree.node_by_id(root).is_some());

    tree.map(root, facets.props).unwrap().put("title", "home").unwrap();
    let batch = tree.flush();
    assert_eq!(
        batch.changes,
        vec![NodeChange::facet(
            root,
            facets.props,
            FacetDiff::Put {
                key: "title".into(),
                value: "home".into(),
            }
        )]
    );
}

#[test]
fn node_ids_are_sequential_after_the_root() {
    let (mut tree, _) = tree();
    let a = tree.create_node();
    let b = tree.create_node();
    assert_eq!(a.get(), 2);
    assert_eq!(b.get(), 3);
    assert!(!tree.is_attached(a));
    assert_eq!(tree.len(), 3);
}

// ── Structure ─────────────────────────────────────────────────────────────

#[test]
fn root_cannot_be_given_a_parent() {
    let (mut tree, facets) = tree();
    let root = tree.root();
    let holder = tree.create_node();
    assert_eq!(
        tree.map(holder, facets.slots).unwrap().put("r", root),
        Err(StateTreeError::RootHasNoParent)
    );
    assert_eq!(
        tree.list(root, facets.children).unwrap().add(root),
        Err(StateTreeError::RootHasNoParent)
    );
    assert!(tree.map(holder, facets.slots).unwrap().is_empty());
}

#[test]
fn node_with_a_parent_cannot_be_inserted_again() {
    let (mut tree, facets) = tree();
    let root = tree.root();
    let child = add_child(&mut tree, &facets, root);
    let other = tree.create_node();
    assert_eq!(
        tree.list(other, facets.children).unwrap().add(child),
        Err(StateTreeError::AlreadyHasParent {
            node: child,
            parent: root,
        })
    );
    assert_eq!(
        tree.list(root, facets.children).unwrap().add(child),
        Err(StateTreeError::AlreadyHasParent {
            node: child,
            parent: root,
        })
    );
    assert_eq!(tree.list(root, facets.children).unwrap().len(), 1);
}

#[test]
fn node_cannot_become_a_child_of_its_descendant() {
    let (mut tree, facets) = tree();
    let a = tree.create_node();
    let b = add_child(&mut tree, &facets, a);
    assert_eq!(
        tree.list(b, facets.children).unwrap().add(a),
        Err(StateTreeError::CyclicParent { node: a, parent: b })
    );
    assert_eq!(
        tree.list(a, facets.children).unwrap().add(a),
        Err(StateTreeError::CyclicParent { node: a, parent: a })
    );
}

#[test]
fn list_shapes_police_their_values() {
    let (mut tree, facets) = tree();
    let root = tree.root();
    let child = tree.create_node();
    assert_eq!(
        tree.list(root, facets.items).unwrap().add(child),
        Err(StateTreeError::NodeValueInPlainList("items"))
    );
    assert_eq!(
        tree.list(root, facets.children).unwrap().add(5),
        Err(StateTreeError::NotANodeValue("children"))
    );
    assert_eq!(tree.parent(child), None);
}

#[test]
fn handles_check_the_declared_shape() {
    let (mut tree, facets) = tree();
    let root = tree.root();
    assert!(matches!(
        tree.map(root, facets.items),
        Err(StateTreeError::ShapeMismatch {
            name: "items",
            expected: FacetShape::Map,
            actual: FacetShape::List,
        })
    ));
    assert!(matches!(
        tree.list(root, facets.props),
        Err(StateTreeError::ShapeMismatch {
            name: "props",
            ..
        })
    ));
}

#[test]
fn replacing_a_map_slot_relinks_children() {
    let (mut tree, facets) = tree();
    let root = tree.root();
    let first = tree.create_node();
    let second = tree.create_node();
    tree.map(root, facets.slots).unwrap().put("main", first).unwrap();
    assert!(tree.is_attached(first));

    let previous = tree.map(root, facets.slots).unwrap().put("main", second).unwrap();
    assert_eq!(previous, Some(FacetValue::Node(first)));
    assert!(!tree.is_attached(first));
    assert_eq!(tree.parent(first), None);
    assert!(tree.is_attached(second));

    tree.map(root, facets.slots).unwrap().put("main", second).unwrap();
    assert_eq!(tree.parent(second), Some(root));
}

// ── Attach state ──────────────────────────────────────────────────────────

#[test]
fn detached_nodes_are_not_found_by_id() {
    let (mut tree, facets) = tree();
    let root = tree.root();
    let child = add_child(&mut tree, &facets, root);
    assert_eq!(tree.node_by_id(child).map(|n| n.id()), Some(child));

    tree.list(root, facets.children).unwrap().remove(0).unwrap();
    assert!(tree.node_by_id(child).is_none());
    assert!(tree.node(child).is_ok());
}

#[test]
fn reattached_node_keeps_its_id_and_replays_everything() {
    let (mut tree, facets) = tree();
    let root = tree.root();
    let mut mirror = Mirror::new();

    let child = tree.create_node();
    tree.map(child, facets.props).unwrap().put("a", 1).unwrap();
    tree.list(root, facets.children).unwrap().add(child).unwrap();
    mirror.apply(&tree.flush());
    assert_mirrors(&tree, &mirror);

    tree.list(root, facets.children).unwrap().remove(0).unwrap();
    let batch = tree.flush();
    assert!(batch.changes.contains(&NodeChange::detach(child)));
    mirror.apply(&batch);
    assert!(!mirror.contains(child));

    tree.map(child, facets.props).unwrap().put("b", 2).unwrap();
    assert!(tree.flush().is_empty());

    tree.list(root, facets.children).unwrap().add(child).unwrap();
    let batch = tree.flush();
    assert_eq!(
        batch.changes[1..],
        [
            NodeChange::attach(child),
            NodeChange::facet(
                child,
                facets.props,
                FacetDiff::Put {
                    key: "a".into(),
                    value: 1.into(),
                }
            ),
            NodeChange::facet(
                child,
                facets.props,
                FacetDiff::Put {
                    key: "b".into(),
                    value: 2.into(),
                }
            ),
        ]
    );
    mirror.apply(&batch);
    assert_mirrors(&tree, &mirror);
    assert_eq!(tree.node_by_id(child).map(|n| n.id()), Some(child));
}

#[test]
fn attach_and_detach_cascade_through_the_subtree() {
    let (mut tree, facets) = tree();
    let root = tree.root();
    let branch = tree.create_node();
    let leaf = add_child(&mut tree, &facets, branch);
    assert!(!tree.is_attached(leaf));

    tree.map(root, facets.slots).unwrap().put("branch", branch).unwrap();
    assert!(tree.is_attached(branch));
    assert!(tree.is_attached(leaf));

    tree.map(root, facets.slots).unwrap().remove("branch").unwrap();
    assert!(!tree.is_attached(branch));
    assert!(!tree.is_attached(leaf));
    assert_eq!(tree.parent(leaf), Some(branch));
}

// ── Listeners ─────────────────────────────────────────────────────────────

#[test]
fn listeners_fire_once_per_transition() {
    let (mut tree, facets) = tree();
    let root = tree.root();
    let events = log();
    let child = tree.create_node();
    tree.add_attach_listener(child, record(&events, "attach")).unwrap();
    tree.add_detach_listener(child, record(&events, "detach")).unwrap();

    tree.list(root, facets.children).unwrap().add(child).unwrap();
    tree.map(child, facets.props).unwrap().put("x", 1).unwrap();
    tree.list(root, facets.children).unwrap().remove(0).unwrap();
    tree.list(root, facets.children).unwrap().add(child).unwrap();

    assert_eq!(entries(&events), ["attach 2", "detach 2", "attach 2"]);
}

#[test]
fn transition_repeated_by_a_listener_fires_again() {
    let (mut tree, facets) = tree();
    let root = tree.root();
    let children = facets.children;
    let events = log();
    let child = tree.create_node();
    let mut bounced = false;
    tree.add_attach_listener(child, move |tree, id| {
        if !bounced {
            bounced = true;
            tree.list(root, children).unwrap().remove(0).unwrap();
            tree.list(root, children).unwrap().add(id).unwrap();
        }
    })
    .unwrap();
    tree.add_attach_listener(child, record(&events, "attach")).unwrap();
    tree.add_detach_listener(child, record(&events, "detach")).unwrap();

    tree.list(root, children).unwrap().add(child).unwrap();

    assert!(tree.is_attached(child));
    assert_eq!(entries(&events), ["detach 2", "attach 2", "attach 2"]);
}

#[test]
fn subtree_listeners_fire_bottom_up() {
    let (mut tree, facets) = tree();
    let root = tree.root();
    let events = log();
    let branch = tree.create_node();
    let leaf = add_child(&mut tree, &facets, branch);
    tree.add_attach_listener(branch, record(&events, "attach")).unwrap();
    tree.add_attach_listener(leaf, record(&events, "attach")).unwrap();
    tree.add_detach_listener(branch, record(&events, "detach")).unwrap();
    tree.add_detach_listener(leaf, record(&events, "detach")).unwrap();

    tree.list(root, facets.children).unwrap().add(branch).unwrap();
    tree.list(root, facets.children).unwrap().clear().unwrap();

    assert_eq!(
        entries(&events),
        ["attach 3", "attach 2", "detach 3", "detach 2"]
    );
}

#[test]
fn once_listeners_fire_a_single_time() {
    let (mut tree, facets) = tree();
    let root = tree.root();
    let events = log();
    let child = tree.create_node();
    let sink = Arc::clone(&events);
    tree.add_attach_listener_once(child, move |_, id| {
        sink.lock().unwrap().push(format!("first attach {id}"));
    })
    .unwrap();

    for _ in 0..2 {
        tree.list(root, facets.children).unwrap().add(child).unwrap();
        tree.list(root, facets.children).unwrap().remove(0).unwrap();
    }
    assert_eq!(entries(&events), ["first attach 2"]);
}

#[test]
fn removed_listeners_stay_silent() {
    let (mut tree, facets) = tree();
    let root = tree.root();
    let events = log();
    let child = tree.create_node();
    let id = tree.add_attach_listener(child, record(&events, "attach")).unwrap();
    assert!(tree.remove_listener(child, id));
    assert!(!tree.remove_listener(child, id));

    tree.list(root, facets.children).unwrap().add(child).unwrap();
    assert!(entries(&events).is_empty());
}

#[test]
fn listeners_may_mutate_the_tree() {
    let (mut tree, facets) = tree();
    let root = tree.root();
    let child = tree.create_node();
    let props = facets.props;
    tree.add_attach_listener(child, move |tree, id| {
        let mut map = tree.map(id, props).unwrap();
        let n = map.get_i64_or("attaches", 0);
        map.put("attaches", n + 1).unwrap();
    })
    .unwrap();

    tree.list(root, facets.children).unwrap().add(child).unwrap();
    tree.list(root, facets.children).unwrap().remove(0).unwrap();
    tree.list(root, facets.children).unwrap().add(child).unwrap();
    assert_eq!(tree.map(child, props).unwrap().get_i64_or("attaches", 0), 2);
}

#[test]
fn run_when_attached_runs_now_or_on_attach() {
    let (mut tree, facets) = tree();
    let root = tree.root();
    let events = log();

    let sink = Arc::clone(&events);
    tree.run_when_attached(root, move |_, id| sink.lock().unwrap().push(format!("now {id}")))
        .unwrap();

    let child = tree.create_node();
    let sink = Arc::clone(&events);
    tree.run_when_attached(child, move |_, id| sink.lock().unwrap().push(format!("later {id}")))
        .unwrap();
    assert_eq!(entries(&events), ["now 1"]);

    tree.list(root, facets.children).unwrap().add(child).unwrap();
    tree.list(root, facets.children).unwrap().remove(0).unwrap();
    tree.list(root, facets.children).unwrap().add(child).unwrap();
    assert_eq!(entries(&events), ["now 1", "later 2"]);
}

// ── Facet hooks ───────────────────────────────────────────────────────────

fn hooked_attach(tree: &mut StateTree, node: NodeId, initial: bool) {
    let facet = tree.registry().id_of("hooked").unwrap();
    let mut map = tree.map(node, facet).unwrap();
    let n = map.get_i64_or("attaches", 0);
    map.put("attaches", n + 1).unwrap();
    map.put("initial", initial).unwrap();
}

fn hooked_detach(tree: &mut StateTree, node: NodeId) {
    let facet = tree.registry().id_of("hooked").unwrap();
    tree.map(node, facet).unwrap().put("detached", true).unwrap();
}

#[test]
fn facet_hooks_follow_node_listeners() {
    let registry = FacetRegistry::bootstrap([
        FacetSpec::node_list("children"),
        FacetSpec::map("hooked")
            .with_attach_hook(hooked_attach)
            .with_detach_hook(hooked_detach),
    ])
    .unwrap();
    let children = registry.id_of("children").unwrap();
    let hooked = registry.id_of("hooked").unwrap();
    let mut tree = StateTree::new(registry);
    let root = tree.root();

    let child = tree.create_node();
    tree.map(child, hooked).unwrap().put("created", true).unwrap();
    tree.add_attach_listener(child, move |tree, id| {
        let mut map = tree.map(id, hooked).unwrap();
        let seen = map.get_i64_or("attaches", 0);
        map.put("seen_by_listener", seen).unwrap();
    })
    .unwrap();

    tree.list(root, children).unwrap().add(child).unwrap();
    {
        let map = tree.map(child, hooked).unwrap();
        assert_eq!(map.get_i64_or("seen_by_listener", -1), 0);
        assert_eq!(map.get_i64_or("attaches", 0), 1);
        assert!(map.get_bool_or("initial", false));
    }

    tree.list(root, children).unwrap().remove(0).unwrap();
    assert!(tree.map(child, hooked).unwrap().get_bool_or("detached", false));

    tree.list(root, children).unwrap().add(child).unwrap();
    let map = tree.map(child, hooked).unwrap();
    assert_eq!(map.get_i64_or("attaches", 0), 2);
    assert!(!map.get_bool_or("initial", true));
}

// ── Discard ───────────────────────────────────────────────────────────────

#[test]
fn discarded_nodes_are_stale() {
    let (mut tree, facets) = tree();
    let root = tree.root();
    let branch = tree.create_node();
    let leaf = add_child(&mut tree, &facets, branch);

    tree.discard(branch).unwrap();
    assert_eq!(tree.node(branch).unwrap_err(), StateTreeError::StaleNode(branch));
    assert_eq!(tree.node(leaf).unwrap_err(), StateTreeError::StaleNode(leaf));
    assert!(matches!(
        tree.map(branch, facets.props),
        Err(StateTreeError::StaleNode(_))
    ));
    assert_eq!(
        tree.list(root, facets.children).unwrap().add(branch),
        Err(StateTreeError::StaleNode(branch))
    );
    assert_eq!(tree.create_node().get(), 4);
}

#[test]
fn nodes_in_use_cannot_be_discarded() {
    let (mut tree, facets) = tree();
    let root = tree.root();
    let child = add_child(&mut tree, &facets, root);
    let branch = tree.create_node();
    let leaf = add_child(&mut tree, &facets, branch);

    assert_eq!(tree.discard(root), Err(StateTreeError::NodeInUse(root)));
    assert_eq!(tree.discard(child), Err(StateTreeError::NodeInUse(child)));
    assert_eq!(tree.discard(leaf), Err(StateTreeError::NodeInUse(leaf)));
}

#[test]
fn discarding_a_reported_node_still_reports_its_detach() {
    let (mut tree, facets) = tree();
    let root = tree.root();
    let child = add_child(&mut tree, &facets, root);
    tree.map(child, facets.props).unwrap().put("k", json!("v")).unwrap();
    tree.flush();

    tree.list(root, facets.children).unwrap().remove(0).unwrap();
    tree.discard(child).unwrap();
    let batch = tree.flush();
    assert_eq!(
        batch.changes,
        vec![
            NodeChange::facet(
                root,
                facets.children,
                FacetDiff::Splice {
                    index: 0,
                    remove: 1,
                    items: vec![],
                }
            ),
            NodeChange::detach(child),
        ]
    );
    assert!(tree.flush().is_empty());
}

// ── Inactive nodes ────────────────────────────────────────────────────────

fn visible(facet: &Facet) -> bool {
    facet
        .as_map()
        .map_or(true, |m| m.get_bool_or("visible", true))
}

fn put(node: NodeId, facet: FacetId, key: &str, value: impl Into<FacetValue>) -> NodeChange {
    NodeChange::facet(
        node,
        facet,
        FacetDiff::Put {
            key: key.into(),
            value: value.into(),
        },
    )
}

fn link(node: NodeId, facet: FacetId, child: NodeId) -> NodeChange {
    NodeChange::facet(
        node,
        facet,
        FacetDiff::Splice {
            index: 0,
            remove: 0,
            items: vec![FacetValue::Node(child)],
        },
    )
}

#[test]
fn inactive_nodes_hold_back_changes_until_they_become_active() {
    let registry = FacetRegistry::bootstrap([
        FacetSpec::map("visibility").with_change_gate(visible),
        FacetSpec::map("props"),
        FacetSpec::map("tag").always_reported(),
        FacetSpec::node_list("children"),
    ])
    .unwrap();
    let visibility = registry.id_of("visibility").unwrap();
    let props = registry.id_of("props").unwrap();
    let tag = registry.id_of("tag").unwrap();
    let children = registry.id_of("children").unwrap();
    let mut tree = StateTree::new(registry);
    let root = tree.root();

    let panel = tree.create_node();
    tree.map(panel, visibility).unwrap().put("visible", false).unwrap();
    tree.map(panel, props).unwrap().put("text", "hi").unwrap();
    tree.map(panel, tag).unwrap().put("name", "div").unwrap();
    let label = tree.create_node();
    tree.map(label, props).unwrap().put("x", 1).unwrap();
    tree.list(panel, children).unwrap().add(label).unwrap();
    tree.list(root, children).unwrap().add(panel).unwrap();

    assert!(tree.is_inactive(panel));
    assert!(tree.is_inactive(label));
    assert!(!tree.is_inactive(root));

    assert_eq!(
        tree.flush().changes,
        vec![
            link(root, children, panel),
            NodeChange::attach(panel),
            put(panel, visibility, "visible", false),
            put(panel, tag, "name", "div"),
            NodeChange::attach(label),
        ]
    );
    assert!(tree.is_dirty(label), "shadowed node stays queued");
    assert!(!tree.is_dirty(panel));

    assert!(tree.flush().is_empty());
    assert!(tree.is_dirty(label));

    tree.map(panel, visibility).unwrap().put("visible", true).unwrap();
    assert!(!tree.is_inactive(label));
    assert_eq!(
        tree.flush().changes,
        vec![
            put(label, props, "x", 1),
            put(panel, visibility, "visible", true),
            put(panel, props, "text", "hi"),
            link(panel, children, label),
        ]
    );
    assert!(tree.flush().is_empty());
    assert!(!tree.is_dirty(label));
}

#[test]
fn reported_facets_are_sent_again_after_a_reattach() {
    let registry = FacetRegistry::bootstrap([
        FacetSpec::map("visibility").with_change_gate(visible),
        FacetSpec::map("tag").always_reported(),
        FacetSpec::node_list("children"),
    ])
    .unwrap();
    let visibility = registry.id_of("visibility").unwrap();
    let tag = registry.id_of("tag").unwrap();
    let children = registry.id_of("children").unwrap();
    let mut tree = StateTree::new(registry);
    let root = tree.root();

    let node = tree.create_node();
    tree.map(node, visibility).unwrap().put("visible", false).unwrap();
    tree.map(node, tag).unwrap().put("name", "span").unwrap();
    tree.list(root, children).unwrap().add(node).unwrap();
    tree.flush();

    tree.map(node, tag).unwrap().put("name", "b").unwrap();
    assert!(tree.flush().is_empty());

    tree.list(root, children).unwrap().remove(0).unwrap();
    tree.flush();
    tree.list(root, children).unwrap().add(node).unwrap();
    assert_eq!(
        tree.flush().changes,
        vec![
            link(root, children, node),
            NodeChange::attach(node),
            put(node, visibility, "visible", false),
            put(node, tag, "name", "b"),
        ]
    );
}
