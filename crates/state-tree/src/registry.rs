//! Facet type registry.
//!
//! Facet types are registered once, in a fixed order, before any tree is
//! built. The order assigns each type its wire id (`0, 1, 2, …`), so every
//! process that talks to the same client must register the same types in the
//! same order. The built registry is immutable and shared through an `Arc`.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{Result, StateTreeError};
use crate::facet::Facet;
use crate::tree::StateTree;
use crate::value::{FacetId, NodeId};

/// The storage shape a facet type declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FacetShape {
    Map,
    List,
    /// A list whose elements are child nodes.
    NodeList,
}

/// Builds the facet instance for a node.
pub type FacetFactory = fn(NodeId) -> Facet;

/// Called for every created facet of a node when the node becomes attached.
/// The flag is `true` on the node's first attach only.
pub type AttachHook = fn(&mut StateTree, NodeId, bool);

/// Called for every created facet of a node when the node becomes detached.
pub type DetachHook = fn(&mut StateTree, NodeId);

/// Decides from a facet's content whether its node may send changes. A
/// node with any facet answering `false` is inactive, and so is its whole
/// subtree.
pub type ChangeGate = fn(&Facet) -> bool;

/// Declaration of one facet type.
#[derive(Clone, Copy)]
pub struct FacetSpec {
    pub name: &'static str,
    pub shape: FacetShape,
    factory: Option<FacetFactory>,
    on_attach: Option<AttachHook>,
    on_detach: Option<DetachHook>,
    gate: Option<ChangeGate>,
    reported: bool,
}

impl FacetSpec {
    pub const fn new(name: &'static str, shape: FacetShape) -> Self {
        Self {
            name,
            shape,
            factory: None,
            on_attach: None,
            on_detach: None,
            gate: None,
            reported: false,
        }
    }

    pub const fn map(name: &'static str) -> Self {
        Self::new(name, FacetShape::Map)
    }

    pub const fn list(name: &'static str) -> Self {
        Self::new(name, FacetShape::List)
    }

    pub const fn node_list(name: &'static str) -> Self {
        Self::new(name, FacetShape::NodeList)
    }

    /// Replace the default empty-facet factory.
    pub const fn with_factory(mut self, factory: FacetFactory) -> Self {
        self.factory = Some(factory);
        self
    }

    pub const fn with_attach_hook(mut self, hook: AttachHook) -> Self {
        self.on_attach = Some(hook);
        self
    }

    pub const fn with_detach_hook(mut self, hook: DetachHook) -> Self {
        self.on_detach = Some(hook);
        self
    }

    pub const fn with_change_gate(mut self, gate: ChangeGate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Send this facet's first changes even while the node is inactive.
    pub const fn always_reported(mut self) -> Self {
        self.reported = true;
        self
    }

    pub fn allows_changes(&self, facet: &Facet) -> bool {
        self.gate.map_or(true, |gate| gate(facet))
    }

    pub fn is_reported(&self) -> bool {
        self.reported
    }

    pub fn attach_hook(&self) -> Option<AttachHook> {
        self.on_attach
    }

    pub fn detach_hook(&self) -> Option<DetachHook> {
        self.on_detach
    }
}

impl fmt::Debug for FacetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FacetSpec")
            .field("name", &self.name)
            .field("shape", &self.shape)
            .field("custom_factory", &self.factory.is_some())
            .field("on_attach", &self.on_attach.is_some())
            .field("on_detach", &self.on_detach.is_some())
            .field("gated", &self.gate.is_some())
            .field("reported", &self.reported)
            .finish()
    }
}

/// A facet type known at compile time.
///
/// ```
/// use state_tree::{FacetSpec, FacetType, RegistryBuilder};
///
/// struct ElementData;
/// impl FacetType for ElementData {
///     const SPEC: FacetSpec = FacetSpec::map("elementData");
/// }
///
/// let mut builder = RegistryBuilder::new();
/// let id = builder.register_type::<ElementData>().unwrap();
/// let registry = builder.build();
/// assert_eq!(registry.id_of_type::<ElementData>().unwrap(), id);
/// ```
pub trait FacetType: 'static {
    const SPEC: FacetSpec;
}

/// Collects facet declarations in registration order.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    specs: Vec<FacetSpec>,
    ids: IndexMap<&'static str, FacetId>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `spec` and return its id, the next in sequence.
    pub fn register(&mut self, spec: FacetSpec) -> Result<FacetId> {
        if self.ids.contains_key(spec.name) {
            return Err(StateTreeError::DuplicateFacet(spec.name));
        }
        let raw = u16::try_from(self.specs.len()).map_err(|_| StateTreeError::RegistryFull)?;
        let id = FacetId(raw);
        self.ids.insert(spec.name, id);
        self.specs.push(spec);
        tracing::trace!(facet = spec.name, id = raw, "registered facet type");
        Ok(id)
    }

    pub fn register_type<T: FacetType>(&mut self) -> Result<FacetId> {
        self.register(T::SPEC)
    }

    /// Freeze the registry.
    pub fn build(self) -> Arc<FacetRegistry> {
        Arc::new(FacetRegistry {
            specs: self.specs,
            ids: self.ids,
        })
    }
}

/// Immutable table of facet types.
#[derive(Debug)]
pub struct FacetRegistry {
    specs: Vec<FacetSpec>,
    ids: IndexMap<&'static str, FacetId>,
}

impl FacetRegistry {
    /// Build a registry from an ordered bootstrap list.
    pub fn bootstrap(specs: impl IntoIterator<Item = FacetSpec>) -> Result<Arc<Self>> {
        let mut builder = RegistryBuilder::new();
        for spec in specs {
            builder.register(spec)?;
        }
        Ok(builder.build())
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn id_of(&self, name: &str) -> Result<FacetId> {
        self.ids
            .get(name)
            .copied()
            .ok_or_else(|| StateTreeError::UnregisteredFacet(name.to_owned()))
    }

    pub fn id_of_type<T: FacetType>(&self) -> Result<FacetId> {
        self.id_of(T::SPEC.name)
    }

    pub fn spec(&self, id: FacetId) -> Result<&FacetSpec> {
        self.specs
            .get(id.index())
            .ok_or(StateTreeError::UnknownFacetId(id))
    }

    /// Registered specs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (FacetId, &FacetSpec)> {
        self.specs
            .iter()
            .enumerate()
            .map(|(i, spec)| (FacetId(i as u16), spec))
    }

    /// Instantiate facet `id` for `node`.
    pub fn create(&self, id: FacetId, node: NodeId) -> Result<Facet> {
        let spec = self.spec(id)?;
        let facet = match spec.factory {
            Some(factory) => factory(node),
            None => Facet::empty(spec.shape),
        };
        if facet.shape() != spec.shape {
            return Err(StateTreeError::FactoryShapeMismatch {
                name: spec.name,
                declared: spec.shape,
                actual: facet.shape(),
            });
        }
        Ok(facet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facet::{ListFacet, MapFacet};
    use crate::value::FacetValue;

    struct A;
    impl FacetType for A {
        const SPEC: FacetSpec = FacetSpec::map("a");
    }
    struct B;
    impl FacetType for B {
        const SPEC: FacetSpec = FacetSpec::list("b");
    }
    struct C;
    impl FacetType for C {
        const SPEC: FacetSpec = FacetSpec::node_list("c");
    }

    #[test]
    fn ids_follow_registration_order() {
        let mut builder = RegistryBuilder::new();
        assert_eq!(builder.register_type::<A>().unwrap(), FacetId(0));
        assert_eq!(builder.register_type::<B>().unwrap(), FacetId(1));
        assert_eq!(builder.register_type::<C>().unwrap(), FacetId(2));
        let registry = builder.build();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.id_of("b").unwrap(), FacetId(1));
        assert_eq!(registry.id_of_type::<C>().unwrap(), FacetId(2));
    }

    #[test]
    fn duplicate_registration_rejected() {
        let mut builder = RegistryBuilder::new();
        builder.register_type::<A>().unwrap();
        assert_eq!(
            builder.register_type::<A>(),
            Err(StateTreeError::DuplicateFacet("a"))
        );
        assert_eq!(builder.register(FacetSpec::list("a")), Err(StateTreeError::DuplicateFacet("a")));
    }

    #[test]
    fn unregistered_lookups_rejected() {
        let registry = FacetRegistry::bootstrap([A::SPEC]).unwrap();
        assert_eq!(
            registry.id_of("nope"),
            Err(StateTreeError::UnregisteredFacet("nope".into()))
        );
        assert!(matches!(
            registry.create(FacetId(7), NodeId::ROOT),
            Err(StateTreeError::UnknownFacetId(_))
        ));
    }

    #[test]
    fn bootstrap_order_is_deterministic() {
        let first = FacetRegistry::bootstrap([A::SPEC, B::SPEC, C::SPEC]).unwrap();
        let second = FacetRegistry::bootstrap([A::SPEC, B::SPEC, C::SPEC]).unwrap();
        let names = |r: &FacetRegistry| r.iter().map(|(id, s)| (id, s.name)).collect::<Vec<_>>();
        assert_eq!(names(&first), names(&second));
    }

    #[test]
    fn create_uses_factory_and_checks_shape() {
        fn seeded(_: NodeId) -> Facet {
            let mut map = MapFacet::new();
            map.put_untracked("seed", FacetValue::from(1));
            Facet::Map(map)
        }
        fn wrong(_: NodeId) -> Facet {
            Facet::List(ListFacet::new())
        }
        let registry = FacetRegistry::bootstrap([
            FacetSpec::map("seeded").with_factory(seeded),
            FacetSpec::map("wrong").with_factory(wrong),
            C::SPEC,
        ])
        .unwrap();

        let facet = registry.create(FacetId(0), NodeId::ROOT).unwrap();
        assert_eq!(facet.as_map().unwrap().get_i64_or("seed", 0), 1);

        assert_eq!(
            registry.create(FacetId(1), NodeId::ROOT).unwrap_err(),
            StateTreeError::FactoryShapeMismatch {
                name: "wrong",
                declared: FacetShape::Map,
                actual: FacetShape::List,
            }
        );

        let nodes = registry.create(FacetId(2), NodeId::ROOT).unwrap();
        assert_eq!(nodes.shape(), FacetShape::NodeList);
    }

    #[test]
    fn change_gate_reads_facet_content() {
        fn visible(facet: &Facet) -> bool {
            facet.as_map().map_or(true, |m| m.get_bool_or("visible", true))
        }
        let gated = FacetSpec::map("visibility").with_change_gate(visible);
        let mut map = MapFacet::new();
        assert!(gated.allows_changes(&Facet::Map(map.clone())));
        map.put_untracked("visible", FacetValue::from(false));
        assert!(!gated.allows_changes(&Facet::Map(map)));
        assert!(A::SPEC.allows_changes(&Facet::List(ListFacet::new())));
        assert!(!A::SPEC.is_reported());
        assert!(FacetSpec::map("tag").always_reported().is_reported());
    }
}
