//! Warehouses of callback objects, indexed by subdomain or boundary id.
//!
//! A warehouse is built once before any loop runs and is only read afterwards, so execution
//! contexts share it without synchronization. Looking up the active objects of an id is a
//! hash lookup returning a borrowed slice.
use crate::error::LoopError;
use crate::objects::{MeshObject, Restriction};
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

/// Whether a warehouse indexes objects by subdomain or by boundary id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarehouseKind {
    Block,
    Boundary,
}

pub struct ObjectWarehouse<O: ?Sized> {
    kind: WarehouseKind,
    objects: Vec<Arc<O>>,
    active: FxHashMap<u32, Vec<Arc<O>>>,
}

impl<O: ?Sized> fmt::Debug for ObjectWarehouse<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectWarehouse")
            .field("kind", &self.kind)
            .field("num_objects", &self.objects.len())
            .field("num_ids", &self.active.len())
            .finish()
    }
}

impl<O: ?Sized> ObjectWarehouse<O> {
    pub fn kind(&self) -> WarehouseKind {
        self.kind
    }

    /// The objects active on the given subdomain or boundary id, in registration order.
    pub fn active_objects(&self, id: u32) -> &[Arc<O>] {
        self.active.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_active_objects(&self, id: u32) -> bool {
        !self.active_objects(id).is_empty()
    }

    pub fn has_objects(&self) -> bool {
        !self.objects.is_empty()
    }

    /// All registered objects, in registration order.
    pub fn objects(&self) -> &[Arc<O>] {
        &self.objects
    }
}

/// Collects objects and validates their restrictions against the ids known to the mesh.
pub struct WarehouseBuilder<O: ?Sized> {
    kind: WarehouseKind,
    objects: Vec<Arc<O>>,
}

impl<O: ?Sized + MeshObject> WarehouseBuilder<O> {
    pub fn new(kind: WarehouseKind) -> Self {
        Self {
            kind,
            objects: Vec::new(),
        }
    }

    pub fn add(&mut self, object: Arc<O>) -> &mut Self {
        self.objects.push(object);
        self
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn objects(&self) -> &[Arc<O>] {
        &self.objects
    }

    /// Builds the warehouse. `known_ids` are the subdomain or boundary ids of the mesh.
    ///
    /// Fails if an object names an id the mesh does not have, or if its restriction is of
    /// the wrong kind for this warehouse.
    pub fn build(self, known_ids: &[u32]) -> Result<ObjectWarehouse<O>, LoopError> {
        let mut active: FxHashMap<u32, Vec<Arc<O>>> = FxHashMap::default();

        for object in &self.objects {
            let ids = match (self.kind, object.restriction()) {
                (_, Restriction::Everywhere) => known_ids.to_vec(),
                (WarehouseKind::Block, Restriction::Subdomains(ids)) => ids,
                (WarehouseKind::Boundary, Restriction::Boundaries(ids)) => ids,
                (WarehouseKind::Block, Restriction::Boundaries(_)) => {
                    return Err(LoopError::setup(format!(
                        "block object '{}' is restricted to boundaries",
                        object.name()
                    )));
                }
                (WarehouseKind::Boundary, Restriction::Subdomains(_)) => {
                    return Err(LoopError::setup(format!(
                        "boundary object '{}' is restricted to subdomains",
                        object.name()
                    )));
                }
            };

            for id in ids {
                if !known_ids.contains(&id) {
                    let what = match self.kind {
                        WarehouseKind::Block => "subdomain",
                        WarehouseKind::Boundary => "boundary",
                    };
                    return Err(LoopError::setup(format!(
                        "object '{}' is restricted to unknown {} {}",
                        object.name(),
                        what,
                        id
                    )));
                }
                let list = active.entry(id).or_default();
                // Listing the same id twice must not register the object twice
                if !list.iter().any(|existing| Arc::ptr_eq(existing, object)) {
                    list.push(Arc::clone(object));
                }
            }
        }

        Ok(ObjectWarehouse {
            kind: self.kind,
            objects: self.objects,
            active,
        })
    }
}
