//! Per-vertex derived caches
//!
//! A cache is a quantity derived from one vertex's estimate and a tuple of
//! shared parameters (e.g. the world-to-sensor transform of a pose combined
//! with a sensor offset). Caches are owned by the vertex they derive from,
//! keyed by `(cache type, parameter ids)`, and invalidated through the
//! vertex's monotonic estimate version: each entry records the version it was
//! computed at and recomputes on mismatch.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

use crate::graph::parameter::ParameterContainer;
use crate::graph::vertex::Vertex;
use crate::graph::{GraphError, ParameterId};

/// Key of a cache entry: the concrete cache type plus the ordered ids of the
/// parameters it depends on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    kind: TypeId,
    parameters: Vec<ParameterId>,
}

impl CacheKey {
    pub fn of<C: Cache + 'static>(parameters: &[ParameterId]) -> Self {
        CacheKey {
            kind: TypeId::of::<C>(),
            parameters: parameters.to_vec(),
        }
    }

    pub fn parameters(&self) -> &[ParameterId] {
        &self.parameters
    }
}

/// A derived quantity recomputed whenever the owning vertex's estimate
/// changes. `Sync` because the parallel edge passes read caches through their
/// owning vertices.
pub trait Cache: Send + Sync {
    /// Recompute the cached quantities from the owning vertex and the shared
    /// parameters.
    fn update(
        &mut self,
        vertex: &dyn Vertex,
        parameters: &ParameterContainer,
    ) -> Result<(), GraphError>;

    fn as_any(&self) -> &dyn Any;
}

struct CacheSlot {
    cache: Box<dyn Cache>,
    computed_at: Option<u64>,
}

/// Container of the caches owned by one vertex.
#[derive(Default)]
pub struct CacheContainer {
    entries: HashMap<CacheKey, CacheSlot>,
}

impl fmt::Debug for CacheContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheContainer")
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl CacheContainer {
    /// Install a cache for the given parameter tuple. Returns false if an
    /// equal entry already exists (installation is idempotent).
    pub fn install<C: Cache + 'static>(&mut self, parameters: &[ParameterId], cache: C) -> bool {
        let key = CacheKey::of::<C>(parameters);
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(
            key,
            CacheSlot {
                cache: Box::new(cache),
                computed_at: None,
            },
        );
        true
    }

    pub fn contains<C: Cache + 'static>(&self, parameters: &[ParameterId]) -> bool {
        self.entries.contains_key(&CacheKey::of::<C>(parameters))
    }

    /// Typed read access; `None` if no such cache is installed.
    pub fn get<C: Cache + 'static>(&self, parameters: &[ParameterId]) -> Option<&C> {
        self.entries
            .get(&CacheKey::of::<C>(parameters))
            .and_then(|slot| slot.cache.as_any().downcast_ref::<C>())
    }

    /// Recompute every entry whose recorded version does not match `version`.
    pub(crate) fn refresh(
        &mut self,
        vertex: &dyn Vertex,
        parameters: &ParameterContainer,
        version: u64,
    ) -> Result<(), GraphError> {
        for slot in self.entries.values_mut() {
            if slot.computed_at != Some(version) {
                slot.cache.update(vertex, parameters)?;
                slot.computed_at = Some(version);
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
