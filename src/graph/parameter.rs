//! Shared read-only parameters
//!
//! Parameters are named, id-addressed constants referenced by edges (sensor
//! offsets, intrinsics). They are set up before optimization and never change
//! during a solve, so edges and caches may read them concurrently.

use std::any::Any;
use std::collections::HashMap;

use crate::graph::{GraphError, ParameterId, TokenScanner};

/// An id-addressed shared constant referenced by edges.
pub trait Parameter: Send + Sync {
    fn id(&self) -> ParameterId;

    fn set_id(&mut self, id: ParameterId);

    /// Read the parameter payload from its whitespace-delimited wire form.
    fn read_data(&mut self, scanner: &mut TokenScanner) -> Result<(), GraphError>;

    /// Write the parameter payload in its wire form.
    fn write_data(&self, out: &mut String);

    fn as_any(&self) -> &dyn Any;
}

/// Id-keyed container of the parameters attached to a graph.
#[derive(Default)]
pub struct ParameterContainer {
    parameters: HashMap<ParameterId, Box<dyn Parameter>>,
}

impl ParameterContainer {
    /// Insert a parameter; returns false if the id is already taken.
    pub fn add_parameter(&mut self, parameter: Box<dyn Parameter>) -> bool {
        let id = parameter.id();
        if self.parameters.contains_key(&id) {
            return false;
        }
        self.parameters.insert(id, parameter);
        true
    }

    pub fn parameter(&self, id: ParameterId) -> Option<&dyn Parameter> {
        self.parameters.get(&id).map(|p| p.as_ref())
    }

    /// Typed parameter lookup.
    pub fn get<P: Parameter + 'static>(&self, id: ParameterId) -> Option<&P> {
        self.parameters
            .get(&id)
            .and_then(|p| p.as_any().downcast_ref::<P>())
    }

    pub fn contains(&self, id: ParameterId) -> bool {
        self.parameters.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ParameterId> + '_ {
        self.parameters.keys().copied()
    }
}
