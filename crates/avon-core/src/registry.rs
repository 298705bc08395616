//! [`ModelRegistry`] – the set of named, addressable models.
//!
//! Models are registered during start-up, before the server starts serving.
//! The registry is append-only: there is no update or removal, only a full
//! [`ModelRegistry::clear`] at shutdown.  Parents must be registered before
//! their children, so the parent relation always forms a tree.

use std::collections::HashMap;

use avon_types::{AvonError, InterfaceKind};
use serde::{Deserialize, Serialize};

/// Opaque backend instance token.
///
/// The core never interprets a handle; it only passes it back to the
/// backend's callbacks so the backend can select the right instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Handle(pub u64);

impl From<u64> for Handle {
    fn from(raw: u64) -> Self {
        Handle(raw)
    }
}

impl From<usize> for Handle {
    fn from(raw: usize) -> Self {
        Handle(raw as u64)
    }
}

/// Stable identifier of a registered model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelId(usize);

impl ModelId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A registered model.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pub name: String,
    /// Free-form type label, e.g. `"sicklms200"`.
    pub prototype: String,
    pub interface: InterfaceKind,
    pub parent: Option<ModelId>,
    pub handle: Handle,
}

/// Serialisable description of one model, used by the model index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub name: String,
    pub prototype: String,
    pub interface: InterfaceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

/// Append-only registry of models keyed by unique name.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: Vec<Model>,
    by_name: HashMap<String, ModelId>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new model.
    ///
    /// # Errors
    ///
    /// - [`AvonError::InvalidName`] for an empty name or one containing `/`
    ///   (names are used as path segments by transports).
    /// - [`AvonError::DuplicateName`] when `name` is already registered.
    /// - [`AvonError::UnknownParent`] when `parent` is given but unknown.
    /// - [`AvonError::InvalidInterface`] for reserved interface kinds.
    ///
    /// The registry is unchanged when an error is returned.
    pub fn register(
        &mut self,
        name: &str,
        prototype: &str,
        interface: InterfaceKind,
        parent: Option<&str>,
        handle: Handle,
    ) -> Result<ModelId, AvonError> {
        if name.is_empty() || name.contains('/') {
            return Err(AvonError::InvalidName(name.to_string()));
        }
        if self.by_name.contains_key(name) {
            return Err(AvonError::DuplicateName {
                name: name.to_string(),
            });
        }
        let parent = match parent {
            Some(p) => Some(*self.by_name.get(p).ok_or_else(|| AvonError::UnknownParent {
                name: name.to_string(),
                parent: p.to_string(),
            })?),
            None => None,
        };
        if !interface.is_usable() {
            return Err(AvonError::InvalidInterface(interface.to_string()));
        }

        let id = ModelId(self.models.len());
        self.models.push(Model {
            name: name.to_string(),
            prototype: prototype.to_string(),
            interface,
            parent,
            handle,
        });
        self.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn lookup(&self, name: &str) -> Option<&Model> {
        self.by_name.get(name).map(|id| &self.models[id.0])
    }

    /// Like [`lookup`](Self::lookup) but yields [`AvonError::UnknownModel`].
    pub fn resolve(&self, name: &str) -> Result<&Model, AvonError> {
        self.lookup(name)
            .ok_or_else(|| AvonError::UnknownModel(name.to_string()))
    }

    pub fn get(&self, id: ModelId) -> Option<&Model> {
        self.models.get(id.0)
    }

    pub fn id_of(&self, name: &str) -> Option<ModelId> {
        self.by_name.get(name).copied()
    }

    pub fn parent_of(&self, model: &Model) -> Option<&Model> {
        model.parent.and_then(|p| self.get(p))
    }

    /// Direct children of `id`, in registration order.
    pub fn children(&self, id: ModelId) -> impl Iterator<Item = &Model> {
        self.models.iter().filter(move |m| m.parent == Some(id))
    }

    /// All models in registration order (parents before children).
    pub fn iter(&self) -> impl Iterator<Item = &Model> {
        self.models.iter()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Describe every model, in registration order.
    pub fn tree(&self) -> Vec<ModelSummary> {
        self.models
            .iter()
            .map(|m| ModelSummary {
                name: m.name.clone(),
                prototype: m.prototype.clone(),
                interface: m.interface,
                parent: self.parent_of(m).map(|p| p.name.clone()),
            })
            .collect()
    }

    /// Drop every model.  Only used at shutdown.
    pub fn clear(&mut self) {
        self.models.clear();
        self.by_name.clear();
    }
}
