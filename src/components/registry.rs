use std::collections::HashMap;
use std::sync::Arc;

use super::{Adapter, StageHandler, Transformer, Validator};
use crate::error::{ComponentRole, PlantlinkError, PlantlinkResult};

/// Pipeline-owned mapping from component id to collaborator
///
/// Entries are shared references; the registry never starts or stops what it
/// holds. An id can be registered only once per role.
#[derive(Clone, Default)]
pub struct ComponentRegistry {
    source_adapters: HashMap<String, Arc<dyn Adapter>>,
    sink_adapters: HashMap<String, Arc<dyn Adapter>>,
    transformers: HashMap<String, Arc<dyn Transformer>>,
    validators: HashMap<String, Arc<dyn Validator>>,
    handlers: HashMap<String, Arc<dyn StageHandler>>,
}

fn insert_unique<T: ?Sized>(
    map: &mut HashMap<String, Arc<T>>,
    role: ComponentRole,
    id: String,
    component: Arc<T>,
) -> PlantlinkResult<()> {
    if map.contains_key(&id) {
        return Err(PlantlinkError::DuplicateComponent { role, id });
    }
    map.insert(id, component);
    Ok(())
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_source_adapter(&mut self, adapter: Arc<dyn Adapter>) -> PlantlinkResult<()> {
        let id = adapter.id().to_string();
        insert_unique(
            &mut self.source_adapters,
            ComponentRole::SourceAdapter,
            id,
            adapter,
        )
    }

    pub fn add_sink_adapter(&mut self, adapter: Arc<dyn Adapter>) -> PlantlinkResult<()> {
        let id = adapter.id().to_string();
        insert_unique(&mut self.sink_adapters, ComponentRole::SinkAdapter, id, adapter)
    }

    pub fn add_transformer(
        &mut self,
        id: impl Into<String>,
        transformer: Arc<dyn Transformer>,
    ) -> PlantlinkResult<()> {
        insert_unique(
            &mut self.transformers,
            ComponentRole::Transformer,
            id.into(),
            transformer,
        )
    }

    pub fn add_validator(
        &mut self,
        id: impl Into<String>,
        validator: Arc<dyn Validator>,
    ) -> PlantlinkResult<()> {
        insert_unique(
            &mut self.validators,
            ComponentRole::Validator,
            id.into(),
            validator,
        )
    }

    pub fn add_handler(
        &mut self,
        id: impl Into<String>,
        handler: Arc<dyn StageHandler>,
    ) -> PlantlinkResult<()> {
        insert_unique(
            &mut self.handlers,
            ComponentRole::CustomHandler,
            id.into(),
            handler,
        )
    }

    pub fn source_adapter(&self, id: &str) -> Option<Arc<dyn Adapter>> {
        self.source_adapters.get(id).cloned()
    }

    pub fn sink_adapter(&self, id: &str) -> Option<Arc<dyn Adapter>> {
        self.sink_adapters.get(id).cloned()
    }

    pub fn transformer(&self, id: &str) -> Option<Arc<dyn Transformer>> {
        self.transformers.get(id).cloned()
    }

    pub fn validator(&self, id: &str) -> Option<Arc<dyn Validator>> {
        self.validators.get(id).cloned()
    }

    pub fn handler(&self, id: &str) -> Option<Arc<dyn StageHandler>> {
        self.handlers.get(id).cloned()
    }

    /// Look up a source adapter, failing with `ComponentNotFound`
    pub fn require_source_adapter(&self, id: &str) -> PlantlinkResult<Arc<dyn Adapter>> {
        self.source_adapter(id)
            .ok_or_else(|| PlantlinkError::ComponentNotFound {
                role: ComponentRole::SourceAdapter,
                id: id.to_string(),
            })
    }

    /// Every registered adapter once, sources first; an adapter registered
    /// in both roles under the same id is listed once
    pub fn adapters(&self) -> Vec<Arc<dyn Adapter>> {
        let mut seen = std::collections::HashSet::new();
        let mut ids: Vec<&String> = self.source_adapters.keys().collect();
        ids.sort();
        let mut sink_ids: Vec<&String> = self.sink_adapters.keys().collect();
        sink_ids.sort();

        let mut adapters = Vec::new();
        for id in ids {
            if seen.insert(id.clone()) {
                adapters.extend(self.source_adapters.get(id).cloned());
            }
        }
        for id in sink_ids {
            if seen.insert(id.clone()) {
                adapters.extend(self.sink_adapters.get(id).cloned());
            }
        }
        adapters
    }

    /// Number of registered components across all roles
    pub fn count(&self) -> usize {
        self.source_adapters.len()
            + self.sink_adapters.len()
            + self.transformers.len()
            + self.validators.len()
            + self.handlers.len()
    }
}
