//! Entity/component world.
//!
//! The world owns a [`ComponentStore`] and the systems that run against it.
//! Entity ids are dense and append-only: the n-th call to
//! [`World::add_entity`] returns id `n`, and ids are never reused.
//!
//! The world is driven by a single caller through [`World::update`]; it has
//! no internal locking or concurrency.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    component::{Component, ComponentMask, ComponentStore, Image, Name, PlayerMarker},
    tile::WorldTile,
};

/// Dense entity id, also the index into every component array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub usize);

impl EntityId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// World operation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorldError {
    #[error("entity {id} out of range (world has {len} entities)")]
    EntityOutOfRange { id: usize, len: usize },
    #[error("invalid world tiles: {0}")]
    InvalidTiles(String),
}

/// A unit of per-tick logic.
pub trait System: Send {
    /// Advances this system by one tick.
    fn update(&mut self, components: &mut ComponentStore);
}

/// Entity registry plus the systems that run over it.
#[derive(Default)]
pub struct World {
    components: ComponentStore,
    systems: Vec<Box<dyn System>>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a new entity with no components.
    pub fn add_entity(&mut self) -> EntityId {
        self.components.push_default()
    }

    /// Adds a component, or overwrites the one already attached.
    pub fn add_or_update_component(
        &mut self,
        id: EntityId,
        component: impl Into<Component>,
    ) -> Result<(), WorldError> {
        self.components.insert(id, component.into())
    }

    /// Detaches the components in `bits`. Stored values are left in place.
    pub fn remove_component(&mut self, id: EntityId, bits: ComponentMask) -> Result<(), WorldError> {
        self.components.remove(id, bits)
    }

    /// Every entity carrying `bits`, in id order. O(n) in entity count.
    pub fn find_all_entities_by_component_type(&self, bits: ComponentMask) -> Vec<EntityId> {
        self.components.entities_with(bits)
    }

    /// Registers a system. Systems run in registration order.
    pub fn add_system(&mut self, system: impl System + 'static) {
        self.systems.push(Box::new(system));
    }

    /// Runs every registered system once.
    pub fn update(&mut self) {
        debug!(
            systems = self.systems.len(),
            entities = self.components.len(),
            "World update"
        );
        for system in &mut self.systems {
            system.update(&mut self.components);
        }
    }

    pub fn components(&self) -> &ComponentStore {
        &self.components
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    pub fn mask(&self, id: EntityId) -> Option<ComponentMask> {
        self.components.mask(id)
    }

    pub fn name(&self, id: EntityId) -> Option<&Name> {
        self.components.name(id)
    }

    pub fn image(&self, id: EntityId) -> Option<&Image> {
        self.components.image(id)
    }

    pub fn player(&self, id: EntityId) -> Option<&PlayerMarker> {
        self.components.player(id)
    }

    /// Spawns a static level tile as a collider + image entity.
    pub fn spawn_tile(&mut self, tile: &WorldTile) -> Result<EntityId, WorldError> {
        let id = self.add_entity();
        for component in tile.components() {
            self.components.insert(id, component)?;
        }
        Ok(id)
    }

    /// Spawns every tile in a JSON array of [`WorldTile`]s.
    pub fn load_tiles_json(&mut self, json: &str) -> Result<Vec<EntityId>, WorldError> {
        let tiles: Vec<WorldTile> =
            serde_json::from_str(json).map_err(|e| WorldError::InvalidTiles(e.to_string()))?;
        let ids = tiles
            .iter()
            .map(|t| self.spawn_tile(t))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(tiles = ids.len(), "Loaded world tiles");
        Ok(ids)
    }
}
