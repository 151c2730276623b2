//! Component store.
//!
//! Components live in parallel arrays indexed by entity id, one array per
//! component kind, plus one presence mask per entity. A slot in a component
//! array holds meaningful data only while its bit is set in the entity's
//! mask. Clearing the bit deletes the component logically; arrays only ever
//! grow, so entity ids stay valid indices for the lifetime of the store.

use serde::{Deserialize, Serialize};

use crate::{
    ecs::{EntityId, WorldError},
    game::PlayerSlot,
    math::Rect,
};

bitflags::bitflags! {
    /// Component presence bits. Each component kind owns exactly one bit.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ComponentMask: u32 {
        /// Reserved; never attached by the store.
        const UNKNOWN = 1 << 0;
        const NAME = 1 << 1;
        const IMAGE = 1 << 2;
        const COLLIDER = 1 << 3;
        const PLAYER = 1 << 4;
    }
}

impl Default for ComponentMask {
    fn default() -> Self {
        Self::empty()
    }
}

/// Display name.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Name(pub String);

/// Image or texture reference, resolved by the client.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Image(pub String);

/// Collision shape in world units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum Collider {
    Rect(Rect),
    Circle { x: i32, y: i32, radius: i32 },
}

impl Default for Collider {
    fn default() -> Self {
        Collider::Rect(Rect::default())
    }
}

impl Collider {
    /// Whether the point lies inside the shape.
    pub fn contains(&self, px: i32, py: i32) -> bool {
        match *self {
            Collider::Rect(rect) => rect.contains(px, py),
            Collider::Circle { x, y, radius } => {
                let dx = i128::from(px) - i128::from(x);
                let dy = i128::from(py) - i128::from(y);
                let r = i128::from(radius);
                dx * dx + dy * dy <= r * r
            }
        }
    }
}

/// Marks an entity as a player avatar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlayerMarker {
    /// Session player slot controlling this avatar, if any.
    pub slot: Option<PlayerSlot>,
}

/// Closed set of component values the store knows how to hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Component {
    Name(Name),
    Image(Image),
    Collider(Collider),
    Player(PlayerMarker),
}

impl Component {
    /// Presence bit owned by this component's kind.
    pub fn mask(&self) -> ComponentMask {
        match self {
            Component::Name(_) => ComponentMask::NAME,
            Component::Image(_) => ComponentMask::IMAGE,
            Component::Collider(_) => ComponentMask::COLLIDER,
            Component::Player(_) => ComponentMask::PLAYER,
        }
    }
}

impl From<Name> for Component {
    fn from(v: Name) -> Self {
        Component::Name(v)
    }
}

impl From<Image> for Component {
    fn from(v: Image) -> Self {
        Component::Image(v)
    }
}

impl From<Collider> for Component {
    fn from(v: Collider) -> Self {
        Component::Collider(v)
    }
}

impl From<PlayerMarker> for Component {
    fn from(v: PlayerMarker) -> Self {
        Component::Player(v)
    }
}

/// Parallel component arrays plus presence masks.
#[derive(Debug, Default)]
pub struct ComponentStore {
    masks: Vec<ComponentMask>,
    names: Vec<Name>,
    images: Vec<Image>,
    colliders: Vec<Collider>,
    players: Vec<PlayerMarker>,
}

impl ComponentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entities ever allocated.
    pub fn len(&self) -> usize {
        self.masks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.masks.is_empty()
    }

    /// Appends a zero-valued slot to every array and returns its id.
    pub(crate) fn push_default(&mut self) -> EntityId {
        let id = EntityId(self.masks.len());
        self.masks.push(ComponentMask::empty());
        self.names.push(Name::default());
        self.images.push(Image::default());
        self.colliders.push(Collider::default());
        self.players.push(PlayerMarker::default());
        id
    }

    fn check(&self, id: EntityId) -> Result<usize, WorldError> {
        let index = id.index();
        if index < self.masks.len() {
            Ok(index)
        } else {
            Err(WorldError::EntityOutOfRange {
                id: id.0,
                len: self.masks.len(),
            })
        }
    }

    /// Writes `component` into its array and sets its presence bit.
    pub fn insert(&mut self, id: EntityId, component: Component) -> Result<(), WorldError> {
        let index = self.check(id)?;
        let bit = component.mask();
        match component {
            Component::Name(v) => self.names[index] = v,
            Component::Image(v) => self.images[index] = v,
            Component::Collider(v) => self.colliders[index] = v,
            Component::Player(v) => self.players[index] = v,
        }
        self.masks[index] |= bit;
        Ok(())
    }

    /// Clears `bits` from the entity's mask. Array contents are left alone.
    pub fn remove(&mut self, id: EntityId, bits: ComponentMask) -> Result<(), WorldError> {
        let index = self.check(id)?;
        self.masks[index].remove(bits);
        Ok(())
    }

    pub fn mask(&self, id: EntityId) -> Option<ComponentMask> {
        self.masks.get(id.index()).copied()
    }

    /// Whether the entity carries any of `bits`.
    pub fn has(&self, id: EntityId, bits: ComponentMask) -> bool {
        self.mask(id).is_some_and(|m| m.intersects(bits))
    }

    /// Every entity whose mask intersects `bits`, in id order.
    ///
    /// This is a linear scan over all masks; there is no index.
    pub fn entities_with(&self, bits: ComponentMask) -> Vec<EntityId> {
        self.masks
            .iter()
            .enumerate()
            .filter(|(_, m)| m.intersects(bits))
            .map(|(i, _)| EntityId(i))
            .collect()
    }

    pub fn name(&self, id: EntityId) -> Option<&Name> {
        self.has(id, ComponentMask::NAME)
            .then(|| &self.names[id.index()])
    }

    pub fn image(&self, id: EntityId) -> Option<&Image> {
        self.has(id, ComponentMask::IMAGE)
            .then(|| &self.images[id.index()])
    }

    pub fn collider(&self, id: EntityId) -> Option<&Collider> {
        self.has(id, ComponentMask::COLLIDER)
            .then(|| &self.colliders[id.index()])
    }

    pub fn player(&self, id: EntityId) -> Option<&PlayerMarker> {
        self.has(id, ComponentMask::PLAYER)
            .then(|| &self.players[id.index()])
    }

    #[cfg(test)]
    fn column_lengths(&self) -> [usize; 5] {
        [
            self.masks.len(),
            self.names.len(),
            self.images.len(),
            self.colliders.len(),
            self.players.len(),
        ]
    }
}
