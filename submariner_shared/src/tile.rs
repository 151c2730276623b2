//! Static level geometry.

use serde::{Deserialize, Serialize};

use crate::{
    component::{Collider, Component, Image},
    math::Rect,
};

/// One tile of level geometry: a solid rectangle drawn with a texture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldTile {
    pub rect: Rect,
    pub texture: String,
}

impl WorldTile {
    pub fn new(rect: Rect, texture: impl Into<String>) -> Self {
        Self {
            rect,
            texture: texture.into(),
        }
    }

    /// Components an entity needs to represent this tile.
    pub fn components(&self) -> [Component; 2] {
        [
            Component::Collider(Collider::Rect(self.rect)),
            Component::Image(Image(self.texture.clone())),
        ]
    }
}
