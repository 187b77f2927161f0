//! Scene data
//!
//! Objects, their bounding volumes, the replication countdown that keeps N
//! frame slots in sync, and the camera. The framework owns the objects;
//! everything else refers to them by [`ObjectId`].

mod bounding;
mod camera;
mod object;
mod replication;

pub use bounding::{Aabb, Bounding, BoundingSphere, CollisionKind, ContainmentType, Obb, Ray};
pub use camera::Camera;
pub use object::{
    LightData, LightType, ObjectFlags, ObjectId, ObjectKind, ParticleData, RenderLayer, SceneObject,
    SceneObjectDesc, WidgetData,
};
pub use replication::ReplicationCountdown;
