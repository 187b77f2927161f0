//! Bounding volumes
//!
//! Every collision and containment query goes through [`Bounding`], which
//! dispatches once per variant pair. The octree only ever asks one question,
//! [`Bounding::contained_by`], and relies on the `Contains` answer being exact.

use crate::foundation::math::{Mat3, Quat, Transform, Vec3};

/// How one volume relates to another
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainmentType {
    /// No overlap
    Disjoint,
    /// Overlapping but not fully inside
    Intersects,
    /// Fully inside
    Contains,
}

/// Which volume an object derives from its mesh's local box
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollisionKind {
    /// World-aligned box enclosing the transformed local box
    #[default]
    Aabb,
    /// Local box carried through the object's rotation
    Obb,
    /// Sphere enclosing the local box
    Sphere,
    /// Not collidable
    None,
}

/// A ray for picking and ray queries
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    /// Origin in world space
    pub origin: Vec3,
    /// Unit direction
    pub direction: Vec3,
}

impl Ray {
    /// Create a ray; `direction` is normalized
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
        }
    }

    /// Point at distance `t` along the ray
    pub fn point_at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// Axis-aligned box stored as center and half-extents
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Center
    pub center: Vec3,
    /// Half-size on each axis
    pub extents: Vec3,
}

impl Aabb {
    /// Box from center and half-extents
    pub fn new(center: Vec3, extents: Vec3) -> Self {
        Self { center, extents }
    }

    /// Box spanning two corners
    pub fn from_min_max(min: Vec3, max: Vec3) -> Self {
        Self {
            center: (min + max) * 0.5,
            extents: (max - min) * 0.5,
        }
    }

    /// Minimum corner
    pub fn min(&self) -> Vec3 {
        self.center - self.extents
    }

    /// Maximum corner
    pub fn max(&self) -> Vec3 {
        self.center + self.extents
    }

    /// Whether `point` lies inside or on the boundary
    pub fn contains_point(&self, point: &Vec3) -> bool {
        let (min, max) = (self.min(), self.max());
        (0..3).all(|i| point[i] >= min[i] && point[i] <= max[i])
    }

    /// Relation of `other` to this box
    pub fn contains(&self, other: &Self) -> ContainmentType {
        let (min, max) = (self.min(), self.max());
        let (other_min, other_max) = (other.min(), other.max());

        if (0..3).any(|i| other_max[i] < min[i] || other_min[i] > max[i]) {
            ContainmentType::Disjoint
        } else if (0..3).all(|i| other_min[i] >= min[i] && other_max[i] <= max[i]) {
            ContainmentType::Contains
        } else {
            ContainmentType::Intersects
        }
    }

    /// Whether the boxes overlap, touching included
    pub fn intersects(&self, other: &Self) -> bool {
        let delta = (self.center - other.center).abs();
        let reach = self.extents + other.extents;
        (0..3).all(|i| delta[i] <= reach[i])
    }

    /// Slab test; distance to the entry point, or 0 when starting inside
    pub fn intersect_ray(&self, ray: &Ray) -> Option<f32> {
        let (min, max) = (self.min(), self.max());
        let mut t_min = f32::NEG_INFINITY;
        let mut t_max = f32::INFINITY;

        for i in 0..3 {
            if ray.direction[i] == 0.0 {
                if ray.origin[i] < min[i] || ray.origin[i] > max[i] {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / ray.direction[i];
            let t1 = (min[i] - ray.origin[i]) * inv;
            let t2 = (max[i] - ray.origin[i]) * inv;
            t_min = t_min.max(t1.min(t2));
            t_max = t_max.min(t1.max(t2));
        }

        (t_max >= t_min && t_max >= 0.0).then(|| t_min.max(0.0))
    }

    /// World-aligned box enclosing this box after `transform`
    pub fn transformed(&self, transform: &Transform) -> Self {
        let linear = rotation_scale(transform);
        Self {
            center: transform.transform_point(self.center),
            extents: linear.abs() * self.extents,
        }
    }

    fn closest_point(&self, point: &Vec3) -> Vec3 {
        let (min, max) = (self.min(), self.max());
        Vec3::new(
            point.x.clamp(min.x, max.x),
            point.y.clamp(min.y, max.y),
            point.z.clamp(min.z, max.z),
        )
    }
}

/// Oriented box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Obb {
    /// Center
    pub center: Vec3,
    /// Half-size along each local axis
    pub extents: Vec3,
    /// Rotation from local to world
    pub orientation: Quat,
}

impl Obb {
    /// Oriented box from center, half-extents and rotation
    pub fn new(center: Vec3, extents: Vec3, orientation: Quat) -> Self {
        Self {
            center,
            extents,
            orientation,
        }
    }

    /// Local axes in world space
    pub fn axes(&self) -> [Vec3; 3] {
        [
            self.orientation * Vec3::x(),
            self.orientation * Vec3::y(),
            self.orientation * Vec3::z(),
        ]
    }

    /// Smallest world-aligned box around this one
    pub fn enclosing_aabb(&self) -> Aabb {
        let rotation = self.orientation.to_rotation_matrix().into_inner();
        Aabb::new(self.center, rotation.abs() * self.extents)
    }

    fn from_aabb(aabb: &Aabb) -> Self {
        Self::new(aabb.center, aabb.extents, Quat::identity())
    }

    fn projected_radius(&self, axis: &Vec3) -> f32 {
        self.axes()
            .iter()
            .zip(self.extents.iter())
            .map(|(local, extent)| local.dot(axis).abs() * extent)
            .sum()
    }

    /// Separating-axis test against another oriented box
    fn overlaps(&self, other: &Self) -> bool {
        let ours = self.axes();
        let theirs = other.axes();
        let offset = other.center - self.center;

        let mut axes = Vec::with_capacity(15);
        axes.extend_from_slice(&ours);
        axes.extend_from_slice(&theirs);
        for a in &ours {
            for b in &theirs {
                let cross = a.cross(b);
                // Parallel edges add nothing the face axes have not covered.
                if cross.norm_squared() > 1e-6 {
                    axes.push(cross);
                }
            }
        }

        axes.iter().all(|axis| {
            offset.dot(axis).abs() <= self.projected_radius(axis) + other.projected_radius(axis)
        })
    }

    fn closest_point(&self, point: &Vec3) -> Vec3 {
        let offset = point - self.center;
        self.axes()
            .iter()
            .zip(self.extents.iter())
            .fold(self.center, |closest, (axis, extent)| {
                closest + axis * offset.dot(axis).clamp(-extent, *extent)
            })
    }

    fn intersect_ray(&self, ray: &Ray) -> Option<f32> {
        // Rotation preserves length, so distances in the local frame hold in world space.
        let inverse = self.orientation.inverse();
        let local = Ray {
            origin: inverse * (ray.origin - self.center),
            direction: inverse * ray.direction,
        };
        Aabb::new(Vec3::zeros(), self.extents).intersect_ray(&local)
    }

    fn transformed(&self, transform: &Transform) -> Self {
        Self {
            center: transform.transform_point(self.center),
            extents: self.extents.component_mul(&transform.scale.abs()),
            orientation: transform.rotation * self.orientation,
        }
    }
}

/// Sphere
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    /// Center
    pub center: Vec3,
    /// Radius
    pub radius: f32,
}

impl BoundingSphere {
    /// Sphere from center and radius
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Whether the spheres overlap, touching included
    pub fn intersects(&self, other: &Self) -> bool {
        let radius_sum = self.radius + other.radius;
        (self.center - other.center).norm_squared() <= radius_sum * radius_sum
    }

    /// Nearest positive hit distance
    pub fn intersect_ray(&self, ray: &Ray) -> Option<f32> {
        let oc = ray.origin - self.center;
        let b = oc.dot(&ray.direction);
        let c = oc.norm_squared() - self.radius * self.radius;
        let discriminant = b * b - c;
        if discriminant < 0.0 {
            return None;
        }

        let root = discriminant.sqrt();
        let near = -b - root;
        let far = -b + root;
        if near >= 0.0 {
            Some(near)
        } else if far >= 0.0 {
            Some(0.0)
        } else {
            None
        }
    }

    /// Smallest world-aligned box around the sphere
    pub fn enclosing_aabb(&self) -> Aabb {
        Aabb::new(self.center, Vec3::repeat(self.radius))
    }

    fn touches_point(&self, point: &Vec3) -> bool {
        (point - self.center).norm_squared() <= self.radius * self.radius
    }
}

/// Collision volume of an object
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Bounding {
    /// Axis-aligned box
    Aabb(Aabb),
    /// Oriented box
    Obb(Obb),
    /// Sphere
    Sphere(BoundingSphere),
    /// Not collidable
    #[default]
    None,
}

impl Bounding {
    /// Model-space volume of `kind` built from a mesh's local box
    pub fn from_local_box(kind: CollisionKind, local: &Aabb) -> Self {
        match kind {
            CollisionKind::Aabb => Self::Aabb(*local),
            CollisionKind::Obb => Self::Obb(Obb::from_aabb(local)),
            CollisionKind::Sphere => Self::Sphere(BoundingSphere::new(local.center, local.extents.norm())),
            CollisionKind::None => Self::None,
        }
    }

    /// Which kind of volume this is
    pub fn kind(&self) -> CollisionKind {
        match self {
            Self::Aabb(_) => CollisionKind::Aabb,
            Self::Obb(_) => CollisionKind::Obb,
            Self::Sphere(_) => CollisionKind::Sphere,
            Self::None => CollisionKind::None,
        }
    }

    /// Whether this volume takes part in collision and spatial queries
    pub fn is_some(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// Center of the volume
    pub fn center(&self) -> Option<Vec3> {
        match self {
            Self::Aabb(aabb) => Some(aabb.center),
            Self::Obb(obb) => Some(obb.center),
            Self::Sphere(sphere) => Some(sphere.center),
            Self::None => None,
        }
    }

    /// Smallest world-aligned box around the volume
    pub fn enclosing_aabb(&self) -> Option<Aabb> {
        match self {
            Self::Aabb(aabb) => Some(*aabb),
            Self::Obb(obb) => Some(obb.enclosing_aabb()),
            Self::Sphere(sphere) => Some(sphere.enclosing_aabb()),
            Self::None => None,
        }
    }

    /// Relation of this volume to `region`
    ///
    /// `Contains` means the volume lies entirely inside the region.
    pub fn contained_by(&self, region: &Aabb) -> ContainmentType {
        match self {
            Self::Aabb(aabb) => region.contains(aabb),
            Self::Obb(obb) => match region.contains(&obb.enclosing_aabb()) {
                ContainmentType::Contains => ContainmentType::Contains,
                _ if obb.overlaps(&Obb::from_aabb(region)) => ContainmentType::Intersects,
                _ => ContainmentType::Disjoint,
            },
            Self::Sphere(sphere) => match region.contains(&sphere.enclosing_aabb()) {
                ContainmentType::Contains => ContainmentType::Contains,
                _ if sphere.touches_point(&region.closest_point(&sphere.center)) => ContainmentType::Intersects,
                _ => ContainmentType::Disjoint,
            },
            Self::None => ContainmentType::Disjoint,
        }
    }

    /// Whether two volumes overlap; `None` never overlaps anything
    pub fn intersects(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, _) | (_, Self::None) => false,
            (Self::Aabb(a), Self::Aabb(b)) => a.intersects(b),
            (Self::Sphere(a), Self::Sphere(b)) => a.intersects(b),
            (Self::Obb(a), Self::Obb(b)) => a.overlaps(b),
            (Self::Aabb(aabb), Self::Obb(obb)) | (Self::Obb(obb), Self::Aabb(aabb)) => {
                obb.overlaps(&Obb::from_aabb(aabb))
            }
            (Self::Aabb(aabb), Self::Sphere(sphere)) | (Self::Sphere(sphere), Self::Aabb(aabb)) => {
                sphere.touches_point(&aabb.closest_point(&sphere.center))
            }
            (Self::Obb(obb), Self::Sphere(sphere)) | (Self::Sphere(sphere), Self::Obb(obb)) => {
                sphere.touches_point(&obb.closest_point(&sphere.center))
            }
        }
    }

    /// Distance along `ray` to the first hit
    pub fn intersects_ray(&self, ray: &Ray) -> Option<f32> {
        match self {
            Self::Aabb(aabb) => aabb.intersect_ray(ray),
            Self::Obb(obb) => obb.intersect_ray(ray),
            Self::Sphere(sphere) => sphere.intersect_ray(ray),
            Self::None => None,
        }
    }

    /// Carry a model-space volume into world space
    pub fn transformed(&self, transform: &Transform) -> Self {
        match self {
            Self::Aabb(aabb) => Self::Aabb(aabb.transformed(transform)),
            Self::Obb(obb) => Self::Obb(obb.transformed(transform)),
            Self::Sphere(sphere) => Self::Sphere(BoundingSphere::new(
                transform.transform_point(sphere.center),
                sphere.radius * transform.max_scale(),
            )),
            Self::None => Self::None,
        }
    }
}

fn rotation_scale(transform: &Transform) -> Mat3 {
    transform.rotation.to_rotation_matrix().into_inner() * Mat3::from_diagonal(&transform.scale)
}
