pub mod geometry {
    use glam::{DMat4, DVec3};
    use serde::{Deserialize, Serialize};

    /// 三维点，内部以 `glam::DVec3` 表示，LDraw 坐标均为双精度。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point3(pub DVec3);

    impl Point3 {
        #[inline]
        pub fn new(x: f64, y: f64, z: f64) -> Self {
            Self(DVec3::new(x, y, z))
        }

        #[inline]
        pub fn from_vec(vec: DVec3) -> Self {
            Self(vec)
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn z(self) -> f64 {
            self.0.z
        }

        #[inline]
        pub fn translate(self, offset: Vector3) -> Self {
            Self(self.0 + offset.0)
        }

        /// 应用仿射变换（4x4 矩阵，最后一列为平移）。
        #[inline]
        pub fn transform(self, matrix: &DMat4) -> Self {
            Self(matrix.transform_point3(self.0))
        }

        #[inline]
        pub fn as_vec3(self) -> DVec3 {
            self.0
        }
    }

    impl From<DVec3> for Point3 {
        fn from(value: DVec3) -> Self {
            Self::from_vec(value)
        }
    }

    /// 三维向量，主要用于平移量。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Vector3(pub DVec3);

    impl Vector3 {
        #[inline]
        pub fn new(x: f64, y: f64, z: f64) -> Self {
            Self(DVec3::new(x, y, z))
        }

        #[inline]
        pub fn from_points(start: Point3, end: Point3) -> Self {
            Self(end.0 - start.0)
        }

        #[inline]
        pub fn as_vec3(self) -> DVec3 {
            self.0
        }

        #[inline]
        pub fn length_squared(self) -> f64 {
            self.0.length_squared()
        }
    }

    impl From<DVec3> for Vector3 {
        fn from(value: DVec3) -> Self {
            Self(value)
        }
    }

    /// 判断矩阵是否包含镜像（行列式为负），镜像会翻转多边形绕序。
    #[inline]
    pub fn is_mirroring(matrix: &DMat4) -> bool {
        matrix.determinant() < 0.0
    }

    /// 轴对齐边界框，用于估算元素/页面范围。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Bounds3D {
        min: Point3,
        max: Point3,
    }

    impl Bounds3D {
        #[inline]
        pub fn new(min: Point3, max: Point3) -> Self {
            Self { min, max }
        }

        #[inline]
        pub fn empty() -> Self {
            Self {
                min: Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
                max: Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            }
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.min.x() > self.max.x() || self.min.y() > self.max.y() || self.min.z() > self.max.z()
        }

        #[inline]
        pub fn min(&self) -> Point3 {
            self.min
        }

        #[inline]
        pub fn max(&self) -> Point3 {
            self.max
        }

        pub fn include_point(&mut self, point: Point3) {
            if self.is_empty() {
                self.min = point;
                self.max = point;
                return;
            }
            self.min = Point3::from_vec(self.min.as_vec3().min(point.as_vec3()));
            self.max = Point3::from_vec(self.max.as_vec3().max(point.as_vec3()));
        }

        /// 并集。
        pub fn include_bounds(&mut self, other: &Bounds3D) {
            if other.is_empty() {
                return;
            }
            self.include_point(other.min);
            self.include_point(other.max);
        }

        /// 返回 8 个角点，便于在变换后重新求包围盒。
        pub fn corners(&self) -> [Point3; 8] {
            let (a, b) = (self.min.as_vec3(), self.max.as_vec3());
            [
                Point3::new(a.x, a.y, a.z),
                Point3::new(b.x, a.y, a.z),
                Point3::new(a.x, b.y, a.z),
                Point3::new(b.x, b.y, a.z),
                Point3::new(a.x, a.y, b.z),
                Point3::new(b.x, a.y, b.z),
                Point3::new(a.x, b.y, b.z),
                Point3::new(b.x, b.y, b.z),
            ]
        }

        pub fn transformed(&self, matrix: &DMat4) -> Bounds3D {
            let mut bounds = Bounds3D::empty();
            if self.is_empty() {
                return bounds;
            }
            for corner in self.corners() {
                bounds.include_point(corner.transform(matrix));
            }
            bounds
        }

        #[inline]
        pub fn center(&self) -> Point3 {
            debug_assert!(!self.is_empty());
            Point3::from_vec((self.min.as_vec3() + self.max.as_vec3()) * 0.5)
        }
    }
}

pub mod errors {
    use thiserror::Error;

    use crate::dom::NodeId;

    #[derive(Debug, Clone, PartialEq, Eq, Error)]
    pub enum DomError {
        #[error("object {0} is frozen")]
        ObjectFrozen(NodeId),
        #[error("element {0} is locked")]
        ElementLocked(NodeId),
        #[error("operation not supported: {0}")]
        NotSupported(String),
        #[error("duplicate name: {0}")]
        DuplicateName(String),
        #[error("circular reference: {0}")]
        CircularReference(String),
        #[error("top-level element {0} is not allowed in this collection")]
        TopLevelElementNotAllowed(NodeId),
        #[error("invalid operation: {0}")]
        InvalidOperation(String),
        #[error("invalid argument: {0}")]
        InvalidArgument(String),
        #[error("argument out of range: {0}")]
        ArgumentOutOfRange(String),
        #[error("object {0} has been disposed")]
        ObjectDisposed(NodeId),
        #[error("node {0} not found")]
        NodeNotFound(NodeId),
    }

    pub type DomResult<T> = Result<T, DomError>;
}

pub mod collection;
pub mod document;
pub mod dom;
pub mod edit;
pub mod element;
pub mod events;
pub mod page;
pub mod palette;
pub mod resolve;

mod properties;
mod spatial;

pub use collection::{InsertCheckFlags, InsertCheckResult};
pub use document::{CodeStandard, DocumentData, DocumentStatus};
pub use dom::{Dom, NodeId, NodeKind};
pub use edit::{Edit, Property};
pub use element::{
    BfcFlag, ColourDefinition, Comment, Element, ElementKind, Graphic, Group, MetaCommand,
    Reference, Shape,
};
pub use errors::{DomError, DomResult};
pub use events::{ChangeEvent, ChangeParameters, DomEvent, ObserverId};
pub use page::{
    BfcMode, HistoryEntry, License, PageData, PageType, RotationConfig, RotationPoint, Update,
    Winding,
};
pub use palette::{Palette, PaletteEntry};
pub use resolve::{LibraryCatalog, TargetResolver, TargetStatus};
