//! # mesh2d
//!
//! Quality mesh generation in the plane by Delaunay refinement, inspired by
//! [CGAL](https://www.cgal.org)'s 2D meshing.
//!
//! Given a constrained Delaunay triangulation of a planar straight-line
//! graph, the [`mesh::mesher::Mesher`] inserts circumcenters of bad
//! triangles and midpoints of encroached constrained edges until every
//! triangle of the meshed region satisfies the quality criteria and every
//! constrained edge is locally Gabriel. Small input angles are handled with
//! Shewchuk's terminator: fans of constrained edges meeting at less than 60°
//! are split on concentric power-of-two shells, and once such a cluster is
//! reduced the triangles it pins are accepted rather than chased forever.
//!
//! # Features
//!
//! - Slotmap-backed constrained Delaunay triangulation with generational
//!   face and vertex handles ([`core::triangulation::Cdt`])
//! - Ruppert-style refinement with a priority queue over bad faces, worst
//!   first ([`mesh::mesher::Mesher`], [`mesh::priority_map::PriorityMap`])
//! - Gabriel conformance of constrained edges with cluster-aware splitting
//!   ([`mesh::conform`], [`mesh::cluster`])
//! - Seeded region marking: flood fills bounded by constrained edges select
//!   which components get meshed
//! - Step-by-step driving for hosts that need to stay responsive
//!   ([`mesh::mesher::Mesher::refine_step`])
//!
//! # Basic usage
//!
//! ```rust
//! use mesh2d::prelude::*;
//!
//! // A unit square with a constrained boundary.
//! let mut cdt = Cdt::new();
//! let corners = [
//!     cdt.insert(Point2::new(0.0, 0.0)),
//!     cdt.insert(Point2::new(1.0, 0.0)),
//!     cdt.insert(Point2::new(1.0, 1.0)),
//!     cdt.insert(Point2::new(0.0, 1.0)),
//! ];
//! for k in 0..4 {
//!     cdt.insert_constraint(corners[k], corners[(k + 1) % 4]).unwrap();
//! }
//!
//! // Refine towards a 20 degree minimum angle.
//! let mut mesher = Mesher::new(cdt, MinAngleCriteria::from_degrees(20.0));
//! mesher.refine();
//!
//! let cdt = mesher.into_triangulation();
//! assert!(cdt.is_valid().is_ok());
//! for f in cdt.finite_faces() {
//!     let [a, b, c] = [0, 1, 2].map(|i| cdt.point(cdt.face_vertex(f, i)));
//!     let min_sine_sq = mesh2d::geometry::predicates::squared_minimum_sine(a, b, c);
//!     assert!(min_sine_sq >= 20.0_f64.to_radians().sin().powi(2));
//! }
//! ```
//!
//! The engine is generic over the triangulation through the
//! [`core::traits::triangulation2::Triangulation2`] capability trait, and
//! over the quality goal through [`mesh::criteria::MeshingCriteria`], so
//! variant triangulations and criteria plug in without touching the
//! refinement loop.
//!
//! # References
//!
//! - Ruppert, J. "A Delaunay refinement algorithm for quality 2-dimensional
//!   mesh generation." *Journal of Algorithms* 18.3 (1995): 548-585.
//! - Shewchuk, J.R. "Delaunay refinement algorithms for triangular mesh
//!   generation." *Computational Geometry* 22.1-3 (2002): 21-74.
//! - Shewchuk, J.R. "Mesh generation for domains with small angles."
//!   *Proceedings of the sixteenth annual symposium on Computational
//!   geometry* (2000): 1-10.

#![forbid(unsafe_code)]

/// Triangulation storage and the capability trait the engine consumes.
pub mod core {
    /// Collection aliases over fast hashing and inline buffers.
    pub mod collections;
    pub mod triangulation;
    /// Traits at the seams of the engine.
    pub mod traits {
        pub mod triangulation2;
        pub use triangulation2::*;
    }
    pub use triangulation::*;
}

/// Points, predicates and constructions.
pub mod geometry {
    pub mod point;
    pub mod predicates;
    pub use point::*;
    pub use predicates::*;
}

/// The refinement engine and its supporting structures.
pub mod mesh {
    /// Cluster detection for small input angles.
    pub mod cluster;
    /// Gabriel conformance of constrained edges.
    pub mod conform;
    pub mod criteria;
    pub mod mesher;
    /// The two-way bad-face queue.
    pub mod priority_map;
    pub use criteria::*;
    pub use mesher::*;
}

/// Re-exports of the commonly used types.
pub mod prelude {
    pub use crate::core::collections::{FastHashMap, FastHashSet, SmallBuffer};
    pub use crate::core::traits::triangulation2::{ConflictZone, Triangulation2, ccw, cw};
    pub use crate::core::triangulation::{
        Cdt, FaceKey, TriangulationError, ValidationError, VertexKey,
    };
    pub use crate::geometry::point::Point2;
    pub use crate::geometry::predicates::{
        InCircle, Orientation, encroaches, squared_distance, squared_minimum_sine,
    };
    pub use crate::mesh::cluster::{Cluster, ClusterMap};
    pub use crate::mesh::conform::Conformer;
    pub use crate::mesh::criteria::{MeshingCriteria, MinAngleCriteria};
    pub use crate::mesh::mesher::Mesher;
    pub use crate::mesh::priority_map::PriorityMap;
}
