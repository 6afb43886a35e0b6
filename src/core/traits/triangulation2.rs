//! Capability trait connecting the refinement engine to a constrained
//! triangulation.
//!
//! The engine never touches triangulation internals; everything it needs is
//! expressed through [`Triangulation2`]. Variants of the structure (with or
//! without intersection handling, different storage layouts) plug in by
//! satisfying this interface. [`crate::core::triangulation::Cdt`] is the
//! implementation shipped with the crate.
//!
//! # Handle stability
//!
//! `FaceHandle` and `VertexHandle` are stable only while the face or vertex
//! they name exists. A face destroyed by [`Triangulation2::star_hole`]
//! invalidates its handle; callers must not hold face handles across mutation
//! points. The engine re-resolves faces by their three vertices
//! ([`Triangulation2::is_face`]) wherever a handle could have gone stale.

use crate::geometry::point::Point2;
use std::fmt::Debug;
use std::hash::Hash;

/// Next edge/vertex index counterclockwise. Indices live in `{0, 1, 2}`.
#[must_use]
pub const fn ccw(i: usize) -> usize {
    (i + 1) % 3
}

/// Next edge/vertex index clockwise. Indices live in `{0, 1, 2}`.
#[must_use]
pub const fn cw(i: usize) -> usize {
    (i + 2) % 3
}

/// The conflict zone of a candidate insertion point: the faces whose
/// circumscribing disks contain the point (they are destroyed by inserting
/// it) and the edges bounding that region.
///
/// Boundary edges are reported from the surviving side: `(face, i)` names an
/// edge of a face **outside** the zone whose neighbor across `i` is inside.
/// The edge endpoints are `face.vertex(cw(i))` and `face.vertex(ccw(i))`.
#[derive(Debug, Clone)]
pub struct ConflictZone<F> {
    /// Faces destroyed by the insertion, in discovery order.
    pub faces: Vec<F>,
    /// Boundary edges, in discovery order.
    pub boundary: Vec<(F, usize)>,
}

impl<F> Default for ConflictZone<F> {
    fn default() -> Self {
        Self {
            faces: Vec::new(),
            boundary: Vec::new(),
        }
    }
}

/// Operations the refinement engine consumes from a 2D constrained
/// triangulation.
///
/// Faces are triangles storing their vertices counterclockwise; `neighbor(i)`
/// is the face across the edge opposite vertex `i`. One infinite vertex
/// closes the convex hull with a ring of infinite faces. Each edge carries a
/// constraint bit (kept symmetric across the two incident faces) and each
/// face a `marked` bit owned by the engine.
pub trait Triangulation2 {
    /// Stable identifier of a live vertex.
    type VertexHandle: Copy + Eq + Ord + Hash + Debug;
    /// Stable identifier of a live face.
    type FaceHandle: Copy + Eq + Ord + Hash + Debug;

    /// True once the triangulation has faces, i.e. it contains at least
    /// three non-collinear vertices.
    fn is_dim2(&self) -> bool;

    /// A face incident to the infinite vertex. Panics before dimension 2.
    fn infinite_face(&self) -> Self::FaceHandle;

    /// True iff the handle names a live face. A handle goes dead when its
    /// face is destroyed by retriangulation; generational keys guarantee a
    /// dead handle is never revived by storage reuse.
    fn contains_face(&self, f: Self::FaceHandle) -> bool;

    /// True iff the face contains the infinite vertex.
    fn is_infinite_face(&self, f: Self::FaceHandle) -> bool;

    /// True iff the vertex is the infinite vertex.
    fn is_infinite_vertex(&self, v: Self::VertexHandle) -> bool;

    /// Position of a finite vertex.
    fn point(&self, v: Self::VertexHandle) -> Point2;

    /// Vertex `i` of the face, `i` in `{0, 1, 2}`.
    fn face_vertex(&self, f: Self::FaceHandle, i: usize) -> Self::VertexHandle;

    /// Face across the edge opposite vertex `i`.
    fn neighbor(&self, f: Self::FaceHandle, i: usize) -> Self::FaceHandle;

    /// Index of `self` in `neighbor(f, i)`, i.e. the `j` with
    /// `neighbor(neighbor(f, i), j) == f`.
    fn mirror_index(&self, f: Self::FaceHandle, i: usize) -> usize;

    /// Constraint bit of the edge `(f, i)`.
    fn is_constrained(&self, f: Self::FaceHandle, i: usize) -> bool;

    /// Sets the constraint bit of the edge `(f, i)` on both incident faces.
    fn set_constrained(&mut self, f: Self::FaceHandle, i: usize, on: bool);

    /// Mark bit of the face (is it inside the domain to be meshed).
    fn is_marked(&self, f: Self::FaceHandle) -> bool;

    /// Sets the mark bit of the face.
    fn set_marked(&mut self, f: Self::FaceHandle, on: bool);

    /// Index of `v` in `f`, if `v` is one of its vertices.
    fn vertex_index(&self, f: Self::FaceHandle, v: Self::VertexHandle) -> Option<usize>;

    /// Every face, infinite faces included, in deterministic storage order.
    fn faces(&self) -> Vec<Self::FaceHandle>;

    /// Every finite face, in deterministic storage order.
    fn finite_faces(&self) -> Vec<Self::FaceHandle>;

    /// Each constrained edge exactly once, as `(face, edge_index)`.
    fn constrained_edges(&self) -> Vec<(Self::FaceHandle, usize)>;

    /// The face containing `p`, found by a straight walk. Returns an
    /// infinite face for points outside the convex hull and `None` before
    /// dimension 2.
    fn locate(&self, p: Point2) -> Option<Self::FaceHandle>;

    /// Faces incident to `v`, counterclockwise, starting at an arbitrary one.
    fn incident_faces(&self, v: Self::VertexHandle) -> Vec<Self::FaceHandle>;

    /// Faces incident to `v`, counterclockwise, starting at `start`
    /// (which must be incident to `v`).
    fn incident_faces_from(
        &self,
        v: Self::VertexHandle,
        start: Self::FaceHandle,
    ) -> Vec<Self::FaceHandle>;

    /// Resolves the face with vertex set `{va, vb, vc}`, if it exists.
    fn is_face(
        &self,
        va: Self::VertexHandle,
        vb: Self::VertexHandle,
        vc: Self::VertexHandle,
    ) -> Option<Self::FaceHandle>;

    /// Resolves the edge `{va, vb}`, if it exists, as `(f, i)` with
    /// `f.vertex(cw(i)) == va` and `f.vertex(ccw(i)) == vb`; `f` is the
    /// incident face to the right of the directed segment `va -> vb`.
    fn is_edge(
        &self,
        va: Self::VertexHandle,
        vb: Self::VertexHandle,
    ) -> Option<(Self::FaceHandle, usize)>;

    /// Conflict zone of `p`, grown from `hint` (which must be in conflict).
    /// The zone never crosses a constrained edge.
    fn conflict_zone(&self, p: Point2, hint: Self::FaceHandle) -> ConflictZone<Self::FaceHandle>;

    /// Destroys the zone's faces and retriangulates the hole by fanning new
    /// faces from a new vertex at `p`. Returns the new vertex. The mark bits
    /// of the new faces are unset; the caller owns marking.
    fn star_hole(&mut self, p: Point2, zone: &ConflictZone<Self::FaceHandle>)
        -> Self::VertexHandle;

    /// Splits the constrained edge `(f, i)` at `p` (a point on the edge),
    /// preserving the constraint: both subedges come out constrained.
    /// Returns the new vertex.
    fn insert_in_edge(&mut self, p: Point2, f: Self::FaceHandle, i: usize) -> Self::VertexHandle;

    /// Circumcenter of a finite face.
    fn circumcenter(&self, f: Self::FaceHandle) -> Point2;

    /// Removes every vertex, face and constraint.
    fn clear(&mut self);
}
