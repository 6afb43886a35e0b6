//! A constrained Delaunay triangulation of the plane.
//!
//! [`Cdt`] stores vertices and faces in slotmap arenas; handles are
//! generational keys, so a destroyed face can never be confused with a later
//! one that reuses its slot. The structure follows the classic design with a
//! single infinite vertex: every convex-hull edge is shared with an infinite
//! face, which lets point insertion, conflict-zone computation and face
//! circulation treat the hull like any other part of the triangulation.
//!
//! Faces store their three vertices counterclockwise, the neighbor across
//! each edge (`neighbor(i)` is opposite `vertex(i)`), one constraint bit per
//! edge (kept symmetric with the twin edge) and the `marked` bit owned by the
//! mesh refinement engine.
//!
//! Insertion is conflict-zone based: locate the point by a straight walk,
//! grow the set of faces whose circumscribing disks contain it (never
//! crossing a constrained edge), then retriangulate the hole by fanning new
//! faces around the point ([`Cdt::insert`], [`Triangulation2::star_hole`]).
//! Constraints between existing vertices are forced by edge flips and the
//! affected region is re-legalized afterwards.

use slotmap::{SlotMap, new_key_type};
use std::collections::VecDeque;
use thiserror::Error;

use crate::core::collections::{FastHashMap, FastHashSet, fast_hash_map_with_capacity};
use crate::core::traits::triangulation2::{ConflictZone, Triangulation2, ccw, cw};
use crate::geometry::point::Point2;
use crate::geometry::predicates::{
    InCircle, circumcenter, collinear_between, in_circle, orient2d,
};

new_key_type! {
    /// Key of a vertex in the triangulation's vertex arena.
    pub struct VertexKey;
}

new_key_type! {
    /// Key of a face in the triangulation's face arena.
    ///
    /// Keys are generational: a face destroyed by retriangulation invalidates
    /// its key even if the slot is later reused.
    pub struct FaceKey;
}

/// Errors reported by triangulation mutations.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TriangulationError {
    /// A constraint was requested between a vertex and itself.
    #[error("constraint endpoints coincide")]
    CoincidentConstraintEndpoints,
    /// The triangulation has no faces yet (fewer than three non-collinear
    /// vertices), so the operation is meaningless.
    #[error("triangulation has no faces yet")]
    MissingFaces,
    /// A new constraint would cross an existing constrained edge.
    #[error("constraint intersects an existing constrained edge")]
    IntersectingConstraints,
}

/// Errors reported by structural validation.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A neighbor link is not mutual or disagrees on the shared edge.
    #[error("invalid neighbor relationship: {message}")]
    InvalidNeighbors {
        /// Description of the failure.
        message: String,
    },
    /// A finite face is not counterclockwise.
    #[error("face is not counterclockwise: {message}")]
    BadOrientation {
        /// Description of the failure.
        message: String,
    },
    /// The two half-edges of an edge disagree on the constraint bit.
    #[error("asymmetric constraint bit: {message}")]
    AsymmetricConstraint {
        /// Description of the failure.
        message: String,
    },
    /// A vertex's incident-face pointer is dead or does not contain it.
    #[error("invalid vertex-to-face pointer: {message}")]
    BadVertexFace {
        /// Description of the failure.
        message: String,
    },
    /// A vertex lies strictly inside the circumscribed circle of a face.
    #[error("Delaunay violation: {message}")]
    DelaunayViolation {
        /// Description of the failure.
        message: String,
    },
}

#[derive(Debug, Clone)]
struct VertexData {
    point: Point2,
    /// Some incident face; kept alive across mutations.
    face: FaceKey,
}

#[derive(Debug, Clone)]
struct FaceData {
    vertices: [VertexKey; 3],
    neighbors: [FaceKey; 3],
    constrained: [bool; 3],
    marked: bool,
}

/// A constrained Delaunay triangulation with slotmap-backed storage.
///
/// # Examples
///
/// ```
/// use mesh2d::core::triangulation::Cdt;
/// use mesh2d::geometry::point::Point2;
///
/// let mut cdt = Cdt::new();
/// let a = cdt.insert(Point2::new(0.0, 0.0));
/// let b = cdt.insert(Point2::new(1.0, 0.0));
/// cdt.insert(Point2::new(0.0, 1.0));
/// cdt.insert(Point2::new(1.0, 1.0));
/// cdt.insert_constraint(a, b).unwrap();
///
/// assert_eq!(cdt.number_of_vertices(), 4);
/// assert_eq!(cdt.number_of_finite_faces(), 2);
/// assert!(cdt.is_valid().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct Cdt {
    vertices: SlotMap<VertexKey, VertexData>,
    faces: SlotMap<FaceKey, FaceData>,
    infinite: VertexKey,
    /// Vertices inserted before the first triangle exists.
    pending: Vec<VertexKey>,
    dim2: bool,
}

impl Default for Cdt {
    fn default() -> Self {
        Self::new()
    }
}

impl Cdt {
    /// Creates an empty triangulation.
    #[must_use]
    pub fn new() -> Self {
        let mut vertices = SlotMap::with_key();
        let infinite = vertices.insert(VertexData {
            point: Point2::new(f64::INFINITY, f64::INFINITY),
            face: FaceKey::default(),
        });
        Self {
            vertices,
            faces: SlotMap::with_key(),
            infinite,
            pending: Vec::new(),
            dim2: false,
        }
    }

    /// Number of finite vertices.
    #[must_use]
    pub fn number_of_vertices(&self) -> usize {
        self.vertices.len() - 1
    }

    /// Number of finite faces.
    #[must_use]
    pub fn number_of_finite_faces(&self) -> usize {
        self.faces
            .iter()
            .filter(|(_, fd)| !fd.vertices.contains(&self.infinite))
            .count()
    }

    /// The infinite vertex.
    #[must_use]
    pub fn infinite_vertex(&self) -> VertexKey {
        self.infinite
    }

    /// Every finite vertex, in storage order.
    #[must_use]
    pub fn finite_vertices(&self) -> Vec<VertexKey> {
        self.vertices
            .keys()
            .filter(|&v| v != self.infinite)
            .collect()
    }

    /// Removes every vertex, face and constraint.
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.faces.clear();
        self.pending.clear();
        self.dim2 = false;
        self.infinite = self.vertices.insert(VertexData {
            point: Point2::new(f64::INFINITY, f64::INFINITY),
            face: FaceKey::default(),
        });
    }

    /// Inserts a point, returning its vertex.
    ///
    /// An exact duplicate of an existing vertex returns that vertex without
    /// modifying the triangulation. The point must not lie in the interior
    /// of a constrained edge; splitting constraints goes through
    /// [`Triangulation2::insert_in_edge`].
    pub fn insert(&mut self, p: Point2) -> VertexKey {
        assert!(p.is_finite(), "cannot insert a non-finite point");
        if !self.dim2 {
            if let Some(v) = self.coincident_anywhere(p) {
                return v;
            }
            let v = self.vertices.insert(VertexData {
                point: p,
                face: FaceKey::default(),
            });
            self.pending.push(v);
            self.try_bootstrap();
            return v;
        }
        let f = self
            .locate(p)
            .expect("dimension-2 triangulation always locates");
        for k in 0..3 {
            let v = self.faces[f].vertices[k];
            if v != self.infinite && self.vertices[v].point == p {
                return v;
            }
        }
        let zone = self.conflict_zone(p, f);
        self.star_hole(p, &zone)
    }

    /// Makes the segment `[va, vb]` a union of constrained edges.
    ///
    /// Edges crossing the segment are flipped away and the affected region is
    /// re-legalized. Vertices lying exactly on the open segment split the
    /// constraint at those vertices.
    ///
    /// # Errors
    ///
    /// [`TriangulationError::CoincidentConstraintEndpoints`] if `va == vb`,
    /// [`TriangulationError::MissingFaces`] before dimension 2, and
    /// [`TriangulationError::IntersectingConstraints`] if the segment
    /// properly crosses an existing constrained edge (the triangulation is
    /// left unchanged in that case only if no earlier piece was constrained).
    pub fn insert_constraint(
        &mut self,
        va: VertexKey,
        vb: VertexKey,
    ) -> Result<(), TriangulationError> {
        if va == vb {
            return Err(TriangulationError::CoincidentConstraintEndpoints);
        }
        if !self.dim2 {
            return Err(TriangulationError::MissingFaces);
        }
        let mut targets = vec![(va, vb)];
        while let Some((a, b)) = targets.pop() {
            self.force_edge(a, b, &mut targets)?;
        }
        Ok(())
    }

    /// Structural validation: mutual neighbor links that agree on the shared
    /// edge, counterclockwise finite faces, symmetric constraint bits and
    /// live vertex-to-face pointers.
    ///
    /// # Errors
    ///
    /// The first violation found, as a [`ValidationError`].
    pub fn is_valid(&self) -> Result<(), ValidationError> {
        for (f, fd) in &self.faces {
            for i in 0..3 {
                let g = fd.neighbors[i];
                let Some(gd) = self.faces.get(g) else {
                    return Err(ValidationError::InvalidNeighbors {
                        message: format!("face {f:?} has a dead neighbor across {i}"),
                    });
                };
                let j = (0..3).find(|&j| gd.neighbors[j] == f);
                let Some(j) = j else {
                    return Err(ValidationError::InvalidNeighbors {
                        message: format!("neighbor link {f:?}/{i} is not mutual"),
                    });
                };
                if fd.vertices[ccw(i)] != gd.vertices[cw(j)]
                    || fd.vertices[cw(i)] != gd.vertices[ccw(j)]
                {
                    return Err(ValidationError::InvalidNeighbors {
                        message: format!("faces {f:?} and {g:?} disagree on their shared edge"),
                    });
                }
                if fd.constrained[i] != gd.constrained[j] {
                    return Err(ValidationError::AsymmetricConstraint {
                        message: format!("edge {f:?}/{i} and its twin disagree"),
                    });
                }
            }
            if !fd.vertices.contains(&self.infinite) {
                let [a, b, c] = fd.vertices.map(|v| self.vertices[v].point);
                if orient2d(a, b, c) <= 0.0 {
                    return Err(ValidationError::BadOrientation {
                        message: format!("finite face {f:?} is not counterclockwise"),
                    });
                }
            }
        }
        if self.dim2 {
            for (v, vd) in &self.vertices {
                let Some(fd) = self.faces.get(vd.face) else {
                    return Err(ValidationError::BadVertexFace {
                        message: format!("vertex {v:?} points to a dead face"),
                    });
                };
                if !fd.vertices.contains(&v) {
                    return Err(ValidationError::BadVertexFace {
                        message: format!("vertex {v:?} points to a face not containing it"),
                    });
                }
            }
        }
        Ok(())
    }

    /// Checks the global empty-circle property: no finite vertex lies
    /// strictly inside the circumscribed circle of any finite face.
    ///
    /// For a triangulation whose constrained edges are all Gabriel this is
    /// the plain Delaunay property. Quadratic; intended for tests.
    ///
    /// # Errors
    ///
    /// The first violation found, as a
    /// [`ValidationError::DelaunayViolation`].
    pub fn validate_delaunay(&self) -> Result<(), ValidationError> {
        for (f, fd) in &self.faces {
            if fd.vertices.contains(&self.infinite) {
                continue;
            }
            let [a, b, c] = fd.vertices.map(|v| self.vertices[v].point);
            for (v, vd) in &self.vertices {
                if v == self.infinite || fd.vertices.contains(&v) {
                    continue;
                }
                if in_circle(a, b, c, vd.point) == InCircle::Inside {
                    return Err(ValidationError::DelaunayViolation {
                        message: format!("vertex {v:?} is inside the circle of face {f:?}"),
                    });
                }
            }
        }
        Ok(())
    }

    // --- construction internals ---

    fn coincident_anywhere(&self, p: Point2) -> Option<VertexKey> {
        self.pending
            .iter()
            .copied()
            .find(|&v| self.vertices[v].point == p)
    }

    /// Builds the first triangle once three non-collinear vertices exist,
    /// then reinserts the remaining pending vertices.
    fn try_bootstrap(&mut self) {
        if self.pending.len() < 3 {
            return;
        }
        let a = self.pending[0];
        let b = self.pending[1];
        let pa = self.vertices[a].point;
        let pb = self.vertices[b].point;
        let Some(pos) = self.pending[2..]
            .iter()
            .position(|&v| orient2d(pa, pb, self.vertices[v].point) != 0.0)
        else {
            return;
        };
        let c = self.pending.remove(pos + 2);
        let rest: Vec<VertexKey> = self.pending.drain(..).skip(2).collect();
        let (b, c) = if orient2d(pa, pb, self.vertices[c].point) > 0.0 {
            (b, c)
        } else {
            (c, b)
        };
        self.build_first_triangle(a, b, c);
        self.dim2 = true;
        for v in rest {
            let p = self.vertices[v].point;
            let f = self
                .locate(p)
                .expect("dimension-2 triangulation always locates");
            let zone = self.conflict_zone(p, f);
            self.star_hole_with(v, &zone);
        }
    }

    fn build_first_triangle(&mut self, a: VertexKey, b: VertexKey, c: VertexKey) {
        let inf = self.infinite;
        let finite = self.faces.insert(FaceData {
            vertices: [a, b, c],
            neighbors: [FaceKey::default(); 3],
            constrained: [false; 3],
            marked: false,
        });
        // One infinite face per hull edge, oriented so that replacing the
        // infinite vertex by a far outside point keeps the face
        // counterclockwise.
        let mut infs = [FaceKey::default(); 3];
        for (t, slot) in infs.iter_mut().enumerate() {
            let va = self.faces[finite].vertices[cw(t)];
            let vb = self.faces[finite].vertices[ccw(t)];
            *slot = self.faces.insert(FaceData {
                vertices: [va, vb, inf],
                neighbors: [FaceKey::default(); 3],
                constrained: [false; 3],
                marked: false,
            });
        }
        for t in 0..3 {
            self.faces[finite].neighbors[t] = infs[t];
            self.faces[infs[t]].neighbors[2] = finite;
            self.faces[infs[t]].neighbors[0] = infs[cw(t)];
            self.faces[infs[t]].neighbors[1] = infs[ccw(t)];
        }
        for v in [a, b, c] {
            self.vertices[v].face = finite;
        }
        self.vertices[inf].face = infs[0];
    }

    /// Straight walk towards `p` starting at `start`.
    fn walk(&self, mut f: FaceKey, p: Point2) -> FaceKey {
        loop {
            if self.face_has_infinite(f) {
                return f;
            }
            let fd = &self.faces[f];
            let mut next = None;
            for t in 0..3 {
                let a = self.vertices[fd.vertices[t]].point;
                let b = self.vertices[fd.vertices[ccw(t)]].point;
                if orient2d(a, b, p) < 0.0 {
                    next = Some(fd.neighbors[cw(t)]);
                    break;
                }
            }
            match next {
                Some(g) => f = g,
                None => return f,
            }
        }
    }

    fn face_has_infinite(&self, f: FaceKey) -> bool {
        self.faces[f].vertices.contains(&self.infinite)
    }

    fn infinite_index(&self, f: FaceKey) -> Option<usize> {
        self.faces[f].vertices.iter().position(|&v| v == self.infinite)
    }

    /// Is `p` inside the circumscribing disk of `f` (the disk of an infinite
    /// face being the open half plane beyond its hull edge, plus the open
    /// hull edge itself)?
    fn in_conflict(&self, f: FaceKey, p: Point2) -> bool {
        let fd = &self.faces[f];
        if let Some(k) = self.infinite_index(f) {
            let a = self.vertices[fd.vertices[ccw(k)]].point;
            let b = self.vertices[fd.vertices[cw(k)]].point;
            let o = orient2d(a, b, p);
            o > 0.0 || (o == 0.0 && collinear_between(a, b, p))
        } else {
            let [a, b, c] = fd.vertices.map(|v| self.vertices[v].point);
            in_circle(a, b, c, p) == InCircle::Inside
        }
    }

    /// Retriangulates the hole left by `zone` by fanning faces from `vp`.
    fn star_hole_with(&mut self, vp: VertexKey, zone: &ConflictZone<FaceKey>) {
        debug_assert!(!zone.faces.is_empty(), "empty conflict zone");
        let mut by_first: FastHashMap<VertexKey, FaceKey> =
            fast_hash_map_with_capacity(zone.boundary.len());
        for &(out_f, j) in &zone.boundary {
            debug_assert!(
                !zone.faces.contains(&out_f),
                "conflict-zone boundary references a destroyed face"
            );
            let va = self.faces[out_f].vertices[cw(j)];
            let vb = self.faces[out_f].vertices[ccw(j)];
            let constrained = self.faces[out_f].constrained[j];
            let nf = self.faces.insert(FaceData {
                vertices: [vp, va, vb],
                neighbors: [out_f, FaceKey::default(), FaceKey::default()],
                constrained: [constrained, false, false],
                marked: false,
            });
            self.faces[out_f].neighbors[j] = nf;
            let previous = by_first.insert(va, nf);
            debug_assert!(previous.is_none(), "conflict-zone boundary is not a cycle");
        }
        for &(out_f, j) in &zone.boundary {
            let va = self.faces[out_f].vertices[cw(j)];
            let nf = by_first[&va];
            let vb = self.faces[nf].vertices[2];
            let right = by_first[&vb];
            self.faces[nf].neighbors[1] = right;
            self.faces[right].neighbors[2] = nf;
        }
        for &(out_f, j) in &zone.boundary {
            let va = self.faces[out_f].vertices[cw(j)];
            let nf = by_first[&va];
            for v in self.faces[nf].vertices {
                self.vertices[v].face = nf;
            }
        }
        for &dead in &zone.faces {
            self.faces.remove(dead);
        }
    }

    // --- constraint forcing ---

    fn edge_lookup(&self, va: VertexKey, vb: VertexKey) -> Option<(FaceKey, usize)> {
        for f in self.incident_faces(va) {
            let fd = &self.faces[f];
            for i in 0..3 {
                if fd.vertices[cw(i)] == va && fd.vertices[ccw(i)] == vb {
                    return Some((f, i));
                }
            }
        }
        None
    }

    fn force_edge(
        &mut self,
        va: VertexKey,
        vb: VertexKey,
        targets: &mut Vec<(VertexKey, VertexKey)>,
    ) -> Result<(), TriangulationError> {
        if let Some((f, i)) = self.edge_lookup(va, vb) {
            self.set_constrained(f, i, true);
            return Ok(());
        }
        let pa = self.vertices[va].point;
        let pb = self.vertices[vb].point;

        // Find how the segment leaves the star of `va`: either through the
        // interior of an opposite edge, or exactly through a vertex.
        let mut first_crossing = None;
        for f in self.incident_faces(va) {
            if self.face_has_infinite(f) {
                continue;
            }
            let i = self.faces[f].vertices.iter().position(|&v| v == va).expect("star face");
            let l = self.faces[f].vertices[ccw(i)];
            let r = self.faces[f].vertices[cw(i)];
            let pl = self.vertices[l].point;
            let pr = self.vertices[r].point;
            for (through, pt) in [(l, pl), (r, pr)] {
                if orient2d(pa, pb, pt) == 0.0 && collinear_between(pa, pb, pt) {
                    // The constraint passes through a vertex: constrain the
                    // first piece and defer the rest.
                    targets.push((through, vb));
                    targets.push((va, through));
                    return Ok(());
                }
            }
            if orient2d(pa, pl, pb) > 0.0 && orient2d(pa, pb, pr) > 0.0 {
                first_crossing = Some((f, i, l, r));
                break;
            }
        }
        let (start_face, start_edge, l, r) =
            first_crossing.expect("segment between triangulation vertices leaves the start star");

        // March across the strip of crossed edges, collecting them.
        // Invariant: `vright` is strictly right of the directed segment
        // va -> vb and `vleft` strictly left.
        let mut crossed: Vec<(VertexKey, VertexKey)> = Vec::new();
        let (mut vright, mut vleft) = (l, r);
        if self.faces[start_face].constrained[start_edge] {
            return Err(TriangulationError::IntersectingConstraints);
        }
        crossed.push((l, r));
        let mut fcur = self.faces[start_face].neighbors[start_edge];
        let mut entry = self.mirror_index(start_face, start_edge);
        let mut end = vb;
        loop {
            let w = self.faces[fcur].vertices[entry];
            if w == vb {
                break;
            }
            debug_assert!(
                w != self.infinite,
                "constraint march left the hull interior"
            );
            let pw = self.vertices[w].point;
            let s = orient2d(pa, pb, pw);
            if s == 0.0 {
                // A vertex exactly on the segment splits the constraint.
                targets.push((w, vb));
                end = w;
                break;
            }
            // The segment exits through {w, vright} when w joins the left
            // side, through {vleft, w} otherwise. The exit edge is opposite
            // the vertex that stays behind.
            let behind = if s > 0.0 { vleft } else { vright };
            let exit = self.faces[fcur]
                .vertices
                .iter()
                .position(|&v| v == behind)
                .expect("crossed strip keeps one old vertex");
            if s > 0.0 {
                vleft = w;
            } else {
                vright = w;
            }
            if self.faces[fcur].constrained[exit] {
                return Err(TriangulationError::IntersectingConstraints);
            }
            crossed.push((
                self.faces[fcur].vertices[ccw(exit)],
                self.faces[fcur].vertices[cw(exit)],
            ));
            let next = self.faces[fcur].neighbors[exit];
            entry = self.mirror_index(fcur, exit);
            fcur = next;
        }

        // Flip crossed edges away (Sloan's algorithm), queueing non-convex
        // cases for a later retry.
        let mut queue: VecDeque<(VertexKey, VertexKey)> = crossed.into_iter().collect();
        let mut created: Vec<(VertexKey, VertexKey)> = Vec::new();
        let pend = self.vertices[end].point;
        while let Some((u, w)) = queue.pop_front() {
            let Some((f, i)) = self.edge_lookup(u, w) else {
                continue;
            };
            let g = self.faces[f].neighbors[i];
            let j = self.mirror_index(f, i);
            let apex_f = self.faces[f].vertices[i];
            let apex_g = self.faces[g].vertices[j];
            let pf = self.vertices[apex_f].point;
            let pg = self.vertices[apex_g].point;
            let a = self.vertices[self.faces[f].vertices[ccw(i)]].point;
            let b = self.vertices[self.faces[f].vertices[cw(i)]].point;
            let convex = orient2d(pf, a, pg) > 0.0 && orient2d(pf, pg, b) > 0.0;
            if !convex {
                queue.push_back((u, w));
                continue;
            }
            self.flip(f, i);
            if proper_crossing(pa, pend, pf, pg) {
                queue.push_back((apex_f, apex_g));
            } else {
                created.push((apex_f, apex_g));
            }
        }

        let (f, i) = self
            .edge_lookup(va, end)
            .expect("crossed edges flipped away leave the forced edge");
        self.set_constrained(f, i, true);

        // Restore the Delaunay property around the flips.
        let mut work: Vec<(VertexKey, VertexKey)> = created;
        while let Some((u, w)) = work.pop() {
            let Some((f, i)) = self.edge_lookup(u, w) else {
                continue;
            };
            if self.faces[f].constrained[i] {
                continue;
            }
            let g = self.faces[f].neighbors[i];
            if self.face_has_infinite(f) || self.face_has_infinite(g) {
                continue;
            }
            let j = self.mirror_index(f, i);
            let apex_g = self.faces[g].vertices[j];
            let [p0, p1, p2] = self.faces[f].vertices.map(|v| self.vertices[v].point);
            if in_circle(p0, p1, p2, self.vertices[apex_g].point) == InCircle::Inside {
                let apex_f = self.faces[f].vertices[i];
                self.flip(f, i);
                for pair in [
                    (u, apex_f),
                    (u, apex_g),
                    (w, apex_f),
                    (w, apex_g),
                ] {
                    work.push(pair);
                }
            }
        }
        Ok(())
    }

    /// Flips the edge `(f, i)`, replacing the diagonal `{a, b}` of the
    /// quadrilateral by `{apex(f), apex(g)}`. The edge must not be
    /// constrained and the quadrilateral must be strictly convex.
    fn flip(&mut self, f: FaceKey, i: usize) {
        let g = self.faces[f].neighbors[i];
        let j = self.mirror_index(f, i);
        debug_assert!(!self.faces[f].constrained[i]);

        let u = self.faces[f].vertices[i];
        let a = self.faces[f].vertices[ccw(i)];
        let b = self.faces[f].vertices[cw(i)];
        let w = self.faces[g].vertices[j];
        debug_assert_eq!(self.faces[g].vertices[cw(j)], a);
        debug_assert_eq!(self.faces[g].vertices[ccw(j)], b);

        let fb = self.faces[f].neighbors[ccw(i)];
        let fb_constrained = self.faces[f].constrained[ccw(i)];
        let gb = self.faces[g].neighbors[ccw(j)];
        let gb_constrained = self.faces[g].constrained[ccw(j)];

        self.faces[f].vertices[cw(i)] = w;
        self.faces[g].vertices[cw(j)] = u;

        self.faces[f].neighbors[i] = gb;
        self.faces[f].constrained[i] = gb_constrained;
        self.faces[f].neighbors[ccw(i)] = g;
        self.faces[f].constrained[ccw(i)] = false;

        self.faces[g].neighbors[j] = fb;
        self.faces[g].constrained[j] = fb_constrained;
        self.faces[g].neighbors[ccw(j)] = f;
        self.faces[g].constrained[ccw(j)] = false;

        let k = (0..3)
            .find(|&k| self.faces[gb].neighbors[k] == g)
            .expect("mutual neighbor");
        self.faces[gb].neighbors[k] = f;
        let k = (0..3)
            .find(|&k| self.faces[fb].neighbors[k] == f)
            .expect("mutual neighbor");
        self.faces[fb].neighbors[k] = g;

        self.vertices[u].face = f;
        self.vertices[w].face = g;
        self.vertices[a].face = f;
        self.vertices[b].face = g;
    }
}

/// Do the open segments `[a, b]` and `[c, d]` cross properly?
fn proper_crossing(a: Point2, b: Point2, c: Point2, d: Point2) -> bool {
    orient2d(a, b, c) * orient2d(a, b, d) < 0.0 && orient2d(c, d, a) * orient2d(c, d, b) < 0.0
}

impl Triangulation2 for Cdt {
    type VertexHandle = VertexKey;
    type FaceHandle = FaceKey;

    fn is_dim2(&self) -> bool {
        self.dim2
    }

    fn infinite_face(&self) -> FaceKey {
        let f = self.vertices[self.infinite].face;
        debug_assert!(self.faces.contains_key(f), "infinite vertex has a live face");
        f
    }

    fn contains_face(&self, f: FaceKey) -> bool {
        self.faces.contains_key(f)
    }

    fn is_infinite_face(&self, f: FaceKey) -> bool {
        self.face_has_infinite(f)
    }

    fn is_infinite_vertex(&self, v: VertexKey) -> bool {
        v == self.infinite
    }

    fn point(&self, v: VertexKey) -> Point2 {
        debug_assert!(v != self.infinite, "the infinite vertex has no position");
        self.vertices[v].point
    }

    fn face_vertex(&self, f: FaceKey, i: usize) -> VertexKey {
        self.faces[f].vertices[i]
    }

    fn neighbor(&self, f: FaceKey, i: usize) -> FaceKey {
        self.faces[f].neighbors[i]
    }

    fn mirror_index(&self, f: FaceKey, i: usize) -> usize {
        let g = self.faces[f].neighbors[i];
        (0..3)
            .find(|&j| self.faces[g].neighbors[j] == f)
            .expect("neighbor links are mutual")
    }

    fn is_constrained(&self, f: FaceKey, i: usize) -> bool {
        self.faces[f].constrained[i]
    }

    fn set_constrained(&mut self, f: FaceKey, i: usize, on: bool) {
        let g = self.faces[f].neighbors[i];
        let j = self.mirror_index(f, i);
        self.faces[f].constrained[i] = on;
        self.faces[g].constrained[j] = on;
    }

    fn is_marked(&self, f: FaceKey) -> bool {
        self.faces[f].marked
    }

    fn set_marked(&mut self, f: FaceKey, on: bool) {
        self.faces[f].marked = on;
    }

    fn vertex_index(&self, f: FaceKey, v: VertexKey) -> Option<usize> {
        self.faces[f].vertices.iter().position(|&u| u == v)
    }

    fn faces(&self) -> Vec<FaceKey> {
        self.faces.keys().collect()
    }

    fn finite_faces(&self) -> Vec<FaceKey> {
        self.faces
            .iter()
            .filter(|(_, fd)| !fd.vertices.contains(&self.infinite))
            .map(|(f, _)| f)
            .collect()
    }

    fn constrained_edges(&self) -> Vec<(FaceKey, usize)> {
        let mut out = Vec::new();
        for (f, fd) in &self.faces {
            for i in 0..3 {
                if fd.constrained[i] && f < fd.neighbors[i] {
                    out.push((f, i));
                }
            }
        }
        out
    }

    fn locate(&self, p: Point2) -> Option<FaceKey> {
        if !self.dim2 {
            return None;
        }
        let start = self
            .faces
            .iter()
            .find(|(_, fd)| !fd.vertices.contains(&self.infinite))
            .map(|(f, _)| f)?;
        Some(self.walk(start, p))
    }

    fn incident_faces(&self, v: VertexKey) -> Vec<FaceKey> {
        if !self.dim2 {
            return Vec::new();
        }
        self.incident_faces_from(v, self.vertices[v].face)
    }

    fn incident_faces_from(&self, v: VertexKey, start: FaceKey) -> Vec<FaceKey> {
        let mut out = vec![start];
        let mut cur = start;
        loop {
            let i = self
                .vertex_index(cur, v)
                .expect("circulation stays incident to the vertex");
            let next = self.faces[cur].neighbors[ccw(i)];
            if next == start {
                return out;
            }
            out.push(next);
            cur = next;
        }
    }

    fn is_face(&self, va: VertexKey, vb: VertexKey, vc: VertexKey) -> Option<FaceKey> {
        if !self.dim2 {
            return None;
        }
        self.incident_faces(va).into_iter().find(|&f| {
            let vs = self.faces[f].vertices;
            vs.contains(&vb) && vs.contains(&vc)
        })
    }

    fn is_edge(&self, va: VertexKey, vb: VertexKey) -> Option<(FaceKey, usize)> {
        if !self.dim2 {
            return None;
        }
        self.edge_lookup(va, vb)
    }

    fn conflict_zone(&self, p: Point2, hint: FaceKey) -> ConflictZone<FaceKey> {
        debug_assert!(self.in_conflict(hint, p), "conflict-zone hint not in conflict");
        let mut zone = ConflictZone::default();
        let mut visited = FastHashSet::default();
        visited.insert(hint);
        let mut queue = VecDeque::from([hint]);
        while let Some(f) = queue.pop_front() {
            zone.faces.push(f);
            for i in 0..3 {
                let nb = self.faces[f].neighbors[i];
                if visited.contains(&nb) {
                    continue;
                }
                if self.faces[f].constrained[i] || !self.in_conflict(nb, p) {
                    let j = self.mirror_index(f, i);
                    zone.boundary.push((nb, j));
                } else {
                    visited.insert(nb);
                    queue.push_back(nb);
                }
            }
        }
        zone
    }

    fn star_hole(&mut self, p: Point2, zone: &ConflictZone<FaceKey>) -> VertexKey {
        let vp = self.vertices.insert(VertexData {
            point: p,
            face: FaceKey::default(),
        });
        self.star_hole_with(vp, zone);
        vp
    }

    fn insert_in_edge(&mut self, p: Point2, f: FaceKey, i: usize) -> VertexKey {
        let va = self.faces[f].vertices[cw(i)];
        let vb = self.faces[f].vertices[ccw(i)];
        let was_constrained = self.faces[f].constrained[i];
        if was_constrained {
            self.set_constrained(f, i, false);
        }
        let zone = self.conflict_zone(p, f);
        let vp = self.star_hole(p, &zone);
        if was_constrained {
            let (fa, ia) = self
                .edge_lookup(va, vp)
                .expect("edge split leaves the first subedge");
            self.set_constrained(fa, ia, true);
            let (fb, ib) = self
                .edge_lookup(vp, vb)
                .expect("edge split leaves the second subedge");
            self.set_constrained(fb, ib, true);
        }
        vp
    }

    fn circumcenter(&self, f: FaceKey) -> Point2 {
        debug_assert!(!self.face_has_infinite(f));
        let [a, b, c] = self.faces[f].vertices.map(|v| self.vertices[v].point);
        circumcenter(a, b, c)
    }

    fn clear(&mut self) {
        Cdt::clear(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::predicates::squared_distance;

    fn square() -> (Cdt, [VertexKey; 4]) {
        let mut cdt = Cdt::new();
        let a = cdt.insert(Point2::new(0.0, 0.0));
        let b = cdt.insert(Point2::new(1.0, 0.0));
        let c = cdt.insert(Point2::new(1.0, 1.0));
        let d = cdt.insert(Point2::new(0.0, 1.0));
        (cdt, [a, b, c, d])
    }

    #[test]
    fn bootstrap_single_triangle() {
        let mut cdt = Cdt::new();
        cdt.insert(Point2::new(0.0, 0.0));
        cdt.insert(Point2::new(1.0, 0.0));
        assert!(!cdt.is_dim2());
        cdt.insert(Point2::new(0.0, 1.0));
        assert!(cdt.is_dim2());
        assert_eq!(cdt.number_of_vertices(), 3);
        assert_eq!(cdt.number_of_finite_faces(), 1);
        assert_eq!(cdt.faces().len(), 4);
        cdt.is_valid().unwrap();
        cdt.validate_delaunay().unwrap();
    }

    #[test]
    fn collinear_points_stay_flat_until_bootstrap() {
        let mut cdt = Cdt::new();
        cdt.insert(Point2::new(0.0, 0.0));
        cdt.insert(Point2::new(1.0, 0.0));
        cdt.insert(Point2::new(2.0, 0.0));
        assert!(!cdt.is_dim2());
        cdt.insert(Point2::new(0.5, 1.0));
        assert!(cdt.is_dim2());
        assert_eq!(cdt.number_of_vertices(), 4);
        cdt.is_valid().unwrap();
        cdt.validate_delaunay().unwrap();
    }

    #[test]
    fn square_has_two_faces() {
        let (cdt, _) = square();
        assert_eq!(cdt.number_of_finite_faces(), 2);
        cdt.is_valid().unwrap();
        cdt.validate_delaunay().unwrap();
    }

    #[test]
    fn duplicate_insert_returns_existing_vertex() {
        let (mut cdt, [a, ..]) = square();
        let again = cdt.insert(Point2::new(0.0, 0.0));
        assert_eq!(again, a);
        assert_eq!(cdt.number_of_vertices(), 4);
    }

    #[test]
    fn interior_insert_stars_the_cavity() {
        let (mut cdt, _) = square();
        let v = cdt.insert(Point2::new(0.25, 0.25));
        assert_eq!(cdt.number_of_vertices(), 5);
        assert!(cdt.incident_faces(v).len() >= 3);
        cdt.is_valid().unwrap();
        cdt.validate_delaunay().unwrap();
    }

    #[test]
    fn insert_on_unconstrained_edge() {
        let mut cdt = Cdt::new();
        cdt.insert(Point2::new(0.0, 0.0));
        cdt.insert(Point2::new(2.0, 0.0));
        cdt.insert(Point2::new(0.0, 1.0));
        // Lands exactly on the hull edge between the first two vertices.
        cdt.insert(Point2::new(1.0, 0.0));
        assert_eq!(cdt.number_of_vertices(), 4);
        cdt.is_valid().unwrap();
        cdt.validate_delaunay().unwrap();
    }

    #[test]
    fn locate_finds_containing_face() {
        let (cdt, _) = square();
        let p = Point2::new(0.1, 0.6);
        let f = cdt.locate(p).unwrap();
        assert!(!cdt.is_infinite_face(f));
        let [a, b, c] = [0, 1, 2].map(|i| cdt.point(cdt.face_vertex(f, i)));
        assert!(orient2d(a, b, p) >= 0.0);
        assert!(orient2d(b, c, p) >= 0.0);
        assert!(orient2d(c, a, p) >= 0.0);
        let outside = cdt.locate(Point2::new(5.0, 5.0)).unwrap();
        assert!(cdt.is_infinite_face(outside));
    }

    #[test]
    fn constrain_existing_edge() {
        let (mut cdt, [a, b, ..]) = square();
        cdt.insert_constraint(a, b).unwrap();
        let (f, i) = cdt.is_edge(a, b).unwrap();
        assert!(cdt.is_constrained(f, i));
        // The twin agrees.
        let g = cdt.neighbor(f, i);
        let j = cdt.mirror_index(f, i);
        assert!(cdt.is_constrained(g, j));
        cdt.is_valid().unwrap();
    }

    #[test]
    fn constraint_forces_a_flip() {
        let mut cdt = Cdt::new();
        let a = cdt.insert(Point2::new(0.0, 0.0));
        let b = cdt.insert(Point2::new(2.0, 0.0));
        let top = cdt.insert(Point2::new(1.0, 0.8));
        let bottom = cdt.insert(Point2::new(1.0, -0.8));
        // The Delaunay diagonal of this quadrilateral is {top, bottom}.
        assert!(cdt.is_edge(top, bottom).is_some());
        assert!(cdt.is_edge(a, b).is_none());
        cdt.insert_constraint(a, b).unwrap();
        let (f, i) = cdt.is_edge(a, b).unwrap();
        assert!(cdt.is_constrained(f, i));
        assert!(cdt.is_edge(top, bottom).is_none());
        cdt.is_valid().unwrap();
    }

    #[test]
    fn crossing_constraints_are_rejected() {
        let mut cdt = Cdt::new();
        let a = cdt.insert(Point2::new(0.0, 0.0));
        let b = cdt.insert(Point2::new(2.0, 0.0));
        let top = cdt.insert(Point2::new(1.0, 0.8));
        let bottom = cdt.insert(Point2::new(1.0, -0.8));
        cdt.insert_constraint(a, b).unwrap();
        assert_eq!(
            cdt.insert_constraint(top, bottom),
            Err(TriangulationError::IntersectingConstraints)
        );
    }

    #[test]
    fn constraint_through_a_vertex_splits() {
        let mut cdt = Cdt::new();
        let a = cdt.insert(Point2::new(0.0, 0.0));
        let m = cdt.insert(Point2::new(1.0, 0.0));
        let b = cdt.insert(Point2::new(2.0, 0.0));
        cdt.insert(Point2::new(1.0, 1.0));
        cdt.insert_constraint(a, b).unwrap();
        let (f, i) = cdt.is_edge(a, m).unwrap();
        assert!(cdt.is_constrained(f, i));
        let (f, i) = cdt.is_edge(m, b).unwrap();
        assert!(cdt.is_constrained(f, i));
        cdt.is_valid().unwrap();
    }

    #[test]
    fn degenerate_constraint_is_rejected() {
        let (mut cdt, [a, ..]) = square();
        assert_eq!(
            cdt.insert_constraint(a, a),
            Err(TriangulationError::CoincidentConstraintEndpoints)
        );
    }

    #[test]
    fn conflict_zone_stops_at_constrained_edges() {
        let (mut cdt, [a, _, c, _]) = square();
        // Constrain the diagonal the square triangulation uses.
        let diagonal = cdt.is_edge(a, c).or_else(|| cdt.is_edge(c, a));
        let (f, i) = diagonal.expect("square diagonal");
        cdt.set_constrained(f, i, true);
        // A point near the diagonal conflicts with faces on both sides, but
        // the zone must stay on the side of its hint.
        let p = Point2::new(0.51, 0.5);
        let hint = cdt.locate(p).unwrap();
        let zone = cdt.conflict_zone(p, hint);
        assert_eq!(zone.faces.len(), 1);
        assert_eq!(zone.faces[0], hint);
    }

    #[test]
    fn insert_in_edge_preserves_the_constraint() {
        let (mut cdt, [a, b, ..]) = square();
        cdt.insert_constraint(a, b).unwrap();
        let (f, i) = cdt.is_edge(a, b).unwrap();
        let vm = cdt.insert_in_edge(Point2::new(0.5, 0.0), f, i);
        assert_eq!(cdt.number_of_vertices(), 5);
        let (f, i) = cdt.is_edge(a, vm).unwrap();
        assert!(cdt.is_constrained(f, i));
        let (f, i) = cdt.is_edge(vm, b).unwrap();
        assert!(cdt.is_constrained(f, i));
        assert!(cdt.is_edge(a, b).is_none());
        cdt.is_valid().unwrap();
    }

    #[test]
    fn is_edge_returns_the_right_side_face() {
        let (cdt, [a, b, ..]) = square();
        let (f, i) = cdt.is_edge(a, b).unwrap();
        assert_eq!(cdt.face_vertex(f, cw(i)), a);
        assert_eq!(cdt.face_vertex(f, ccw(i)), b);
        // a -> b runs along the bottom; the face to its right is outside.
        assert!(cdt.is_infinite_face(f));
        let (g, j) = cdt.is_edge(b, a).unwrap();
        assert!(!cdt.is_infinite_face(g));
        assert_eq!(cdt.face_vertex(g, cw(j)), b);
    }

    #[test]
    fn circumcenter_of_a_face_is_equidistant() {
        let (cdt, _) = square();
        let f = cdt.finite_faces()[0];
        let cc = cdt.circumcenter(f);
        let d: Vec<f64> = (0..3)
            .map(|i| squared_distance(cc, cdt.point(cdt.face_vertex(f, i))))
            .collect();
        assert!((d[0] - d[1]).abs() < 1e-12);
        assert!((d[0] - d[2]).abs() < 1e-12);
    }

    #[test]
    fn incident_faces_circulates_the_full_star() {
        let (mut cdt, _) = square();
        let v = cdt.insert(Point2::new(0.3, 0.3));
        let star = cdt.incident_faces(v);
        for &f in &star {
            assert!(cdt.vertex_index(f, v).is_some());
        }
        // The star is a closed ring: every face appears exactly once.
        let mut unique = star.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), star.len());
    }

    #[test]
    fn clear_resets_everything() {
        let (mut cdt, _) = square();
        cdt.clear();
        assert_eq!(cdt.number_of_vertices(), 0);
        assert!(!cdt.is_dim2());
        cdt.insert(Point2::new(0.0, 0.0));
        cdt.insert(Point2::new(1.0, 0.0));
        cdt.insert(Point2::new(0.0, 1.0));
        assert!(cdt.is_dim2());
        cdt.is_valid().unwrap();
    }

    #[test]
    fn random_insertions_stay_valid() {
        use rand::{Rng, SeedableRng, rngs::StdRng};
        let mut rng = StdRng::seed_from_u64(7);
        let mut cdt = Cdt::new();
        for _ in 0..60 {
            let p = Point2::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0));
            cdt.insert(p);
        }
        cdt.is_valid().unwrap();
        cdt.validate_delaunay().unwrap();
    }
}
