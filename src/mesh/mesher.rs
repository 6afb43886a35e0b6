//! Ruppert-style Delaunay refinement with Shewchuk's terminator.
//!
//! [`Mesher`] owns a constrained triangulation and drives it towards a mesh
//! whose marked faces all satisfy the quality criteria, while every
//! constrained edge stays locally Gabriel. The loop interleaves two queues:
//!
//! * the conformance queue of encroached constrained edges, drained by
//!   splitting each edge at its midpoint (or at a concentric-shell point
//!   inside a small-angle cluster), and
//! * the bad-face queue, ordered by squared minimum sine, drained by
//!   inserting circumcenters.
//!
//! A circumcenter that would encroach a constrained edge is never inserted;
//! the edge is enqueued for conformance instead and the face stays bad,
//! unless the edge belongs to a reduced cluster whose minimum insertion
//! radius is smaller than the face's shortest edge. In that last case the
//! face is dropped: splitting further would only chase the cluster forever
//! (Shewchuk's terminator), so the face is accepted as unimprovable.
//!
//! Faces are enqueued by handle but re-resolved by their three vertices
//! whenever an intervening operation could have retriangulated them; the
//! queue itself is purged of every conflict-zone face before an insertion,
//! so it never names a destroyed face.

use std::collections::VecDeque;

use crate::core::traits::triangulation2::{Triangulation2, ccw, cw};
use crate::geometry::point::Point2;
use crate::geometry::predicates::shortest_edge_squared_length;
use crate::mesh::conform::{
    Conformer, encroached_edges_around, is_locally_gabriel_conform, shell_split_point,
};
use crate::mesh::criteria::MeshingCriteria;
use crate::mesh::priority_map::PriorityMap;

/// Delaunay mesh refinement engine over a constrained triangulation.
///
/// # Examples
///
/// ```
/// use mesh2d::core::triangulation::Cdt;
/// use mesh2d::geometry::point::Point2;
/// use mesh2d::mesh::criteria::MinAngleCriteria;
/// use mesh2d::mesh::mesher::Mesher;
///
/// let mut cdt = Cdt::new();
/// let corners = [
///     cdt.insert(Point2::new(0.0, 0.0)),
///     cdt.insert(Point2::new(1.0, 0.0)),
///     cdt.insert(Point2::new(1.0, 1.0)),
///     cdt.insert(Point2::new(0.0, 1.0)),
/// ];
/// for k in 0..4 {
///     cdt.insert_constraint(corners[k], corners[(k + 1) % 4]).unwrap();
/// }
///
/// let mut mesher = Mesher::new(cdt, MinAngleCriteria::from_degrees(20.0));
/// mesher.refine();
/// assert_eq!(mesher.bad_face_count(), 0);
/// ```
#[derive(Debug)]
pub struct Mesher<Tri: Triangulation2, Crit: MeshingCriteria> {
    tri: Tri,
    criteria: Crit,
    bad_faces: PriorityMap<Tri::FaceHandle>,
    conform: Conformer<Tri>,
    seeds: Vec<Point2>,
    seeds_mark: bool,
    initialized: bool,
}

impl<Tri: Triangulation2, Crit: MeshingCriteria> Mesher<Tri, Crit> {
    /// Wraps a triangulation for refinement.
    #[must_use]
    pub fn new(tri: Tri, criteria: Crit) -> Self {
        Self {
            tri,
            criteria,
            bad_faces: PriorityMap::new(),
            conform: Conformer::new(),
            seeds: Vec::new(),
            seeds_mark: false,
            initialized: false,
        }
    }

    /// The underlying triangulation.
    #[must_use]
    pub fn triangulation(&self) -> &Tri {
        &self.tri
    }

    /// Mutable access to the triangulation. Any mutation invalidates the
    /// engine's state; the next [`Mesher::refine`] or
    /// [`Mesher::refine_step`] re-initializes.
    pub fn triangulation_mut(&mut self) -> &mut Tri {
        self.initialized = false;
        &mut self.tri
    }

    /// Consumes the engine and returns the triangulation.
    #[must_use]
    pub fn into_triangulation(self) -> Tri {
        self.tri
    }

    /// The quality criteria in force.
    #[must_use]
    pub fn criteria(&self) -> &Crit {
        &self.criteria
    }

    /// Replaces the quality criteria **without** rescanning the faces.
    /// Call [`Mesher::calculate_bad_faces`] (or [`Mesher::set_bad_faces`]
    /// with a precomputed set) afterwards.
    pub fn set_criteria(&mut self, criteria: Crit) {
        self.criteria = criteria;
    }

    // --- seeds and marking ---

    /// Replaces the seed set. Components reachable from a seed without
    /// crossing a constrained edge are marked with `mark`, every other
    /// component with `!mark`; the unbounded component is always unmarked.
    /// Seeds must lie in bounded components: a seed falling in the unbounded
    /// component is overridden by the final unmarking pass.
    ///
    /// With `do_it_now` the marks are recomputed immediately; otherwise they
    /// are applied by the next [`Mesher::init`].
    pub fn set_seeds(
        &mut self,
        seeds: impl IntoIterator<Item = Point2>,
        mark: bool,
        do_it_now: bool,
    ) {
        self.seeds = seeds.into_iter().collect();
        self.seeds_mark = mark;
        self.initialized = false;
        if do_it_now {
            self.mark_facets();
        }
    }

    /// Empties the seed set and resets its mark to `false`.
    pub fn clear_seeds(&mut self) {
        self.seeds.clear();
        self.seeds_mark = false;
        self.initialized = false;
    }

    /// The current seeds.
    #[must_use]
    pub fn seeds(&self) -> &[Point2] {
        &self.seeds
    }

    /// The mark propagated from the seeds.
    #[must_use]
    pub fn seeds_mark(&self) -> bool {
        self.seeds_mark
    }

    /// Recomputes every face's `marked` flag from the seed set.
    ///
    /// Without seeds the whole convex hull interior is marked. With seeds,
    /// every face starts at `!seeds_mark` and the seed components are
    /// flooded with `seeds_mark`. The unbounded component is unmarked last.
    pub fn mark_facets(&mut self) {
        if !self.tri.is_dim2() {
            return;
        }
        if self.seeds.is_empty() {
            for f in self.tri.faces() {
                self.tri.set_marked(f, true);
            }
        } else {
            for f in self.tri.faces() {
                let mark = !self.seeds_mark;
                self.tri.set_marked(f, mark);
            }
            let seeds = self.seeds.clone();
            for seed in seeds {
                if let Some(f) = self.tri.locate(seed) {
                    self.propagate_marks(f, self.seeds_mark);
                }
            }
        }
        let outside = self.tri.infinite_face();
        self.propagate_marks(outside, false);
    }

    /// Floods `mark` from `start`, stopping at constrained edges.
    fn propagate_marks(&mut self, start: Tri::FaceHandle, mark: bool) {
        self.tri.set_marked(start, mark);
        let mut queue = VecDeque::from([start]);
        while let Some(f) = queue.pop_front() {
            for i in 0..3 {
                let nb = self.tri.neighbor(f, i);
                if !self.tri.is_constrained(f, i) && self.tri.is_marked(nb) != mark {
                    self.tri.set_marked(nb, mark);
                    queue.push_back(nb);
                }
            }
        }
    }

    // --- queue maintenance ---

    /// Is this face worse than the criteria allow?
    #[must_use]
    pub fn is_bad(&self, f: Tri::FaceHandle) -> bool {
        let [a, b, c] = self.face_points(f);
        self.criteria.is_bad(a, b, c)
    }

    /// Squared minimum sine of a face, the queue priority.
    #[must_use]
    pub fn squared_minimum_sine(&self, f: Tri::FaceHandle) -> f64 {
        let [a, b, c] = self.face_points(f);
        self.criteria.squared_minimum_sine(a, b, c)
    }

    /// Squared minimum sine of the triangle spanned by three vertices.
    #[must_use]
    pub fn squared_minimum_sine_of(
        &self,
        va: Tri::VertexHandle,
        vb: Tri::VertexHandle,
        vc: Tri::VertexHandle,
    ) -> f64 {
        self.criteria
            .squared_minimum_sine(self.tri.point(va), self.tri.point(vb), self.tri.point(vc))
    }

    /// Number of faces currently queued as bad.
    #[must_use]
    pub fn bad_face_count(&self) -> usize {
        self.bad_faces.len()
    }

    /// The queued bad faces with their priorities, worst first.
    #[must_use]
    pub fn queued_bad_faces(&self) -> Vec<(Tri::FaceHandle, f64)> {
        self.bad_faces.iter().collect()
    }

    /// True iff no constrained edge is pending conformance.
    #[must_use]
    pub fn is_conformed(&self) -> bool {
        self.conform.is_conformed()
    }

    fn face_points(&self, f: Tri::FaceHandle) -> [Point2; 3] {
        debug_assert!(!self.tri.is_infinite_face(f));
        [0, 1, 2].map(|i| self.tri.point(self.tri.face_vertex(f, i)))
    }

    fn push_in_bad_faces(&mut self, f: Tri::FaceHandle) {
        debug_assert!(self.tri.is_marked(f), "only marked faces are queued");
        let priority = self.squared_minimum_sine(f);
        self.bad_faces.insert(f, priority);
    }

    fn push_in_bad_faces_by_vertices(
        &mut self,
        va: Tri::VertexHandle,
        vb: Tri::VertexHandle,
        vc: Tri::VertexHandle,
    ) {
        let Some(f) = self.tri.is_face(va, vb, vc) else {
            debug_assert!(false, "re-enqueued face no longer exists");
            return;
        };
        self.push_in_bad_faces(f);
    }

    /// Scans every finite face and queues the marked bad ones.
    fn fill_facet_map(&mut self) {
        for f in self.tri.finite_faces() {
            if self.tri.is_marked(f) && self.is_bad(f) {
                self.push_in_bad_faces(f);
            }
        }
    }

    /// Queues the marked bad faces around a freshly inserted vertex.
    fn compute_new_bad_faces(&mut self, v: Tri::VertexHandle) {
        for f in self.tri.incident_faces(v) {
            if !self.tri.is_infinite_face(f) && self.tri.is_marked(f) && self.is_bad(f) {
                self.push_in_bad_faces(f);
            }
        }
    }

    /// Rescans all faces against the current criteria.
    pub fn calculate_bad_faces(&mut self) {
        self.fill_facet_map();
    }

    /// Replaces the queue contents with the given faces, each at its current
    /// squared minimum sine. Useful after [`Mesher::set_criteria`] when the
    /// affected faces are known without a full rescan.
    pub fn set_bad_faces(&mut self, faces: impl IntoIterator<Item = Tri::FaceHandle>) {
        self.bad_faces.clear();
        for f in faces {
            self.push_in_bad_faces(f);
        }
    }

    // --- initialization and the driver loop ---

    /// Recomputes marks, clusters, the conformance queue and the bad-face
    /// queue from the current triangulation. Idempotent; required after any
    /// external mutation of the triangulation, and run automatically by
    /// [`Mesher::refine`] / [`Mesher::refine_step`] when needed.
    pub fn init(&mut self) {
        self.bad_faces.clear();
        self.mark_facets();
        self.conform.init(&self.tri);
        self.fill_facet_map();
        self.initialized = true;
    }

    /// Refines until every constrained edge is conformed and no marked bad
    /// face remains (cluster-protected faces excepted: the terminator drops
    /// them as unimprovable).
    pub fn refine(&mut self) {
        if !self.initialized {
            self.init();
        }
        loop {
            while self.conform_step() {}
            if self.bad_faces.is_empty() {
                break;
            }
            self.process_one_face();
        }
    }

    /// Performs one unit of work: one conformance split if any edge is
    /// pending, otherwise one bad-face refinement. Returns `false` once both
    /// queues are idle; the mesh invariants hold between calls.
    pub fn refine_step(&mut self) -> bool {
        if !self.initialized {
            self.init();
        }
        if self.conform_step() {
            return true;
        }
        if !self.bad_faces.is_empty() {
            self.process_one_face();
            return true;
        }
        false
    }

    /// Clears the queues, the seeds and the underlying triangulation.
    pub fn clear(&mut self) {
        self.bad_faces.clear();
        self.conform.clear();
        self.seeds.clear();
        self.seeds_mark = false;
        self.tri.clear();
        self.initialized = false;
    }

    // --- conformance ---

    /// Splits the next still-existing pending constrained edge. Returns
    /// whether a split happened.
    fn conform_step(&mut self) -> bool {
        while let Some((va, vb)) = self.conform.pop_pending() {
            let Some((f, i)) = self.tri.is_edge(va, vb) else {
                continue;
            };
            if !self.tri.is_constrained(f, i) {
                continue;
            }
            self.split_constrained_edge(f, i);
            return true;
        }
        false
    }

    /// Splits the constrained edge `(f, i)`: midpoint normally, concentric
    /// shell from the apex when exactly one endpoint carries a cluster.
    fn split_constrained_edge(&mut self, f: Tri::FaceHandle, i: usize) {
        let va = self.tri.face_vertex(f, cw(i));
        let vb = self.tri.face_vertex(f, ccw(i));
        let pa = self.tri.point(va);
        let pb = self.tri.point(vb);
        let in_cluster_at_a = self.conform.get_cluster(va, vb).is_some();
        let in_cluster_at_b = self.conform.get_cluster(vb, va).is_some();
        let p = match (in_cluster_at_a, in_cluster_at_b) {
            (true, false) => shell_split_point(pa, pb),
            (false, true) => shell_split_point(pb, pa),
            _ => pa.midpoint(pb),
        };
        let vp = self.virtual_insert_in_the_edge(f, i, p);
        self.conform.note_split(&self.tri, va, vb, vp);
        for (ea, eb) in encroached_edges_around(&self.tri, vp) {
            self.conform.add_constrained_edge_to_be_conformed(ea, eb);
        }
    }

    /// Inserts `p` in the constrained edge `(f, i)`, keeping queue and marks
    /// coherent.
    ///
    /// The edge's constraint bit is toggled off while the conflict zone of
    /// `p` is computed, so the zone spans both sides of the edge; the zone's
    /// faces are purged from the bad-face queue before the triangulation
    /// splits the subconstraint. The marks of the two sides are recorded
    /// first and painted back onto the new star, switching sides where the
    /// counterclockwise walk crosses the line of the old edge.
    fn virtual_insert_in_the_edge(
        &mut self,
        f: Tri::FaceHandle,
        i: usize,
        p: Point2,
    ) -> Tri::VertexHandle {
        let va = self.tri.face_vertex(f, cw(i));
        let vb = self.tri.face_vertex(f, ccw(i));
        let mark_right = self.tri.is_marked(f);
        let mark_left = self.tri.is_marked(self.tri.neighbor(f, i));

        self.tri.set_constrained(f, i, false);
        let zone = self.tri.conflict_zone(p, f);
        self.tri.set_constrained(f, i, true);
        for zf in &zone.faces {
            self.bad_faces.remove(zf);
        }

        let vp = self.tri.insert_in_edge(p, f, i);

        // Paint marks around vp, starting at the face right of va -> vp
        // (the old right side) and switching when the walk reaches vb.
        let (start, _) = self
            .tri
            .is_edge(va, vp)
            .expect("edge split leaves the first subedge");
        let ring = self.tri.incident_faces_from(vp, start);
        let mut right_side = true;
        for (k, &g) in ring.iter().enumerate() {
            if k > 0 && right_side {
                let j = self
                    .tri
                    .vertex_index(g, vp)
                    .expect("ring face contains the split vertex");
                if self.tri.face_vertex(g, ccw(j)) == vb {
                    right_side = false;
                }
            }
            if !self.tri.is_infinite_face(g) {
                let mark = if right_side { mark_right } else { mark_left };
                self.tri.set_marked(g, mark);
            }
        }

        self.compute_new_bad_faces(vp);
        vp
    }

    // --- face refinement ---

    /// Pops the worst face and refines it.
    fn process_one_face(&mut self) {
        let (f, _) = self
            .bad_faces
            .pop_front()
            .expect("process_one_face needs a queued face");
        self.refine_face(f);
    }

    /// Tries to insert the circumcenter of `f`. If the center would encroach
    /// constrained edges on the conflict-zone boundary, the insertion is
    /// abandoned: each such edge is enqueued for conformance and the face
    /// stays bad, except where a cluster protects the edge (terminator).
    fn refine_face(&mut self, f: Tri::FaceHandle) {
        let cc = self.tri.circumcenter(f);
        let zone = self.tri.conflict_zone(cc, f);

        let [a, b, c] = self.face_points(f);
        let shortest_edge = shortest_edge_squared_length(a, b, c);

        let mut split_the_face = true;
        let mut keep_the_face_bad = false;

        for &(fh, i) in &zone.boundary {
            if !self.tri.is_constrained(fh, i) {
                continue;
            }
            if is_locally_gabriel_conform(&self.tri, fh, i, cc) {
                continue;
            }
            split_the_face = false;
            let va = self.tri.face_vertex(fh, cw(i));
            let vb = self.tri.face_vertex(fh, ccw(i));
            let cluster_at_a = self
                .conform
                .get_cluster(va, vb)
                .map(|cl| (cl.is_reduced(), cl.rmin()));
            let cluster_at_b = self
                .conform
                .get_cluster(vb, va)
                .map(|cl| (cl.is_reduced(), cl.rmin()));
            let enqueue = match (cluster_at_a, cluster_at_b) {
                // Two clusters or none: conform the edge.
                (Some(_), Some(_)) | (None, None) => true,
                // One cluster: split unless the cluster is reduced and its
                // insertion radius stays below the attacking triangle's
                // shortest edge. In that case the face is beyond help and
                // the terminator lets it go.
                (Some((reduced, rmin)), None) | (None, Some((reduced, rmin))) => {
                    !reduced || rmin >= shortest_edge
                }
            };
            if enqueue {
                self.conform.add_constrained_edge_to_be_conformed(va, vb);
                keep_the_face_bad = true;
            }
        }

        let va = self.tri.face_vertex(f, 0);
        let vb = self.tri.face_vertex(f, 1);
        let vc = self.tri.face_vertex(f, 2);

        if split_the_face {
            debug_assert!(self.tri.is_marked(f), "refining an unmarked face");
            self.split_face(f, cc);
        } else if keep_the_face_bad {
            self.push_in_bad_faces_by_vertices(va, vb, vc);
        }
    }

    /// Inserts `cc` by star-hole retriangulation, purging the destroyed
    /// faces from the queue first and inheriting the region mark onto the
    /// new star.
    fn split_face(&mut self, f: Tri::FaceHandle, cc: Point2) {
        let marked = self.tri.is_marked(f);
        let zone = self.tri.conflict_zone(cc, f);
        for zf in &zone.faces {
            self.bad_faces.remove(zf);
        }
        let v = self.tri.star_hole(cc, &zone);
        for g in self.tri.incident_faces(v) {
            let mark = marked && !self.tri.is_infinite_face(g);
            self.tri.set_marked(g, mark);
        }
        self.compute_new_bad_faces(v);
    }

    // --- debugging ---

    /// Drains the queue, checks every entry (live face, marked, still bad,
    /// priority equal to its squared minimum sine) and reinserts it.
    /// Returns whether all entries were valid; the queue is unchanged.
    pub fn check_bad_faces(&mut self) -> bool {
        let mut ok = true;
        let mut drained = Vec::with_capacity(self.bad_faces.len());
        while let Some((f, priority)) = self.bad_faces.pop_front() {
            drained.push((f, priority));
            if !self.tri.contains_face(f) {
                ok = false;
                continue;
            }
            let va = self.tri.face_vertex(f, 0);
            let vb = self.tri.face_vertex(f, 1);
            let vc = self.tri.face_vertex(f, 2);
            let resolved = self.tri.is_face(va, vb, vc);
            if resolved != Some(f)
                || !self.tri.is_marked(f)
                || !self.is_bad(f)
                || priority != self.squared_minimum_sine(f)
            {
                ok = false;
            }
        }
        for (f, priority) in drained {
            self.bad_faces.insert(f, priority);
        }
        ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::triangulation::{Cdt, VertexKey};
    use crate::mesh::criteria::MinAngleCriteria;

    fn constrained_square() -> Cdt {
        let mut cdt = Cdt::new();
        let corners = [
            cdt.insert(Point2::new(0.0, 0.0)),
            cdt.insert(Point2::new(1.0, 0.0)),
            cdt.insert(Point2::new(1.0, 1.0)),
            cdt.insert(Point2::new(0.0, 1.0)),
        ];
        for k in 0..4 {
            cdt.insert_constraint(corners[k], corners[(k + 1) % 4]).unwrap();
        }
        cdt
    }

    fn marked_face_count<Tri: Triangulation2>(tri: &Tri) -> usize {
        tri.faces().iter().filter(|&&f| tri.is_marked(f)).count()
    }

    /// A unit square split into two rooms by a constrained wall at x = 0.5.
    /// The wall endpoints sit on the square boundary, so every vertex goes
    /// in before any edge is constrained.
    fn two_rooms() -> (Cdt, VertexKey, VertexKey) {
        let mut cdt = Cdt::new();
        let corners = [
            cdt.insert(Point2::new(0.0, 0.0)),
            cdt.insert(Point2::new(1.0, 0.0)),
            cdt.insert(Point2::new(1.0, 1.0)),
            cdt.insert(Point2::new(0.0, 1.0)),
        ];
        let bottom = cdt.insert(Point2::new(0.5, 0.0));
        let top = cdt.insert(Point2::new(0.5, 1.0));
        for k in 0..4 {
            cdt.insert_constraint(corners[k], corners[(k + 1) % 4]).unwrap();
        }
        cdt.insert_constraint(top, bottom).unwrap();
        (cdt, top, bottom)
    }

    #[test]
    fn mark_facets_without_seeds_marks_the_hull_interior() {
        let mut mesher = Mesher::new(constrained_square(), MinAngleCriteria::default());
        mesher.mark_facets();
        let tri = mesher.triangulation();
        for f in tri.finite_faces() {
            assert!(tri.is_marked(f));
        }
        for f in tri.faces() {
            if tri.is_infinite_face(f) {
                assert!(!tri.is_marked(f));
            }
        }
    }

    #[test]
    fn mark_facets_with_an_interior_seed() {
        let mut mesher = Mesher::new(constrained_square(), MinAngleCriteria::default());
        mesher.set_seeds([Point2::new(0.5, 0.5)], true, true);
        let tri = mesher.triangulation();
        assert_eq!(marked_face_count(tri), tri.finite_faces().len());
    }

    #[test]
    fn seed_outside_marks_nothing_inside() {
        let mut mesher = Mesher::new(constrained_square(), MinAngleCriteria::default());
        // A seed in the unbounded component: the final unmarking pass wins.
        mesher.set_seeds([Point2::new(5.0, 5.0)], true, true);
        assert_eq!(marked_face_count(mesher.triangulation()), 0);
    }

    #[test]
    fn constrained_edges_stop_the_flood() {
        let (cdt, _, _) = two_rooms();
        let mut mesher = Mesher::new(cdt, MinAngleCriteria::default());
        mesher.set_seeds([Point2::new(0.25, 0.5)], true, true);
        let tri = mesher.triangulation();
        let marked = marked_face_count(tri);
        assert!(marked > 0);
        assert!(marked < tri.finite_faces().len());
        // Every marked face lies in the left room.
        for f in tri.finite_faces() {
            if tri.is_marked(f) {
                for i in 0..3 {
                    assert!(tri.point(tri.face_vertex(f, i)).x <= 0.5 + 1e-12);
                }
            }
        }
    }

    #[test]
    fn init_fills_the_queue_with_bad_faces_only() {
        let mut cdt = constrained_square();
        cdt.insert(Point2::new(0.5, 0.02));
        let mut mesher = Mesher::new(cdt, MinAngleCriteria::from_degrees(20.0));
        mesher.init();
        assert!(mesher.bad_face_count() > 0);
        assert!(mesher.check_bad_faces());
    }

    #[test]
    fn init_twice_is_idempotent() {
        let mut cdt = constrained_square();
        cdt.insert(Point2::new(0.3, 0.1));
        let mut mesher = Mesher::new(cdt, MinAngleCriteria::from_degrees(25.0));
        mesher.init();
        let first: Vec<_> = {
            let mut snapshot = Vec::new();
            for f in mesher.triangulation().finite_faces() {
                snapshot.push((f, mesher.triangulation().is_marked(f)));
            }
            snapshot
        };
        let queue_before = mesher.bad_face_count();
        mesher.init();
        let queue_after = mesher.bad_face_count();
        assert_eq!(queue_before, queue_after);
        for (f, marked) in first {
            assert_eq!(mesher.triangulation().is_marked(f), marked);
        }
    }

    #[test]
    fn virtual_insert_preserves_room_marks() {
        let (cdt, top, bottom) = two_rooms();
        let mut mesher: Mesher<Cdt, MinAngleCriteria> =
            Mesher::new(cdt, MinAngleCriteria::default());
        mesher.set_seeds([Point2::new(0.25, 0.5)], true, true);

        // Split the wall; faces left of it must stay marked, right unmarked.
        let (f, i) = mesher
            .triangulation()
            .is_edge(top, bottom)
            .or_else(|| mesher.triangulation().is_edge(bottom, top))
            .unwrap();
        let vm = mesher.virtual_insert_in_the_edge(f, i, Point2::new(0.5, 0.5));
        let tri = mesher.triangulation();
        for g in tri.incident_faces(vm) {
            if tri.is_infinite_face(g) {
                continue;
            }
            let on_left = (0..3).all(|k| tri.point(tri.face_vertex(g, k)).x <= 0.5 + 1e-12);
            assert_eq!(tri.is_marked(g), on_left);
        }
        // The wall pieces remain constrained.
        let (f, i) = tri.is_edge(top, vm).unwrap();
        assert!(tri.is_constrained(f, i));
        let (f, i) = tri.is_edge(vm, bottom).unwrap();
        assert!(tri.is_constrained(f, i));
    }

    #[test]
    fn set_bad_faces_replaces_the_queue() {
        let mut cdt = constrained_square();
        cdt.insert(Point2::new(0.5, 0.02));
        let mut mesher = Mesher::new(cdt, MinAngleCriteria::from_degrees(20.0));
        mesher.init();
        let worst: Vec<_> = mesher
            .triangulation()
            .finite_faces()
            .into_iter()
            .filter(|&f| mesher.triangulation().is_marked(f) && mesher.is_bad(f))
            .take(1)
            .collect();
        mesher.set_bad_faces(worst.clone());
        assert_eq!(mesher.bad_face_count(), worst.len());
        assert!(mesher.check_bad_faces());
    }

    #[test]
    fn clear_resets_the_engine() {
        let mut mesher = Mesher::new(constrained_square(), MinAngleCriteria::default());
        mesher.init();
        mesher.clear();
        assert_eq!(mesher.bad_face_count(), 0);
        assert!(mesher.seeds().is_empty());
        assert_eq!(mesher.triangulation().number_of_vertices(), 0);
    }

    #[test]
    fn refine_terminates_on_an_already_good_mesh() {
        let mut mesher = Mesher::new(constrained_square(), MinAngleCriteria::from_degrees(20.0));
        mesher.refine();
        // The two half-square triangles have 45 degree angles: nothing to do.
        assert_eq!(mesher.triangulation().number_of_vertices(), 4);
        assert_eq!(mesher.bad_face_count(), 0);
    }

    #[test]
    fn refine_step_reports_idle_on_a_good_mesh() {
        let mut mesher = Mesher::new(constrained_square(), MinAngleCriteria::from_degrees(20.0));
        mesher.init();
        assert!(!mesher.refine_step());
    }

    #[test]
    fn squared_minimum_sine_accessors_agree() {
        let mesher = {
            let mut m = Mesher::new(constrained_square(), MinAngleCriteria::default());
            m.init();
            m
        };
        let tri = mesher.triangulation();
        for f in tri.finite_faces() {
            let (va, vb, vc): (VertexKey, VertexKey, VertexKey) = (
                tri.face_vertex(f, 0),
                tri.face_vertex(f, 1),
                tri.face_vertex(f, 2),
            );
            assert_eq!(
                mesher.squared_minimum_sine(f),
                mesher.squared_minimum_sine_of(va, vb, vc)
            );
        }
    }
}
