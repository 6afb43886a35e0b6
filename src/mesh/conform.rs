//! Gabriel conformance of constrained edges.
//!
//! A constrained edge is *locally Gabriel* when neither of the two vertices
//! facing it lies strictly inside its diametral disk. The refinement engine
//! keeps every constrained edge locally Gabriel by splitting encroached
//! edges; [`Conformer`] holds the queue of edges waiting for a split and the
//! cluster bookkeeping that decides where the split lands.
//!
//! Queue entries are vertex pairs, not edge handles: edge handles go stale
//! whenever a nearby insertion retriangulates the region, while the vertices
//! survive. An entry whose vertices no longer span a constrained edge is
//! simply dropped when popped; the subedges it was split into were examined
//! at split time.

use std::collections::VecDeque;

use crate::core::collections::FastHashSet;
use crate::core::traits::triangulation2::{Triangulation2, ccw, cw};
use crate::geometry::point::Point2;
use crate::geometry::predicates::{encroaches, squared_distance};
use crate::mesh::cluster::{Cluster, ClusterMap, detect_clusters};

/// Conformance state: the pending-edge queue and the cluster map.
#[derive(Debug, Clone)]
pub struct Conformer<Tri: Triangulation2> {
    pending: VecDeque<(Tri::VertexHandle, Tri::VertexHandle)>,
    clusters: ClusterMap<Tri::VertexHandle>,
}

impl<Tri: Triangulation2> Default for Conformer<Tri> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Tri: Triangulation2> Conformer<Tri> {
    /// Creates an empty conformer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            clusters: ClusterMap::new(),
        }
    }

    /// Detects clusters and enqueues every constrained edge that is not
    /// locally Gabriel. Called by the engine's `init`.
    pub fn init(&mut self, tri: &Tri) {
        self.pending.clear();
        self.clusters = detect_clusters(tri);
        for (f, i) in tri.constrained_edges() {
            if !is_locally_gabriel(tri, f, i) {
                let va = tri.face_vertex(f, cw(i));
                let vb = tri.face_vertex(f, ccw(i));
                self.pending.push_back((va, vb));
            }
        }
    }

    /// True iff no pending edge remains.
    #[must_use]
    pub fn is_conformed(&self) -> bool {
        self.pending.is_empty()
    }

    /// Number of pending entries (stale ones included).
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Enqueues the constrained edge `(va, vb)` for splitting.
    pub fn add_constrained_edge_to_be_conformed(
        &mut self,
        va: Tri::VertexHandle,
        vb: Tri::VertexHandle,
    ) {
        self.pending.push_back((va, vb));
    }

    /// Pops the next pending entry, stale or not.
    pub fn pop_pending(&mut self) -> Option<(Tri::VertexHandle, Tri::VertexHandle)> {
        self.pending.pop_front()
    }

    /// The cluster at `va` containing the edge towards `vb`, if the segment
    /// lies in a small-angle fan at `va`.
    #[must_use]
    pub fn get_cluster(
        &self,
        va: Tri::VertexHandle,
        vb: Tri::VertexHandle,
    ) -> Option<&Cluster<Tri::VertexHandle>> {
        self.clusters.get(va, vb)
    }

    /// Updates the cluster map after the constrained edge `(va, vb)` was
    /// split at the new vertex `vm`: in a cluster at either endpoint, the
    /// near subedge replaces the original member.
    pub fn note_split(
        &mut self,
        tri: &Tri,
        va: Tri::VertexHandle,
        vb: Tri::VertexHandle,
        vm: Tri::VertexHandle,
    ) {
        self.clusters
            .update_after_split(va, vb, vm, tri.point(va), |v| tri.point(v));
        self.clusters
            .update_after_split(vb, va, vm, tri.point(vb), |v| tri.point(v));
    }

    /// Drops all pending edges and clusters.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.clusters.clear();
    }
}

/// True iff neither vertex facing the edge `(f, i)` strictly encroaches it.
#[must_use]
pub fn is_locally_gabriel<Tri: Triangulation2>(tri: &Tri, f: Tri::FaceHandle, i: usize) -> bool {
    let a = tri.point(tri.face_vertex(f, cw(i)));
    let b = tri.point(tri.face_vertex(f, ccw(i)));
    let near = tri.face_vertex(f, i);
    if !tri.is_infinite_vertex(near) && encroaches(tri.point(near), a, b) {
        return false;
    }
    let g = tri.neighbor(f, i);
    let far = tri.face_vertex(g, tri.mirror_index(f, i));
    !(!tri.is_infinite_vertex(far) && encroaches(tri.point(far), a, b))
}

/// True iff inserting `p` would leave the constrained edge `(f, i)` locally
/// Gabriel, i.e. `p` does not strictly encroach it.
#[must_use]
pub fn is_locally_gabriel_conform<Tri: Triangulation2>(
    tri: &Tri,
    f: Tri::FaceHandle,
    i: usize,
    p: Point2,
) -> bool {
    let a = tri.point(tri.face_vertex(f, cw(i)));
    let b = tri.point(tri.face_vertex(f, ccw(i)));
    !encroaches(p, a, b)
}

/// Split point for the cluster edge `(apex, far)`: the distance from the
/// apex snaps to the power of two nearest to half the edge length, so that
/// repeated splits of a fan land on common concentric shells.
#[must_use]
pub fn shell_split_point(apex: Point2, far: Point2) -> Point2 {
    let len = squared_distance(apex, far).sqrt();
    let shell = (len * 0.5).log2().round().exp2();
    apex.lerp(far, shell / len)
}

/// Constrained edges in the star of `v` that are not locally Gabriel, each
/// reported once. After an insertion this is exactly the set of edges whose
/// facing vertices changed, so enqueueing them restores the conformance
/// invariant.
#[must_use]
pub fn encroached_edges_around<Tri: Triangulation2>(
    tri: &Tri,
    v: Tri::VertexHandle,
) -> Vec<(Tri::VertexHandle, Tri::VertexHandle)> {
    let mut seen = FastHashSet::default();
    let mut out = Vec::new();
    for g in tri.incident_faces(v) {
        for j in 0..3 {
            if !tri.is_constrained(g, j) {
                continue;
            }
            let ea = tri.face_vertex(g, cw(j));
            let eb = tri.face_vertex(g, ccw(j));
            let key = if ea < eb { (ea, eb) } else { (eb, ea) };
            if seen.insert(key) && !is_locally_gabriel(tri, g, j) {
                out.push((ea, eb));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::triangulation::Cdt;
    use approx::assert_relative_eq;

    #[test]
    fn square_boundary_is_locally_gabriel() {
        let mut cdt = Cdt::new();
        let a = cdt.insert(Point2::new(0.0, 0.0));
        let b = cdt.insert(Point2::new(1.0, 0.0));
        let c = cdt.insert(Point2::new(1.0, 1.0));
        let d = cdt.insert(Point2::new(0.0, 1.0));
        for (u, v) in [(a, b), (b, c), (c, d), (d, a)] {
            cdt.insert_constraint(u, v).unwrap();
        }
        for (f, i) in cdt.constrained_edges() {
            assert!(is_locally_gabriel(&cdt, f, i));
        }
        let mut conformer: Conformer<Cdt> = Conformer::new();
        conformer.init(&cdt);
        assert!(conformer.is_conformed());
    }

    #[test]
    fn vertex_near_an_edge_encroaches_it() {
        let mut cdt = Cdt::new();
        let a = cdt.insert(Point2::new(0.0, 0.0));
        let b = cdt.insert(Point2::new(1.0, 0.0));
        let c = cdt.insert(Point2::new(1.0, 1.0));
        let d = cdt.insert(Point2::new(0.0, 1.0));
        for (u, v) in [(a, b), (b, c), (c, d), (d, a)] {
            cdt.insert_constraint(u, v).unwrap();
        }
        // Deep inside the diametral disk of the left edge.
        cdt.insert(Point2::new(0.05, 0.5));
        let (f, i) = cdt.is_edge(d, a).unwrap();
        assert!(!is_locally_gabriel(&cdt, f, i));
        let mut conformer: Conformer<Cdt> = Conformer::new();
        conformer.init(&cdt);
        assert!(!conformer.is_conformed());
        assert_eq!(conformer.pending_len(), 1);
    }

    #[test]
    fn shell_split_snaps_to_powers_of_two() {
        let apex = Point2::new(0.0, 0.0);
        let far = Point2::new(1.3, 0.0);
        let p = shell_split_point(apex, far);
        // Half the length is 0.65; the nearest power of two is 0.5.
        assert_relative_eq!(p.x, 0.5, max_relative = 1e-12);
        assert_relative_eq!(p.y, 0.0);

        let far = Point2::new(3.1, 0.0);
        let p = shell_split_point(apex, far);
        // Half the length is 1.55; the nearest power of two is 2.0.
        assert_relative_eq!(p.x, 2.0, max_relative = 1e-12);
    }

    #[test]
    fn shell_split_stays_inside_the_segment() {
        let apex = Point2::new(2.0, -1.0);
        for len in [0.001, 0.37, 1.0, 5.0, 1234.5] {
            let far = Point2::new(2.0 + len, -1.0);
            let p = shell_split_point(apex, far);
            assert!(p.x > apex.x && p.x < far.x, "split left the segment at length {len}");
        }
    }

    #[test]
    fn stale_pending_entries_report_not_conformed_until_popped() {
        let mut cdt = Cdt::new();
        let a = cdt.insert(Point2::new(0.0, 0.0));
        let b = cdt.insert(Point2::new(1.0, 0.0));
        cdt.insert(Point2::new(0.5, 1.0));
        cdt.insert_constraint(a, b).unwrap();
        let mut conformer: Conformer<Cdt> = Conformer::new();
        conformer.add_constrained_edge_to_be_conformed(a, b);
        assert!(!conformer.is_conformed());
        assert_eq!(conformer.pop_pending(), Some((a, b)));
        assert!(conformer.is_conformed());
    }
}
