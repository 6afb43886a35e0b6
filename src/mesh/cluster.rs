//! Clusters of constrained edges around a common vertex.
//!
//! Two constrained edges leaving the same vertex at an angle below 60° can
//! feed each other encroachments forever: a split point on one edge lands
//! inside the diametral disk of the other whenever their distances to the
//! apex differ. Refinement therefore treats maximal fans of such edges as a
//! unit. Split points on cluster edges snap to concentric shells (powers of
//! two from the apex), and once every member sits on the same shell the
//! cluster is *reduced*: splitting any member again would introduce a vertex
//! at squared distance [`Cluster::rmin`] from its nearest neighbor, which is
//! the quantity Shewchuk's terminator compares against the attacking
//! triangle's shortest edge.

use std::f64::consts::FRAC_PI_3;
use std::fmt::Debug;
use std::hash::Hash;

use crate::core::collections::{FastHashMap, FastHashSet, SmallBuffer};
use crate::core::traits::triangulation2::{Triangulation2, cw, ccw};
use crate::geometry::point::Point2;
use crate::geometry::predicates::squared_distance;

/// Relative tolerance under which two member lengths count as equal.
const LENGTH_EQUALITY_EPS: f64 = 1e-9;

/// A maximal fan of constrained edges sharing an apex, with consecutive
/// direction gaps below 60°.
#[derive(Debug, Clone)]
pub struct Cluster<V: Copy + Eq + Hash> {
    /// Far endpoints of the member edges.
    members: FastHashSet<V>,
    reduced: bool,
    rmin: f64,
    /// `sin²(θ/2)` for the smallest direction gap of the fan; fixed at
    /// detection time.
    sin_sq_half_angle: f64,
}

impl<V: Copy + Eq + Hash> Cluster<V> {
    fn new(
        members: Vec<V>,
        min_gap: f64,
        apex_point: Point2,
        point_of: impl Fn(V) -> Point2,
    ) -> Self {
        let half_sine = (min_gap * 0.5).sin();
        let mut cluster = Self {
            members: members.into_iter().collect(),
            reduced: false,
            rmin: 0.0,
            sin_sq_half_angle: half_sine * half_sine,
        };
        cluster.refresh(apex_point, point_of);
        cluster
    }

    /// True iff `v` is the far endpoint of a member edge.
    #[must_use]
    pub fn contains(&self, v: &V) -> bool {
        self.members.contains(v)
    }

    /// True iff every member edge has the same length.
    #[must_use]
    pub fn is_reduced(&self) -> bool {
        self.reduced
    }

    /// Squared minimum insertion radius: the squared distance between two
    /// adjacent split points at the common shell radius.
    #[must_use]
    pub fn rmin(&self) -> f64 {
        self.rmin
    }

    /// Number of member edges.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// True iff the cluster has no members left.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Recomputes `reduced` and `rmin` from the current member lengths.
    fn refresh(&mut self, apex_point: Point2, point_of: impl Fn(V) -> Point2) {
        let mut min_sq = f64::INFINITY;
        let mut max_sq = 0.0_f64;
        for &v in &self.members {
            let d = squared_distance(apex_point, point_of(v));
            min_sq = min_sq.min(d);
            max_sq = max_sq.max(d);
        }
        if self.members.is_empty() {
            self.reduced = false;
            self.rmin = 0.0;
            return;
        }
        self.reduced = max_sq - min_sq <= LENGTH_EQUALITY_EPS * max_sq;
        self.rmin = min_sq * self.sin_sq_half_angle;
    }
}

/// All clusters of a triangulation, indexed by apex vertex.
#[derive(Debug, Clone, Default)]
pub struct ClusterMap<V: Copy + Eq + Hash + Debug> {
    map: FastHashMap<V, SmallBuffer<Cluster<V>, 2>>,
}

impl<V: Copy + Eq + Hash + Debug> ClusterMap<V> {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            map: FastHashMap::default(),
        }
    }

    /// The cluster at `apex` whose members include `far`, if any.
    #[must_use]
    pub fn get(&self, apex: V, far: V) -> Option<&Cluster<V>> {
        self.map
            .get(&apex)?
            .iter()
            .find(|cluster| cluster.contains(&far))
    }

    /// Number of clusters over all apexes.
    #[must_use]
    pub fn cluster_count(&self) -> usize {
        self.map.values().map(|list| list.len()).sum()
    }

    /// Records that the member edge `(apex, old_far)` was split at a new
    /// vertex `new_far`: the near subedge replaces the member, and the
    /// cluster's reduction state is refreshed.
    pub fn update_after_split(
        &mut self,
        apex: V,
        old_far: V,
        new_far: V,
        apex_point: Point2,
        point_of: impl Fn(V) -> Point2,
    ) {
        let Some(cluster) = self
            .map
            .get_mut(&apex)
            .and_then(|list| list.iter_mut().find(|c| c.contains(&old_far)))
        else {
            return;
        };
        cluster.members.remove(&old_far);
        cluster.members.insert(new_far);
        cluster.refresh(apex_point, point_of);
    }

    /// Removes every cluster.
    pub fn clear(&mut self) {
        self.map.clear();
    }
}

/// Detects the clusters of a triangulation.
///
/// For every vertex with at least two incident constrained edges, the edges
/// are sorted by direction and maximal runs of consecutive edges with gaps
/// strictly below 60° become clusters. A vertex whose fan closes on itself
/// (every gap small) forms a single cluster of all its constrained edges.
#[must_use]
pub fn detect_clusters<Tri: Triangulation2>(tri: &Tri) -> ClusterMap<Tri::VertexHandle> {
    let mut adjacency: FastHashMap<Tri::VertexHandle, Vec<Tri::VertexHandle>> =
        FastHashMap::default();
    for (f, i) in tri.constrained_edges() {
        let va = tri.face_vertex(f, cw(i));
        let vb = tri.face_vertex(f, ccw(i));
        adjacency.entry(va).or_default().push(vb);
        adjacency.entry(vb).or_default().push(va);
    }

    let mut clusters = ClusterMap::new();
    for (&apex, neighbors) in &adjacency {
        if neighbors.len() < 2 {
            continue;
        }
        let apex_point = tri.point(apex);
        let mut fan: Vec<(f64, Tri::VertexHandle)> = neighbors
            .iter()
            .map(|&v| {
                let p = tri.point(v);
                ((p.y - apex_point.y).atan2(p.x - apex_point.x), v)
            })
            .collect();
        fan.sort_by(|a, b| a.partial_cmp(b).expect("finite angles"));

        let n = fan.len();
        let gap = |k: usize| {
            let a = fan[k].0;
            let b = fan[(k + 1) % n].0;
            if k + 1 == n {
                b + std::f64::consts::TAU - a
            } else {
                b - a
            }
        };
        let small: Vec<bool> = (0..n).map(|k| gap(k) < FRAC_PI_3).collect();

        let mut found: Vec<(Vec<Tri::VertexHandle>, f64)> = Vec::new();
        if small.iter().all(|&s| s) {
            let min_gap = (0..n).map(|k| gap(k)).fold(f64::INFINITY, f64::min);
            found.push((fan.iter().map(|&(_, v)| v).collect(), min_gap));
        } else {
            // Start at an edge whose incoming gap is wide, so runs never
            // straddle the starting point.
            let start = (0..n)
                .find(|&k| !small[(k + n - 1) % n])
                .expect("some gap is wide");
            let mut run: Vec<Tri::VertexHandle> = vec![fan[start].1];
            let mut run_gap = f64::INFINITY;
            for step in 0..n {
                let k = (start + step) % n;
                if small[k] {
                    run.push(fan[(k + 1) % n].1);
                    run_gap = run_gap.min(gap(k));
                } else {
                    if run.len() >= 2 {
                        found.push((std::mem::take(&mut run), run_gap));
                    }
                    run = vec![fan[(k + 1) % n].1];
                    run_gap = f64::INFINITY;
                }
            }
            if run.len() >= 2 {
                found.push((run, run_gap));
            }
        }

        if !found.is_empty() {
            let list = clusters.map.entry(apex).or_default();
            for (members, min_gap) in found {
                list.push(Cluster::new(members, min_gap, apex_point, |v| {
                    tri.point(v)
                }));
            }
        }
    }
    clusters
}
