//! Triangle quality criteria.
//!
//! The refinement engine asks one question of a triangle: is it bad? The
//! answer, together with the squared minimum sine it uses as a priority, is
//! delegated to a [`MeshingCriteria`] implementation so the same engine can
//! refine towards different quality goals.

use serde::{Deserialize, Serialize};

use crate::geometry::point::Point2;
use crate::geometry::predicates;

/// Quality predicate driving the refinement.
pub trait MeshingCriteria {
    /// Does the triangle `(pa, pb, pc)` fail the quality requirement?
    fn is_bad(&self, pa: Point2, pb: Point2, pc: Point2) -> bool;

    /// Squared sine of the smallest angle; the engine orders bad faces by
    /// this measure, smaller being worse.
    fn squared_minimum_sine(&self, pa: Point2, pb: Point2, pc: Point2) -> f64 {
        predicates::squared_minimum_sine(pa, pb, pc)
    }
}

/// Minimum-angle criterion with an optional edge-length cap.
///
/// A triangle is bad when the squared sine of its smallest angle falls below
/// the bound, or when any edge is longer than the optional size bound. The
/// default bound `0.125` corresponds to the classical ≈20.7° limit below
/// which Ruppert-style refinement of a cluster-free domain terminates.
///
/// # Examples
///
/// ```
/// use mesh2d::geometry::point::Point2;
/// use mesh2d::mesh::criteria::{MeshingCriteria, MinAngleCriteria};
///
/// let criteria = MinAngleCriteria::from_degrees(20.0);
/// // A 45-45-90 triangle is fine at a 20 degree bound.
/// assert!(!criteria.is_bad(
///     Point2::new(0.0, 0.0),
///     Point2::new(1.0, 0.0),
///     Point2::new(0.0, 1.0),
/// ));
/// // A long sliver is not.
/// assert!(criteria.is_bad(
///     Point2::new(0.0, 0.0),
///     Point2::new(1.0, 0.0),
///     Point2::new(0.5, 0.01),
/// ));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinAngleCriteria {
    squared_sine_bound: f64,
    max_squared_edge_length: Option<f64>,
}

impl Default for MinAngleCriteria {
    fn default() -> Self {
        Self {
            squared_sine_bound: 0.125,
            max_squared_edge_length: None,
        }
    }
}

impl MinAngleCriteria {
    /// Criterion requiring every angle to reach at least `degrees`.
    ///
    /// Bounds above ≈20.7° (squared sine 0.125) void the termination
    /// guarantee on general input, though many domains still converge.
    #[must_use]
    pub fn from_degrees(degrees: f64) -> Self {
        let sine = degrees.to_radians().sin();
        Self::from_squared_sine_bound(sine * sine)
    }

    /// Criterion from the raw squared-sine bound.
    #[must_use]
    pub fn from_squared_sine_bound(bound: f64) -> Self {
        assert!(bound >= 0.0, "squared sine bound must be non-negative");
        Self {
            squared_sine_bound: bound,
            max_squared_edge_length: None,
        }
    }

    /// Additionally caps edge lengths at `length`.
    #[must_use]
    pub fn with_max_edge_length(mut self, length: f64) -> Self {
        assert!(length > 0.0, "edge length cap must be positive");
        self.max_squared_edge_length = Some(length * length);
        self
    }

    /// The squared-sine bound in force.
    #[must_use]
    pub fn squared_sine_bound(&self) -> f64 {
        self.squared_sine_bound
    }
}

impl MeshingCriteria for MinAngleCriteria {
    fn is_bad(&self, pa: Point2, pb: Point2, pc: Point2) -> bool {
        if self.squared_minimum_sine(pa, pb, pc) < self.squared_sine_bound {
            return true;
        }
        match self.max_squared_edge_length {
            Some(cap) => {
                predicates::squared_distance(pa, pb) > cap
                    || predicates::squared_distance(pb, pc) > cap
                    || predicates::squared_distance(pc, pa) > cap
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn degree_constructor_matches_sine_bound() {
        let c = MinAngleCriteria::from_degrees(30.0);
        assert_relative_eq!(c.squared_sine_bound(), 0.25, max_relative = 1e-12);
    }

    #[test]
    fn equilateral_is_never_bad() {
        let c = MinAngleCriteria::from_degrees(20.0);
        let h = 3.0_f64.sqrt() / 2.0;
        assert!(!c.is_bad(
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(0.5, h),
        ));
    }

    #[test]
    fn size_bound_flags_large_triangles() {
        let c = MinAngleCriteria::from_degrees(20.0).with_max_edge_length(0.5);
        let h = 3.0_f64.sqrt() / 2.0;
        assert!(c.is_bad(
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(0.5, h),
        ));
    }

    #[test]
    fn zero_bound_accepts_everything_with_area() {
        let c = MinAngleCriteria::from_squared_sine_bound(0.0);
        assert!(!c.is_bad(
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(0.5, 1e-6),
        ));
    }
}
