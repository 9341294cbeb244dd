//! # Marker Decluttering
//!
//! Greedy selection of a visually non-overlapping marker subset.
//!
//! The controller hands this module a priority-ordered candidate list (its
//! sort puts the markers the user cares about most first) and the minimum
//! marker separation resolved for the current zoom. Candidates are accepted
//! in order; each one must clear the separation distance against everything
//! accepted before it, so earlier entries always win contested ground.
//!
//! The scan is O(n * k) for n candidates and k accepted markers. Store query
//! limits cap n at a few hundred and the separation constraint keeps k small,
//! so no spatial index is warranted here.

use crate::geo_math::distance_miles;
use crate::EnrichedHotspot;

/// Greedily selects a subset of `candidates` in which every pair of markers
/// is at least `min_separation_miles` apart.
///
/// Input order is priority order: a candidate is dropped only when it lands
/// within the separation distance of an already-accepted, earlier candidate.
/// The pass is fully deterministic; the same input and threshold always
/// produce the same output, in the same order.
///
/// A non-positive separation disables filtering and returns the candidates
/// untouched.
///
/// # Example
///
/// ```rust
/// use hotspot_engine::{declutter, Coordinate, EnrichedHotspot, Hotspot};
///
/// let a = EnrichedHotspot::new(
///     Hotspot::new("A", "cafe", Coordinate::new(40.7580, -73.9855)),
///     0.0,
///     0.0,
/// );
/// // 0.69 miles north of A.
/// let b = EnrichedHotspot::new(
///     Hotspot::new("B", "bar", Coordinate::new(40.7680, -73.9855)),
///     0.69,
///     0.69,
/// );
///
/// assert_eq!(declutter(vec![a.clone(), b.clone()], 0.5).len(), 2);
/// assert_eq!(declutter(vec![a, b], 1.0).len(), 1);
/// ```
pub fn declutter(
    candidates: Vec<EnrichedHotspot>,
    min_separation_miles: f64,
) -> Vec<EnrichedHotspot> {
    if min_separation_miles <= 0.0 {
        return candidates;
    }

    let mut accepted: Vec<EnrichedHotspot> = Vec::new();

    for candidate in candidates {
        let clear = accepted.iter().all(|kept| {
            distance_miles(&kept.hotspot.location, &candidate.hotspot.location)
                >= min_separation_miles
        });
        if clear {
            accepted.push(candidate);
        }
    }

    accepted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Coordinate, Hotspot};

    fn spot(name: &str, lat: f64, lon: f64) -> EnrichedHotspot {
        EnrichedHotspot::new(Hotspot::new(name, "cafe", Coordinate::new(lat, lon)), 0.0, 0.0)
    }

    /// Moves `miles` north of a base latitude (1 degree latitude is about
    /// 69 miles everywhere).
    fn north_of(lat: f64, miles: f64) -> f64 {
        lat + miles / 69.0
    }

    #[test]
    fn test_empty_input_yields_empty_output() {
        assert!(declutter(vec![], 0.025).is_empty());
    }

    #[test]
    fn test_single_point_always_accepted() {
        let out = declutter(vec![spot("only", 40.758, -73.9855)], 10.0);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].hotspot.name, "only");
    }

    #[test]
    fn test_earlier_candidate_wins_contested_ground() {
        let base = 40.758;
        let input = vec![
            spot("first", base, -73.9855),
            spot("second", north_of(base, 0.01), -73.9855),
        ];
        let out = declutter(input, 0.025);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].hotspot.name, "first");
    }

    #[test]
    fn test_separated_points_all_survive() {
        let base = 40.758;
        let input = vec![
            spot("a", base, -73.9855),
            spot("b", north_of(base, 0.05), -73.9855),
            spot("c", north_of(base, 0.10), -73.9855),
        ];
        let out = declutter(input, 0.025);
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn test_pairwise_separation_invariant() {
        // A jittered grid dense enough that many candidates collide.
        let min_sep = 0.04;
        let mut input = Vec::new();
        for i in 0..12 {
            for j in 0..12 {
                input.push(spot(
                    &format!("p{i}-{j}"),
                    40.70 + i as f64 * 0.0004 + (j as f64 * 0.00007),
                    -74.00 + j as f64 * 0.0004,
                ));
            }
        }

        let out = declutter(input, min_sep);
        assert!(!out.is_empty());
        for (i, p) in out.iter().enumerate() {
            for q in out.iter().skip(i + 1) {
                let d = distance_miles(&p.hotspot.location, &q.hotspot.location);
                assert!(
                    d >= min_sep,
                    "{} and {} are only {:.4} mi apart",
                    p.hotspot.name,
                    q.hotspot.name,
                    d
                );
            }
        }
    }

    #[test]
    fn test_deterministic_across_calls() {
        let base = 40.758;
        let input: Vec<EnrichedHotspot> = (0..30)
            .map(|i| spot(&format!("p{i}"), north_of(base, i as f64 * 0.013), -73.9855))
            .collect();

        let first = declutter(input.clone(), 0.025);
        let second = declutter(input, 0.025);
        assert_eq!(first, second);
    }

    #[test]
    fn test_output_preserves_input_order() {
        let base = 40.758;
        let input = vec![
            spot("near", base, -73.9855),
            spot("mid", north_of(base, 0.05), -73.9855),
            spot("far", north_of(base, 0.10), -73.9855),
        ];
        let names: Vec<String> = declutter(input, 0.025)
            .into_iter()
            .map(|e| e.hotspot.name)
            .collect();
        assert_eq!(names, vec!["near", "mid", "far"]);
    }

    #[test]
    fn test_non_positive_separation_disables_filtering() {
        let input = vec![
            spot("a", 40.758, -73.9855),
            spot("b", 40.758, -73.9855), // exact duplicate location
        ];
        assert_eq!(declutter(input.clone(), 0.0).len(), 2);
        assert_eq!(declutter(input, -1.0).len(), 2);
    }

    #[test]
    fn test_one_marker_per_duplicate_cluster() {
        // Five clusters of eight near-duplicate points each (at most 0.01 mi
        // of spread inside a cluster), clusters miles apart. At 0.025 mi
        // separation exactly one marker per cluster survives.
        let mut input = Vec::new();
        for c in 0..5 {
            let cluster_lat = 40.70 + c as f64 * 0.1;
            for m in 0..8 {
                // Ring of radius 0.005 mi around the cluster center, so every
                // pairwise distance within the cluster is at most 0.01 mi.
                let theta = m as f64 * std::f64::consts::TAU / 8.0;
                let lat = north_of(cluster_lat, 0.005 * theta.cos());
                let lon = -73.9855
                    + (0.005 * theta.sin() / 69.0) / cluster_lat.to_radians().cos();
                input.push(spot(&format!("c{c}-m{m}"), lat, lon));
            }
        }

        let out = declutter(input, 0.025);
        assert_eq!(out.len(), 5);
        for (i, survivor) in out.iter().enumerate() {
            assert_eq!(survivor.hotspot.name, format!("c{i}-m0"));
        }
    }
}
