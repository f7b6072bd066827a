// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Explode directions and distances.
//!
//! Both are pure functions of the element, its position in the element list
//! and the configuration, so an explode always lays the model out the same
//! way.

use ifc_share_engine::{Bounds, ElementId};
use nalgebra::Vector3;
use xxhash_rust::xxh3::xxh3_64;

use crate::config::DirectionPolicy;

/// Used when no meaningful direction exists.
pub fn fallback_direction() -> Vector3<f64> {
    Vector3::y()
}

/// `+X, -X, +Y, -Y, +Z, -Z`, cycling by `index`.
pub fn axis_direction(index: usize) -> Vector3<f64> {
    match index % 6 {
        0 => Vector3::x(),
        1 => -Vector3::x(),
        2 => Vector3::y(),
        3 => -Vector3::y(),
        4 => Vector3::z(),
        _ => -Vector3::z(),
    }
}

/// Unit direction for the `index`-th exploded element.
pub fn explode_direction(
    policy: DirectionPolicy,
    index: usize,
    element: Option<&Bounds>,
    model: Option<&Bounds>,
) -> Vector3<f64> {
    match policy {
        DirectionPolicy::AxisRoundRobin => axis_direction(index),
        DirectionPolicy::FromCenter => match (element, model) {
            (Some(element), Some(model)) => (element.center() - model.center())
                .try_normalize(f64::EPSILON)
                .unwrap_or_else(fallback_direction),
            _ => fallback_direction(),
        },
    }
}

/// Stable pseudo-random extra distance in `[0, max]` for `element`.
pub fn jitter(element: ElementId, max: f64) -> f64 {
    if max <= 0.0 {
        return 0.0;
    }
    let unit = xxh3_64(&element.0.to_le_bytes()) as f64 / u64::MAX as f64;
    unit * max
}

/// Final offset of an exploded element.
pub fn explode_offset(direction: Vector3<f64>, element: ElementId, distance: f64, max_jitter: f64) -> Vector3<f64> {
    direction * (distance + jitter(element, max_jitter))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    #[test]
    fn axes_cycle_every_six() {
        assert_eq!(axis_direction(0), Vector3::new(1.0, 0.0, 0.0));
        assert_eq!(axis_direction(3), Vector3::new(0.0, -1.0, 0.0));
        assert_eq!(axis_direction(5), Vector3::new(0.0, 0.0, -1.0));
        assert_eq!(axis_direction(6), axis_direction(0));
    }

    #[test]
    fn center_policy_points_away_from_model() {
        let model = Bounds::around(Point3::origin(), 10.0);
        let element = Bounds::around(Point3::new(0.0, 0.0, -4.0), 1.0);
        let dir = explode_direction(DirectionPolicy::FromCenter, 0, Some(&element), Some(&model));
        assert_relative_eq!(dir, Vector3::new(0.0, 0.0, -1.0));
    }

    #[test]
    fn degenerate_center_direction_falls_back() {
        let model = Bounds::around(Point3::origin(), 10.0);
        let centered = Bounds::around(Point3::origin(), 1.0);
        let policy = DirectionPolicy::FromCenter;
        assert_eq!(
            explode_direction(policy, 4, Some(&centered), Some(&model)),
            fallback_direction()
        );
        assert_eq!(explode_direction(policy, 4, None, Some(&model)), fallback_direction());
    }

    #[test]
    fn jitter_is_bounded_and_stable() {
        for id in 0..500 {
            let j = jitter(ElementId(id), 2.5);
            assert!((0.0..=2.5).contains(&j));
            assert_eq!(j, jitter(ElementId(id), 2.5));
        }
        assert_eq!(jitter(ElementId(7), 0.0), 0.0);
    }

    #[test]
    fn offset_scales_direction() {
        let offset = explode_offset(Vector3::x(), ElementId(1), 10.0, 0.0);
        assert_relative_eq!(offset, Vector3::new(10.0, 0.0, 0.0));
    }
}
