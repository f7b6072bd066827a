// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Offset interpolation.

use ifc_share_engine::SubsetHandle;
use nalgebra::Vector3;
use std::time::Duration;

/// Easing curves, named after their GSAP counterparts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Easing {
    Linear,
    /// `power1.out`: quadratic ease-out.
    Power1Out,
    /// `power2.out`: cubic ease-out.
    Power2Out,
}

impl Easing {
    /// Maps linear progress in `[0, 1]` to eased progress in `[0, 1]`.
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear => t,
            Easing::Power1Out => 1.0 - (1.0 - t).powi(2),
            Easing::Power2Out => 1.0 - (1.0 - t).powi(3),
        }
    }
}

/// Linear progress after `elapsed` of `duration`. A zero duration is
/// complete immediately.
pub fn progress(elapsed: Duration, duration: Duration) -> f64 {
    if duration.is_zero() {
        return 1.0;
    }
    (elapsed.as_secs_f64() / duration.as_secs_f64()).min(1.0)
}

/// Movement of one subset between two offsets.
#[derive(Debug, Clone, PartialEq)]
pub struct Tween {
    pub handle: SubsetHandle,
    pub from: Vector3<f64>,
    pub to: Vector3<f64>,
}

impl Tween {
    /// Offset at eased progress `s`. Exactly `to` once `s` reaches 1.
    pub fn at(&self, s: f64) -> Vector3<f64> {
        if s >= 1.0 {
            self.to
        } else {
            self.from.lerp(&self.to, s.max(0.0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn easings_hit_both_ends() {
        for easing in [Easing::Linear, Easing::Power1Out, Easing::Power2Out] {
            assert_eq!(easing.apply(0.0), 0.0);
            assert_eq!(easing.apply(1.0), 1.0);
            assert_eq!(easing.apply(3.0), 1.0);
        }
        assert_relative_eq!(Easing::Power2Out.apply(0.5), 0.875);
        assert_relative_eq!(Easing::Power1Out.apply(0.5), 0.75);
    }

    #[test]
    fn progress_clamps() {
        let d = Duration::from_secs(2);
        assert_relative_eq!(progress(Duration::from_millis(500), d), 0.25);
        assert_eq!(progress(Duration::from_secs(5), d), 1.0);
        assert_eq!(progress(Duration::from_secs(5), Duration::ZERO), 1.0);
    }
}
