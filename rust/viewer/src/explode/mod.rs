// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Explode/reset animation.
//!
//! ```text
//! Collapsed --explode--> Exploding --(subsets scheduled)--> Exploded
//!     ^                                                        |
//!     +----(animation done)---- Resetting <-------reset--------+
//! ```
//!
//! One operation runs at a time. Operations queue on an async lock in arrival
//! order, so a toggle pressed during an explode is applied after every
//! subset of that explode exists. Animations themselves are fire-and-forget:
//! a frame task moves the subsets and is superseded by the next operation.

mod direction;
mod tween;

pub use direction::{axis_direction, explode_direction, explode_offset, fallback_direction, jitter};
pub use tween::{progress, Easing, Tween};

use ifc_share_engine::Engine;
use nalgebra::Vector3;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::ViewerConfig;
use crate::error::Result;
use crate::lifecycle::Liveness;
use crate::subsets::{ExplodedSubset, SubsetRegistry};

/// Where the model is in the explode cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExplodePhase {
    #[default]
    Collapsed,
    Exploding,
    Exploded,
    Resetting,
}

impl ExplodePhase {
    /// Whether the view counts as exploded (the toggle would reset it).
    pub fn is_exploded(self) -> bool {
        matches!(self, ExplodePhase::Exploding | ExplodePhase::Exploded)
    }
}

/// Drives explode and reset for one model.
pub struct ExplodeAnimator {
    engine: Arc<dyn Engine>,
    registry: Arc<SubsetRegistry>,
    config: ViewerConfig,
    liveness: Liveness,
    phase: Arc<Mutex<ExplodePhase>>,
    op_lock: tokio::sync::Mutex<()>,
    generation: Arc<AtomicU64>,
    running: Mutex<Option<JoinHandle<()>>>,
}

impl ExplodeAnimator {
    pub fn new(
        engine: Arc<dyn Engine>,
        registry: Arc<SubsetRegistry>,
        config: ViewerConfig,
        liveness: Liveness,
    ) -> Self {
        Self {
            engine,
            registry,
            config,
            liveness,
            phase: Arc::new(Mutex::new(ExplodePhase::Collapsed)),
            op_lock: tokio::sync::Mutex::new(()),
            generation: Arc::new(AtomicU64::new(0)),
            running: Mutex::new(None),
        }
    }

    pub fn phase(&self) -> ExplodePhase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, phase: ExplodePhase) {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = phase;
    }

    pub fn is_exploded(&self) -> bool {
        self.phase().is_exploded()
    }

    /// Explodes a collapsed model, or resets an exploded one. Returns the
    /// phase after the operation was scheduled.
    pub async fn toggle(&self) -> Result<ExplodePhase> {
        let _op = self.op_lock.lock().await;
        if self.phase().is_exploded() {
            self.reset_locked().await?;
        } else {
            self.explode_locked().await?;
        }
        Ok(self.phase())
    }

    /// Explodes the model. Returns how many subsets are moving.
    pub async fn explode(&self) -> Result<usize> {
        let _op = self.op_lock.lock().await;
        self.explode_locked().await
    }

    /// Sends every exploded subset back to its original placement.
    pub async fn reset(&self) -> Result<usize> {
        let _op = self.op_lock.lock().await;
        self.reset_locked().await
    }

    async fn explode_locked(&self) -> Result<usize> {
        self.liveness.ensure()?;
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.set_phase(ExplodePhase::Exploding);

        let exploded = match self.registry.explode_all().await {
            Ok(exploded) => exploded,
            Err(e) => {
                self.set_phase(ExplodePhase::Collapsed);
                return Err(e);
            }
        };

        let model = self.registry.model();
        let model_bounds = self.engine.model_bounds(model).ok().flatten();
        let tweens: Vec<Tween> = exploded
            .into_iter()
            .map(|subset| {
                let element_bounds = self
                    .engine
                    .element_bounds(model, subset.element)
                    .ok()
                    .flatten();
                let direction = explode_direction(
                    self.config.direction_policy,
                    subset.index,
                    element_bounds.as_ref(),
                    model_bounds.as_ref(),
                );
                let to = explode_offset(
                    direction,
                    subset.element,
                    self.config.explode_distance,
                    self.config.explode_jitter,
                );
                self.tween_to(subset, to)
            })
            .collect();

        let count = tweens.len();
        self.set_phase(ExplodePhase::Exploded);
        info!(model = %model, subsets = count, "Explode scheduled");
        self.animate(tweens, self.config.explode_duration, Easing::Power2Out, generation, None);
        Ok(count)
    }

    async fn reset_locked(&self) -> Result<usize> {
        self.liveness.ensure()?;
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let exploded = self.registry.reset_all()?;
        self.set_phase(ExplodePhase::Resetting);

        let tweens: Vec<Tween> = exploded
            .into_iter()
            .map(|subset| self.tween_to(subset, Vector3::zeros()))
            .collect();

        let count = tweens.len();
        info!(model = %self.registry.model(), subsets = count, "Reset scheduled");
        self.animate(
            tweens,
            self.config.reset_duration,
            Easing::Power1Out,
            generation,
            Some(ExplodePhase::Collapsed),
        );
        Ok(count)
    }

    /// Tween from wherever the subset currently is.
    fn tween_to(&self, subset: ExplodedSubset, to: Vector3<f64>) -> Tween {
        let from = self
            .engine
            .subset_offset(&subset.handle)
            .unwrap_or_else(|_| Vector3::zeros());
        Tween {
            handle: subset.handle,
            from,
            to,
        }
    }

    /// Starts the frame task for `tweens`, superseding any running one.
    fn animate(
        &self,
        tweens: Vec<Tween>,
        duration: Duration,
        easing: Easing,
        generation: u64,
        settle_to: Option<ExplodePhase>,
    ) {
        let engine = Arc::clone(&self.engine);
        let liveness = self.liveness.clone();
        let current = Arc::clone(&self.generation);
        let phase = Arc::clone(&self.phase);
        let frame = self.config.frame_interval.max(Duration::from_millis(1));

        let task = tokio::spawn(async move {
            let mut tweens = tweens;
            let started = Instant::now();
            let mut ticker = tokio::time::interval(frame);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                if !liveness.is_alive() || current.load(Ordering::Acquire) != generation {
                    return;
                }
                let t = progress(started.elapsed(), duration);
                let eased = easing.apply(t);
                // A subset removed mid-flight drops out of the animation.
                tweens.retain(|tween| engine.set_subset_offset(&tween.handle, tween.at(eased)).is_ok());
                if t >= 1.0 {
                    break;
                }
            }

            if let Some(settled) = settle_to {
                let mut phase = phase.lock().unwrap_or_else(PoisonError::into_inner);
                if current.load(Ordering::Acquire) == generation {
                    *phase = settled;
                }
            }
            debug!(generation, "Animation finished");
        });

        let previous = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Waits until no animation is running.
    pub async fn settle(&self) {
        loop {
            let task = self
                .running
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            match task {
                // Aborted tasks resolve with a cancellation error; both are done.
                Some(task) => {
                    let _ = task.await;
                }
                None => break,
            }
        }
    }

    /// Stops any animation and removes every exploded subset at once.
    pub async fn collapse_now(&self) -> Result<usize> {
        let _op = self.op_lock.lock().await;
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.cancel();
        let removed = self.registry.remove_exploded().await?;
        self.set_phase(ExplodePhase::Collapsed);
        Ok(removed)
    }

    /// Aborts the running animation, if any.
    pub fn cancel(&self) {
        let task = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }
    }
}

impl Drop for ExplodeAnimator {
    fn drop(&mut self) {
        self.cancel();
    }
}
