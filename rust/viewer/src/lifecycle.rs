// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mount/unmount liveness shared by every component of a session.
//!
//! There is no cancellation token. Async work that resumes after the viewer
//! was unmounted checks the flag before it mutates anything.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Result, ViewerError};

#[derive(Debug, Clone)]
pub struct Liveness(Arc<AtomicBool>);

impl Liveness {
    pub fn new() -> Self {
        Liveness(Arc::new(AtomicBool::new(true)))
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// `Err(Unmounted)` once the session is gone.
    #[inline]
    pub fn ensure(&self) -> Result<()> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(ViewerError::Unmounted)
        }
    }

    /// Marks the session as unmounted. Returns `false` if it already was.
    pub fn shutdown(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let live = Liveness::new();
        let other = live.clone();
        assert!(other.ensure().is_ok());
        assert!(live.shutdown());
        assert!(!live.shutdown());
        assert!(matches!(other.ensure(), Err(ViewerError::Unmounted)));
    }
}
