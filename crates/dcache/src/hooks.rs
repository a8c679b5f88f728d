//! In-memory observers of bucket activity.
//!
//! Hooks belong to the running process, not to the data: they are never
//! persisted, and a reloaded snapshot keeps whatever hooks were registered.

use std::collections::HashMap;
use std::fmt;

use crate::path::BucketPath;

/// Called with the bucket path and the fact name.
pub type Hook = Box<dyn Fn(&BucketPath, &str) + Send + Sync>;

/// Hooks registered per bucket path.
#[derive(Default)]
pub struct Hooks {
    proposed: HashMap<BucketPath, Vec<Hook>>,
    dismissed: HashMap<BucketPath, Vec<Hook>>,
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("proposed", &self.proposed.keys().collect::<Vec<_>>())
            .field("dismissed", &self.dismissed.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Hooks {
    /// Call `f` whenever a fact is first created in `path` by a propose.
    pub fn on_proposed(&mut self, path: BucketPath, f: impl Fn(&BucketPath, &str) + Send + Sync + 'static) {
        self.proposed.entry(path).or_default().push(Box::new(f));
    }

    /// Call `f` on every dismiss recorded in `path`.
    pub fn on_dismissed(&mut self, path: BucketPath, f: impl Fn(&BucketPath, &str) + Send + Sync + 'static) {
        self.dismissed.entry(path).or_default().push(Box::new(f));
    }

    /// Remove every hook on `path`
    pub fn clear(&mut self, path: &BucketPath) {
        self.proposed.remove(path);
        self.dismissed.remove(path);
    }

    pub(crate) fn fire_proposed(&self, path: &BucketPath, data: &str) {
        for f in self.proposed.get(path).into_iter().flatten() {
            f(path, data);
        }
    }

    pub(crate) fn fire_dismissed(&self, path: &BucketPath, data: &str) {
        for f in self.dismissed.get(path).into_iter().flatten() {
            f(path, data);
        }
    }
}
