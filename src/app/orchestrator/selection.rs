//! Which orders and files a run touches

use std::collections::HashSet;

use crate::app::models::{OrderKey, Platform, ProductFile};

/// Platform allow-list and optional single-bundle restriction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionPolicy {
    /// `None` selects every platform
    pub platforms: Option<HashSet<Platform>>,
    /// Restrict the run to one order
    pub bundle_id: Option<OrderKey>,
}

impl SelectionPolicy {
    /// Everything in every order
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_platforms(mut self, platforms: impl IntoIterator<Item = Platform>) -> Self {
        self.platforms = Some(platforms.into_iter().collect());
        self
    }

    pub fn with_bundle_id(mut self, bundle_id: impl Into<OrderKey>) -> Self {
        self.bundle_id = Some(bundle_id.into());
        self
    }

    pub fn allows_file(&self, file: &ProductFile) -> bool {
        self.platforms
            .as_ref()
            .map_or(true, |platforms| platforms.contains(&file.platform))
    }

    /// Apply the bundle restriction and drop duplicate keys, keeping order
    ///
    /// The second value is the requested bundle id when none of `keys` matched.
    pub fn select_keys(&self, keys: Vec<OrderKey>) -> (Vec<OrderKey>, Option<OrderKey>) {
        let mut seen = HashSet::new();
        let unique: Vec<OrderKey> = keys
            .into_iter()
            .filter(|key| seen.insert(key.clone()))
            .collect();

        match &self.bundle_id {
            None => (unique, None),
            Some(wanted) => {
                if unique.contains(wanted) {
                    (vec![wanted.clone()], None)
                } else {
                    (Vec::new(), Some(wanted.clone()))
                }
            }
        }
    }
}
