//! Destination path layout
//!
//! Files land at `root[/<order name>]/<file name>`. Names coming from the
//! storefront are made filesystem safe, and within one run no two files are
//! ever given the same destination.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::app::models::{OrderDetail, ProductFile};
use crate::constants::files;

const MAX_COMPONENT_CHARS: usize = 200;

/// Make a single path component safe on common filesystems
pub fn sanitize_component(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .take(MAX_COMPONENT_CHARS)
        .collect();

    let trimmed = cleaned.trim().trim_end_matches('.').trim_end();
    match trimmed {
        "" | "." | ".." => "_".to_string(),
        name => name.to_string(),
    }
}

/// Sanitized file name that can never collide with our own bookkeeping files
fn safe_file_name(name: &str) -> String {
    let mut name = sanitize_component(name);
    if name.ends_with(files::TEMP_FILE_SUFFIX) || name == files::HASH_INDEX_FILE {
        name.push('_');
    }
    name
}

/// Insert `suffix` between the stem and the extension of `name`
fn with_suffix(name: &str, suffix: &str) -> String {
    let path = Path::new(name);
    match (path.file_stem(), path.extension()) {
        (Some(stem), Some(ext)) => format!(
            "{} ({}).{}",
            stem.to_string_lossy(),
            suffix,
            ext.to_string_lossy()
        ),
        _ => format!("{} ({})", name, suffix),
    }
}

/// Assigns collision-free destination paths for one run
#[derive(Debug)]
pub struct DestinationPlanner {
    root: PathBuf,
    group_by_order: bool,
    /// Lowercased paths already handed out, so names differing only in case
    /// do not clash on case-insensitive filesystems
    assigned: HashSet<String>,
}

impl DestinationPlanner {
    pub fn new(root: impl Into<PathBuf>, group_by_order: bool) -> Self {
        Self {
            root: root.into(),
            group_by_order,
            assigned: HashSet::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory the files of `order` are placed in
    pub fn order_dir(&self, order: &OrderDetail) -> PathBuf {
        if self.group_by_order {
            self.root.join(sanitize_component(&order.human_name))
        } else {
            self.root.clone()
        }
    }

    /// Destination for `file`, disambiguated against every path planned so far
    ///
    /// The first file keeps its plain name. Later files with the same name get
    /// the subproduct name as a suffix, then a counter if that is taken too.
    pub fn plan(&mut self, order: &OrderDetail, file: &ProductFile) -> PathBuf {
        let dir = self.order_dir(order);
        let base = safe_file_name(&file.display_name);

        let sub = sanitize_component(&file.sub_name);
        let candidates = std::iter::once(base.clone())
            .chain(std::iter::once(with_suffix(&base, &sub)))
            .chain((2u32..).map(|n| with_suffix(&base, &format!("{} {}", sub, n))));

        let assigned = &mut self.assigned;
        candidates
            .map(|candidate| dir.join(safe_file_name(&candidate)))
            .find(|path| assigned.insert(path.to_string_lossy().to_lowercase()))
            .unwrap_or_else(|| dir.join(&base))
    }
}
