/*!
 * Virtual File System
 * In-memory path -> content map for mediator-served assets.
 *
 * Owned by the mediator and replaced wholesale when a policy lands; its
 * lifecycle is independent of supervisor resets.
 */

use dashmap::DashMap;
use std::collections::HashMap;

pub struct VirtualFs {
    files: DashMap<String, String>,
}

impl VirtualFs {
    pub fn new() -> Self {
        Self {
            files: DashMap::new(),
        }
    }

    /// Replace the whole map with the paths from a freshly applied policy
    pub fn replace_all(&self, files: &HashMap<String, String>) {
        self.files.clear();
        for (path, content) in files {
            self.files.insert(normalize(path), content.clone());
        }
    }

    pub fn get(&self, path: &str) -> Option<String> {
        self.files.get(&normalize(path)).map(|c| c.clone())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(&normalize(path))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl Default for VirtualFs {
    fn default() -> Self {
        Self::new()
    }
}

/// Virtual paths always carry a leading slash
fn normalize(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}
