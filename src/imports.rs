//! Tag provenance across imported tag-definition files.
//!
//! A tag definition file may import other files. After loading, every tag id
//! of the merged [`TagDefinition`] is listed in the filter of exactly one
//! node of an [`ImportsInfo`] tree: the file that declared it.

use std::collections::HashMap;

use crate::hash::{path_key, same_path};
use crate::tag_definition::{TagDefinition, TagId};

/// One file of an import tree.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImportsInfo {
    filename: String,
    filter: Vec<TagId>,
    imports: Vec<ImportsInfo>,
}

impl ImportsInfo {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            ..Self::default()
        }
    }

    #[inline]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Tag ids declared directly by this file.
    #[inline]
    pub fn filter(&self) -> &[TagId] {
        &self.filter
    }

    #[inline]
    pub fn imports(&self) -> &[ImportsInfo] {
        &self.imports
    }

    pub fn add_import(&mut self, filename: impl Into<String>) -> &mut ImportsInfo {
        self.imports.push(ImportsInfo::new(filename));
        let last = self.imports.len() - 1;
        &mut self.imports[last]
    }

    pub fn add_tag(&mut self, id: TagId) {
        if !self.filter.contains(&id) {
            self.filter.push(id);
        }
    }

    pub fn clear(&mut self) {
        self.filter.clear();
        self.imports.clear();
    }

    /// Every node, pre-order (self first, then each import subtree).
    pub fn flatten(&self) -> Vec<&ImportsInfo> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(node.imports.iter().rev());
        }
        out
    }

    /// First node in pre-order whose filter holds `id`.
    pub fn owner_of(&self, id: TagId) -> Option<&ImportsInfo> {
        self.flatten().into_iter().find(|node| node.filter.contains(&id))
    }

    /// The file owning `id`, or `self` when no node claims it.
    pub fn find(&self, id: TagId) -> &ImportsInfo {
        self.owner_of(id).unwrap_or(self)
    }

    /// True if this tree contains `filename` anywhere.
    pub fn contains_file(&self, filename: &str) -> bool {
        self.flatten()
            .iter()
            .any(|node| same_path(&node.filename, filename))
    }

    /// Forget `id` and shift every higher id down by one.
    pub fn remove_tag(&mut self, id: TagId) {
        self.filter.retain(|t| *t != id);
        for t in &mut self.filter {
            if *t > id {
                *t -= 1;
            }
        }
        for import in &mut self.imports {
            import.remove_tag(id);
        }
    }

    /// Re-express every filter from `original` ids in `modified` ids by tag
    /// name. Ids without a counterpart are dropped.
    pub fn map_tags(&mut self, original: &TagDefinition, modified: &TagDefinition) {
        self.filter = self
            .filter
            .iter()
            .filter_map(|&id| original.tag_crc(id).and_then(|crc| modified.find_crc(crc)))
            .collect();
        for import in &mut self.imports {
            import.map_tags(original, modified);
        }
    }
}

/// Process-wide import trees, one per tag-definition file.
#[derive(Debug, Default)]
pub struct ImportsRegistry {
    trees: HashMap<u32, ImportsInfo>,
}

impl ImportsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, filename: &str) -> Option<&ImportsInfo> {
        self.trees.get(&path_key(filename))
    }

    pub fn get_mut(&mut self, filename: &str) -> Option<&mut ImportsInfo> {
        self.trees.get_mut(&path_key(filename))
    }

    /// Store a freshly built tree, replacing any previous one for the file.
    pub fn insert(&mut self, info: ImportsInfo) {
        self.trees.insert(path_key(&info.filename), info);
    }

    /// Existing tree for `filename`, or an empty one created on demand.
    pub fn entry(&mut self, filename: &str) -> &mut ImportsInfo {
        self.trees
            .entry(path_key(filename))
            .or_insert_with(|| ImportsInfo::new(filename))
    }

    pub fn remove(&mut self, filename: &str) -> Option<ImportsInfo> {
        self.trees.remove(&path_key(filename))
    }

    pub fn clear(&mut self) {
        self.trees.clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.trees.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// root.xml { 3 } imports base.xml { 0, 1 } which imports core.xml { 2 },
    /// and extra.xml { 4 }.
    fn tree() -> ImportsInfo {
        let mut root = ImportsInfo::new("root.xml");
        root.add_tag(3);
        {
            let base = root.add_import("base.xml");
            base.add_tag(0);
            base.add_tag(1);
            base.add_import("core.xml").add_tag(2);
        }
        root.add_import("extra.xml").add_tag(4);
        root
    }

    #[test]
    fn flatten_is_preorder() {
        let root = tree();
        let names: Vec<&str> = root.flatten().iter().map(|n| n.filename()).collect();
        assert_eq!(names, ["root.xml", "base.xml", "core.xml", "extra.xml"]);
    }

    #[test]
    fn find_returns_declaring_file() {
        let root = tree();
        assert_eq!(root.find(2).filename(), "core.xml");
        assert_eq!(root.find(1).filename(), "base.xml");
        assert_eq!(root.find(4).filename(), "extra.xml");
        assert_eq!(root.find(3).filename(), "root.xml");
    }

    #[test]
    fn find_falls_back_to_root() {
        let root = tree();
        assert!(root.owner_of(99).is_none());
        assert_eq!(root.find(99).filename(), "root.xml");
    }

    #[test]
    fn remove_tag_shifts_ids() {
        let mut root = tree();
        root.remove_tag(1);
        assert_eq!(root.find(1).filename(), "core.xml");
        assert_eq!(root.find(2).filename(), "root.xml");
        assert_eq!(root.find(3).filename(), "extra.xml");
    }

    #[test]
    fn map_tags_by_name() {
        let mut old = TagDefinition::new("root.xml");
        for name in ["A", "B", "C", "D", "E"] {
            old.add_tag(name, None, 0);
        }
        let mut new = TagDefinition::new("root.xml");
        for name in ["E", "D", "C", "A"] {
            new.add_tag(name, None, 0);
        }

        let mut root = tree();
        root.map_tags(&old, &new);
        // B (1) is gone, the rest follow their names
        assert_eq!(root.imports()[0].filter(), &[3]);
        assert_eq!(root.imports()[0].imports()[0].filter(), &[2]);
        assert_eq!(root.filter(), &[1]);
        assert_eq!(root.imports()[1].filter(), &[0]);
    }

    #[test]
    fn contains_file_ignores_case_and_separators() {
        let root = tree();
        assert!(root.contains_file("CORE.xml"));
        assert!(!root.contains_file("missing.xml"));
    }

    #[test]
    fn registry_entry_creates_once() {
        let mut registry = ImportsRegistry::new();
        registry.entry("Tags\\Root.xml").add_tag(0);
        registry.entry("tags/root.xml").add_tag(1);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("TAGS/ROOT.XML").map(|i| i.filter().len()), Some(2));

        registry.clear();
        assert!(registry.is_empty());
    }
}
