//! Tag-definition documents.
//!
//! ```xml
//! <TagDefinition version="2">
//!   <Imports>
//!     <Import filename="Animations/Mannequin/ADB/BaseTags.xml"/>
//!   </Imports>
//!   <Tag name="Armed" priority="1"/>
//!   <Tag name="Move" subTagDef="Animations/Mannequin/ADB/MoveTags.xml"/>
//!   <Group name="Stance">
//!     <Tag name="Crouch"/>
//!     <Tag name="Prone"/>
//!   </Group>
//! </TagDefinition>
//! ```
//!
//! Imported files are merged into one [`TagDefinition`], imports first. The
//! accompanying [`ImportsInfo`] tree remembers which file declared each tag
//! so saving can split the vocabulary back into its files.

use mannequin_xml::XmlNode;
use tracing::warn;

use super::{ResourceSource, expect_root};
use crate::database::TagDefCache;
use crate::error::LoadError;
use crate::hash::{normalize_path, same_path};
use crate::imports::ImportsInfo;
use crate::tag_definition::{GroupId, TagDefinition, TagId};

pub const ROOT_TAG: &str = "TagDefinition";
pub const VERSION: u32 = 2;

/// Pending `subTagDef` reference, resolved once the vocabulary is complete.
struct SubTagRef {
    tag: TagId,
    filename: String,
}

struct Loader<'s, S: ?Sized> {
    source: &'s mut S,
    def: TagDefinition,
    /// Files currently being read, outermost first.
    visiting: Vec<String>,
    sub_refs: Vec<SubTagRef>,
}

/// Read `filename` and everything it imports.
pub fn load<S: ResourceSource + ?Sized>(
    filename: &str,
    source: &mut S,
) -> Result<(TagDefinition, ImportsInfo), LoadError> {
    let filename = normalize_path(filename);
    let mut info = ImportsInfo::new(filename.as_str());
    let mut loader = Loader {
        source,
        def: TagDefinition::new(filename.as_str()),
        visiting: Vec::new(),
        sub_refs: Vec::new(),
    };
    loader.load_file(&filename, &mut info)?;

    let Loader {
        source,
        mut def,
        sub_refs,
        ..
    } = loader;
    if !def.assign_bits() {
        warn!(tag_def = %filename, bits = def.num_bits(), "too many tags, some have no bits");
    }
    for SubTagRef { tag, filename: sub } in sub_refs {
        match source.load_tag_def(&sub) {
            Ok(handle) => def.set_sub_tag_def(tag, Some(handle)),
            Err(err) => {
                warn!(tag_def = %filename, sub_tag_def = %sub, error = %err, "missing sub tag definition")
            }
        }
    }
    Ok((def, info))
}

impl<S: ResourceSource + ?Sized> Loader<'_, S> {
    fn load_file(&mut self, filename: &str, info: &mut ImportsInfo) -> Result<(), LoadError> {
        if self.visiting.iter().any(|f| same_path(f, filename)) {
            return Err(LoadError::Cycle(filename.to_string()));
        }
        let root = self.source.read_xml(filename)?;
        expect_root(&root, ROOT_TAG, filename)?;
        self.visiting.push(filename.to_string());

        for imports in root.children().iter().filter(|c| c.is("Imports")) {
            for import in imports.children_named("Import") {
                let Some(path) = import.attr("filename").filter(|p| !p.is_empty()) else {
                    warn!(tag_def = %filename, "Import without filename");
                    continue;
                };
                let path = normalize_path(path);
                let node = info.add_import(path.as_str());
                self.load_file(&path, node)?;
            }
        }

        for child in root.children() {
            if child.is("Tag") {
                self.add_tag(child, None, filename, info);
            } else if child.is("Group") {
                let Some(group) = child.attr("name").filter(|n| !n.is_empty()) else {
                    warn!(tag_def = %filename, "Group without name");
                    continue;
                };
                for tag in child.children_named("Tag") {
                    self.add_tag(tag, Some(group), filename, info);
                }
            }
        }

        self.visiting.pop();
        Ok(())
    }

    fn add_tag(&mut self, node: &XmlNode, group: Option<&str>, filename: &str, info: &mut ImportsInfo) {
        let Some(name) = node.attr("name").filter(|n| !n.is_empty()) else {
            warn!(tag_def = %filename, "Tag without name");
            return;
        };
        let priority = match node.parse_attr::<u32>("priority") {
            Ok(p) => p.unwrap_or(0),
            Err(err) => {
                warn!(tag_def = %filename, tag = %name, error = %err, "bad priority");
                0
            }
        };
        let Some(id) = self.def.add_tag(name, group, priority) else {
            warn!(tag_def = %filename, tag = %name, "duplicate tag skipped");
            return;
        };
        info.add_tag(id);
        if let Some(sub) = node.attr("subTagDef").filter(|s| !s.is_empty()) {
            self.sub_refs.push(SubTagRef {
                tag: id,
                filename: normalize_path(sub),
            });
        }
    }
}

// =============================================================================
// Save
// =============================================================================

fn tag_element(def: &TagDefinition, id: TagId, cache: &TagDefCache) -> XmlNode {
    let mut node = XmlNode::new("Tag");
    node.set_attr("name", def.tag_name(id).unwrap_or_default());
    let priority = def.priority(id);
    if priority != 0 {
        node.set_attr("priority", priority);
    }
    if let Some(sub) = def.sub_tag_def(id).and_then(|h| cache.get(h)) {
        node.set_attr("subTagDef", sub.filename());
    }
    node
}

/// One document holding `ids` and the direct imports of `node`.
fn write_file(
    def: &TagDefinition,
    node: &ImportsInfo,
    ids: &[TagId],
    cache: &TagDefCache,
) -> XmlNode {
    let mut root = XmlNode::new(ROOT_TAG);
    root.set_attr("version", VERSION);

    if !node.imports().is_empty() {
        let imports = root.create_child("Imports");
        for import in node.imports() {
            imports.create_child("Import").set_attr("filename", import.filename());
        }
    }

    let mut group_slots: Vec<(GroupId, usize)> = Vec::new();
    for &id in ids {
        let tag = tag_element(def, id, cache);
        match def.tag_group(id) {
            None => {
                root.add_child(tag);
            }
            Some(group) => {
                let slot = match group_slots.iter().find(|(g, _)| *g == group) {
                    Some((_, slot)) => *slot,
                    None => {
                        root.create_child("Group")
                            .set_attr("name", def.group_name(group).unwrap_or_default());
                        let slot = root.child_count() - 1;
                        group_slots.push((group, slot));
                        slot
                    }
                };
                root.children_mut()[slot].add_child(tag);
            }
        }
    }
    root
}

/// One `(filename, document)` pair per file of the import tree.
///
/// Tags not attributed to any file go to the root file. Without an import
/// tree the whole vocabulary is written to `def.filename()`.
pub fn save(
    def: &TagDefinition,
    info: Option<&ImportsInfo>,
    cache: &TagDefCache,
) -> Vec<(String, XmlNode)> {
    let fallback;
    let info = match info {
        Some(info) => info,
        None => {
            fallback = ImportsInfo::new(def.filename());
            &fallback
        }
    };
    let nodes = info.flatten();
    nodes
        .iter()
        .enumerate()
        .map(|(index, node)| {
            let ids: Vec<TagId> = if index == 0 {
                (0..def.len())
                    .filter(|id| node.filter().contains(id) || info.owner_of(*id).is_none())
                    .collect()
            } else {
                let mut ids = node.filter().to_vec();
                ids.sort_unstable();
                ids
            };
            (node.filename().to_string(), write_file(def, node, &ids, cache))
        })
        .collect()
}

/// The root document only, with every tag in it. Used for snapshots.
pub fn save_flat(def: &TagDefinition, cache: &TagDefCache) -> XmlNode {
    let ids: Vec<TagId> = (0..def.len()).collect();
    write_file(def, &ImportsInfo::new(def.filename()), &ids, cache)
}
