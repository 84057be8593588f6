//! Animation database documents.
//!
//! ```xml
//! <AnimDB FragDef="frags.xml" TagDef="tags.xml">
//!   <SubADBs>
//!     <SubADB Tags="Crouch" File="player_crouch.adb">
//!       <FragmentID Name="Move"/>
//!     </SubADB>
//!   </SubADBs>
//!   <FragmentList>
//!     <Idle>
//!       <Fragment Tags="Armed" BlendOutDuration="0.2"> ... </Fragment>
//!     </Idle>
//!   </FragmentList>
//!   <FragmentBlendList>
//!     <Blend from="Idle" to="Move">
//!       <Variant from="" to="Armed">
//!         <Fragment selectTime="0" enterTime="0"> ... </Fragment>
//!       </Variant>
//!     </Blend>
//!   </FragmentBlendList>
//! </AnimDB>
//! ```
//!
//! A database file may reference its vocabularies through a controller
//! definition (`Def="..."`) instead of `FragDef`/`TagDef`. Data in SubADB
//! files is always parsed with the root database's vocabularies and merged
//! into the root database; the SubADB tree only remembers which file it came
//! from.

use mannequin_xml::XmlNode;
use tracing::{debug, warn};

use super::{ResourceSource, expect_root, parse_tags};
use crate::cache::TagDefId;
use crate::database::{AnimationDatabase, FragmentBlendKey, FragmentId, SubAdb, TagDefCache};
use crate::error::LoadError;
use crate::fragment::{Fragment, FragmentBlend, TRANSITION_FLAGS};
use crate::hash::{normalize_path, same_path};
use crate::ownership::{Ownership, SaveNode, SavePlan};
use crate::tag_definition::{FragTagState, TagDefinition, TagState};

pub const ROOT_TAG: &str = "AnimDB";

// =============================================================================
// Load
// =============================================================================

/// Tag and fragment vocabularies a database document refers to, as
/// `(tag_def, frag_def)`.
pub fn definitions<S: ResourceSource + ?Sized>(
    root: &XmlNode,
    filename: &str,
    source: &mut S,
) -> Result<(TagDefId, TagDefId), LoadError> {
    let missing = |referenced: &str| LoadError::MissingDefinition {
        filename: filename.to_string(),
        referenced: referenced.to_string(),
    };

    if let Some(def) = root.attr("Def").filter(|d| !d.is_empty()) {
        let def = normalize_path(def);
        return source
            .load_controller_vocabularies(&def)
            .map_err(|err| {
                warn!(database = %filename, controller_def = %def, error = %err, "failed to load controller definition");
                missing(&def)
            });
    }

    let frag_def = root.attr("FragDef").filter(|f| !f.is_empty()).ok_or(LoadError::MissingAttribute {
        filename: filename.to_string(),
        what: "FragDef",
    })?;
    let tag_def = root.attr("TagDef").filter(|t| !t.is_empty()).ok_or(LoadError::MissingAttribute {
        filename: filename.to_string(),
        what: "TagDef",
    })?;

    let frag_def = normalize_path(frag_def);
    let frag_id = source.load_tag_def(&frag_def).map_err(|_| missing(&frag_def))?;
    let tag_def = normalize_path(tag_def);
    let tag_id = source.load_tag_def(&tag_def).map_err(|_| missing(&tag_def))?;
    Ok((tag_id, frag_id))
}

/// Build a database from its document, following SubADB files.
pub fn load<S: ResourceSource + ?Sized>(
    root: &XmlNode,
    filename: &str,
    source: &mut S,
) -> Result<AnimationDatabase, LoadError> {
    expect_root(root, ROOT_TAG, filename)?;
    let filename = normalize_path(filename);
    let (tag_def, frag_def) = definitions(root, &filename, source)?;
    let count = source
        .tag_defs()
        .get(frag_def)
        .map(TagDefinition::len)
        .ok_or_else(|| LoadError::NotLoaded(filename.clone()))?;

    let mut db = AnimationDatabase::new(filename.as_str(), tag_def, frag_def, count);
    let mut chain = vec![filename.clone()];
    let subs = load_data(&mut db, root, TagState::EMPTY, true, &mut chain, source);
    db.sub_adbs_mut().extend(subs);
    db.sort(source.tag_defs());

    debug!(
        database = %filename,
        options = db.option_count(),
        blends = db.blend_count(),
        sub_adbs = db.sub_adbs().len(),
        "loaded animation database"
    );
    Ok(db)
}

/// Merge the data of one document into `db`.
///
/// With `recursive`, SubADB files are loaded too and the SubADBs declared by
/// `root` are returned; the caller attaches them to the right parent.
/// `chain` holds the files currently being read and guards against a file
/// listing itself.
pub fn load_data<S: ResourceSource + ?Sized>(
    db: &mut AnimationDatabase,
    root: &XmlNode,
    filter: TagState,
    recursive: bool,
    chain: &mut Vec<String>,
    source: &mut S,
) -> Vec<SubAdb> {
    let mut subs = Vec::new();
    if recursive && let Some(list) = root.find_child("SubADBs") {
        for entry in list.children() {
            if let Some(sub) = load_sub_adb(db, entry, filter, chain, source) {
                subs.push(sub);
            }
        }
    }

    let verbose = source.log_unknown_tags();
    let cache = source.tag_defs();
    let (Some(tags), Some(frags)) = (cache.get(db.tag_def()), cache.get(db.frag_def())) else {
        warn!(database = %db.filename(), "vocabularies not loaded");
        return subs;
    };
    let context = chain.last().map(String::as_str).unwrap_or_default().to_string();

    if let Some(list) = root.find_child("FragmentList") {
        for entry in list.children() {
            let Some(id) = frags.find(entry.tag()) else {
                warn!(database = %context, fragment = %entry.tag(), "missing fragment id");
                continue;
            };
            let frag_tags = frags.sub_tag_def(id).and_then(|sub| cache.get(sub));
            for option in entry.children() {
                let global = parse_tags(tags, option.attr_or_empty("Tags"), &context, verbose);
                let local = match (frag_tags, option.attr("FragTags")) {
                    (Some(sub), Some(list)) => parse_tags(sub, list, &context, verbose),
                    _ => Some(TagState::EMPTY),
                };
                let (Some(global), Some(local)) = (global, local) else {
                    warn!(database = %context, fragment = %entry.tag(), "unknown tags, option skipped");
                    continue;
                };
                match super::fragment::read(option, false) {
                    Ok(fragment) => {
                        db.add_entry(id, FragTagState::new(global, local), fragment, cache);
                    }
                    Err(err) => {
                        warn!(database = %context, fragment = %entry.tag(), error = %err, "broken fragment entry");
                    }
                }
            }
        }
    }

    if let Some(list) = root.find_child("FragmentBlendList") {
        for entry in list.children() {
            load_blend_entry(db, entry, tags, frags, cache, &context, verbose);
        }
    }
    subs
}

fn load_sub_adb<S: ResourceSource + ?Sized>(
    db: &mut AnimationDatabase,
    entry: &XmlNode,
    filter: TagState,
    chain: &mut Vec<String>,
    source: &mut S,
) -> Option<SubAdb> {
    let file = normalize_path(entry.attr_or_empty("File"));
    if file.is_empty() {
        warn!(database = %db.filename(), "SubADB without File");
        return None;
    }
    if chain.iter().any(|f| same_path(f, &file)) {
        warn!(database = %db.filename(), sub_adb = %file, "SubADB includes itself, skipped");
        return None;
    }

    debug!(sub_adb = %file, "loading SubADB");
    let xml = match source.read_xml(&file) {
        Ok(xml) => xml,
        Err(err) => {
            warn!(database = %db.filename(), sub_adb = %file, error = %err, "could not load SubADB file");
            return None;
        }
    };
    let (sub_tag_def, sub_frag_def) = match definitions(&xml, &file, source) {
        Ok(ids) => ids,
        Err(err) => {
            warn!(database = %db.filename(), sub_adb = %file, error = %err, "could not resolve SubADB definitions");
            return None;
        }
    };

    let mut sub = SubAdb::new(file.as_str(), sub_tag_def, sub_frag_def);
    {
        let cache = source.tag_defs();
        let tags = cache.get(db.tag_def())?;
        let list = entry.attr_or_empty("Tags");
        let parsed = tags.tag_list_to_flags(list);
        if !list.is_empty() && !parsed.is_complete() {
            warn!(database = %db.filename(), sub_adb = %file, tags = %list, "unknown SubADB tags, skipped");
            return None;
        }
        sub.tags = tags.union(filter, parsed.state);
        sub.comparison_mask = tags.generate_mask(sub.tags);
        sub.known_tags = if sub_tag_def == db.tag_def() {
            TagState::FULL
        } else {
            cache
                .get(sub_tag_def)
                .map_or(TagState::EMPTY, |other| tags.shared_tags(other))
        };

        if let Some(sub_frags) = cache.get(sub_frag_def) {
            for fragment in entry.children_named("FragmentID") {
                let name = fragment.attr_or_empty("Name");
                if name.is_empty() {
                    continue;
                }
                match sub_frags.find(name) {
                    Some(id) => sub.frag_ids.push(id),
                    None => debug!(sub_adb = %file, fragment = %name, "unknown fragment in SubADB filter"),
                }
            }
        }
    }

    chain.push(file);
    sub.sub_adbs = load_data(db, &xml, sub.tags, true, chain, source);
    chain.pop();
    Some(sub)
}

/// `""` is "any fragment"; an unknown name is `Err`.
fn blend_fragment(frags: &TagDefinition, name: &str) -> Result<Option<FragmentId>, ()> {
    if name.is_empty() {
        return Ok(None);
    }
    frags.find(name).map(Some).ok_or(())
}

fn load_blend_entry(
    db: &mut AnimationDatabase,
    entry: &XmlNode,
    tags: &TagDefinition,
    frags: &TagDefinition,
    cache: &TagDefCache,
    context: &str,
    verbose: bool,
) {
    let from_name = entry.attr_or_empty("from");
    let to_name = entry.attr_or_empty("to");
    let (Ok(from), Ok(to)) = (blend_fragment(frags, from_name), blend_fragment(frags, to_name)) else {
        warn!(database = %context, from = %from_name, to = %to_name, "blend between unknown fragments skipped");
        return;
    };
    let key = FragmentBlendKey::new(from, to);
    let from_def = from.and_then(|id| frags.sub_tag_def(id)).and_then(|sub| cache.get(sub));
    let to_def = to.and_then(|id| frags.sub_tag_def(id)).and_then(|sub| cache.get(sub));

    for variant in entry.children() {
        let frag_tags = |def: Option<&TagDefinition>, attr: &str| match (def, variant.attr(attr)) {
            (Some(def), Some(list)) => parse_tags(def, list, context, verbose),
            _ => Some(TagState::EMPTY),
        };
        let states = (
            parse_tags(tags, variant.attr_or_empty("from"), context, verbose),
            frag_tags(from_def, "fromFrag"),
            parse_tags(tags, variant.attr_or_empty("to"), context, verbose),
            frag_tags(to_def, "toFrag"),
        );
        let (Some(from_global), Some(from_local), Some(to_global), Some(to_local)) = states else {
            warn!(database = %context, from = %from_name, to = %to_name, "unknown tags in blend variant skipped");
            continue;
        };
        let tags_from = FragTagState::new(from_global, from_local);
        let tags_to = FragTagState::new(to_global, to_local);

        for xml in variant.children() {
            match read_blend(xml) {
                Ok(blend) => {
                    db.add_blend(key, tags_from, tags_to, blend, cache);
                }
                Err(err) => {
                    warn!(database = %context, error = %err, "broken fragment entry for blend");
                }
            }
        }
    }
}

fn read_blend(xml: &XmlNode) -> Result<FragmentBlend, mannequin_xml::XmlError> {
    let fragment = if xml.child_count() != 0 {
        super::fragment::read(xml, true)?
    } else {
        Fragment::default()
    };
    let mut blend = FragmentBlend::new(fragment);
    blend.select_time = xml.parse_attr("selectTime")?.unwrap_or(0.0);
    blend.start_time = xml.parse_attr("startTime")?.unwrap_or(0.0);
    blend.enter_time = xml.parse_attr("enterTime")?.unwrap_or(0.0);
    let flags = TRANSITION_FLAGS.parse(xml.attr_or_empty("flags"));
    for flag in &flags.unknown {
        warn!(flag = %flag, "unknown transition flag");
    }
    blend.flags = flags.flags as u8;
    Ok(blend)
}

// =============================================================================
// Save
// =============================================================================

fn write_blend(blend: &FragmentBlend) -> XmlNode {
    let mut node = super::fragment::write(&blend.fragment, true);
    node.set_attr("selectTime", blend.select_time);
    if blend.start_time != 0.0 {
        node.set_attr("startTime", blend.start_time);
    }
    node.set_attr("enterTime", blend.enter_time);
    if blend.flags != 0 {
        node.set_attr("flags", TRANSITION_FLAGS.to_tag_list(u32::from(blend.flags)));
    }
    node
}

/// One document of the tree: `node`'s file.
///
/// Only data whose planned owner is this file is written, or everything when
/// `flatten` is set. Flattening a SubADB yields `None`.
pub fn save<'a>(
    ownership: &Ownership<'a>,
    db: &AnimationDatabase,
    node: SaveNode<'a>,
    plan: &SavePlan,
    cache: &TagDefCache,
    flatten: bool,
) -> Option<XmlNode> {
    if flatten && node.is_some() {
        return None;
    }
    let tags = cache.get(db.tag_def())?;
    let frags = cache.get(db.frag_def())?;
    let my_filename = ownership.node_filename(node);

    let (node_tag_def, node_frag_def) = match node {
        Some(sub) => (sub.tag_def, sub.frag_def),
        None => (db.tag_def(), db.frag_def()),
    };
    let mut root = XmlNode::new(ROOT_TAG);
    root.set_attr("FragDef", cache.get(node_frag_def)?.filename());
    root.set_attr("TagDef", cache.get(node_tag_def)?.filename());

    let children = match node {
        Some(sub) => sub.sub_adbs.as_slice(),
        None => db.sub_adbs(),
    };
    if !children.is_empty() {
        let list = root.create_child("SubADBs");
        for sub in children {
            let entry = list.create_child("SubADB");
            if !sub.tags.is_empty() {
                entry.set_attr("Tags", tags.flags_to_tag_list(sub.tags));
            }
            entry.set_attr("File", &sub.filename);
            let sub_frags = cache.get(sub.frag_def);
            for &id in &sub.frag_ids {
                if let Some(name) = sub_frags.and_then(|f| f.tag_name(id)) {
                    entry.create_child("FragmentID").set_attr("Name", name);
                }
            }
        }
    }

    let list = root.create_child("FragmentList");
    for (id, entry) in db.entries() {
        if !ownership.can_save_fragment_id(Some(id), node) {
            continue;
        }
        let Some(name) = frags.tag_name(id) else {
            continue;
        };
        let frag_tags = frags.sub_tag_def(id).and_then(|sub| cache.get(sub));
        let mut element: Option<XmlNode> = None;
        for (set, tag_set) in entry.tag_sets().iter().enumerate() {
            if !flatten && !plan.saves_fragment_to(id, set, my_filename) {
                continue;
            }
            let group = element.get_or_insert_with(|| XmlNode::new(name));
            for option in &tag_set.options {
                let mut xml = XmlNode::new("Fragment");
                super::fragment::write_into(&mut xml, option, false);
                xml.set_attr("Tags", tags.flags_to_tag_list(tag_set.tags.global_tags));
                if let Some(sub) = frag_tags
                    && !tag_set.tags.fragment_tags.is_empty()
                {
                    xml.set_attr("FragTags", sub.flags_to_tag_list(tag_set.tags.fragment_tags));
                }
                group.add_child(xml);
            }
        }
        if let Some(element) = element {
            list.add_child(element);
        }
    }

    let mut blend_list = XmlNode::new("FragmentBlendList");
    for (key, entry) in db.blends() {
        if !ownership.can_save_blend(*key, node) {
            continue;
        }
        let fragment_name = |id: Option<FragmentId>| {
            id.and_then(|id| frags.tag_name(id)).unwrap_or_default()
        };
        let sub_def = |id: Option<FragmentId>| {
            id.and_then(|id| frags.sub_tag_def(id)).and_then(|sub| cache.get(sub))
        };
        let (from_def, to_def) = (sub_def(key.from), sub_def(key.to));

        let mut xml_entry = XmlNode::new("Blend")
            .with_attr("from", fragment_name(key.from))
            .with_attr("to", fragment_name(key.to));
        for (index, variant) in entry.variants.iter().enumerate() {
            if !flatten && !plan.saves_blend_to(*key, index, my_filename) {
                continue;
            }
            let xml_variant = xml_entry.create_child("Variant");
            xml_variant.set_attr("from", tags.flags_to_tag_list(variant.tags_from.global_tags));
            xml_variant.set_attr("to", tags.flags_to_tag_list(variant.tags_to.global_tags));
            if let Some(def) = from_def
                && !variant.tags_from.fragment_tags.is_empty()
            {
                xml_variant.set_attr("fromFrag", def.flags_to_tag_list(variant.tags_from.fragment_tags));
            }
            if let Some(def) = to_def
                && !variant.tags_to.fragment_tags.is_empty()
            {
                xml_variant.set_attr("toFrag", def.flags_to_tag_list(variant.tags_to.fragment_tags));
            }
            for blend in &variant.blends {
                xml_variant.add_child(write_blend(blend));
            }
        }
        if xml_entry.child_count() > 0 {
            blend_list.add_child(xml_entry);
        }
    }
    if blend_list.child_count() > 0 {
        root.add_child(blend_list);
    }
    Some(root)
}

/// Every file of the tree with the data it owns, root first.
pub fn save_tree(db: &AnimationDatabase, cache: &TagDefCache) -> Option<Vec<(String, XmlNode)>> {
    let ownership = Ownership::new(db, cache)?;
    let plan = ownership.prepare_save();
    ownership
        .nodes()
        .into_iter()
        .map(|node| {
            let xml = save(&ownership, db, node, &plan, cache, false)?;
            Some((ownership.node_filename(node).to_string(), xml))
        })
        .collect()
}

/// The whole database as one document, SubADB declarations included.
pub fn save_flat(db: &AnimationDatabase, cache: &TagDefCache) -> Option<XmlNode> {
    let ownership = Ownership::new(db, cache)?;
    save(&ownership, db, None, &SavePlan::default(), cache, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::testing::MemorySource;
    use crate::fragment::AnimationEntry;

    const TAGS: &str = r#"<TagDefinition><Tag name="Crouch"/><Tag name="Armed"/><Tag name="Swim"/></TagDefinition>"#;
    const FRAGS: &str = r#"<TagDefinition><Tag name="Idle"/><Tag name="Move" subTagDef="move_tags.xml"/></TagDefinition>"#;
    const MOVE_TAGS: &str = r#"<TagDefinition><Tag name="Fast"/></TagDefinition>"#;

    const ROOT: &str = r#"
        <AnimDB FragDef="frags.xml" TagDef="tags.xml">
          <SubADBs>
            <SubADB Tags="Crouch" File="crouch.adb"/>
            <SubADB File="move.adb"><FragmentID Name="Move"/></SubADB>
            <SubADB Tags="Bogus" File="bogus.adb"/>
            <SubADB File="missing.adb"/>
          </SubADBs>
          <FragmentList>
            <Idle>
              <Fragment Tags=""><AnimLayer><Blend/><Animation name="idle"/></AnimLayer></Fragment>
              <Fragment Tags="Armed"><AnimLayer><Blend/><Animation name="idle_armed"/></AnimLayer></Fragment>
              <Fragment Tags="Unknown"><AnimLayer><Blend/><Animation name="nope"/></AnimLayer></Fragment>
            </Idle>
            <Jump><Fragment Tags=""/></Jump>
          </FragmentList>
          <FragmentBlendList>
            <Blend from="" to="">
              <Variant from="" to=""><Fragment selectTime="0" enterTime="0"/></Variant>
            </Blend>
            <Blend from="Idle" to="Nope">
              <Variant from="" to=""><Fragment/></Variant>
            </Blend>
          </FragmentBlendList>
        </AnimDB>"#;

    const CROUCH: &str = r#"
        <AnimDB FragDef="frags.xml" TagDef="tags.xml">
          <FragmentList>
            <Idle>
              <Fragment Tags="Crouch"><AnimLayer><Blend/><Animation name="crouch_idle"/></AnimLayer></Fragment>
            </Idle>
          </FragmentList>
          <FragmentBlendList>
            <Blend from="Idle" to="Move">
              <Variant from="Crouch" to="Crouch" toFrag="Fast">
                <Fragment selectTime="0.5" startTime="0.1" enterTime="0" flags="Cyclic">
                  <AnimLayer><Blend/><Animation name="crouch_start"/><Blend ExitTime="1"/></AnimLayer>
                </Fragment>
              </Variant>
            </Blend>
          </FragmentBlendList>
        </AnimDB>"#;

    const MOVE: &str = r#"
        <AnimDB FragDef="frags.xml" TagDef="tags.xml">
          <FragmentList>
            <Move>
              <Fragment Tags="" FragTags="Fast"><AnimLayer><Blend/><Animation name="run"/></AnimLayer></Fragment>
            </Move>
          </FragmentList>
        </AnimDB>"#;

    fn source() -> MemorySource {
        MemorySource::default()
            .with("tags.xml", TAGS)
            .with("frags.xml", FRAGS)
            .with("move_tags.xml", MOVE_TAGS)
            .with("root.adb", ROOT)
            .with("crouch.adb", CROUCH)
            .with("move.adb", MOVE)
            .with("bogus.adb", MOVE)
    }

    fn load_root(source: &mut MemorySource) -> AnimationDatabase {
        let xml = source.read_xml("root.adb").unwrap();
        load(&xml, "root.adb", source).unwrap()
    }

    fn anim_names(db: &AnimationDatabase) -> Vec<String> {
        let mut names: Vec<String> = db
            .entries()
            .flat_map(|(_, e)| e.tag_sets().iter())
            .flat_map(|s| s.options.iter())
            .flat_map(|f| f.animation_names().map(str::to_string).collect::<Vec<_>>())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn loads_data_from_the_whole_tree() {
        let mut source = source();
        let db = load_root(&mut source);

        let subs: Vec<&str> = db.sub_adbs().iter().map(|s| s.filename.as_str()).collect();
        assert_eq!(subs, vec!["crouch.adb", "move.adb"]);
        assert_eq!(db.sub_adbs()[0].known_tags, TagState::FULL);
        assert_eq!(db.sub_adbs()[1].frag_ids, vec![1]);

        assert_eq!(anim_names(&db), vec!["crouch_idle", "idle", "idle_armed", "run"]);
        assert_eq!(db.blend_count(), 2);

        let key = FragmentBlendKey::new(Some(0), Some(1));
        let variant = &db.blend_variants(key)[0];
        assert!(!variant.tags_to.fragment_tags.is_empty());
        let blend = &variant.blends[0];
        assert_eq!(blend.select_time, 0.5);
        assert_eq!(blend.flags, 1);
        assert_eq!(blend.fragment.anim_layers[0].len(), 2);
    }

    #[test]
    fn missing_definitions_fail_the_load() {
        let mut source = MemorySource::default().with("x.adb", r#"<AnimDB TagDef="tags.xml"/>"#);
        let xml = source.read_xml("x.adb").unwrap();
        assert!(matches!(
            load(&xml, "x.adb", &mut source),
            Err(LoadError::MissingAttribute { what: "FragDef", .. })
        ));
    }

    #[test]
    fn self_referencing_sub_adb_is_skipped() {
        let mut source = source().with(
            "loop.adb",
            r#"<AnimDB FragDef="frags.xml" TagDef="tags.xml"><SubADBs><SubADB File="LOOP.adb"/></SubADBs></AnimDB>"#,
        );
        let xml = source.read_xml("loop.adb").unwrap();
        let db = load(&xml, "loop.adb", &mut source).unwrap();
        assert!(db.sub_adbs().is_empty());
    }

    #[test]
    fn save_tree_splits_by_owner_and_reloads_equivalently() {
        let mut source = source();
        let db = load_root(&mut source);
        let docs = save_tree(&db, &source.tag_defs).unwrap();

        let names: Vec<&str> = docs.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["root.adb", "crouch.adb", "move.adb"]);

        let root_doc = &docs[0].1;
        assert_eq!(root_doc.find_child("SubADBs").unwrap().child_count(), 2);
        let root_idle = root_doc.find_child("FragmentList").unwrap().find_child("Idle").unwrap();
        assert_eq!(root_idle.child_count(), 2);
        // any-to-any stays at the root
        let root_blends = root_doc.find_child("FragmentBlendList").unwrap();
        assert_eq!(root_blends.child_count(), 1);
        assert_eq!(root_blends.child(0).unwrap().attr("from"), Some(""));

        let crouch_doc = &docs[1].1;
        assert!(crouch_doc.find_child("SubADBs").is_none());
        let variant = crouch_doc
            .find_child("FragmentBlendList")
            .unwrap()
            .child(0)
            .unwrap()
            .child(0)
            .unwrap();
        assert_eq!(variant.attr("toFrag"), Some("Fast"));
        assert_eq!(variant.attr("fromFrag"), None);

        let mut reread = MemorySource::default()
            .with("tags.xml", TAGS)
            .with("frags.xml", FRAGS)
            .with("move_tags.xml", MOVE_TAGS);
        for (name, doc) in &docs {
            reread.insert(name, &doc.to_xml_string());
        }
        let again = load_root(&mut reread);
        assert_eq!(anim_names(&again), anim_names(&db));
        assert_eq!(again.blend_count(), db.blend_count());
        assert_eq!(again.sub_adbs().len(), db.sub_adbs().len());
    }

    #[test]
    fn flatten_writes_everything_into_the_root() {
        let mut source = source();
        let mut db = load_root(&mut source);
        db.add_entry(
            0,
            FragTagState::global(source.tag_defs.get(db.tag_def()).unwrap().tag_list_to_flags("Swim").state),
            Fragment::single("swim_idle"),
            &source.tag_defs,
        );

        let flat = save_flat(&db, &source.tag_defs).unwrap();
        let idle = flat.find_child("FragmentList").unwrap().find_child("Idle").unwrap();
        assert_eq!(idle.child_count(), 4);
        assert_eq!(flat.find_child("FragmentBlendList").unwrap().child_count(), 2);

        let ownership = Ownership::new(&db, &source.tag_defs).unwrap();
        let sub = Some(&db.sub_adbs()[0]);
        assert!(save(&ownership, &db, sub, &SavePlan::default(), &source.tag_defs, true).is_none());
    }

    #[test]
    fn blend_without_payload_gets_an_empty_fragment() {
        let xml = XmlNode::new("Fragment").with_attr("selectTime", "0.25");
        let blend = read_blend(&xml).unwrap();
        assert_eq!(blend.select_time, 0.25);
        assert!(blend.fragment.is_empty());

        let written = write_blend(&FragmentBlend::new(Fragment {
            anim_layers: vec![vec![crate::fragment::AnimClip {
                animation: AnimationEntry::named("a"),
                ..Default::default()
            }]],
            ..Fragment::default()
        }));
        assert_eq!(written.attr("startTime"), None);
        assert_eq!(written.attr("flags"), None);
    }
}
