//! Controller-definition documents.
//!
//! ```xml
//! <ControllerDef>
//!   <Tags filename="Animations/Mannequin/ADB/PlayerTags.xml"/>
//!   <Fragments filename="Animations/Mannequin/ADB/PlayerFragmentIds.xml"/>
//!   <SubContexts>
//!     <Weapon tags="Armed" scopes="FullBody"/>
//!   </SubContexts>
//!   <FragmentDefs>
//!     <Idle scopes="FullBody" flags="Persistent">
//!       <Override tags="Crouch" scopes="FullBody+Upper"/>
//!     </Idle>
//!   </FragmentDefs>
//!   <ScopeContextDefs>
//!     <Char3P tags="Armed"/>
//!   </ScopeContextDefs>
//!   <ScopeDefs>
//!     <FullBody layer="0" numLayers="3" context="Char3P"/>
//!     <Upper layer="3" numLayers="2" context="Char3P" scopeAlias="Torso"/>
//!   </ScopeDefs>
//! </ControllerDef>
//! ```
//!
//! Element names under the list nodes are the names of fragments, scopes,
//! contexts and sub-contexts.

use mannequin_xml::XmlNode;
use tracing::warn;

use super::{ResourceSource, expect_root, parse_tags, parse_tags_lenient};
use crate::controller_def::{
    ACTION_SCOPES_NONE, ControllerDef, FragmentDef, ScopeContextDef, ScopeDef, SubContext,
};
use crate::database::TagDefCache;
use crate::error::LoadError;
use crate::fragment::FRAGMENT_DEF_FLAGS;
use crate::hash::normalize_path;
use crate::tag_definition::{FragTagState, TagDefinition, TagState};

pub const ROOT_TAG: &str = "ControllerDef";

fn referenced_file<'a>(
    root: &'a XmlNode,
    element: &'static str,
    filename: &str,
) -> Result<&'a str, LoadError> {
    root.find_child(element)
        .and_then(|node| node.attr("filename"))
        .filter(|f| !f.is_empty())
        .ok_or_else(|| LoadError::MissingAttribute {
            filename: filename.to_string(),
            what: element,
        })
}

fn load_vocabulary<S: ResourceSource + ?Sized>(
    source: &mut S,
    referenced: &str,
    filename: &str,
) -> Result<crate::cache::TagDefId, LoadError> {
    let referenced = normalize_path(referenced);
    source.load_tag_def(&referenced).map_err(|err| {
        warn!(controller_def = %filename, tag_def = %referenced, error = %err, "failed to load vocabulary");
        LoadError::MissingDefinition {
            filename: filename.to_string(),
            referenced,
        }
    })
}

/// Build a [`ControllerDef`] from its document, loading the referenced
/// vocabularies through `source`.
pub fn load<S: ResourceSource + ?Sized>(
    root: &XmlNode,
    filename: &str,
    source: &mut S,
) -> Result<ControllerDef, LoadError> {
    expect_root(root, ROOT_TAG, filename)?;
    let filename = normalize_path(filename);

    let tags_file = referenced_file(root, "Tags", &filename)?;
    let frags_file = referenced_file(root, "Fragments", &filename)?;
    let tags_id = load_vocabulary(source, tags_file, &filename)?;
    let frags_id = load_vocabulary(source, frags_file, &filename)?;

    let verbose = source.log_unknown_tags();
    let cache = source.tag_defs();
    let (Some(tags), Some(frags)) = (cache.get(tags_id), cache.get(frags_id)) else {
        return Err(LoadError::NotLoaded(filename));
    };

    let mut def = ControllerDef::new(filename.as_str(), tags_id, frags_id, frags.len());

    // Scope ids come first: every other list refers to them.
    let scope_list = root.find_child("ScopeDefs");
    if let Some(list) = scope_list {
        for scope in list.children() {
            if def.scope_ids.add_tag(scope.tag(), None, 0).is_none() {
                warn!(controller_def = %filename, scope = %scope.tag(), "duplicate scope");
            }
        }
        def.scope_ids.assign_bits();
    }
    def.scope_defs = vec![ScopeDef::default(); def.scope_ids.len()];

    load_sub_contexts(root, &mut def, tags, &filename, verbose);
    load_fragment_defs(root, &mut def, tags, frags, cache, &filename, verbose);
    load_scope_context_defs(root, &mut def, tags, &filename, verbose);
    if let Some(list) = scope_list {
        load_scope_defs(list, &mut def, tags, &filename, verbose)?;
    }

    def.scope_contexts.assign_bits();
    def.sub_context_ids.assign_bits();
    Ok(def)
}

fn scopes_attr(def: &ControllerDef, node: &XmlNode, filename: &str) -> Option<u64> {
    let (scopes, unknown) = def.parse_scopes(node.attr_or_empty("scopes"));
    for scope in &unknown {
        warn!(controller_def = %filename, element = %node.tag(), scope = %scope, "unknown scope");
    }
    unknown.is_empty().then_some(scopes)
}

fn load_sub_contexts(
    root: &XmlNode,
    def: &mut ControllerDef,
    tags: &TagDefinition,
    filename: &str,
    verbose: bool,
) {
    let Some(list) = root.find_child("SubContexts") else {
        return;
    };
    for node in list.children() {
        if def.sub_context_ids.add_tag(node.tag(), None, 0).is_none() {
            warn!(controller_def = %filename, sub_context = %node.tag(), "duplicate sub context");
            continue;
        }
        let additional_tags = parse_tags_lenient(tags, node.attr_or_empty("tags"), filename, verbose);
        let scopes = scopes_attr(def, node, filename).unwrap_or(ACTION_SCOPES_NONE);
        def.sub_contexts.push(SubContext {
            scopes,
            additional_tags,
        });
    }
}

fn load_fragment_defs(
    root: &XmlNode,
    def: &mut ControllerDef,
    tags: &TagDefinition,
    frags: &TagDefinition,
    cache: &TagDefCache,
    filename: &str,
    verbose: bool,
) {
    let Some(list) = root.find_child("FragmentDefs") else {
        return;
    };
    let mut loaded = vec![false; frags.len()];
    for node in list.children() {
        let Some(id) = frags.find(node.tag()) else {
            warn!(controller_def = %filename, fragment = %node.tag(), "skipping unknown fragment");
            continue;
        };
        if std::mem::replace(&mut loaded[id], true) {
            warn!(controller_def = %filename, fragment = %node.tag(), "skipping duplicate fragment");
            continue;
        }

        let default_scopes = scopes_attr(def, node, filename).unwrap_or(ACTION_SCOPES_NONE);
        let flags = FRAGMENT_DEF_FLAGS.parse(node.attr_or_empty("flags"));
        for flag in &flags.unknown {
            warn!(controller_def = %filename, fragment = %node.tag(), flag = %flag, "unknown fragment flag");
        }
        let frag_tags = frags.sub_tag_def(id).and_then(|sub| cache.get(sub));

        let mut overrides = Vec::new();
        for over in node.children() {
            let global = parse_tags(tags, over.attr_or_empty("tags"), filename, verbose);
            let local = match (frag_tags, over.attr("fragTags")) {
                (Some(sub), Some(list)) => parse_tags(sub, list, filename, verbose),
                _ => Some(TagState::EMPTY),
            };
            let scopes = scopes_attr(def, over, filename);
            if let (Some(global), Some(local), Some(scopes)) = (global, local, scopes) {
                overrides.push((FragTagState::new(global, local), scopes));
            }
        }

        let fragment_def = &mut def.fragment_defs[id];
        fragment_def.flags = flags.flags as u8;
        fragment_def.scope_masks.set_default(default_scopes);
        for (state, scopes) in overrides {
            fragment_def.scope_masks.insert(state, scopes);
        }
        fragment_def.scope_masks.sort(tags, frag_tags);
    }
}

fn load_scope_context_defs(
    root: &XmlNode,
    def: &mut ControllerDef,
    tags: &TagDefinition,
    filename: &str,
    verbose: bool,
) {
    let Some(list) = root.find_child("ScopeContextDefs") else {
        return;
    };
    for node in list.children() {
        if def.scope_contexts.add_tag(node.tag(), None, 0).is_none() {
            warn!(controller_def = %filename, context = %node.tag(), "duplicate scope context");
            continue;
        }
        let mut context = ScopeContextDef::default();
        if let Some(list) = node.attr("tags") {
            context.additional_tags = parse_tags_lenient(tags, list, filename, verbose);
        }
        if let Some(list) = node.attr("sharedTags") {
            context.shared_tags = parse_tags_lenient(tags, list, filename, verbose);
        }
        def.scope_context_defs.push(context);
    }
}

fn load_scope_defs(
    list: &XmlNode,
    def: &mut ControllerDef,
    tags: &TagDefinition,
    filename: &str,
    verbose: bool,
) -> Result<(), LoadError> {
    let mut loaded = vec![false; def.scope_ids.len()];
    for node in list.children() {
        let Some(id) = def.scope_ids.find(node.tag()) else {
            warn!(controller_def = %filename, scope = %node.tag(), "skipping unknown scope");
            continue;
        };
        if std::mem::replace(&mut loaded[id], true) {
            warn!(controller_def = %filename, scope = %node.tag(), "skipping duplicate scope");
            continue;
        }

        let context_name = node.attr_or_empty("context");
        let context = match def.scope_contexts.find(context_name) {
            Some(context) => context,
            None => {
                let added = def.scope_contexts.add_tag(context_name, None, 0);
                def.scope_context_defs.push(ScopeContextDef::default());
                added.unwrap_or(def.scope_context_defs.len() - 1)
            }
        };

        let alias = node.attr_or_empty("scopeAlias");
        let scope = &mut def.scope_defs[id];
        scope.layer = node.parse_attr("layer")?.unwrap_or(0);
        scope.num_layers = node.parse_attr("numLayers")?.unwrap_or(0);
        scope.scope_alias = if alias.is_empty() {
            node.tag().to_string()
        } else {
            alias.to_string()
        };
        scope.additional_tags = parse_tags_lenient(tags, node.attr_or_empty("Tags"), filename, verbose);
        scope.context = context;
    }
    Ok(())
}

// =============================================================================
// Save
// =============================================================================

/// Write `def` using its resolved vocabularies.
pub fn save(
    def: &ControllerDef,
    tags: &TagDefinition,
    frags: &TagDefinition,
    cache: &TagDefCache,
) -> XmlNode {
    let mut root = XmlNode::new(ROOT_TAG);
    root.create_child("Tags").set_attr("filename", tags.filename());
    root.create_child("Fragments").set_attr("filename", frags.filename());

    if !def.sub_context_ids.is_empty() {
        let list = root.create_child("SubContexts");
        for (i, sub) in def.sub_contexts.iter().enumerate() {
            let Some(name) = def.sub_context_ids.tag_name(i) else {
                continue;
            };
            let node = list.create_child(name);
            if sub.scopes != ACTION_SCOPES_NONE {
                node.set_attr("scopes", def.scopes_to_list(sub.scopes));
            }
            if !sub.additional_tags.is_empty() {
                node.set_attr("tags", tags.flags_to_tag_list(sub.additional_tags));
            }
        }
    }

    // Untouched definitions are left out; an unlisted fragment loads with
    // every scope.
    let list = root.create_child("FragmentDefs");
    for (id, fragment_def) in def.fragment_defs.iter().enumerate() {
        let Some(name) = frags.tag_name(id) else {
            continue;
        };
        if *fragment_def == FragmentDef::default() {
            continue;
        }
        let frag_tags = frags.sub_tag_def(id).and_then(|sub| cache.get(sub));
        let node = list.create_child(name);
        let default_scopes = fragment_def.scope_masks.default_scopes();
        if default_scopes != ACTION_SCOPES_NONE {
            node.set_attr("scopes", def.scopes_to_list(default_scopes));
        }
        if fragment_def.flags != 0 {
            node.set_attr("flags", FRAGMENT_DEF_FLAGS.to_tag_list(u32::from(fragment_def.flags)));
        }
        for (state, scopes) in fragment_def.scope_masks.overrides() {
            let over = node.create_child("Override");
            over.set_attr("tags", tags.flags_to_tag_list(state.global_tags));
            if let Some(sub) = frag_tags
                && !state.fragment_tags.is_empty()
            {
                over.set_attr("fragTags", sub.flags_to_tag_list(state.fragment_tags));
            }
            over.set_attr("scopes", def.scopes_to_list(*scopes));
        }
    }

    let list = root.create_child("ScopeContextDefs");
    for (i, context) in def.scope_context_defs.iter().enumerate() {
        let Some(name) = def.scope_contexts.tag_name(i) else {
            continue;
        };
        let node = list.create_child(name);
        if !context.additional_tags.is_empty() {
            node.set_attr("tags", tags.flags_to_tag_list(context.additional_tags));
        }
        if context.shared_tags != TagState::FULL {
            node.set_attr("sharedTags", tags.flags_to_tag_list(context.shared_tags));
        }
    }

    let list = root.create_child("ScopeDefs");
    for (i, scope) in def.scope_defs.iter().enumerate() {
        let Some(name) = def.scope_ids.tag_name(i) else {
            continue;
        };
        let node = list.create_child(name);
        node.set_attr("layer", scope.layer);
        node.set_attr("numLayers", scope.num_layers);
        if scope.scope_alias != name {
            node.set_attr("scopeAlias", &scope.scope_alias);
        }
        node.set_attr("context", def.scope_contexts.tag_name(scope.context).unwrap_or_default());
        if !scope.additional_tags.is_empty() {
            node.set_attr("Tags", tags.flags_to_tag_list(scope.additional_tags));
        }
    }
    root
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::testing::MemorySource;
    use crate::controller_def::ACTION_SCOPES_ALL;

    const DEF: &str = r#"
        <ControllerDef>
          <Tags filename="tags.xml"/>
          <Fragments filename="frags.xml"/>
          <SubContexts>
            <Weapon tags="Armed" scopes="Upper"/>
          </SubContexts>
          <FragmentDefs>
            <Idle scopes="FullBody" flags="Persistent">
              <Override tags="Crouch" scopes="FullBody+Upper"/>
              <Override tags="Bogus" scopes="Upper"/>
              <Override tags="Armed" fragTags="Fast" scopes="Upper"/>
            </Idle>
            <Idle scopes="Upper"/>
            <Nope scopes="Upper"/>
          </FragmentDefs>
          <ScopeContextDefs>
            <Char3P tags="Armed"/>
            <Char3P/>
          </ScopeContextDefs>
          <ScopeDefs>
            <FullBody layer="0" numLayers="3" context="Char3P"/>
            <Upper layer="3" numLayers="2" context="Weapon" scopeAlias="Torso" Tags="Armed"/>
          </ScopeDefs>
        </ControllerDef>"#;

    fn source() -> MemorySource {
        MemorySource::default()
            .with(
                "tags.xml",
                r#"<TagDefinition><Tag name="Crouch"/><Tag name="Armed"/></TagDefinition>"#,
            )
            .with(
                "frags.xml",
                r#"<TagDefinition><Tag name="Idle" subTagDef="idle_tags.xml"/><Tag name="Move"/></TagDefinition>"#,
            )
            .with("idle_tags.xml", r#"<TagDefinition><Tag name="Fast"/></TagDefinition>"#)
            .with("def.xml", DEF)
    }

    fn loaded() -> (ControllerDef, MemorySource) {
        let mut source = source();
        let root = source.read_xml("def.xml").unwrap();
        let def = load(&root, "def.xml", &mut source).unwrap();
        (def, source)
    }

    #[test]
    fn loads_every_section() {
        let (def, source) = loaded();
        let tags = source.tag_defs.get(def.tags()).unwrap();

        assert_eq!(def.fragment_defs.len(), 2);
        assert_eq!(def.scope_ids.len(), 2);
        assert_eq!(def.sub_contexts.len(), 1);
        assert_eq!(def.sub_contexts[0].scopes, 0b10);

        let idle = &def.fragment_defs[0];
        assert_eq!(idle.flags, 1);
        assert_eq!(idle.scope_masks.default_scopes(), 0b01);
        // the override naming an unknown tag is dropped
        assert_eq!(idle.scope_masks.overrides().len(), 2);

        // unlisted fragments keep every scope
        assert_eq!(def.fragment_defs[1].scope_masks.default_scopes(), ACTION_SCOPES_ALL);

        assert_eq!(def.scope_defs[0].scope_alias, "FullBody");
        assert_eq!(def.scope_defs[1].scope_alias, "Torso");
        assert_eq!(def.scope_defs[1].num_layers, 2);
        assert_eq!(tags.flags_to_tag_list(def.scope_defs[1].additional_tags), "Armed");

        // "Weapon" is not a declared context and is appended on demand
        assert_eq!(def.scope_contexts.len(), 2);
        assert_eq!(def.scope_context_defs.len(), 2);
        assert_eq!(def.scope_contexts.tag_name(def.scope_defs[1].context), Some("Weapon"));
    }

    #[test]
    fn scope_mask_uses_most_specific_override() {
        let (def, source) = loaded();
        let tags = source.tag_defs.get(def.tags()).unwrap();
        let crouched = FragTagState::global(tags.tag_list_to_flags("Crouch").state);

        assert_eq!(def.scope_mask(0, &crouched, None, &source.tag_defs), 0b11);
        assert_eq!(def.scope_mask(0, &FragTagState::EMPTY, None, &source.tag_defs), 0b01);
        assert_eq!(def.scope_mask(0, &FragTagState::EMPTY, Some(0), &source.tag_defs), 0b11);
    }

    #[test]
    fn missing_vocabulary_fails() {
        let mut source = MemorySource::default().with(
            "def.xml",
            r#"<ControllerDef><Tags filename="tags.xml"/></ControllerDef>"#,
        );
        let root = source.read_xml("def.xml").unwrap();
        assert!(matches!(
            load(&root, "def.xml", &mut source),
            Err(LoadError::MissingAttribute { what: "Fragments", .. })
        ));

        let mut source = MemorySource::default().with(
            "def.xml",
            r#"<ControllerDef><Tags filename="tags.xml"/><Fragments filename="frags.xml"/></ControllerDef>"#,
        );
        let root = source.read_xml("def.xml").unwrap();
        assert!(matches!(
            load(&root, "def.xml", &mut source),
            Err(LoadError::MissingDefinition { .. })
        ));
    }

    #[test]
    fn saved_document_loads_back_identically() {
        let (def, mut source) = loaded();
        let tags = source.tag_defs.get(def.tags()).unwrap();
        let frags = source.tag_defs.get(def.fragment_ids()).unwrap();
        let xml = save(&def, tags, frags, &source.tag_defs);

        let scope_defs = xml.find_child("ScopeDefs").unwrap();
        assert_eq!(scope_defs.child(0).unwrap().attr("scopeAlias"), None);
        assert_eq!(scope_defs.child(1).unwrap().attr("scopeAlias"), Some("Torso"));
        let contexts = xml.find_child("ScopeContextDefs").unwrap();
        assert_eq!(contexts.child(0).unwrap().attr("sharedTags"), None);
        let idle = xml.find_child("FragmentDefs").unwrap().child(0).unwrap();
        assert_eq!(idle.children_named("Override").count(), 2);

        source.insert("def2.xml", &xml.to_xml_string());
        let root = source.read_xml("def2.xml").unwrap();
        let reloaded = load(&root, "def2.xml", &mut source).unwrap();
        assert_eq!(reloaded.fragment_defs, def.fragment_defs);
        assert_eq!(reloaded.scope_defs, def.scope_defs);
        assert_eq!(reloaded.scope_context_defs, def.scope_context_defs);
        assert_eq!(reloaded.sub_contexts, def.sub_contexts);
    }
}
