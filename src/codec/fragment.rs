//! Fragment payload elements.
//!
//! ```xml
//! <Fragment BlendOutDuration="0.2">
//!   <AnimLayer>
//!     <Blend ExitTime="0" StartTime="0" Duration="0.2" CurveType="0"/>
//!     <Animation name="idle" flags="Loop" speed="1.5"/>
//!   </AnimLayer>
//!   <ProcLayer>
//!     <Blend .../>
//!     <Procedural type="PlaySound"><ProceduralParams .../></Procedural>
//!   </ProcLayer>
//! </Fragment>
//! ```
//!
//! In a transition the last `Blend` of each layer has no clip after it.

use mannequin_xml::{XmlError, XmlNode};
use tracing::warn;

use crate::fragment::{
    ANIM_FLAGS, AnimBlend, AnimClip, AnimationEntry, Fragment, NUM_BLEND_CHANNELS, ProceduralEntry,
};

const ANIM_LAYER: &str = "AnimLayer";
const PROC_LAYER: &str = "ProcLayer";
const BLEND: &str = "Blend";
const ANIMATION: &str = "Animation";
const PROCEDURAL: &str = "Procedural";
const PROCEDURAL_PARAMS: &str = "ProceduralParams";

fn channel_name(index: usize) -> String {
    format!("channel{index}")
}

// =============================================================================
// Write
// =============================================================================

fn write_blend(blend: &AnimBlend) -> XmlNode {
    let mut node = XmlNode::new(BLEND);
    node.set_attr("ExitTime", blend.exit_time);
    node.set_attr("StartTime", blend.start_time);
    node.set_attr("Duration", blend.duration);
    if blend.flags != 0 {
        node.set_attr("flags", ANIM_FLAGS.to_tag_list(blend.flags));
    }
    node.set_attr("CurveType", blend.curve_type);
    if blend.terminal {
        node.set_attr("terminal", true);
    }
    node
}

fn write_animation(entry: &AnimationEntry) -> XmlNode {
    let mut node = XmlNode::new(ANIMATION);
    node.set_attr("name", &entry.anim_ref);
    if entry.flags != 0 {
        node.set_attr("flags", ANIM_FLAGS.to_tag_list(entry.flags));
    }
    if entry.playback_speed != 1.0 {
        node.set_attr("speed", entry.playback_speed);
    }
    if entry.playback_weight != 1.0 {
        node.set_attr("weight", entry.playback_weight);
    }
    if entry.weight_list != 0 {
        node.set_attr("weightList", entry.weight_list);
    }
    for (i, value) in entry.blend_channels.iter().enumerate() {
        if *value != 0.0 {
            node.set_attr(&channel_name(i), value);
        }
    }
    node
}

fn write_procedural(entry: &ProceduralEntry) -> XmlNode {
    let mut node = XmlNode::new(PROCEDURAL);
    node.set_attr("type", &entry.type_name);
    if !entry.is_none_type()
        && let Some(params) = &entry.params
    {
        let mut params = params.clone();
        if !params.is(PROCEDURAL_PARAMS) {
            params = XmlNode::new(PROCEDURAL_PARAMS).with_child(params);
        }
        node.add_child(params);
    }
    node
}

/// Write the layers of `fragment` into `out`, which keeps its tag and any
/// attributes already set.
pub fn write_into(out: &mut XmlNode, fragment: &Fragment, transition: bool) {
    for layer in &fragment.anim_layers {
        let xml_layer = out.create_child(ANIM_LAYER);
        for (c, clip) in layer.iter().enumerate() {
            xml_layer.add_child(write_blend(&clip.blend));
            let blend_only = transition && c + 1 == layer.len();
            if !blend_only {
                xml_layer.add_child(write_animation(&clip.animation));
            }
        }
    }
    for layer in &fragment.proc_layers {
        let xml_layer = out.create_child(PROC_LAYER);
        for (c, clip) in layer.iter().enumerate() {
            xml_layer.add_child(write_blend(&clip.blend));
            let blend_only = transition && c + 1 == layer.len();
            if !blend_only {
                xml_layer.add_child(write_procedural(clip));
            }
        }
    }
    out.set_attr("BlendOutDuration", fragment.blend_out_duration);
}

/// A standalone `<Fragment>` element.
pub fn write(fragment: &Fragment, transition: bool) -> XmlNode {
    let mut node = XmlNode::new("Fragment");
    write_into(&mut node, fragment, transition);
    node
}

// =============================================================================
// Read
// =============================================================================

fn read_blend(node: &XmlNode, blend: &mut AnimBlend) -> Result<(), XmlError> {
    if let Some(v) = node.parse_attr("ExitTime")? {
        blend.exit_time = v;
    }
    if let Some(v) = node.parse_attr("StartTime")? {
        blend.start_time = v;
    }
    if let Some(v) = node.parse_attr("Duration")? {
        blend.duration = v;
    }
    blend.flags = read_anim_flags(node);
    if let Some(v) = node.parse_attr("CurveType")? {
        blend.curve_type = v;
    }
    if let Some(v) = node.bool_attr("terminal")? {
        blend.terminal = v;
    }
    Ok(())
}

fn read_anim_flags(node: &XmlNode) -> u32 {
    let parsed = ANIM_FLAGS.parse(node.attr_or_empty("flags"));
    for flag in &parsed.unknown {
        warn!(element = %node.tag(), flag = %flag, "unknown animation flag");
    }
    parsed.flags
}

fn read_animation(node: &XmlNode) -> Result<AnimationEntry, XmlError> {
    let mut entry = AnimationEntry::named(node.attr_or_empty("name"));
    entry.flags = read_anim_flags(node);
    if let Some(v) = node.parse_attr("speed")? {
        entry.playback_speed = v;
    }
    if let Some(v) = node.parse_attr("weight")? {
        entry.playback_weight = v;
    }
    if let Some(v) = node.parse_attr("weightList")? {
        entry.weight_list = v;
    }
    for i in 0..NUM_BLEND_CHANNELS {
        if let Some(v) = node.parse_attr(&channel_name(i))? {
            entry.blend_channels[i] = v;
        }
    }
    Ok(entry)
}

fn read_procedural(node: &XmlNode, entry: &mut ProceduralEntry) {
    entry.type_name = node.attr_or_empty("type").to_string();
    if entry.is_none_type() {
        entry.params = None;
        return;
    }
    entry.params = node.find_child(PROCEDURAL_PARAMS).cloned();
    if entry.params.is_none() {
        warn!(clip_type = %entry.type_name, "procedural clip without ProceduralParams");
    }
}

/// Number of clips a layer holds: one per clip element, plus the trailing
/// blend-only clip of a transition.
fn clip_count(layer: &XmlNode, clip_tag: &str, transition: bool) -> usize {
    let clips = layer.children().iter().filter(|c| c.is(clip_tag)).count();
    clips + usize::from(transition)
}

/// Parse the layers below `root`.
///
/// Only `AnimLayer` and `ProcLayer` children are accepted.
pub fn read(root: &XmlNode, transition: bool) -> Result<Fragment, XmlError> {
    let mut fragment = Fragment::default();
    if let Some(v) = root.parse_attr("BlendOutDuration")? {
        fragment.blend_out_duration = v;
    }

    if let Some(other) = root
        .children()
        .iter()
        .find(|c| !c.is(ANIM_LAYER) && !c.is(PROC_LAYER))
    {
        return Err(XmlError::Malformed(format!(
            "unexpected <{}> in <{}>",
            other.tag(),
            root.tag()
        )));
    }

    for layer in root.children() {
        if layer.is(ANIM_LAYER) {
            let mut sequence = vec![AnimClip::default(); clip_count(layer, ANIMATION, transition)];
            let mut clip = 0;
            for child in layer.children() {
                let Some(slot) = sequence.get_mut(clip) else {
                    break;
                };
                if child.is(BLEND) {
                    read_blend(child, &mut slot.blend)?;
                } else if child.is(ANIMATION) {
                    slot.animation = read_animation(child)?;
                    clip += 1;
                }
            }
            fragment.anim_layers.push(sequence);
        } else {
            let mut sequence =
                vec![ProceduralEntry::default(); clip_count(layer, PROCEDURAL, transition)];
            let mut clip = 0;
            for child in layer.children() {
                let Some(slot) = sequence.get_mut(clip) else {
                    break;
                };
                if child.is(BLEND) {
                    read_blend(child, &mut slot.blend)?;
                } else if child.is(PROCEDURAL) {
                    read_procedural(child, slot);
                    clip += 1;
                }
            }
            fragment.proc_layers.push(sequence);
        }
    }
    Ok(fragment)
}
