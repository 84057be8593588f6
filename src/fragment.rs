//! Fragment payloads: layered clip sequences and blend records.

use std::sync::atomic::{AtomicU64, Ordering};

use mannequin_xml::XmlNode;

pub const NUM_BLEND_CHANNELS: usize = 4;

// =============================================================================
// Flag vocabularies
// =============================================================================

/// Fixed list of flag names; name `i` is bit `1 << i`.
#[derive(Clone, Copy, Debug)]
pub struct FlagVocabulary {
    names: &'static [&'static str],
}

/// Flags of a flag list together with the names that were not recognised.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParsedFlags {
    pub flags: u32,
    pub unknown: Vec<String>,
}

impl FlagVocabulary {
    pub const fn new(names: &'static [&'static str]) -> Self {
        Self { names }
    }

    #[inline]
    pub fn names(&self) -> &'static [&'static str] {
        self.names
    }

    pub fn find(&self, name: &str) -> Option<u32> {
        self.names
            .iter()
            .position(|n| n.eq_ignore_ascii_case(name))
            .map(|i| 1u32 << i)
    }

    pub fn to_tag_list(&self, flags: u32) -> String {
        self.names
            .iter()
            .enumerate()
            .filter(|(i, _)| flags & (1u32 << i) != 0)
            .map(|(_, name)| *name)
            .collect::<Vec<_>>()
            .join("+")
    }

    pub fn parse(&self, list: &str) -> ParsedFlags {
        let mut parsed = ParsedFlags::default();
        for token in list
            .split(|c: char| c == '+' || c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty())
        {
            match self.find(token) {
                Some(bit) => parsed.flags |= bit,
                None => parsed.unknown.push(token.to_string()),
            }
        }
        parsed
    }
}

pub static ANIM_FLAGS: FlagVocabulary = FlagVocabulary::new(&[
    "ManualUpdate",
    "Loop",
    "RepeatLast",
    "TimeWarping",
    "StartAtKeyTime",
    "StartAfter",
    "Idle2Move",
    "Move2Idle",
    "AllowRestart",
    "Sample30Hz",
    "DisableMultilayer",
    "ForceSkelUpdate",
    "TrackView",
    "RemoveFromFIFO",
    "FullRootPriority",
    "ForceTransitionToAnim",
]);

pub static TRANSITION_FLAGS: FlagVocabulary =
    FlagVocabulary::new(&["Cyclic", "CycleLocked", "Outro"]);

pub static FRAGMENT_DEF_FLAGS: FlagVocabulary =
    FlagVocabulary::new(&["Persistent", "AutoReinstall"]);

// =============================================================================
// Clips
// =============================================================================

/// How a clip blends in.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnimBlend {
    pub exit_time: f32,
    pub start_time: f32,
    pub duration: f32,
    pub flags: u32,
    pub curve_type: i32,
    pub terminal: bool,
}

impl Default for AnimBlend {
    fn default() -> Self {
        Self {
            exit_time: 0.0,
            start_time: 0.0,
            duration: 0.2,
            flags: 0,
            curve_type: 0,
            terminal: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AnimationEntry {
    pub anim_ref: String,
    pub flags: u32,
    pub playback_speed: f32,
    pub playback_weight: f32,
    pub weight_list: u8,
    pub blend_channels: [f32; NUM_BLEND_CHANNELS],
}

impl Default for AnimationEntry {
    fn default() -> Self {
        Self {
            anim_ref: String::new(),
            flags: 0,
            playback_speed: 1.0,
            playback_weight: 1.0,
            weight_list: 0,
            blend_channels: [0.0; NUM_BLEND_CHANNELS],
        }
    }
}

impl AnimationEntry {
    pub fn named(anim_ref: impl Into<String>) -> Self {
        Self {
            anim_ref: anim_ref.into(),
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AnimClip {
    pub blend: AnimBlend,
    pub animation: AnimationEntry,
}

/// A procedural clip. Parameters are kept as the raw `ProceduralParams`
/// element; interpreting them is up to the host.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProceduralEntry {
    pub blend: AnimBlend,
    pub type_name: String,
    pub params: Option<XmlNode>,
}

impl ProceduralEntry {
    #[inline]
    pub fn is_none_type(&self) -> bool {
        self.type_name.is_empty()
    }
}

// =============================================================================
// Fragment
// =============================================================================

/// Layered clip data for one fragment option or blend.
///
/// In a transition the last clip of each layer carries only its blend.
#[derive(Clone, Debug, PartialEq)]
pub struct Fragment {
    pub blend_out_duration: f32,
    pub anim_layers: Vec<Vec<AnimClip>>,
    pub proc_layers: Vec<Vec<ProceduralEntry>>,
}

impl Default for Fragment {
    fn default() -> Self {
        Self {
            blend_out_duration: 0.2,
            anim_layers: Vec::new(),
            proc_layers: Vec::new(),
        }
    }
}

impl Fragment {
    /// A fragment playing a single animation on one layer.
    pub fn single(anim_ref: impl Into<String>) -> Self {
        Self {
            anim_layers: vec![vec![AnimClip {
                blend: AnimBlend::default(),
                animation: AnimationEntry::named(anim_ref),
            }]],
            ..Self::default()
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.anim_layers.is_empty() && self.proc_layers.is_empty()
    }

    /// Every animation name referenced by the fragment.
    pub fn animation_names(&self) -> impl Iterator<Item = &str> {
        self.anim_layers
            .iter()
            .flatten()
            .map(|clip| clip.animation.anim_ref.as_str())
            .filter(|name| !name.is_empty())
    }
}

// =============================================================================
// Blends
// =============================================================================

/// Identity of a blend that survives re-sorting of its variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlendUid(u64);

static NEXT_BLEND_UID: AtomicU64 = AtomicU64::new(1);

impl BlendUid {
    pub fn new() -> Self {
        Self(NEXT_BLEND_UID.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl Default for BlendUid {
    fn default() -> Self {
        Self::new()
    }
}

/// Transition data played when switching between two fragments.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FragmentBlend {
    pub select_time: f32,
    pub start_time: f32,
    pub enter_time: f32,
    /// [`TRANSITION_FLAGS`] bits.
    pub flags: u8,
    pub fragment: Fragment,
    pub uid: BlendUid,
}

impl FragmentBlend {
    pub fn new(fragment: Fragment) -> Self {
        Self {
            fragment,
            ..Self::default()
        }
    }

    /// Same timings, flags and payload, ignoring identity.
    pub fn same_content(&self, other: &FragmentBlend) -> bool {
        self.select_time == other.select_time
            && self.start_time == other.start_time
            && self.enter_time == other.enter_time
            && self.flags == other.flags
            && self.fragment == other.fragment
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anim_flags_round_trip() {
        let flags = ANIM_FLAGS.find("Loop").unwrap() | ANIM_FLAGS.find("TrackView").unwrap();
        let list = ANIM_FLAGS.to_tag_list(flags);
        assert_eq!(list, "Loop+TrackView");

        let parsed = ANIM_FLAGS.parse(&list);
        assert_eq!(parsed.flags, flags);
        assert!(parsed.unknown.is_empty());
    }

    #[test]
    fn flag_bits_follow_declaration_order() {
        assert_eq!(ANIM_FLAGS.find("ManualUpdate"), Some(1));
        assert_eq!(ANIM_FLAGS.find("ForceTransitionToAnim"), Some(1 << 15));
        assert_eq!(TRANSITION_FLAGS.find("outro"), Some(4));
        assert_eq!(FRAGMENT_DEF_FLAGS.find("AutoReinstall"), Some(2));
    }

    #[test]
    fn unknown_flag_is_reported() {
        let parsed = TRANSITION_FLAGS.parse("Cyclic+Sideways");
        assert_eq!(parsed.flags, 1);
        assert_eq!(parsed.unknown, vec!["Sideways".to_string()]);
    }

    #[test]
    fn defaults_match_authoring_defaults() {
        let clip = AnimClip::default();
        assert_eq!(clip.blend.duration, 0.2);
        assert_eq!(clip.animation.playback_speed, 1.0);
        assert_eq!(clip.animation.playback_weight, 1.0);
        assert_eq!(Fragment::default().blend_out_duration, 0.2);
        assert!(Fragment::default().is_empty());
    }

    #[test]
    fn blend_uids_are_unique() {
        let a = FragmentBlend::default();
        let b = FragmentBlend::default();
        assert_ne!(a.uid, b.uid);
        assert!(a.same_content(&b));
    }

    #[test]
    fn single_fragment_lists_its_animation() {
        let frag = Fragment::single("stand_idle");
        assert_eq!(frag.animation_names().collect::<Vec<_>>(), ["stand_idle"]);
    }
}
