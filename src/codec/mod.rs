//! XML codecs binding the data model to the three file dialects.
//!
//! ```text
//! <TagDefinition version="2">   tag vocabularies        (tag_def)
//! <ControllerDef>               controller schemas      (controller_def)
//! <AnimDB>                      fragment / blend data   (database)
//! ```
//!
//! Codecs never touch the caches directly. Anything that needs another file
//! (imports, referenced vocabularies, SubADB files) goes through a
//! [`ResourceSource`], which the manager implements over its caches and the
//! tests implement over an in-memory document map.

pub mod controller_def;
pub mod database;
pub mod fragment;
pub mod tag_def;

use mannequin_xml::XmlNode;
use tracing::warn;

use crate::cache::TagDefId;
use crate::database::TagDefCache;
use crate::error::LoadError;
use crate::tag_definition::{TagDefinition, TagState};

/// Everything a codec needs from its surroundings.
pub trait ResourceSource {
    /// Parse the document stored under a logical path.
    fn read_xml(&self, filename: &str) -> Result<XmlNode, LoadError>;

    /// Currently cached tag definitions.
    fn tag_defs(&self) -> &TagDefCache;

    /// Cached handle for `filename`, loading it first if needed.
    fn load_tag_def(&mut self, filename: &str) -> Result<TagDefId, LoadError>;

    /// Tag and fragment vocabularies of the controller definition `filename`,
    /// loading it first if needed.
    fn load_controller_vocabularies(
        &mut self,
        filename: &str,
    ) -> Result<(TagDefId, TagDefId), LoadError>;

    /// Whether unknown tokens in tag lists are reported.
    fn log_unknown_tags(&self) -> bool {
        true
    }
}

/// Parse a tag list, warning about unknown tokens.
///
/// Returns `None` if any token was unknown; the partial state is discarded.
pub(crate) fn parse_tags(
    def: &TagDefinition,
    list: &str,
    context: &str,
    verbose: bool,
) -> Option<TagState> {
    let parsed = def.tag_list_to_flags(list);
    if parsed.is_complete() {
        return Some(parsed.state);
    }
    if verbose {
        for token in &parsed.unknown {
            warn!(file = %context, tag_def = %def.filename(), tag = %token, "unknown tag");
        }
    }
    None
}

/// Like [`parse_tags`] but keeps the partial state after warning.
pub(crate) fn parse_tags_lenient(
    def: &TagDefinition,
    list: &str,
    context: &str,
    verbose: bool,
) -> TagState {
    let parsed = def.tag_list_to_flags(list);
    if verbose {
        for token in &parsed.unknown {
            warn!(file = %context, tag_def = %def.filename(), tag = %token, "unknown tag");
        }
    }
    parsed.state
}

/// Fail with [`LoadError::WrongRoot`] unless `root` is a `<expected>` element.
pub(crate) fn expect_root(
    root: &XmlNode,
    expected: &'static str,
    filename: &str,
) -> Result<(), LoadError> {
    if root.is(expected) {
        Ok(())
    } else {
        Err(LoadError::WrongRoot {
            filename: filename.to_string(),
            expected,
            found: root.tag().to_string(),
        })
    }
}

// =============================================================================
// Test support
// =============================================================================
