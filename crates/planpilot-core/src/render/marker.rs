//! The metadata marker embedded in every rendered item body.
//!
//! The marker is a plain-text block at the top of the body, identical
//! across all renderer implementations and never wrapped in adapter
//! comment syntax, so discovery's substring search stays renderer
//! agnostic:
//!
//! ```text
//! PLANPILOT_META_V1
//! PLAN_ID:<plan_id>
//! ITEM_ID:<item_id>
//! END_PLANPILOT_META
//! ```

pub const MARKER_OPEN: &str = "PLANPILOT_META_V1";
pub const MARKER_CLOSE: &str = "END_PLANPILOT_META";
const PLAN_ID_PREFIX: &str = "PLAN_ID:";
const ITEM_ID_PREFIX: &str = "ITEM_ID:";

/// The correlation values recovered from a marker block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub plan_id: String,
    pub item_id: String,
}

/// The literal body substring discovery searches for.
pub fn plan_id_token(plan_id: &str) -> String {
    format!("{PLAN_ID_PREFIX}{plan_id}")
}

/// Render the marker block, trailing newline included.
pub fn format_marker(plan_id: &str, item_id: &str) -> String {
    format!(
        "{MARKER_OPEN}\n{PLAN_ID_PREFIX}{plan_id}\n{ITEM_ID_PREFIX}{item_id}\n{MARKER_CLOSE}\n"
    )
}

/// Parse the marker block out of a body.
///
/// Tolerant of anything surrounding the block, strict about the block
/// itself: the four lines must appear in order and the values are
/// single-line tokens with no whitespace around the colon. Returns
/// `None` when no well-formed block is present.
pub fn parse_marker(body: &str) -> Option<Marker> {
    let mut lines = body.lines().skip_while(|line| line.trim_end() != MARKER_OPEN);
    lines.next()?; // the MARKER_OPEN line itself

    let plan_id = lines.next()?.trim_end().strip_prefix(PLAN_ID_PREFIX)?;
    let item_id = lines.next()?.trim_end().strip_prefix(ITEM_ID_PREFIX)?;
    if lines.next()?.trim_end() != MARKER_CLOSE {
        return None;
    }
    if plan_id.is_empty()
        || item_id.is_empty()
        || plan_id.contains(char::is_whitespace)
        || item_id.contains(char::is_whitespace)
    {
        return None;
    }

    Some(Marker {
        plan_id: plan_id.to_owned(),
        item_id: item_id.to_owned(),
    })
}
