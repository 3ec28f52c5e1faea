//! Dialog formatting — splits dialog markup into per-voice segments.
//!
//! Dialog lines alternate between narrator-coloured spans (stage directions,
//! "she says, frowning") and the speaker's own words:
//!
//! ```text
//! <color=#616060>The guard looks up.</color>"Halt! Who goes there?"
//! ```
//!
//! A narrator colour marker switches to the narrator voice, the closing
//! `</color>` switches back to the speaker. Text before the first marker is
//! the speaker's.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::voice::VoiceRole;

/// Opens a narrator span.
pub const NARRATOR_COLOR_START: &str = "<color=#616060>";

/// Closes the current span.
pub const COLOR_END: &str = "</color>";

/// `<b><color=…><link="…">Name</link></color></b>` → `Name`.
static RE_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<b><color[^>]+><link([^>]+)?>([^<>]*)</link></color></b>").unwrap());

/// One run of text spoken by a single voice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogSegment {
    pub text: String,
    pub role: VoiceRole,
}

impl DialogSegment {
    fn new(text: &str, role: VoiceRole) -> Self {
        Self { text: text.to_string(), role }
    }
}

/// Replace decorative link wrappers with their inner text.
pub fn unwrap_links(markup: &str) -> String {
    RE_LINK.replace_all(markup, "$2").into_owned()
}

/// `markup` with link wrappers unwrapped and both voice markers removed —
/// exactly the concatenation of the segments [`format_dialog`] emits.
pub fn strip_markers(markup: &str) -> String {
    unwrap_links(markup).replace(NARRATOR_COLOR_START, "").replace(COLOR_END, "")
}

/// Split dialog markup into voice segments.
///
/// `speaker` is the role of the active dialog speaker (supplied by the host,
/// never inferred from the text). Empty segments are dropped and adjacent
/// segments with the same role are merged, so the output never contains a
/// zero-length voice switch.
pub fn format_dialog(markup: &str, speaker: VoiceRole) -> Vec<DialogSegment> {
    let text = unwrap_links(markup);
    let mut segments: Vec<DialogSegment> = Vec::new();
    let mut push = |span: &str, role: VoiceRole| {
        if span.is_empty() {
            return;
        }
        match segments.last_mut() {
            Some(last) if last.role == role => last.text.push_str(span),
            _ => segments.push(DialogSegment::new(span, role)),
        }
    };

    let mut role = speaker;
    let mut rest = text.as_str();
    loop {
        let next_start = rest.find(NARRATOR_COLOR_START);
        let next_end = rest.find(COLOR_END);
        let (pos, marker_len, next_role) = match (next_start, next_end) {
            (Some(s), Some(e)) if s < e => (s, NARRATOR_COLOR_START.len(), VoiceRole::Narrator),
            (Some(s), None) => (s, NARRATOR_COLOR_START.len(), VoiceRole::Narrator),
            (_, Some(e)) => (e, COLOR_END.len(), speaker),
            (None, None) => {
                push(rest, role);
                break;
            }
        };
        push(&rest[..pos], role);
        role = next_role;
        rest = &rest[pos + marker_len..];
    }

    segments
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(text: &str, role: VoiceRole) -> DialogSegment {
        DialogSegment::new(text, role)
    }

    #[test]
    fn test_narrator_then_speaker() {
        let out = format_dialog("<color=#616060>Hello</color>World", VoiceRole::Female);
        assert_eq!(out, vec![seg("Hello", VoiceRole::Narrator), seg("World", VoiceRole::Female)]);
    }

    #[test]
    fn test_leading_text_is_speaker() {
        let out = format_dialog("Halt!<color=#616060> he shouts.</color> Now.", VoiceRole::Male);
        assert_eq!(
            out,
            vec![
                seg("Halt!", VoiceRole::Male),
                seg(" he shouts.", VoiceRole::Narrator),
                seg(" Now.", VoiceRole::Male),
            ]
        );
    }

    #[test]
    fn test_no_markers() {
        let out = format_dialog("Just words", VoiceRole::Narrator);
        assert_eq!(out, vec![seg("Just words", VoiceRole::Narrator)]);
    }

    #[test]
    fn test_dangling_marker_dropped() {
        // Trailing </color> opens an empty speaker segment that must not be emitted.
        let out = format_dialog("<color=#616060>Only narration</color>", VoiceRole::Female);
        assert_eq!(out, vec![seg("Only narration", VoiceRole::Narrator)]);
        assert!(format_dialog("", VoiceRole::Male).is_empty());
        assert!(format_dialog("<color=#616060></color>", VoiceRole::Male).is_empty());
    }

    #[test]
    fn test_same_role_merged() {
        let out = format_dialog("a</color>b", VoiceRole::Female);
        assert_eq!(out, vec![seg("ab", VoiceRole::Female)]);
    }

    #[test]
    fn test_link_unwrapped() {
        let markup =
            r#"Ask <b><color=#3b5d9c><link="Encyclopedia:Amiri">Amiri</link></color></b> first."#;
        let out = format_dialog(markup, VoiceRole::Female);
        assert_eq!(out, vec![seg("Ask Amiri first.", VoiceRole::Female)]);
    }

    #[test]
    fn test_round_trip() {
        let inputs = [
            "<color=#616060>Hello</color>World",
            "x<color=#616060>y</color>z<color=#616060>w",
            "</color></color>lead",
            "<color=#616060><color=#616060>double</color>",
            r#"<b><color=#aaa><link="x">Name</link></color></b> <color=#616060>says</color> hi"#,
            "",
        ];
        for input in inputs {
            for role in [VoiceRole::Female, VoiceRole::Male, VoiceRole::Narrator] {
                let joined: String =
                    format_dialog(input, role).into_iter().map(|s| s.text).collect();
                assert_eq!(joined, strip_markers(input), "round trip failed for {input:?}");
            }
        }
    }

    #[test]
    fn test_order_and_no_empty_segments() {
        let out =
            format_dialog("<color=#616060>a</color>b<color=#616060>c</color>", VoiceRole::Male);
        let roles: Vec<VoiceRole> = out.iter().map(|s| s.role).collect();
        assert_eq!(roles, vec![VoiceRole::Narrator, VoiceRole::Male, VoiceRole::Narrator]);
        assert!(out.iter().all(|s| !s.text.is_empty()));
    }
}
