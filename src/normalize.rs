//! Text normalisation — turns game text into something safe to hand to a
//! synthesis executable.
//!
//! Game strings carry rich-text tags, glossary links and punctuation that
//! either gets read out literally or confuses the command line of the
//! synthesiser. Every stage here is idempotent and the stages are ordered so
//! that no stage can re-introduce input for an earlier one, which makes the
//! whole pipeline idempotent too.
//!
//! Line breaks survive normalisation: the chunker treats each line as its own
//! unit.

use fancy_regex::{Captures, Regex};
use once_cell::sync::Lazy;
use std::borrow::Cow;

/// Placeholder a silence tag is expanded to.
pub const SILENCE_PLACEHOLDER: &str = "...";

// ─────────────────────────────────────────────────────────────────────────────
// Compiled regexes (lazily initialised once)
// ─────────────────────────────────────────────────────────────────────────────

static RE_SILENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)<\s*silence(?:\s+msec\s*=\s*"?[^"/>]*"?)?\s*/?\s*>"#).unwrap());
static RE_GLOSSARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{[a-z]\|[^{}]*\}([^{}]*)\{/[a-z]\}").unwrap());
static RE_BRACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{[^{}]*\}").unwrap());
static RE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());
static RE_CLAUSE_DASH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ \t]*[—–]+[ \t]*|(?<=\S)[ \t]+-+[ \t]+(?=\S)").unwrap());
static RE_WORD_HYPHEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?<=\w)[-_](?=\w)").unwrap());
static RE_SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[:/\\_\-–—]").unwrap());
static RE_DROPPED: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[~"“”„`<>{}|\r]"#).unwrap());
static RE_HSPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t\x{a0}\x{2009}\x{200b}]+").unwrap());

// ─────────────────────────────────────────────────────────────────────────────
// Stages
// ─────────────────────────────────────────────────────────────────────────────

/// `<silence msec="500"/>` → `...`. The duration is not honoured.
pub fn expand_silence(text: &str) -> Cow<'_, str> {
    RE_SILENCE.replace_all(text, |_: &Captures| format!(" {SILENCE_PLACEHOLDER} "))
}

/// `{g|Encyclopedia:Spell}fireball{/g}` → `fireball`; any other `{...}`
/// formatting token is dropped.
pub fn strip_glossary(text: &str) -> String {
    let text = RE_GLOSSARY.replace_all(text, "$1");
    RE_BRACES.replace_all(&text, "").into_owned()
}

pub fn remove_tags(text: &str) -> Cow<'_, str> {
    RE_TAG.replace_all(text, "")
}

/// Neutralise characters the command line of the synthesiser trips over:
/// dashes used as clause breaks become a comma pause, intra-word hyphens and
/// underscores a space, colons and slashes a space; quotes, tildes and stray
/// bracket characters are dropped.
pub fn neutralize_separators(text: &str) -> String {
    let text = RE_CLAUSE_DASH.replace_all(text, ", ");
    let text = RE_WORD_HYPHEN.replace_all(&text, " ");
    let text = RE_SEPARATORS.replace_all(&text, " ");
    RE_DROPPED.replace_all(&text, "").into_owned()
}

/// Collapse horizontal whitespace, trim every line and drop empty lines.
pub fn collapse_whitespace(text: &str) -> String {
    text.lines()
        .map(|line| RE_HSPACE.replace_all(line, " ").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

// ─────────────────────────────────────────────────────────────────────────────
// TextNormalizer — full pipeline
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct NormalizerConfig {
    pub strip_glossary: bool,
    pub expand_silence: bool,
    pub remove_tags: bool,
    pub neutralize_separators: bool,
    pub collapse_whitespace: bool,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            strip_glossary: true,
            expand_silence: true,
            remove_tags: true,
            neutralize_separators: true,
            collapse_whitespace: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TextNormalizer {
    pub config: NormalizerConfig,
}

impl TextNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: NormalizerConfig) -> Self {
        Self { config }
    }

    pub fn normalize(&self, text: &str) -> String {
        let cfg = &self.config;
        let mut text = text.to_string();

        if cfg.strip_glossary {
            text = strip_glossary(&text);
        }
        if cfg.expand_silence {
            text = expand_silence(&text).into_owned();
        }
        if cfg.remove_tags {
            text = remove_tags(&text).into_owned();
        }
        if cfg.neutralize_separators {
            text = neutralize_separators(&text);
        }
        if cfg.collapse_whitespace {
            text = collapse_whitespace(&text);
        }

        text
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(s: &str) -> String {
        TextNormalizer::new().normalize(s)
    }

    #[test]
    fn test_remove_tags() {
        assert_eq!(norm("<b>Bold</b> and <i>italic</i>"), "Bold and italic");
        assert_eq!(norm("<color=#616060>grey</color>"), "grey");
    }

    #[test]
    fn test_silence() {
        assert_eq!(norm(r#"Wait<silence msec="500"/>now"#), "Wait ... now");
        assert_eq!(norm("Wait<silence/>now"), "Wait ... now");
        assert_eq!(norm(r#"Wait <SILENCE msec=200 /> now"#), "Wait ... now");
    }

    #[test]
    fn test_glossary() {
        assert_eq!(norm("Cast {g|Encyclopedia:Spell}fireball{/g} now"), "Cast fireball now");
        assert_eq!(norm("Hello {name}!"), "Hello !");
        assert_eq!(norm("{n}Aside{/n}"), "Aside");
    }

    #[test]
    fn test_separators() {
        assert_eq!(norm("well-known snake_case"), "well known snake case");
        assert_eq!(norm("Note: a/b"), "Note a b");
        assert_eq!(norm("wait — what"), "wait, what");
        assert_eq!(norm("wait - what"), "wait, what");
        assert_eq!(norm("~Hello~"), "Hello");
    }

    #[test]
    fn test_quotes_removed() {
        assert_eq!(norm(r#"He said "run" and “hide”"#), "He said run and hide");
        // Apostrophes are speech, not quoting.
        assert_eq!(norm("don't"), "don't");
    }

    #[test]
    fn test_lines_preserved() {
        assert_eq!(norm("  First   line \r\n\n\t second\u{a0}line  "), "First line\nsecond line");
    }

    #[test]
    fn test_empty() {
        assert_eq!(norm(""), "");
        assert_eq!(norm("  <br/>  \n "), "");
    }

    #[test]
    fn test_idempotent() {
        let samples = [
            "",
            "plain text",
            r#"<color=#616060>"Hello"</color> - said {g|x}Bob{/g}: go/run <silence msec="1"/>"#,
            "a <<b>> c",
            "x <y <b>z> w",
            "<>>",
            "-- -- --",
            "a\\:b ~ c__d",
            "Wait...\n\n  next — line – here",
            "{{nested}} {open",
            "multi\r\nline\ttext\u{a0}with\u{200b}odd spaces",
        ];
        let n = TextNormalizer::new();
        for s in samples {
            let once = n.normalize(s);
            let twice = n.normalize(&once);
            assert_eq!(once, twice, "not idempotent for {s:?}");
        }
    }

    #[test]
    fn test_stages_toggle() {
        let n = TextNormalizer::with_config(NormalizerConfig {
            remove_tags: false,
            neutralize_separators: false,
            ..NormalizerConfig::default()
        });
        assert_eq!(n.normalize("<b>x</b>"), "<b>x</b>");
    }
}
