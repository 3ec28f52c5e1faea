//! Speaker roles, the voice catalog and per-role voice profile resolution.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    config::{Settings, SettingsHandle},
    error::{Result, SpeechError},
};

/// Delimiter between the voice id and the gender in a catalog entry.
/// Reserved: it never occurs inside a voice id.
pub const VOICE_DELIMITER: char = '#';

/// Logical speaker role a request is voiced as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceRole {
    Narrator,
    Female,
    Male,
}

impl fmt::Display for VoiceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Narrator => "narrator",
            Self::Female => "female",
            Self::Male => "male",
        })
    }
}

impl std::str::FromStr for VoiceRole {
    type Err = SpeechError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "narrator" => Ok(Self::Narrator),
            "female" => Ok(Self::Female),
            "male" => Ok(Self::Male),
            other => Err(SpeechError::Configuration(format!("unknown voice role '{other}'"))),
        }
    }
}

/// Gender of the active dialog speaker, as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Female,
    Male,
    /// Anything the host could not classify.
    #[serde(other)]
    Other,
}

impl Gender {
    /// Lenient parse used for host strings and voice-list columns.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "female" | "f" => Self::Female,
            "male" | "m" => Self::Male,
            _ => Self::Other,
        }
    }

    /// Role the speaker is voiced as when gender routing is on.
    pub fn role(self) -> Option<VoiceRole> {
        match self {
            Self::Female => Some(VoiceRole::Female),
            Self::Male => Some(VoiceRole::Male),
            Self::Other => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Voice profile
// ─────────────────────────────────────────────────────────────────────────────

/// Voice identity plus acoustic parameters for one role.
///
/// `pitch` and `rate` are in `-10..=10` (0 = backend default), `volume` in
/// `0..=100`. Each backend maps these onto its own command-line scale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoiceProfile {
    pub role: VoiceRole,
    pub voice_id: String,
    pub pitch: i32,
    pub rate: i32,
    pub volume: i32,
}

impl VoiceProfile {
    /// Built-in profile used when configuration cannot be resolved.
    pub fn fallback(role: VoiceRole, voice_id: impl Into<String>) -> Self {
        Self { role, voice_id: voice_id.into(), pitch: 0, rate: 0, volume: 100 }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Voice catalog
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceEntry {
    pub id: String,
    /// Gender column as reported by the backend (`"Unknown"` when absent).
    pub gender: String,
}

impl VoiceEntry {
    /// Parse an `id#gender` entry. Anything without exactly one delimiter is
    /// kept whole as the id with an `Unknown` gender.
    pub fn parse(raw: &str) -> Self {
        let parts: Vec<&str> = raw.split(VOICE_DELIMITER).collect();
        match parts.as_slice() {
            [id, gender] => Self { id: id.to_string(), gender: gender.to_string() },
            _ => Self { id: raw.to_string(), gender: "Unknown".to_string() },
        }
    }

    pub fn encode(&self) -> String {
        format!("{}{}{}", self.id, VOICE_DELIMITER, self.gender)
    }
}

/// Ordered list of voices the settings indices refer to.
#[derive(Debug, Clone, Default)]
pub struct VoiceCatalog {
    entries: Vec<VoiceEntry>,
}

impl VoiceCatalog {
    pub fn from_entries<S: AsRef<str>>(raw: &[S]) -> Self {
        Self { entries: raw.iter().map(|s| VoiceEntry::parse(s.as_ref())).collect() }
    }

    pub fn get(&self, index: usize) -> Option<&VoiceEntry> {
        self.entries.get(index)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Resolver
// ─────────────────────────────────────────────────────────────────────────────

/// Maps a speaker role onto a concrete [`VoiceProfile`], reading the settings
/// snapshot at call time.
#[derive(Debug, Clone)]
pub struct VoiceResolver {
    settings: SettingsHandle,
}

impl VoiceResolver {
    pub fn new(settings: SettingsHandle) -> Self {
        Self { settings }
    }

    /// Role actually used for `speaker`: Narrator when nobody is attributed or
    /// when gender-specific routing is disabled.
    pub fn effective_role(settings: &Settings, speaker: Option<VoiceRole>) -> VoiceRole {
        match speaker {
            Some(role) if settings.use_gender_specific_voices => role,
            _ => VoiceRole::Narrator,
        }
    }

    /// Resolve the profile for `speaker`.
    ///
    /// Fails with [`SpeechError::Configuration`] when the selected voice index
    /// does not exist in the catalog.
    pub fn resolve(&self, speaker: Option<VoiceRole>) -> Result<VoiceProfile> {
        let settings = self.settings.snapshot();
        profile_for(&settings, Self::effective_role(&settings, speaker))
    }

    /// Like [`resolve`](Self::resolve) but never fails: configuration errors
    /// fall back to the built-in default profile. The error, if any, is
    /// returned alongside so the caller can report it.
    pub fn resolve_or_default(
        &self,
        speaker: Option<VoiceRole>,
    ) -> (VoiceProfile, Option<SpeechError>) {
        let settings = self.settings.snapshot();
        let role = Self::effective_role(&settings, speaker);
        or_default(&settings, role)
    }

    /// Profile configured for `role` regardless of gender routing, with the
    /// same fallback as [`resolve_or_default`](Self::resolve_or_default).
    pub fn resolve_role_or_default(&self, role: VoiceRole) -> (VoiceProfile, Option<SpeechError>) {
        or_default(&self.settings.snapshot(), role)
    }
}

fn profile_for(settings: &Settings, role: VoiceRole) -> Result<VoiceProfile> {
    let catalog = VoiceCatalog::from_entries(&settings.available_voices);
    let index = settings.voice_index(role);
    let entry = catalog.get(index).ok_or_else(|| {
        SpeechError::Configuration(format!(
            "{} voice index {} is out of range ({} voices available)",
            role,
            index,
            catalog.len()
        ))
    })?;
    if entry.id.trim().is_empty() {
        return Err(SpeechError::Configuration(format!(
            "{role} voice at index {index} has an empty id"
        )));
    }
    let acoustics = settings.acoustics(role);
    Ok(VoiceProfile {
        role,
        voice_id: entry.id.clone(),
        pitch: acoustics.pitch,
        rate: acoustics.rate,
        volume: acoustics.volume,
    })
}

fn or_default(settings: &Settings, role: VoiceRole) -> (VoiceProfile, Option<SpeechError>) {
    match profile_for(settings, role) {
        Ok(profile) => (profile, None),
        Err(e) => {
            warn!(%role, error = %e, "falling back to default voice profile");
            (VoiceProfile::fallback(role, settings.default_voice.clone()), Some(e))
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings {
            available_voices: vec![
                "en-GB-RyanNeural#Male".into(),
                "en-IE-EmilyNeural#Female".into(),
                "en-US-GuyNeural#Male".into(),
            ],
            narrator_voice: 0,
            female_voice: 1,
            male_voice: 2,
            female_pitch: 3,
            female_rate: -2,
            female_volume: 80,
            ..Settings::default()
        }
    }

    fn resolver(s: Settings) -> VoiceResolver {
        VoiceResolver::new(SettingsHandle::new(s))
    }

    #[test]
    fn test_entry_parse() {
        let e = VoiceEntry::parse("en-IE-EmilyNeural#Female");
        assert_eq!(e.id, "en-IE-EmilyNeural");
        assert_eq!(e.gender, "Female");
        assert_eq!(e.encode(), "en-IE-EmilyNeural#Female");

        let odd = VoiceEntry::parse("a#b#c");
        assert_eq!(odd.id, "a#b#c");
        assert_eq!(odd.gender, "Unknown");
        assert_eq!(VoiceEntry::parse("plain").gender, "Unknown");
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!("Female".parse::<VoiceRole>().unwrap(), VoiceRole::Female);
        assert_eq!(" narrator ".parse::<VoiceRole>().unwrap(), VoiceRole::Narrator);
        assert!("robot".parse::<VoiceRole>().is_err());
    }

    #[test]
    fn test_gender_parse() {
        assert_eq!(Gender::parse("Female"), Gender::Female);
        assert_eq!(Gender::parse(" m "), Gender::Male);
        assert_eq!(Gender::parse("robot"), Gender::Other);
        assert_eq!(Gender::Other.role(), None);
    }

    #[test]
    fn test_resolve_roles() {
        let r = resolver(settings());
        let female = r.resolve(Some(VoiceRole::Female)).unwrap();
        assert_eq!(
            female,
            VoiceProfile {
                role: VoiceRole::Female,
                voice_id: "en-IE-EmilyNeural".into(),
                pitch: 3,
                rate: -2,
                volume: 80,
            }
        );
        assert_eq!(r.resolve(Some(VoiceRole::Male)).unwrap().voice_id, "en-US-GuyNeural");
        assert_eq!(r.resolve(None).unwrap().role, VoiceRole::Narrator);
    }

    #[test]
    fn test_routing_disabled_uses_narrator() {
        let r = resolver(Settings { use_gender_specific_voices: false, ..settings() });
        let p = r.resolve(Some(VoiceRole::Female)).unwrap();
        assert_eq!(p.role, VoiceRole::Narrator);
        assert_eq!(p.voice_id, "en-GB-RyanNeural");
    }

    #[test]
    fn test_out_of_range_index() {
        let r = resolver(Settings { male_voice: 9, ..settings() });
        assert!(matches!(r.resolve(Some(VoiceRole::Male)), Err(SpeechError::Configuration(_))));

        let (profile, err) = r.resolve_or_default(Some(VoiceRole::Male));
        assert!(err.is_some());
        assert_eq!(profile, VoiceProfile::fallback(VoiceRole::Male, crate::config::DEFAULT_VOICE));
    }

    #[test]
    fn test_empty_catalog_falls_back() {
        let r = resolver(Settings::default());
        let (profile, err) = r.resolve_or_default(None);
        assert!(matches!(err, Some(SpeechError::Configuration(_))));
        assert_eq!(profile.role, VoiceRole::Narrator);
        assert_eq!(profile.voice_id, crate::config::DEFAULT_VOICE);
    }

    #[test]
    fn test_role_resolution_ignores_routing() {
        let r = resolver(Settings { use_gender_specific_voices: false, ..settings() });
        let (p, err) = r.resolve_role_or_default(VoiceRole::Female);
        assert!(err.is_none());
        assert_eq!(p.voice_id, "en-IE-EmilyNeural");
        assert_eq!(r.resolve(Some(VoiceRole::Female)).unwrap().role, VoiceRole::Narrator);

        let r = resolver(Settings { female_voice: 7, ..settings() });
        let (p, err) = r.resolve_role_or_default(VoiceRole::Female);
        assert!(matches!(err, Some(SpeechError::Configuration(_))));
        assert_eq!(p, VoiceProfile::fallback(VoiceRole::Female, crate::config::DEFAULT_VOICE));
    }

    #[test]
    fn test_resolution_reads_settings_at_call_time() {
        let handle = SettingsHandle::new(settings());
        let r = VoiceResolver::new(handle.clone());
        assert_eq!(r.resolve(None).unwrap().voice_id, "en-GB-RyanNeural");
        handle.replace(Settings { narrator_voice: 1, ..settings() });
        assert_eq!(r.resolve(None).unwrap().voice_id, "en-IE-EmilyNeural");
    }
}
