//! Settings model.
//!
//! A process-wide configuration singleton, stored as a JSON blob under the
//! key `"default"`.

use serde::{Deserialize, Serialize};

/// Output naming policy tag, consumed by external naming code only.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
pub enum OutputNamingMode {
    #[serde(rename = "legacy")]
    #[strum(serialize = "legacy")]
    Legacy,
    #[serde(rename = "media-server")]
    #[strum(serialize = "media-server")]
    MediaServer,
}

/// Process-wide settings singleton.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Root directory for all outputs.
    pub destination: String,

    pub output_naming_mode: OutputNamingMode,
    pub separate_lang: bool,

    /// Worker pool target size.
    pub max_workers: u32,
    /// Ceiling for the download limiter.
    pub max_concurrent_downloads: u32,

    // Media-server integration, passed through untouched.
    pub jellyfin_url: String,
    pub jellyfin_api_key: String,
    pub plex_url: String,
    pub plex_token: String,
    pub plex_section_id: String,

    /// Optional personal AniList API token.
    pub anilist_token: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            destination: "videos".to_string(),
            output_naming_mode: OutputNamingMode::Legacy,
            separate_lang: false,
            max_workers: 2,
            max_concurrent_downloads: 4,
            jellyfin_url: String::new(),
            jellyfin_api_key: String::new(),
            plex_url: String::new(),
            plex_token: String::new(),
            plex_section_id: String::new(),
            anilist_token: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = Settings::default();
        assert_eq!(s.destination, "videos");
        assert_eq!(s.output_naming_mode, OutputNamingMode::Legacy);
        assert!(!s.separate_lang);
        assert_eq!(s.max_workers, 2);
        assert_eq!(s.max_concurrent_downloads, 4);
    }

    #[test]
    fn wire_format_is_camel_case() {
        let json = serde_json::to_value(Settings::default()).unwrap();
        assert_eq!(json["outputNamingMode"], "legacy");
        assert_eq!(json["maxConcurrentDownloads"], 4);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let s: Settings = serde_json::from_str(r#"{"destination":"out"}"#).unwrap();
        assert_eq!(s.destination, "out");
        assert_eq!(s.max_workers, 2);
    }
}
