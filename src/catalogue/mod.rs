//! anime-sama catalogue access.
//!
//! Base-URL canonicalization, the `episodes.js` manifest fetch, and the
//! parser that turns the manifest into an ordered player -> episode-URL
//! mapping. Parsing is deliberately forgiving: the manifest is a JS file
//! with per-player `var epsN = [...]` arrays, and placeholder embed URLs are
//! treated as gaps.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use url::Url;

use crate::{Error, Result};

const USER_AGENT: &str = "asd-server";

/// Canonical host every known catalogue mirror is mapped to.
const CANONICAL_HOST: &str = "anime-sama.si";
const KNOWN_HOSTS: &[&str] = &[
    "anime-sama.tv",
    "anime-sama.fr",
    "anime-sama.org",
    "anime-sama.si",
];

/// Episode lists per player, in manifest order.
#[derive(Debug, Clone, Default)]
pub struct EpisodeManifest {
    /// `("Player 1", urls)` pairs; index 0 of `urls` is episode 1, empty
    /// strings mark missing/unavailable episodes.
    pub players: Vec<(String, Vec<String>)>,
}

impl EpisodeManifest {
    /// Episode URLs for an exact player name.
    pub fn player(&self, name: &str) -> Option<&[String]> {
        self.players
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, urls)| urls.as_slice())
    }
}

/// Canonicalize a season/language base URL: known mirror hosts map to the
/// canonical host, and the path is forced to end with `/`.
pub fn canonicalize_base_url(raw: &str) -> Result<String> {
    let mut url =
        Url::parse(raw.trim()).map_err(|_| Error::validation("invalid baseUrl"))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(Error::validation("invalid baseUrl"));
    }

    let host = url
        .host_str()
        .unwrap_or_default()
        .to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    if KNOWN_HOSTS.contains(&host) {
        url.set_host(Some(CANONICAL_HOST))
            .map_err(|_| Error::validation("invalid baseUrl"))?;
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url.to_string())
}

/// Source of `episodes.js` manifests; a trait so tests can stub the fetch.
#[async_trait]
pub trait EpisodeSource: Send + Sync {
    /// Fetch the raw `episodes.js` text for a canonical base URL.
    async fn fetch_episodes_js(&self, base_url: &str) -> Result<String>;
}

/// HTTP implementation of [`EpisodeSource`].
pub struct HttpEpisodeSource {
    client: reqwest::Client,
}

impl HttpEpisodeSource {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for HttpEpisodeSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EpisodeSource for HttpEpisodeSource {
    async fn fetch_episodes_js(&self, base_url: &str) -> Result<String> {
        let canon = canonicalize_base_url(base_url)?;
        let js_url = format!("{}episodes.js", canon);

        let resp = self
            .client
            .get(&js_url)
            .header("Accept", "text/javascript,*/*;q=0.1")
            .header("Referer", &canon)
            .send()
            .await?;

        if resp.status().as_u16() >= 400 {
            return Err(Error::http(format!(
                "episodes.js http error: {}",
                resp.status()
            )));
        }

        Ok(resp.text().await?)
    }
}

static RE_EPISODES_ARRAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"var\s+(eps\d+)\s*=\s*\[([^\]]*)\];").unwrap());
static RE_QUOTED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"'([^']*)'").unwrap());

/// Parse an `episodes.js` manifest into per-player episode lists, preserving
/// the order players appear in the file. Implausible entries become gaps.
pub fn parse_episodes_js(js_text: &str) -> Result<EpisodeManifest> {
    let mut players = Vec::new();

    for caps in RE_EPISODES_ARRAY.captures_iter(js_text) {
        let var_name = &caps[1];
        let content = &caps[2];

        let digits: String = var_name.chars().filter(char::is_ascii_digit).collect();
        if digits.is_empty() {
            continue;
        }
        let player_name = format!("Player {digits}");

        let urls: Vec<String> = RE_QUOTED
            .captures_iter(content)
            .map(|item| {
                let candidate = item[1].trim();
                if is_plausible_episode_url(candidate) {
                    candidate.to_string()
                } else {
                    String::new()
                }
            })
            .collect();

        players.push((player_name, urls));
    }

    if players.is_empty() {
        return Err(Error::validation("no episodes arrays found"));
    }

    let has_any = players
        .iter()
        .any(|(_, urls)| urls.iter().any(|u| !u.is_empty()));
    if !has_any {
        return Err(Error::validation("no plausible episode urls"));
    }

    Ok(EpisodeManifest { players })
}

/// Filter out the placeholder embeds the site leaves for missing episodes.
fn is_plausible_episode_url(raw: &str) -> bool {
    let raw = raw.trim();
    if raw.is_empty() {
        return false;
    }
    if !(raw.starts_with("http://") || raw.starts_with("https://")) {
        return false;
    }
    if raw.ends_with('=') || raw.ends_with("/embed/") {
        return false;
    }

    let lower = raw.to_ascii_lowercase();

    // VK placeholder: empty or non-numeric oid/id.
    if lower.contains("vk.com/video_ext.php") {
        let Ok(parsed) = Url::parse(raw) else {
            return false;
        };
        let oid = query_param(&parsed, "oid");
        let id = query_param(&parsed, "id");
        let (Some(oid), Some(id)) = (oid, id) else {
            return false;
        };
        if oid.trim_start_matches('-').parse::<i64>().is_err() || id.parse::<i64>().is_err() {
            return false;
        }
    }

    // Sibnet placeholder: missing videoid.
    if lower.contains("video.sibnet.ru") && lower.contains("shell.php") {
        let Ok(parsed) = Url::parse(raw) else {
            return false;
        };
        match query_param(&parsed, "videoid") {
            Some(videoid) if videoid.parse::<i64>().is_ok() => {}
            _ => return false,
        }
    }

    // Vidmoly placeholder: embed-.html without an id.
    if lower.contains("vidmoly") && lower.contains("/embed-") {
        let Ok(parsed) = Url::parse(raw) else {
            return false;
        };
        let path = parsed.path();
        let Some(mid) = path
            .strip_prefix("/embed-")
            .and_then(|rest| rest.strip_suffix(".html"))
        else {
            return false;
        };
        if mid.trim().is_empty() {
            return false;
        }
    }

    // SendVid placeholder: /embed/<id> with an empty id.
    if lower.contains("sendvid.com") && lower.contains("/embed/") {
        let Ok(parsed) = Url::parse(raw) else {
            return false;
        };
        let parts: Vec<&str> = parsed.path().trim_matches('/').split('/').collect();
        if parts.len() < 2 || parts[0] != "embed" || parts[1].trim().is_empty() {
            return false;
        }
    }

    true
}

fn query_param(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// Pick the player with the most non-empty entries; ties go to the first
/// seen. Returns `None` for an empty manifest.
pub fn best_player(manifest: &EpisodeManifest) -> Option<&str> {
    manifest
        .players
        .iter()
        .max_by(|(_, a), (_, b)| {
            let ca = a.iter().filter(|u| !u.is_empty()).count();
            let cb = b.iter().filter(|u| !u.is_empty()).count();
            // max_by keeps the *last* max; invert equality so the first wins.
            match ca.cmp(&cb) {
                std::cmp::Ordering::Equal => std::cmp::Ordering::Greater,
                other => other,
            }
        })
        .map(|(name, _)| name.as_str())
}

/// 1-based index of the last non-empty entry; 0 when none.
pub fn max_available_episode(urls: &[String]) -> i64 {
    urls.iter()
        .rposition(|u| !u.is_empty())
        .map(|i| (i + 1) as i64)
        .unwrap_or(0)
}
