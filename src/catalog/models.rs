//! Provider-agnostic song model and upstream payload normalization.
//!
//! The primary and fallback catalog providers return very different
//! shapes; both are mapped into a single [`Song`] record here. A record
//! that cannot produce a non-empty id and name is dropped during
//! normalization and never reaches a ranked set.

use serde::{Deserialize, Serialize};

/// A reference to an artist, as carried inside a [`Song`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtistRef {
    pub id: String,
    pub name: String,
}

/// A reference to the album a song belongs to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlbumRef {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// Artist groups attached to a song. Only the primary group takes part
/// in ranking; featured artists are kept for display.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Artists {
    #[serde(default)]
    pub primary: Vec<ArtistRef>,
}

/// A URL tagged with the quality variant it serves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityUrl {
    pub quality: String,
    pub url: String,
}

/// Ranking annotation attached by the reranker on output only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingInfo {
    pub final_score: f64,
    pub text_rank_score: f64,
    pub preference_match: f64,
    pub popularity_score: f64,
    pub interaction_score: f64,
    pub neural_score: f64,
}

/// The normalized, provider-agnostic song record.
///
/// `id` and `name` are always non-empty after normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Song {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub album: AlbumRef,
    #[serde(default)]
    pub artists: Artists,
    #[serde(default, rename = "imageUrls", skip_serializing_if = "Vec::is_empty")]
    pub image_urls: Vec<QualityUrl>,
    #[serde(default, rename = "downloadUrls", skip_serializing_if = "Vec::is_empty")]
    pub download_urls: Vec<QualityUrl>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(
        default,
        rename = "durationSec",
        skip_serializing_if = "Option::is_none"
    )]
    pub duration_sec: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub popularity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(default, rename = "_ranking", skip_serializing_if = "Option::is_none")]
    pub ranking: Option<RankingInfo>,
    #[serde(
        default,
        rename = "_nextReason",
        skip_serializing_if = "Option::is_none"
    )]
    pub next_reason: Option<String>,
}

impl Song {
    /// Names of the primary artists, joined for display or matching.
    pub fn artist_names(&self) -> Vec<&str> {
        self.artists.primary.iter().map(|a| a.name.as_str()).collect()
    }
}

/// A page of songs as returned by the primary provider.
#[derive(Debug, Clone)]
pub struct PrimaryPage {
    pub start: u32,
    pub total: u32,
    pub songs: Vec<Song>,
}

/// Combined payload from the primary provider's broad search.
#[derive(Debug, Clone, Default)]
pub struct BroadResults {
    pub songs: Vec<Song>,
    pub albums: Vec<serde_json::Value>,
    pub artists: Vec<serde_json::Value>,
}

/// A lightweight artist record for the by-language listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artist {
    pub id: String,
    pub name: String,
    #[serde(default, rename = "imageUrls", skip_serializing_if = "Vec::is_empty")]
    pub image_urls: Vec<QualityUrl>,
}

// =============================================================================
// Raw primary payloads
// =============================================================================

#[derive(Debug, Deserialize)]
pub(crate) struct RawPrimaryPage {
    #[serde(default)]
    pub start: u32,
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub results: Vec<RawPrimarySong>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawPrimarySong {
    pub id: Option<String>,
    pub name: Option<String>,
    pub language: Option<String>,
    pub year: Option<serde_json::Value>,
    pub duration: Option<serde_json::Value>,
    #[serde(rename = "playCount")]
    pub play_count: Option<serde_json::Value>,
    pub album: Option<RawAlbumRef>,
    pub artists: Option<RawPrimaryArtists>,
    #[serde(default)]
    pub image: Vec<RawQualityUrl>,
    #[serde(default, rename = "downloadUrl")]
    pub download_url: Vec<RawQualityUrl>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawAlbumRef {
    pub id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawPrimaryArtists {
    #[serde(default)]
    pub primary: Vec<RawArtistRef>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawArtistRef {
    pub id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawQualityUrl {
    pub quality: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawBroadPayload {
    #[serde(default)]
    pub songs: RawBroadSection,
    #[serde(default)]
    pub albums: RawBroadValueSection,
    #[serde(default)]
    pub artists: RawBroadValueSection,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawBroadSection {
    #[serde(default)]
    pub results: Vec<RawPrimarySong>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawBroadValueSection {
    #[serde(default)]
    pub results: Vec<serde_json::Value>,
}

// =============================================================================
// Raw fallback payload
// =============================================================================

/// One record of the fallback provider's flat result array.
#[derive(Debug, Deserialize)]
pub(crate) struct RawFallbackSong {
    pub id: Option<String>,
    pub song: Option<String>,
    pub language: Option<String>,
    #[serde(rename = "primary_artists")]
    pub primary_artists: Option<String>,
    #[serde(rename = "media_url")]
    pub media_url: Option<String>,
    pub image: Option<String>,
    pub albumid: Option<String>,
    pub album: Option<String>,
    pub year: Option<serde_json::Value>,
    pub duration: Option<serde_json::Value>,
    pub genre: Option<String>,
}

fn value_to_i64(value: &Option<serde_json::Value>) -> Option<i64> {
    match value {
        Some(serde_json::Value::Number(n)) => n.as_i64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_to_f64(value: &Option<serde_json::Value>) -> Option<f64> {
    match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl Song {
    /// Normalize a primary-provider record. Returns `None` when the
    /// record is missing an id or a name.
    pub(crate) fn from_primary(raw: RawPrimarySong) -> Option<Song> {
        let id = non_empty(raw.id)?;
        let name = non_empty(raw.name)?;

        let album = raw
            .album
            .map(|a| AlbumRef {
                id: a.id.unwrap_or_default(),
                name: a.name.unwrap_or_default(),
            })
            .unwrap_or_default();

        let primary = raw
            .artists
            .map(|a| a.primary)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|a| {
                let name = non_empty(a.name)?;
                Some(ArtistRef {
                    id: a.id.unwrap_or_default(),
                    name,
                })
            })
            .collect();

        let map_urls = |raw: Vec<RawQualityUrl>| -> Vec<QualityUrl> {
            raw.into_iter()
                .filter_map(|u| {
                    let url = non_empty(u.url)?;
                    Some(QualityUrl {
                        quality: u.quality.unwrap_or_default(),
                        url,
                    })
                })
                .collect()
        };

        Some(Song {
            id,
            name,
            language: raw.language.unwrap_or_default().to_lowercase(),
            album,
            artists: Artists { primary },
            image_urls: map_urls(raw.image),
            download_urls: map_urls(raw.download_url),
            year: value_to_i64(&raw.year).map(|y| y as i32),
            duration_sec: value_to_i64(&raw.duration).map(|d| d as u32),
            popularity: value_to_f64(&raw.play_count),
            genre: None,
            ranking: None,
            next_reason: None,
        })
    }

    /// Normalize a fallback-provider record. The fallback returns a flat
    /// shape with a comma-joined artist string and single stream/image
    /// URLs; quality variants are synthesized. Records missing an id or
    /// a name are dropped silently.
    pub(crate) fn from_fallback(raw: RawFallbackSong) -> Option<Song> {
        let id = non_empty(raw.id)?;
        let name = non_empty(raw.song)?;

        let primary = raw
            .primary_artists
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|name| ArtistRef {
                id: String::new(),
                name: name.to_string(),
            })
            .collect();

        let download_urls = raw
            .media_url
            .into_iter()
            .filter(|u| !u.trim().is_empty())
            .map(|url| QualityUrl {
                quality: "320kbps".to_string(),
                url,
            })
            .collect();

        // A single image URL stands in for every size the clients ask for.
        let image_urls = match non_empty(raw.image) {
            Some(url) => ["50x50", "150x150", "500x500"]
                .iter()
                .map(|quality| QualityUrl {
                    quality: quality.to_string(),
                    url: url.clone(),
                })
                .collect(),
            None => Vec::new(),
        };

        Some(Song {
            id,
            name,
            language: raw.language.unwrap_or_default().to_lowercase(),
            album: AlbumRef {
                id: raw.albumid.unwrap_or_default(),
                name: raw.album.unwrap_or_default(),
            },
            artists: Artists { primary },
            image_urls,
            download_urls,
            year: value_to_i64(&raw.year).map(|y| y as i32),
            duration_sec: value_to_i64(&raw.duration).map(|d| d as u32),
            popularity: None,
            genre: raw.genre,
            ranking: None,
            next_reason: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fallback_record(json: serde_json::Value) -> Option<Song> {
        let raw: RawFallbackSong = serde_json::from_value(json).unwrap();
        Song::from_fallback(raw)
    }

    #[test]
    fn test_fallback_normalization_maps_fields() {
        let song = fallback_record(serde_json::json!({
            "id": "f1",
            "song": "Tum Hi Ho",
            "language": "Hindi",
            "primary_artists": "Arijit Singh, Mithoon",
            "media_url": "https://cdn.example.com/f1.mp4",
            "image": "https://cdn.example.com/f1.jpg",
            "albumid": "a9",
            "album": "Aashiqui 2",
            "year": "2013"
        }))
        .unwrap();

        assert_eq!(song.id, "f1");
        assert_eq!(song.name, "Tum Hi Ho");
        assert_eq!(song.language, "hindi");
        assert_eq!(song.album.id, "a9");
        assert_eq!(song.year, Some(2013));
        assert_eq!(
            song.artist_names(),
            vec!["Arijit Singh", "Mithoon"],
            "comma-joined artists should split into primary refs"
        );
    }

    #[test]
    fn test_fallback_quality_synthesis() {
        let song = fallback_record(serde_json::json!({
            "id": "f2",
            "song": "Believer",
            "media_url": "https://cdn.example.com/f2.mp4",
            "image": "https://cdn.example.com/f2.jpg"
        }))
        .unwrap();

        assert_eq!(song.download_urls.len(), 1);
        assert_eq!(song.download_urls[0].quality, "320kbps");

        let qualities: Vec<&str> = song.image_urls.iter().map(|u| u.quality.as_str()).collect();
        assert_eq!(qualities, vec!["50x50", "150x150", "500x500"]);
        assert!(song.image_urls.iter().all(|u| u.url == song.image_urls[0].url));
    }

    #[test]
    fn test_fallback_missing_id_or_name_dropped() {
        assert!(fallback_record(serde_json::json!({"song": "No Id"})).is_none());
        assert!(fallback_record(serde_json::json!({"id": "f3"})).is_none());
        assert!(fallback_record(serde_json::json!({"id": "  ", "song": "Blank Id"})).is_none());
    }

    #[test]
    fn test_primary_normalization() {
        let raw: RawPrimarySong = serde_json::from_value(serde_json::json!({
            "id": "p1",
            "name": "Believer",
            "language": "English",
            "year": 2017,
            "duration": "204",
            "playCount": 1_500_000,
            "album": {"id": "al1", "name": "Evolve"},
            "artists": {"primary": [{"id": "ar1", "name": "Imagine Dragons"}]},
            "image": [{"quality": "500x500", "url": "https://img.example.com/p1.jpg"}],
            "downloadUrl": [{"quality": "320kbps", "url": "https://cdn.example.com/p1.mp4"}]
        }))
        .unwrap();

        let song = Song::from_primary(raw).unwrap();
        assert_eq!(song.language, "english");
        assert_eq!(song.duration_sec, Some(204));
        assert_eq!(song.popularity, Some(1_500_000.0));
        assert_eq!(song.album.name, "Evolve");
        assert_eq!(song.artists.primary[0].name, "Imagine Dragons");
    }

    #[test]
    fn test_primary_missing_name_dropped() {
        let raw: RawPrimarySong =
            serde_json::from_value(serde_json::json!({"id": "p2"})).unwrap();
        assert!(Song::from_primary(raw).is_none());
    }
}
