//! `/api/search`: validation, language resolution, smart search,
//! optional rerank, and response shaping.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::auth::Session;
use super::error::ApiError;
use super::state::AppState;
use crate::catalog::{QualityUrl, Song};
use crate::ranking::RerankOptions;
use crate::search::SearchOptions;

const MIN_LIMIT: usize = 10;
const MAX_LIMIT: usize = 20;
const MAX_BUCKET_ITEMS: usize = 10;

#[derive(Debug, Deserialize)]
struct SearchParams {
    query: Option<String>,
    page: Option<u32>,
    limit: Option<usize>,
    /// Comma-separated language names.
    languages: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AlbumSummary {
    id: String,
    name: String,
    language: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    image_urls: Vec<QualityUrl>,
}

#[derive(Debug, Serialize)]
struct ArtistSummary {
    id: String,
    name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AlbumLanguageSection {
    language: String,
    albums: Vec<AlbumSummary>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Section {
    title: String,
    song_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchData {
    songs: Vec<Song>,
    albums: Vec<AlbumSummary>,
    artists: Vec<ArtistSummary>,
    top_result: Option<Song>,
    related_languages: Vec<String>,
    album_language_sections: Vec<AlbumLanguageSection>,
    sections: Vec<Section>,
}

#[derive(Debug, Serialize)]
struct SearchResponse {
    success: bool,
    data: SearchData,
}

fn parse_languages(raw: Option<&str>) -> Vec<String> {
    raw.map(|csv| {
        csv.split(',')
            .map(|l| l.trim().to_lowercase())
            .filter(|l| !l.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

/// Stable partition: songs in a preferred language first, everything
/// else after, relative order untouched on both sides.
fn prioritize_languages(songs: Vec<Song>, preferred: &[String]) -> Vec<Song> {
    if preferred.is_empty() {
        return songs;
    }
    let (mut matching, other): (Vec<Song>, Vec<Song>) = songs
        .into_iter()
        .partition(|s| preferred.contains(&s.language.to_lowercase()));
    matching.extend(other);
    matching
}

fn build_response(songs: Vec<Song>, limit: usize) -> SearchData {
    let songs: Vec<Song> = songs.into_iter().take(limit).collect();
    let top_result = songs.first().cloned();

    let mut albums: Vec<AlbumSummary> = Vec::new();
    let mut artists: Vec<ArtistSummary> = Vec::new();
    for song in &songs {
        if !song.album.id.is_empty()
            && !albums.iter().any(|a| a.id == song.album.id)
            && albums.len() < MAX_BUCKET_ITEMS
        {
            albums.push(AlbumSummary {
                id: song.album.id.clone(),
                name: song.album.name.clone(),
                language: song.language.clone(),
                image_urls: song.image_urls.clone(),
            });
        }
        for artist in &song.artists.primary {
            if !artist.id.is_empty()
                && !artists.iter().any(|a| a.id == artist.id)
                && artists.len() < MAX_BUCKET_ITEMS
            {
                artists.push(ArtistSummary {
                    id: artist.id.clone(),
                    name: artist.name.clone(),
                });
            }
        }
    }

    let top_language = top_result
        .as_ref()
        .map(|s| s.language.to_lowercase())
        .unwrap_or_default();
    let mut related_languages: Vec<String> = Vec::new();
    for song in &songs {
        let language = song.language.to_lowercase();
        if !language.is_empty()
            && language != top_language
            && !related_languages.contains(&language)
        {
            related_languages.push(language);
        }
    }

    let album_language_sections: Vec<AlbumLanguageSection> = {
        let mut sections: Vec<AlbumLanguageSection> = Vec::new();
        for album in &albums {
            let language = album.language.to_lowercase();
            if language.is_empty() {
                continue;
            }
            match sections.iter_mut().find(|s| s.language == language) {
                Some(section) => section.albums.push(AlbumSummary {
                    id: album.id.clone(),
                    name: album.name.clone(),
                    language: album.language.clone(),
                    image_urls: album.image_urls.clone(),
                }),
                None => sections.push(AlbumLanguageSection {
                    language,
                    albums: vec![AlbumSummary {
                        id: album.id.clone(),
                        name: album.name.clone(),
                        language: album.language.clone(),
                        image_urls: album.image_urls.clone(),
                    }],
                }),
            }
        }
        sections
    };

    let mut sections = Vec::new();
    if let Some(top) = &top_result {
        sections.push(Section {
            title: "Top Result".to_string(),
            song_ids: vec![top.id.clone()],
        });
    }
    if !songs.is_empty() {
        sections.push(Section {
            title: "Songs".to_string(),
            song_ids: songs.iter().map(|s| s.id.clone()).collect(),
        });
    }
    for language in &related_languages {
        let ids: Vec<String> = songs
            .iter()
            .filter(|s| s.language.to_lowercase() == *language)
            .map(|s| s.id.clone())
            .collect();
        if ids.len() > 1 {
            sections.push(Section {
                title: format!("More in {language}"),
                song_ids: ids,
            });
        }
    }

    SearchData {
        songs,
        albums,
        artists,
        top_result,
        related_languages,
        album_language_sections,
        sections,
    }
}

async fn search(
    session: Option<Session>,
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let query = params
        .query
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ApiError::InvalidInput("query parameter is required".to_string()))?;

    if params.page.is_some_and(|p| p < 1) {
        return Err(ApiError::InvalidInput("page must be at least 1".to_string()));
    }
    let limit = params.limit.unwrap_or(MAX_LIMIT).clamp(MIN_LIMIT, MAX_LIMIT);

    let mut preferred = parse_languages(params.languages.as_deref());
    if preferred.is_empty() {
        if let Some(session) = &session {
            preferred = state
                .languages
                .preferred_languages(&state.profiles, session.uid())
                .await;
        }
    }

    let options = SearchOptions {
        wait_for_fresh: false,
        preferred_languages: preferred.clone(),
    };
    let songs = state.search.smart_search(query, options).await?;

    let songs = match &session {
        Some(session) => {
            let rerank_options = RerankOptions {
                query: Some(query.to_string()),
                preferred_languages: preferred.clone(),
            };
            match state
                .reranker
                .rerank(Some(session.uid()), songs.clone(), &rerank_options)
                .await
            {
                Ok(reranked) => reranked,
                Err(err) => {
                    warn!("search rerank failed for {}: {err}", session.uid());
                    songs
                }
            }
        }
        None => songs,
    };

    let songs = prioritize_languages(songs, &preferred);
    Ok(Json(SearchResponse {
        success: true,
        data: build_response(songs, limit),
    }))
}

pub fn make_search_routes(state: AppState) -> Router {
    Router::new()
        .route("/search", get(search))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AlbumRef, ArtistRef, Artists};

    fn song(id: &str, name: &str, language: &str) -> Song {
        Song {
            id: id.into(),
            name: name.into(),
            language: language.into(),
            album: AlbumRef {
                id: format!("al-{id}"),
                name: format!("Album {id}"),
            },
            artists: Artists {
                primary: vec![ArtistRef {
                    id: format!("ar-{id}"),
                    name: format!("Artist {id}"),
                }],
            },
            image_urls: vec![],
            download_urls: vec![],
            year: None,
            duration_sec: None,
            popularity: None,
            genre: None,
            ranking: None,
            next_reason: None,
        }
    }

    #[test]
    fn test_parse_languages_csv() {
        assert_eq!(
            parse_languages(Some("Hindi, English ,")),
            vec!["hindi", "english"]
        );
        assert!(parse_languages(None).is_empty());
    }

    #[test]
    fn test_prioritize_languages_keeps_relative_order() {
        let songs = vec![
            song("1", "A", "english"),
            song("2", "B", "hindi"),
            song("3", "C", "english"),
            song("4", "D", "hindi"),
        ];
        let out = prioritize_languages(songs, &["hindi".to_string()]);
        let ids: Vec<&str> = out.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "4", "1", "3"]);
    }

    #[test]
    fn test_prioritize_languages_no_match_preserves_order() {
        let songs = vec![song("1", "A", "english"), song("2", "B", "english")];
        let out = prioritize_languages(songs, &["tamil".to_string()]);
        let ids: Vec<&str> = out.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[test]
    fn test_build_response_buckets() {
        let songs = vec![
            song("1", "A", "hindi"),
            song("2", "B", "hindi"),
            song("3", "C", "english"),
        ];
        let data = build_response(songs, 20);

        assert_eq!(data.songs.len(), 3);
        assert_eq!(data.top_result.as_ref().unwrap().id, "1");
        assert_eq!(data.albums.len(), 3);
        assert_eq!(data.artists.len(), 3);
        assert_eq!(data.related_languages, vec!["english"]);
        assert!(data.sections.iter().any(|s| s.title == "Top Result"));
        assert!(data.sections.iter().any(|s| s.title == "Songs"));

        let hindi_albums = data
            .album_language_sections
            .iter()
            .find(|s| s.language == "hindi")
            .unwrap();
        assert_eq!(hindi_albums.albums.len(), 2);
    }

    #[test]
    fn test_build_response_respects_limit() {
        let songs: Vec<Song> = (0..30).map(|i| song(&i.to_string(), "S", "hindi")).collect();
        let data = build_response(songs, 20);
        assert_eq!(data.songs.len(), 20);
    }
}
