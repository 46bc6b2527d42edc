//! End-to-end tests for the recommendation endpoints.

mod common;

use axum::http::StatusCode;
use common::{request, song, test_app};
use serde_json::json;
use tunehub_server::catalog::{AlbumRef, ArtistRef, Artists, Song};

const TOKEN: &str = "local:u1";

async fn save_preferences(harness: &common::TestApp) {
    let (status, _) = request(
        &harness.app,
        "POST",
        "/api/user/preferences",
        Some(TOKEN),
        Some(json!({
            "languages": ["hindi"],
            "favoriteArtists": [{"id": "ar-arijit", "name": "Arijit Singh"}],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_recommendations_require_auth() {
    let harness = test_app(vec![]);
    let (status, _) = request(&harness.app, "GET", "/api/recommendations", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_recommendations_404_without_preferences() {
    let harness = test_app(vec![]);
    let (status, body) = request(
        &harness.app,
        "GET",
        "/api/recommendations",
        Some(TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("/api/user/preferences"));
}

#[tokio::test]
async fn test_recommendations_from_favorite_artist_seed() {
    let catalog = vec![
        song("k1", "Kesariya", "Arijit Singh", "hindi"),
        song("k2", "Channa Mereya", "Arijit Singh", "hindi"),
        song("e1", "Shape of You", "Ed Sheeran", "english"),
    ];
    let harness = test_app(catalog);
    save_preferences(&harness).await;

    let (status, body) = request(
        &harness.app,
        "GET",
        "/api/recommendations?limit=5",
        Some(TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));

    let songs = body["data"].as_array().unwrap();
    assert_eq!(body["count"], json!(songs.len()));
    assert!(!songs.is_empty());
    assert!(songs.len() <= 5);

    // The favorite-artist seed surfaces Arijit Singh songs; the
    // favorite-artist rule bonus keeps them ahead of anything else.
    assert_eq!(
        songs[0]["artists"]["primary"][0]["name"],
        json!("Arijit Singh")
    );

    // Unique ids.
    let mut ids: Vec<&str> = songs.iter().map(|s| s["id"].as_str().unwrap()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), songs.len());
}

#[tokio::test]
async fn test_recommendations_exclude_recently_skipped() {
    let catalog = vec![
        song("k1", "Kesariya", "Arijit Singh", "hindi"),
        song("k2", "Channa Mereya", "Arijit Singh", "hindi"),
    ];
    let harness = test_app(catalog);
    save_preferences(&harness).await;

    let (status, _) = request(
        &harness.app,
        "POST",
        "/api/activity/skip",
        Some(TOKEN),
        Some(json!({"songId": "k1", "artist": "Arijit Singh", "language": "hindi"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = request(
        &harness.app,
        "GET",
        "/api/recommendations",
        Some(TOKEN),
        None,
    )
    .await;
    let songs = body["data"].as_array().unwrap();
    let first = songs.first().unwrap();
    assert_eq!(
        first["id"],
        json!("k2"),
        "the -100 skip penalty must push the skipped song below the rest"
    );
}

fn next_candidate(
    id: &str,
    name: &str,
    album_id: &str,
    artist_id: &str,
    artist_name: &str,
    language: &str,
) -> Song {
    Song {
        id: id.into(),
        name: name.into(),
        language: language.into(),
        album: AlbumRef {
            id: album_id.into(),
            // Every candidate mentions the language in its album so the
            // generic language seeds can match it.
            name: "Hindi Top Hits".into(),
        },
        artists: Artists {
            primary: vec![ArtistRef {
                id: artist_id.into(),
                name: artist_name.into(),
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

#[tokio::test]
async fn test_next_track_requires_current_song() {
    let harness = test_app(vec![]);
    let (status, _) = request(
        &harness.app,
        "POST",
        "/api/recommendations/next",
        Some(TOKEN),
        Some(json!({"limit": 5})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_next_track_hard_filters() {
    // The current song S1 is hindi, album A1, artist X. S2 was recently
    // played. Only S6 differs in every constrained dimension.
    let catalog = vec![
        next_candidate("S2", "Pal Pal", "B1", "Y", "Other Artist", "hindi"),
        next_candidate("S3", "Sunn Raha Hai", "A1", "Y2", "Ankit Tiwari", "hindi"),
        next_candidate("S4", "Kesariya", "B2", "X", "Arijit Singh", "hindi"),
        next_candidate("S5", "Vaathi Coming", "B3", "Z", "Anirudh", "tamil"),
        next_candidate("S6", "Raataan Lambiyan", "B7", "U", "Tanishk Bagchi", "hindi"),
        next_candidate("S7", "Tum Hi Ho (Lofi Remix)", "B5", "W", "Remix Artist", "hindi"),
    ];
    let harness = test_app(catalog);

    // S2 enters the recent-exclusion set.
    let (status, _) = request(
        &harness.app,
        "POST",
        "/api/activity/play",
        Some(TOKEN),
        Some(json!({"songId": "S2", "artist": "Other Artist", "language": "hindi"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = request(
        &harness.app,
        "POST",
        "/api/recommendations/next",
        Some(TOKEN),
        Some(json!({
            "currentSong": {
                "id": "S1",
                "name": "Tum Hi Ho",
                "language": "hindi",
                "album": {"id": "A1", "name": "Aashiqui 2"},
                "artists": {"primary": [{"id": "X", "name": "Arijit Singh"}]},
            },
            "limit": 10,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let songs = body["data"].as_array().unwrap();
    let ids: Vec<&str> = songs.iter().map(|s| s["id"].as_str().unwrap()).collect();
    assert_eq!(
        ids,
        vec!["S6"],
        "every other candidate violates a hard filter"
    );
    assert!(songs[0].get("_nextReason").is_some());
}

#[tokio::test]
async fn test_next_track_limit_clamped() {
    let catalog: Vec<Song> = (0..30)
        .map(|i| {
            next_candidate(
                &format!("N{i}"),
                &format!("Song Number {i}"),
                &format!("B{i}"),
                &format!("AR{i}"),
                &format!("Artist {i}"),
                "hindi",
            )
        })
        .collect();
    let harness = test_app(catalog);

    let (status, body) = request(
        &harness.app,
        "POST",
        "/api/recommendations/next",
        Some(TOKEN),
        Some(json!({
            "currentSong": {"id": "S1", "name": "Tum Hi Ho", "language": "hindi"},
            "limit": 50,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].as_array().unwrap().len() <= 20);
}
