//! Public listening surface: today's meditation, signed audio links, health.

mod common;

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use uuid::Uuid;

use meditations::meditation::{Meditation, day_index};
use meditations::server::bootstrap::MemoryBackends;
use meditations::storage::ObjectStore;

fn published(title: &str, path: &str, created_at: DateTime<Utc>) -> Meditation {
    Meditation {
        id: Uuid::new_v4(),
        title: title.to_string(),
        quote: Some("Be still.".into()),
        tags: vec!["calm".into()],
        transcription: None,
        storage_path: path.to_string(),
        mime_type: "audio/mpeg".into(),
        published: true,
        created_at,
    }
}

async fn seed_object(mem: &MemoryBackends, path: &str) -> Result<()> {
    mem.objects.upload(path, b"ID3fake".to_vec(), "audio/mpeg").await?;
    Ok(())
}

#[tokio::test]
async fn healthz() -> Result<()> {
    let srv = common::spawn().await;
    let resp = srv.http.get(srv.url("/healthz")).send().await?;
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await?, "ok");
    Ok(())
}

#[tokio::test]
async fn empty_library_has_no_meditation_today() -> Result<()> {
    let srv = common::spawn().await;
    let today: Value = srv.http.get(srv.url("/api/today")).send().await?.json().await?;
    assert!(today["meditation"].is_null());
    assert!(today["day"].as_i64().is_some());
    let page = srv.http.get(srv.url("/")).send().await?.text().await?;
    assert!(page.contains("No meditation for today yet"));
    Ok(())
}

#[tokio::test]
async fn today_follows_the_daily_rotation() -> Result<()> {
    let srv = common::spawn().await;
    let mut rows = Vec::new();
    for i in 0..3i64 {
        let path = format!("audio/{i}-seed.mp3");
        seed_object(&srv.mem, &path).await?;
        let created = Utc.timestamp_opt(1_700_000_000 + i, 0).unwrap();
        let row = published(&format!("Seed {i}"), &path, created);
        srv.mem.meditations.seed(row.clone());
        rows.push(row);
    }
    // A draft never takes a slot.
    srv.mem.meditations.seed(Meditation {
        published: false,
        ..published("Draft", "audio/draft.mp3", Utc.timestamp_opt(1_600_000_000, 0).unwrap())
    });

    let today: Value = srv.http.get(srv.url("/api/today")).send().await?.json().await?;
    let day = today["day"].as_i64().unwrap();
    assert_eq!(day, day_index(Utc::now()));
    let expected = &rows[day.rem_euclid(3) as usize];
    assert_eq!(today["meditation"]["id"], expected.id.to_string());

    let page = srv.http.get(srv.url("/")).send().await?.text().await?;
    assert!(page.contains(&expected.title));
    assert!(page.contains("/storage/signed/"));
    // Player labels start at zero with an unknown duration.
    assert!(page.contains(r#"<span class="elapsed">0:00</span> / <span class="total">--:--</span>"#));
    Ok(())
}

#[tokio::test]
async fn signed_links_serve_audio_until_revoked() -> Result<()> {
    let srv = common::spawn().await;
    let path = "audio/1-link.mp3";
    seed_object(&srv.mem, path).await?;
    let row = published("Linked", path, Utc::now());
    srv.mem.meditations.seed(row);

    let today: Value = srv.http.get(srv.url("/api/today")).send().await?.json().await?;
    let link = today["meditation"]["audio_url"].as_str().unwrap().to_string();
    let ok = srv.http.get(&link).send().await?;
    assert_eq!(ok.status(), 200);
    assert!(ok.headers().contains_key("etag"));

    srv.mem.objects.remove(path).await?;
    let revoked = srv.http.get(&link).send().await?;
    assert_eq!(revoked.status(), 404);

    let bogus = srv.http.get(srv.url(&format!("/storage/signed/{}", Uuid::new_v4()))).send().await?;
    assert_eq!(bogus.status(), 404);
    Ok(())
}
