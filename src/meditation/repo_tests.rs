use super::*;
use crate::storage::memory::{MemoryMeditationStore, MemoryObjectStore};
use chrono::TimeZone;

struct Fixture {
    store: Arc<MemoryMeditationStore>,
    objects: Arc<MemoryObjectStore>,
    repo: MeditationRepository,
}

fn fixture() -> Fixture {
    let store = Arc::new(MemoryMeditationStore::new());
    let objects = Arc::new(MemoryObjectStore::new("http://localhost:8080"));
    let repo = MeditationRepository::new(store.clone(), objects.clone(), Duration::from_secs(3600));
    Fixture { store, objects, repo }
}

fn upload(title: &str, mime: &str) -> UploadRequest {
    UploadRequest {
        title: Some(title.to_string()),
        quote: Some("  breathe  ".into()),
        tags: Some("calm, sleep ,calm".into()),
        file: Some(AudioUpload { file_name: Some("clip.MP3".into()), content_type: mime.into(), bytes: vec![1, 2, 3] }),
    }
}

#[test]
fn upload_requires_title_and_file() {
    let mut req = upload("   ", "audio/mpeg");
    let err = req.clone().validate().unwrap_err();
    assert_eq!(err.message(), "Title and audio file are required");
    req.title = Some("ok".into());
    req.file = None;
    assert_eq!(req.validate().unwrap_err().http_status(), 400);
}

#[test]
fn upload_rejects_unlisted_mime() {
    let err = upload("t", "video/mp4").validate().unwrap_err();
    assert_eq!(err.http_status(), 400);
    assert!(err.message().starts_with("Invalid audio type: video/mp4. Allowed: audio/mpeg"));
}

#[test]
fn upload_normalizes_fields() {
    let v = upload("  Morning  ", "audio/mpeg").validate().unwrap();
    assert_eq!(v.title, "Morning");
    assert_eq!(v.quote.as_deref(), Some("breathe"));
    assert_eq!(v.tags, vec!["calm", "sleep"]);
}

#[tokio::test]
async fn create_writes_object_then_unpublished_row() {
    let f = fixture();
    let m = f.repo.create(upload("Morning", "audio/mpeg").validate().unwrap(), 1_700_000_000_000).await.unwrap();
    assert!(!m.published);
    assert!(m.storage_path.starts_with("audio/1700000000000-"));
    assert!(m.storage_path.ends_with(".mp3"));
    assert!(f.objects.contains(&m.storage_path));
    assert_eq!(f.store.len(), 1);
}

#[tokio::test]
async fn failed_upload_writes_nothing() {
    let f = fixture();
    f.objects.set_fail_uploads(true);
    let err = f.repo.create(upload("t", "audio/mpeg").validate().unwrap(), 1).await.unwrap_err();
    assert_eq!(err.http_status(), 500);
    assert_eq!(err.message(), "bucket rejected upload");
    assert!(f.store.is_empty());
    assert_eq!(f.objects.object_count(), 0);
}

#[tokio::test]
async fn failed_insert_leaves_orphaned_object() {
    let f = fixture();
    f.store.set_fail_inserts(true);
    let err = f.repo.create(upload("t", "audio/mpeg").validate().unwrap(), 1).await.unwrap_err();
    assert_eq!(err.http_status(), 500);
    assert!(f.store.is_empty());
    assert_eq!(f.objects.object_count(), 1);
}

#[test]
fn empty_patch_is_rejected() {
    let err = MeditationPatch::default().into_changes().unwrap_err();
    assert_eq!(err.http_status(), 400);
    assert_eq!(err.message(), "Nothing to update");
}

#[test]
fn patch_rejects_unknown_fields_and_blank_title() {
    assert!(serde_json::from_str::<MeditationPatch>(r#"{"storage_path":"x"}"#).is_err());
    assert!(serde_json::from_str::<MeditationPatch>(r#"{"title":5}"#).is_err());
    let p: MeditationPatch = serde_json::from_str(r#"{"title":"  "}"#).unwrap();
    assert_eq!(p.into_changes().unwrap_err().http_status(), 400);
}

#[test]
fn patch_accepts_tag_list_or_csv_and_clears_with_empty_text() {
    let p: MeditationPatch = serde_json::from_str(r#"{"tags":[" a","b","a"],"quote":""}"#).unwrap();
    let ch = p.into_changes().unwrap();
    assert_eq!(ch.tags, Some(vec!["a".to_string(), "b".to_string()]));
    assert_eq!(ch.quote, Some(None));
    let p: MeditationPatch = serde_json::from_str(r#"{"tags":"x, y","published":true}"#).unwrap();
    let ch = p.into_changes().unwrap();
    assert_eq!(ch.tags, Some(vec!["x".to_string(), "y".to_string()]));
    assert_eq!(ch.published, Some(true));
}

#[tokio::test]
async fn update_missing_is_not_found() {
    let f = fixture();
    let ch = MeditationChanges { title: Some("x".into()), ..Default::default() };
    assert_eq!(f.repo.update(Uuid::new_v4(), &ch).await.unwrap_err().http_status(), 404);
}

#[tokio::test]
async fn delete_missing_touches_nothing() {
    let f = fixture();
    let m = f.repo.create(upload("t", "audio/mpeg").validate().unwrap(), 1).await.unwrap();
    let err = f.repo.delete(Uuid::new_v4()).await.unwrap_err();
    assert_eq!(err.http_status(), 404);
    assert!(f.objects.contains(&m.storage_path));
    assert_eq!(f.store.len(), 1);
}

#[tokio::test]
async fn delete_stops_when_object_removal_fails() {
    let f = fixture();
    let m = f.repo.create(upload("t", "audio/mpeg").validate().unwrap(), 1).await.unwrap();
    f.objects.set_fail_removes(true);
    assert_eq!(f.repo.delete(m.id).await.unwrap_err().http_status(), 500);
    assert_eq!(f.store.len(), 1);
    f.objects.set_fail_removes(false);
    f.repo.delete(m.id).await.unwrap();
    assert!(f.store.is_empty());
    assert!(!f.objects.contains(&m.storage_path));
}

#[tokio::test]
async fn today_rotates_over_published_rows() {
    let f = fixture();
    assert!(f.repo.today(Utc::now()).await.unwrap().1.is_none());
    let mut ids = Vec::new();
    for i in 0..3 {
        let m = f.repo.create(upload(&format!("m{i}"), "audio/mpeg").validate().unwrap(), i).await.unwrap();
        let publish = MeditationChanges { published: Some(true), ..Default::default() };
        f.repo.update(m.id, &publish).await.unwrap();
        ids.push(m.id);
    }
    let now = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
    let (day, pick) = f.repo.today(now).await.unwrap();
    let pick = pick.unwrap();
    assert_eq!(pick.meditation.id, ids[day.rem_euclid(3) as usize]);
    assert!(pick.audio_url.unwrap().starts_with("http://localhost:8080/storage/signed/"));

    let sched = f.repo.schedule(now, 3).await.unwrap();
    let mut seen: Vec<Uuid> = sched.iter().map(|e| e.meditation.meditation.id).collect();
    seen.sort();
    ids.sort();
    assert_eq!(seen, ids);
}

#[tokio::test]
async fn unpublished_rows_never_rotate() {
    let f = fixture();
    f.repo.create(upload("draft", "audio/mpeg").validate().unwrap(), 1).await.unwrap();
    assert!(f.repo.today(Utc::now()).await.unwrap().1.is_none());
    assert!(f.repo.schedule(Utc::now(), 7).await.unwrap().is_empty());
    assert_eq!(f.repo.list(false).await.unwrap().len(), 1);
}
