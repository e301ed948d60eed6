use super::*;
use chrono::TimeZone;
use uuid::Uuid;

fn med(title: &str, tags: &[&str], secs: i64) -> Meditation {
    Meditation {
        id: Uuid::new_v4(),
        title: title.to_string(),
        quote: None,
        tags: tags.iter().map(|t| t.to_string()).collect(),
        transcription: None,
        storage_path: format!("audio/{secs}-x.mp3"),
        mime_type: "audio/mpeg".into(),
        published: true,
        created_at: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
    }
}

fn sample() -> Vec<Meditation> {
    vec![
        med("Morning Light", &["calm", "morning"], 1),
        med("Evening Calm", &["calm", "evening"], 2),
        med("Deep Sleep", &["sleep"], 3),
        med("Light Breath", &["breath", "calm"], 4),
    ]
}

fn titles(v: &[&Meditation]) -> Vec<String> { v.iter().map(|m| m.title.clone()).collect() }

#[test]
fn default_query_keeps_everything_newest_first() {
    let items = sample();
    let q = ListQuery::default();
    assert!(!q.is_filtering());
    assert_eq!(titles(&q.apply(&items)), vec!["Light Breath", "Deep Sleep", "Evening Calm", "Morning Light"]);
}

#[test]
fn search_is_case_insensitive_substring() {
    let items = sample();
    let q = ListQuery { search: "LIGHT".into(), sort: SortOrder::Oldest, ..Default::default() };
    assert_eq!(titles(&q.apply(&items)), vec!["Morning Light", "Light Breath"]);
}

#[test]
fn tag_filter_is_conjunctive() {
    let items = sample();
    let mut q = ListQuery::default();
    q.toggle_tag("calm");
    assert_eq!(q.apply(&items).len(), 3);
    q.toggle_tag("morning");
    assert_eq!(titles(&q.apply(&items)), vec!["Morning Light"]);
    q.toggle_tag("sleep");
    assert!(q.apply(&items).is_empty());
}

#[test]
fn toggling_a_tag_twice_unselects_it() {
    let mut q = ListQuery::default();
    q.toggle_tag("calm");
    q.toggle_tag("calm");
    assert!(q.tags.is_empty());
}

#[test]
fn sort_toggle_strictly_reverses_distinct_timestamps() {
    let items = sample();
    let mut q = ListQuery::default();
    let newest = titles(&q.apply(&items));
    q.toggle_sort();
    let mut oldest = titles(&q.apply(&items));
    oldest.reverse();
    assert_eq!(newest, oldest);
    q.toggle_sort();
    assert_eq!(q.sort, SortOrder::Newest);
}

#[test]
fn tag_universe_is_sorted_and_unique() {
    assert_eq!(tag_universe(&sample()), vec!["breath", "calm", "evening", "morning", "sleep"]);
    let none: Vec<Meditation> = vec![];
    assert!(tag_universe(&none).is_empty());
}

#[test]
fn sort_order_parses_aliases() {
    assert_eq!(SortOrder::parse("Oldest"), Some(SortOrder::Oldest));
    assert_eq!(SortOrder::parse("desc"), Some(SortOrder::Newest));
    assert_eq!(SortOrder::parse("sideways"), None);
}

#[test]
fn views_filter_like_rows() {
    let views: Vec<MeditationView> = sample()
        .into_iter()
        .map(|m| MeditationView { meditation: m, audio_url: None })
        .collect();
    let q = ListQuery { search: "sleep".into(), ..Default::default() };
    assert_eq!(q.apply(&views).len(), 1);
}
