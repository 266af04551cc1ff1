//! Activity feed over the in-memory backend: ordering independent of insertion
//! order, scoping, paging, and concurrent readers.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use rand::seq::SliceRandom;

use fleetwatch::activity::{
    ActivityAction, ActivityDetails, ActivityFeed, ActivityLogRepository, ActivityRecorder, FeedScope, NewActivity,
    PageRequest,
};
use fleetwatch::error::FeedError;
use fleetwatch::identity::{Identity, NewProfile, ProfileRepository, Role};
use fleetwatch::storage::MemoryBackend;

const EPOCH: i64 = 1_700_000_000;

fn at(secs: i64) -> DateTime<Utc> { DateTime::<Utc>::from_timestamp(EPOCH + secs, 0).unwrap() }

fn event(user: &str, secs: i64) -> NewActivity {
    NewActivity::new(ActivityAction::Update, Identity::new(user), ActivityDetails::entity("Vehicle").with("n", secs))
        .at(at(secs))
}

fn secs_of(rows: &[fleetwatch::activity::ActivityLogEntry]) -> Vec<i64> {
    rows.iter().map(|e| e.timestamp.timestamp() - EPOCH).collect()
}

/// Events for `users` round-robin at 1s apart, stored in random order.
async fn shuffled_log(users: &[&str], count: i64) -> Result<MemoryBackend> {
    let db = MemoryBackend::new();
    let mut events: Vec<NewActivity> = (0..count).map(|i| event(users[i as usize % users.len()], i)).collect();
    events.shuffle(&mut rand::thread_rng());
    for e in events {
        ActivityLogRepository::insert(&db, e).await?;
    }
    Ok(db)
}

#[tokio::test]
async fn feed_order_follows_event_time_not_insertion_order() -> Result<()> {
    let db = shuffled_log(&["a", "b", "c"], 30).await?;
    let feed = ActivityFeed::new(Arc::new(db));
    let rows = feed.list_page(Role::Admin, &Identity::new("a"), FeedScope::Admin, PageRequest::new(1, 30)).await?;
    let expected: Vec<i64> = (0..30).rev().collect();
    assert_eq!(secs_of(&rows), expected);
    Ok(())
}

#[tokio::test]
async fn walking_every_page_visits_each_entry_once() -> Result<()> {
    let db = shuffled_log(&["a", "b"], 23).await?;
    let feed = ActivityFeed::new(Arc::new(db));
    let viewer = Identity::new("a");

    let mut seen = Vec::new();
    let mut page = PageRequest::first(4);
    loop {
        let rows = feed.list_page(Role::Admin, &viewer, FeedScope::Admin, page).await?;
        assert!(rows.len() <= 4);
        if rows.is_empty() {
            break;
        }
        seen.extend(secs_of(&rows));
        page = page.next();
    }
    assert_eq!(page.page, 7);
    assert_eq!(seen, (0..23).rev().collect::<Vec<_>>());
    Ok(())
}

#[tokio::test]
async fn non_admin_asking_for_everything_still_gets_only_their_own() -> Result<()> {
    let db = shuffled_log(&["a", "b", "c"], 21).await?;
    let feed = ActivityFeed::new(Arc::new(db));
    let viewer = Identity::new("b");
    let rows = feed.list_page(Role::User, &viewer, FeedScope::Admin, PageRequest::new(1, 100)).await?;
    assert_eq!(rows.len(), 7);
    assert!(rows.iter().all(|e| e.user_id == viewer));
    assert_eq!(secs_of(&rows), vec![19, 16, 13, 10, 7, 4, 1]);
    Ok(())
}

#[tokio::test]
async fn admin_own_scope_skips_other_actors_entirely() -> Result<()> {
    let db = MemoryBackend::new();
    for i in 0..7 {
        ActivityLogRepository::insert(&db, event("admin", i * 10)).await?;
    }
    for i in 0..3 {
        ActivityLogRepository::insert(&db, event("other", i * 10 + 5)).await?;
    }
    let feed = ActivityFeed::new(Arc::new(db));
    let me = Identity::new("admin");
    let first = feed.list_page(Role::Admin, &me, FeedScope::User, PageRequest::new(1, 5)).await?;
    assert_eq!(secs_of(&first), vec![60, 50, 40, 30, 20]);
    let second = feed.list_page(Role::Admin, &me, FeedScope::User, PageRequest::new(2, 5)).await?;
    assert_eq!(secs_of(&second), vec![10, 0]);

    let everyone = feed.list_page(Role::Admin, &me, FeedScope::Admin, PageRequest::new(1, 5)).await?;
    assert_eq!(secs_of(&everyone), vec![60, 50, 40, 30, 25]);
    Ok(())
}

#[tokio::test]
async fn invalid_pages_are_rejected_before_querying() -> Result<()> {
    let feed = ActivityFeed::new(Arc::new(MemoryBackend::new()));
    let me = Identity::new("a");
    let err = feed.list_page(Role::Admin, &me, FeedScope::Admin, PageRequest::new(0, 10)).await.unwrap_err();
    assert!(matches!(err, FeedError::InvalidPage { page: 0, page_size: 10 }));
    let err = feed.list_page(Role::User, &me, FeedScope::User, PageRequest::new(1, 0)).await.unwrap_err();
    assert!(matches!(err, FeedError::InvalidPage { .. }));
    Ok(())
}

#[tokio::test]
async fn concurrent_readers_and_writers_see_consistent_pages() -> Result<()> {
    let db = MemoryBackend::new();
    let recorder = ActivityRecorder::new(Arc::new(db.clone()));
    let feed = ActivityFeed::new(Arc::new(db.clone()));

    let writes = (0..40).map(|i| {
        let recorder = recorder.clone();
        async move { recorder.record(event(if i % 2 == 0 { "a" } else { "b" }, i)).await }
    });
    assert!(join_all(writes).await.into_iter().all(|ok| ok));
    assert_eq!(db.activity_count(), 40);

    let viewer = Identity::new("a");
    let reads = (1..=5u32).map(|page| {
        let feed = feed.clone();
        let viewer = viewer.clone();
        async move { feed.list_page(Role::User, &viewer, FeedScope::User, PageRequest::new(page, 4)).await }
    });
    let pages = join_all(reads).await.into_iter().collect::<Result<Vec<_>, _>>()?;
    let all: Vec<i64> = pages.iter().flat_map(|p| secs_of(p)).collect();
    assert_eq!(all, (0..40).rev().filter(|s| s % 2 == 0).collect::<Vec<_>>());
    let unique: HashSet<i64> = all.iter().copied().collect();
    assert_eq!(unique.len(), 20);
    Ok(())
}

#[tokio::test]
async fn admin_feed_carries_actor_names() -> Result<()> {
    let db = MemoryBackend::new();
    for (id, name) in [("a", "Ann"), ("b", "Bob")] {
        let row = NewProfile { id: Identity::new(id), name: name.into(), email: format!("{}@x.com", id), role: Role::User };
        ProfileRepository::insert(&db, row).await?;
    }
    ActivityLogRepository::insert(&db, event("a", 1)).await?;
    ActivityLogRepository::insert(&db, event("b", 2)).await?;
    ActivityLogRepository::insert(&db, event("ghost", 3)).await?;

    let feed = ActivityFeed::new(Arc::new(db.clone())).with_profiles(Arc::new(db));
    let admin = Identity::new("root");
    let items = feed.list_page_annotated(Role::Admin, &admin, FeedScope::Admin, PageRequest::new(1, 10)).await?;
    let names: Vec<Option<String>> = items.iter().map(|i| i.actor.as_ref().map(|a| a.name.clone())).collect();
    assert_eq!(names, vec![None, Some("Bob".to_string()), Some("Ann".to_string())]);

    let mine = feed.list_page_annotated(Role::User, &Identity::new("a"), FeedScope::Admin, PageRequest::new(1, 10)).await?;
    assert_eq!(mine.len(), 1);
    assert!(mine[0].actor.is_none());
    Ok(())
}
