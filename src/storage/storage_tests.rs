use super::*;
use crate::activity::{ActivityAction, ActivityDetails};
use crate::fleet::VehicleType;
use crate::identity::{LocalSessionStore, Role, SessionStore};

fn new_profile(id: &str, role: Role) -> NewProfile {
    NewProfile { id: Identity::new(id), name: id.to_uppercase(), email: format!("{}@x.com", id), role }
}

fn event(user: &str, secs: i64) -> NewActivity {
    let ts = DateTime::<Utc>::from_timestamp(1_700_000_000 + secs, 0).unwrap();
    NewActivity::new(ActivityAction::Update, Identity::new(user), ActivityDetails::entity("Vehicle")).at(ts)
}

#[tokio::test]
async fn activity_query_orders_windows_and_filters() {
    let db = MemoryBackend::new();
    for (user, secs) in [("a", 5), ("b", 1), ("a", 9), ("a", 2), ("b", 7)] {
        ActivityLogRepository::insert(&db, event(user, secs)).await.unwrap();
    }
    let all = db.query(&ActivityQuery { offset: 0, limit: 10, user_id: None }).await.unwrap();
    let secs: Vec<i64> = all.iter().map(|e| e.timestamp.timestamp() - 1_700_000_000).collect();
    assert_eq!(secs, vec![9, 7, 5, 2, 1]);

    let window = db.query(&ActivityQuery { offset: 1, limit: 2, user_id: None }).await.unwrap();
    assert_eq!(window, all[1..3].to_vec());

    let only_a = db.query(&ActivityQuery { offset: 0, limit: 10, user_id: Some(Identity::new("a")) }).await.unwrap();
    assert_eq!(only_a.len(), 3);
    assert!(only_a.iter().all(|e| e.user_id.as_str() == "a"));

    let past_end = db.query(&ActivityQuery { offset: 50, limit: 10, user_id: None }).await.unwrap();
    assert!(past_end.is_empty());
}

#[tokio::test]
async fn equal_timestamps_come_back_newest_insert_first() {
    let db = MemoryBackend::new();
    ActivityLogRepository::insert(&db, event("first", 3)).await.unwrap();
    ActivityLogRepository::insert(&db, event("second", 3)).await.unwrap();
    let rows = db.query(&ActivityQuery { offset: 0, limit: 10, user_id: None }).await.unwrap();
    assert_eq!(rows[0].user_id.as_str(), "second");
    assert_eq!(rows[1].user_id.as_str(), "first");
}

#[tokio::test]
async fn duplicate_profile_insert_is_rejected() {
    let db = MemoryBackend::new();
    ProfileRepository::insert(&db, new_profile("a", Role::User)).await.unwrap();
    let err = ProfileRepository::insert(&db, new_profile("a", Role::Admin)).await.unwrap_err();
    assert!(matches!(err, BackendError::AlreadyExists(_)));
    assert_eq!(db.profile_count(), 1);
}

#[tokio::test]
async fn profile_update_applies_only_given_columns() {
    let db = MemoryBackend::new();
    ProfileRepository::insert(&db, new_profile("a", Role::User)).await.unwrap();
    let changes = ProfileChanges { name: Some("Alice".into()), ..ProfileChanges::default() };
    let row = ProfileRepository::update(&db, &Identity::new("a"), changes).await.unwrap();
    assert_eq!(row.name, "Alice");
    assert_eq!(row.email, "a@x.com");
    assert_eq!(row.role, Role::User);

    let missing = ProfileRepository::update(&db, &Identity::new("zz"), ProfileChanges::default()).await;
    assert!(matches!(missing, Err(BackendError::NotFound(_))));
}

#[tokio::test]
async fn deleting_a_profile_cascades_to_its_vehicles() {
    let db = MemoryBackend::new();
    ProfileRepository::insert(&db, new_profile("a", Role::User)).await.unwrap();
    ProfileRepository::insert(&db, new_profile("b", Role::User)).await.unwrap();
    let draft = VehicleDraft::new("Honda", "Civic", 2018, VehicleType::Sedan);
    VehicleRepository::insert(&db, &Identity::new("a"), &draft).await.unwrap();
    VehicleRepository::insert(&db, &Identity::new("a"), &draft).await.unwrap();
    VehicleRepository::insert(&db, &Identity::new("b"), &draft).await.unwrap();
    assert_eq!(db.vehicle_count(), 3);

    ProfileRepository::delete(&db, &Identity::new("a")).await.unwrap();
    assert_eq!(db.vehicle_count(), 1);
    let left = VehicleRepository::list(&db, None).await.unwrap();
    assert_eq!(left[0].user_id.as_str(), "b");
}

#[tokio::test]
async fn vehicle_insert_requires_owner_profile() {
    let db = MemoryBackend::new();
    let draft = VehicleDraft::new("Honda", "Civic", 2018, VehicleType::Sedan);
    let err = VehicleRepository::insert(&db, &Identity::new("ghost"), &draft).await.unwrap_err();
    assert!(matches!(err, BackendError::Rejected { status: 409, .. }));
}

#[tokio::test]
async fn vehicles_list_newest_first_and_by_owner() {
    let db = MemoryBackend::new();
    ProfileRepository::insert(&db, new_profile("a", Role::User)).await.unwrap();
    ProfileRepository::insert(&db, new_profile("b", Role::User)).await.unwrap();
    let a = Identity::new("a");
    let first = VehicleRepository::insert(&db, &a, &VehicleDraft::new("Ford", "Focus", 2015, VehicleType::Hatchback)).await.unwrap();
    let second = VehicleRepository::insert(&db, &a, &VehicleDraft::new("Ford", "Ranger", 2021, VehicleType::Truck)).await.unwrap();
    VehicleRepository::insert(&db, &Identity::new("b"), &VehicleDraft::new("Kia", "Rio", 2019, VehicleType::Sedan)).await.unwrap();

    let mine = VehicleRepository::list(&db, Some(&a)).await.unwrap();
    assert_eq!(mine.iter().map(|v| v.id).collect::<Vec<_>>(), vec![second.id, first.id]);
    assert_eq!(VehicleRepository::list(&db, None).await.unwrap().len(), 3);
}

#[tokio::test]
async fn seeded_admin_can_sign_in_with_admin_profile() {
    let db = MemoryBackend::new();
    let store = LocalSessionStore::default();
    let seed = AdminSeed::default();
    let id = seed_admin(&store, &db, &seed).await.unwrap();
    let profile = ProfileRepository::get_by_id(&db, &id).await.unwrap().unwrap();
    assert_eq!(profile.role, Role::Admin);
    let session = store.sign_in_with_password(&seed.email, &seed.password).await.unwrap();
    assert_eq!(session.identity, id);
    // Seeding does not write to the audit trail.
    assert_eq!(db.activity_count(), 0);
}
