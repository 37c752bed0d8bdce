//! Integration tests for the pending-edit moderation workflow: staging,
//! atomic apply, idempotent decisions, and the one-pending-per-entity
//! invariant.

use serde_json::json;
use sqlx::PgPool;

use sokoni_core::delta::compute_delta;
use sokoni_core::schema::{schema_for, EntityKind};
use sokoni_db::models::geo::CreateCity;
use sokoni_db::models::listing::{CreateListing, Listing};
use sokoni_db::models::pending_edit::{DecisionOutcome, NewPendingEdit, PendingEdit};
use sokoni_db::models::user::CreateUser;
use sokoni_db::repositories::{
    AuditLogRepo, CityRepo, ListingRepo, PendingEditRepo, UserRepo,
};

async fn user(pool: &PgPool, email: &str, role: &str) -> i64 {
    UserRepo::create(
        pool,
        &CreateUser {
            email: email.to_string(),
            display_name: email.to_string(),
            role: role.to_string(),
        },
    )
    .await
    .unwrap()
    .id
}

async fn seed_listing(pool: &PgPool) -> Listing {
    CityRepo::create(pool, &CreateCity { name: "Haifa".to_string() })
        .await
        .unwrap();
    ListingRepo::create(
        pool,
        &CreateListing {
            title: "Sea View".to_string(),
            city: "Haifa".to_string(),
            street: Some("Herzl 10".to_string()),
            price: 1_800_000,
            description: Some("Bright corner flat".to_string()),
            available_from: None,
            attributes: Some(json!({"floor": 3})),
            images: Some(json!(["https://img/a.jpg", "https://img/b.jpg"])),
            features: Some(json!({"balcony": true})),
        },
    )
    .await
    .unwrap()
}

/// Stage an edit the way the gateway does: compute deltas against the
/// current canonical snapshot and cache them on the edit.
async fn submit_fields(
    pool: &PgPool,
    listing: &Listing,
    requested_by: i64,
    fields: serde_json::Value,
) -> Result<PendingEdit, sqlx::Error> {
    let schema = schema_for(EntityKind::Listing);
    let proposed = fields.as_object().unwrap().clone();
    let deltas = compute_delta(&listing.snapshot(), &proposed, &schema);
    PendingEditRepo::submit(
        pool,
        &NewPendingEdit {
            entity_kind: "listing".to_string(),
            entity_id: listing.id,
            proposed: serde_json::Value::Object(proposed),
            deltas: serde_json::to_value(&deltas).unwrap(),
            requested_by,
        },
    )
    .await
}

#[sqlx::test(migrations = "./migrations")]
async fn approving_a_price_edit_changes_only_the_price(pool: PgPool) {
    let submitter = user(&pool, "seller@example.com", "user").await;
    let moderator = user(&pool, "mod@example.com", "moderator").await;
    let listing = seed_listing(&pool).await;

    let edit = submit_fields(&pool, &listing, submitter, json!({"price": 1_750_000}))
        .await
        .unwrap();
    assert_eq!(edit.status, "pending");

    let outcome = PendingEditRepo::approve(&pool, edit.id, moderator, Some("fair price"))
        .await
        .unwrap()
        .unwrap();
    let approved = match outcome {
        DecisionOutcome::Applied(edit) => edit,
        other => panic!("expected Applied, got {other:?}"),
    };
    assert_eq!(approved.status, "approved");
    assert_eq!(approved.reviewed_by, Some(moderator));
    assert_eq!(approved.admin_notes.as_deref(), Some("fair price"));

    let updated = ListingRepo::find_by_id(&pool, listing.id).await.unwrap().unwrap();
    assert_eq!(updated.price, 1_750_000);
    // Every other field is untouched.
    assert_eq!(updated.title, listing.title);
    assert_eq!(updated.street, listing.street);
    assert_eq!(updated.description, listing.description);
    assert_eq!(updated.attributes, listing.attributes);
    assert_eq!(updated.images, listing.images);
    assert_eq!(updated.features, listing.features);
}

#[sqlx::test(migrations = "./migrations")]
async fn approve_is_idempotent(pool: PgPool) {
    let submitter = user(&pool, "seller@example.com", "user").await;
    let moderator = user(&pool, "mod@example.com", "moderator").await;
    let listing = seed_listing(&pool).await;

    let edit = submit_fields(&pool, &listing, submitter, json!({"price": 1_750_000}))
        .await
        .unwrap();

    let first = PendingEditRepo::approve(&pool, edit.id, moderator, None)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(first, DecisionOutcome::Applied(_)));

    let second = PendingEditRepo::approve(&pool, edit.id, moderator, None)
        .await
        .unwrap()
        .unwrap();
    let stored = match second {
        DecisionOutcome::AlreadyDecided(edit) => edit,
        other => panic!("expected AlreadyDecided, got {other:?}"),
    };
    assert_eq!(stored.status, "approved");

    // The second call performed no canonical writes.
    let after = ListingRepo::find_by_id(&pool, listing.id).await.unwrap().unwrap();
    assert_eq!(after.price, 1_750_000);
}

#[sqlx::test(migrations = "./migrations")]
async fn reject_never_touches_the_canonical_entity(pool: PgPool) {
    let submitter = user(&pool, "seller@example.com", "user").await;
    let moderator = user(&pool, "mod@example.com", "moderator").await;
    let listing = seed_listing(&pool).await;

    let edit = submit_fields(&pool, &listing, submitter, json!({"price": 1_750_000}))
        .await
        .unwrap();

    let outcome = PendingEditRepo::reject(&pool, edit.id, moderator, Some("below market"))
        .await
        .unwrap()
        .unwrap();
    let rejected = match outcome {
        DecisionOutcome::Applied(edit) => edit,
        other => panic!("expected Applied, got {other:?}"),
    };
    assert_eq!(rejected.status, "rejected");
    assert_eq!(rejected.reject_reason.as_deref(), Some("below market"));

    let unchanged = ListingRepo::find_by_id(&pool, listing.id).await.unwrap().unwrap();
    assert_eq!(unchanged.price, 1_800_000);
}

#[sqlx::test(migrations = "./migrations")]
async fn second_pending_edit_for_same_entity_violates_unique_index(pool: PgPool) {
    let submitter = user(&pool, "seller@example.com", "user").await;
    let other = user(&pool, "other@example.com", "user").await;
    let listing = seed_listing(&pool).await;

    submit_fields(&pool, &listing, submitter, json!({"price": 1_750_000}))
        .await
        .unwrap();

    let err = submit_fields(&pool, &listing, other, json!({"price": 1_700_000}))
        .await
        .unwrap_err();
    match err {
        sqlx::Error::Database(db_err) => {
            assert_eq!(db_err.constraint(), Some("uq_pending_edits_one_pending"));
        }
        other => panic!("expected a unique violation, got {other:?}"),
    }

    // Exactly one pending edit survived the race.
    let pending = PendingEditRepo::find_pending_for(&pool, "listing", listing.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pending.requested_by, submitter);
}

#[sqlx::test(migrations = "./migrations")]
async fn resubmission_is_allowed_after_a_terminal_decision(pool: PgPool) {
    let submitter = user(&pool, "seller@example.com", "user").await;
    let moderator = user(&pool, "mod@example.com", "moderator").await;
    let listing = seed_listing(&pool).await;

    let edit = submit_fields(&pool, &listing, submitter, json!({"price": 1_750_000}))
        .await
        .unwrap();
    PendingEditRepo::reject(&pool, edit.id, moderator, Some("no"))
        .await
        .unwrap()
        .unwrap();

    // The partial index only covers pending rows, so a fresh proposal can
    // be staged.
    let second = submit_fields(&pool, &listing, submitter, json!({"price": 1_700_000}))
        .await
        .unwrap();
    assert_eq!(second.status, "pending");
}

#[sqlx::test(migrations = "./migrations")]
async fn failed_apply_leaves_entity_untouched_and_edit_pending(pool: PgPool) {
    let submitter = user(&pool, "seller@example.com", "user").await;
    let moderator = user(&pool, "mod@example.com", "moderator").await;
    let listing = seed_listing(&pool).await;

    // Propose a move to a city that is then removed before review.
    CityRepo::create(&pool, &CreateCity { name: "Atlit".to_string() })
        .await
        .unwrap();
    let edit = submit_fields(
        &pool,
        &listing,
        submitter,
        json!({"city": "Atlit", "price": 1_900_000}),
    )
    .await
    .unwrap();
    sqlx::query("DELETE FROM cities WHERE name = 'Atlit'")
        .execute(&pool)
        .await
        .unwrap();

    let outcome = PendingEditRepo::approve(&pool, edit.id, moderator, None)
        .await
        .unwrap()
        .unwrap();
    let (failed_edit, reason) = match outcome {
        DecisionOutcome::ApplyFailed { edit, reason } => (edit, reason),
        other => panic!("expected ApplyFailed, got {other:?}"),
    };
    assert!(reason.contains("Atlit"));
    assert_eq!(failed_edit.status, "pending");
    assert_eq!(failed_edit.failure_reason.as_deref(), Some(reason.as_str()));

    // The whole apply rolled back: even the price delta, which would have
    // succeeded on its own, was not written.
    let unchanged = ListingRepo::find_by_id(&pool, listing.id).await.unwrap().unwrap();
    assert_eq!(unchanged.city, "Haifa");
    assert_eq!(unchanged.price, 1_800_000);
}

#[sqlx::test(migrations = "./migrations")]
async fn image_and_feature_deltas_apply_together(pool: PgPool) {
    let submitter = user(&pool, "seller@example.com", "user").await;
    let moderator = user(&pool, "mod@example.com", "moderator").await;
    let listing = seed_listing(&pool).await;

    let edit = submit_fields(
        &pool,
        &listing,
        submitter,
        json!({
            "images": ["https://img/a.jpg", "https://img/c.jpg"],
            "features": {"balcony": true, "parking": true},
            "attributes": {"floor": 4},
        }),
    )
    .await
    .unwrap();

    PendingEditRepo::approve(&pool, edit.id, moderator, None)
        .await
        .unwrap()
        .unwrap();

    let updated = ListingRepo::find_by_id(&pool, listing.id).await.unwrap().unwrap();
    assert_eq!(updated.images, json!(["https://img/a.jpg", "https://img/c.jpg"]));
    assert_eq!(updated.features, json!({"balcony": true, "parking": true}));
    assert_eq!(updated.attributes, json!({"floor": 4}));
}

#[sqlx::test(migrations = "./migrations")]
async fn each_decision_writes_one_audit_entry(pool: PgPool) {
    let submitter = user(&pool, "seller@example.com", "user").await;
    let moderator = user(&pool, "mod@example.com", "moderator").await;
    let listing = seed_listing(&pool).await;

    let edit = submit_fields(&pool, &listing, submitter, json!({"price": 1_750_000}))
        .await
        .unwrap();
    // submit wrote one entry.
    assert_eq!(
        AuditLogRepo::count_for_entity(&pool, "listing", listing.id).await.unwrap(),
        1
    );

    PendingEditRepo::approve(&pool, edit.id, moderator, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        AuditLogRepo::count_for_entity(&pool, "listing", listing.id).await.unwrap(),
        2
    );

    // Idempotent re-approve writes nothing.
    PendingEditRepo::approve(&pool, edit.id, moderator, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        AuditLogRepo::count_for_entity(&pool, "listing", listing.id).await.unwrap(),
        2
    );
}
