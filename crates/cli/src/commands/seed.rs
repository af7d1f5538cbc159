//! Development data seeding.
//!
//! Creates a few stores and customers, then books upcoming visits spread
//! over the next three days so the reminder engine has work to do
//! locally.

use chrono::{Duration, Utc};
use rand::Rng;
use rand::seq::IndexedRandom;
use sqlx::PgPool;

use footfall_core::types::{CustomerId, StoreId};
use footfall_server::db::visits::{self, CreateVisit};

const STORE_NAMES: &[&str] = &["Corner Market", "Harbor Goods", "Maple & Main"];

const CUSTOMERS: &[(&str, &str)] = &[
    ("Ada Fenwick", "ada@footfall.test"),
    ("Bram Okafor", "bram@footfall.test"),
    ("Cleo Marsh", "cleo@footfall.test"),
    ("Dev Anand", "dev@footfall.test"),
    ("Esme Ruiz", "esme@footfall.test"),
];

/// Errors that can occur while seeding.
#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Repository error: {0}")]
    Repository(#[from] footfall_server::db::RepositoryError),
}

/// Seed stores, customers, and `visit_count` upcoming visits.
///
/// Idempotent for stores/customers (keyed by name/email); visits are
/// always appended.
///
/// # Errors
///
/// Returns error if the database URL is missing or any insert fails.
pub async fn run(visit_count: u32) -> Result<(), SeedError> {
    dotenvy::dotenv().ok();

    let database_url = std::env::var("FOOTFALL_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map_err(|_| SeedError::MissingEnvVar("FOOTFALL_DATABASE_URL"))?;

    let pool = PgPool::connect(&database_url).await?;

    let store_ids = seed_stores(&pool).await?;
    let customer_ids = seed_customers(&pool).await?;

    let now = Utc::now();
    let mut rng = rand::rng();
    for _ in 0..visit_count {
        let (Some(&store_id), Some(&customer_id)) =
            (store_ids.choose(&mut rng), customer_ids.choose(&mut rng))
        else {
            break;
        };

        // Spread bookings across the next three days, off the hour.
        let offset_minutes = rng.random_range(60..(72 * 60));
        visits::insert_visit(
            &pool,
            CreateVisit {
                customer_id,
                store_id,
                scheduled_at: now + Duration::minutes(offset_minutes),
            },
            now,
        )
        .await?;
    }

    tracing::info!(
        stores = store_ids.len(),
        customers = customer_ids.len(),
        visits = visit_count,
        "Seed complete"
    );
    Ok(())
}

async fn seed_stores(pool: &PgPool) -> Result<Vec<StoreId>, SeedError> {
    let mut ids = Vec::with_capacity(STORE_NAMES.len());
    for name in STORE_NAMES {
        let row: (i32,) = sqlx::query_as(
            r"
            INSERT INTO stores (name)
            VALUES ($1)
            ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
            RETURNING id
            ",
        )
        .bind(name)
        .fetch_one(pool)
        .await?;
        ids.push(StoreId::new(row.0));
    }
    Ok(ids)
}

async fn seed_customers(pool: &PgPool) -> Result<Vec<CustomerId>, SeedError> {
    let mut ids = Vec::with_capacity(CUSTOMERS.len());
    for (name, email) in CUSTOMERS {
        let row: (i32,) = sqlx::query_as(
            r"
            INSERT INTO customers (name, email)
            VALUES ($1, $2)
            ON CONFLICT (email) DO UPDATE SET name = EXCLUDED.name
            RETURNING id
            ",
        )
        .bind(name)
        .bind(email)
        .fetch_one(pool)
        .await?;
        ids.push(CustomerId::new(row.0));
    }
    Ok(ids)
}
