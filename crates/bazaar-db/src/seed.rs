use argon2::password_hash::{SaltString, rand_core::OsRng};
use argon2::{Argon2, PasswordHasher};
use bazaar_types::{SeedSummary, SeededProduct, SeededUser};
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};
use uuid::Uuid;

use crate::Database;
use crate::error::{LifecycleError, Result, TableContext};
use crate::schema::Table;

pub const DEFAULT_CATEGORIES: &[&str] = &["Textbooks", "Electronics", "Furniture", "Clothing", "Other"];
pub const DEFAULT_SEED_PASSWORD: &str = "campus-demo";

/// Namespace for sample product ids, so the same category always maps to the same row.
const PRODUCT_NAMESPACE: Uuid = Uuid::from_u128(0x6f1d_2c4e_9a3b_4c57_8e21_b0a4_d9c3_7e15);

struct SampleUser {
    id: Uuid,
    email: &'static str,
    name: &'static str,
}

const SAMPLE_USERS: &[SampleUser] = &[
    SampleUser {
        id: Uuid::from_u128(0xa001),
        email: "alice@campus.test",
        name: "Alice Chen",
    },
    SampleUser {
        id: Uuid::from_u128(0xb002),
        email: "bob@campus.test",
        name: "Bob Okafor",
    },
];

#[derive(Debug, Clone)]
pub struct SeedConfig {
    pub categories: Vec<String>,
    /// Plaintext password for every sample account; stored hashed.
    pub password: String,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            categories: DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect(),
            password: DEFAULT_SEED_PASSWORD.to_string(),
        }
    }
}

impl Database {
    /// Insert the sample rows in their own transaction.
    pub fn reseed(&self, config: &SeedConfig) -> Result<SeedSummary> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let summary = seed_sample_data(&tx, config)?;
            tx.commit()?;
            info!(
                "Seeded {} users and {} products ({} new rows)",
                summary.users.len(),
                summary.products.len(),
                summary.inserted
            );
            Ok(summary)
        })
    }
}

/// Pair the i-th category with `sellers[i % sellers.len()]`.
pub fn assign_sellers<'a, S>(categories: &'a [String], sellers: &'a [S]) -> Result<Vec<(&'a str, &'a S)>> {
    if sellers.is_empty() && !categories.is_empty() {
        return Err(LifecycleError::EmptySellers {
            categories: categories.len(),
        });
    }

    Ok(categories
        .iter()
        .enumerate()
        .map(|(i, category)| (category.as_str(), &sellers[i % sellers.len()]))
        .collect())
}

/// Sample users, then one product per category with sellers assigned round-robin.
///
/// Existing rows are left alone, so running this twice writes nothing the second time.
pub fn seed_sample_data(conn: &Connection, config: &SeedConfig) -> Result<SeedSummary> {
    let password_hash = Argon2::default()
        .hash_password(config.password.as_bytes(), &SaltString::generate(&mut OsRng))
        .map_err(|e| LifecycleError::Seed(format!("password hash: {}", e)))?
        .to_string();

    let mut summary = SeedSummary::default();
    let users = Table::Users.name();

    for sample in SAMPLE_USERS {
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO users (id, email, name, password, is_verified)
                 VALUES (?1, ?2, ?3, ?4, 1)",
                rusqlite::params![sample.id.to_string(), sample.email, sample.name, password_hash],
            )
            .on_table(users)?;
        summary.inserted += inserted as u64;

        // The email may already belong to an account with a different id
        let existing: Option<String> = conn
            .query_row("SELECT id FROM users WHERE email = ?1", [sample.email], |row| row.get(0))
            .optional()
            .on_table(users)?;
        let id = match existing {
            Some(id) => id,
            None => return Err(id_conflict(conn, sample)?),
        };

        debug!("Sample user {} -> {}", sample.email, id);
        summary.users.push(SeededUser {
            id,
            email: sample.email.to_string(),
            name: sample.name.to_string(),
        });
    }

    let seller_ids: Vec<String> = summary.users.iter().map(|u| u.id.clone()).collect();
    let products = Table::Products.name();

    for (i, (category, seller_id)) in assign_sellers(&config.categories, &seller_ids)?
        .into_iter()
        .enumerate()
    {
        let product = SeededProduct {
            id: Uuid::new_v5(&PRODUCT_NAMESPACE, category.as_bytes()).to_string(),
            seller_id: seller_id.clone(),
            name: format!("Sample {}", category),
            category: category.to_string(),
            price: 1_000 + 500 * i as i64,
        };

        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO products (id, seller_id, name, description, price, category)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    product.id,
                    product.seller_id,
                    product.name,
                    format!("Seeded {} listing", category.to_lowercase()),
                    product.price,
                    product.category,
                ],
            )
            .on_table(products)?;
        summary.inserted += inserted as u64;
        summary.products.push(product);
    }

    Ok(summary)
}

/// The insert was ignored but no row has the sample email: the fixed id is taken.
fn id_conflict(conn: &Connection, sample: &SampleUser) -> Result<LifecycleError> {
    let holder: Option<String> = conn
        .query_row(
            "SELECT email FROM users WHERE id = ?1",
            [sample.id.to_string()],
            |row| row.get(0),
        )
        .optional()
        .on_table(Table::Users.name())?;

    Ok(LifecycleError::Seed(match holder {
        Some(email) => format!(
            "sample user id {} for {} is already used by {}",
            sample.id, sample.email, email
        ),
        None => format!("sample user {} was not inserted", sample.email),
    }))
}
