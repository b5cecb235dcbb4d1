use serde::{Deserialize, Serialize};

/// A sample account written by the seeding helper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeededUser {
    pub id: String,
    pub email: String,
    pub name: String,
}

/// A sample listing written by the seeding helper, one per category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeededProduct {
    pub id: String,
    pub seller_id: String,
    pub name: String,
    pub category: String,
    /// Price in cents.
    pub price: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedSummary {
    pub users: Vec<SeededUser>,
    pub products: Vec<SeededProduct>,
    /// Rows actually inserted; rows that already existed are skipped.
    pub inserted: u64,
}
