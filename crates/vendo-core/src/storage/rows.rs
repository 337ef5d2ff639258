//! Raw row shapes between SQLite and the domain model.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRow {
    pub card_id: String,
    pub allowed: i64,
    pub stock: i64,
    pub today: i64,
    pub total: i64,
    pub registered_at: String,
    pub history: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitRow {
    pub name: String,
    pub password: String,
    pub stock: i64,
    pub online: i64,
    pub available: i64,
    pub last_seen: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRow {
    pub id: i64,
    pub at: String,
    pub txt: String,
}
