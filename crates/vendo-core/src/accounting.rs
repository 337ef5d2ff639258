//! Usage authorization and accounting engine.
//!
//! Two-step flow, mirroring what a unit does at the counter:
//!
//! 1. [`authorize`] — pure read. The unit checks eligibility before it even
//!    starts a physical dispense attempt.
//! 2. [`record_usage`] — the invariant-preserving state transition, delegated
//!    to the store's atomic consumption path.

use chrono::{DateTime, Utc};

use crate::error::LedgerResult;
use crate::model::UserRecord;
use crate::storage::LedgerStore;

/// Eligibility verdict for a presented card token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    /// Token has no matching record.
    NotFound,
    /// Record exists but usage permission is off.
    Forbidden,
    /// Record exists but the allotment is used up.
    NoStock,
    /// Token may be used; the current record is attached.
    Eligible(UserRecord),
}

impl Authorization {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Forbidden => "forbidden",
            Self::NoStock => "no_stock",
            Self::Eligible(_) => "eligible",
        }
    }

    pub fn is_eligible(&self) -> bool {
        matches!(self, Self::Eligible(_))
    }
}

/// Check eligibility for a card token. Read-only, no side effects.
pub fn authorize(store: &LedgerStore, card_id: &str) -> LedgerResult<Authorization> {
    let user = match store.get_user(card_id)? {
        Some(user) => user,
        None => return Ok(Authorization::NotFound),
    };
    if !user.allowed {
        return Ok(Authorization::Forbidden);
    }
    if user.stock <= 0 {
        return Ok(Authorization::NoStock);
    }
    Ok(Authorization::Eligible(user))
}

/// Consume one unit of stock for a card token.
///
/// Thin over [`LedgerStore::record_usage`], which applies the decrement,
/// the counters, the history ring shift and the audit entry as one
/// transaction. Eligibility (`allowed`) is a unit-side pre-check via
/// [`authorize`]; accounting only enforces existence and stock, matching
/// the server API contract.
pub fn record_usage(
    store: &LedgerStore,
    card_id: &str,
    now: DateTime<Utc>,
) -> LedgerResult<UserRecord> {
    store.record_usage(card_id, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_authorize_unknown_token() {
        let store = LedgerStore::memory().unwrap();
        assert_eq!(authorize(&store, "nope").unwrap(), Authorization::NotFound);
    }

    #[test]
    fn test_authorize_exhausted_token() {
        let store = LedgerStore::memory().unwrap();
        store.register_user("card-a", t0()).unwrap();
        store.set_user_stock("card-a", 0).unwrap();
        assert_eq!(authorize(&store, "card-a").unwrap(), Authorization::NoStock);
    }

    #[test]
    fn test_authorize_disallowed_token_is_forbidden() {
        let store = LedgerStore::memory().unwrap();
        store.register_user("card-a", t0()).unwrap();
        store.set_user_allowed("card-a", false).unwrap();
        assert_eq!(
            authorize(&store, "card-a").unwrap(),
            Authorization::Forbidden
        );
    }

    #[test]
    fn test_authorize_eligible_token_attaches_record() {
        let store = LedgerStore::memory().unwrap();
        store.register_user("card-a", t0()).unwrap();

        match authorize(&store, "card-a").unwrap() {
            Authorization::Eligible(user) => assert_eq!(user.stock, 2),
            other => panic!("expected eligible, got {}", other.as_str()),
        }
    }

    #[test]
    fn test_authorize_has_no_side_effects() {
        let store = LedgerStore::memory().unwrap();
        store.register_user("card-a", t0()).unwrap();
        let audit_before = store.count_audit().unwrap();

        authorize(&store, "card-a").unwrap();

        let user = store.get_user("card-a").unwrap().unwrap();
        assert_eq!(user.stock, 2);
        assert_eq!(store.count_audit().unwrap(), audit_before);
    }
}
