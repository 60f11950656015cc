use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub mod scan;

pub use scan::LookupKey;

/// A participant in the loyalty program
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Member {
    /// Unique identifier for the `Member`
    pub id: Uuid,
    /// Unique email address, also used as a human lookup key
    pub email: String,
    /// Code printed on the member card, if any
    ///
    /// This is what prefixed QR payloads such as `BB:1234` resolve against.
    pub external_id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    /// Current balance
    ///
    /// Only the ledger commands change this value, through a committed [`Transaction`].
    pub points: u32,
    pub created_at: DateTime<Utc>,
}

impl Member {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    pub fn matches(&self, key: &LookupKey) -> bool {
        match key {
            LookupKey::Email(email) => self.email == *email,
            LookupKey::ExternalId(code) => self.external_id.as_deref() == Some(code.as_str()),
        }
    }
}

/// Data needed to enroll a new member
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewMember {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub external_id: Option<String>,
}

/// Redeemable catalog entry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RewardDefinition {
    pub id: Uuid,
    pub name: String,
    /// Number of points needed to redeem this reward, always positive
    pub cost: u32,
    /// Inactive rewards stay in the catalog so that past redemptions keep pointing at them.
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Data needed to add a reward to the catalog
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewReward {
    pub name: String,
    pub cost: u32,
}

/// Why a transaction was written
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Reason {
    /// Points awarded after scanning a member card
    ScanAdd,
    /// Points awarded by hand from the dashboard
    ManualAdd,
    /// Points spent on a reward
    RewardRedeem,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::ScanAdd => "scan_add",
            Reason::ManualAdd => "manual_add",
            Reason::RewardRedeem => "reward_redeem",
        }
    }
}

/// Where a transaction was initiated
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Source {
    Scan,
    Dashboard,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Scan => "scan",
            Source::Dashboard => "dashboard",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Immutable ledger entry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub id: Uuid,
    pub member_id: Uuid,
    /// Difference in points
    ///
    /// A positive number adds points to the balance. A negative number removes from it.
    pub points_delta: i64,
    pub reason: Reason,
    pub source: Source,
    /// Redeemed reward, only set for [`Reason::RewardRedeem`]
    pub reward_id: Option<Uuid>,
    /// Assigned by the store, strictly increasing across writes
    pub created_at: DateTime<Utc>,
}

/// Transaction content before the store assigns its identity and timestamp
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewTransaction {
    pub points_delta: i64,
    pub reason: Reason,
    pub source: Source,
    pub reward_id: Option<Uuid>,
}

impl NewTransaction {
    /// Balance after applying this transaction to `points`
    ///
    /// Returns `None` if the result would be negative or overflow a `u32`.
    pub fn apply_to(&self, points: u32) -> Option<u32> {
        u32::try_from(i64::from(points) + self.points_delta).ok()
    }
}

/// Sum of the deltas of a transaction log
///
/// For a consistent ledger, replaying every transaction of a member gives back its balance.
pub fn replay<'a, I>(transactions: I) -> i64
where
    I: IntoIterator<Item = &'a Transaction>,
{
    transactions.into_iter().map(|tx| tx.points_delta).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;
    use speculoos::prelude::*;

    fn tx(points_delta: i64) -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            member_id: Uuid::nil(),
            points_delta,
            reason: Reason::ManualAdd,
            source: Source::Dashboard,
            reward_id: None,
            created_at: Utc::now(),
        }
    }

    #[rstest]
    #[case(0, 10, Some(10))]
    #[case(30, -30, Some(0))]
    #[case(30, -50, None)]
    #[case(u32::MAX, 1, None)]
    fn test_apply_to(#[case] points: u32, #[case] delta: i64, #[case] expected: Option<u32>) {
        let new_tx = NewTransaction {
            points_delta: delta,
            reason: Reason::ManualAdd,
            source: Source::Dashboard,
            reward_id: None,
        };

        assert_that!(new_tx.apply_to(points)).is_equal_to(expected);
    }

    #[test]
    fn test_replay() {
        let log = vec![tx(10), tx(10), tx(-15), tx(40)];

        assert_that!(replay(&log)).is_equal_to(45);
        assert_that!(replay(&Vec::new())).is_equal_to(0);
    }

    #[rstest]
    #[case(Reason::ScanAdd, "scan_add")]
    #[case(Reason::ManualAdd, "manual_add")]
    #[case(Reason::RewardRedeem, "reward_redeem")]
    fn test_reason_display(#[case] reason: Reason, #[case] expected: &str) {
        assert_that!(format!("{reason:<14}|")).is_equal_to(format!("{expected:<14}|"));
    }

    #[test]
    fn test_display_name() {
        let member = Member {
            id: Uuid::new_v4(),
            email: "ana@example.com".to_string(),
            external_id: None,
            first_name: "Ana".to_string(),
            last_name: "".to_string(),
            points: 0,
            created_at: Utc::now(),
        };

        assert_that!(member.display_name()).is_equal_to("Ana".to_string());
    }
}
