//! Record categories and the Nostr kinds they own.
//!
//! Every tracked category owns one addressable kind (30000-39999) whose
//! events are edited in place by republishing with the same `d` tag.
//! Maintenance also owns a regular kind for completion log entries,
//! which have no replace-by-identity semantics.
//!
//! | Category | Record kind | Log kind |
//! |----------|-------------|----------|
//! | Appliances | 32627 | - |
//! | Vehicles | 32628 | - |
//! | Maintenance | 32629 | 1629 |
//! | Subscriptions | 32630 | - |
//! | Warranties | 32631 | - |
//! | Companies | 32632 | - |
//! | Contractors | 32633 | - |
//! | Projects | 32634 | - |
//! | Pets | 32635 | - |

use std::collections::BTreeSet;

use nostr::Kind;
use serde::{Deserialize, Serialize};

/// Addressable kind for appliance records.
pub const KIND_APPLIANCE: u16 = 32627;
/// Addressable kind for vehicle records.
pub const KIND_VEHICLE: u16 = 32628;
/// Addressable kind for maintenance task records.
pub const KIND_MAINTENANCE: u16 = 32629;
/// Addressable kind for subscription records.
pub const KIND_SUBSCRIPTION: u16 = 32630;
/// Addressable kind for warranty records.
pub const KIND_WARRANTY: u16 = 32631;
/// Addressable kind for company records.
pub const KIND_COMPANY: u16 = 32632;
/// Addressable kind for contractor records.
pub const KIND_CONTRACTOR: u16 = 32633;
/// Addressable kind for project records.
pub const KIND_PROJECT: u16 = 32634;
/// Addressable kind for pet records.
pub const KIND_PET: u16 = 32635;

/// Regular kind for maintenance completion log entries.
pub const KIND_MAINTENANCE_COMPLETION: u16 = 1629;

/// Returns true if the kind is in the addressable range (NIP-01).
#[must_use]
pub fn is_addressable(kind: Kind) -> bool {
    (30_000..40_000).contains(&kind.as_u16())
}

/// A category of tracked household data.
///
/// The set is fixed; every category is privacy-bearing, so reads scoped to
/// the user's own data in any of these kinds may reach private relays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Household appliances.
    Appliances,
    /// Cars, motorcycles, boats.
    Vehicles,
    /// Maintenance tasks and their completion log.
    Maintenance,
    /// Recurring subscriptions.
    Subscriptions,
    /// Product warranties.
    Warranties,
    /// Contractors and service providers.
    Contractors,
    /// Home projects.
    Projects,
    /// Pets.
    Pets,
    /// Companies (vendors, insurers, utilities).
    Companies,
}

impl Category {
    /// Every category, in display order.
    pub const ALL: [Self; 9] = [
        Self::Appliances,
        Self::Vehicles,
        Self::Maintenance,
        Self::Subscriptions,
        Self::Warranties,
        Self::Contractors,
        Self::Projects,
        Self::Pets,
        Self::Companies,
    ];

    /// Converts to string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Appliances => "appliances",
            Self::Vehicles => "vehicles",
            Self::Maintenance => "maintenance",
            Self::Subscriptions => "subscriptions",
            Self::Warranties => "warranties",
            Self::Contractors => "contractors",
            Self::Projects => "projects",
            Self::Pets => "pets",
            Self::Companies => "companies",
        }
    }

    /// Parses from string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }

    /// The addressable kind holding this category's records.
    #[must_use]
    pub const fn record_kind(&self) -> Kind {
        let kind = match self {
            Self::Appliances => KIND_APPLIANCE,
            Self::Vehicles => KIND_VEHICLE,
            Self::Maintenance => KIND_MAINTENANCE,
            Self::Subscriptions => KIND_SUBSCRIPTION,
            Self::Warranties => KIND_WARRANTY,
            Self::Contractors => KIND_CONTRACTOR,
            Self::Projects => KIND_PROJECT,
            Self::Pets => KIND_PET,
            Self::Companies => KIND_COMPANY,
        };
        Kind::Custom(kind)
    }

    /// The regular kind for log-style entries, if the category has one.
    #[must_use]
    pub const fn log_kind(&self) -> Option<Kind> {
        match self {
            Self::Maintenance => Some(Kind::Custom(KIND_MAINTENANCE_COMPLETION)),
            _ => None,
        }
    }

    /// All kinds owned by this category.
    #[must_use]
    pub fn kinds(&self) -> Vec<Kind> {
        let mut kinds = vec![self.record_kind()];
        kinds.extend(self.log_kind());
        kinds
    }

    /// Finds the category owning `kind`.
    #[must_use]
    pub fn from_kind(kind: Kind) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.record_kind() == kind || c.log_kind() == Some(kind))
    }

    /// Human-readable description used for NIP-31 `alt` tags.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Appliances => "Home appliance record",
            Self::Vehicles => "Vehicle record",
            Self::Maintenance => "Home maintenance record",
            Self::Subscriptions => "Subscription record",
            Self::Warranties => "Warranty record",
            Self::Contractors => "Contractor record",
            Self::Projects => "Home project record",
            Self::Pets => "Pet record",
            Self::Companies => "Company record",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kinds whose owned reads are privacy-bearing.
#[must_use]
pub fn sensitive_kinds() -> BTreeSet<Kind> {
    Category::ALL.iter().flat_map(Category::kinds).collect()
}

/// Every kind the tracker syncs, in category order.
#[must_use]
pub fn tracked_kinds() -> Vec<Kind> {
    Category::ALL.iter().flat_map(Category::kinds).collect()
}

/// Returns true if `kind` belongs to a privacy-bearing category.
#[must_use]
pub fn is_sensitive_kind(kind: Kind) -> bool {
    Category::from_kind(kind).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_string_roundtrip() {
        for category in Category::ALL {
            assert_eq!(Category::parse(category.as_str()), Some(category));
        }
        assert_eq!(Category::parse("boats"), None);
    }

    #[test]
    fn record_kinds_are_addressable() {
        for category in Category::ALL {
            assert!(is_addressable(category.record_kind()), "{category}");
        }
    }

    #[test]
    fn maintenance_log_kind_is_regular() {
        let log = Category::Maintenance.log_kind().unwrap();
        assert!(!is_addressable(log));
        assert_eq!(Category::from_kind(log), Some(Category::Maintenance));
    }

    #[test]
    fn record_kinds_are_unique() {
        let kinds = sensitive_kinds();
        assert_eq!(kinds.len(), Category::ALL.len() + 1);
    }

    #[test]
    fn from_kind_unknown_is_none() {
        assert_eq!(Category::from_kind(Kind::TextNote), None);
        assert!(!is_sensitive_kind(Kind::RelayList));
        assert!(is_sensitive_kind(Kind::Custom(KIND_PET)));
    }

    #[test]
    fn category_serde_uses_snake_case() {
        let json = serde_json::to_string(&Category::Subscriptions).unwrap();
        assert_eq!(json, "\"subscriptions\"");
    }
}
