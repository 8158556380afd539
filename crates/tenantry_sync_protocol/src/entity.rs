//! Entity types tracked by the offline store.

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The record collections that can carry pending changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// A rental property.
    Property,
    /// A tenant.
    Tenant,
    /// A ledger transaction (rent, expense, deposit).
    Transaction,
    /// An attached document.
    Document,
    /// An energy bill to be split across tenants.
    EnergyBill,
    /// A water bill to be split across tenants.
    WaterBill,
    /// An informor (meter reading / notice) record.
    Informor,
}

impl EntityType {
    /// Every entity type, in declaration order.
    pub const ALL: [EntityType; 7] = [
        EntityType::Property,
        EntityType::Tenant,
        EntityType::Transaction,
        EntityType::Document,
        EntityType::EnergyBill,
        EntityType::WaterBill,
        EntityType::Informor,
    ];

    /// Returns the snake_case name used in queue documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Property => "property",
            EntityType::Tenant => "tenant",
            EntityType::Transaction => "transaction",
            EntityType::Document => "document",
            EntityType::EnergyBill => "energy_bill",
            EntityType::WaterBill => "water_bill",
            EntityType::Informor => "informor",
        }
    }

    /// Returns the local store key holding this entity's collection.
    pub fn collection_key(&self) -> &'static str {
        match self {
            EntityType::Property => "properties",
            EntityType::Tenant => "tenants",
            EntityType::Transaction => "transactions",
            EntityType::Document => "documents",
            EntityType::EnergyBill => "energy_bills",
            EntityType::WaterBill => "water_bills",
            EntityType::Informor => "informors",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityType::ALL
            .into_iter()
            .find(|e| e.as_str() == s || e.collection_key() == s)
            .ok_or_else(|| ProtocolError::UnknownName {
                kind: "entity type",
                value: s.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_from_str() {
        for entity in EntityType::ALL {
            assert_eq!(entity.as_str().parse::<EntityType>().unwrap(), entity);
            assert_eq!(
                entity.collection_key().parse::<EntityType>().unwrap(),
                entity
            );
        }
        assert!("landlord".parse::<EntityType>().is_err());
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&EntityType::EnergyBill).unwrap();
        assert_eq!(json, "\"energy_bill\"");
    }

    #[test]
    fn collection_keys_are_distinct() {
        let mut keys: Vec<_> = EntityType::ALL.iter().map(|e| e.collection_key()).collect();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), EntityType::ALL.len());
    }
}
