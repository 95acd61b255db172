use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A physical place stock is held in.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Location {
    #[sea_orm(string_value = "shop")]
    Shop,
    #[sea_orm(string_value = "store")]
    Store,
}

/// Where an item may be stocked.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ItemLocation {
    #[sea_orm(string_value = "shop")]
    ShopOnly,
    #[sea_orm(string_value = "store")]
    StoreOnly,
    #[sea_orm(string_value = "both")]
    Both,
}

impl ItemLocation {
    pub fn allows(self, location: Location) -> bool {
        match self {
            ItemLocation::Both => true,
            ItemLocation::ShopOnly => location == Location::Shop,
            ItemLocation::StoreOnly => location == Location::Store,
        }
    }
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UnitOfMeasure {
    #[sea_orm(string_value = "piece")]
    Piece,
    #[sea_orm(string_value = "pack")]
    Pack,
    #[sea_orm(string_value = "box")]
    Box,
    #[sea_orm(string_value = "kg")]
    Kg,
    #[sea_orm(string_value = "carton")]
    Carton,
}

/// Provenance of a receipt batch.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BatchSource {
    #[sea_orm(string_value = "purchase")]
    Purchase,
    #[sea_orm(string_value = "return")]
    Return,
    #[sea_orm(string_value = "adjustment")]
    Adjustment,
    #[sea_orm(string_value = "transfer")]
    Transfer,
    #[sea_orm(string_value = "donation")]
    Donation,
}

/// Why stock left a location.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(24))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RemovalReason {
    #[sea_orm(string_value = "sale")]
    Sale,
    #[sea_orm(string_value = "transfer")]
    Transfer,
    #[sea_orm(string_value = "staff_collection")]
    StaffCollection,
    #[sea_orm(string_value = "damage")]
    Damage,
    #[sea_orm(string_value = "expired")]
    Expired,
    #[sea_orm(string_value = "adjustment")]
    Adjustment,
    #[sea_orm(string_value = "wastage")]
    Wastage,
    #[sea_orm(string_value = "cafeteria")]
    Cafeteria,
    #[sea_orm(string_value = "boarding_house")]
    BoardingHouse,
}

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransferDirection {
    #[sea_orm(string_value = "store_to_shop")]
    StoreToShop,
    #[sea_orm(string_value = "shop_to_store")]
    ShopToStore,
}

impl TransferDirection {
    pub fn source(self) -> Location {
        match self {
            TransferDirection::StoreToShop => Location::Store,
            TransferDirection::ShopToStore => Location::Shop,
        }
    }

    pub fn destination(self) -> Location {
        match self {
            TransferDirection::StoreToShop => Location::Shop,
            TransferDirection::ShopToStore => Location::Store,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn directions_resolve_opposite_ends() {
        assert_eq!(TransferDirection::StoreToShop.source(), Location::Store);
        assert_eq!(TransferDirection::StoreToShop.destination(), Location::Shop);
        assert_eq!(TransferDirection::ShopToStore.source(), Location::Shop);
        assert_eq!(TransferDirection::ShopToStore.destination(), Location::Store);
    }

    #[test]
    fn eligibility_follows_item_location() {
        assert!(ItemLocation::Both.allows(Location::Shop));
        assert!(ItemLocation::ShopOnly.allows(Location::Shop));
        assert!(!ItemLocation::ShopOnly.allows(Location::Store));
        assert!(!ItemLocation::StoreOnly.allows(Location::Shop));
    }

    #[test]
    fn reasons_parse_from_snake_case() {
        assert_eq!(
            RemovalReason::from_str("staff_collection").unwrap(),
            RemovalReason::StaffCollection
        );
        assert_eq!(Location::Store.to_string(), "store");
        assert_eq!(BatchSource::Adjustment.to_string(), "adjustment");
    }
}
