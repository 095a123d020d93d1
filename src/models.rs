//! Core data types for the shopping basket pipeline.
//!
//! These types represent the basket items retrieved from the discovery
//! portal and the tabular records that archive connectors produce from
//! them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One normalized row produced by a connector: column name → JSON value.
pub type Record = serde_json::Map<String, Value>;

/// All rows one connector produced from a basket.
pub type Table = Vec<Record>;

/// One table per connector, keyed by connector name.
pub type TableSet = BTreeMap<String, Table>;

/// One saved selection in a user's shopping basket.
///
/// The portal stores the item as an opaque envelope: `item_data` is
/// itself a JSON-encoded object carrying at minimum an `"archive"` tag
/// identifying which connector should claim it, plus archive-specific
/// fields. Items are immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasketItem {
    pub item_data: String,
}

impl BasketItem {
    pub fn new(item_data: impl Into<String>) -> Self {
        Self {
            item_data: item_data.into(),
        }
    }

    /// Parse the embedded payload.
    ///
    /// Returns `None` when `item_data` is not a JSON object; malformed
    /// items are never an error, they are simply skipped downstream.
    pub fn payload(&self) -> Option<Record> {
        match serde_json::from_str::<Value>(&self.item_data) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        }
    }

    /// The archive tag embedded in the payload, if any.
    pub fn archive(&self) -> Option<String> {
        let payload = self.payload()?;
        match payload.get("archive") {
            Some(Value::String(tag)) => Some(tag.clone()),
            _ => None,
        }
    }
}

/// What [`get_basket`](crate::client::ShoppingClient::get_basket) hands
/// back: either the raw (possibly filtered) items, or the per-connector
/// tables when conversion was requested.
#[derive(Debug, Clone, PartialEq)]
pub enum BasketContents {
    Items(Vec<BasketItem>),
    Tables(TableSet),
}

impl BasketContents {
    pub fn items(&self) -> Option<&[BasketItem]> {
        match self {
            BasketContents::Items(items) => Some(items),
            BasketContents::Tables(_) => None,
        }
    }

    pub fn tables(&self) -> Option<&TableSet> {
        match self {
            BasketContents::Items(_) => None,
            BasketContents::Tables(tables) => Some(tables),
        }
    }
}

/// Response envelope of the portal's user-profiles endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct UserProfilesResponse {
    #[serde(default)]
    pub results: Vec<UserProfile>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserProfile {
    #[serde(default)]
    pub shopping_cart: Vec<BasketItem>,
}
