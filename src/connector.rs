//! The archive-connector capability contract and registry.
//!
//! A connector recognizes and converts basket items belonging to one
//! specific archive. Implement [`Connector`] to add support for a new
//! archive; the default method bodies cover the common case of claiming
//! items by archive tag and converting the parsed payload as-is.
//!
//! ```rust
//! use esap_shopping_client::connector::Connector;
//!
//! struct MyArchiveConnector;
//!
//! impl Connector for MyArchiveConnector {
//!     fn name(&self) -> &str { "my-archive" }
//!     fn archive(&self) -> &str { "my-archive" }
//! }
//! ```

use crate::models::{BasketItem, Record};

/// An adapter that interprets basket items belonging to one archive.
pub trait Connector: Send + Sync {
    /// Stable identifier, used as the grouping key in table output.
    fn name(&self) -> &str;

    /// Archive tag this connector claims inside an item's payload.
    fn archive(&self) -> &str;

    /// Check that the item carries this connector's archive tag.
    fn validate(&self, item: &BasketItem) -> bool {
        self.validate_loaded(item).is_some()
    }

    /// Like [`validate`](Connector::validate), but hands back the parsed
    /// payload on success. `None` on tag mismatch or parse failure.
    fn validate_loaded(&self, item: &BasketItem) -> Option<Record> {
        let payload = item.payload()?;
        match payload.get("archive") {
            Some(serde_json::Value::String(tag)) if tag == self.archive() => Some(payload),
            _ => None,
        }
    }

    /// Produce a normalized single-row record from the item.
    ///
    /// Re-validates unless `validate` is false. `None` when the payload
    /// cannot be parsed or is empty.
    fn convert(&self, item: &BasketItem, validate: bool) -> Option<Record> {
        let payload = if validate {
            self.validate_loaded(item)?
        } else {
            item.payload()?
        };
        if payload.is_empty() {
            return None;
        }
        Some(payload)
    }
}

/// The set of connectors registered with a client.
///
/// Connectors are conceptually keyed by archive tag, but no uniqueness
/// is enforced: registering two connectors with the same tag makes a
/// matching item show up once per connector in filtered output and in
/// each connector's table. That fan-out is preserved for compatibility
/// with existing drivers, not a deliberate multi-claim policy.
pub struct ConnectorRegistry {
    connectors: Vec<Box<dyn Connector>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self {
            connectors: Vec::new(),
        }
    }

    pub fn register(&mut self, connector: Box<dyn Connector>) {
        self.connectors.push(connector);
    }

    pub fn connectors(&self) -> &[Box<dyn Connector>] {
        &self.connectors
    }

    /// First registered connector claiming the given archive tag.
    pub fn find_by_archive(&self, archive: &str) -> Option<&dyn Connector> {
        self.connectors
            .iter()
            .find(|c| c.archive() == archive)
            .map(|c| c.as_ref())
    }

    /// Connectors claiming this item's archive tag, in registration
    /// order. Empty for items with no parseable tag.
    pub fn claimants(&self, item: &BasketItem) -> impl Iterator<Item = &dyn Connector> {
        let tag = item.archive();
        self.connectors
            .iter()
            .filter(move |c| tag.as_deref() == Some(c.archive()))
            .map(|c| c.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.connectors.len()
    }
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TaggedConnector {
        name: &'static str,
        archive: &'static str,
    }

    impl Connector for TaggedConnector {
        fn name(&self) -> &str {
            self.name
        }
        fn archive(&self) -> &str {
            self.archive
        }
    }

    fn samp() -> TaggedConnector {
        TaggedConnector {
            name: "samp",
            archive: "samp",
        }
    }

    #[test]
    fn validate_checks_archive_tag() {
        let connector = samp();
        assert!(connector.validate(&BasketItem::new(r#"{"archive":"samp","x":1}"#)));
        assert!(!connector.validate(&BasketItem::new(r#"{"archive":"alta"}"#)));
        assert!(!connector.validate(&BasketItem::new(r#"{"x":1}"#)));
        assert!(!connector.validate(&BasketItem::new("garbage")));
    }

    #[test]
    fn convert_returns_payload_fields() {
        let connector = samp();
        let record = connector
            .convert(&BasketItem::new(r#"{"archive":"samp","x":1}"#), true)
            .unwrap();
        assert_eq!(record["archive"], "samp");
        assert_eq!(record["x"], 1);
    }

    #[test]
    fn convert_rejects_mismatched_archive_when_validating() {
        let connector = samp();
        let item = BasketItem::new(r#"{"archive":"alta","x":1}"#);
        assert!(connector.convert(&item, true).is_none());
        // Skipping validation converts anything parseable.
        assert!(connector.convert(&item, false).is_some());
    }

    #[test]
    fn convert_rejects_empty_payload() {
        let connector = samp();
        assert!(connector.convert(&BasketItem::new("{}"), false).is_none());
    }

    #[test]
    fn registry_allows_duplicate_archive_tags() {
        let mut registry = ConnectorRegistry::new();
        registry.register(Box::new(samp()));
        registry.register(Box::new(TaggedConnector {
            name: "samp-mirror",
            archive: "samp",
        }));

        assert_eq!(registry.len(), 2);
        let samp_item = BasketItem::new(r#"{"archive":"samp"}"#);
        assert_eq!(registry.claimants(&samp_item).count(), 2);
        let alta_item = BasketItem::new(r#"{"archive":"alta"}"#);
        assert_eq!(registry.claimants(&alta_item).count(), 0);
        assert_eq!(registry.find_by_archive("samp").unwrap().name(), "samp");
    }
}
