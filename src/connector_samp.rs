//! Connector for basket items saved from SAMP-enabled applications.

use crate::connector::Connector;

/// Claims items tagged `archive = "samp"`. Conversion is the trait
/// default: the parsed payload becomes the record as-is.
pub struct SampConnector;

impl Connector for SampConnector {
    fn name(&self) -> &str {
        "samp"
    }

    fn archive(&self) -> &str {
        "samp"
    }
}
