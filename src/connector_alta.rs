//! Connector for items selected from the ALTA archive (Apertif Long
//! Term Archive).

use crate::connector::Connector;

pub struct AltaConnector;

impl Connector for AltaConnector {
    fn name(&self) -> &str {
        "alta"
    }

    fn archive(&self) -> &str {
        "alta"
    }
}
