//! Example: retrieve a shopping basket and convert ALTA items.
//!
//! Mirrors the typical notebook flow: construct a client for the ESAP
//! gateway, pull the raw basket, then register the ALTA connector and
//! convert the claimed items into a table.
//!
//! # Running
//!
//! ```bash
//! ESAP_HOST=http://localhost:5555 ESAP_TOKEN=<access token> \
//!     cargo run --example alta_basket
//! ```
//!
//! Without `ESAP_TOKEN` the client falls back to its acquisition chain
//! (hub exchange, token file, interactive prompt).

use anyhow::Result;
use esap_shopping_client::client::{BasketOptions, ShoppingClient};
use esap_shopping_client::connector_alta::AltaConnector;
use esap_shopping_client::models::BasketContents;

fn main() -> Result<()> {
    let host = std::env::var("ESAP_HOST").unwrap_or_else(|_| "http://localhost:5555".to_string());

    let mut client = ShoppingClient::new(&host).with_connector(Box::new(AltaConnector));
    if let Ok(token) = std::env::var("ESAP_TOKEN") {
        client = client.with_token(token);
    }

    // Raw basket, exactly as the portal stores it.
    match client.get_basket(&BasketOptions::default())? {
        BasketContents::Items(items) => {
            println!("{} item(s) in the basket", items.len());
            for item in &items {
                println!("  {}", item.item_data);
            }
        }
        BasketContents::Tables(_) => unreachable!("no conversion requested"),
    }

    // Only the ALTA items, converted into one table.
    let contents = client.get_basket(&BasketOptions {
        convert_to_tables: true,
        filter_archives: true,
        ..Default::default()
    })?;

    if let BasketContents::Tables(tables) = contents {
        for (connector, table) in &tables {
            println!("{connector}: {} row(s)", table.len());
            for record in table {
                println!("  {}", serde_json::Value::Object(record.clone()));
            }
        }
    }

    Ok(())
}
