//! # ESAP Shopping Client
//!
//! Client library for the ESAP discovery portal's shopping basket.
//!
//! Users of the portal save references to astronomical data-archive
//! items into a "shopping basket". This crate retrieves that basket and
//! converts the heterogeneous entries into archive-specific tabular
//! records through a pluggable connector mechanism.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   GET basket   ┌──────────────────┐
//! │ ShoppingClient│──────────────▶│ Discovery portal │
//! └──────┬───────┘                └──────────────────┘
//!        │ dispatch
//!        ▼
//! ┌──────────────────────────────┐
//! │       ConnectorRegistry      │
//! │ ┌──────┐ ┌──────┐ ┌────────┐ │
//! │ │ samp │ │ alta │ │zooniv. │ │
//! │ └──────┘ └──────┘ └────────┘ │
//! └──────────────────────────────┘
//!        │ validate + convert
//!        ▼
//!   one table per connector
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use esap_shopping_client::client::{BasketOptions, ShoppingClient};
//! use esap_shopping_client::connector_samp::SampConnector;
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut client = ShoppingClient::new("https://sdc.astron.nl")
//!     .with_token(std::env::var("ESAP_TOKEN")?)
//!     .with_connector(Box::new(SampConnector));
//!
//! let tables = client.get_basket(&BasketOptions {
//!     convert_to_tables: true,
//!     filter_archives: true,
//!     ..Default::default()
//! })?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`client`] | Basket retrieval, caching, and connector dispatch |
//! | [`connector`] | The archive-connector contract and registry |
//! | [`token`] | Bearer-token validation and acquisition strategies |
//! | [`config`] | TOML configuration |
//! | [`models`] | Basket items, records, and table types |
//! | [`connector_samp`] | SAMP archive connector |
//! | [`connector_alta`] | ALTA archive connector |
//! | [`connector_zooniverse`] | Zooniverse/panoptes connector with export retrieval |

pub mod client;
pub mod config;
pub mod connector;
pub mod connector_alta;
pub mod connector_samp;
pub mod connector_zooniverse;
pub mod models;
pub mod token;
