//! The shopping client: single point of contact with the discovery
//! portal's basket endpoint.
//!
//! Owns the HTTP session, the bearer token, the registered connectors,
//! and the cached basket. The basket is fetched once and then served
//! from the cache until an explicit reload; a failed fetch degrades to
//! whatever basket is currently cached plus a console warning.

use anyhow::Result;
use reqwest::blocking::Client as HttpClient;
use reqwest::header;

use crate::config::Config;
use crate::connector::{Connector, ConnectorRegistry};
use crate::models::{BasketContents, BasketItem, Table, TableSet, UserProfilesResponse};
use crate::token::{self, TokenSource};

/// Default path of the basket endpoint on the portal.
pub const BASKET_ENDPOINT: &str = "esap-api/accounts/user-profiles/";
/// Default audience used for hub token exchange.
pub const DEFAULT_AUDIENCE: &str = "rucio";

/// Options for [`ShoppingClient::get_basket`].
#[derive(Debug, Default, Clone, Copy)]
pub struct BasketOptions {
    /// Convert validated items into one table per connector. Items no
    /// registered connector validates are dropped from the table output
    /// (they stay in the raw basket).
    pub convert_to_tables: bool,
    /// Issue a fresh portal query even when a basket is already cached.
    pub reload: bool,
    /// Only return items whose archive tag is claimed by a registered
    /// connector. The filtered basket is a derived view; the cache keeps
    /// every fetched item.
    pub filter_archives: bool,
}

pub struct ShoppingClient {
    host: String,
    basket_endpoint: String,
    http: HttpClient,
    token: Option<String>,
    token_sources: Vec<Box<dyn TokenSource>>,
    connectors: ConnectorRegistry,
    basket: Option<Vec<BasketItem>>,
}

impl ShoppingClient {
    /// Create a client for the portal at `host` with no token and no
    /// connectors. The token is acquired lazily on the first request.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            basket_endpoint: BASKET_ENDPOINT.to_string(),
            http: HttpClient::new(),
            token: None,
            token_sources: token::default_sources(DEFAULT_AUDIENCE),
            connectors: ConnectorRegistry::new(),
            basket: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let mut client = Self::new(config.portal.host.clone());
        client.basket_endpoint = config.portal.basket_endpoint.clone();
        client.token_sources = token::default_sources(&config.token.audience);
        client
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_connector(mut self, connector: Box<dyn Connector>) -> Self {
        self.connectors.register(connector);
        self
    }

    /// Replace the token-acquisition chain (tests, exotic deployments).
    pub fn with_token_sources(mut self, sources: Vec<Box<dyn TokenSource>>) -> Self {
        self.token_sources = sources;
        self
    }

    pub fn connectors(&self) -> &ConnectorRegistry {
        &self.connectors
    }

    /// Retrieve the user's shopping basket.
    ///
    /// Fetches from the portal on first use or when `reload` is set and
    /// otherwise serves the cached basket. See [`BasketOptions`] for the
    /// filter and conversion behavior.
    ///
    /// # Errors
    ///
    /// Only token problems are fatal (malformed JWT, no token obtainable).
    /// Transport failures degrade to the cached basket plus a warning.
    pub fn get_basket(&mut self, opts: &BasketOptions) -> Result<BasketContents> {
        if self.basket.is_none() || opts.reload {
            self.fetch_basket()?;
        }

        let cached = self.basket.as_deref().unwrap_or_default();

        if opts.convert_to_tables {
            if self.connectors.is_empty() {
                eprintln!(
                    "Warning: no archive connectors registered; returning basket items unconverted"
                );
            } else if opts.filter_archives {
                let filtered = self.filter_on_archive(cached);
                return Ok(BasketContents::Tables(self.to_tables(&filtered)));
            } else {
                return Ok(BasketContents::Tables(self.to_tables(cached)));
            }
        }

        // Items are cloned out of the cache only here, when an owned
        // basket is actually handed back.
        let items = if opts.filter_archives {
            self.filter_on_archive(cached)
        } else {
            cached.to_vec()
        };
        Ok(BasketContents::Items(items))
    }

    /// One GET against the basket endpoint, replacing the cached basket
    /// on success. Non-success statuses and transport errors only warn.
    fn fetch_basket(&mut self) -> Result<()> {
        let token = self.ensure_token()?;
        let url = format!(
            "{}/{}",
            self.host.trim_end_matches('/'),
            self.basket_endpoint.trim_start_matches('/')
        );

        let response = self
            .http
            .get(&url)
            .header(header::ACCEPT, "application/json")
            .bearer_auth(&token)
            .send();

        match response {
            Ok(response) if response.status().is_success() => {
                match response.json::<UserProfilesResponse>() {
                    Ok(profiles) => {
                        self.basket = Some(
                            profiles
                                .results
                                .into_iter()
                                .next()
                                .map(|profile| profile.shopping_cart)
                                .unwrap_or_default(),
                        );
                    }
                    Err(e) => {
                        eprintln!("Warning: malformed basket response from {}: {e}", self.host)
                    }
                }
            }
            Ok(response) => eprintln!(
                "Warning: unable to load basket from {} (HTTP {}); is your token valid?",
                self.host,
                response.status()
            ),
            Err(e) => eprintln!("Warning: unable to reach {}: {e}", self.host),
        }

        Ok(())
    }

    /// Hand back a valid token, running the acquisition chain when the
    /// current one is absent or expired.
    fn ensure_token(&mut self) -> Result<String> {
        if !token::is_valid_token(self.token.as_deref())? {
            let acquired = token::acquire_token(&self.http, &self.token_sources)?;
            if !token::is_valid_token(Some(&acquired))? {
                // Re-running the chain would hand back the same stale token.
                anyhow::bail!("acquired token is expired or not a JWT bearer token");
            }
            self.token = Some(acquired);
        }
        Ok(self.token.clone().unwrap_or_default())
    }

    /// Derived view of `items` keeping only those claimed by a registered
    /// connector. An item claimed by several connectors appears once per
    /// claimant; items with unparsable payloads are dropped silently.
    fn filter_on_archive(&self, items: &[BasketItem]) -> Vec<BasketItem> {
        let mut filtered = Vec::new();
        for item in items {
            for _claimant in self.connectors.claimants(item) {
                filtered.push(item.clone());
            }
        }
        filtered
    }

    /// One table per connector: the items it validates, converted in
    /// basket order. A later connector registered under the same name
    /// overwrites the earlier table, matching historical behavior.
    fn to_tables(&self, items: &[BasketItem]) -> TableSet {
        let mut tables = TableSet::new();
        for connector in self.connectors.connectors() {
            let rows: Table = items
                .iter()
                .filter(|item| connector.validate(item))
                .filter_map(|item| connector.convert(item, true))
                .collect();
            tables.insert(connector.name().to_string(), rows);
        }
        tables
    }
}
