//! Client engine for the MediaWiki action API.
//!
//! The engine issues well-formed requests, transparently recovers from the
//! two expected transient failures (stale CSRF token, `maxlag` throttling),
//! and layers higher-level operators on top: continuation-following queries,
//! capped multi-value batch splitting, and two bulk schedulers (bounded
//! fan-out and throttled-sequential).
//!
//! ```no_run
//! use wikibot::{Bot, BotConfig, Params, RequestOptions};
//!
//! # async fn run() -> Result<(), wikibot::Error> {
//! let config = BotConfig {
//!     api_url: "https://wiki.example.org/w/api.php".to_string(),
//!     ..BotConfig::default()
//! };
//! let bot = Bot::new(config)?;
//! let response = bot
//!     .request(
//!         Params::new().with("action", "query").with("meta", "siteinfo"),
//!         RequestOptions::default(),
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod actions;
pub mod batch;
pub mod client;
pub mod config;
pub mod error;
pub mod params;
pub mod title;
pub mod transport;

pub use batch::{BatchSummary, batch_operation, series_batch_operation};
pub use client::Bot;
pub use config::{BotConfig, HttpMethod, RequestOptions};
pub use error::{ApiError, Error};
pub use params::{Param, Params};
pub use title::{NamespaceMap, Title};
pub use transport::{CallStats, CallStatsSnapshot};
