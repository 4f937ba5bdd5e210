//! Visitor Gate.
//!
//! Resolves the real client address of an inbound request, asks several
//! reputation providers whether it belongs to a bot, proxy or VPN, and
//! redirects the visitor to one of two destinations.
//!
//! # Features
//!
//! - **Address Resolution** - Ordered proxy headers with private-range filtering
//! - **Consensus Classification** - Five providers queried concurrently, any BLOCK wins
//! - **Fail-Open** - Provider errors and timeouts count as ALLOW
//! - **Enrichment** - ISP/country lookup for the logs
//!
//! # Example Configuration
//!
//! ```yaml
//! redirect:
//!   allow_url: "https://www.example.com/welcome"
//!   block_url: "https://www.example.org/"
//!
//! resolver:
//!   fallback_ip: "8.8.8.8"
//!
//! classifier:
//!   deadline_ms: 8000
//!
//! providers:
//!   getipintel:
//!     block_score: 0.99
//! ```

pub mod classifier;
pub mod config;
pub mod enrichment;
pub mod http;
pub mod providers;
pub mod redirector;
pub mod resolver;

pub use classifier::{ConsensusClassifier, Verdict};
pub use config::Config;
pub use redirector::{Decision, VisitorRedirector};
pub use resolver::resolve_client_ip;
