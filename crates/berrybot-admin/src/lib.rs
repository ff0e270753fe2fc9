//! Admin surface of Berrybot.
//!
//! Document management, knowledge-base sync and analytics over the
//! authenticated REST API, plus login against the user directory.

pub mod analytics;
pub mod auth;
pub mod client;
pub mod error;

pub use analytics::{AnalyticsView, CategoryCount, MapMarker};
pub use auth::UserDirectoryAuth;
pub use client::AdminClient;
pub use error::AdminError;
