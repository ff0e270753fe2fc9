pub mod config;
pub mod credentials;
pub mod error;
pub mod protocol;
pub mod types;

pub use config::BerrybotConfig;
pub use credentials::{CredentialProvider, StaticCredentials, TokenSet, TokenStore};
pub use error::{BerrybotError, Result};
pub use types::*;
