pub mod api;
pub mod biometric;
pub mod bootstrap;
pub mod config;
pub mod credentials;
pub mod error;
#[cfg(test)]
mod http_stub;
pub mod location;
pub mod refresh;
pub mod runtime;
pub mod session;
pub mod token;

pub use bootstrap::SessionBootstrapper;
pub use config::SessionConfig;
pub use runtime::{RuntimeParts, SessionRuntime};
pub use session::{Session, SessionSnapshot, SessionState};
pub use token::{TokenKind, TokenStore};
