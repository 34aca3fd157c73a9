pub mod auth;
pub mod configurator;
pub mod state;

pub use auth::{AuthConfig, AuthMethod, Cookie, FormAuth};
pub use configurator::SessionConfigurator;
pub use state::{ScanSession, SessionState};
