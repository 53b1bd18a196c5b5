pub mod credentials;
pub mod env;

pub use credentials::{CredentialStore, Credentials};
pub use env::{credentials_path, Endpoints};
