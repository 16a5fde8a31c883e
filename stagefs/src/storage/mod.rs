mod credentials;

pub use credentials::{CredentialError, CredentialStore, password_from_env};
