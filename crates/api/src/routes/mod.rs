pub mod auth;
pub mod health;

pub use auth::{logout, oauth2callback, signin, signin_redirect, AuthState};
pub use health::health_check;
