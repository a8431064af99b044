pub mod auth;

pub use auth::{GoogleApiClient, LoginFlowController};

#[cfg(test)]
mod test_utils;
