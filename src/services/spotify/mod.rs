pub mod auth;
pub mod client;
pub mod types;

pub use auth::SpotifyAuth;
pub use client::{SpotifyClient, TokenRefresher};
pub use types::*;
