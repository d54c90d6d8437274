#![doc = include_str!("../README.md")]

pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod oauth;
pub mod pkce;
pub mod types;

// Re-exports for convenient access
pub use client::{DEFAULT_SAMPLING_INTERVAL, PelotonClient};
pub use config::ClientConfig;
pub use error::Error;
pub use models::{UserProfile, UserSettings, WorkoutRecord};
pub use oauth::{AuthClient, MAX_AUTHORIZE_REDIRECTS, MAX_CALLBACK_REDIRECTS, TokenResponse};
pub use pkce::{PkceChallenge, generate_code_challenge, generate_code_verifier, generate_state};
pub use types::{Credentials, InstructorId, TokenPair, UserId, WorkoutId};
