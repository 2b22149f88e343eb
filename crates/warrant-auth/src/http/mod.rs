//! HTTP surface.
//!
//! - [`pkeys`] - `GET /api/pkeys` key set endpoint
//! - [`error`] - `IntoResponse` for [`AuthError`](crate::error::AuthError)

pub mod error;
pub mod pkeys;

pub use pkeys::{PkeysQuery, PkeysState, pkeys_handler, pkeys_router};
