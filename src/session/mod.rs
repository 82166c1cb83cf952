//! Session module - Authentication session lifecycle
//!
//! - `SessionStore`: the current access token, CSRF token and profile
//! - `PersistLoginGate`: silent restore of a previous login at start-up
//! - `with_refresh`: refresh-on-demand around authenticated requests

mod gate;
mod profile;
mod refresh;
mod store;

pub use gate::{GateState, PersistLoginGate, Rendered};
pub use profile::Profile;
pub use refresh::{refresh_session, with_refresh};
pub use store::{Session, SessionCallback, SessionStore};
