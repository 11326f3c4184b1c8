//! API Handlers

pub mod auth;
pub mod contracts;
pub mod health;
pub mod history;
pub mod punches;
pub mod sites;
pub mod users;

pub use auth::*;
pub use contracts::*;
pub use health::*;
pub use history::*;
pub use punches::*;
pub use sites::*;
pub use users::*;
