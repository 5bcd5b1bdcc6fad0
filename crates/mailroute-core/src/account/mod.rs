//! Account management module.
//!
//! Provides mailbox identities bound to providers, and their storage.

mod model;
mod repository;

pub use model::{Account, AccountId};
pub use repository::AccountRepository;
