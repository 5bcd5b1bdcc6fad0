//! Core services: validation, default selection and send routing.
//!
//! These sit between a front end (CLI, HTTP layer) and the storage and
//! transport collaborators.

mod binding;
mod router;
mod selector;
mod validator;

pub use binding::{DefaultBinding, DefaultCell};
pub use router::{DefaultInfo, SendRouter};
pub use selector::{Candidate, DefaultSelector, rank_candidates};
pub use validator::{Validation, Validator};
