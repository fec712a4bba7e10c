//! Interaction, match and conversation coordination core.
//!
//! Everything the presentation layer does — swiping, sending, reading,
//! hiding — goes through [`facade::ChatFacade`]; the services underneath
//! own one concern each and push every check-and-act into a single SQL
//! statement so invariants hold under concurrent writers.

pub mod credits;
pub mod error;
pub mod facade;
pub mod matches;
pub mod notify;
pub mod swipes;
pub mod sync;
pub mod visibility;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{CoreError, CoreResult};
pub use facade::ChatFacade;
