//! CLI command implementations.

pub(crate) mod clean;
pub(crate) mod inspect;
pub(crate) mod list;
pub(crate) mod run;
