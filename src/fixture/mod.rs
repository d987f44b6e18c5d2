//! Fixtures
//!
//! Named setup/teardown units with dependencies, once-per-run caching and
//! scoped visibility in the suite tree.

mod builtin;
mod engine;
mod scope;

#[cfg(test)]
pub use builtin::FnFixture;
pub use builtin::{env_value, fixture_env_name, CommandFixture, TempdirFixture, VariableFixture};
pub use engine::{CycleError, Fixture, FixtureState};
pub use scope::FixtureScope;
