//! Fixture lifecycle
//!
//! A [`Fixture`] wraps user hooks with the lifecycle rules shared by every
//! fixture: dependency edges, once-only setup for `build_once` fixtures,
//! and failure recording instead of propagation.

use serde_json::Value;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::RunConfig;
use crate::utils::panic_message;

/// Adding a dependency would make the fixture graph cyclic
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("fixture '{fixture}' cannot require '{dependency}': the dependency graph would contain a cycle")]
pub struct CycleError {
    pub fixture: String,
    pub dependency: String,
}

/// Fixture lifecycle failures
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum FixtureError {
    #[error("fixture '{name}' failed to set up: {reason}")]
    Setup { name: String, reason: String },

    #[error("fixture '{name}' requires '{dependency}', which failed to set up")]
    Dependency { name: String, dependency: String },

    #[error("fixture '{name}' failed to tear down: {reason}")]
    Teardown { name: String, reason: String },
}

/// What a fixture's setup hook can see
pub struct SetupContext<'a> {
    pub config: &'a RunConfig,
    pub name: &'a str,
    /// Names of the fixtures that depend on this one
    pub required_by: Vec<String>,
    /// Values of the fixtures this one requires, in declaration order
    pub dependencies: Vec<(String, Value)>,
}

/// Setup and teardown behavior of a concrete fixture
pub trait FixtureHooks: Send + Sync {
    /// Acquire the resource and return the value tests will see
    fn setup(&self, ctx: &SetupContext<'_>) -> anyhow::Result<Value>;

    /// Release the resource acquired by `setup`
    fn teardown(&self, _value: &Value) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Lifecycle state of a fixture
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FixtureState {
    Uninitialized,
    Ready,
    Failed(FixtureError),
}

#[derive(Debug)]
struct Lifecycle {
    state: FixtureState,
    value: Value,
    /// Outstanding setups of a live non-`build_once` fixture
    holders: usize,
}

/// A named setup/teardown unit shared by tests and suites
pub struct Fixture {
    name: String,
    lazy_init: bool,
    build_once: bool,
    hooks: Box<dyn FixtureHooks>,
    lifecycle: Mutex<Lifecycle>,
    requires: Mutex<Vec<Arc<Fixture>>>,
    required_by: Mutex<Vec<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Fixture {
    /// Create a lazy fixture that is set up by every consumer
    pub fn new(name: impl Into<String>, hooks: impl FixtureHooks + 'static) -> Self {
        Self {
            name: name.into(),
            lazy_init: true,
            build_once: false,
            hooks: Box::new(hooks),
            lifecycle: Mutex::new(Lifecycle {
                state: FixtureState::Uninitialized,
                value: Value::Null,
                holders: 0,
            }),
            requires: Mutex::new(Vec::new()),
            required_by: Mutex::new(Vec::new()),
        }
    }

    pub fn lazy_init(mut self, lazy: bool) -> Self {
        self.lazy_init = lazy;
        self
    }

    /// Run setup at most once for the whole run
    pub fn build_once(mut self, once: bool) -> Self {
        self.build_once = once;
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_lazy(&self) -> bool {
        self.lazy_init
    }

    pub fn is_build_once(&self) -> bool {
        self.build_once
    }

    pub fn state(&self) -> FixtureState {
        lock(&self.lifecycle).state.clone()
    }

    /// Value produced by the last successful setup
    pub fn value(&self) -> Value {
        lock(&self.lifecycle).value.clone()
    }

    pub fn requires(&self) -> Vec<Arc<Fixture>> {
        lock(&self.requires).clone()
    }

    pub fn required_by(&self) -> Vec<String> {
        lock(&self.required_by).clone()
    }

    /// Add a dependency edge from `self` to `other`
    pub fn require(self: &Arc<Self>, other: &Arc<Fixture>) -> Result<(), CycleError> {
        if Arc::ptr_eq(self, other) || other.reaches(self) {
            return Err(CycleError {
                fixture: self.name.clone(),
                dependency: other.name.clone(),
            });
        }

        let mut requires = lock(&self.requires);
        if !requires.iter().any(|f| Arc::ptr_eq(f, other)) {
            requires.push(Arc::clone(other));
            lock(&other.required_by).push(self.name.clone());
        }
        Ok(())
    }

    /// Whether `target` is reachable through `requires` edges
    fn reaches(&self, target: &Fixture) -> bool {
        self.requires().iter().any(|dep| {
            std::ptr::eq(Arc::as_ptr(dep), target) || dep.reaches(target)
        })
    }

    /// Every fixture this one depends on, directly or transitively
    pub fn transitive_requires(&self) -> Vec<Arc<Fixture>> {
        let mut found: Vec<Arc<Fixture>> = Vec::new();
        let mut pending = self.requires();
        while let Some(dep) = pending.pop() {
            if found.iter().any(|f| Arc::ptr_eq(f, &dep)) {
                continue;
            }
            pending.extend(dep.requires());
            found.push(dep);
        }
        found
    }

    /// Set up this fixture and everything it requires.
    ///
    /// Failures are recorded in the fixture state and returned, never
    /// raised. A `build_once` fixture that already ran returns its cached
    /// outcome. Setting up a live non-`build_once` fixture joins the
    /// running instance; each setup must be paired with one teardown.
    pub fn setup(&self, config: &RunConfig) -> Result<(), FixtureError> {
        {
            let mut lifecycle = lock(&self.lifecycle);
            match &lifecycle.state {
                FixtureState::Ready if self.build_once => return Ok(()),
                FixtureState::Ready => {
                    lifecycle.holders += 1;
                    debug!("Fixture {} already live ({} holders)", self.name, lifecycle.holders);
                    return Ok(());
                }
                FixtureState::Failed(err) if self.build_once => return Err(err.clone()),
                FixtureState::Failed(_) | FixtureState::Uninitialized => {}
            }
        }

        let requires = self.requires();
        let mut dependencies = Vec::new();
        for (i, dep) in requires.iter().enumerate() {
            if dep.setup(config).is_err() {
                release_all(&requires[..i]);
                return Err(self.record_failure(FixtureError::Dependency {
                    name: self.name.clone(),
                    dependency: dep.name.clone(),
                }));
            }
            dependencies.push((dep.name.clone(), dep.value()));
        }

        let ctx = SetupContext {
            config,
            name: &self.name,
            required_by: self.required_by(),
            dependencies,
        };

        debug!("Setting up fixture {}", self.name);
        let outcome = catch_unwind(AssertUnwindSafe(|| self.hooks.setup(&ctx)));
        let reason = match outcome {
            Ok(Ok(value)) => {
                let mut lifecycle = lock(&self.lifecycle);
                lifecycle.state = FixtureState::Ready;
                lifecycle.value = value;
                lifecycle.holders = 1;
                return Ok(());
            }
            Ok(Err(err)) => format!("{err:#}"),
            Err(payload) => panic_message(payload),
        };

        release_all(&requires);
        Err(self.record_failure(FixtureError::Setup {
            name: self.name.clone(),
            reason,
        }))
    }

    fn record_failure(&self, err: FixtureError) -> FixtureError {
        warn!("{}", err);
        let mut lifecycle = lock(&self.lifecycle);
        lifecycle.state = FixtureState::Failed(err.clone());
        lifecycle.value = Value::Null;
        lifecycle.holders = 0;
        err
    }

    /// Release this fixture, then the non-`build_once` fixtures it set up.
    ///
    /// A fixture that was never set up is left alone. One whose setup
    /// failed already released its requirements, so it is only reset. A non-`build_once` fixture with
    /// other holders only drops one hold. The first failure is returned
    /// after every release has been attempted.
    pub fn teardown(&self) -> Result<(), FixtureError> {
        let value = {
            let mut lifecycle = lock(&self.lifecycle);
            let was_ready = match lifecycle.state {
                FixtureState::Uninitialized => return Ok(()),
                FixtureState::Ready if !self.build_once && lifecycle.holders > 1 => {
                    lifecycle.holders -= 1;
                    return Ok(());
                }
                FixtureState::Ready => true,
                FixtureState::Failed(_) => false,
            };
            lifecycle.state = FixtureState::Uninitialized;
            lifecycle.holders = 0;
            if !was_ready {
                return Ok(());
            }
            std::mem::take(&mut lifecycle.value)
        };

        debug!("Tearing down fixture {}", self.name);
        let outcome = catch_unwind(AssertUnwindSafe(|| self.hooks.teardown(&value)));
        let mut first_error = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(format!("{err:#}")),
            Err(payload) => Some(panic_message(payload)),
        }
        .map(|reason| FixtureError::Teardown {
            name: self.name.clone(),
            reason,
        });

        for dep in self.requires().iter().rev().filter(|d| !d.is_build_once()) {
            if let Err(err) = dep.teardown() {
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Undo the setups of `deps` after a dependent failed, last first
fn release_all(deps: &[Arc<Fixture>]) {
    for dep in deps.iter().rev().filter(|d| !d.is_build_once()) {
        if let Err(err) = dep.teardown() {
            warn!("{}", err);
        }
    }
}

impl fmt::Debug for Fixture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fixture")
            .field("name", &self.name)
            .field("lazy_init", &self.lazy_init)
            .field("build_once", &self.build_once)
            .field("state", &self.state())
            .finish()
    }
}
