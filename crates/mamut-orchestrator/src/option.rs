//! The option pipeline.
//!
//! An option is a bundle of hooks that configure and deploy part of a devnet.
//! Options are composed into one tree and applied phase by phase: every
//! option's `before_deploy` runs before any option's `deploy`, and so on.
//! Phases are global barriers.
//!
//! | Phase | Typical work |
//! |---|---|
//! | `before_deploy` | validate inputs, store payloads |
//! | `deploy` | create shared resources |
//! | `after_deploy` | launch and register components |
//! | `finally` | cross-component wiring |
//!
//! `pre_hydrate` and `post_hydrate` run once per hydration, around the
//! orchestrator filling a fresh [`System`].
//!
//! The first failing hook aborts the pipeline. Nothing is rolled back; every
//! component registers its own scope cleanup.
//!
//! # Example
//!
//! ```ignore
//! use futures::FutureExt;
//! use mamut_orchestrator::option::{after_deploy, apply_option_lifecycle, Combined};
//!
//! let opt = Combined::new()
//!     .with(with_process_node(el_id, el_spec))
//!     .with(after_deploy(|orch: &LocalOrchestrator| {
//!         async move {
//!             orch.enable_time_travel();
//!             Ok(())
//!         }
//!         .boxed()
//!     }));
//!
//! apply_option_lifecycle(&opt, &orch).await?;
//! let system = hydrate_system(&orch, &opt)?;
//! ```

use crate::error::Result;
use crate::orchestrator::Orchestrator;
use crate::system::System;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;
use tracing::debug;

/// The deploy phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    /// Validation and preparation.
    BeforeDeploy,
    /// Shared resources.
    Deploy,
    /// Component launch and registration.
    AfterDeploy,
    /// Final wiring.
    Finally,
}

impl Phase {
    /// Every deploy phase, in order.
    pub const ALL: [Phase; 4] = [
        Phase::BeforeDeploy,
        Phase::Deploy,
        Phase::AfterDeploy,
        Phase::Finally,
    ];

    /// Snake-case name of the phase.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::BeforeDeploy => "before_deploy",
            Phase::Deploy => "deploy",
            Phase::AfterDeploy => "after_deploy",
            Phase::Finally => "finally",
        }
    }

    async fn run<O, S>(self, opt: &S, orch: &O) -> Result<()>
    where
        O: ?Sized + Sync,
        S: StackOption<O> + ?Sized,
    {
        match self {
            Phase::BeforeDeploy => opt.before_deploy(orch).await,
            Phase::Deploy => opt.deploy(orch).await,
            Phase::AfterDeploy => opt.after_deploy(orch).await,
            Phase::Finally => opt.finally(orch).await,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A composable unit of deployment logic for orchestrators of type `O`.
///
/// Every hook defaults to doing nothing.
#[async_trait]
pub trait StackOption<O: ?Sized + Sync>: Send + Sync {
    /// Validation and preparation.
    async fn before_deploy(&self, _orch: &O) -> Result<()> {
        Ok(())
    }

    /// Shared resources.
    async fn deploy(&self, _orch: &O) -> Result<()> {
        Ok(())
    }

    /// Component launch and registration.
    async fn after_deploy(&self, _orch: &O) -> Result<()> {
        Ok(())
    }

    /// Final wiring.
    async fn finally(&self, _orch: &O) -> Result<()> {
        Ok(())
    }

    /// Runs before the orchestrator hydrates `system`.
    fn pre_hydrate(&self, _system: &System) -> Result<()> {
        Ok(())
    }

    /// Runs after the orchestrator hydrated `system`.
    fn post_hydrate(&self, _system: &System) -> Result<()> {
        Ok(())
    }
}

/// Drives `orch` through every deploy phase of `opt`.
pub async fn apply_option_lifecycle<O, S>(opt: &S, orch: &O) -> Result<()>
where
    O: ?Sized + Sync,
    S: StackOption<O> + ?Sized,
{
    for phase in Phase::ALL {
        debug!(phase = %phase, "applying option phase");
        phase.run(opt, orch).await?;
    }
    Ok(())
}

/// Produces a fresh [`System`] from `orch`, running the hydration hooks of
/// `opt` around it.
pub fn hydrate_system<O, S>(orch: &O, opt: &S) -> Result<System>
where
    O: Orchestrator + ?Sized,
    S: StackOption<O> + ?Sized,
{
    let system = orch.new_system();
    opt.pre_hydrate(&system)?;
    orch.hydrate(&system)?;
    opt.post_hydrate(&system)?;
    Ok(system)
}

/// An ordered list of options applied as one.
pub struct Combined<O: ?Sized> {
    options: Vec<Box<dyn StackOption<O>>>,
}

impl<O: ?Sized + Sync + 'static> Combined<O> {
    /// Creates an empty combination.
    pub fn new() -> Self {
        Self {
            options: Vec::new(),
        }
    }

    /// Appends an option.
    pub fn add(&mut self, opt: impl StackOption<O> + 'static) -> &mut Self {
        self.options.push(Box::new(opt));
        self
    }

    /// Appends an option, builder style.
    pub fn with(mut self, opt: impl StackOption<O> + 'static) -> Self {
        self.add(opt);
        self
    }

    /// Number of direct members.
    pub fn len(&self) -> usize {
        self.options.len()
    }

    /// Returns true if there are no members.
    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }
}

impl<O: ?Sized + Sync + 'static> Default for Combined<O> {
    fn default() -> Self {
        Self::new()
    }
}

/// Combines boxed options in order.
pub fn combine<O: ?Sized + Sync + 'static>(
    options: impl IntoIterator<Item = Box<dyn StackOption<O>>>,
) -> Combined<O> {
    Combined {
        options: options.into_iter().collect(),
    }
}

#[async_trait]
impl<O: ?Sized + Sync + 'static> StackOption<O> for Combined<O> {
    async fn before_deploy(&self, orch: &O) -> Result<()> {
        for opt in &self.options {
            opt.before_deploy(orch).await?;
        }
        Ok(())
    }

    async fn deploy(&self, orch: &O) -> Result<()> {
        for opt in &self.options {
            opt.deploy(orch).await?;
        }
        Ok(())
    }

    async fn after_deploy(&self, orch: &O) -> Result<()> {
        for opt in &self.options {
            opt.after_deploy(orch).await?;
        }
        Ok(())
    }

    async fn finally(&self, orch: &O) -> Result<()> {
        for opt in &self.options {
            opt.finally(orch).await?;
        }
        Ok(())
    }

    fn pre_hydrate(&self, system: &System) -> Result<()> {
        self.options.iter().try_for_each(|opt| opt.pre_hydrate(system))
    }

    fn post_hydrate(&self, system: &System) -> Result<()> {
        self.options.iter().try_for_each(|opt| opt.post_hydrate(system))
    }
}

/// Deploy-phase hook.
pub type PhaseFn<O> = Box<dyn for<'a> Fn(&'a O) -> BoxFuture<'a, Result<()>> + Send + Sync>;

/// Hydration hook.
pub type HydrateFn = Box<dyn Fn(&System) -> Result<()> + Send + Sync>;

/// An option built from closures, one per phase.
pub struct FnOption<O: ?Sized> {
    before_deploy: Option<PhaseFn<O>>,
    deploy: Option<PhaseFn<O>>,
    after_deploy: Option<PhaseFn<O>>,
    finally: Option<PhaseFn<O>>,
    pre_hydrate: Option<HydrateFn>,
    post_hydrate: Option<HydrateFn>,
}

impl<O: ?Sized> FnOption<O> {
    /// Creates an option with no hooks.
    pub fn new() -> Self {
        Self {
            before_deploy: None,
            deploy: None,
            after_deploy: None,
            finally: None,
            pre_hydrate: None,
            post_hydrate: None,
        }
    }

    /// Sets the `before_deploy` hook.
    pub fn on_before_deploy<F>(mut self, f: F) -> Self
    where
        F: for<'a> Fn(&'a O) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
    {
        self.before_deploy = Some(Box::new(f));
        self
    }

    /// Sets the `deploy` hook.
    pub fn on_deploy<F>(mut self, f: F) -> Self
    where
        F: for<'a> Fn(&'a O) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
    {
        self.deploy = Some(Box::new(f));
        self
    }

    /// Sets the `after_deploy` hook.
    pub fn on_after_deploy<F>(mut self, f: F) -> Self
    where
        F: for<'a> Fn(&'a O) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
    {
        self.after_deploy = Some(Box::new(f));
        self
    }

    /// Sets the `finally` hook.
    pub fn on_finally<F>(mut self, f: F) -> Self
    where
        F: for<'a> Fn(&'a O) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
    {
        self.finally = Some(Box::new(f));
        self
    }

    /// Sets the `pre_hydrate` hook.
    pub fn on_pre_hydrate<F>(mut self, f: F) -> Self
    where
        F: Fn(&System) -> Result<()> + Send + Sync + 'static,
    {
        self.pre_hydrate = Some(Box::new(f));
        self
    }

    /// Sets the `post_hydrate` hook.
    pub fn on_post_hydrate<F>(mut self, f: F) -> Self
    where
        F: Fn(&System) -> Result<()> + Send + Sync + 'static,
    {
        self.post_hydrate = Some(Box::new(f));
        self
    }
}

impl<O: ?Sized> Default for FnOption<O> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<O: ?Sized + Sync + 'static> StackOption<O> for FnOption<O> {
    async fn before_deploy(&self, orch: &O) -> Result<()> {
        match &self.before_deploy {
            Some(f) => f(orch).await,
            None => Ok(()),
        }
    }

    async fn deploy(&self, orch: &O) -> Result<()> {
        match &self.deploy {
            Some(f) => f(orch).await,
            None => Ok(()),
        }
    }

    async fn after_deploy(&self, orch: &O) -> Result<()> {
        match &self.after_deploy {
            Some(f) => f(orch).await,
            None => Ok(()),
        }
    }

    async fn finally(&self, orch: &O) -> Result<()> {
        match &self.finally {
            Some(f) => f(orch).await,
            None => Ok(()),
        }
    }

    fn pre_hydrate(&self, system: &System) -> Result<()> {
        self.pre_hydrate.as_ref().map_or(Ok(()), |f| f(system))
    }

    fn post_hydrate(&self, system: &System) -> Result<()> {
        self.post_hydrate.as_ref().map_or(Ok(()), |f| f(system))
    }
}

/// Option with only a `before_deploy` hook.
pub fn before_deploy<O, F>(f: F) -> FnOption<O>
where
    O: ?Sized,
    F: for<'a> Fn(&'a O) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
{
    FnOption::new().on_before_deploy(f)
}

/// Option with only a `deploy` hook.
pub fn deploy<O, F>(f: F) -> FnOption<O>
where
    O: ?Sized,
    F: for<'a> Fn(&'a O) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
{
    FnOption::new().on_deploy(f)
}

/// Option with only an `after_deploy` hook.
pub fn after_deploy<O, F>(f: F) -> FnOption<O>
where
    O: ?Sized,
    F: for<'a> Fn(&'a O) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
{
    FnOption::new().on_after_deploy(f)
}

/// Option with only a `finally` hook.
pub fn finally<O, F>(f: F) -> FnOption<O>
where
    O: ?Sized,
    F: for<'a> Fn(&'a O) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
{
    FnOption::new().on_finally(f)
}

/// Option with only a `pre_hydrate` hook.
pub fn pre_hydrate<O, F>(f: F) -> FnOption<O>
where
    O: ?Sized,
    F: Fn(&System) -> Result<()> + Send + Sync + 'static,
{
    FnOption::new().on_pre_hydrate(f)
}

/// Option with only a `post_hydrate` hook.
pub fn post_hydrate<O, F>(f: F) -> FnOption<O>
where
    O: ?Sized,
    F: Fn(&System) -> Result<()> + Send + Sync + 'static,
{
    FnOption::new().on_post_hydrate(f)
}

/// An option for a concrete orchestrator `O`, usable in a pipeline over
/// `dyn Orchestrator`. See [`make_common`].
pub struct Common<O, S> {
    inner: S,
    _orchestrator: PhantomData<fn() -> O>,
}

/// Adapts an option written for orchestrator type `O` so it can join a
/// pipeline typed over `dyn Orchestrator`.
///
/// Deploy hooks run only when the runtime orchestrator is an `O`; otherwise
/// they log at debug level and succeed. Hydration hooks always run.
pub fn make_common<O, S>(opt: S) -> Common<O, S>
where
    O: Orchestrator,
    S: StackOption<O>,
{
    Common {
        inner: opt,
        _orchestrator: PhantomData,
    }
}

impl<O: Orchestrator, S: StackOption<O>> Common<O, S> {
    fn concrete<'a>(&self, orch: &'a dyn Orchestrator, phase: Phase) -> Option<&'a O> {
        let concrete = orch.as_any().downcast_ref::<O>();
        if concrete.is_none() {
            debug!(
                phase = %phase,
                expected = type_name::<O>(),
                backend = orch.backend(),
                "option does not apply to this orchestrator, skipping"
            );
        }
        concrete
    }
}

#[async_trait]
impl<O, S> StackOption<dyn Orchestrator> for Common<O, S>
where
    O: Orchestrator,
    S: StackOption<O>,
{
    async fn before_deploy(&self, orch: &(dyn Orchestrator + 'static)) -> Result<()> {
        match self.concrete(orch, Phase::BeforeDeploy) {
            Some(o) => self.inner.before_deploy(o).await,
            None => Ok(()),
        }
    }

    async fn deploy(&self, orch: &(dyn Orchestrator + 'static)) -> Result<()> {
        match self.concrete(orch, Phase::Deploy) {
            Some(o) => self.inner.deploy(o).await,
            None => Ok(()),
        }
    }

    async fn after_deploy(&self, orch: &(dyn Orchestrator + 'static)) -> Result<()> {
        match self.concrete(orch, Phase::AfterDeploy) {
            Some(o) => self.inner.after_deploy(o).await,
            None => Ok(()),
        }
    }

    async fn finally(&self, orch: &(dyn Orchestrator + 'static)) -> Result<()> {
        match self.concrete(orch, Phase::Finally) {
            Some(o) => self.inner.finally(o).await,
            None => Ok(()),
        }
    }

    fn pre_hydrate(&self, system: &System) -> Result<()> {
        self.inner.pre_hydrate(system)
    }

    fn post_hydrate(&self, system: &System) -> Result<()> {
        self.inner.post_hydrate(system)
    }
}
