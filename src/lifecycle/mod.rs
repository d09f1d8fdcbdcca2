//! App lifecycle orchestration.
//!
//! For every app in a batch the orchestrator reads the on-disk status through
//! [`AppStateQuery`], plans the shortest [`ActionChain`] that reaches the
//! requested state, and runs each step through an [`ActionExecutor`].
//!
//! Every step receives the accumulated [`State`] and returns updates that are
//! merged into it. The accumulator is not reset between apps: what app N's
//! steps wrote is the starting state for app N+1.

pub mod marker;

pub use marker::{BuildMarker, FsAppState, OutputLock};

use std::fmt;

use anyhow::Result;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::error::LifecycleError;

/// Accumulated state threaded through lifecycle steps.
pub type State = serde_json::Map<String, Value>;

/// A single lifecycle step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Create,
    Update,
    Build,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Update => "update",
            Action::Build => "build",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the user asked a build to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildRequest {
    Build,
    UpdateAndBuild,
}

/// A top-level lifecycle command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// Create apps that do not exist yet.
    Create,
    /// Update apps that already exist.
    Update,
    /// Build apps, creating or updating them first as needed.
    Build(BuildRequest),
}

impl Request {
    /// Chain for an app in `status`.
    ///
    /// `Create` and `Update` are single-step commands and refuse apps in the
    /// wrong state; `Build` always succeeds.
    pub fn chain(&self, app: &str, status: AppStatus) -> Result<ActionChain, LifecycleError> {
        match self {
            Request::Create if status.exists => Err(LifecycleError::AlreadyCreated {
                app: app.to_string(),
            }),
            Request::Create => Ok(ActionChain(vec![Action::Create])),
            Request::Update if !status.exists => Err(LifecycleError::NotCreated {
                app: app.to_string(),
            }),
            Request::Update => Ok(ActionChain(vec![Action::Update])),
            Request::Build(request) => Ok(plan(status, *request)),
        }
    }
}

/// On-disk lifecycle status of one app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AppStatus {
    /// The bundle directory exists.
    pub exists: bool,
    /// A build marker exists.
    pub built: bool,
}

impl AppStatus {
    pub fn load(query: &dyn AppStateQuery, app: &AppConfig) -> Result<Self, LifecycleError> {
        let wrap = |source: anyhow::Error| LifecycleError::State {
            app: app.name.clone(),
            source: source.into(),
        };
        Ok(Self {
            exists: query.bundle_exists(app).map_err(wrap)?,
            built: query.build_marker_exists(app).map_err(wrap)?,
        })
    }
}

/// Ordered steps for one app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionChain(Vec<Action>);

impl ActionChain {
    pub fn actions(&self) -> &[Action] {
        &self.0
    }
}

impl fmt::Display for ActionChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(Action::as_str).collect();
        write!(f, "{}", names.join(" -> "))
    }
}

/// Plan the steps a build request needs.
///
/// A fresh create leaves the app current, so no update is inserted after it.
/// An existing app is rebuilt in place, after an update when one is asked for.
pub fn plan(status: AppStatus, request: BuildRequest) -> ActionChain {
    let steps = match (status.exists, request) {
        (false, _) => vec![Action::Create, Action::Build],
        (true, BuildRequest::Build) => vec![Action::Build],
        (true, BuildRequest::UpdateAndBuild) => vec![Action::Update, Action::Build],
    };
    ActionChain(steps)
}

/// Filesystem truth about apps, supplied by the caller.
pub trait AppStateQuery {
    fn bundle_exists(&self, app: &AppConfig) -> Result<bool>;
    fn build_marker_exists(&self, app: &AppConfig) -> Result<bool>;
}

/// Performs lifecycle steps. Each step returns the state entries it adds.
pub trait ActionExecutor {
    /// Check host tools before an app is processed.
    fn verify_tools(&mut self, app: &AppConfig) -> Result<()>;
    fn create(&mut self, app: &AppConfig, state: &State) -> Result<State>;
    fn update(&mut self, app: &AppConfig, state: &State) -> Result<State>;
    fn build(&mut self, app: &AppConfig, state: &State) -> Result<State>;
}

/// Outcome of a batch run.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    /// Chain executed for each app, in processing order.
    pub chains: Vec<(String, ActionChain)>,
    /// Accumulator after the last step.
    pub state: State,
}

/// Run `chain` for `app`, merging each step's updates into `state`.
pub fn run_chain(
    app: &AppConfig,
    chain: &ActionChain,
    executor: &mut dyn ActionExecutor,
    mut state: State,
) -> Result<State, LifecycleError> {
    for &action in chain.actions() {
        info!(app = %app.name, %action, "running lifecycle step");
        let result = match action {
            Action::Create => executor.create(app, &state),
            Action::Update => executor.update(app, &state),
            Action::Build => executor.build(app, &state),
        };
        let updates = result.map_err(|source| LifecycleError::Action {
            action,
            app: app.name.clone(),
            source: source.into(),
        })?;
        debug!(
            app = %app.name,
            %action,
            keys = ?updates.keys().collect::<Vec<_>>(),
            "merging step state"
        );
        state.extend(updates);
    }
    Ok(state)
}

/// Verify tools, plan, and run `request` for a single app.
pub fn run_app(
    app: &AppConfig,
    request: Request,
    query: &dyn AppStateQuery,
    executor: &mut dyn ActionExecutor,
    state: State,
) -> Result<(ActionChain, State), LifecycleError> {
    executor
        .verify_tools(app)
        .map_err(|source| LifecycleError::Verify {
            app: app.name.clone(),
            source: source.into(),
        })?;

    let status = AppStatus::load(query, app)?;
    let chain = request.chain(&app.name, status)?;
    debug!(app = %app.name, ?status, %chain, "planned lifecycle");

    let state = run_chain(app, &chain, executor, state)?;
    Ok((chain, state))
}

/// Run `request` over `apps` in order, threading `state` across all of them.
///
/// The first failure aborts the batch.
pub fn run_batch(
    apps: &[AppConfig],
    request: Request,
    query: &dyn AppStateQuery,
    executor: &mut dyn ActionExecutor,
    mut state: State,
) -> Result<BatchReport, LifecycleError> {
    let mut chains = Vec::with_capacity(apps.len());
    for app in apps {
        let (chain, next) = run_app(app, request, query, executor, state)?;
        state = next;
        chains.push((app.name.clone(), chain));
    }
    Ok(BatchReport { chains, state })
}
