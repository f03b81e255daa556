//! Sequenced actions with compensations
//!
//! Actions run in order over a shared [`Context`]. When one fails, the reverses of the actions
//! that already succeeded run newest first, then the original error is returned.

use cf_resources::{Deployment, Droplet};
use futures::future::BoxFuture;
use tracing::{debug, warn};

use super::models::AppDeployResponse;
use crate::errors::EngineError;

/// Data handed from one action to the next
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub app_response: AppDeployResponse,
    pub deployment: Option<Deployment>,
    pub droplet: Option<Droplet>,
    /// Revision deployed before this run, the rollback target
    pub revision: Option<String>,
}

pub type StepFuture<'a> = BoxFuture<'a, Result<(), EngineError>>;

type ForwardFn = Box<dyn for<'a> FnOnce(&'a mut Context) -> StepFuture<'a> + Send>;
type ReverseFn = Box<dyn for<'a> FnOnce(&'a Context) -> StepFuture<'a> + Send>;

/// One step of a deployment and, optionally, how to undo it
pub struct Action {
    name: &'static str,
    forward: ForwardFn,
    reverse: Option<ReverseFn>,
}

impl Action {
    pub fn new<F>(name: &'static str, forward: F) -> Self
    where
        F: for<'a> FnOnce(&'a mut Context) -> StepFuture<'a> + Send + 'static,
    {
        Self {
            name,
            forward: Box::new(forward),
            reverse: None,
        }
    }

    /// Undo run when a later action fails
    pub fn with_reverse<R>(mut self, reverse: R) -> Self
    where
        R: for<'a> FnOnce(&'a Context) -> StepFuture<'a> + Send + 'static,
    {
        self.reverse = Some(Box::new(reverse));
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl std::fmt::Debug for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("reversible", &self.reverse.is_some())
            .finish()
    }
}

/// Run `actions` in order from an empty context.
///
/// Returns the last context together with the first forward error, if any. Failing reverses are
/// logged and do not stop the remaining ones.
pub async fn execute(actions: Vec<Action>) -> (Context, Result<(), EngineError>) {
    let mut ctx = Context::default();
    let mut completed: Vec<(&'static str, Option<ReverseFn>)> = Vec::with_capacity(actions.len());

    for action in actions {
        let Action {
            name,
            forward,
            reverse,
        } = action;
        debug!("Running action: {}", name);

        if let Err(e) = forward(&mut ctx).await {
            warn!("Action {} failed: {}", name, e);
            rollback(&ctx, completed).await;
            return (ctx, Err(e));
        }
        completed.push((name, reverse));
    }

    (ctx, Ok(()))
}

async fn rollback(ctx: &Context, completed: Vec<(&'static str, Option<ReverseFn>)>) {
    for (name, reverse) in completed.into_iter().rev() {
        let Some(reverse) = reverse else {
            continue;
        };
        debug!("Reversing action: {}", name);
        if let Err(e) = reverse(ctx).await {
            warn!("Failed to reverse action {}: {}", name, e);
        }
    }
}
