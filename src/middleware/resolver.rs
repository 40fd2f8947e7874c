//! Contract resolution.

use std::sync::Arc;

use tracing::debug;

use super::{BoxedMiddleware, Contract, Scope};
use crate::context::Context;
use crate::error::{Error, Reason, ResolutionError};
use crate::interrupt::Outcome;

/// Matches `required` contracts to `available` implementations.
///
/// The pipeline follows the order of `required`, never the order of
/// `available`, so the same inputs always yield the same stages. Fails when
/// a required contract has no implementation, or when any contract is
/// claimed by more than one implementation at this scope.
pub fn resolve(
    scope: Scope,
    required: &[Contract],
    available: &[BoxedMiddleware],
) -> Result<ResolvedPipeline, ResolutionError> {
    for (i, middleware) in available.iter().enumerate() {
        let contract = middleware.contract();
        let claimed_earlier = available[..i].iter().any(|m| m.contract() == contract);
        if claimed_earlier {
            continue;
        }
        let candidates: Vec<&'static str> = available[i..].iter()
            .filter(|m| m.contract() == contract)
            .map(|m| m.name())
            .collect();
        if candidates.len() > 1 {
            return Err(ResolutionError { scope, contract, context: Reason::Ambiguous { candidates } });
        }
    }

    let mut stages: Vec<BoxedMiddleware> = Vec::with_capacity(required.len());
    for &contract in required {
        if stages.iter().any(|s| s.contract() == contract) {
            continue;
        }
        let implementation = available.iter()
            .find(|m| m.contract() == contract)
            .ok_or(ResolutionError { scope, contract, context: Reason::Missing })?;
        stages.push(Arc::clone(implementation));
    }

    Ok(ResolvedPipeline { stages })
}

/// An ordered, ready-to-run middleware chain for one request.
///
/// Built from the kernel scope and then extended with group and route
/// scopes. A contract satisfied once is never satisfied again.
#[derive(Clone, Default)]
pub struct ResolvedPipeline {
    stages: Vec<BoxedMiddleware>,
}

impl ResolvedPipeline {
    /// Appends `other`'s stages, skipping contracts already present.
    pub fn extend(&mut self, other: ResolvedPipeline) {
        for stage in other.stages {
            if !self.stages.iter().any(|s| s.contract() == stage.contract()) {
                self.stages.push(stage);
            }
        }
    }

    pub fn contracts(&self) -> Vec<Contract> {
        self.stages.iter().map(|s| s.contract()).collect()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize { self.stages.len() }
    pub fn is_empty(&self) -> bool { self.stages.is_empty() }

    /// Runs every stage in order. Returns the first terminal outcome, or
    /// `Continue` once all stages passed.
    pub fn run(&self, ctx: &mut Context) -> Result<Outcome, Error> {
        for stage in &self.stages {
            let outcome = stage.process(ctx)?;
            if !outcome.is_continue() {
                debug!(stage = stage.name(), request_id = ctx.request_id(), "pipeline short-circuited");
                return Ok(outcome);
            }
        }
        Ok(Outcome::Continue)
    }
}

impl std::fmt::Debug for ResolvedPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
