//! Filters decide whether a registration applies to a call.
//!
//! A filter reads the context and the operation kind and answers yes or no.
//! Not matching is never an error. The only failure a filter reports is a
//! lazy lookup that could not be resolved (see [`MediaTypeMatcher`]), which
//! aborts the pipeline for that call.
//!
//! Every filter can be inverted. Filters compose through [`FilterExt`].

use std::collections::BTreeMap;

use regex::Regex;

use crate::context::RequestContext;
use crate::error::{RegistryError, Result};
use crate::pipeline::Operation;

pub trait Filter: Send + Sync {
    fn matches(&self, ctx: &RequestContext<'_>, operation: Operation) -> Result<bool>;

    fn inverted(&self) -> bool {
        false
    }

    /// `matches`, negated when the filter is inverted.
    fn evaluate(&self, ctx: &RequestContext<'_>, operation: Operation) -> Result<bool> {
        Ok(self.matches(ctx, operation)? != self.inverted())
    }
}

pub struct And(Box<dyn Filter>, Box<dyn Filter>);
pub struct Or(Box<dyn Filter>, Box<dyn Filter>);
pub struct Not(Box<dyn Filter>);

impl Filter for And {
    fn matches(&self, ctx: &RequestContext<'_>, operation: Operation) -> Result<bool> {
        Ok(self.0.evaluate(ctx, operation)? && self.1.evaluate(ctx, operation)?)
    }
}

impl Filter for Or {
    fn matches(&self, ctx: &RequestContext<'_>, operation: Operation) -> Result<bool> {
        Ok(self.0.evaluate(ctx, operation)? || self.1.evaluate(ctx, operation)?)
    }
}

impl Filter for Not {
    fn matches(&self, ctx: &RequestContext<'_>, operation: Operation) -> Result<bool> {
        Ok(!self.0.evaluate(ctx, operation)?)
    }
}

pub trait FilterExt: Filter + Sized + 'static {
    fn and<F: Filter + 'static>(self, other: F) -> And {
        And(Box::new(self), Box::new(other))
    }

    fn or<F: Filter + 'static>(self, other: F) -> Or {
        Or(Box::new(self), Box::new(other))
    }

    fn not(self) -> Not {
        Not(Box::new(self))
    }
}

impl<T: Filter + Sized + 'static> FilterExt for T {}

#[derive(Debug, Clone, Copy, Default)]
pub struct MatchAll;

impl Filter for MatchAll {
    fn matches(&self, _ctx: &RequestContext<'_>, _operation: Operation) -> Result<bool> {
        Ok(true)
    }
}

/// Matches exactly when the calling session is simulating.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulationFilter;

impl Filter for SimulationFilter {
    fn matches(&self, ctx: &RequestContext<'_>, _operation: Operation) -> Result<bool> {
        Ok(ctx.session().is_simulating())
    }
}

/// Regex match over the complete path, parameters included.
///
/// Each operation kind has its own pattern; kinds without one never match.
/// Move, copy and rename are matched against their source path. Patterns
/// must match the whole path.
#[derive(Debug, Clone, Default)]
pub struct UrlMatcher {
    patterns: BTreeMap<Operation, Regex>,
    invert: bool,
}

impl UrlMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pattern(mut self, operation: Operation, pattern: &str) -> Result<Self> {
        self.patterns.insert(operation, compile(pattern)?);
        Ok(self)
    }

    pub fn patterns(mut self, operations: &[Operation], pattern: &str) -> Result<Self> {
        let regex = compile(pattern)?;
        for op in operations {
            self.patterns.insert(*op, regex.clone());
        }
        Ok(self)
    }

    /// Same pattern for every operation kind.
    pub fn any_operation(self, pattern: &str) -> Result<Self> {
        self.patterns(&Operation::ALL, pattern)
    }

    pub fn invert(mut self) -> Self {
        self.invert = true;
        self
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(&format!("^(?:{})$", pattern))
        .map_err(|e| RegistryError::Config(format!("invalid URL pattern '{}': {}", pattern, e)))
}

impl Filter for UrlMatcher {
    fn matches(&self, ctx: &RequestContext<'_>, operation: Operation) -> Result<bool> {
        let Some(regex) = self.patterns.get(&operation) else {
            return Ok(false);
        };
        let subject = match ctx.source_path() {
            Some(source) if operation.has_source() => source.to_string(),
            _ => ctx.path().to_string(),
        };
        Ok(regex.is_match(&subject))
    }

    fn inverted(&self) -> bool {
        self.invert
    }
}

/// Matches resources of one media type, case-insensitively.
///
/// The resource is looked up through the context on first use, so a
/// failing backend surfaces here as a resolution error.
#[derive(Debug, Clone)]
pub struct MediaTypeMatcher {
    media_type: String,
    invert: bool,
}

impl MediaTypeMatcher {
    pub fn new(media_type: impl Into<String>) -> Self {
        Self {
            media_type: media_type.into(),
            invert: false,
        }
    }

    pub fn invert(mut self) -> Self {
        self.invert = true;
        self
    }
}

impl Filter for MediaTypeMatcher {
    fn matches(&self, ctx: &RequestContext<'_>, _operation: Operation) -> Result<bool> {
        Ok(ctx
            .resource()?
            .and_then(|r| r.media_type.as_deref())
            .is_some_and(|m| m.eq_ignore_ascii_case(&self.media_type)))
    }

    fn inverted(&self) -> bool {
        self.invert
    }
}
