//! Ordered, comparator-driven session matching.
//!
//! A [`NewSessionPipeline`] holds an ordered list of registered
//! [`CapabilityMatcher`]s. For each payload section it asks every matcher
//! for a candidate [`SessionProvider`], sorts the flattened candidate
//! list, and invokes the deferred factories one at a time until a session
//! is produced. An individual factory failing is not fatal: the pipeline
//! moves on to the next candidate and only reports
//! [`Error::NoProvider`](crate::Error::NoProvider) once every candidate
//! has been exhausted.
//!
//! # Example
//!
//! ```
//! use webdriver_negotiation::{
//!     CapabilitySet, Metadata, NewSessionPayload, NewSessionPipeline, Result,
//!     SessionProvider,
//! };
//!
//! fn example() -> Result<()> {
//!     let body = br#"{"capabilities": {"alwaysMatch": {"browserName": "firefox"}}}"#;
//!     let payload = NewSessionPayload::from_reader(&body[..], body.len() as u64)?;
//!
//!     let pipeline = NewSessionPipeline::builder()
//!         .match_with(|caps: &CapabilitySet, _meta: &Metadata| {
//!             let browser = caps.get("browserName")?.as_str()?.to_string();
//!             Some(SessionProvider::new(move || Ok(Some(browser))))
//!         })
//!         .build();
//!
//!     let session = pipeline.new_session(&payload)?;
//!     assert_eq!(session, "firefox");
//!     Ok(())
//! }
//! # example().unwrap();
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::cmp::Ordering;

use tracing::debug;

use crate::capabilities::{CapabilitySet, Metadata, PayloadSection};
use crate::error::{Error, Result};
use crate::payload::NewSessionPayload;

// ============================================================================
// CapabilityMatcher
// ============================================================================

/// A registered collaborator that inspects a capability set and the
/// request metadata and optionally yields a deferred session factory.
///
/// Implemented for free by closures of the matching shape.
pub trait CapabilityMatcher<S> {
    /// Returns a candidate provider, or `None` for no opinion.
    fn matches(&self, capabilities: &CapabilitySet, metadata: &Metadata)
        -> Option<SessionProvider<S>>;
}

impl<S, F> CapabilityMatcher<S> for F
where
    F: Fn(&CapabilitySet, &Metadata) -> Option<SessionProvider<S>>,
{
    fn matches(
        &self,
        capabilities: &CapabilitySet,
        metadata: &Metadata,
    ) -> Option<SessionProvider<S>> {
        self(capabilities, metadata)
    }
}

// ============================================================================
// SessionProvider
// ============================================================================

/// A deferred session factory with an optional ordering weight.
///
/// The factory is invoked at most once. It may fail, and it may decline
/// by producing `Ok(None)`; either way the pipeline continues with the
/// next candidate. Invocation can have externally visible effects (e.g.
/// resource reservation), so the pipeline never invokes candidates it has
/// already discarded and never invokes speculatively in parallel.
pub struct SessionProvider<S> {
    weight: Option<i64>,
    factory: Box<dyn FnOnce() -> Result<Option<S>>>,
}

impl<S> SessionProvider<S> {
    /// Creates an unweighted provider.
    #[must_use]
    pub fn new(factory: impl FnOnce() -> Result<Option<S>> + 'static) -> Self {
        Self {
            weight: None,
            factory: Box::new(factory),
        }
    }

    /// Creates a weighted provider. Higher weights are preferred by the
    /// default ordering.
    #[must_use]
    pub fn weighted(weight: i64, factory: impl FnOnce() -> Result<Option<S>> + 'static) -> Self {
        Self {
            weight: Some(weight),
            factory: Box::new(factory),
        }
    }

    /// The ordering weight, if this provider carries one.
    #[inline]
    #[must_use]
    pub fn weight(&self) -> Option<i64> {
        self.weight
    }

    /// Returns `true` if this provider participates in weighted ordering.
    #[inline]
    #[must_use]
    pub fn is_weighted(&self) -> bool {
        self.weight.is_some()
    }

    /// Invokes the deferred factory.
    fn create(self) -> Result<Option<S>> {
        (self.factory)()
    }
}

impl<S> std::fmt::Debug for SessionProvider<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionProvider")
            .field("weight", &self.weight)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Ordering
// ============================================================================

/// Comparator over candidate providers.
pub type ProviderComparator<S> =
    Box<dyn Fn(&SessionProvider<S>, &SessionProvider<S>) -> Ordering>;

/// The default candidate ordering: two weighted providers compare by
/// weight (higher first); a weighted provider sorts before an unweighted
/// one; two unweighted providers stay in registration order (the sort is
/// stable).
fn default_order<S>(lhs: &SessionProvider<S>, rhs: &SessionProvider<S>) -> Ordering {
    match (lhs.weight, rhs.weight) {
        (Some(lhs), Some(rhs)) => rhs.cmp(&lhs),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

// ============================================================================
// NewSessionPipeline
// ============================================================================

/// The session matching pipeline.
///
/// Built with [`NewSessionPipeline::builder`]; generic over the session
/// type the registered factories produce.
pub struct NewSessionPipeline<S> {
    matchers: Vec<Box<dyn CapabilityMatcher<S>>>,
    comparator: ProviderComparator<S>,
}

impl<S: 'static> NewSessionPipeline<S> {
    /// Starts building a pipeline.
    #[must_use]
    pub fn builder() -> PipelineBuilder<S> {
        PipelineBuilder::new()
    }
}

impl<S> NewSessionPipeline<S> {
    /// Negotiates a session for a parsed payload.
    ///
    /// # Errors
    ///
    /// - extraction errors from [`NewSessionPayload::sections`]
    /// - [`Error::NoProvider`](crate::Error::NoProvider) if no candidate
    ///   produced a session
    pub fn new_session(&self, payload: &NewSessionPayload) -> Result<S> {
        self.new_session_from_sections(&payload.sections()?)
    }

    /// Negotiates a session for an already-extracted section sequence.
    ///
    /// Sections are tried in their extraction order (legacy before W3C);
    /// candidates from all sections are flattened, sorted by the
    /// configured comparator, and invoked sequentially until one yields a
    /// session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoProvider`](crate::Error::NoProvider) if every
    /// candidate declined or failed.
    pub fn new_session_from_sections(&self, sections: &[PayloadSection]) -> Result<S> {
        let mut candidates: Vec<SessionProvider<S>> = Vec::new();
        for section in sections {
            for matcher in &self.matchers {
                if let Some(provider) =
                    matcher.matches(section.capabilities(), section.metadata())
                {
                    candidates.push(provider);
                }
            }
        }

        // Stable: ties keep section order, then matcher registration order.
        candidates.sort_by(|lhs, rhs| (self.comparator)(lhs, rhs));

        let total = candidates.len();
        debug!(candidates = total, sections = sections.len(), "matching session providers");

        for provider in candidates {
            match provider.create() {
                Ok(Some(session)) => return Ok(session),
                Ok(None) => {
                    debug!("session provider declined, trying next candidate");
                }
                Err(err) => {
                    debug!(error = %err, "session provider failed, trying next candidate");
                }
            }
        }

        Err(Error::no_provider(describe_sections(sections, total)))
    }
}

fn describe_sections(sections: &[PayloadSection], candidates: usize) -> String {
    let requested: Vec<&CapabilitySet> =
        sections.iter().map(PayloadSection::capabilities).collect();
    let rendered = serde_json::to_string(&requested)
        .unwrap_or_else(|_| format!("{} capability sets", requested.len()));
    format!("{candidates} candidates over {rendered}")
}

// ============================================================================
// PipelineBuilder
// ============================================================================

/// Builder for [`NewSessionPipeline`].
pub struct PipelineBuilder<S> {
    matchers: Vec<Box<dyn CapabilityMatcher<S>>>,
    comparator: ProviderComparator<S>,
}

impl<S: 'static> PipelineBuilder<S> {
    fn new() -> Self {
        Self {
            matchers: Vec::new(),
            comparator: Box::new(default_order),
        }
    }

    /// Registers a matcher. Registration order is the tie-break order.
    #[must_use]
    pub fn match_with(mut self, matcher: impl CapabilityMatcher<S> + 'static) -> Self {
        self.matchers.push(Box::new(matcher));
        self
    }

    /// Replaces the default candidate ordering.
    #[must_use]
    pub fn ordered_by(
        mut self,
        comparator: impl Fn(&SessionProvider<S>, &SessionProvider<S>) -> Ordering + 'static,
    ) -> Self {
        self.comparator = Box::new(comparator);
        self
    }

    /// Finishes the pipeline.
    #[must_use]
    pub fn build(self) -> NewSessionPipeline<S> {
        NewSessionPipeline {
            matchers: self.matchers,
            comparator: self.comparator,
        }
    }
}

impl<S: 'static> Default for PipelineBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::cell::Cell;
    use std::rc::Rc;

    use serde_json::json;

    use crate::payload::SpoolPolicy;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct FakeSession(&'static str);

    fn empty_w3c_payload() -> NewSessionPayload {
        let body = serde_json::to_vec(&json!({"capabilities": {}})).expect("serialize");
        NewSessionPayload::with_policy(
            body.as_slice(),
            body.len() as u64,
            SpoolPolicy::new(u64::MAX, u64::MAX),
        )
        .expect("payload accepted")
    }

    #[test]
    fn test_single_matcher_produces_session() {
        let pipeline = NewSessionPipeline::builder()
            .match_with(|_: &CapabilitySet, _: &Metadata| {
                Some(SessionProvider::new(|| Ok(Some(FakeSession("session")))))
            })
            .build();

        let session = pipeline.new_session(&empty_w3c_payload()).expect("session");
        assert_eq!(session, FakeSession("session"));
    }

    #[test]
    fn test_first_producing_provider_wins_and_later_ones_never_run() {
        let third_ran = Rc::new(Cell::new(false));
        let observed = Rc::clone(&third_ran);

        let pipeline = NewSessionPipeline::builder()
            .match_with(|_: &CapabilitySet, _: &Metadata| {
                Some(SessionProvider::new(|| Ok(None)))
            })
            .match_with(|_: &CapabilitySet, _: &Metadata| {
                Some(SessionProvider::new(|| Ok(Some(FakeSession("expected")))))
            })
            .match_with(move |_: &CapabilitySet, _: &Metadata| {
                let observed = Rc::clone(&observed);
                Some(SessionProvider::new(move || {
                    observed.set(true);
                    Ok(Some(FakeSession("never")))
                }))
            })
            .build();

        let session = pipeline.new_session(&empty_w3c_payload()).expect("session");
        assert_eq!(session, FakeSession("expected"));
        assert!(!third_ran.get(), "third provider must not be invoked");
    }

    #[test]
    fn test_failing_provider_falls_back_to_next_candidate() {
        let pipeline = NewSessionPipeline::builder()
            .match_with(|_: &CapabilitySet, _: &Metadata| {
                Some(SessionProvider::new(|| {
                    Err(Error::structural("reservation failed"))
                }))
            })
            .match_with(|_: &CapabilitySet, _: &Metadata| {
                Some(SessionProvider::new(|| Ok(Some(FakeSession("fallback")))))
            })
            .build();

        let session = pipeline.new_session(&empty_w3c_payload()).expect("session");
        assert_eq!(session, FakeSession("fallback"));
    }

    #[test]
    fn test_no_opinion_matchers_are_skipped() {
        let pipeline = NewSessionPipeline::builder()
            .match_with(|_: &CapabilitySet, _: &Metadata| None::<SessionProvider<FakeSession>>)
            .match_with(|_: &CapabilitySet, _: &Metadata| {
                Some(SessionProvider::new(|| Ok(Some(FakeSession("only")))))
            })
            .build();

        let session = pipeline.new_session(&empty_w3c_payload()).expect("session");
        assert_eq!(session, FakeSession("only"));
    }

    #[test]
    fn test_exhausted_candidates_fail_with_no_provider() {
        let pipeline = NewSessionPipeline::builder()
            .match_with(|_: &CapabilitySet, _: &Metadata| {
                Some(SessionProvider::new(|| Ok(None::<FakeSession>)))
            })
            .build();

        let err = pipeline
            .new_session(&empty_w3c_payload())
            .expect_err("no session available");
        assert!(matches!(err, Error::NoProvider { .. }));
    }

    #[test]
    fn test_empty_pipeline_fails_with_no_provider() {
        let pipeline = NewSessionPipeline::<FakeSession>::builder().build();
        let err = pipeline
            .new_session(&empty_w3c_payload())
            .expect_err("nothing registered");
        assert!(matches!(err, Error::NoProvider { .. }));
    }

    #[test]
    fn test_weighted_providers_order_by_weight() {
        let pipeline = NewSessionPipeline::builder()
            .match_with(|_: &CapabilitySet, _: &Metadata| {
                Some(SessionProvider::weighted(1, || {
                    Ok(Some(FakeSession("unexpected")))
                }))
            })
            .match_with(|_: &CapabilitySet, _: &Metadata| {
                Some(SessionProvider::weighted(5, || {
                    Ok(Some(FakeSession("expected")))
                }))
            })
            .build();

        let session = pipeline.new_session(&empty_w3c_payload()).expect("session");
        assert_eq!(session, FakeSession("expected"));
    }

    #[test]
    fn test_weighted_providers_sort_before_unweighted() {
        let pipeline = NewSessionPipeline::builder()
            .match_with(|_: &CapabilitySet, _: &Metadata| {
                Some(SessionProvider::new(|| Ok(Some(FakeSession("unweighted")))))
            })
            .match_with(|_: &CapabilitySet, _: &Metadata| {
                Some(SessionProvider::weighted(1, || {
                    Ok(Some(FakeSession("weighted")))
                }))
            })
            .build();

        let session = pipeline.new_session(&empty_w3c_payload()).expect("session");
        assert_eq!(session, FakeSession("weighted"));
    }

    #[test]
    fn test_custom_comparator_overrides_default_order() {
        // Prefer LOWER weights, the opposite of the default.
        let pipeline = NewSessionPipeline::builder()
            .match_with(|_: &CapabilitySet, _: &Metadata| {
                Some(SessionProvider::weighted(5, || {
                    Ok(Some(FakeSession("unexpected")))
                }))
            })
            .match_with(|_: &CapabilitySet, _: &Metadata| {
                Some(SessionProvider::weighted(1, || {
                    Ok(Some(FakeSession("expected")))
                }))
            })
            .ordered_by(|lhs, rhs| lhs.weight().cmp(&rhs.weight()))
            .build();

        let session = pipeline.new_session(&empty_w3c_payload()).expect("session");
        assert_eq!(session, FakeSession("expected"));
    }

    #[test]
    fn test_ties_preserve_registration_order() {
        let pipeline = NewSessionPipeline::builder()
            .match_with(|_: &CapabilitySet, _: &Metadata| {
                Some(SessionProvider::new(|| Ok(Some(FakeSession("first")))))
            })
            .match_with(|_: &CapabilitySet, _: &Metadata| {
                Some(SessionProvider::new(|| Ok(Some(FakeSession("second")))))
            })
            .build();

        let session = pipeline.new_session(&empty_w3c_payload()).expect("session");
        assert_eq!(session, FakeSession("first"));
    }

    #[test]
    fn test_matchers_run_per_section_in_extraction_order() {
        let body = serde_json::to_vec(&json!({
            "desiredCapabilities": {"browserName": "legacy"},
            "capabilities": {"alwaysMatch": {"browserName": "modern"}},
        }))
        .expect("serialize");
        let payload = NewSessionPayload::with_policy(
            body.as_slice(),
            body.len() as u64,
            SpoolPolicy::new(u64::MAX, u64::MAX),
        )
        .expect("payload accepted");

        // The matcher echoes whichever browser name it sees; the legacy
        // section is offered first.
        let pipeline = NewSessionPipeline::builder()
            .match_with(|caps: &CapabilitySet, _: &Metadata| {
                let name = caps.get("browserName")?.as_str()?.to_string();
                Some(SessionProvider::new(move || Ok(Some(name))))
            })
            .build();

        let session = pipeline.new_session(&payload).expect("session");
        assert_eq!(session, "legacy");
    }

    #[test]
    fn test_no_provider_error_carries_requested_capabilities() {
        let body = serde_json::to_vec(&json!({
            "capabilities": {"alwaysMatch": {"browserName": "cheese"}},
        }))
        .expect("serialize");
        let payload = NewSessionPayload::with_policy(
            body.as_slice(),
            body.len() as u64,
            SpoolPolicy::new(u64::MAX, u64::MAX),
        )
        .expect("payload accepted");

        let pipeline = NewSessionPipeline::<FakeSession>::builder().build();
        let err = pipeline.new_session(&payload).expect_err("no provider");
        assert!(err.to_string().contains("cheese"), "got: {err}");
    }
}
