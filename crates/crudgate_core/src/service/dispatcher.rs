//! Single entry point from the transport adapter into the core.
//!
//! # Responsibility
//! - Resolve the envelope's model/resource to a registered entity.
//! - Select the handler for the envelope's method and run it.
//! - Turn every failure into an `ErrorEnvelope`.
//!
//! # Invariants
//! - Unknown resources and methods fail before any storage or audit call.
//! - Interceptors run in registration order around every call and are fixed
//!   at construction time.

use crate::model::envelope::{OperationEnvelope, OperationKind};
use crate::model::response::{DispatchOutcome, ResponseEnvelope};
use crate::repo::audit_repo::AuditSink;
use crate::repo::entity::EntityRegistry;
use crate::repo::entity_store::Storage;
use crate::service::audit::{AuditOptions, AuditRecorder};
use crate::service::error::{DispatchError, DispatchResult};
use crate::service::handlers::{handler_for, HandlerContext};
use crate::service::options::HandlerOptions;
use log::{error, info};
use std::time::Instant;

/// Caller identity supplied by the transport's session layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub actor: Option<String>,
}

impl RequestContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn for_actor(actor: impl Into<String>) -> Self {
        Self {
            actor: Some(actor.into()),
        }
    }
}

pub type RequestTransform = Box<dyn Fn(OperationEnvelope) -> OperationEnvelope + Send + Sync>;
pub type ResponseTransform = Box<dyn Fn(DispatchOutcome) -> DispatchOutcome + Send + Sync>;

/// Ordered request/response transforms applied around each dispatch.
#[derive(Default)]
pub struct Interceptors {
    request: Vec<RequestTransform>,
    response: Vec<ResponseTransform>,
}

impl Interceptors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_request(
        mut self,
        transform: impl Fn(OperationEnvelope) -> OperationEnvelope + Send + Sync + 'static,
    ) -> Self {
        self.request.push(Box::new(transform));
        self
    }

    pub fn on_response(
        mut self,
        transform: impl Fn(DispatchOutcome) -> DispatchOutcome + Send + Sync + 'static,
    ) -> Self {
        self.response.push(Box::new(transform));
        self
    }

    fn apply_request(&self, envelope: OperationEnvelope) -> OperationEnvelope {
        self.request
            .iter()
            .fold(envelope, |envelope, transform| transform(envelope))
    }

    fn apply_response(&self, outcome: DispatchOutcome) -> DispatchOutcome {
        self.response
            .iter()
            .fold(outcome, |outcome, transform| transform(outcome))
    }
}

/// Routes operation envelopes to handlers.
pub struct Dispatcher<'a> {
    storage: &'a dyn Storage,
    registry: EntityRegistry,
    options: HandlerOptions,
    audit_sink: Option<&'a dyn AuditSink>,
    audit_options: AuditOptions,
    interceptors: Interceptors,
}

impl<'a> Dispatcher<'a> {
    /// Creates a dispatcher over an already validated registry.
    pub fn new(storage: &'a dyn Storage, registry: EntityRegistry) -> Self {
        Self {
            storage,
            registry,
            options: HandlerOptions::default(),
            audit_sink: None,
            audit_options: AuditOptions::default(),
            interceptors: Interceptors::default(),
        }
    }

    pub fn with_options(mut self, options: HandlerOptions) -> Self {
        self.options = options;
        self
    }

    /// Enables audit recording through `sink` for operations `options` selects.
    pub fn with_audit(mut self, sink: &'a dyn AuditSink, options: AuditOptions) -> Self {
        self.audit_sink = Some(sink);
        self.audit_options = options;
        self
    }

    pub fn with_interceptors(mut self, interceptors: Interceptors) -> Self {
        self.interceptors = interceptors;
        self
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    /// Serves one envelope. Never fails outright: errors come back as
    /// `ErrorEnvelope`s.
    pub fn dispatch(&self, ctx: &RequestContext, envelope: OperationEnvelope) -> DispatchOutcome {
        let envelope = self.interceptors.apply_request(envelope);
        let started_at = Instant::now();

        let outcome = match self.try_dispatch(ctx, &envelope) {
            Ok(response) => {
                info!(
                    "event=dispatch module=service status=ok method={} resource={} duration_ms={}",
                    envelope.method,
                    envelope.resource,
                    started_at.elapsed().as_millis()
                );
                Ok(response)
            }
            Err(err) => {
                error!(
                    "event=dispatch module=service status=error method={} resource={} duration_ms={} error_code={} error={}",
                    envelope.method,
                    envelope.resource,
                    started_at.elapsed().as_millis(),
                    err.code(),
                    err
                );
                Err(err.to_envelope())
            }
        };

        self.interceptors.apply_response(outcome)
    }

    /// Same as `dispatch` but keeps the typed error, for in-process callers.
    pub fn try_dispatch(
        &self,
        ctx: &RequestContext,
        envelope: &OperationEnvelope,
    ) -> DispatchResult<ResponseEnvelope> {
        let entity_name = envelope.entity_name();
        let entity = self
            .registry
            .resolve(entity_name)
            .ok_or_else(|| DispatchError::UnknownResource(entity_name.to_string()))?;
        let kind = OperationKind::parse(&envelope.method)
            .ok_or_else(|| DispatchError::UnsupportedOperation(envelope.method.clone()))?;

        let audit = if kind.is_mutation() {
            AuditRecorder::new(
                self.audit_sink,
                &self.audit_options,
                kind,
                &envelope.resource,
                ctx.actor.as_deref(),
            )
        } else {
            AuditRecorder::disabled(kind, &envelope.resource)
        };

        let handler_ctx = HandlerContext {
            store: self.storage.entity(entity, &self.registry),
            entity,
            registry: &self.registry,
            storage: self.storage,
            options: &self.options,
            audit,
        };
        handler_for(kind)(&handler_ctx, envelope.params.clone())
    }
}
