//! Request pipeline.
//!
//! # Data Flow
//! ```text
//! InboundRequest
//!     → prepare.rs  (route lookup, build ForwardRequestDescriptor)
//!     → validate.rs (caller key, AppInfo cache, one store batch, judges)
//!     → forward.rs  (async upstream call, content negotiation)
//!     → ResponseEnvelope (exactly one per request)
//! ```
//!
//! # Design Decisions
//! - Stages return `Continue | Halt(err)`; halting skips the rest
//! - A panicking stage is contained here and reported as a 500
//! - Stage list is fixed at construction; no stage runs twice

pub mod context;
pub mod forward;
pub mod prepare;
pub mod validate;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;

use crate::error::GatewayError;
use crate::http::response::ResponseEnvelope;
use crate::observability::metrics;

pub use context::{ForwardRequestDescriptor, InboundRequest, Payload, RequestContext};
pub use forward::ForwardStage;
pub use prepare::PrepareStage;
pub use validate::ValidateStage;

/// Result of one stage.
#[derive(Debug)]
pub enum StageOutcome {
    Continue,
    Halt(GatewayError),
}

/// One link of the chain.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn pre_handle(&self, ctx: &mut RequestContext) -> StageOutcome;
}

/// Ordered, immutable stage chain.
#[derive(Clone)]
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
}

impl Pipeline {
    pub fn new(stages: Vec<Arc<dyn Stage>>) -> Self {
        Self { stages }
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run a fresh request through every stage.
    pub async fn run(&self, request_id: impl Into<String>, inbound: InboundRequest) -> ResponseEnvelope {
        let mut ctx = RequestContext::new(request_id, inbound);
        self.run_with_context(&mut ctx).await
    }

    /// Run with a caller-owned context, so route and caller can be read afterwards.
    pub async fn run_with_context(&self, ctx: &mut RequestContext) -> ResponseEnvelope {
        for stage in &self.stages {
            let outcome = AssertUnwindSafe(stage.pre_handle(ctx)).catch_unwind().await;

            match outcome {
                Ok(StageOutcome::Continue) => {}
                Ok(StageOutcome::Halt(err)) => {
                    tracing::info!(
                        request_id = %ctx.request_id,
                        stage = stage.name(),
                        status = err.status_code().as_u16(),
                        error = %err,
                        "Pipeline halted"
                    );
                    metrics::record_rejection(err.kind());
                    return err.into_envelope();
                }
                Err(_) => {
                    tracing::error!(
                        request_id = %ctx.request_id,
                        stage = stage.name(),
                        "Stage panicked"
                    );
                    let err = GatewayError::Internal(format!("stage {} panicked", stage.name()));
                    metrics::record_rejection(err.kind());
                    return err.into_envelope();
                }
            }
        }

        match ctx.response.take() {
            Some(envelope) => envelope,
            None => {
                tracing::error!(request_id = %ctx.request_id, "Pipeline completed without a response");
                GatewayError::Internal("no stage produced a response".to_string()).into_envelope()
            }
        }
    }
}
