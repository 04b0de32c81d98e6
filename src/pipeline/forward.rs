//! Final stage: send the descriptor upstream and normalize the answer.

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::http::response::ResponseEnvelope;
use crate::observability::metrics;
use crate::pipeline::{RequestContext, Stage, StageOutcome};
use crate::proxy::{Completion, UpstreamClient};

pub struct ForwardStage {
    client: UpstreamClient,
}

impl ForwardStage {
    pub fn new(client: UpstreamClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Stage for ForwardStage {
    fn name(&self) -> &'static str {
        "forward"
    }

    async fn pre_handle(&self, ctx: &mut RequestContext) -> StageOutcome {
        let Some(descriptor) = ctx.descriptor.as_mut() else {
            return StageOutcome::Halt(GatewayError::Internal("forward without descriptor".to_string()));
        };

        let completion = self
            .client
            .dispatch(&ctx.request_id, descriptor)
            .wait()
            .await
            .unwrap_or_else(Completion::abandoned);

        metrics::record_upstream(completion.state.as_str(), completion.elapsed);

        descriptor.elapsed = Some(completion.elapsed);
        descriptor.response_status = completion.status;
        descriptor.response_headers = completion.headers;
        descriptor.response_body = completion.raw_body;

        match completion.result {
            Ok(body) => {
                let status = completion.status.unwrap_or_default();
                ctx.response = Some(ResponseEnvelope::from_upstream(
                    status,
                    &descriptor.response_headers,
                    body,
                ));
                StageOutcome::Continue
            }
            Err(e) => StageOutcome::Halt(e),
        }
    }
}
