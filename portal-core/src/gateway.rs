use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{error, warn};

use crate::model::Turn;

/// Reply shown to the patient when the model cannot be reached. The chat flow
/// must always produce an assistant turn, so gateway failures never propagate
/// to the caller.
pub const SERVICE_BUSY_REPLY: &str =
    "I'm having trouble connecting right now. Please try again in a moment.";

pub const MAX_GATEWAY_ATTEMPTS: u32 = 3;

const RETRY_DELAY: Duration = Duration::from_millis(500);

#[derive(Error, Debug)]
pub enum GatewayError {
    /// Transient overload (HTTP 503/429 and friends); worth retrying.
    #[error("model overloaded: {0}")]
    Overloaded(String),

    #[error("gateway request failed: {0}")]
    Request(String),

    #[error("malformed gateway response: {0}")]
    MalformedResponse(String),
}

/// Stateless request/response interface to the LLM provider. Implementations
/// live outside the core; tests substitute fakes.
#[async_trait]
pub trait AiGateway: Send + Sync {
    /// Produces the assistant's next reply given the prior turns and the
    /// patient's new message.
    async fn generate_reply(
        &self,
        history: &[Turn],
        new_message: &str,
    ) -> std::result::Result<String, GatewayError>;

    /// Transcribes an uploaded audio blob.
    async fn transcribe(
        &self,
        audio: &[u8],
        mime_type: &str,
    ) -> std::result::Result<String, GatewayError>;
}

/// Calls the gateway with bounded retries on transient overload (up to
/// [`MAX_GATEWAY_ATTEMPTS`] attempts, fixed short delay) and degrades to
/// [`SERVICE_BUSY_REPLY`] on any terminal failure.
pub async fn reply_with_retry(gateway: &dyn AiGateway, history: &[Turn], new_message: &str) -> String {
    for attempt in 1..=MAX_GATEWAY_ATTEMPTS {
        match gateway.generate_reply(history, new_message).await {
            Ok(reply) => return reply,
            Err(GatewayError::Overloaded(reason)) if attempt < MAX_GATEWAY_ATTEMPTS => {
                warn!(attempt, reason = %reason, "model overloaded, retrying");
                tokio::time::sleep(RETRY_DELAY).await;
            }
            Err(err) => {
                error!(attempt, error = %err, "gateway call failed, answering with busy reply");
                return SERVICE_BUSY_REPLY.to_string();
            }
        }
    }
    SERVICE_BUSY_REPLY.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails with the given error a fixed number of times, then succeeds.
    struct FlakyGateway {
        failures: u32,
        transient: bool,
        calls: AtomicU32,
    }

    impl FlakyGateway {
        fn new(failures: u32, transient: bool) -> Self {
            Self {
                failures,
                transient,
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AiGateway for FlakyGateway {
        async fn generate_reply(
            &self,
            _history: &[Turn],
            _new_message: &str,
        ) -> std::result::Result<String, GatewayError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                if self.transient {
                    Err(GatewayError::Overloaded("503".to_string()))
                } else {
                    Err(GatewayError::Request("400".to_string()))
                }
            } else {
                Ok("hello from the model".to_string())
            }
        }

        async fn transcribe(
            &self,
            _audio: &[u8],
            _mime_type: &str,
        ) -> std::result::Result<String, GatewayError> {
            Err(GatewayError::Request("transcription not supported".to_string()))
        }
    }

    #[tokio::test]
    async fn succeeds_first_try() {
        let gateway = FlakyGateway::new(0, true);
        let reply = reply_with_retry(&gateway, &[], "hi").await;
        assert_eq!(reply, "hello from the model");
        assert_eq!(gateway.calls(), 1);
    }

    #[tokio::test]
    async fn recovers_after_transient_overload() {
        let gateway = FlakyGateway::new(2, true);
        let reply = reply_with_retry(&gateway, &[], "hi").await;
        assert_eq!(reply, "hello from the model");
        assert_eq!(gateway.calls(), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_degrade_to_busy_reply() {
        let gateway = FlakyGateway::new(u32::MAX, true);
        let reply = reply_with_retry(&gateway, &[], "hi").await;
        assert_eq!(reply, SERVICE_BUSY_REPLY);
        assert_eq!(gateway.calls(), MAX_GATEWAY_ATTEMPTS);
    }

    #[tokio::test]
    async fn non_transient_failure_does_not_retry() {
        let gateway = FlakyGateway::new(u32::MAX, false);
        let reply = reply_with_retry(&gateway, &[], "hi").await;
        assert_eq!(reply, SERVICE_BUSY_REPLY);
        assert_eq!(gateway.calls(), 1);
    }
}
