//! Transient-failure retry around a chat client.

use std::time::Duration;

use tracing::warn;

use crate::client::{ChatClient, ChatError, ChatRequest};

/// Fixed-delay retry settings for chat requests.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

/// Complete a request, retrying transient failures with a fixed delay.
/// Fatal errors (auth, malformed response) return immediately.
pub async fn complete_with_retry(
    client: &dyn ChatClient,
    request: ChatRequest,
    policy: RetryPolicy,
) -> Result<String, ChatError> {
    let mut last = None;
    for attempt in 1..=policy.max_attempts {
        match client.complete(request.clone()).await {
            Ok(reply) => return Ok(reply),
            Err(error) if error.is_transient() => {
                warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %error,
                    "chat request failed, will retry"
                );
                last = Some(error);
                if attempt < policy.max_attempts {
                    tokio::time::sleep(policy.delay).await;
                }
            }
            Err(error) => return Err(error),
        }
    }
    Err(ChatError::Exhausted {
        attempts: policy.max_attempts,
        last: last.map(|e| e.to_string()).unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ChatMessage, MockChatClient};

    fn request() -> ChatRequest {
        ChatRequest::new("test-model", vec![ChatMessage::user("hi")])
    }

    fn transient() -> ChatError {
        ChatError::Response {
            status: 503,
            message: "unavailable".to_string(),
        }
    }

    fn policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let mock = MockChatClient::new()
            .fail(transient())
            .fail(transient())
            .reply("done");
        let reply = complete_with_retry(&mock, request(), policy(5)).await.unwrap();
        assert_eq!(reply, "done");
    }

    #[tokio::test]
    async fn test_exhaustion_reports_attempt_count() {
        let mock = MockChatClient::new()
            .fail(transient())
            .fail(transient())
            .fail(transient());
        let err = complete_with_retry(&mock, request(), policy(3)).await.unwrap_err();
        match err {
            ChatError::Exhausted { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fatal_error_is_not_retried() {
        let mock = MockChatClient::new()
            .fail(ChatError::Response {
                status: 401,
                message: "no key".to_string(),
            })
            .reply("never reached");
        let err = complete_with_retry(&mock, request(), policy(5)).await.unwrap_err();
        assert!(matches!(err, ChatError::Response { status: 401, .. }));
    }
}
