//! Schema-checked model calls
//!
//! [`ModelClient`] wraps a [`ModelBackend`] with a per-call timeout and
//! retries for transient errors. A reply that does not match the expected
//! schema gets exactly one strict re-ask; after that the caller receives a
//! failure it turns into a keyword [`Verdict::Fallback`].

use crate::model::schema::{parse_response, Validate};
use crate::model::{ModelBackend, ModelError, ModelRequest};
use crate::retry::{retry_async, RetryPolicy};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

/// Why a judgment came from the keyword fallback instead of the model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackCause {
    /// The reply never matched the schema, even after the strict retry
    Malformed,
    /// The backend could not be reached within the retry budget
    Unreachable,
}

/// A judgment and where it came from
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict<T> {
    Model(T),
    Fallback { value: T, cause: FallbackCause },
}

impl<T> Verdict<T> {
    pub fn value(&self) -> &T {
        match self {
            Self::Model(v) | Self::Fallback { value: v, .. } => v,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Self::Model(v) | Self::Fallback { value: v, .. } => v,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            Self::Fallback {
                cause: FallbackCause::Unreachable,
                ..
            }
        )
    }
}

/// A failed structured call
#[derive(Debug, Clone)]
pub struct CallFailure {
    pub cause: FallbackCause,
    pub error: ModelError,
}

/// Sends requests with timeout, retry and one strict re-ask on schema mismatch
#[derive(Clone)]
pub struct ModelClient {
    backend: Arc<dyn ModelBackend>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl ModelClient {
    pub fn new(backend: Arc<dyn ModelBackend>, timeout: Duration, retry: RetryPolicy) -> Self {
        Self {
            backend,
            timeout,
            retry,
        }
    }

    /// Calls the model and decodes a `T`
    ///
    /// Transient backend errors are retried per the retry policy. A reply
    /// that fails decoding or validation is asked again once with the strict
    /// instruction; only the reply that validates is returned.
    pub async fn call<T>(&self, request: &ModelRequest) -> Result<T, CallFailure>
    where
        T: DeserializeOwned + Validate,
    {
        let raw = self.complete(request).await?;
        let first_error = match parse_response::<T>(&raw) {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        tracing::warn!(
            role = %request.role,
            "non-conforming model reply, retrying strictly: {}",
            first_error
        );
        let strict = request.strict();
        let raw = self.complete(&strict).await?;
        parse_response::<T>(&raw).map_err(|e| {
            tracing::warn!(role = %request.role, "strict retry still non-conforming: {}", e);
            CallFailure {
                cause: FallbackCause::Malformed,
                error: ModelError::Decode(e),
            }
        })
    }

    async fn complete(&self, request: &ModelRequest) -> Result<String, CallFailure> {
        let backend = &self.backend;
        let timeout = self.timeout;
        retry_async(
            &self.retry,
            request.role.as_str(),
            |_| async move {
                match tokio::time::timeout(timeout, backend.complete(request)).await {
                    Ok(result) => result,
                    Err(_) => Err(ModelError::Timeout(timeout)),
                }
            },
            ModelError::is_transient,
        )
        .await
        .map_err(|error| CallFailure {
            cause: if error.is_unreachable() {
                FallbackCause::Unreachable
            } else {
                FallbackCause::Malformed
            },
            error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::schema::ClassifierVerdict;
    use crate::model::ModelRole;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Replies {
        replies: Mutex<Vec<Result<String, ModelError>>>,
        seen: Mutex<Vec<ModelRequest>>,
    }

    impl Replies {
        fn new(mut replies: Vec<Result<String, ModelError>>) -> Arc<Self> {
            replies.reverse();
            Arc::new(Self {
                replies: Mutex::new(replies),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ModelBackend for Replies {
        async fn complete(&self, request: &ModelRequest) -> Result<String, ModelError> {
            self.seen.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(ModelError::Unavailable("script exhausted".into())))
        }
    }

    fn client(backend: Arc<Replies>) -> ModelClient {
        ModelClient::new(backend, Duration::from_secs(5), RetryPolicy::new(3, Duration::ZERO))
    }

    fn request() -> ModelRequest {
        ModelRequest::new(ModelRole::Classify, "judge", serde_json::json!({}))
    }

    #[tokio::test]
    async fn test_valid_reply() {
        let backend = Replies::new(vec![Ok(r#"{"is_relevant": true}"#.into())]);
        let v: ClassifierVerdict = client(backend.clone()).call(&request()).await.unwrap();
        assert!(v.is_relevant);
        assert_eq!(backend.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_then_valid_uses_strict_retry() {
        let backend = Replies::new(vec![
            Ok("not json".into()),
            Ok(r#"{"is_relevant": false}"#.into()),
        ]);
        let v: ClassifierVerdict = client(backend.clone()).call(&request()).await.unwrap();
        assert!(!v.is_relevant);
        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(!seen[0].strict);
        assert!(seen[1].strict);
    }

    #[tokio::test]
    async fn test_malformed_twice_fails_malformed() {
        let backend = Replies::new(vec![Ok("{}".into()), Ok("nope".into())]);
        let err = client(backend).call::<ClassifierVerdict>(&request()).await.unwrap_err();
        assert_eq!(err.cause, FallbackCause::Malformed);
    }

    #[tokio::test]
    async fn test_unreachable_after_retries() {
        let backend = Replies::new(vec![]);
        let err = client(backend.clone()).call::<ClassifierVerdict>(&request()).await.unwrap_err();
        assert_eq!(err.cause, FallbackCause::Unreachable);
        assert_eq!(backend.seen.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_transient_error_then_success() {
        let backend = Replies::new(vec![
            Err(ModelError::Status { status: 503, body: String::new() }),
            Ok(r#"{"is_relevant": true}"#.into()),
        ]);
        assert!(client(backend).call::<ClassifierVerdict>(&request()).await.is_ok());
    }

    #[test]
    fn test_verdict_accessors() {
        let v = Verdict::Fallback {
            value: 3,
            cause: FallbackCause::Unreachable,
        };
        assert_eq!(*v.value(), 3);
        assert!(v.is_fallback());
        assert!(v.is_unreachable());
        assert!(!Verdict::Model(1).is_unreachable());
    }
}
