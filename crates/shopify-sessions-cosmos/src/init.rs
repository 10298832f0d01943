// Initialization supervisor
//
// Owns the one-time provisioning sequence: ensure the database exists,
// then the container. Runs at most 1 + max_retries attempts, each raced
// against a per-attempt deadline, with a capped exponential backoff
// between attempts. The outcome is published through one shared
// readiness future; every operation awaits it and observes the same
// result, and provisioning is never duplicated however many callers
// are waiting.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, info, warn};

use shopify_sessions_core::SessionStorageError;

use crate::client::{ClientError, CosmosClient};
use crate::config::InitializationTuning;

/// Shared completion signal of the initialization sequence
///
/// Cloning is cheap; all clones resolve to the same outcome.
#[derive(Clone)]
pub struct Readiness {
    shared: Shared<BoxFuture<'static, Result<(), SessionStorageError>>>,
}

impl Readiness {
    /// Wait for initialization to settle
    pub async fn wait(&self) -> Result<(), SessionStorageError> {
        self.shared.clone().await
    }
}

impl std::fmt::Debug for Readiness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Readiness")
            .field("settled", &self.shared.peek().is_some())
            .finish()
    }
}

/// Start the supervisor on the current runtime and hand back its signal
pub(crate) fn spawn_initialization(
    client: Arc<dyn CosmosClient>,
    db_name: String,
    container_name: String,
    partition_key_path: String,
    tuning: InitializationTuning,
) -> Readiness {
    let task = tokio::spawn(run_initialization(
        client,
        db_name,
        container_name,
        partition_key_path,
        tuning,
    ));

    let shared = async move {
        match task.await {
            Ok(outcome) => outcome,
            Err(join_error) => Err(SessionStorageError::Initialization {
                code: None,
                message: format!("initialization task failed: {join_error}"),
            }),
        }
    }
    .boxed()
    .shared();

    Readiness { shared }
}

/// How a single attempt went down
enum AttemptFailure {
    /// The attempt ran past its deadline
    Timeout,
    /// The provisioning sequence itself failed
    Client(ClientError),
}

async fn run_initialization(
    client: Arc<dyn CosmosClient>,
    db_name: String,
    container_name: String,
    partition_key_path: String,
    tuning: InitializationTuning,
) -> Result<(), SessionStorageError> {
    let mut attempt: u32 = 0;
    loop {
        debug!(attempt, database = %db_name, "starting initialization attempt");

        let failure = match run_attempt(
            client.clone(),
            db_name.clone(),
            container_name.clone(),
            partition_key_path.clone(),
            &tuning,
        )
        .await
        {
            Ok(()) => {
                info!(database = %db_name, container = %container_name, "session storage initialized");
                return Ok(());
            }
            Err(AttemptFailure::Client(error)) if error.is_auth() => {
                warn!(error = %error, "credentials rejected, not retrying");
                return Err(SessionStorageError::auth(error.to_string()));
            }
            Err(failure) => failure,
        };

        if attempt >= tuning.max_retries {
            return Err(match failure {
                AttemptFailure::Timeout => SessionStorageError::Timeout(tuning.attempt_timeout),
                AttemptFailure::Client(error) => SessionStorageError::Initialization {
                    code: error.status(),
                    message: error.to_string(),
                },
            });
        }

        let delay = tuning.delay_for_retry(attempt);
        match &failure {
            AttemptFailure::Timeout => {
                warn!(attempt, delay_ms = delay.as_millis() as u64, "initialization attempt timed out, backing off")
            }
            AttemptFailure::Client(error) => {
                warn!(attempt, error = %error, delay_ms = delay.as_millis() as u64, "initialization attempt failed, backing off")
            }
        }
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// Race one provisioning pass against the per-attempt deadline
///
/// On timeout the provisioning task is abandoned, not cancelled: its
/// handle is dropped and whatever it was doing runs out in the
/// background with its result discarded.
async fn run_attempt(
    client: Arc<dyn CosmosClient>,
    db_name: String,
    container_name: String,
    partition_key_path: String,
    tuning: &InitializationTuning,
) -> Result<(), AttemptFailure> {
    let mut provisioning = tokio::spawn(provision(
        client,
        db_name,
        container_name,
        partition_key_path,
    ));

    tokio::select! {
        outcome = &mut provisioning => match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(error)) => Err(AttemptFailure::Client(error)),
            Err(join_error) => Err(AttemptFailure::Client(ClientError::Transport(
                join_error.to_string(),
            ))),
        },
        _ = tokio::time::sleep(tuning.attempt_timeout) => Err(AttemptFailure::Timeout),
    }
}

async fn provision(
    client: Arc<dyn CosmosClient>,
    db_name: String,
    container_name: String,
    partition_key_path: String,
) -> Result<(), ClientError> {
    client.create_database_if_not_exists(&db_name).await?;
    client
        .create_container_if_not_exists(&db_name, &container_name, &partition_key_path)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{Map, Value};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use crate::client::{BulkOperation, QuerySpec};

    /// Client whose provisioning fails a scripted number of times
    struct ScriptedClient {
        attempts: AtomicU32,
        failures: u32,
        error: fn() -> ClientError,
        hang: bool,
    }

    impl ScriptedClient {
        fn failing_times(failures: u32, error: fn() -> ClientError) -> Self {
            Self {
                attempts: AtomicU32::new(0),
                failures,
                error,
                hang: false,
            }
        }

        fn hanging() -> Self {
            Self {
                attempts: AtomicU32::new(0),
                failures: u32::MAX,
                error: || ClientError::Transport("unreachable".to_string()),
                hang: true,
            }
        }

        fn attempts(&self) -> u32 {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CosmosClient for ScriptedClient {
        async fn create_database_if_not_exists(&self, _db_name: &str) -> Result<(), ClientError> {
            let seen = self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                return std::future::pending().await;
            }
            if seen < self.failures {
                Err((self.error)())
            } else {
                Ok(())
            }
        }

        async fn create_container_if_not_exists(
            &self,
            _db_name: &str,
            _container_name: &str,
            _partition_key_path: &str,
        ) -> Result<(), ClientError> {
            Ok(())
        }

        async fn upsert_item(
            &self,
            _db_name: &str,
            _container_name: &str,
            _document: Map<String, Value>,
            _partition_key: &str,
        ) -> Result<(), ClientError> {
            Ok(())
        }

        async fn read_item(
            &self,
            _db_name: &str,
            _container_name: &str,
            _id: &str,
            _partition_key: &str,
        ) -> Result<Option<Map<String, Value>>, ClientError> {
            Ok(None)
        }

        async fn delete_item(
            &self,
            _db_name: &str,
            _container_name: &str,
            _id: &str,
            _partition_key: &str,
        ) -> Result<(), ClientError> {
            Ok(())
        }

        async fn bulk(
            &self,
            _db_name: &str,
            _container_name: &str,
            _operations: Vec<BulkOperation>,
        ) -> Result<(), ClientError> {
            Ok(())
        }

        async fn query_items(
            &self,
            _db_name: &str,
            _container_name: &str,
            _query: QuerySpec,
            _partition_key: Option<&str>,
        ) -> Result<Vec<Map<String, Value>>, ClientError> {
            Ok(Vec::new())
        }

        async fn dispose(&self) {}
    }

    fn fast_tuning() -> InitializationTuning {
        InitializationTuning::default()
            .with_attempt_timeout(Duration::from_millis(50))
            .with_base_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(4))
            .with_max_retries(3)
    }

    fn start(client: Arc<ScriptedClient>, tuning: InitializationTuning) -> Readiness {
        spawn_initialization(
            client,
            "db".to_string(),
            "sessions".to_string(),
            "/id".to_string(),
            tuning,
        )
    }

    #[tokio::test]
    async fn test_succeeds_first_try() {
        let client = Arc::new(ScriptedClient::failing_times(0, || {
            ClientError::Transport("unused".to_string())
        }));
        let readiness = start(client.clone(), fast_tuning());

        readiness.wait().await.unwrap();
        assert_eq!(client.attempts(), 1);
    }

    #[tokio::test]
    async fn test_retries_transient_failures_then_succeeds() {
        let client = Arc::new(ScriptedClient::failing_times(2, || ClientError::Http {
            status: 503,
            message: "service unavailable".to_string(),
        }));
        let readiness = start(client.clone(), fast_tuning());

        readiness.wait().await.unwrap();
        assert_eq!(client.attempts(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_budget_reports_initialization_error() {
        let client = Arc::new(ScriptedClient::failing_times(u32::MAX, || ClientError::Http {
            status: 500,
            message: "boom".to_string(),
        }));
        let readiness = start(client.clone(), fast_tuning());

        let error = readiness.wait().await.unwrap_err();
        // One initial attempt plus max_retries
        assert_eq!(client.attempts(), 4);
        match error {
            SessionStorageError::Initialization { code, .. } => assert_eq!(code, Some(500)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_auth_failure_is_not_retried() {
        let client = Arc::new(ScriptedClient::failing_times(u32::MAX, || {
            ClientError::Unauthorized("invalid key".to_string())
        }));
        let readiness = start(client.clone(), fast_tuning());

        let error = readiness.wait().await.unwrap_err();
        assert_eq!(client.attempts(), 1);
        assert!(matches!(error, SessionStorageError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_persistent_timeouts_fail_with_timeout_error() {
        let tuning = fast_tuning().with_attempt_timeout(Duration::from_millis(10));
        let client = Arc::new(ScriptedClient::hanging());
        let readiness = start(client.clone(), tuning.clone());

        let error = readiness.wait().await.unwrap_err();
        assert_eq!(client.attempts(), 4);
        assert_eq!(error, SessionStorageError::Timeout(tuning.attempt_timeout));
    }

    #[tokio::test]
    async fn test_all_waiters_observe_the_same_outcome() {
        let client = Arc::new(ScriptedClient::failing_times(u32::MAX, || {
            ClientError::Unauthorized("invalid key".to_string())
        }));
        let readiness = start(client.clone(), fast_tuning());

        let (a, b) = tokio::join!(readiness.wait(), readiness.wait());
        assert_eq!(a, b);
        assert!(a.is_err());
        // Waiting again after settling never re-runs provisioning
        readiness.wait().await.unwrap_err();
        assert_eq!(client.attempts(), 1);
    }
}
