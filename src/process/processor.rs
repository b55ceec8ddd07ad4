// Per-message state machine. Correctness under redelivery and racing
// workers rests on the headline URL uniqueness constraint; there is no
// cross-worker coordination.

use crate::classify::{Classifier, ClassifyError};
use crate::queue::QueueMessage;
use crate::retry::RetryPolicy;
use crate::storage::{Database, Headline, NewHeadline, StoreError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Terminal result of handling one message. Every variant acknowledges
/// the delivery; a duplicate is a success, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The URL was already stored before this message was handled.
    AlreadyStored,
    /// A fresh row was written.
    Inserted { headline_id: i64 },
    /// Another delivery wrote the URL between the lookup and the insert.
    ConcurrentInsert,
    /// The message names a publication the store does not know, or none.
    InvalidPublication,
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Store operation failed: {0}")]
    Store(#[from] StoreError),
    #[error("Classification failed: {0}")]
    Classify(#[from] ClassifyError),
}

pub struct Processor {
    db: Database,
    classifier: Arc<dyn Classifier>,
    retry: RetryPolicy,
    op_timeout: Duration,
}

impl Processor {
    pub fn new(
        db: Database,
        classifier: Arc<dyn Classifier>,
        retry: RetryPolicy,
        op_timeout: Duration,
    ) -> Self {
        Self {
            db,
            classifier,
            retry,
            op_timeout,
        }
    }

    /// Handle one message to a terminal outcome.
    ///
    /// Lookups and classification are retried per the policy; the insert
    /// itself gets a single attempt, with a uniqueness conflict mapped to
    /// [`Outcome::ConcurrentInsert`]. Errors returned here mean the
    /// delivery should be retried by the queue.
    pub async fn process(&self, message: &QueueMessage) -> Result<Outcome, ProcessError> {
        let existing = self
            .retry
            .run("headline lookup", StoreError::is_retryable, || {
                self.find_existing_once(&message.headline_url)
            })
            .await?;
        if let Some(headline) = existing {
            debug!(
                url = %message.headline_url,
                headline_id = headline.id,
                "Headline already stored, skipping"
            );
            return Ok(Outcome::AlreadyStored);
        }

        let category = self
            .retry
            .run("classify headline", ClassifyError::is_retryable, || {
                self.classifier.classify(&message.headline)
            })
            .await?;

        self.store(message, category).await
    }

    async fn find_existing_once(&self, url: &str) -> Result<Option<Headline>, StoreError> {
        timeout(self.op_timeout, self.db.find_headline_by_url(url))
            .await
            .map_err(|_| StoreError::Timeout)?
    }

    async fn publication_exists_once(&self, id: i64) -> Result<bool, StoreError> {
        timeout(self.op_timeout, self.db.publication_exists(id))
            .await
            .map_err(|_| StoreError::Timeout)?
    }

    async fn store(
        &self,
        message: &QueueMessage,
        category: String,
    ) -> Result<Outcome, ProcessError> {
        let publication_id = match message.publication_id {
            Some(id) => id,
            None => {
                warn!(
                    url = %message.headline_url,
                    "Message carries no publication reference, skipping"
                );
                return Ok(Outcome::InvalidPublication);
            }
        };

        let known = self
            .retry
            .run("publication lookup", StoreError::is_retryable, || {
                self.publication_exists_once(publication_id)
            })
            .await?;
        if !known {
            warn!(
                url = %message.headline_url,
                publication_id,
                "Unknown publication reference, skipping"
            );
            return Ok(Outcome::InvalidPublication);
        }

        let new = NewHeadline {
            url: message.headline_url.clone(),
            headline: message.headline.clone(),
            snippet: message.snippet.clone(),
            source: message.source.clone(),
            raw_date: message.raw_date.clone(),
            normalized_date: message.normalized_date,
            category,
            publication_id,
        };

        match timeout(self.op_timeout, self.db.insert_headline(&new)).await {
            Ok(Ok(headline_id)) => {
                debug!(url = %new.url, headline_id, "Stored new headline");
                Ok(Outcome::Inserted { headline_id })
            }
            Ok(Err(StoreError::DuplicateUrl)) => {
                debug!(url = %new.url, "Lost insert race, headline already stored");
                Ok(Outcome::ConcurrentInsert)
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(StoreError::Timeout.into()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticClassifier {
        category: &'static str,
        calls: AtomicUsize,
    }

    impl StaticClassifier {
        fn new(category: &'static str) -> Arc<Self> {
            Arc::new(Self {
                category,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Classifier for StaticClassifier {
        async fn classify(&self, _text: &str) -> Result<String, ClassifyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.category.to_string())
        }
    }

    /// Fails with a transient error a fixed number of times, then succeeds.
    struct FlakyClassifier {
        failures_left: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Classifier for FlakyClassifier {
        async fn classify(&self, _text: &str) -> Result<String, ClassifyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(ClassifyError::HttpStatus(500));
            }
            Ok("general".to_string())
        }
    }

    struct BrokenClassifier;

    #[async_trait]
    impl Classifier for BrokenClassifier {
        async fn classify(&self, _text: &str) -> Result<String, ClassifyError> {
            Err(ClassifyError::InvalidResponse("garbage".to_string()))
        }
    }

    /// Sneaks a row for the same URL into the store during classification,
    /// forcing the insert race deterministically.
    struct RacingClassifier {
        db: Database,
        row: NewHeadline,
    }

    #[async_trait]
    impl Classifier for RacingClassifier {
        async fn classify(&self, _text: &str) -> Result<String, ClassifyError> {
            self.db
                .insert_headline(&self.row)
                .await
                .map_err(|e| ClassifyError::InvalidResponse(e.to_string()))?;
            Ok("general".to_string())
        }
    }

    fn message(url: &str, publication_id: Option<i64>) -> QueueMessage {
        QueueMessage {
            headline_url: url.to_string(),
            publication_id,
            headline: "City council approves transit budget".to_string(),
            snippet: Some("The measure passed 7-2".to_string()),
            source: Some("Example Times".to_string()),
            raw_date: Some("2 hours ago".to_string()),
            normalized_date: Some(1_700_000_000),
        }
    }

    fn processor(db: &Database, classifier: Arc<dyn Classifier>) -> Processor {
        Processor::new(
            db.clone(),
            classifier,
            RetryPolicy::immediate(3),
            Duration::from_secs(5),
        )
    }

    async fn seeded_db() -> (Database, i64) {
        let db = Database::open(":memory:").await.unwrap();
        let publication_id = db
            .insert_publication("Example Times", "https://example.com")
            .await
            .unwrap();
        (db, publication_id)
    }

    #[tokio::test]
    async fn test_new_headline_inserted() {
        let (db, publication_id) = seeded_db().await;
        let classifier = StaticClassifier::new("politics");
        let processor = processor(&db, classifier.clone());

        let outcome = processor
            .process(&message("https://example.com/story", Some(publication_id)))
            .await
            .unwrap();

        let headline_id = match outcome {
            Outcome::Inserted { headline_id } => headline_id,
            other => panic!("expected insert, got {other:?}"),
        };
        let stored = db
            .find_headline_by_url("https://example.com/story")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.id, headline_id);
        assert_eq!(stored.category.as_deref(), Some("politics"));
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_existing_url_skipped_without_classification() {
        let (db, publication_id) = seeded_db().await;
        let classifier = StaticClassifier::new("politics");
        let processor = processor(&db, classifier.clone());

        let msg = message("https://example.com/story", Some(publication_id));
        assert!(matches!(
            processor.process(&msg).await.unwrap(),
            Outcome::Inserted { .. }
        ));

        // Redelivery of the same URL is a no-op.
        let outcome = processor.process(&msg).await.unwrap();
        assert_eq!(outcome, Outcome::AlreadyStored);
        assert_eq!(db.count_headlines().await.unwrap(), 1);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_insert_detected() {
        let (db, publication_id) = seeded_db().await;
        let racing_row = NewHeadline {
            url: "https://example.com/story".to_string(),
            headline: "City council approves transit budget".to_string(),
            snippet: None,
            source: None,
            raw_date: None,
            normalized_date: None,
            category: "general".to_string(),
            publication_id,
        };
        let classifier = Arc::new(RacingClassifier {
            db: db.clone(),
            row: racing_row,
        });
        let processor = processor(&db, classifier);

        let outcome = processor
            .process(&message("https://example.com/story", Some(publication_id)))
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::ConcurrentInsert);
        assert_eq!(db.count_headlines().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_missing_publication_reference_skips_without_insert() {
        let (db, _) = seeded_db().await;
        let processor = processor(&db, StaticClassifier::new("general"));

        let outcome = processor
            .process(&message("https://example.com/story", None))
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::InvalidPublication);
        assert_eq!(db.count_headlines().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unknown_publication_id_skips_without_insert() {
        let (db, _) = seeded_db().await;
        let processor = processor(&db, StaticClassifier::new("general"));

        let outcome = processor
            .process(&message("https://example.com/story", Some(9999)))
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::InvalidPublication);
        assert_eq!(db.count_headlines().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_transient_classifier_failure_retried() {
        let (db, publication_id) = seeded_db().await;
        let classifier = Arc::new(FlakyClassifier {
            failures_left: AtomicUsize::new(1),
            calls: AtomicUsize::new(0),
        });
        let processor = processor(&db, classifier.clone());

        let outcome = processor
            .process(&message("https://example.com/story", Some(publication_id)))
            .await
            .unwrap();

        assert!(matches!(outcome, Outcome::Inserted { .. }));
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_classifier_failure_fails_message() {
        let (db, publication_id) = seeded_db().await;
        let processor = processor(&db, Arc::new(BrokenClassifier));

        let err = processor
            .process(&message("https://example.com/story", Some(publication_id)))
            .await
            .unwrap_err();

        assert!(matches!(err, ProcessError::Classify(_)));
        assert_eq!(db.count_headlines().await.unwrap(), 0);
    }
}
