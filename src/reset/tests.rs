use super::*;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Mutex;

/// Publisher that records publishes, optionally failing them.
struct RecordingPublisher {
    published: Mutex<Vec<(String, String)>>,
    fail: bool,
}

impl RecordingPublisher {
    fn new(fail: bool) -> Arc<Self> {
        Arc::new(Self {
            published: Mutex::new(Vec::new()),
            fail,
        })
    }

    fn published(&self) -> Vec<(String, String)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandPublisher for RecordingPublisher {
    async fn publish(&self, topic: &str, payload: &str) -> Result<()> {
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), payload.to_string()));
        if self.fail {
            return Err(anyhow!("broker unreachable"));
        }
        Ok(())
    }
}

#[tokio::test]
async fn reset_publishes_command_then_deletes_record() {
    let directory = Arc::new(SensorDirectory::open_in_memory().unwrap());
    let record = directory.create("a/b/s1", "infrared").unwrap();
    let publisher = RecordingPublisher::new(false);
    let coordinator = ResetCoordinator::new(Arc::clone(&directory), publisher.clone());

    coordinator.reset(record.id).await.unwrap();

    // Command went out on the location-derived reset topic.
    assert_eq!(
        publisher.published(),
        vec![("a/b/s1/rst".to_string(), "1".to_string())]
    );
    // Record is gone and the location is free again.
    assert!(directory.find_by_id(record.id).unwrap().is_none());
    assert_eq!(directory.count_by_location("a/b/s1").unwrap(), 0);
}

#[tokio::test]
async fn reset_of_unknown_id_is_not_found_and_publishes_nothing() {
    let directory = Arc::new(SensorDirectory::open_in_memory().unwrap());
    let publisher = RecordingPublisher::new(false);
    let coordinator = ResetCoordinator::new(directory, publisher.clone());

    let err = coordinator.reset(42).await.unwrap_err();
    assert!(matches!(err, ResetError::NotFound(42)));
    assert!(publisher.published().is_empty());
}

#[tokio::test]
async fn publish_failure_does_not_block_deletion() {
    let directory = Arc::new(SensorDirectory::open_in_memory().unwrap());
    let record = directory.create("a/b/s1", "infrared").unwrap();
    let publisher = RecordingPublisher::new(true);
    let coordinator = ResetCoordinator::new(Arc::clone(&directory), publisher.clone());

    coordinator.reset(record.id).await.unwrap();

    // The publish attempt happened, failed, and the record was still deleted.
    assert_eq!(publisher.published().len(), 1);
    assert!(directory.find_by_id(record.id).unwrap().is_none());
}
