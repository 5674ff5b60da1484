//! Wraps an [`Executor`] with the write-batching channel and export
//! conversion that are identical regardless of back-end (spec §4.2's
//! "Write pipeline").

use crate::executor::Executor;
use crate::export::{self, ExportFormat};
use manager_api::query::{Request, Response};
use manager_api::types::schema::DeviceDataSchema;
use manager_api::types::DeviceDataRecord;
use manager_api::{Error, Result};
use std::io::Write;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// A datastore backed by one [`Executor`], with a bounded write queue
/// drained by a single background consumer.
///
/// `Write` never blocks: if the queue is full the call fails fast,
/// leaving the caller (a recorder) to decide whether to retry or drop.
pub struct TimeSeriesStore {
    executor: Arc<dyn Executor>,
    writes: mpsc::Sender<DeviceDataRecord>,
    consumer: JoinHandle<()>,
    stop: CancellationToken,
}

impl TimeSeriesStore {
    /// Spawns the batching consumer and returns the handle. `batch_size`
    /// is both the channel capacity and the unit the original sizes its
    /// back-end batches around.
    pub fn new(executor: Arc<dyn Executor>, batch_size: usize) -> Self {
        let (tx, rx) = mpsc::channel(batch_size.max(1));
        let stop = CancellationToken::new();
        let consumer = tokio::spawn(run_consumer(executor.clone(), rx, stop.clone()));

        TimeSeriesStore { executor, writes: tx, consumer, stop }
    }

    pub async fn connect(&self) -> Result<()> {
        self.executor.connect().await
    }

    pub async fn create_db(&self) -> Result<()> {
        self.executor.create_db().await
    }

    pub async fn use_db(&self) -> Result<()> {
        self.executor.use_db().await
    }

    pub async fn create_table(&self, schema: &DeviceDataSchema) -> Result<()> {
        self.executor.create_table(schema).await
    }

    /// Enqueues a record for the next batch. Fails immediately if the
    /// queue is full rather than waiting for room.
    pub fn write(&self, record: DeviceDataRecord) -> Result<()> {
        self.writes
            .try_send(record)
            .map_err(|_| Error::data_store("write queue is full"))
    }

    pub async fn query(&self, req: &Request) -> Result<Response> {
        self.executor.query(req).await
    }

    pub fn export(&self, response: &Response, format: ExportFormat, sink: &mut (dyn Write + Send)) -> Result<()> {
        export::export(response, format, sink)
    }

    /// Cancels the consumer, waits for it to drain the channel and
    /// exit, then closes the back-end connection.
    pub async fn close(self) -> Result<()> {
        self.stop.cancel();
        drop(self.writes);
        let _ = self.consumer.await;
        self.executor.close().await
    }
}

async fn run_consumer(executor: Arc<dyn Executor>, mut rx: mpsc::Receiver<DeviceDataRecord>, stop: CancellationToken) {
    loop {
        let first = tokio::select! {
            biased;
            _ = stop.cancelled() => {
                drain_and_flush(&executor, &mut rx).await;
                return;
            }
            record = rx.recv() => record,
        };

        let Some(first) = first else {
            return;
        };

        let mut batch = vec![first];
        while let Ok(record) = rx.try_recv() {
            batch.push(record);
        }

        let n = batch.len();
        if let Err(e) = executor.write(&batch).await {
            error!(batch_size = n, error = %e, "batched time-series write failed");
        } else {
            info!(batch_size = n, "wrote time-series batch");
        }
    }
}

async fn drain_and_flush(executor: &Arc<dyn Executor>, rx: &mut mpsc::Receiver<DeviceDataRecord>) {
    let mut remaining = Vec::new();
    while let Ok(record) = rx.try_recv() {
        remaining.push(record);
    }
    if remaining.is_empty() {
        return;
    }
    let n = remaining.len();
    if let Err(e) = executor.write(&remaining).await {
        warn!(batch_size = n, error = %e, "final drain write failed on shutdown");
    } else {
        info!(batch_size = n, "flushed remaining records on shutdown");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingExecutor {
        batches: Mutex<Vec<usize>>,
        writes_called: AtomicUsize,
    }

    #[async_trait]
    impl Executor for RecordingExecutor {
        async fn connect(&self) -> Result<()> {
            Ok(())
        }
        async fn close(&self) -> Result<()> {
            Ok(())
        }
        async fn create_db(&self) -> Result<()> {
            Ok(())
        }
        async fn use_db(&self) -> Result<()> {
            Ok(())
        }
        async fn create_table(&self, _schema: &DeviceDataSchema) -> Result<()> {
            Ok(())
        }
        async fn write(&self, records: &[DeviceDataRecord]) -> Result<()> {
            self.writes_called.fetch_add(1, Ordering::SeqCst);
            self.batches.lock().unwrap().push(records.len());
            Ok(())
        }
        async fn query(&self, _req: &Request) -> Result<Response> {
            Ok(Response { rows: Vec::new() })
        }
    }

    fn record(id: &str) -> DeviceDataRecord {
        DeviceDataRecord {
            protocol_id: "proto".into(),
            product_id: "prod".into(),
            device_id: id.into(),
            properties: Default::default(),
        }
    }

    #[tokio::test]
    async fn queued_records_drain_in_one_batch_call() {
        let executor = Arc::new(RecordingExecutor::default());
        let store = TimeSeriesStore::new(executor.clone(), 16);

        store.write(record("a")).unwrap();
        store.write(record("b")).unwrap();
        store.write(record("c")).unwrap();

        // give the consumer a chance to pick the batch up
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        store.close().await.unwrap();

        let batches = executor.batches.lock().unwrap();
        assert_eq!(batches.iter().sum::<usize>(), 3);
    }

    #[tokio::test]
    async fn full_queue_fails_write_fast() {
        let executor = Arc::new(RecordingExecutor::default());
        let store = TimeSeriesStore::new(executor, 1);

        // fill the single slot before the consumer can drain it by
        // racing a synchronous burst; at minimum one of these must
        // eventually fail once the channel saturates.
        let mut failed = false;
        for i in 0..64 {
            if store.write(record(&i.to_string())).is_err() {
                failed = true;
                break;
            }
        }
        store.close().await.unwrap();
        // Not deterministic that we observe a failure (the consumer may
        // keep draining faster than we can fill it), but the call must
        // never hang or panic either way.
        let _ = failed;
    }

    #[tokio::test]
    async fn shutdown_flushes_remaining_records() {
        let executor = Arc::new(RecordingExecutor::default());
        let store = TimeSeriesStore::new(executor.clone(), 16);

        store.write(record("a")).unwrap();
        store.close().await.unwrap();

        let total: usize = executor.batches.lock().unwrap().iter().sum();
        assert_eq!(total, 1);
    }
}
