//! Asynchronous activity logger that batches ad view/click events and
//! writes them to ClickHouse. Submission is non-blocking: the billing path
//! hands an event over a channel and moves on; dropped or failed writes
//! are this module's problem alone.

use dega_core::config::ClickHouseConfig;
use dega_core::types::{ActivityEvent, ActivitySink};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Activity logger with background batch writer.
pub struct ActivityLogger {
    sender: mpsc::Sender<ActivityEvent>,
}

impl ActivityLogger {
    /// Create a new activity logger and spawn the background writer.
    pub async fn new(config: &ClickHouseConfig) -> anyhow::Result<Self> {
        let (sender, receiver) = mpsc::channel::<ActivityEvent>(100_000);

        let writer = BatchWriter::new(config).await?;
        let batch_size = config.batch_size;
        let flush_interval = std::time::Duration::from_millis(config.flush_interval_ms);

        // Spawn background batch writer
        tokio::spawn(async move {
            writer.run(receiver, batch_size, flush_interval).await;
        });

        info!("Activity logger initialized with ClickHouse backend");

        Ok(Self { sender })
    }
}

impl ActivitySink for ActivityLogger {
    fn record(&self, event: ActivityEvent) {
        if let Err(e) = self.sender.try_send(event) {
            metrics::counter!("analytics.dropped").increment(1);
            warn!("Activity event dropped: {}", e);
        } else {
            metrics::counter!("analytics.queued").increment(1);
        }
    }
}

/// Background writer that batches events and flushes to ClickHouse.
struct BatchWriter {
    client: clickhouse::Client,
}

impl BatchWriter {
    async fn new(config: &ClickHouseConfig) -> anyhow::Result<Self> {
        let client = clickhouse::Client::default()
            .with_url(&config.url)
            .with_database(&config.database);

        // Create the activity table if it doesn't exist
        Self::ensure_schema(&client).await?;

        Ok(Self { client })
    }

    async fn ensure_schema(client: &clickhouse::Client) -> anyhow::Result<()> {
        client
            .query(
                "CREATE TABLE IF NOT EXISTS ad_activity (
                    event_id UUID,
                    kind String,
                    campaign_id UUID,
                    user_id UUID,
                    advertiser_id UUID,
                    device Nullable(String),
                    browser Nullable(String),
                    location Nullable(String),
                    timestamp DateTime64(3)
                ) ENGINE = MergeTree()
                ORDER BY (timestamp, kind, campaign_id)
                PARTITION BY toYYYYMM(timestamp)
                TTL timestamp + INTERVAL 90 DAY",
            )
            .execute()
            .await?;

        info!("ClickHouse schema verified");
        Ok(())
    }

    async fn run(
        self,
        mut receiver: mpsc::Receiver<ActivityEvent>,
        batch_size: usize,
        flush_interval: std::time::Duration,
    ) {
        let mut buffer: Vec<ActivityEvent> = Vec::with_capacity(batch_size);
        let mut interval = tokio::time::interval(flush_interval);

        loop {
            tokio::select! {
                Some(event) = receiver.recv() => {
                    buffer.push(event);
                    if buffer.len() >= batch_size {
                        self.flush(&mut buffer).await;
                    }
                }
                _ = interval.tick() => {
                    if !buffer.is_empty() {
                        self.flush(&mut buffer).await;
                    }
                }
            }
        }
    }

    async fn flush(&self, buffer: &mut Vec<ActivityEvent>) {
        let count = buffer.len();
        debug!(count = count, "Flushing activity batch to ClickHouse");

        // Serialize events as NDJSON and insert
        let mut json_rows = Vec::with_capacity(buffer.len());
        for e in buffer.iter() {
            if let Ok(json) = serde_json::to_string(e) {
                json_rows.push(json);
            }
        }

        if json_rows.is_empty() {
            buffer.clear();
            return;
        }

        let insert_sql = format!(
            "INSERT INTO ad_activity FORMAT JSONEachRow {}",
            json_rows.join("\n")
        );

        match self.client.query(&insert_sql).execute().await {
            Ok(_) => {
                metrics::counter!("analytics.flushed").increment(count as u64);
                debug!(count = count, "Activity batch flushed successfully");
            }
            Err(e) => {
                metrics::counter!("analytics.flush_errors").increment(1);
                error!(error = %e, count = count, "Failed to flush activity batch");
            }
        }

        buffer.clear();
    }
}
