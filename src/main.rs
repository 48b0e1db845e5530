use futures::StreamExt;
use memqueue::queue::{ConsumerOptions, MessageQueue, QueueError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const PARTITIONS: usize = 3;
const ITEMS: usize = 12;

#[tokio::main]
async fn main() -> Result<(), QueueError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let queue: MessageQueue<String> = MessageQueue::with_partitions(PARTITIONS)?;
    let consumer = queue.create_consumer(ConsumerOptions::new("demo"));
    queue.assign(&consumer, &(0..PARTITIONS).collect::<Vec<_>>())?;

    let producer = queue.clone();
    tokio::spawn(async move {
        for i in 0..ITEMS {
            let (partition, offset) = producer.publish_keyed(&(i % 5), format!("event-{}", i));
            tracing::info!(partition, offset, "published event-{}", i);
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    });

    let cancel = CancellationToken::new();
    let mut items = consumer.consume(cancel.clone())?;
    for _ in 0..ITEMS {
        let Some(item) = items.next().await else {
            break;
        };
        let item = item?;
        let partition = consumer
            .partition_being_consumed()
            .map(|p| p.id())
            .unwrap_or_default();
        consumer.commit().await?;
        tracing::info!(partition, "consumed {}", item);
    }

    cancel.cancel();
    consumer.close();
    tracing::info!(compacted = queue.compact(), "done");
    Ok(())
}
