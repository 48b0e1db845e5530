use futures::StreamExt;
use memqueue::queue::{ConsumeStream, MessageQueue, Result};
use std::time::Duration;

/// Upper bound for anything that is expected to happen
pub const WAIT: Duration = Duration::from_secs(5);

/// Window used to check that something does not happen
pub const SETTLE: Duration = Duration::from_millis(50);

/// Create a queue of strings with the given number of partitions
pub fn create_queue(partitions: usize) -> MessageQueue<String> {
    MessageQueue::with_partitions(partitions).expect("valid partition count")
}

/// Next stream item, failing the test if none arrives within `WAIT`
pub async fn next_within(stream: &mut ConsumeStream<String>) -> Option<Result<String>> {
    tokio::time::timeout(WAIT, stream.next())
        .await
        .expect("stream should produce an item in time")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_queue() {
        let queue = create_queue(3);
        assert_eq!(queue.partition_count(), 3);
    }
}
