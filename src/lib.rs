// In-memory partitioned queue
pub mod queue;
