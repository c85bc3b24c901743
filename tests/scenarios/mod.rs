mod adaptive_load;
mod bounded_parallelism;
mod breaker_recovery;
mod cancellation;
mod ordered_output;
mod retry_recovery;
