use proptest::prelude::*;

/// A send-buffer size and the values a producer sends through it
pub fn send_plan_strategy() -> impl Strategy<Value = (usize, Vec<i64>)> {
    (1usize..8, prop::collection::vec(any::<i64>(), 0..64))
}

/// Explicit flush points interleaved with sends: `true` means flush after that send
pub fn flush_points_strategy(len: usize) -> impl Strategy<Value = Vec<bool>> {
    prop::collection::vec(prop::bool::weighted(0.2), len)
}
