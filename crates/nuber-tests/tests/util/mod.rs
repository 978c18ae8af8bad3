use std::time::{Duration, Instant};

use nuber_tests::{PendingBooking, TestCtx};

/// Polls `cond` until it holds or `timeout` expires.
#[allow(unused)]
pub async fn eventually(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}

/// Books `count` passengers named `{prefix}-{i}` and checks every booking was accepted.
#[allow(unused)]
pub fn book_many(
    ctx: &TestCtx,
    prefix: &str,
    count: usize,
    travel: Duration,
    region: &str,
) -> Vec<PendingBooking> {
    (0..count)
        .map(|i| {
            ctx.book(&format!("{prefix}-{i}"), travel, region)
                .unwrap_or_else(|| panic!("booking {prefix}-{i} into {region} must be accepted"))
        })
        .collect()
}
