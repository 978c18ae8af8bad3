use std::time::{Duration, Instant};

use eyre::Result;
use nuber_core::Event;
use nuber_dispatch::{Rejected, RegionPhase};
use nuber_tests::TestCtxBuilder;
use util::eventually;

mod util;

#[tokio::test]
#[ntest::timeout(20_000)]
async fn test_no_bookings_after_shutdown() -> Result<()> {
    let ctx = TestCtxBuilder::from_env()?
        .with_region("North", 2)
        .with_region("South", 2)
        .with_drivers(2)
        .build()
        .await?;

    assert!(ctx.shutdown().await?.is_empty());
    assert!(ctx.dispatcher.is_shutting_down());
    for region in ["North", "South"] {
        assert!(
            ctx.book("Late", Duration::from_millis(5), region).is_none(),
            "No booking may be accepted after shutdown."
        );
        assert_eq!(
            ctx.dispatcher.region(region).unwrap().phase(),
            RegionPhase::Drained
        );
    }
    let passenger = nuber_core::Passenger::new("Late", Duration::from_millis(5));
    assert_eq!(
        ctx.dispatcher.try_book(passenger, "North").unwrap_err(),
        Rejected::DispatcherShuttingDown
    );
    assert_eq!(ctx.dispatcher.bookings_awaiting_driver(), 0);
    assert_eq!(ctx.events.count(|e| matches!(e, Event::DispatcherClosed)), 3);

    ctx.finish().await;
    Ok(())
}

#[tokio::test]
#[ntest::timeout(20_000)]
async fn test_shutdown_waits_for_admitted_bookings() -> Result<()> {
    let ctx = TestCtxBuilder::from_env()?
        .with_region("North", 1)
        .with_drivers(1)
        .build()
        .await?;

    let first = ctx.book("Alice", Duration::from_millis(150), "North").unwrap();
    let second = ctx.book("Bob", Duration::from_millis(150), "North").unwrap();

    assert!(
        ctx.shutdown().await?.is_empty(),
        "Both bookings fit well within the drain bound."
    );
    assert!(first.is_finished() && second.is_finished());
    assert!(first.result().await?.is_some());
    assert!(second.result().await?.is_some());
    assert_eq!(
        ctx.dispatcher.region("North").unwrap().phase(),
        RegionPhase::Drained
    );

    ctx.finish().await;
    Ok(())
}

#[tokio::test]
#[ntest::timeout(20_000)]
async fn test_shutdown_returns_within_drain_bound() -> Result<()> {
    let ctx = TestCtxBuilder::from_env()?
        .with_region("North", 1)
        .with_drivers(1)
        .with_drain_timeout(Duration::from_secs(1))
        .build()
        .await?;

    let long = ctx.book("Slow", Duration::from_secs(60), "North").unwrap();
    assert!(
        eventually(Duration::from_secs(5), || {
            ctx.events.saw(long.id(), |e| matches!(e, Event::TripStarted))
        })
        .await
    );

    let start = Instant::now();
    let undrained = ctx.shutdown().await?;
    let took = start.elapsed();
    assert_eq!(undrained, vec!["North".to_owned()]);
    assert!(took >= Duration::from_millis(900));
    assert!(took < Duration::from_secs(5), "shutdown took {took:?}");

    // Shutdown does not cancel the booking
    assert!(!long.is_finished());
    assert_eq!(
        ctx.dispatcher.region("North").unwrap().phase(),
        RegionPhase::ShuttingDown
    );

    ctx.dispatcher.abort();
    assert!(long.result().await?.is_none());
    assert_eq!(ctx.dispatcher.idle_drivers(), 1, "The driver must be back in the pool.");
    let region = ctx.dispatcher.region("North").unwrap();
    assert!(eventually(Duration::from_secs(5), || region.phase() == RegionPhase::Drained).await);

    ctx.finish().await;
    Ok(())
}

#[tokio::test]
#[ntest::timeout(20_000)]
async fn test_abort_unblocks_booking_waiting_for_driver() -> Result<()> {
    let ctx = TestCtxBuilder::from_env()?
        .with_region("North", 1)
        .with_drain_timeout(Duration::from_millis(200))
        .build()
        .await?;

    let stuck = ctx.book("Alice", Duration::from_millis(5), "North").unwrap();
    let stuck = match stuck.result_within(Duration::from_millis(200)).await? {
        Ok(_) => panic!("Without drivers the booking must not complete."),
        Err(pending) => pending,
    };

    assert_eq!(ctx.shutdown().await?, vec!["North".to_owned()]);
    assert_eq!(ctx.dispatcher.bookings_awaiting_driver(), 1);

    ctx.dispatcher.abort();
    assert!(stuck.result().await?.is_none());
    assert_eq!(ctx.dispatcher.bookings_awaiting_driver(), 0);
    assert_eq!(
        ctx.events.count(|e| matches!(e, Event::Interrupted { .. })),
        1
    );

    ctx.finish().await;
    Ok(())
}
