use std::time::Duration;

use eyre::Result;
use nuber_core::Event;
use nuber_tests::TestCtxBuilder;
use util::eventually;

mod util;

#[tokio::test]
#[ntest::timeout(20_000)]
async fn test_cancelling_mid_trip_returns_driver() -> Result<()> {
    let ctx = TestCtxBuilder::from_env()?
        .with_region("North", 1)
        .with_drivers(1)
        .build()
        .await?;

    let booking = ctx.book("Alice", Duration::from_secs(60), "North").unwrap();
    let id = booking.id();
    assert!(
        eventually(Duration::from_secs(5), || {
            ctx.events.saw(id, |e| matches!(e, Event::TripStarted))
        })
        .await
    );
    assert_eq!(ctx.dispatcher.idle_drivers(), 0);

    assert!(booking.cancel());
    assert!(booking.result().await?.is_none());
    assert_eq!(ctx.dispatcher.idle_drivers(), 1);
    assert!(ctx.events.saw(id, |e| matches!(
        e,
        Event::Interrupted { stage } if *stage == "driving to the destination"
    )));
    assert!(ctx.events.saw(id, |e| matches!(e, Event::DriverReleased { .. })));
    assert!(ctx.events.saw(id, |e| matches!(e, Event::SlotReleased { .. })));

    // The freed driver and slot serve the next booking
    let next = ctx.book("Bob", Duration::from_millis(10), "North").unwrap();
    assert!(next.result().await?.is_some());

    ctx.finish().await;
    Ok(())
}

#[tokio::test]
#[ntest::timeout(20_000)]
async fn test_cancelling_finished_booking_changes_nothing() -> Result<()> {
    let ctx = TestCtxBuilder::from_env()?
        .with_region("North", 1)
        .with_drivers(1)
        .build()
        .await?;

    let booking = ctx.book("Alice", Duration::from_millis(5), "North").unwrap();
    assert!(eventually(Duration::from_secs(5), || booking.is_finished()).await);
    booking.cancel();
    assert!(booking.result().await?.is_some());

    ctx.finish().await;
    Ok(())
}
