use std::time::Duration;

use eyre::Result;
use nuber_core::Event;
use nuber_tests::TestCtxBuilder;
use util::{book_many, eventually};

mod util;

#[tokio::test]
#[ntest::timeout(30_000)]
async fn test_driver_is_never_shared() -> Result<()> {
    let ctx = TestCtxBuilder::from_env()?
        .with_region("North", 4)
        .with_region("South", 4)
        .with_region("East", 4)
        .with_drivers(3)
        .build()
        .await?;

    let mut bookings = Vec::new();
    for region in ["North", "South", "East"] {
        bookings.extend(book_many(&ctx, region, 10, Duration::from_millis(5), region));
    }
    for booking in bookings {
        assert!(booking.result().await?.is_some());
    }

    assert_eq!(ctx.events.max_driver_holders(), 1, "A driver must serve one booking at a time.");
    assert!(ctx.events.drivers_used() <= 3);
    assert_eq!(ctx.dispatcher.idle_drivers(), 3, "All drivers must be back in the pool.");

    ctx.finish().await;
    Ok(())
}

#[tokio::test]
#[ntest::timeout(20_000)]
async fn test_full_pool_refuses_drivers() -> Result<()> {
    let ctx = TestCtxBuilder::from_env()?
        .with_region("North", 1)
        .with_max_drivers(2)
        .with_drivers(2)
        .build()
        .await?;

    assert!(!ctx.add_driver("Extra"), "A full pool must refuse drivers.");
    assert_eq!(ctx.dispatcher.idle_drivers(), 2);
    assert_eq!(
        ctx.events
            .count(|e| matches!(e, Event::DriverRefused { driver } if &**driver == "Extra")),
        1
    );

    // A driver out on a trip keeps its place in the pool
    let booking = ctx.book("Alice", Duration::from_millis(200), "North").unwrap();
    assert!(
        eventually(Duration::from_secs(5), || ctx.dispatcher.idle_drivers() == 1).await
    );
    assert!(!ctx.add_driver("Extra"));
    assert!(booking.result().await?.is_some());
    assert_eq!(ctx.dispatcher.idle_drivers(), 2);

    ctx.finish().await;
    Ok(())
}

#[tokio::test]
#[ntest::timeout(20_000)]
async fn test_booking_waits_until_a_driver_is_added() -> Result<()> {
    let ctx = TestCtxBuilder::from_env()?
        .with_region("North", 2)
        .build()
        .await?;

    let booking = ctx.book("Alice", Duration::from_millis(10), "North").unwrap();
    let booking = match booking.result_within(Duration::from_millis(300)).await? {
        Ok(_) => panic!("Without drivers the booking must not complete."),
        Err(pending) => pending,
    };
    assert!(!booking.is_finished());
    assert_eq!(ctx.dispatcher.bookings_awaiting_driver(), 1);

    assert!(ctx.add_driver("Dora"));
    let result = booking.result().await?.expect("The booking must complete.");
    assert_eq!(&*result.driver, "Dora");
    assert_eq!(ctx.dispatcher.bookings_awaiting_driver(), 0);

    ctx.finish().await;
    Ok(())
}

#[tokio::test]
#[ntest::timeout(20_000)]
async fn test_get_driver_takes_driver_out_of_pool() -> Result<()> {
    let ctx = TestCtxBuilder::from_env()?
        .with_region("North", 1)
        .with_max_drivers(1)
        .with_drivers(1)
        .build()
        .await?;

    let dispatcher = ctx.dispatcher.clone();
    let driver = tokio::task::spawn_blocking(move || dispatcher.get_driver())
        .await?
        .expect("There is an idle driver.");
    assert_eq!(driver.name(), "D-0");
    assert_eq!(ctx.dispatcher.idle_drivers(), 0);
    assert_eq!(ctx.dispatcher.bookings_awaiting_driver(), 0);

    // The driver left for good, so there is room again
    assert!(ctx.dispatcher.add_driver(driver));
    assert_eq!(ctx.dispatcher.idle_drivers(), 1);

    ctx.finish().await;
    Ok(())
}
