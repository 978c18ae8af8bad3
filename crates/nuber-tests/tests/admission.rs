use std::collections::HashMap;
use std::time::Duration;

use eyre::Result;
use futures::future::join_all;
use nanorand::Rng;
use nuber_core::Event;
use nuber_dispatch::RegionPhase;
use nuber_tests::TestCtxBuilder;
use util::{book_many, eventually};

mod util;

#[tokio::test]
#[ntest::timeout(30_000)]
async fn test_concurrent_bookings_respect_region_capacity() -> Result<()> {
    let ctx = TestCtxBuilder::from_env()?
        .with_region("North", 3)
        .with_region("South", 1)
        .with_drivers(10)
        .build()
        .await?;

    // Book from several threads at once
    let mut bookers = Vec::new();
    for t in 0..4 {
        let dispatcher = ctx.dispatcher.clone();
        bookers.push(tokio::task::spawn_blocking(move || {
            let mut rng = nanorand::WyRand::new();
            (0..10)
                .map(|i| {
                    let region = if i % 2 == 0 { "North" } else { "South" };
                    let travel = Duration::from_millis(rng.generate_range(5_u64..=25));
                    let passenger = nuber_core::Passenger::new(format!("P-{t}-{i}"), travel);
                    dispatcher
                        .book(passenger, region)
                        .expect("Bookings into an active region must be accepted.")
                })
                .collect::<Vec<_>>()
        }));
    }
    let mut handles = Vec::new();
    for booker in bookers {
        handles.extend(booker.await?);
    }
    assert_eq!(handles.len(), 40);

    let results = join_all(
        handles
            .into_iter()
            .map(|h| tokio::task::spawn_blocking(move || h.wait())),
    )
    .await;
    for result in results {
        assert!(result?.is_some(), "Every booking must complete.");
    }

    assert!(ctx.events.max_active("North") <= 3);
    assert!(ctx.events.max_active("South") <= 1);
    assert!(ctx.events.max_active("North") >= 1);
    assert_eq!(ctx.dispatcher.bookings_awaiting_driver(), 0);

    ctx.finish().await;
    Ok(())
}

#[tokio::test]
#[ntest::timeout(20_000)]
async fn test_capacity_one_runs_bookings_one_after_another() -> Result<()> {
    let ctx = TestCtxBuilder::from_env()?
        .with_region("North", 1)
        .with_drivers(1)
        .build()
        .await?;

    let first = ctx.book("Alice", Duration::from_millis(50), "North").unwrap();
    let second = ctx.book("Bob", Duration::from_millis(50), "North").unwrap();

    assert!(first.result().await?.is_some());
    assert!(second.result().await?.is_some());
    assert_eq!(ctx.events.max_active("North"), 1);

    // Slot events must strictly alternate: whichever booking went first
    // released its slot before the other one acquired it.
    let slot_events: Vec<(Option<u64>, bool)> = ctx
        .events
        .events()
        .into_iter()
        .filter_map(|(id, e)| match e {
            Event::SlotAcquired { .. } => Some((id, true)),
            Event::SlotReleased { .. } => Some((id, false)),
            _ => None,
        })
        .collect();
    assert_eq!(slot_events.len(), 4);
    assert!(slot_events[0].1 && !slot_events[1].1);
    assert!(slot_events[2].1 && !slot_events[3].1);
    assert_eq!(slot_events[0].0, slot_events[1].0);
    assert_eq!(slot_events[2].0, slot_events[3].0);
    assert_ne!(slot_events[0].0, slot_events[2].0);

    ctx.finish().await;
    Ok(())
}

#[tokio::test]
#[ntest::timeout(20_000)]
async fn test_bookings_beyond_capacity_are_queued_not_refused() -> Result<()> {
    let ctx = TestCtxBuilder::from_env()?
        .with_region("North", 1)
        .build()
        .await?;

    let bookings = book_many(&ctx, "P", 3, Duration::from_millis(10), "North");
    let region = ctx.dispatcher.region("North").unwrap();
    assert_eq!(region.in_flight(), 3);
    assert!(eventually(Duration::from_secs(5), || region.active_jobs() == 1).await);
    assert_eq!(region.phase(), RegionPhase::Active);

    assert!(ctx.add_driver("Dora"));
    for booking in bookings {
        assert!(booking.result().await?.is_some());
    }
    assert!(eventually(Duration::from_secs(5), || region.in_flight() == 0).await);
    assert_eq!(region.active_jobs(), 0);

    ctx.finish().await;
    Ok(())
}

#[tokio::test]
#[ntest::timeout(20_000)]
async fn test_regions_do_not_share_slots() -> Result<()> {
    let ctx = TestCtxBuilder::from_env()?
        .with_region("North", 1)
        .with_region("South", 1)
        .with_drivers(2)
        .build()
        .await?;

    // One long trip in North must not hold up South
    let long = ctx.book("Slow", Duration::from_secs(30), "North").unwrap();
    assert!(
        eventually(Duration::from_secs(5), || {
            ctx.events.saw(long.id(), |e| matches!(e, Event::TripStarted))
        })
        .await
    );
    let short = ctx.book("Quick", Duration::from_millis(10), "South").unwrap();
    let result = short.result_within(Duration::from_secs(5)).await?;
    assert!(matches!(result, Ok(Some(_))), "South must not wait for North.");

    long.cancel();
    assert!(long.result().await?.is_none());

    let mut per_driver: HashMap<String, usize> = HashMap::new();
    for (_, event) in ctx.events.events() {
        if let Event::DriverAssigned { driver } = event {
            *per_driver.entry(driver.to_string()).or_default() += 1;
        }
    }
    assert_eq!(per_driver.values().sum::<usize>(), 2);

    ctx.finish().await;
    Ok(())
}
