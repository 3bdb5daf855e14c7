use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokenbucket::{Error, RateLimiter, TokenBucket};
use tokio::time::{Instant, sleep};

#[tokio::test(start_paused = true)]
async fn test_burst_shared_by_two_consumers() {
    let bucket = Arc::new(TokenBucket::new(50));
    let start = Instant::now();

    let mut handles = vec![];
    for _ in 0..2 {
        let bucket = Arc::clone(&bucket);
        handles.push(tokio::spawn(async move {
            for _ in 0..25 {
                bucket.get_token(Duration::ZERO).await?;
            }
            Ok::<_, Error>(())
        }));
    }

    for h in handles {
        h.await.unwrap().unwrap();
    }

    // 50 deposits at 20ms intervals
    assert!(start.elapsed() <= Duration::from_secs(1));

    // Next deposit is 20ms away
    let result = bucket.get_token(Duration::from_millis(10)).await;
    assert_eq!(result, Err(Error::NoTokenAvailable));

    bucket.stop().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_rate_bound_across_consumers() {
    const RATE: usize = 20;
    const WINDOW_SECS: usize = 3;

    let bucket = Arc::new(TokenBucket::new(RATE as u32));
    let admitted = Arc::new(AtomicUsize::new(0));
    let deadline = Instant::now() + Duration::from_secs(WINDOW_SECS as u64);

    let mut handles = vec![];
    for _ in 0..4 {
        let bucket = Arc::clone(&bucket);
        let admitted = Arc::clone(&admitted);
        handles.push(tokio::spawn(async move {
            while Instant::now() < deadline {
                match bucket.get_token(Duration::from_millis(25)).await {
                    Ok(()) => {
                        admitted.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(Error::NoTokenAvailable) => {}
                    Err(e) => panic!("unexpected error: {e}"),
                }
            }
        }));
    }

    for h in handles {
        h.await.unwrap();
    }

    let admitted = admitted.load(Ordering::Relaxed);
    assert!(
        admitted <= RATE * WINDOW_SECS + RATE,
        "admitted {admitted} in {WINDOW_SECS}s"
    );
    assert!(
        admitted >= RATE * WINDOW_SECS - 5,
        "admitted only {admitted} in {WINDOW_SECS}s"
    );

    bucket.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_idle_bucket_bursts_at_most_rate() {
    let bucket = TokenBucket::new(10);
    sleep(Duration::from_secs(5)).await;

    let mut burst = 0;
    while bucket.get_token(Duration::from_millis(1)).await.is_ok() {
        burst += 1;
    }
    assert_eq!(burst, 10);
}

#[tokio::test(start_paused = true)]
async fn test_rate_change_by_replacement() {
    let mut current = Arc::new(TokenBucket::new(10));
    sleep(Duration::from_millis(1050)).await;

    let old = std::mem::replace(&mut current, Arc::new(TokenBucket::new(20)));
    old.stop().unwrap();
    sleep(Duration::from_millis(1)).await;

    // The old bucket is closed, its unused tokens are gone
    assert_eq!(
        old.get_token(Duration::from_millis(5)).await,
        Err(Error::Stopped)
    );

    // The new bucket fills at its own rate
    assert_eq!(current.rate(), 20);
    sleep(Duration::from_millis(1000)).await;
    assert_eq!(current.available(), 20);

    current.stop().unwrap();
}

#[tokio::test]
async fn test_empty_handle() {
    let limiter: Option<TokenBucket> = None;

    assert_eq!(
        limiter.get_token(Duration::ZERO).await,
        Err(Error::NotInitialized)
    );
    assert_eq!(
        limiter.get_token(Duration::from_millis(10)).await,
        Err(Error::NotInitialized)
    );
    assert_eq!(limiter.rate(), 0);
    assert_eq!(limiter.stop(), Err(Error::NotInitialized));
}

#[tokio::test(start_paused = true)]
async fn test_dyn_rate_limiter() {
    let limiters: Vec<Arc<dyn RateLimiter>> = vec![
        Arc::new(TokenBucket::new(100)),
        Arc::new(Some(TokenBucket::new(0))),
        Arc::new(None::<TokenBucket>),
    ];

    let rates: Vec<u32> = limiters.iter().map(|l| l.rate()).collect();
    assert_eq!(rates, vec![100, 1, 0]);

    assert_eq!(limiters[0].get_token(Duration::ZERO).await, Ok(()));
    assert_eq!(
        limiters[1].get_token(Duration::from_millis(500)).await,
        Err(Error::NoTokenAvailable)
    );
    assert_eq!(
        limiters[2].get_token(Duration::ZERO).await,
        Err(Error::NotInitialized)
    );

    assert_eq!(limiters[0].stop(), Ok(()));
    assert_eq!(limiters[1].stop(), Ok(()));
    assert_eq!(limiters[2].stop(), Err(Error::NotInitialized));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_consumers_respect_rate_and_capacity() {
    const RATE: usize = 50;

    let bucket = Arc::new(TokenBucket::new(RATE as u32));

    // Idle for 1.5s: 75 deposits into a bucket of 50
    sleep(Duration::from_millis(1500)).await;
    let idle = bucket.available();
    assert!(idle <= RATE, "{idle} tokens in a bucket of {RATE}");
    assert!(idle >= RATE / 2, "only {idle} tokens after 1.5s");

    let admitted = Arc::new(AtomicUsize::new(0));
    let deadline = Instant::now() + Duration::from_secs(1);

    let mut handles = vec![];
    for _ in 0..8 {
        let bucket = Arc::clone(&bucket);
        let admitted = Arc::clone(&admitted);
        handles.push(tokio::spawn(async move {
            while Instant::now() < deadline {
                match bucket.get_token(Duration::from_millis(5)).await {
                    Ok(()) => {
                        admitted.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(Error::NoTokenAvailable) => {}
                    Err(e) => panic!("unexpected error: {e}"),
                }
                assert!(bucket.available() <= RATE);
            }
        }));
    }

    for h in handles {
        h.await.unwrap();
    }

    // Burst of at most RATE plus one second of refill, with some scheduling slack
    let admitted = admitted.load(Ordering::Relaxed);
    assert!(admitted <= idle + RATE + 5, "admitted {admitted}");
    assert!(admitted >= idle, "admitted {admitted}, burst was {idle}");

    bucket.shutdown().await.unwrap();
    assert_eq!(
        bucket.get_token(Duration::from_millis(5)).await,
        Err(Error::Stopped)
    );
}
