//! Scripted dialers for exercising the scan engine without real sockets.
#![allow(dead_code)]

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use nettools_rs::scanner::Dialer;
use nettools_rs::types::PortStatus;

fn loopback() -> Vec<SocketAddr> {
    vec![SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)]
}

/// Decrements the shared counter when the owning future is dropped.
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Every connect attempt hangs forever and ignores its time limit.
#[derive(Default)]
pub struct StallingDialer {
    pub in_flight: Arc<AtomicUsize>,
}

#[async_trait]
impl Dialer for StallingDialer {
    async fn resolve(&self, _host: &str, _limit: Duration) -> Vec<SocketAddr> {
        loopback()
    }

    async fn dial(&self, _addrs: &[SocketAddr], _port: u16, _limit: Duration) -> PortStatus {
        let _guard = InFlight::enter(&self.in_flight);
        std::future::pending::<()>().await;
        PortStatus::Closed
    }
}

/// Name resolution never finishes.
pub struct StallingResolver;

#[async_trait]
impl Dialer for StallingResolver {
    async fn resolve(&self, _host: &str, _limit: Duration) -> Vec<SocketAddr> {
        std::future::pending().await
    }

    async fn dial(&self, _addrs: &[SocketAddr], _port: u16, _limit: Duration) -> PortStatus {
        PortStatus::Closed
    }
}

/// One connect attempt as seen by [`TimedDialer`].
#[derive(Debug, Clone, Copy)]
pub struct Attempt {
    pub port: u16,
    pub started: Instant,
    pub finished: Instant,
}

/// Takes `delay` per port, reports ports divisible by 7 as open, and records
/// timing plus peak concurrency.
pub struct TimedDialer {
    delay: Duration,
    current: AtomicUsize,
    pub peak: AtomicUsize,
    pub attempts: Mutex<Vec<Attempt>>,
}

impl TimedDialer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            attempts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Dialer for TimedDialer {
    async fn resolve(&self, _host: &str, _limit: Duration) -> Vec<SocketAddr> {
        loopback()
    }

    async fn dial(&self, _addrs: &[SocketAddr], port: u16, _limit: Duration) -> PortStatus {
        let started = Instant::now();
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        let finished = Instant::now();
        self.attempts.lock().unwrap().push(Attempt {
            port,
            started,
            finished,
        });
        if port % 7 == 0 {
            PortStatus::Open
        } else {
            PortStatus::Closed
        }
    }
}
