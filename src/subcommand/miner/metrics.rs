use super::*;

#[derive(Clone)]
pub(crate) struct Metrics {
    total: Arc<AtomicU64>,
    started: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            total: Arc::new(AtomicU64::new(0)),
            started: Instant::now(),
        }
    }

    pub fn add(&self, hashes: u64) {
        self.total.fetch_add(hashes, Ordering::Relaxed);
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }
}

impl StatusLine for Metrics {
    fn status_line(&self) -> String {
        let hash_rate = self.total() as f64 / self.uptime().as_secs_f64().max(1e-6);
        format!(
            "hashrate={}  uptime={:.1}s",
            HashRate(hash_rate),
            self.uptime().as_secs_f64()
        )
    }
}
