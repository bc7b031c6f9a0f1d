//! In-memory mempool keyed by txid, with a fee-rate/first-seen eviction policy. Single
//! writer (the Bitcoin P2P Session's parse loop), many readers — a plain map behind a
//! `std::sync::RwLock` is enough since writes are already serialized to one thread and
//! readers just need a consistent snapshot.
use super::*;

#[derive(Debug, Clone)]
pub struct MempoolEntry {
    pub txid: Txid,
    pub weight: u32,
    pub fee: i64,
    pub first_seen: Instant,
    pub raw: Vec<u8>,
}

impl MempoolEntry {
    pub fn size(&self) -> usize {
        self.raw.len()
    }

    /// Satoshis per weight unit. Zero-weight entries (shouldn't occur for a parsed
    /// transaction) sort as the cheapest possible entry rather than dividing by zero.
    pub fn fee_rate(&self) -> f64 {
        if self.weight == 0 {
            0.0
        } else {
            self.fee as f64 / self.weight as f64
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct EvictionKey {
    fee_rate: f64,
    first_seen: Instant,
}

impl EvictionKey {
    fn of(entry: &MempoolEntry) -> Self {
        Self {
            fee_rate: entry.fee_rate(),
            first_seen: entry.first_seen,
        }
    }

    /// Ascending by fee-rate, descending by first-seen: the entry popped first by the
    /// min-heap is the cheapest, and among equal-fee entries the most recently seen one
    /// (least "established") goes first.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.fee_rate
            .partial_cmp(&other.fee_rate)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| other.first_seen.cmp(&self.first_seen))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct HeapItem {
    key: EvictionKey,
    txid: Txid,
}

impl Eq for HeapItem {}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // BinaryHeap is a max-heap; reverse so `peek`/`pop` surface the cheapest entry.
        other.key.cmp(&self.key)
    }
}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
pub struct MempoolIndex {
    entries: HashMap<Txid, MempoolEntry>,
    heap: std::collections::BinaryHeap<HeapItem>,
    total_bytes: usize,
    cap_bytes: usize,
}

#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum MempoolError {
    #[snafu(display("entry of {size} bytes exceeds the {cap} byte cap on its own"))]
    TooLarge { size: usize, cap: usize },
    #[snafu(display("incoming entry has the lowest fee-rate; rejected rather than evicting"))]
    RejectedLowestFeeRate,
}

impl MempoolIndex {
    pub fn new(cap_bytes: usize) -> Self {
        Self {
            entries: HashMap::new(),
            heap: std::collections::BinaryHeap::new(),
            total_bytes: 0,
            cap_bytes,
        }
    }

    pub fn contains(&self, txid: &Txid) -> bool {
        self.entries.contains_key(txid)
    }

    pub fn get(&self, txid: &Txid) -> Option<&MempoolEntry> {
        self.entries.get(txid)
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts `entry`, evicting cheaper entries to make room if needed. If the incoming
    /// entry is itself the cheapest thing that would remain (or too large outright), it
    /// is rejected instead — the default "reject-incoming-if-lowest" policy.
    pub fn insert(&mut self, entry: MempoolEntry) -> Result<(), MempoolError> {
        let size = entry.size();

        if size > self.cap_bytes {
            return Err(MempoolError::TooLarge {
                size,
                cap: self.cap_bytes,
            });
        }

        if self.entries.contains_key(&entry.txid) {
            self.remove(&entry.txid);
        }

        let incoming_key = EvictionKey::of(&entry);

        while self.total_bytes + size > self.cap_bytes {
            let Some(cheapest) = self.heap.peek() else {
                break;
            };
            if incoming_key.cmp(&cheapest.key) != std::cmp::Ordering::Greater {
                return Err(MempoolError::RejectedLowestFeeRate);
            }
            let evicted = self.heap.pop().expect("peeked Some above");
            self.remove(&evicted.txid);
        }

        self.total_bytes += size;
        self.heap.push(HeapItem {
            key: incoming_key,
            txid: entry.txid,
        });
        self.entries.insert(entry.txid, entry);

        Ok(())
    }

    fn remove(&mut self, txid: &Txid) {
        if let Some(entry) = self.entries.remove(txid) {
            self.total_bytes -= entry.size();
        }
    }

    /// Evicts cheapest-first entries until the total fits within `cap_bytes`.
    pub fn evict_to(&mut self, cap_bytes: usize) {
        while self.total_bytes > cap_bytes {
            let Some(cheapest) = self.heap.pop() else {
                break;
            };
            self.remove(&cheapest.txid);
        }
    }

    /// Snapshot of entries ordered from highest to lowest fee-rate.
    pub fn iter_by_fee_rate(&self) -> Vec<&MempoolEntry> {
        let mut entries: Vec<&MempoolEntry> = self.entries.values().collect();
        entries.sort_by(|a, b| {
            b.fee_rate()
                .partial_cmp(&a.fee_rate())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        entries
    }
}
