use {super::version_rolling::VersionRoller, super::*, hashkernel::header_midstate};

/// A single hashing worker's view of a job: a fixed header template, the pool's
/// target, and (if the server granted it) a version-rolling mask widening the
/// search space beyond the 32-bit nonce.
#[derive(Debug)]
pub(crate) struct Hasher {
    pub(crate) version: Version,
    pub(crate) header: Header,
    pub(crate) job_id: JobId,
    pub(crate) pool_target: Target,
    pub(crate) enonce2: Extranonce,
    pub(crate) version_mask: Option<Version>,
}

const BATCH_SIZE: u64 = 10_000;

/// Splits an 80-byte Bitcoin block header into the midstate-cacheable first 64 bytes
/// and the trailing 16 (last 4 bytes of the merkle root, time, bits, nonce).
fn header_bytes(header: &Header) -> [u8; 80] {
    let mut bytes = [0u8; 80];
    let mut encoded = Vec::with_capacity(80);
    header
        .consensus_encode(&mut encoded)
        .expect("encoding to a Vec never fails");
    bytes.copy_from_slice(&encoded);
    bytes
}

impl Hasher {
    /// Searches the nonce space for the current version, rolling to the next
    /// version (per the granted mask) once a full 32-bit nonce sweep comes up
    /// empty. Returns the winning header along with the rolled version bits
    /// actually submitted to the pool, if version rolling was in play.
    pub(crate) fn hash(
        &mut self,
        cancel: CancellationToken,
        metrics: Arc<Metrics>,
        throttle: f64,
    ) -> Result<(JobId, Header, Extranonce, Option<Version>)> {
        let mut roller = match self.version_mask {
            Some(mask) => VersionRoller::new(self.version.0.to_consensus(), mask.0.to_consensus() as u32),
            None => VersionRoller::disabled(self.version.0.to_consensus()),
        };

        let mut hashes = 0u64;
        let start = Instant::now();
        let mut last_log = start;

        let span = tracing::info_span!(
            "hasher",
            job_id = %self.job_id,
            extranonce2 = %self.enonce2,
            version_rolling = roller.is_enabled(),
        );
        let _enter = span.enter();

        loop {
            self.header.version = block::Version::from_consensus(roller.current_version());

            let full = header_bytes(&self.header);
            let first_64: [u8; 64] = full[..64].try_into().unwrap();
            let midstate = header_midstate(&first_64);
            let target_le = self.pool_target.to_le_bytes();

            let mut nonce_space_exhausted = false;

            while !nonce_space_exhausted {
                if cancel.is_cancelled() {
                    return Err(anyhow!("hasher cancelled"));
                }

                let batch_start = Instant::now();

                for _ in 0..BATCH_SIZE {
                    let mut last_16: [u8; 16] = full[64..80].try_into().unwrap();
                    last_16[12..16].copy_from_slice(&self.header.nonce.to_le_bytes());

                    let digest = hashkernel::finish_header(&midstate, &last_16);
                    hashes += 1;

                    if hashkernel::meets_target(&digest, &target_le) {
                        let hash = self.header.block_hash();
                        info!("Solved block with hash: {hash}");
                        let version_bits = roller
                            .rolled_bits()
                            .map(|bits| Version(block::Version::from_consensus(bits as i32)));
                        return Ok((self.job_id, self.header, self.enonce2.clone(), version_bits));
                    }

                    match self.header.nonce.checked_add(1) {
                        Some(next) => self.header.nonce = next,
                        None => {
                            nonce_space_exhausted = true;
                            break;
                        }
                    }
                }

                metrics.add(BATCH_SIZE);

                // `throttle` is hashes/sec per core (f64::MAX when the operator set no
                // cap), so the computed sleep is negligible in the unthrottled case.
                let expected = Duration::from_secs_f64(BATCH_SIZE as f64 / throttle);
                let elapsed = batch_start.elapsed();
                if expected > elapsed {
                    std::thread::sleep(expected - elapsed);
                }

                let now = Instant::now();
                if now.duration_since(last_log).as_secs() >= 5 {
                    let total_elapsed = now.duration_since(start).as_secs_f64().max(1e-6);
                    info!("Hashrate: {}", HashRate(hashes as f64 / total_elapsed));
                    last_log = now;
                }
            }

            if !roller.roll() {
                return Err(anyhow!("nonce space exhausted"));
            }
            self.header.nonce = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        bitcoin::{BlockHash, Target, TxMerkleNode, hashes::Hash},
    };

    fn shift(leading_zeros: u8) -> Target {
        assert!(leading_zeros <= 32, "leading_zeros too high");

        let mut bytes = [0xFFu8; 32];

        let full_zero_bytes = (leading_zeros / 8) as usize;
        let partial_bits = leading_zeros % 8;

        for byte in bytes.iter_mut().take(full_zero_bytes) {
            *byte = 0x00;
        }

        if partial_bits > 0 {
            let mask = 0xFF >> partial_bits;
            bytes[full_zero_bytes] = mask;
        }

        Target::from_be_bytes(bytes)
    }

    fn header(network_target: Option<Target>, nonce: Option<u32>) -> Header {
        Header {
            version: block::Version::TWO,
            prev_blockhash: BlockHash::all_zeros(),
            merkle_root: TxMerkleNode::from_raw_hash(BlockHash::all_zeros().to_raw_hash()),
            time: 0,
            bits: network_target.unwrap_or(Target::MAX).to_compact_lossy(),
            nonce: nonce.unwrap_or_default(),
        }
    }

    fn hasher(target: Target, nonce: Option<u32>) -> Hasher {
        Hasher {
            version: Version(block::Version::TWO),
            header: header(None, nonce),
            pool_target: target,
            enonce2: "0000000000".parse().unwrap(),
            job_id: "bf".parse().unwrap(),
            version_mask: None,
        }
    }

    #[test]
    fn test_target_leading_zeros_levels() {
        let target_0 = shift(0);
        let target_8 = shift(8);
        let target_16 = shift(16);
        let target_24 = shift(24);

        assert!(target_8 < target_0);
        assert!(target_16 < target_8);
        assert!(target_24 < target_16);

        let bytes_8 = target_8.to_be_bytes();
        let bytes_16 = target_16.to_be_bytes();

        assert_eq!(bytes_8[0], 0);
        assert_eq!(bytes_16[0], 0);
        assert_eq!(bytes_16[1], 0);

        assert_eq!(bytes_8[1], 0xFF);
        assert_eq!(bytes_16[2], 0xFF);
    }

    #[test]
    fn test_partial_byte_leading_zeros() {
        let target_4 = shift(4);
        let target_12 = shift(12);

        let bytes_4 = target_4.to_be_bytes();
        let bytes_12 = target_12.to_be_bytes();

        assert_eq!(bytes_4[0], 0x0F);
        assert_eq!(bytes_4[1], 0xFF);

        assert_eq!(bytes_12[0], 0);
        assert_eq!(bytes_12[1], 0x0F);
        assert_eq!(bytes_12[2], 0xFF);
    }

    #[test]
    fn hasher_agrees_with_bitcoin_crate_block_hash() {
        let target = shift(1);
        let mut hasher = hasher(target, None);

        let (_job_id, header, _enonce2, version_bits) = hasher
            .hash(CancellationToken::new(), Arc::new(Metrics::new()), f64::MAX)
            .unwrap();
        assert!(target.is_met_by(header.block_hash()));
        assert!(version_bits.is_none());
    }

    #[test]
    fn hasher_nonce_space_exhausted() {
        let target = shift(32);
        let mut hasher = hasher(target, Some(u32::MAX - 1));

        assert!(
            hasher
                .hash(CancellationToken::new(), Arc::new(Metrics::new()), f64::MAX)
                .is_err_and(|err| err.to_string() == "nonce space exhausted")
        );
    }

    #[test]
    fn version_rolling_tries_every_combination_before_failing() {
        // A 1-bit mask gives exactly 2 version combinations. Starting one nonce
        // short of exhaustion means each version only gets 2 hash attempts before
        // rolling, so this covers both versions (4 hashes total) well within an
        // impossible target's reach and still terminates with "nonce space
        // exhausted" rather than hanging.
        let target = shift(32);
        let mut hasher = hasher(target, Some(u32::MAX - 1));
        hasher.version_mask = Some(Version(block::Version::from_consensus(0b1 << 13)));

        let result = hasher.hash(CancellationToken::new(), Arc::new(Metrics::new()), f64::MAX);
        assert!(result.is_err_and(|err| err.to_string() == "nonce space exhausted"));
    }

    #[test]
    fn header_bytes_round_trips_through_consensus_decode() {
        let h = header(Some(shift(8)), Some(42));
        let bytes = header_bytes(&h);
        let decoded: Header = consensus::deserialize(&bytes).unwrap();
        assert_eq!(decoded, h);
    }
}
