//! Shannon entropy estimation over sampled file content
//!
//! Entropy measures the randomness of data. Normal files (text, documents)
//! have low entropy (3-5 bits/byte). Encrypted/compressed files have high
//! entropy (7.9-8.0 bits/byte).
//!
//! Large files are never read whole: a fixed number of evenly spaced blocks
//! is sampled, so the work per file is bounded by `block_size * max_blocks`.
//! Besides the entropy of all sampled bytes, the standard deviation of the
//! per-block entropies is reported. Encrypted output is uniformly random and
//! shows almost no block-to-block variance; mixed content does.

use std::io::{self, Read, Seek, SeekFrom};

/// How much of a file is looked at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingPolicy {
    pub block_size: usize,
    pub max_blocks: usize,
}

impl Default for SamplingPolicy {
    fn default() -> Self {
        Self {
            block_size: 4096,
            max_blocks: 16,
        }
    }
}

impl SamplingPolicy {
    pub fn new(block_size: usize, max_blocks: usize) -> Self {
        Self {
            block_size: block_size.max(1),
            max_blocks: max_blocks.max(1),
        }
    }

    /// Upper bound of bytes read per file
    pub fn budget(&self) -> u64 {
        (self.block_size as u64).saturating_mul(self.max_blocks as u64)
    }

    /// Offsets of the blocks sampled from a file of `len` bytes
    fn offsets(&self, len: u64) -> Vec<u64> {
        let block = self.block_size as u64;
        if len <= self.budget() {
            return (0..len.div_ceil(block)).map(|i| i * block).collect();
        }
        if self.max_blocks == 1 {
            return vec![0];
        }
        let span = len - block;
        let steps = (self.max_blocks - 1) as u64;
        (0..self.max_blocks as u64).map(|i| i * span / steps).collect()
    }
}

/// Entropy of the sampled content and dispersion across its blocks
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Estimate {
    /// Bits per byte, 0.0 - 8.0
    pub entropy: f64,
    /// Standard deviation of the per-block entropies
    pub standard_deviation: f64,
}

/// Calculate Shannon entropy of data
///
/// Returns a value between 0.0 (all same bytes) and 8.0 (perfectly random)
#[inline]
pub fn calculate(data: &[u8]) -> f64 {
    let mut frequency = [0u64; 256];
    count(&mut frequency, data);
    from_frequency(&frequency, data.len() as u64)
}

/// Estimate entropy of in-memory content using the sampling policy
pub fn estimate(data: &[u8], policy: SamplingPolicy) -> Estimate {
    let mut cursor = io::Cursor::new(data);
    // Reading from a slice cannot fail
    estimate_reader(&mut cursor, data.len() as u64, policy).unwrap_or_default()
}

/// Estimate entropy of a seekable stream of `len` bytes
pub fn estimate_reader<R: Read + Seek>(
    reader: &mut R,
    len: u64,
    policy: SamplingPolicy,
) -> io::Result<Estimate> {
    let policy = SamplingPolicy::new(policy.block_size, policy.max_blocks);
    let mut frequency = [0u64; 256];
    let mut total = 0u64;
    let mut block_entropies = Vec::with_capacity(policy.max_blocks);
    let mut buf = vec![0u8; policy.block_size];

    for offset in policy.offsets(len) {
        reader.seek(SeekFrom::Start(offset))?;
        let read = read_block(reader, &mut buf)?;
        if read == 0 {
            break;
        }
        let block = &buf[..read];
        count(&mut frequency, block);
        total += read as u64;

        // A short trailing block would skew the dispersion
        if read * 2 >= policy.block_size || block_entropies.is_empty() {
            block_entropies.push(calculate(block));
        }
    }

    Ok(Estimate {
        entropy: from_frequency(&frequency, total),
        standard_deviation: standard_deviation(&block_entropies),
    })
}

/// Population standard deviation
pub fn standard_deviation(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}

fn read_block<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[inline]
fn count(frequency: &mut [u64; 256], data: &[u8]) {
    for &byte in data {
        frequency[byte as usize] += 1;
    }
}

fn from_frequency(frequency: &[u64; 256], total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }

    let len = total as f64;
    let mut entropy = 0.0;

    for &count in frequency {
        if count > 0 {
            let probability = count as f64 / len;
            entropy -= probability * probability.log2();
        }
    }

    entropy.clamp(0.0, 8.0)
}
