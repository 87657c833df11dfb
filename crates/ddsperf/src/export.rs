// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Flat binary export of latency measurements.
//!
//! Layout (native byte order):
//!
//! ```text
//! +-----------+----------------+----------------+-----
//! | count u32 | latency[0] f64 | latency[1] f64 | ...
//! +-----------+----------------+----------------+-----
//! ```

use crate::error::{Error, Result};

const COUNT_LEN: usize = std::mem::size_of::<u32>();
const VALUE_LEN: usize = std::mem::size_of::<f64>();

/// Serialize `latencies` for a consumer on the same host.
///
/// Lists longer than `u32::MAX` are truncated to `u32::MAX` entries.
pub fn encode_latencies(latencies: &[f64]) -> Vec<u8> {
    let count = u32::try_from(latencies.len()).unwrap_or(u32::MAX);
    let values = &latencies[..count as usize];

    let mut buf = Vec::with_capacity(COUNT_LEN + values.len() * VALUE_LEN);
    buf.extend_from_slice(&count.to_ne_bytes());
    for value in values {
        buf.extend_from_slice(&value.to_ne_bytes());
    }
    buf
}

/// Parse a buffer produced by [`encode_latencies`].
pub fn decode_latencies(buf: &[u8]) -> Result<Vec<f64>> {
    if buf.len() < COUNT_LEN {
        return Err(Error::InvalidParameter(format!(
            "latency export too short: {} bytes, need at least {}",
            buf.len(),
            COUNT_LEN
        )));
    }
    let (head, body) = buf.split_at(COUNT_LEN);

    let mut count_bytes = [0u8; COUNT_LEN];
    count_bytes.copy_from_slice(head);
    let count = u32::from_ne_bytes(count_bytes) as usize;

    let needed = count.checked_mul(VALUE_LEN).filter(|n| *n == body.len());
    if needed.is_none() {
        return Err(Error::InvalidParameter(format!(
            "latency export declares {} values but carries {} payload bytes",
            count,
            body.len()
        )));
    }

    Ok(body
        .chunks_exact(VALUE_LEN)
        .map(|chunk| {
            let mut bytes = [0u8; VALUE_LEN];
            bytes.copy_from_slice(chunk);
            f64::from_ne_bytes(bytes)
        })
        .collect())
}
