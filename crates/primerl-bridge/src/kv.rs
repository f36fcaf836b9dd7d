//! KV cache byte estimator.

/// Estimate resident KV cache bytes for a batch of sequences sharing a
/// transformer shape: `layers * seq_len * (heads*head_dim*2*dtype_bytes) * batch`.
pub fn kv_bytes(seq_len: u64, layers: u32, heads: u32, head_dim: u32, dtype_bytes: u32, batch: u32) -> u64 {
    let per_token = heads as u64 * head_dim as u64 * 2 * dtype_bytes as u64;
    layers as u64 * seq_len * per_token * batch as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_hand_computed_example() {
        // 32 layers, 1024 tokens, 32 heads, 128 head_dim, 2-byte dtype, batch 1
        let bytes = kv_bytes(1024, 32, 32, 128, 2, 1);
        let expected = 32u64 * 1024 * (32 * 128 * 2 * 2) * 1;
        assert_eq!(bytes, expected);
    }

    #[test]
    fn scales_linearly_with_batch() {
        let one = kv_bytes(512, 32, 32, 128, 2, 1);
        let four = kv_bytes(512, 32, 32, 128, 2, 4);
        assert_eq!(four, one * 4);
    }

    #[test]
    fn zero_seq_len_is_zero_bytes() {
        assert_eq!(kv_bytes(0, 32, 32, 128, 2, 1), 0);
    }
}
