/// Fixed zstd level so compressed output is byte-identical across runs and
/// machines (pack precedent: `ziXnOrg-ORCA`'s blob store and
/// `abitofhelp-adaptive_pipeline` both fix their zstd level rather than
/// auto-tuning it).
const ZSTD_LEVEL: i32 = 3;

/// Compresses `data` and returns it only if the result is strictly smaller;
/// otherwise returns the original bytes unchanged. The boolean tells the
/// caller whether the returned bytes are compressed, so the segment header
/// can record it for a lossless decode.
pub fn compress_if_smaller(data: &[u8]) -> (Vec<u8>, bool) {
    match zstd::bulk::compress(data, ZSTD_LEVEL) {
        Ok(compressed) if compressed.len() < data.len() => (compressed, true),
        _ => (data.to_vec(), false),
    }
}

/// Inverse of [`compress_if_smaller`] when `compressed` is true.
pub fn decompress(data: &[u8], original_len: usize) -> std::io::Result<Vec<u8>> {
    zstd::bulk::decompress(data, original_len)
}

const PACK_HEADER_LEN: usize = 5;

/// Wraps a segment's plaintext (after optional compression) in a small fixed
/// header so the compression flag and original length travel with the bytes
/// the uploader hands to `sv-crypto` for sealing, rather than living in the
/// catalog schema or the AEAD's associated data. Layout: one flag byte, then
/// a big-endian `u32` original length, then the payload.
pub fn pack_segment(plaintext: &[u8]) -> Vec<u8> {
    let (payload, compressed) = compress_if_smaller(plaintext);
    let mut out = Vec::with_capacity(PACK_HEADER_LEN + payload.len());
    out.push(compressed as u8);
    out.extend_from_slice(&(plaintext.len() as u32).to_be_bytes());
    out.extend_from_slice(&payload);
    out
}

/// Inverse of [`pack_segment`], run after AEAD decryption.
pub fn unpack_segment(envelope: &[u8]) -> sv_core::Result<Vec<u8>> {
    if envelope.len() < PACK_HEADER_LEN {
        return Err(sv_core::Error::IntegrityFailure("segment envelope shorter than its header".into()));
    }
    let compressed = envelope[0] != 0;
    let original_len = u32::from_be_bytes(envelope[1..5].try_into().unwrap()) as usize;
    let payload = &envelope[PACK_HEADER_LEN..];

    if compressed {
        decompress(payload, original_len)
            .map_err(|e| sv_core::Error::IntegrityFailure(format!("zstd decompress failed: {e}")))
    } else if payload.len() == original_len {
        Ok(payload.to_vec())
    } else {
        Err(sv_core::Error::IntegrityFailure(format!(
            "declared length {original_len} does not match payload length {}",
            payload.len()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compressible_data_shrinks() {
        let data = vec![0u8; 64 * 1024];
        let (out, compressed) = compress_if_smaller(&data);
        assert!(compressed);
        assert!(out.len() < data.len());

        let restored = decompress(&out, data.len()).unwrap();
        assert_eq!(restored, data);
    }

    #[test]
    fn incompressible_data_is_passed_through() {
        // Already-compressed-looking random bytes rarely shrink further.
        let data: Vec<u8> = (0..256u32).map(|i| (i * 2654435761u32 % 256) as u8).collect();
        let (out, compressed) = compress_if_smaller(&data);
        if !compressed {
            assert_eq!(out, data);
        }
    }

    #[test]
    fn empty_input_round_trips() {
        let (out, compressed) = compress_if_smaller(&[]);
        if compressed {
            assert_eq!(decompress(&out, 0).unwrap(), Vec::<u8>::new());
        } else {
            assert!(out.is_empty());
        }
    }

    #[test]
    fn pack_unpack_round_trips_compressible_data() {
        let data = vec![7u8; 64 * 1024];
        let envelope = pack_segment(&data);
        let recovered = unpack_segment(&envelope).unwrap();
        assert_eq!(recovered, data);
    }

    #[test]
    fn pack_unpack_round_trips_incompressible_data() {
        let data: Vec<u8> = (0..256u32).map(|i| (i * 2654435761u32 % 256) as u8).collect();
        let envelope = pack_segment(&data);
        let recovered = unpack_segment(&envelope).unwrap();
        assert_eq!(recovered, data);
    }

    #[test]
    fn unpack_rejects_truncated_envelope() {
        assert!(unpack_segment(&[1, 0, 0]).is_err());
    }

    #[test]
    fn unpack_rejects_length_mismatch() {
        let mut envelope = pack_segment(b"hello world");
        // Corrupt the declared original length without recompressing.
        envelope[1] = 0xff;
        assert!(unpack_segment(&envelope).is_err());
    }
}
