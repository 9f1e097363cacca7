//! Printable-safe article framing:
//! a yEnc-style byte shift with escaping of the four sentinel bytes,
//! wrapped in a header/trailer line pair so the transport's NNTP-like
//! `POST`/`ARTICLE` commands can carry arbitrary ciphertext through a
//! line-oriented protocol.

use sv_core::{Error, Result};

const SHIFT: u8 = 42;
const ESCAPE: u8 = b'=';
const DEFAULT_LINE_WIDTH: usize = 128;

fn is_sentinel(b: u8) -> bool {
    matches!(b, 0x00 | 0x0A | 0x0D | b'=')
}

fn encode_byte(out: &mut Vec<u8>, b: u8) {
    let shifted = b.wrapping_add(SHIFT);
    if is_sentinel(shifted) {
        out.push(ESCAPE);
        out.push(shifted.wrapping_add(64));
    } else {
        out.push(shifted);
    }
}

/// A decoded article body: the original name from the header line and the
/// ciphertext bytes recovered from the encoded lines.
pub struct ArticleBody {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Encodes `ciphertext` into a framed article body, named `name` in the
/// header line, wrapped at `line_width` printable bytes per line (the final
/// line may be shorter). Returns the complete body including header and
/// trailer lines, `\n`-terminated.
pub fn encode_article(ciphertext: &[u8], name: &str, line_width: usize) -> Vec<u8> {
    let line_width = line_width.max(1);
    let mut encoded = Vec::with_capacity(ciphertext.len() + ciphertext.len() / 8 + 16);
    for &b in ciphertext {
        encode_byte(&mut encoded, b);
    }

    let crc = crc32fast::hash(ciphertext);

    let mut out = Vec::with_capacity(encoded.len() + 128);
    out.extend_from_slice(
        format!("=ybegin line={line_width} size={} name={name}\n", ciphertext.len()).as_bytes(),
    );

    for chunk in encoded.chunks(line_width) {
        out.extend_from_slice(chunk);
        out.push(b'\n');
    }

    out.extend_from_slice(format!("=yend size={} crc32={:08x}\n", ciphertext.len(), crc).as_bytes());
    out
}

/// Decodes a body produced by [`encode_article`]. Tolerant of variable line
/// length since it decodes the full byte stream across all body lines
/// rather than trusting the `line=` field for anything but diagnostics.
pub fn decode_article(body: &[u8]) -> Result<ArticleBody> {
    let text = std::str::from_utf8(body)
        .map_err(|_| Error::IntegrityFailure("article body is not valid UTF-8".into()))?;

    let mut lines = text.lines();

    let header = lines
        .next()
        .ok_or_else(|| Error::IntegrityFailure("article body missing header line".into()))?;
    let name = parse_field(header, "name=")
        .ok_or_else(|| Error::IntegrityFailure("ybegin header missing name field".into()))?
        .to_string();
    let declared_size: usize = parse_field(header, "size=")
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::IntegrityFailure("ybegin header missing size field".into()))?;

    let mut body_lines: Vec<&str> = Vec::new();
    let mut trailer: Option<&str> = None;
    for line in lines {
        if line.starts_with("=yend") {
            trailer = Some(line);
            break;
        }
        body_lines.push(line);
    }
    let trailer = trailer.ok_or_else(|| Error::IntegrityFailure("article body missing trailer line".into()))?;

    let expected_crc = parse_field(trailer, "crc32=")
        .ok_or_else(|| Error::IntegrityFailure("yend trailer missing crc32 field".into()))?;

    let mut decoded = Vec::with_capacity(declared_size);
    for line in body_lines {
        decode_line(line.as_bytes(), &mut decoded)?;
    }

    if decoded.len() != declared_size {
        return Err(Error::IntegrityFailure(format!(
            "decoded {} bytes, header declared size={}",
            decoded.len(),
            declared_size
        )));
    }

    let actual_crc = format!("{:08x}", crc32fast::hash(&decoded));
    if !actual_crc.eq_ignore_ascii_case(expected_crc) {
        return Err(Error::IntegrityFailure(format!(
            "crc32 mismatch: header says {expected_crc}, computed {actual_crc}"
        )));
    }

    Ok(ArticleBody { name, bytes: decoded })
}

fn decode_line(line: &[u8], out: &mut Vec<u8>) -> Result<()> {
    let mut i = 0;
    while i < line.len() {
        let b = line[i];
        if b == ESCAPE {
            i += 1;
            let escaped = *line
                .get(i)
                .ok_or_else(|| Error::IntegrityFailure("dangling escape at end of line".into()))?;
            out.push(escaped.wrapping_sub(64).wrapping_sub(SHIFT));
        } else {
            out.push(b.wrapping_sub(SHIFT));
        }
        i += 1;
    }
    Ok(())
}

fn parse_field<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let start = line.find(key)? + key.len();
    let rest = &line[start..];
    Some(rest.split_whitespace().next().unwrap_or(rest))
}

/// Default line width used when callers do not need a narrower one (e.g. to
/// match an upstream server's line-length preference).
pub const DEFAULT_FRAME_LINE_WIDTH: usize = DEFAULT_LINE_WIDTH;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_arbitrary_bytes() {
        let data: Vec<u8> = (0..=255u16).map(|b| b as u8).collect();
        let encoded = encode_article(&data, "segment-0", 64);
        let decoded = decode_article(&encoded).unwrap();
        assert_eq!(decoded.bytes, data);
        assert_eq!(decoded.name, "segment-0");
    }

    #[test]
    fn empty_body_round_trips() {
        let encoded = encode_article(&[], "empty", 128);
        let decoded = decode_article(&encoded).unwrap();
        assert!(decoded.bytes.is_empty());
    }

    #[test]
    fn decoder_tolerates_different_line_width_than_encoder_declared() {
        let data = b"the quick brown fox jumps over the lazy dog".to_vec();
        let mut encoded = encode_article(&data, "f", 16);
        // Rewrite the header's line= field to a different value; the decoder
        // must not depend on it matching the actual wrapping.
        let as_text = String::from_utf8(encoded.clone()).unwrap();
        let rewritten = as_text.replacen("line=16", "line=999", 1);
        encoded = rewritten.into_bytes();

        let decoded = decode_article(&encoded).unwrap();
        assert_eq!(decoded.bytes, data);
    }

    #[test]
    fn tampered_byte_fails_crc_check() {
        let data = b"hello world".to_vec();
        let mut encoded = encode_article(&data, "f", 32);
        // Flip a bit inside a body line without touching header/trailer.
        let body_line_start = encoded.iter().position(|&b| b == b'\n').unwrap() + 1;
        encoded[body_line_start] ^= 0x01;
        assert!(decode_article(&encoded).is_err());
    }

    #[test]
    fn sentinel_bytes_are_escaped_and_recovered() {
        let data = vec![0x00u8, 0x0A, 0x0D, b'='];
        let encoded = encode_article(&data, "sentinels", 8);
        let decoded = decode_article(&encoded).unwrap();
        assert_eq!(decoded.bytes, data);
    }

    #[test]
    fn missing_trailer_is_rejected() {
        let mut encoded = encode_article(b"abc", "f", 8);
        let trailer_start = encoded.windows(5).position(|w| w == b"=yend").unwrap();
        encoded.truncate(trailer_start);
        assert!(decode_article(&encoded).is_err());
    }
}
