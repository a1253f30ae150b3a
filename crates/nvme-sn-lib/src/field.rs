//! Fixed-width ASCII field extraction.
//!
//! Identify data stores text (serial, model, firmware) as space-padded byte
//! arrays that may or may not be NUL-terminated.  [`format_char_array`]
//! turns such a region into a trimmed, printable, NUL-terminated string
//! inside a caller-supplied buffer.

/// Substitute for bytes outside the printable ASCII range.
pub const NON_PRINTABLE: u8 = b'?';

fn is_printable(b: u8) -> bool {
    (b' '..=b'~').contains(&b)
}

/// Locate the trimmed content of `src`: leading spaces skipped, cut at the
/// first NUL (or the end of the region), trailing spaces dropped.
fn trimmed_bounds(src: &[u8]) -> (usize, usize) {
    let start = src.iter().position(|&b| b != b' ').unwrap_or(src.len());
    let mut len = src[start..]
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(src.len() - start);
    while len > 0 && src[start + len - 1] == b' ' {
        len -= 1;
    }
    (start, len)
}

/// Copy the trimmed, sanitized content of `src` into `dst` and terminate it.
///
/// At most `dst.len() - 1` content bytes are copied; longer content is cut
/// silently.  A NUL is always written right after the copied bytes.  Bytes
/// outside `' '..='~'` become `?`.
///
/// Returns the copied content (without the terminator) as a `&str` borrowed
/// from `dst`.  A zero-length `dst` has no room for the terminator, so
/// nothing is written and `""` is returned.
pub fn format_char_array<'d>(dst: &'d mut [u8], src: &[u8]) -> &'d str {
    let Some(capacity) = dst.len().checked_sub(1) else {
        return "";
    };
    let (start, len) = trimmed_bounds(src);
    let n = len.min(capacity);

    for (out, &c) in dst.iter_mut().zip(&src[start..start + n]) {
        *out = if is_printable(c) { c } else { NON_PRINTABLE };
    }
    dst[n] = 0;

    // Every byte written above is printable ASCII.
    std::str::from_utf8(&dst[..n]).unwrap_or_default()
}

/// Owned variant of [`format_char_array`] with room for the whole field.
pub fn field_to_string(src: &[u8]) -> String {
    let mut buf = vec![0u8; src.len() + 1];
    format_char_array(&mut buf, src).to_string()
}
