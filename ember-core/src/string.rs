//! Freestanding string helpers
//!
//! Operate on NUL-terminated byte buffers as they are exchanged with
//! userspace and stored in fixed-size kernel records. A buffer without a
//! terminator ends at the slice end.

/// Number of bytes before the terminator
pub fn length(s: &[u8]) -> usize {
    s.iter().position(|&b| b == 0).unwrap_or(s.len())
}

/// Copy `source` into `target` and terminate it, truncating to fit.
/// Returns the number of bytes copied, terminator excluded.
pub fn copy(target: &mut [u8], source: &[u8]) -> usize {
    if target.is_empty() {
        return 0;
    }
    let len = length(source).min(target.len() - 1);
    target[..len].copy_from_slice(&source[..len]);
    target[len] = 0;
    len
}

/// Write `a` followed by `b` into `out`, terminated, truncating to fit.
/// Returns the resulting length.
pub fn concat(a: &[u8], b: &[u8], out: &mut [u8]) -> usize {
    let first = copy(out, a);
    if first + 1 >= out.len() {
        return first;
    }
    first + copy(&mut out[first..], b)
}

/// Position of the first `c` before the terminator
pub fn index_of(s: &[u8], c: u8) -> Option<usize> {
    s[..length(s)].iter().position(|&b| b == c)
}

pub fn equals(a: &[u8], b: &[u8]) -> bool {
    a[..length(a)] == b[..length(b)]
}

/// Replace every `character` before the terminator with `replacement`
pub fn replace(s: &mut [u8], character: u8, replacement: u8) {
    let len = length(s);
    for b in s[..len].iter_mut().filter(|b| **b == character) {
        *b = replacement;
    }
}

/// The terminated contents as text, cut at the first invalid UTF-8 byte
pub fn as_str(s: &[u8]) -> &str {
    let bytes = &s[..length(s)];
    match core::str::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => core::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or_default(),
    }
}
