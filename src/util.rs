//! Tokenization and prefix matching used by the REPL dispatcher.
//!
//! Mirrors `nkgt::util::split`/`is_prefix` from the C++ original this crate
//! is descended from: a single-pass split that collapses runs of the
//! delimiter, and a byte-wise prefix test.

/// Splits `source` on runs of `delimiter`, collapsing leading, trailing and
/// interior runs into a single separator.
///
/// ```text
/// split("  a   bb ", ' ') == ["a", "bb"]
/// ```
pub fn split(source: &str, delimiter: char) -> Vec<&str> {
    let bytes = source.as_bytes();
    let delim = delimiter as u8;

    let mut min = 0;
    while min < bytes.len() && bytes[min] == delim {
        min += 1;
    }

    if min == bytes.len() {
        return Vec::new();
    }

    let mut max = bytes.len() - 1;
    while max > min && bytes[max] == delim {
        max -= 1;
    }

    let mut token_count = 1;
    let mut i = min;
    while i <= max {
        if bytes[i] == delim {
            token_count += 1;
            while bytes[i] == delim {
                i += 1;
            }
        } else {
            i += 1;
        }
    }

    let mut tokens = Vec::with_capacity(token_count);
    let mut begin = min;
    let mut i = min;
    while i <= max {
        if bytes[i] == delim {
            tokens.push(&source[begin..i]);
            while bytes[i] == delim {
                i += 1;
            }
            begin = i;
        } else {
            i += 1;
        }
    }
    tokens.push(&source[begin..=max]);

    tokens
}

/// True iff `full` is equal to or starts with `prefix`.
///
/// The empty prefix matches any string, including the empty string.
pub fn is_prefix(prefix: &str, full: &str) -> bool {
    let prefix = prefix.as_bytes();
    let full = full.as_bytes();

    if prefix.len() > full.len() {
        return false;
    }

    prefix == &full[..prefix.len()]
}
