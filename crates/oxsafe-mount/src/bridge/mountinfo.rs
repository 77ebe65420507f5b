//! Reading mount points from `/proc/self/mountinfo`.

use std::path::{Path, PathBuf};

/// Mount points listed in mountinfo-formatted `contents`.
///
/// The fifth field of each line is the mount point, with space, tab,
/// newline and backslash written as three-digit octal escapes.
pub(crate) fn mount_points(contents: &str) -> impl Iterator<Item = PathBuf> + '_ {
    contents
        .lines()
        .filter_map(|line| line.split(' ').nth(4))
        .map(|field| PathBuf::from(unescape(field)))
}

/// Whether `dir` appears as a mount point in `contents`.
pub(crate) fn is_mount_point(contents: &str, dir: &Path) -> bool {
    mount_points(contents).any(|p| p == dir)
}

fn unescape(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\'
            && let Some(octal) = bytes.get(i + 1..i + 4)
            && octal.iter().all(|b| (b'0'..=b'7').contains(b))
            && let Ok(byte) = u8::try_from(
                octal
                    .iter()
                    .fold(0u16, |acc, b| acc * 8 + u16::from(b - b'0')),
            )
        {
            out.push(byte);
            i += 4;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}
