//! Unicode rules for path components.
//!
//! Names are stored on disk in NFC. Two components name the same entry when
//! they are equal after canonical decomposition, lowercasing and
//! recomposition, so "Café", "CAFE\u{301}" and "café" all collide.
//!
//! On macOS the Finder expects decomposed names back from a listing, so the
//! user-facing form there is NFD. Everywhere else it is the stored NFC form.

use unicode_normalization::{is_nfc, UnicodeNormalization};

/// Normalize a component to the form it is stored under on disk (NFC).
pub fn normalize_for_fs(component: &str) -> String {
    component.nfc().collect()
}

/// Convert a stored component into the form shown to users.
pub fn normalize_for_user(component: &str) -> String {
    if cfg!(target_os = "macos") {
        component.nfd().collect()
    } else {
        component.to_owned()
    }
}

/// Whether a stored component is already in its on-disk form.
pub fn is_normalized(component: &str) -> bool {
    is_nfc(component)
}

/// Case- and normalization-insensitive comparison key.
pub fn fold(component: &str) -> String {
    let decomposed: String = component.nfd().collect();
    decomposed.to_lowercase().nfc().collect()
}

/// Whether two components name the same entry.
pub fn components_equal(a: &str, b: &str) -> bool {
    a == b || fold(a) == fold(b)
}
