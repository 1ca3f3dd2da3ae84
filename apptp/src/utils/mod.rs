pub mod fs;
pub use fs::*;

pub mod readers;
pub use readers::*;

/// Normalize a hostname for lookups: lowercase, no surrounding whitespace,
/// no leading or trailing dots.
pub fn normalize_hostname(hostname: &str) -> String {
    hostname
        .trim()
        .trim_start_matches('.')
        .trim_end_matches('.')
        .to_ascii_lowercase()
}

/// Iterate over `hostname` and each of its parent domains, most specific
/// first. Single label suffixes (`com`) are never yielded unless the
/// hostname itself is a single label.
pub fn parent_domains(hostname: &str) -> impl Iterator<Item = &str> {
    let mut next = Some(hostname);
    std::iter::from_fn(move || {
        let current = next?;
        next = match current.find('.') {
            Some(idx) => {
                let parent = &current[idx + 1..];
                if parent.contains('.') {
                    Some(parent)
                } else {
                    None
                }
            }
            None => None,
        };
        Some(current)
    })
}
