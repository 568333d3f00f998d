/*!
 * Hostname Suffix Matching
 */

/// Check if a hostname is admitted by the allow list.
///
/// A hostname matches an entry when it equals the entry exactly or is a
/// subdomain of it ("api.example.com" matches "example.com" but
/// "notexample.com" does not). An empty allow list admits nothing.
pub fn domain_allowed(allow: &[String], host: &str) -> bool {
    if allow.is_empty() {
        return false;
    }

    allow.iter().any(|entry| host_matches(host, entry))
}

fn host_matches(host: &str, entry: &str) -> bool {
    if host == entry {
        return true;
    }

    // Subdomain match: host must end with ".<entry>", which rules out
    // suffix collisions like "notexample.com" vs "example.com"
    host.len() > entry.len() + 1
        && host.ends_with(entry)
        && host.as_bytes()[host.len() - entry.len() - 1] == b'.'
}
