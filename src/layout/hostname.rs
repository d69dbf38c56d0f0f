//! Deterministic, DNS-safe hostname generation
//!
//! Hostnames are derived from the cluster name, cluster id and node index.
//! The cluster id and node index guarantee uniqueness within a cluster even
//! when the seed is truncated, so the seed is always the part that gives
//! way. Pure functions only; same inputs, same hostname.

/// Fixed domain suffix appended to every generated hostname.
pub const DOMAIN_SUFFIX: &str = ".local";

/// DNS label length limit. The generated name before [`DOMAIN_SUFFIX`]
/// never exceeds this.
pub const MAX_LABEL_LEN: usize = 63;

/// Generate the hostname for one node.
///
/// The seed is lowercased and every character outside `[a-z0-9-]` becomes a
/// hyphen. The cluster id (leading zeros stripped) and node index are
/// appended, then the fixed domain suffix. An overlong seed is truncated;
/// the id/index part never is.
pub fn create_hostname(seed: &str, cluster_id: &str, node_index: u32) -> String {
    let sanitized = sanitize_seed(seed);

    let id_part = cluster_id.trim_start_matches('0');
    let id_part = if id_part.is_empty() { "0" } else { id_part };
    let unique = format!("{}-{}", id_part, node_index);

    let budget = MAX_LABEL_LEN.saturating_sub(unique.len());
    // Sanitized seeds are pure ASCII, so byte slicing is safe.
    let seed_part = if sanitized.len() > budget {
        &sanitized[..budget]
    } else {
        &sanitized
    };

    format!("{}{}{}", seed_part, unique, DOMAIN_SUFFIX)
}

fn sanitize_seed(seed: &str) -> String {
    seed.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn test_create_hostname() {
        assert_eq!(
            create_hostname("i.am-a_cluster", "00000001", 1002),
            "i-am-a-cluster1-1002.local"
        );
    }

    #[test]
    fn test_long_seed_truncated_never_the_suffix() {
        let long_seed = "a".repeat(100);
        let hostname = create_hostname(&long_seed, "00000001", 1002);

        let label = hostname.strip_suffix(DOMAIN_SUFFIX).unwrap();
        assert_eq!(label.len(), MAX_LABEL_LEN);
        assert!(label.ends_with("1-1002"));
        assert_eq!(label, format!("{}1-1002", "a".repeat(57)));
    }

    #[test]
    fn test_label_stays_within_dns_limit() {
        for len in [0usize, 1, 57, 58, 100, 300] {
            let seed = "x".repeat(len);
            let hostname = create_hostname(&seed, "42", 7);
            let label = hostname.strip_suffix(DOMAIN_SUFFIX).unwrap();
            assert!(label.len() <= MAX_LABEL_LEN, "len {} broke the limit", len);
        }
    }

    #[test]
    fn test_output_alphabet() {
        let pattern = Regex::new(r"^[a-z0-9-]+$").unwrap();
        let hostname = create_hostname("My_Weird.Cluster!Name", "007", 3);
        let label = hostname.strip_suffix(DOMAIN_SUFFIX).unwrap();
        assert!(pattern.is_match(label), "bad label: {}", label);
    }

    #[test]
    fn test_deterministic() {
        let a = create_hostname("cluster", "0001", 12);
        let b = create_hostname("cluster", "0001", 12);
        assert_eq!(a, b);
    }

    #[test]
    fn test_all_zero_cluster_id() {
        assert_eq!(create_hostname("c", "0000", 1), "c0-1.local");
    }

    #[test]
    fn test_index_keeps_names_unique() {
        let a = create_hostname("cluster", "1", 1);
        let b = create_hostname("cluster", "1", 2);
        assert_ne!(a, b);
    }
}
