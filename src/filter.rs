/// Restricts which zone domains this provider may touch.
///
/// An empty include list admits every domain. Exclusions win over
/// inclusions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainFilter {
    filters: Vec<String>,
    exclude: Vec<String>,
}

impl DomainFilter {
    pub fn new<I, S>(filters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::with_exclusions(filters, Vec::<String>::new())
    }

    pub fn with_exclusions<I, E, S, T>(filters: I, exclude: E) -> Self
    where
        I: IntoIterator<Item = S>,
        E: IntoIterator<Item = T>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        Self {
            filters: normalize_all(filters),
            exclude: normalize_all(exclude),
        }
    }

    pub fn matches(&self, domain: &str) -> bool {
        let domain = normalize(domain);

        if self.exclude.iter().any(|e| is_subdomain_of(&domain, e)) {
            return false;
        }

        self.filters.is_empty() || self.filters.iter().any(|f| is_subdomain_of(&domain, f))
    }
}

/// Restricts zones by provider zone ID. An empty filter admits every zone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZoneIdFilter {
    ids: Vec<String>,
}

impl ZoneIdFilter {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: ids
                .into_iter()
                .map(Into::into)
                .filter(|id: &String| !id.is_empty())
                .collect(),
        }
    }

    pub fn matches(&self, zone_id: &str) -> bool {
        self.ids.is_empty() || self.ids.iter().any(|id| id == zone_id)
    }
}

/// Lowercases and strips surrounding dots.
pub(crate) fn normalize(name: &str) -> String {
    name.trim().trim_matches('.').to_ascii_lowercase()
}

/// True when `name` equals `parent` or sits below it on a label boundary.
/// Both sides must already be normalized.
pub(crate) fn is_subdomain_of(name: &str, parent: &str) -> bool {
    name == parent
        || name
            .strip_suffix(parent)
            .map_or(false, |rest| rest.ends_with('.'))
}

fn normalize_all<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .map(|n| normalize(n.as_ref()))
        .filter(|n| !n.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_domain_filter_matches_everything() {
        let filter = DomainFilter::default();
        assert!(filter.matches("example.com"));
        assert!(filter.matches("anything.test"));
    }

    #[test]
    fn domain_filter_matches_on_label_boundary() {
        let filter = DomainFilter::new(["example.com"]);
        assert!(filter.matches("example.com"));
        assert!(filter.matches("sub.example.com."));
        assert!(filter.matches("Sub.Example.COM"));
        assert!(!filter.matches("badexample.com"));
        assert!(!filter.matches("example.org"));
    }

    #[test]
    fn exclusions_override_inclusions() {
        let filter = DomainFilter::with_exclusions(["example.com"], ["internal.example.com"]);
        assert!(filter.matches("example.com"));
        assert!(!filter.matches("internal.example.com"));
        assert!(!filter.matches("db.internal.example.com"));
    }

    #[test]
    fn exclusions_apply_to_empty_include_list() {
        let filter = DomainFilter::with_exclusions(Vec::<String>::new(), ["example.org"]);
        assert!(filter.matches("example.com"));
        assert!(!filter.matches("example.org"));
    }

    #[test]
    fn zone_id_filter_is_exact_membership() {
        let filter = ZoneIdFilter::new(["zone-1", "zone-2"]);
        assert!(filter.matches("zone-1"));
        assert!(!filter.matches("zone-3"));
        assert!(!filter.matches("zone-10"));
        assert!(ZoneIdFilter::default().matches("zone-3"));
    }

    #[test]
    fn blank_zone_ids_are_ignored() {
        let filter = ZoneIdFilter::new([""]);
        assert!(filter.matches("zone-1"));
    }
}
