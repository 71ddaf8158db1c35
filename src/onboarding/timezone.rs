//! Timezone resolution: IANA name validation and coordinate lookup.

use chrono_tz::Tz;
use tzf_rs::DefaultFinder;

/// Resolves a geographic coordinate to an IANA timezone name.
pub trait TimezoneResolver: Send + Sync {
    /// Best-matching zone for the point, or `None` if the point has no zone.
    fn resolve(&self, latitude: f64, longitude: f64) -> Option<String>;
}

/// Offline polygon lookup backed by `tzf-rs`.
pub struct PolygonResolver {
    finder: DefaultFinder,
}

impl PolygonResolver {
    pub fn new() -> Self {
        Self {
            finder: DefaultFinder::new(),
        }
    }
}

impl Default for PolygonResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl TimezoneResolver for PolygonResolver {
    fn resolve(&self, latitude: f64, longitude: f64) -> Option<String> {
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return None;
        }
        // tzf takes (lng, lat)
        let name = self.finder.get_tz_name(longitude, latitude);
        parse_timezone(name).map(|tz| tz.name().to_string())
    }
}

/// Parse a user-entered IANA timezone name, ignoring case.
///
/// Callers store `tz.name()`, the canonical spelling.
pub fn parse_timezone(text: &str) -> Option<Tz> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    Tz::from_str_insensitive(trimmed).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_iana_names() {
        assert_eq!(parse_timezone("Europe/London"), Some(chrono_tz::Europe::London));
        assert_eq!(parse_timezone("America/New_York"), Some(chrono_tz::America::New_York));
        assert_eq!(parse_timezone(" Asia/Singapore "), Some(chrono_tz::Asia::Singapore));
        assert_eq!(parse_timezone("UTC"), Some(Tz::UTC));
    }

    #[test]
    fn any_casing_resolves_to_canonical_name() {
        let tz = parse_timezone("europe/london").unwrap();
        assert_eq!(tz.name(), "Europe/London");
        assert_eq!(parse_timezone("ASIA/SINGAPORE").unwrap().name(), "Asia/Singapore");
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_timezone("").is_none());
        assert!(parse_timezone("Enter manually instead").is_none());
        assert!(parse_timezone("Mars/Olympus_Mons").is_none());
    }

    #[test]
    fn polygon_lookup_rejects_out_of_range() {
        let resolver = PolygonResolver::new();
        assert_eq!(resolver.resolve(123.0, 0.0), None);
        assert_eq!(resolver.resolve(0.0, 200.0), None);
    }

    #[test]
    fn polygon_lookup_finds_known_city() {
        let resolver = PolygonResolver::new();
        // Paris
        assert_eq!(resolver.resolve(48.8566, 2.3522).as_deref(), Some("Europe/Paris"));
    }
}
