//! Region names and the bootstrap fallback preference lists.

pub const WEST_US: &str = "West US";
pub const WEST_US_2: &str = "West US 2";
pub const EAST_US_2: &str = "East US 2";
pub const NORTH_CENTRAL_US: &str = "North Central US";
pub const EAST_ASIA: &str = "East Asia";

/// Endpoint substring identifying a non-production account.
pub const DEFAULT_TEST_MARKER: &str = "test";

/// Preference list used for non-production endpoints when topology is unavailable.
pub const TEST_FALLBACK: &[&str] = &[NORTH_CENTRAL_US, WEST_US, EAST_ASIA];

/// Preference list used for production endpoints when topology is unavailable.
pub const PRODUCTION_FALLBACK: &[&str] = &[WEST_US_2, EAST_US_2, NORTH_CENTRAL_US];

/// Fallback preference list for `endpoint`. Never empty.
pub fn fallback_regions(endpoint: &str, test_marker: &str) -> Vec<String> {
    let list = if !test_marker.is_empty() && endpoint.contains(test_marker) {
        TEST_FALLBACK
    } else {
        PRODUCTION_FALLBACK
    };
    list.iter().map(|r| r.to_string()).collect()
}
