use std::path::{Path, PathBuf};

use crate::types::ListingKind;

pub const DATA_DIR: &str = "data";
pub const FIRST_YEAR: u16 = 1917;
pub const LAST_YEAR: u16 = 2018;
pub const LAST_WINNER_YEAR: u16 = 2017;

const JSON_MARKER: &str = "json";
const FINALIST_MARKER: &str = "finalist";
const WINNER_MARKER: &str = "winner";

lazy_static! {
    pub static ref BASE_URL: String = match std::env::var("HARVEST_BASE_URL") {
        Ok(url) if !url.is_empty() => url.trim_end_matches('/').to_string(),
        _ => "https://www.pulitzer.org".into(),
    };
}

pub fn year_url(base_url: &str, year: u16) -> String {
    format!("{}/prize-winners-by-year/{}", base_url, year)
}

pub fn node_path(nid: &str) -> String {
    format!("node/{}", nid)
}

pub fn node_url(base_url: &str, nid: &str) -> String {
    format!("{}/{}", base_url, node_path(nid))
}

/// Classifies a response seen on a year page. Finalist listings win over
/// winner listings when a url carries both markers.
pub fn classify_listing_response(url: &str) -> Option<ListingKind> {
    if !url.contains(JSON_MARKER) {
        return None;
    }
    if url.contains(FINALIST_MARKER) {
        Some(ListingKind::Finalists)
    } else if url.contains(WINNER_MARKER) {
        Some(ListingKind::Winners)
    } else {
        None
    }
}

pub fn is_detail_response(url: &str, nid: &str) -> bool {
    url.contains(&node_path(nid)) && url.contains(JSON_MARKER)
}

pub fn year_file(dir: &Path, year: u16) -> PathBuf {
    dir.join(format!("{}.json", year))
}

pub fn winners_file(dir: &Path, year: u16) -> PathBuf {
    dir.join(format!("winners-{}.json", year))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn listing_filter_needs_json_marker() {
        assert_eq!(
            classify_listing_response("https://www.pulitzer.org/cache/api/1/finalist/2001/raw.json"),
            Some(ListingKind::Finalists)
        );
        assert_eq!(
            classify_listing_response("https://www.pulitzer.org/cache/api/1/winners/year/2001/raw.json"),
            Some(ListingKind::Winners)
        );
        assert_eq!(
            classify_listing_response("https://www.pulitzer.org/images/winner.png"),
            None
        );
        assert_eq!(
            classify_listing_response("https://www.pulitzer.org/api/awards.json"),
            None
        );
    }

    #[test]
    fn listing_filter_is_case_sensitive() {
        assert_eq!(classify_listing_response("https://x/Winner.JSON"), None);
        assert_eq!(classify_listing_response("https://x/FINALIST.json"), None);
    }

    #[test]
    fn finalist_marker_takes_precedence() {
        assert_eq!(
            classify_listing_response("https://x/winner-finalist.json"),
            Some(ListingKind::Finalists)
        );
    }

    #[test]
    fn detail_filter_matches_node_path() {
        assert!(is_detail_response(
            "https://www.pulitzer.org/cache/api/1/node/12345/raw.json",
            "12345"
        ));
        assert!(!is_detail_response("https://www.pulitzer.org/node/12345", "12345"));
        assert!(!is_detail_response("https://x/node/999/raw.json", "12345"));
        // plain containment: a longer nid with the same prefix still matches
        assert!(is_detail_response("https://x/node/123456/raw.json", "12345"));
    }

    #[test]
    fn urls_and_files() {
        assert_eq!(
            year_url("https://www.pulitzer.org", 1917),
            "https://www.pulitzer.org/prize-winners-by-year/1917"
        );
        assert_eq!(
            node_url("https://www.pulitzer.org", "42"),
            "https://www.pulitzer.org/node/42"
        );
        let dir = PathBuf::from("data");
        assert_eq!(year_file(&dir, 2018), PathBuf::from("data/2018.json"));
        assert_eq!(winners_file(&dir, 2017), PathBuf::from("data/winners-2017.json"));
    }
}
