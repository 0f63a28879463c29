use std::collections::BTreeMap;

use regex::{Regex, RegexBuilder};

use crate::types::Match;

/// Maps each monitored name to the match it is currently called to.
///
/// Matches are scanned in page order and team1 before team2; the first hit
/// for a name wins. Names absent from the result are simply not playing.
pub fn find_active(matches: &[Match], names: &[String]) -> BTreeMap<String, Match> {
    let patterns: Vec<(&String, Regex)> = names
        .iter()
        .filter_map(|name| name_pattern(name).map(|re| (name, re)))
        .collect();

    let mut found = BTreeMap::new();
    for current in matches {
        for (name, pattern) in &patterns {
            if found.contains_key(*name) {
                continue;
            }
            if pattern.is_match(&current.team1) || pattern.is_match(&current.team2) {
                found.insert((*name).clone(), current.clone());
            }
        }
    }
    found
}

/// Whole-word, case-insensitive pattern for a name. Dots are dropped so that
/// "Jr." also finds "Jr".
fn name_pattern(name: &str) -> Option<Regex> {
    let cleaned = name.replace('.', "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }
    RegexBuilder::new(&format!(r"\b{}\b", regex::escape(cleaned)))
        .case_insensitive(true)
        .build()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::sample_match;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_finds_player_in_either_team() {
        let matches = vec![
            sample_match("Carl Dunn", "Dave Eck", "1"),
            sample_match("Bob Jones & Ann Lee", "George Barta", "2"),
        ];
        let found = find_active(&matches, &names(&["George Barta", "ann lee", "Zed Zulu"]));

        assert_eq!(found.len(), 2);
        assert_eq!(found["George Barta"].table, "2");
        assert_eq!(found["ann lee"].table, "2");
        assert!(!found.contains_key("Zed Zulu"));
    }

    #[test]
    fn test_finds_jr_players() {
        let matches = vec![sample_match("JENNY ONG Jr", "Dave Eck", "4")];
        let found = find_active(&matches, &names(&["JENNY ONG Jr."]));
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_whole_word_only() {
        let matches = vec![sample_match("Anna Leeds", "Dave Eck", "4")];
        let found = find_active(&matches, &names(&["Ann Lee"]));
        assert!(found.is_empty());
    }

    #[test]
    fn test_first_match_wins() {
        let matches = vec![
            sample_match("Dave Eck", "George Barta", "7"),
            sample_match("George Barta", "Carl Dunn", "8"),
        ];
        let found = find_active(&matches, &names(&["George Barta"]));
        assert_eq!(found["George Barta"].table, "7");
    }

    #[test]
    fn test_blank_name_matches_nothing() {
        let matches = vec![sample_match("Dave Eck", "George Barta", "7")];
        assert!(find_active(&matches, &names(&[" . "])).is_empty());
    }
}
