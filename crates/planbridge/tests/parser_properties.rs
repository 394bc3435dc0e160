//! Property-based tests for extraction invariants
//!
//! Extraction must be deterministic, must never panic on arbitrary text and
//! must strip every recognized marker from titles.

use planbridge::extract::{extract_phases, CommonMarkExtractor, HeuristicExtractor, TextToWorkItems};
use proptest::prelude::*;

// Generator for plain title words
fn words_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-z]{4,10}", 1..5)
}

// Generator for recognized markers
fn marker_strategy() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just("[P0]"),
        Just("[p2]"),
        Just("[high]"),
        Just("[ Low ]"),
        Just("[3pt]"),
        Just("[2d]"),
        Just("[1.5 hours]"),
        Just("[bug]"),
        Just("[tech-debt]"),
        Just("🔴"),
        Just("🟢"),
    ]
}

// Generator for Markdown-ish documents mixing bullets, headers and prose
fn document_strategy() -> impl Strategy<Value = String> {
    let line = prop_oneof![
        "[a-zA-Z ]{0,30}".prop_map(|s| s.to_string()),
        "[a-z ]{4,20}".prop_map(|s| format!("- {}", s)),
        "[a-z ]{4,20}".prop_map(|s| format!("    * [x] {}", s)),
        "[a-z ]{4,20}".prop_map(|s| format!("1. {}", s)),
        "[0-9]{1,2}".prop_map(|n| format!("## Sprint {}", n)),
        Just("2024-02-29".to_string()),
        Just("\t- tabbed child task".to_string()),
    ];
    prop::collection::vec(line, 0..20).prop_map(|lines| lines.join("\n"))
}

// Property 1: Extraction is deterministic
proptest! {
    #[test]
    fn prop_extraction_is_deterministic(text in document_strategy()) {
        prop_assert_eq!(HeuristicExtractor.extract(&text), HeuristicExtractor.extract(&text));
        prop_assert_eq!(CommonMarkExtractor.extract(&text), CommonMarkExtractor.extract(&text));
        prop_assert_eq!(extract_phases(&text), extract_phases(&text));
    }
}

// Property 2: Arbitrary input never panics and children stay one level deep
proptest! {
    #[test]
    fn prop_arbitrary_text_is_safe(text in "\\PC{0,400}") {
        for items in [HeuristicExtractor.extract(&text), CommonMarkExtractor.extract(&text)] {
            for item in &items {
                prop_assert!(item.title.chars().count() > 3);
                prop_assert!(item.children.iter().all(|c| c.children.is_empty()));
            }
        }
        let _ = extract_phases(&text);
    }
}

// Property 3: Recognized markers never survive in titles
proptest! {
    #[test]
    fn prop_markers_are_stripped(
        words in words_strategy(),
        leading in prop::collection::vec(marker_strategy(), 0..3),
        trailing in prop::collection::vec(marker_strategy(), 0..3),
    ) {
        let title = words.join(" ");
        let line = format!("- {} {} {}", leading.join(" "), title, trailing.join(" "));

        let items = HeuristicExtractor.extract(&line);
        prop_assert_eq!(items.len(), 1);
        prop_assert_eq!(&items[0].title, &title);

        let markdown = CommonMarkExtractor.extract(&line);
        prop_assert_eq!(markdown.len(), 1);
        prop_assert_eq!(&markdown[0].title, &title);
    }
}

// Property 4: Text without list markers yields no items
proptest! {
    #[test]
    fn prop_prose_yields_no_items(lines in prop::collection::vec("[a-zA-Z][a-zA-Z ,.]{0,60}", 0..15)) {
        let text = lines.join("\n");
        prop_assert!(HeuristicExtractor.extract(&text).is_empty());
        prop_assert!(CommonMarkExtractor.extract(&text).is_empty());
    }
}
