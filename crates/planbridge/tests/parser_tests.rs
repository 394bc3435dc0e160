//! Work item extraction across both strategies

use planbridge::domain::{Estimate, EstimateUnit, Priority, WorkItem};
use planbridge::extract::{CommonMarkExtractor, HeuristicExtractor, StrategyKind, TextToWorkItems};

const PRD: &str = "\
# Checkout Revamp PRD

## Goals
Make checkout faster.

## Work
- [P1] Redesign payment form [5pt] [design]
    - Inline card validation [2h]
    - [x] Audit current field order
- [bug] Fix rounding in tax totals
- 🔴 Migrate to the new payments API [1w]
- [ ] Write release notes [documentation]

1. Load test the checkout endpoint [devops]
2. Fix rounding in tax totals
";

fn titles(items: &[WorkItem]) -> Vec<&str> {
    items.iter().map(|i| i.title.as_str()).collect()
}

#[test]
fn test_heuristic_extracts_realistic_prd() {
    let items = HeuristicExtractor.extract(PRD);

    assert_eq!(
        titles(&items),
        vec![
            "Redesign payment form",
            "Fix rounding in tax totals",
            "Migrate to the new payments API",
            "Write release notes",
            "Load test the checkout endpoint",
        ]
    );

    let form = &items[0];
    assert_eq!(form.priority, Priority::High);
    assert_eq!(form.estimate, Some(Estimate::new(5.0, EstimateUnit::Points)));
    assert!(form.labels.contains("design"));
    assert_eq!(titles(&form.children), vec!["Inline card validation", "Audit current field order"]);
    assert_eq!(form.children[0].estimate.map(|e| e.value()), Some(2.0));
    assert!(form.children[1].completed);

    assert_eq!(items[2].priority, Priority::Highest);
    assert_eq!(items[2].estimate.map(|e| e.value()), Some(40.0));
    assert!(!items[3].completed);
    assert!(items[4].labels.contains("devops"));
}

#[test]
fn test_commonmark_agrees_with_heuristic_on_prd() {
    let heuristic = HeuristicExtractor.extract(PRD);
    let commonmark = CommonMarkExtractor.extract(PRD);

    assert_eq!(titles(&commonmark), titles(&heuristic));
    for (a, b) in commonmark.iter().zip(&heuristic) {
        assert_eq!(a.priority, b.priority, "{}", a.title);
        assert_eq!(a.estimate, b.estimate, "{}", a.title);
        assert_eq!(a.labels, b.labels, "{}", a.title);
        assert_eq!(titles(&a.children), titles(&b.children), "{}", a.title);
    }
}

#[test]
fn test_description_lines_follow_their_item() {
    let text = "- Build export wizard\n  Walks the user through target selection.\n  Supports all trackers.\n\n- Add audit log\n";
    let items = HeuristicExtractor.extract(text);

    assert_eq!(items.len(), 2);
    assert_eq!(
        items[0].description.as_deref(),
        Some("Walks the user through target selection.\nSupports all trackers.")
    );
    assert_eq!(items[1].description, None);
}

#[test]
fn test_headings_end_descriptions() {
    let text = "- Build export wizard\n## Notes\nUnrelated prose.\n";
    let items = HeuristicExtractor.extract(text);
    assert_eq!(items[0].description, None);
}

#[test]
fn test_unknown_brackets_stay_in_title() {
    let items = HeuristicExtractor.extract("- [backend] Cache user sessions [P2]");
    assert_eq!(items[0].title, "[backend] Cache user sessions");
    assert_eq!(items[0].priority, Priority::Medium);
    assert!(items[0].labels.is_empty());
}

#[test]
fn test_prose_only_document_yields_nothing() {
    let text = "# Vision\n\nWe want checkout to feel instant.\nNo list here.\n";
    for strategy in [StrategyKind::Heuristic, StrategyKind::CommonMark] {
        assert!(strategy.build().extract(text).is_empty(), "{}", strategy);
    }
}

#[test]
fn test_strategy_lookup_by_name() {
    assert_eq!("heuristic".parse::<StrategyKind>().unwrap(), StrategyKind::Heuristic);
    assert_eq!("CommonMark".parse::<StrategyKind>().unwrap(), StrategyKind::CommonMark);
    assert_eq!(StrategyKind::CommonMark.build().id(), "commonmark");

    let err = "yaml".parse::<StrategyKind>().unwrap_err();
    assert!(err.contains("Expected heuristic or commonmark"));
}
