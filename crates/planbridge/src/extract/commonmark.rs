//! CommonMark-aware work item extraction.
//!
//! Walks the `pulldown-cmark` event stream instead of matching lines, so list
//! structure comes from the Markdown grammar rather than raw indentation.
//! The output model is the same as the heuristic strategy: top-level list
//! items with one level of children, deeper items flattened onto their
//! top-level ancestor, and top-level ordered items appended last unless their
//! title duplicates an existing one.

use super::heuristic::build_item;
use super::TextToWorkItems;
use crate::domain::WorkItem;
use pulldown_cmark::{Event, Options, Parser, Tag};

/// Extraction strategy backed by a CommonMark parser.
///
/// # Example
///
/// ```
/// use planbridge::extract::{CommonMarkExtractor, TextToWorkItems};
///
/// let items = CommonMarkExtractor.extract("* [high] Tune queries\n  * Add index");
/// assert_eq!(items[0].title, "Tune queries");
/// assert_eq!(items[0].children[0].title, "Add index");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct CommonMarkExtractor;

/// An item whose events are still being collected.
#[derive(Debug, Default)]
struct PendingItem {
    depth: usize,
    ordered: bool,
    title: String,
    description: Vec<String>,
    in_title: bool,
    checkbox: Option<&'static str>,
    children: Vec<WorkItem>,
}

impl PendingItem {
    fn push_text(&mut self, text: &str) {
        if self.in_title {
            self.title.push_str(text);
        } else if let Some(last) = self.description.last_mut() {
            last.push_str(text);
        } else {
            self.description.push(text.to_string());
        }
    }

    fn break_line(&mut self) {
        self.in_title = false;
        if self.description.last().map_or(true, |l| !l.trim().is_empty()) {
            self.description.push(String::new());
        }
    }

    fn finish(self) -> Option<WorkItem> {
        let mut item = build_item(&self.title, self.checkbox)?;
        let description: Vec<String> = self
            .description
            .iter()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();
        if !description.is_empty() {
            item.description = Some(description.join("\n"));
        }
        item.children = self.children;
        Some(item)
    }
}

impl TextToWorkItems for CommonMarkExtractor {
    fn id(&self) -> &str {
        "commonmark"
    }

    fn extract(&self, text: &str) -> Vec<WorkItem> {
        let mut items: Vec<WorkItem> = Vec::new();
        let mut ordered_items: Vec<WorkItem> = Vec::new();
        let mut lists: Vec<bool> = Vec::new();
        let mut stack: Vec<PendingItem> = Vec::new();

        for event in Parser::new_ext(text, Options::ENABLE_TASKLISTS) {
            match event {
                Event::Start(Tag::List(start)) => {
                    if let Some(top) = stack.last_mut() {
                        top.in_title = false;
                    }
                    lists.push(start.is_some());
                }
                Event::End(Tag::List(_)) => {
                    lists.pop();
                }
                Event::Start(Tag::Item) => stack.push(PendingItem {
                    depth: lists.len(),
                    ordered: lists.last().copied().unwrap_or(false),
                    in_title: true,
                    ..Default::default()
                }),
                Event::End(Tag::Item) => {
                    let Some(pending) = stack.pop() else {
                        continue;
                    };
                    let depth = pending.depth;
                    let ordered = pending.ordered;
                    let Some(mut item) = pending.finish() else {
                        continue;
                    };
                    match stack.last_mut() {
                        Some(parent) if depth > 1 => parent.children.push(item),
                        _ => {
                            // Only one level of children is modeled.
                            item.children = std::mem::take(&mut item.children)
                                .into_iter()
                                .flat_map(flatten)
                                .collect();
                            if ordered {
                                ordered_items.push(item);
                            } else {
                                items.push(item);
                            }
                        }
                    }
                }
                Event::TaskListMarker(checked) => {
                    if let Some(top) = stack.last_mut() {
                        top.checkbox = Some(if checked { "x" } else { " " });
                    }
                }
                Event::Text(text) | Event::Code(text) => {
                    if let Some(top) = stack.last_mut() {
                        top.push_text(&text);
                    }
                }
                Event::SoftBreak | Event::HardBreak | Event::End(Tag::Paragraph) => {
                    if let Some(top) = stack.last_mut() {
                        top.break_line();
                    }
                }
                _ => {}
            }
        }

        for item in ordered_items {
            let duplicate = items.iter().any(|existing| {
                existing.title == item.title
                    || existing.children.iter().any(|child| child.title == item.title)
            });
            if !duplicate {
                items.push(item);
            }
        }

        items
    }
}

/// Detach a subtree into a pre-order list so it sits on one level.
fn flatten(mut item: WorkItem) -> Vec<WorkItem> {
    let children = std::mem::take(&mut item.children);
    let mut flat = vec![item];
    for child in children {
        flat.extend(flatten(child));
    }
    flat
}
