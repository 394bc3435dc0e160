//! Dry-run tracker that never touches the network.

use super::{CreatedEntity, EntityKind, IssueTracker, ItemDraft, TrackerError, TrackerKind};
use crate::domain::Phase;

/// Fabricates placeholder entities with ids `PREVIEW-1`, `PREVIEW-2`, ...
///
/// Ids are handed out in creation order and restart for every tracker
/// instance, so two previews of the same documents are identical.
#[derive(Debug, Clone)]
pub struct PreviewTracker {
    kind: TrackerKind,
    next_id: u64,
}

impl PreviewTracker {
    /// Preview using `kind`'s vocabulary
    pub fn new(kind: TrackerKind) -> Self {
        Self { kind, next_id: 1 }
    }

    fn fabricate(&mut self, name: &str, kind: EntityKind) -> CreatedEntity {
        let id = format!("PREVIEW-{}", self.next_id);
        self.next_id += 1;
        CreatedEntity::new(id.clone(), name, kind).with_key(id)
    }
}

impl IssueTracker for PreviewTracker {
    fn kind(&self) -> TrackerKind {
        self.kind
    }

    fn is_dry_run(&self) -> bool {
        true
    }

    fn verify(&mut self) -> Result<(), TrackerError> {
        Ok(())
    }

    fn ensure_label(&mut self, name: &str) -> Result<CreatedEntity, TrackerError> {
        Ok(self.fabricate(name, EntityKind::Label))
    }

    fn create_container(&mut self, phase: &Phase) -> Result<CreatedEntity, TrackerError> {
        Ok(self.fabricate(&phase.name, EntityKind::Container))
    }

    fn create_top_level(
        &mut self,
        name: &str,
        _description: Option<&str>,
    ) -> Result<CreatedEntity, TrackerError> {
        Ok(self.fabricate(name, EntityKind::TopLevel))
    }

    fn create_item(&mut self, draft: &ItemDraft) -> Result<CreatedEntity, TrackerError> {
        let kind = match draft.role {
            super::ItemRole::Story => EntityKind::Item,
            super::ItemRole::SubTask => EntityKind::SubTask,
        };
        Ok(self.fabricate(&draft.title, kind))
    }

    fn link_child(
        &mut self,
        _parent: &CreatedEntity,
        _child: &CreatedEntity,
    ) -> Result<(), TrackerError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_increment_across_entity_kinds() {
        let mut tracker = PreviewTracker::new(TrackerKind::Jira);
        let label = tracker.ensure_label("bug").unwrap();
        let container = tracker.create_container(&Phase::new("Sprint 1")).unwrap();
        let epic = tracker.create_top_level("Launch", None).unwrap();

        assert_eq!(label.id, "PREVIEW-1");
        assert_eq!(container.id, "PREVIEW-2");
        assert_eq!(epic.id, "PREVIEW-3");
        assert_eq!(epic.display_key(), "PREVIEW-3");
    }

    #[test]
    fn test_preview_is_dry_run_and_keeps_kind() {
        let mut tracker = PreviewTracker::new(TrackerKind::Linear);
        assert!(tracker.is_dry_run());
        assert_eq!(tracker.kind(), TrackerKind::Linear);
        assert!(tracker.verify().is_ok());
    }
}
