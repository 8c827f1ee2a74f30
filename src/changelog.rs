//! Append-only audit log
//!
//! Every successful mutation appends exactly one [`Change`]; entries are
//! never updated or deleted. Retrieval is newest-first with optional
//! filtering by site, event, resource type and resource id.

use parking_lot::RwLock;
use uuid::Uuid;

use crate::models::{Change, ChangeEvent, ResourceType};

/// Filters for change retrieval.
///
/// Callers must ensure `resource_id` is only set together with
/// `resource_type`; the manager validates this before consulting the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeFilter {
    /// Restrict to one site
    pub site_id: Option<Uuid>,
    /// Restrict to one event kind
    pub event: Option<ChangeEvent>,
    /// Restrict to one resource kind
    pub resource_type: Option<ResourceType>,
    /// Restrict to one resource
    pub resource_id: Option<Uuid>,
}

impl ChangeFilter {
    fn matches(&self, change: &Change) -> bool {
        self.site_id.map_or(true, |id| change.site_id == Some(id))
            && self.event.map_or(true, |e| change.event == e)
            && self.resource_type.map_or(true, |t| change.resource_type == t)
            && self.resource_id.map_or(true, |id| change.resource_id == id)
    }
}

/// The audit log store
#[derive(Debug, Default)]
pub struct ChangeLog {
    entries: RwLock<Vec<Change>>,
}

impl ChangeLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of recorded changes
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True when nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Append one change
    pub fn record(&self, change: Change) {
        tracing::debug!(
            change_id = %change.id,
            event = %change.event,
            resource_type = %change.resource_type,
            resource_id = %change.resource_id,
            "Recorded change"
        );
        self.entries.write().push(change);
    }

    /// Retrieve changes matching `filter`, newest first, sliced by
    /// `offset`/`limit`. Returns the page and the total match count.
    pub fn query(
        &self,
        filter: &ChangeFilter,
        offset: usize,
        limit: Option<usize>,
    ) -> (Vec<Change>, usize) {
        let entries = self.entries.read();
        let matched: Vec<Change> = entries
            .iter()
            .rev()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect();

        let total = matched.len();
        let page = matched
            .into_iter()
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .collect();

        (page, total)
    }

    /// Look up one change by id
    pub fn get(&self, id: Uuid) -> Option<Change> {
        self.entries.read().iter().find(|c| c.id == id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(site_id: Option<Uuid>, event: ChangeEvent, resource_type: ResourceType) -> Change {
        Change::new(
            Uuid::new_v4(),
            site_id,
            event,
            resource_type,
            Uuid::new_v4(),
            &serde_json::json!({"name": "x"}),
        )
        .unwrap()
    }

    #[test]
    fn test_query_newest_first() {
        let log = ChangeLog::new();
        let site = Uuid::new_v4();
        let first = change(Some(site), ChangeEvent::Create, ResourceType::Network);
        let second = change(Some(site), ChangeEvent::Update, ResourceType::Network);
        let first_id = first.id;
        let second_id = second.id;
        log.record(first);
        log.record(second);

        let (page, total) = log.query(&ChangeFilter::default(), 0, None);
        assert_eq!(total, 2);
        assert_eq!(page[0].id, second_id);
        assert_eq!(page[1].id, first_id);
    }

    #[test]
    fn test_query_filters() {
        let log = ChangeLog::new();
        let site_a = Uuid::new_v4();
        let site_b = Uuid::new_v4();
        log.record(change(Some(site_a), ChangeEvent::Create, ResourceType::Network));
        log.record(change(Some(site_a), ChangeEvent::Delete, ResourceType::Network));
        log.record(change(Some(site_b), ChangeEvent::Create, ResourceType::Site));

        let (_, total) = log.query(
            &ChangeFilter {
                site_id: Some(site_a),
                ..Default::default()
            },
            0,
            None,
        );
        assert_eq!(total, 2);

        let (page, total) = log.query(
            &ChangeFilter {
                event: Some(ChangeEvent::Create),
                resource_type: Some(ResourceType::Network),
                ..Default::default()
            },
            0,
            None,
        );
        assert_eq!(total, 1);
        assert_eq!(page[0].site_id, Some(site_a));
    }

    #[test]
    fn test_query_pagination() {
        let log = ChangeLog::new();
        for _ in 0..5 {
            log.record(change(None, ChangeEvent::Create, ResourceType::Site));
        }

        let (page, total) = log.query(&ChangeFilter::default(), 2, Some(2));
        assert_eq!(total, 5);
        assert_eq!(page.len(), 2);

        let (page, total) = log.query(&ChangeFilter::default(), 4, Some(10));
        assert_eq!(total, 5);
        assert_eq!(page.len(), 1);
    }
}
