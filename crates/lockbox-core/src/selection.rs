//! Multi-select over a filtered, ordered record view
//!
//! Range selection walks the view the UI is actually showing, so records
//! excluded by the active filter are never touched.

use std::collections::BTreeSet;

use uuid::Uuid;

/// Selection state: the selected set plus the anchor for range mode
#[derive(Debug, Default, Clone)]
pub struct Selection {
    selected: BTreeSet<Uuid>,
    anchor: Option<Uuid>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip membership of one id and make it the range anchor
    pub fn toggle(&mut self, id: Uuid) {
        if !self.selected.remove(&id) {
            self.selected.insert(id);
        }
        self.anchor = Some(id);
    }

    /// Select the inclusive contiguous span between the anchor and
    /// `endpoint` within `filtered_view` (the ordered, currently-filtered
    /// ids). Ids outside the view are never selected; an endpoint or
    /// anchor missing from the view degrades to a plain toggle on the
    /// endpoint.
    pub fn select_range(&mut self, filtered_view: &[Uuid], endpoint: Uuid) {
        let anchor_pos = self
            .anchor
            .and_then(|anchor| filtered_view.iter().position(|id| *id == anchor));
        let endpoint_pos = filtered_view.iter().position(|id| *id == endpoint);

        match (anchor_pos, endpoint_pos) {
            (Some(a), Some(b)) => {
                let (start, end) = if a <= b { (a, b) } else { (b, a) };
                for id in &filtered_view[start..=end] {
                    self.selected.insert(*id);
                }
                // Anchor stays where it was so ranges can be extended
            }
            _ => self.toggle(endpoint),
        }
    }

    pub fn is_selected(&self, id: Uuid) -> bool {
        self.selected.contains(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.selected.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn clear(&mut self) {
        self.selected.clear();
        self.anchor = None;
    }
}
