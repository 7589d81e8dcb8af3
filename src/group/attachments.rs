//! Swappable sub-controllers
//!
//! An [`Attachments`] group owns an ordered list of alternative
//! sub-controllers, exactly one of which is active. The selection is stored
//! raw and clamped only on read, so a profile written for a longer list still
//! loads (and saves back unchanged) on a shorter one.

use tracing::debug;

use super::{ControlGroup, GroupType};
use crate::controller::EmulatedController;
use crate::device::registry::RegistrySnapshot;

#[derive(Debug)]
pub struct Attachments {
    base: ControlGroup,
    attachments: Vec<EmulatedController>,
    selection: i64,
}

impl Attachments {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: ControlGroup::new(name, GroupType::Attachments),
            attachments: Vec::new(),
            selection: 0,
        }
    }

    pub fn with_attachment(mut self, attachment: EmulatedController) -> Self {
        self.add_attachment(attachment);
        self
    }

    pub fn add_attachment(&mut self, attachment: EmulatedController) {
        self.attachments.push(attachment);
    }

    pub fn name(&self) -> &str {
        self.base.name()
    }

    pub fn base(&self) -> &ControlGroup {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut ControlGroup {
        &mut self.base
    }

    pub fn attachments(&self) -> &[EmulatedController] {
        &self.attachments
    }

    pub fn attachments_mut(&mut self) -> &mut [EmulatedController] {
        &mut self.attachments
    }

    /// Store a selection without validating it
    pub fn set_selected_attachment(&mut self, index: i64) {
        if self.attachment_index(index).is_none() {
            debug!(
                "Attachment selection {} out of range for {} ({} attachments)",
                index,
                self.name(),
                self.attachments.len()
            );
        }
        self.selection = index;
    }

    /// Active attachment index; out-of-range stored values read as 0
    pub fn selected_attachment(&self) -> usize {
        self.attachment_index(self.selection).unwrap_or(0)
    }

    /// Stored selection exactly as it will be persisted
    pub fn raw_selection(&self) -> i64 {
        self.selection
    }

    fn attachment_index(&self, index: i64) -> Option<usize> {
        usize::try_from(index).ok().filter(|i| *i < self.attachments.len())
    }

    pub fn selected(&self) -> Option<&EmulatedController> {
        self.attachments.get(self.selected_attachment())
    }

    pub fn selected_mut(&mut self) -> Option<&mut EmulatedController> {
        let index = self.selected_attachment();
        self.attachments.get_mut(index)
    }

    pub fn find_attachment_mut(&mut self, name: &str) -> Option<&mut EmulatedController> {
        self.attachments.iter_mut().find(|a| a.name() == name)
    }

    /// Re-resolve every attachment, selected or not
    pub fn update_references(&mut self, snapshot: &RegistrySnapshot) {
        for attachment in &mut self.attachments {
            attachment.update_references_from(snapshot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn attachments(count: usize) -> Attachments {
        let mut group = Attachments::new("Extension");
        for i in 0..count {
            group.add_attachment(EmulatedController::new(format!("Option {}", i)));
        }
        group
    }

    #[test]
    fn test_default_selection_is_first() {
        let group = attachments(3);
        assert_eq!(group.selected_attachment(), 0);
        assert_eq!(group.selected().unwrap().name(), "Option 0");
    }

    #[test]
    fn test_swap_is_immediate() {
        let mut group = attachments(3);
        group.set_selected_attachment(2);
        assert_eq!(group.selected().unwrap().name(), "Option 2");
    }

    #[test]
    fn test_out_of_range_clamps_on_read_only() {
        let mut group = attachments(3);
        group.set_selected_attachment(3);
        assert_eq!(group.selected_attachment(), 0);
        assert_eq!(group.raw_selection(), 3);

        group.set_selected_attachment(-1);
        assert_eq!(group.selected_attachment(), 0);
        assert_eq!(group.raw_selection(), -1);
    }

    #[test]
    fn test_empty_list_has_no_selected() {
        let group = attachments(0);
        assert_eq!(group.selected_attachment(), 0);
        assert!(group.selected().is_none());
    }

    proptest! {
        #[test]
        fn prop_selection_always_in_range(stored in -10i64..100, len in 1usize..8) {
            let mut group = attachments(len);
            group.set_selected_attachment(stored);
            prop_assert!(group.selected_attachment() < len);
            prop_assert_eq!(group.raw_selection(), stored);
            if stored >= 0 && (stored as usize) < len {
                prop_assert_eq!(group.selected_attachment(), stored as usize);
            } else {
                prop_assert_eq!(group.selected_attachment(), 0);
            }
        }
    }
}
