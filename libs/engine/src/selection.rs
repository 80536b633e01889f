//! The admin's current resource and manager-slot pick.

use crate::capacity::Capacity;
use crate::error::SelectionError;
use crate::resource::{ManagerRole, ManagerSlot, Resource};

/// Resource pick with its dependent manager slot.
///
/// Choosing a parent resource always discards the previous slot, even when
/// the new parent has a slot with the same role.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceSelection {
    resource: Option<Resource>,
    slot: Option<ManagerRole>,
    slot_auto_selected: bool,
}

impl ResourceSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select a parent resource. Refused (and state kept) if it is exhausted.
    ///
    /// When the new parent exposes exactly one slot with remaining
    /// allocation, that slot is selected automatically.
    pub fn select_resource(&mut self, resource: &Resource) -> Result<(), SelectionError> {
        if !resource.is_selectable() {
            return Err(SelectionError::Exhausted {
                resource_id: resource.id.clone(),
            });
        }

        self.resource = Some(resource.clone());
        self.slot = None;
        self.slot_auto_selected = false;

        let mut open = resource.manager_slots.iter().filter(|s| s.is_selectable());
        if let (Some(only), None) = (open.next(), open.next()) {
            self.slot = Some(only.role);
            self.slot_auto_selected = true;
        }

        Ok(())
    }

    /// Choose a manager slot of the selected resource.
    pub fn select_slot(&mut self, role: ManagerRole) -> Result<(), SelectionError> {
        let resource = self.resource.as_ref().ok_or(SelectionError::NoParent)?;
        let slot = resource
            .slot(role)
            .ok_or_else(|| SelectionError::UnknownSlot {
                resource_id: resource.id.clone(),
                role,
            })?;

        if !slot.is_selectable() {
            return Err(SelectionError::SlotExhausted {
                resource_id: resource.id.clone(),
                role,
            });
        }

        self.slot = Some(role);
        self.slot_auto_selected = false;
        Ok(())
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn resource(&self) -> Option<&Resource> {
        self.resource.as_ref()
    }

    pub fn slot(&self) -> Option<&ManagerSlot> {
        let role = self.slot?;
        self.resource.as_ref()?.slot(role)
    }

    pub fn slot_role(&self) -> Option<ManagerRole> {
        self.slot
    }

    pub fn slot_auto_selected(&self) -> bool {
        self.slot_auto_selected
    }
}
