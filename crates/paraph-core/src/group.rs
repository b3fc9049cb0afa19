//! Logical group resolution over the flat element list.
//!
//! Groups are a derived view, recomputed on demand from `group_key`; they
//! have no lifecycle of their own. Members are created, edited, and
//! deleted together as one unit.

use crate::element::{DateRole, ElementId, ElementPatch, GroupKey, PlacedElement};
use crate::error::{Error, Result};
use crate::store::ElementStore;
use std::collections::BTreeMap;

/// The family a group belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupFamily {
    /// Day/month/year digit triplet.
    Date,
    /// Checkbox or radio option set.
    OptionSet,
}

/// Derived view of one logical group.
#[derive(Debug, Clone)]
pub struct ElementGroup {
    pub key: GroupKey,
    pub family: GroupFamily,
    /// Member ids in display order: day -> month -> year for date groups,
    /// ascending `option_index` for option sets.
    pub members: Vec<ElementId>,
    /// True only when every expected member is present. Incomplete groups
    /// stay editable and deletable; they are never auto-completed.
    pub complete: bool,
}

fn family_of(element: &PlacedElement) -> Option<GroupFamily> {
    if element.kind.date_role().is_some() {
        Some(GroupFamily::Date)
    } else if element.kind.is_option() {
        Some(GroupFamily::OptionSet)
    } else {
        None
    }
}

/// Reconstruct the group with the given key, or `None` if no element
/// carries it.
pub fn resolve_group(store: &ElementStore, key: GroupKey) -> Option<ElementGroup> {
    let members: Vec<&PlacedElement> = store
        .iter()
        .filter(|e| e.group_key == Some(key))
        .collect();
    let first = *members.first()?;
    let family = family_of(first)?;

    match family {
        GroupFamily::Date => {
            let mut by_role: BTreeMap<DateRole, ElementId> = BTreeMap::new();
            for member in &members {
                if let Some(role) = member.kind.date_role() {
                    by_role.entry(role).or_insert(member.id);
                }
            }
            // BTreeMap iteration gives day -> month -> year.
            let ordered: Vec<ElementId> = by_role.values().copied().collect();
            let complete = by_role.len() == 3 && members.len() == 3;
            Some(ElementGroup {
                key,
                family,
                members: ordered,
                complete,
            })
        }
        GroupFamily::OptionSet => {
            let mut ordered: Vec<(u32, ElementId)> = members
                .iter()
                .map(|m| (m.option_index.unwrap_or(0), m.id))
                .collect();
            ordered.sort_by_key(|(index, _)| *index);
            let complete = !ordered.is_empty();
            Some(ElementGroup {
                key,
                family,
                members: ordered.into_iter().map(|(_, id)| id).collect(),
                complete,
            })
        }
    }
}

/// Reconstruct every group in the store. Elements without a group key are
/// singletons and not reported.
pub fn resolve_all(store: &ElementStore) -> Vec<ElementGroup> {
    let mut keys: Vec<GroupKey> = Vec::new();
    for element in store.iter() {
        if let Some(key) = element.group_key {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
    }
    keys.into_iter()
        .filter_map(|key| resolve_group(store, key))
        .collect()
}

/// Next free option index for a group: `max(existing) + 1`, never the
/// member count, so index gaps left by deletions are never refilled.
pub fn next_option_index(store: &ElementStore, key: GroupKey) -> u32 {
    store
        .iter()
        .filter(|e| e.group_key == Some(key))
        .filter_map(|e| e.option_index)
        .max()
        .map_or(0, |max| max + 1)
}

/// Verify that an element belongs to the given group.
pub fn verify_member(store: &ElementStore, key: GroupKey, id: ElementId) -> Result<()> {
    let element = store.get(id).ok_or(Error::UnknownElement(id))?;
    if element.group_key != Some(key) {
        return Err(Error::InvalidGroupOperation(format!(
            "element {id} does not belong to group {key}"
        )));
    }
    Ok(())
}

/// Fan one non-positional payload update out to every member.
pub fn update_group(store: &mut ElementStore, key: GroupKey, patch: &ElementPatch) -> Result<()> {
    if patch.is_positional() {
        return Err(Error::InvalidGroupOperation(
            "group edits cannot change position or size".into(),
        ));
    }
    let group = resolve_group(store, key).ok_or_else(|| {
        Error::InvalidGroupOperation(format!("no group with key {key}"))
    })?;
    let patch = patch.non_positional();
    for id in group.members {
        store.update_element(id, &patch)?;
    }
    Ok(())
}

/// Delete every member of a group transactionally.
///
/// The full id list is computed first, then removed in one store
/// operation; a half-deleted group is never observable.
pub fn delete_group(store: &mut ElementStore, key: GroupKey) -> Result<Vec<ElementId>> {
    let ids: Vec<ElementId> = store
        .iter()
        .filter(|e| e.group_key == Some(key))
        .map(|e| e.id)
        .collect();
    if ids.is_empty() {
        return Err(Error::InvalidGroupOperation(format!(
            "no group with key {key}"
        )));
    }
    store.remove_elements(&ids)?;
    Ok(ids)
}

/// Remaining shared byte budget across all more-file elements sharing a
/// group key. Each member's configured `size_limit` counts against one
/// cap; members without a limit count as zero.
pub fn remaining_file_budget(store: &ElementStore, key: GroupKey, cap_bytes: u64) -> u64 {
    let used: u64 = store
        .iter()
        .filter(|e| e.kind == crate::element::FieldKind::MoreFile && e.group_key == Some(key))
        .map(|e| e.config.get("size_limit").and_then(|v| v.as_u64()).unwrap_or(0))
        .sum();
    cap_bytes.saturating_sub(used)
}
