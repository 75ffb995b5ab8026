//! Keyed child-list diff.
//!
//! Common prefix and suffix are patched in place. The middle maps keys to new
//! positions, patches matches, and moves only nodes outside the longest
//! increasing run of old positions.
//!
//! Unkeyed nodes in the middle are matched by scanning the new range for an
//! unclaimed node of the same type, which is quadratic in the middle's
//! length. Key large lists that reorder.

use std::collections::HashMap;

use tracing::{trace, warn};

use super::lis::longest_increasing_subsequence;
use super::RendererInner;
use crate::error::Result;
use crate::host::{HostAdapter, NodeHandle};
use crate::vnode::{is_same_node, NodeKey, VNode};

impl<H: HostAdapter + 'static> RendererInner<H> {
    /// Patch the child list `old` into `new` inside `container`.
    /// `parent_anchor` is the host node that follows the whole list, if any.
    pub(crate) fn patch_keyed_children(
        &self,
        mut old: Vec<VNode>,
        new: &mut [VNode],
        container: NodeHandle,
        parent_anchor: Option<NodeHandle>,
    ) -> Result<()> {
        let mut i = 0;
        let mut old_end = old.len();
        let mut new_end = new.len();

        // Common prefix.
        while i < old_end && i < new_end && is_same_node(&old[i], &new[i]) {
            let anchor = self.first_host_in(&old[i + 1..]).or(parent_anchor);
            self.patch(Some(&mut old[i]), &mut new[i], container, anchor)?;
            i += 1;
        }

        // Common suffix.
        while i < old_end && i < new_end && is_same_node(&old[old_end - 1], &new[new_end - 1]) {
            let anchor = self.first_host_in(&new[new_end..]).or(parent_anchor);
            self.patch(
                Some(&mut old[old_end - 1]),
                &mut new[new_end - 1],
                container,
                anchor,
            )?;
            old_end -= 1;
            new_end -= 1;
        }

        if i == old_end {
            let anchor = self.first_host_in(&new[new_end..]).or(parent_anchor);
            for vnode in &mut new[i..new_end] {
                self.patch(None, vnode, container, anchor)?;
            }
            return Ok(());
        }
        if i == new_end {
            for vnode in &mut old[i..old_end] {
                self.unmount(vnode, true);
            }
            return Ok(());
        }

        self.patch_unknown_sequence(&mut old, new, i, old_end, new_end, container, parent_anchor)
    }

    /// Middle section: match by key, unmount leftovers, then mount and move
    /// around the longest run of nodes that kept their relative order.
    #[allow(clippy::too_many_arguments)]
    fn patch_unknown_sequence(
        &self,
        old: &mut [VNode],
        new: &mut [VNode],
        start: usize,
        old_end: usize,
        new_end: usize,
        container: NodeHandle,
        parent_anchor: Option<NodeHandle>,
    ) -> Result<()> {
        let mut key_to_new: HashMap<NodeKey, usize> = HashMap::new();
        for (j, vnode) in new.iter().enumerate().take(new_end).skip(start) {
            if let Some(key) = &vnode.key {
                if key_to_new.insert(key.clone(), j).is_some() {
                    warn!(%key, "duplicate key among siblings");
                }
            }
        }

        let to_be_patched = new_end - start;
        // 1-based old index for every new slot; 0 means "mount".
        let mut new_to_old = vec![0usize; to_be_patched];
        let mut patched = 0;
        let mut moved = false;
        let mut max_new_index = 0;

        for old_i in start..old_end {
            if patched >= to_be_patched {
                self.unmount(&mut old[old_i], true);
                continue;
            }
            let target = match &old[old_i].key {
                Some(key) => key_to_new
                    .get(key)
                    .copied()
                    .filter(|&j| new_to_old[j - start] == 0),
                None => (start..new_end).find(|&j| {
                    new_to_old[j - start] == 0
                        && new[j].key.is_none()
                        && is_same_node(&old[old_i], &new[j])
                }),
            };
            let Some(j) = target else {
                self.unmount(&mut old[old_i], true);
                continue;
            };

            new_to_old[j - start] = old_i + 1;
            if j >= max_new_index {
                max_new_index = j;
            } else {
                moved = true;
            }
            let anchor = self.first_host_in(&old[old_i + 1..]).or(parent_anchor);
            self.patch(Some(&mut old[old_i]), &mut new[j], container, anchor)?;
            patched += 1;
        }

        let stable = if moved {
            longest_increasing_subsequence(&new_to_old)
        } else {
            Vec::new()
        };
        trace!(to_be_patched, patched, stable = stable.len(), moved, "keyed middle");

        let mut stable = stable.iter().rev().peekable();
        for k in (0..to_be_patched).rev() {
            let j = start + k;
            let anchor = self.first_host_in(&new[j + 1..]).or(parent_anchor);
            if new_to_old[k] == 0 {
                self.patch(None, &mut new[j], container, anchor)?;
            } else if moved {
                if stable.peek() == Some(&&k) {
                    stable.next();
                } else {
                    self.move_node(&new[j], container, anchor);
                }
            }
        }
        Ok(())
    }
}
