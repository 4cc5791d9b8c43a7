//! Generic intrusive linked-list traversal.
//!
//! Kernel lists embed their link nodes inside the payload structure:
//! the forward pointer at each step points at the *embedded node* of
//! the next element, not at the element's start, so recovering the
//! owner means subtracting the link field's offset within the target
//! type. [`ListWalk`] does exactly that, lazily, one element per step.
//!
//! Termination is defensive, since the image may be corrupt: the walk
//! stops when the forward pointer returns to the traversal head, goes
//! null, revisits any node already seen, exceeds a hard node budget, or
//! becomes unreadable. The revisit guard keeps a set of visited node
//! addresses, so an injected cycle costs at most one pass over the
//! nodes already yielded.
//!
//! Two entry points share the same iterator core: [`list_of_type`] for
//! circular `list_head`-style lists, and [`hlist_of_type`] for
//! null-terminated `hlist` chains whose link field is declared on an
//! embedded type (e.g. `sock_common.skc_node` walked as `sock`).

use crate::core::object::{Object, ObjectType};
use crate::core::profile::{FieldKind, Profile};
use crate::error::{Result, VestigeError};
use crate::space::{AddressSpace, ByteOrder};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Hard resource bounds for a single list traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkLimits {
    /// Maximum number of nodes visited before the walk stops with a
    /// warning. A backstop against corrupted links, not a tuning knob.
    pub max_nodes: usize,
}

impl Default for WalkLimits {
    fn default() -> Self {
        Self {
            max_nodes: 1_048_576,
        }
    }
}

/// Lazy traversal of one intrusive list, yielding typed overlays of the
/// owning structures.
pub struct ListWalk<'a> {
    space: &'a dyn AddressSpace,
    profile: &'a Profile,
    target: &'a str,
    link_offset: u64,
    next_offset: u64,
    pointer_size: u8,
    byte_order: ByteOrder,
    /// Address of the traversal head; reaching it again closes a
    /// circular list.
    stop: u64,
    /// Address of the next node to visit, if any.
    current: Option<u64>,
    visited: HashSet<u64>,
    limits: WalkLimits,
}

/// Walk a circular `list_head`-style list.
///
/// `head` is the list head node (e.g. an embedded `list_head`); each
/// linked element is yielded as an overlay of `target_type`, whose
/// `link_field` embeds the node the pointers actually address.
pub fn list_of_type<'a>(
    head: &Object<'a>,
    target_type: &str,
    link_field: &str,
) -> Result<ListWalk<'a>> {
    ListWalk::new(head, target_type, target_type, link_field)
}

/// Walk a null-terminated `hlist`-style chain.
///
/// The link field may be declared on a type embedded at the start of
/// the target (the kernel's `sock_common.skc_node` inside `sock`), so
/// the owning field pair is named explicitly.
pub fn hlist_of_type<'a>(
    head: &Object<'a>,
    target_type: &str,
    link_type: &str,
    link_field: &str,
) -> Result<ListWalk<'a>> {
    ListWalk::new(head, target_type, link_type, link_field)
}

/// The profile-derived parameters of one walk, resolved (and therefore
/// validated) before any image byte is touched. Callers that start
/// walks inside lazy pipelines resolve a plan up front so configuration
/// errors surface immediately rather than being lost mid-iteration.
pub(crate) struct Plan<'a> {
    target: &'a str,
    link_offset: u64,
    next_offset: u64,
    head_forward: u64,
}

/// Resolve the plan for walking `target_type` elements linked through
/// `(link_type, link_field)` from a head of `head_type`.
pub(crate) fn plan<'a>(
    profile: &'a Profile,
    head_type: &str,
    target_type: &str,
    link_type: &str,
    link_field: &str,
) -> Result<Plan<'a>> {
    let target = profile.type_key(target_type)?;
    let mut link_offset = profile.offset(link_type, link_field)?;
    if link_type != target_type {
        link_offset += profile.embedded_offset(target_type, link_type)?;
    }

    // The node type is whatever the link field embeds; its forward
    // pointer is named "next" (circular) or "first" (hlist heads).
    let node_type = match &profile.field(link_type, link_field)?.kind {
        FieldKind::Struct { name } => name.clone(),
        other => {
            return Err(VestigeError::Profile(format!(
                "{}.{} must embed a list node type, found {:?}",
                link_type, link_field, other
            )))
        }
    };
    let next_offset = forward_offset(profile, &node_type)?;
    let head_forward = forward_offset(profile, head_type)?;

    Ok(Plan {
        target,
        link_offset,
        next_offset,
        head_forward,
    })
}

impl<'a> ListWalk<'a> {
    fn new(
        head: &Object<'a>,
        target_type: &str,
        link_type: &str,
        link_field: &str,
    ) -> Result<Self> {
        let profile = head.profile();
        let space = head.space();

        let head_type = head
            .type_name()
            .ok_or_else(|| VestigeError::NotAStruct(format!("{}", head.object_type())))?;
        let plan = plan(profile, head_type, target_type, link_type, link_field)?;

        let pointer_size = profile.pointer_size();
        let byte_order = profile.byte_order();

        // The head's own forward pointer starts the walk.
        let current = space.read_uint(
            head.address().wrapping_add(plan.head_forward),
            pointer_size,
            byte_order,
        );
        if current.is_none() {
            debug!(head = head.address(), "list head not backed; empty walk");
        }

        Ok(Self {
            space,
            profile,
            target: plan.target,
            link_offset: plan.link_offset,
            next_offset: plan.next_offset,
            pointer_size,
            byte_order,
            stop: head.address(),
            current,
            visited: HashSet::new(),
            limits: WalkLimits::default(),
        })
    }

    /// Replace the default node budget.
    pub fn limited(mut self, limits: WalkLimits) -> Self {
        self.limits = limits;
        self
    }
}

/// Offset of a node type's forward pointer: `next` for circular nodes,
/// `first` for hlist heads.
fn forward_offset(profile: &Profile, node_type: &str) -> Result<u64> {
    match profile.offset(node_type, "next") {
        Ok(offset) => Ok(offset),
        Err(VestigeError::UnknownField { .. }) => profile.offset(node_type, "first"),
        Err(e) => Err(e),
    }
}

impl<'a> Iterator for ListWalk<'a> {
    type Item = Object<'a>;

    fn next(&mut self) -> Option<Object<'a>> {
        let node = self.current?;
        if node == 0 || node == self.stop {
            self.current = None;
            return None;
        }
        if self.visited.len() >= self.limits.max_nodes {
            warn!(
                node,
                max_nodes = self.limits.max_nodes,
                "list walk exceeded node budget, stopping"
            );
            self.current = None;
            return None;
        }
        if !self.visited.insert(node) {
            warn!(node, "list walk revisited a node, stopping");
            self.current = None;
            return None;
        }

        // A node whose forward pointer cannot be read is not backed by
        // the image; the walk ends cleanly without yielding it.
        let Some(next) = self.space.read_uint(
            self.node_forward(node),
            self.pointer_size,
            self.byte_order,
        ) else {
            debug!(node, "link pointer unreadable; treating as list end");
            self.current = None;
            return None;
        };
        self.current = Some(next);

        // The pointer addresses the embedded link node; the owner
        // starts link_offset bytes before it.
        let owner = node.wrapping_sub(self.link_offset);

        Some(Object::from_parts(
            self.space,
            self.profile,
            ObjectType::Struct(self.target),
            owner,
        ))
    }
}

impl ListWalk<'_> {
    fn node_forward(&self, node: u64) -> u64 {
        node.wrapping_add(self.next_offset)
    }
}
