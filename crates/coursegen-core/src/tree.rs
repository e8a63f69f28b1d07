//! Pure application of modifications to the content tree.
//!
//! [`apply`] never touches its input: it clones the tree, applies the batch in
//! order and returns the new snapshot with one outcome per modification.
//! Nothing here fails; records that cannot be applied become `NotFound` or
//! `Rejected` outcomes and leave the tree as it was.

use coursegen_types::{
    join_path, path_segments, Action, ContentNode, ContentTree, Modification, ModificationKey,
    NodePayload, NodeType,
};
use thiserror::Error;
use tracing::{debug, warn};

/// Why a modification was not applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("node has no usable id")]
    MissingIdentity,

    #[error("a course cannot have a parent path")]
    CourseWithParent,

    #[error("{0} needs a parent path")]
    MissingParent(NodeType),

    #[error("segment {segment} cannot be a {expected}")]
    InvalidSegment { segment: String, expected: NodeType },

    #[error("path too deep at segment {0}")]
    PathTooDeep(String),

    #[error("a {parent} cannot contain a {child}")]
    InvalidParent { parent: NodeType, child: NodeType },
}

/// What happened to one modification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    Inserted { path: String },
    /// ADD matched a placeholder ancestor and filled it in.
    FilledPlaceholder { path: String },
    /// ADD matched an existing node; fields merged, nothing inserted.
    Duplicate { path: String },
    Updated { path: String },
    Deleted { path: String },
    NotFound,
    Rejected(RejectReason),
}

impl MutationOutcome {
    /// Whether the tree may have changed.
    pub fn is_effective(&self) -> bool {
        !matches!(self, MutationOutcome::NotFound | MutationOutcome::Rejected(_))
    }
}

/// Output of [`apply`].
#[derive(Debug, Clone)]
pub struct MutationResult {
    pub tree: ContentTree,
    pub outcomes: Vec<(Option<ModificationKey>, MutationOutcome)>,
}

impl MutationResult {
    /// Keys of the modifications that took effect.
    pub fn applied_keys(&self) -> Vec<ModificationKey> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| outcome.is_effective())
            .filter_map(|(key, _)| key.clone())
            .collect()
    }
}

/// Apply a batch of modifications to a copy of `tree`.
pub fn apply(tree: &ContentTree, modifications: &[Modification]) -> MutationResult {
    let mut next = tree.clone();
    let outcomes = modifications
        .iter()
        .map(|m| {
            let outcome = apply_one(&mut next, m);
            log_outcome(m, &outcome);
            (m.key(), outcome)
        })
        .collect();

    MutationResult {
        tree: next,
        outcomes,
    }
}

/// Apply one modification in place.
pub fn apply_one(tree: &mut ContentTree, modification: &Modification) -> MutationOutcome {
    let Some(id) = modification.node_id() else {
        return MutationOutcome::Rejected(RejectReason::MissingIdentity);
    };

    let result = match modification.action {
        Action::Add => add(tree, modification, &id),
        Action::Update => Ok(update(tree, modification, &id)),
        Action::Delete => Ok(delete(tree, modification, &id)),
    };
    result.unwrap_or_else(MutationOutcome::Rejected)
}

fn log_outcome(modification: &Modification, outcome: &MutationOutcome) {
    match outcome {
        MutationOutcome::NotFound => warn!(
            target: "coursegen::tree",
            "{} {} {:?}: target not found, skipping",
            modification.action,
            modification.target_type,
            modification.node_id()
        ),
        MutationOutcome::Rejected(reason) => warn!(
            target: "coursegen::tree",
            "{} {} {:?} rejected: {}",
            modification.action,
            modification.target_type,
            modification.node_id(),
            reason
        ),
        other => debug!(target: "coursegen::tree", "{} {}: {:?}", modification.action, modification.target_type, other),
    }
}

// ---------------------------------------------------------------------------
// ADD
// ---------------------------------------------------------------------------

fn add(tree: &mut ContentTree, m: &Modification, id: &str) -> Result<MutationOutcome, RejectReason> {
    let target = m.target_type;

    let (siblings, parent_path) = if target == NodeType::Course {
        if m.parent_path.is_some() {
            return Err(RejectReason::CourseWithParent);
        }
        (&mut tree.roots, None)
    } else {
        let parent_path = m
            .parent_path
            .as_deref()
            .ok_or(RejectReason::MissingParent(target))?;
        let segments: Vec<&str> = path_segments(parent_path).collect();
        if segments.is_empty() {
            return Err(RejectReason::MissingParent(target));
        }

        let types = plan_path(tree, &segments)?;
        let parent_type = *types.last().ok_or(RejectReason::MissingParent(target))?;
        if !parent_type.can_contain(target) {
            return Err(RejectReason::InvalidParent {
                parent: parent_type,
                child: target,
            });
        }

        let parent = materialize(&mut tree.roots, &segments, &types, None);
        let path = parent.path.clone();
        (&mut parent.children, Some(path))
    };

    let path = join_path(parent_path.as_deref(), id);

    // Siblings share one level, so a matching id is the same node
    if let Some(existing) = siblings.iter_mut().find(|n| n.id == id) {
        let was_placeholder = existing.placeholder;
        merge_payload(existing, &m.node);
        existing.placeholder = false;
        return Ok(if was_placeholder {
            MutationOutcome::FilledPlaceholder { path }
        } else {
            MutationOutcome::Duplicate { path }
        });
    }

    let mut node = ContentNode::new(id, id, target, path.clone());
    merge_payload(&mut node, &m.node);

    if node.is_video() {
        // Videos lead the chapter, in arrival order
        let at = siblings
            .iter()
            .rposition(ContentNode::is_video)
            .map_or(0, |i| i + 1);
        siblings.insert(at, node);
    } else {
        siblings.push(node);
    }

    Ok(MutationOutcome::Inserted { path })
}

/// Work out the level of every segment in a parent path without touching the
/// tree. Existing nodes keep their type; missing ones take the type their
/// prefix names, or the level below their parent.
fn plan_path(tree: &ContentTree, segments: &[&str]) -> Result<Vec<NodeType>, RejectReason> {
    let mut types: Vec<NodeType> = Vec::with_capacity(segments.len());
    let mut level: Option<&[ContentNode]> = Some(tree.roots.as_slice());

    for segment in segments {
        let expected = match types.last() {
            None => Some(NodeType::Course),
            Some(parent) => NodeType::child_type(*parent),
        }
        .ok_or_else(|| RejectReason::PathTooDeep(segment.to_string()))?;

        let existing = level.and_then(|nodes| nodes.iter().find(|n| n.id == *segment));
        let node_type = match existing {
            Some(node) => node.node_type,
            None => match NodeType::from_segment(segment) {
                Some(named) if named != expected => {
                    return Err(RejectReason::InvalidSegment {
                        segment: segment.to_string(),
                        expected,
                    });
                }
                _ => expected,
            },
        };

        types.push(node_type);
        level = existing.map(|node| node.children.as_slice());
    }

    Ok(types)
}

/// Walk a planned path, creating placeholders for missing segments, and
/// return the node at its end.
fn materialize<'a>(
    siblings: &'a mut Vec<ContentNode>,
    segments: &[&str],
    types: &[NodeType],
    parent_path: Option<&str>,
) -> &'a mut ContentNode {
    let segment = segments[0];
    let index = match siblings.iter().position(|n| n.id == segment) {
        Some(index) => index,
        None => {
            let path = join_path(parent_path, segment);
            debug!(target: "coursegen::tree", "Creating placeholder {} at {}", types[0], path);
            siblings.push(ContentNode::placeholder(segment, types[0], path));
            siblings.len() - 1
        }
    };

    let node = &mut siblings[index];
    if segments.len() == 1 {
        return node;
    }
    let path = node.path.clone();
    materialize(&mut node.children, &segments[1..], &types[1..], Some(&path))
}

fn merge_payload(node: &mut ContentNode, payload: &NodePayload) {
    if let Some(name) = &payload.name {
        node.name = name.clone();
    }
    if let Some(description) = &payload.description {
        node.description = Some(description.clone());
    }
    if let Some(slide_type) = &payload.slide_type {
        node.slide_type = Some(slide_type.clone());
    }
    for (key, value) in &payload.attributes {
        node.attributes.insert(key.clone(), value.clone());
    }
}

// ---------------------------------------------------------------------------
// UPDATE / DELETE
// ---------------------------------------------------------------------------

fn update(tree: &mut ContentTree, m: &Modification, id: &str) -> MutationOutcome {
    match find_scoped_mut(tree, m.parent_path.as_deref(), id, m.target_type) {
        Some(node) => {
            merge_payload(node, &m.node);
            MutationOutcome::Updated {
                path: node.path.clone(),
            }
        }
        None => MutationOutcome::NotFound,
    }
}

fn delete(tree: &mut ContentTree, m: &Modification, id: &str) -> MutationOutcome {
    let scoped = m
        .parent_path
        .as_deref()
        .and_then(|p| find_by_path_mut(&mut tree.roots, p));

    let removed = match scoped {
        Some(scope) => remove(&mut scope.children, id, m.target_type),
        None => remove(&mut tree.roots, id, m.target_type),
    };

    match removed {
        Some(node) => MutationOutcome::Deleted { path: node.path },
        None => MutationOutcome::NotFound,
    }
}

/// Search under `parent_path` when it resolves, else the whole tree.
fn find_scoped_mut<'a>(
    tree: &'a mut ContentTree,
    parent_path: Option<&str>,
    id: &str,
    node_type: NodeType,
) -> Option<&'a mut ContentNode> {
    let in_scope = parent_path.is_some_and(|p| tree.contains_path(p));
    if in_scope {
        let scope = find_by_path_mut(&mut tree.roots, parent_path?)?;
        find_mut(&mut scope.children, id, node_type)
    } else {
        find_mut(&mut tree.roots, id, node_type)
    }
}

fn find_by_path_mut<'a>(roots: &'a mut [ContentNode], path: &str) -> Option<&'a mut ContentNode> {
    let mut segments = path_segments(path);
    let first = segments.next()?;
    let mut node = roots.iter_mut().find(|n| n.id == first)?;
    for segment in segments {
        node = node.children.iter_mut().find(|n| n.id == segment)?;
    }
    Some(node)
}

fn find_mut<'a>(nodes: &'a mut [ContentNode], id: &str, node_type: NodeType) -> Option<&'a mut ContentNode> {
    for node in nodes.iter_mut() {
        if node.id == id && node.node_type == node_type {
            return Some(node);
        }
        if let Some(found) = find_mut(&mut node.children, id, node_type) {
            return Some(found);
        }
    }
    None
}

fn remove(nodes: &mut Vec<ContentNode>, id: &str, node_type: NodeType) -> Option<ContentNode> {
    if let Some(index) = nodes
        .iter()
        .position(|n| n.id == id && n.node_type == node_type)
    {
        return Some(nodes.remove(index));
    }
    nodes
        .iter_mut()
        .find_map(|n| remove(&mut n.children, id, node_type))
}
