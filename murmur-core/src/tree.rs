use chrono::{DateTime, Utc};
use murmur_types::{Comment, EntityId, SyncEvent};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TreeError {
    #[error("parent comment {0} not found")]
    ParentNotFound(EntityId),

    #[error("comment {id} breaks thread structure: {reason}")]
    InvariantViolation { id: EntityId, reason: String },
}

/// Comment forest for one open post.
///
/// Created when a post's detail view opens and dropped when it closes;
/// nothing here outlives the view. Nesting depth is unbounded.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentTree {
    post_id: EntityId,
    roots: Vec<Comment>,
}

impl CommentTree {
    pub fn new(post_id: EntityId) -> Self {
        Self {
            post_id,
            roots: Vec::new(),
        }
    }

    /// Build a tree from a nested server payload.
    ///
    /// `depth`, `parent_id` and `root_comment_id` are recomputed from the
    /// nesting itself so the structural invariants hold whatever the payload
    /// claimed.
    pub fn from_nested(post_id: EntityId, mut roots: Vec<Comment>) -> Self {
        for root in roots.iter_mut() {
            root.depth = 0;
            root.parent_id = None;
            root.root_comment_id = None;
            normalize_replies(root);
        }
        Self { post_id, roots }
    }

    pub fn post_id(&self) -> EntityId {
        self.post_id
    }

    pub fn roots(&self) -> &[Comment] {
        &self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Depth-first, pre-order traversal of every comment
    pub fn iter(&self) -> DepthFirst<'_> {
        DepthFirst {
            stack: self.roots.iter().rev().collect(),
        }
    }

    pub fn find(&self, id: EntityId) -> Option<&Comment> {
        self.iter().find(|comment| comment.id == id)
    }

    pub fn find_mut(&mut self, id: EntityId) -> Option<&mut Comment> {
        find_in_mut(&mut self.roots, id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.find(id).is_some()
    }

    /// Append a top-level comment
    pub fn insert_root(&mut self, comment: Comment) {
        self.roots.push(comment);
    }

    /// Append `comment` to the replies of `parent_id`, wherever it sits
    pub fn insert_reply(&mut self, parent_id: EntityId, comment: Comment) -> Result<(), TreeError> {
        let parent = self
            .find_mut(parent_id)
            .ok_or(TreeError::ParentNotFound(parent_id))?;
        parent.replies.push(comment);
        Ok(())
    }

    /// Replace the provisional node with its authoritative counterpart.
    ///
    /// The node keeps its position and its local replies; descendants that
    /// pointed at the provisional id are re-pointed to the stable one.
    /// Returns false (tree untouched) if the provisional node is gone.
    pub fn reconcile(&mut self, provisional_id: EntityId, authoritative: Comment) -> bool {
        let Some(node) = self.find_mut(provisional_id) else {
            return false;
        };

        let replies = std::mem::take(&mut node.replies);
        *node = authoritative;
        node.replies = replies;

        let stable_id = node.id;
        if stable_id != provisional_id {
            repoint(&mut node.replies, provisional_id, stable_id);
        }
        true
    }

    /// Detach a comment (and its replies) from the tree
    pub fn remove(&mut self, id: EntityId) -> Option<Comment> {
        remove_from(&mut self.roots, id)
    }

    /// Every comment including nested replies
    pub fn count_all(&self) -> usize {
        self.iter().count()
    }

    /// Timestamp of the most recent comment anywhere in the thread
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.iter().map(|comment| comment.created_at).max()
    }

    /// Distinct commenter names in depth-first order
    pub fn commenters(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.iter()
            .filter(|comment| seen.insert(comment.author_id))
            .map(|comment| comment.author_name.clone())
            .collect()
    }

    /// Apply a confirmed reaction event to the matching comment, if any
    pub fn apply_event(&mut self, event: &SyncEvent) -> bool {
        match self.find_mut(event.entity_id()) {
            Some(comment) => comment.reaction.apply(event),
            None => false,
        }
    }

    /// Check the structural invariants of the whole forest
    pub fn check_invariants(&self) -> Result<(), TreeError> {
        let mut seen = HashSet::new();
        for root in &self.roots {
            if root.depth != 0 || root.parent_id.is_some() || root.root_comment_id.is_some() {
                return Err(TreeError::InvariantViolation {
                    id: root.id,
                    reason: "top-level comment must have depth 0 and no parent or root".to_string(),
                });
            }
            check_subtree(root, &mut seen)?;
        }
        Ok(())
    }
}

impl Drop for CommentTree {
    fn drop(&mut self) {
        // Flatten before dropping so a deep chain is not freed recursively
        let mut pending = std::mem::take(&mut self.roots);
        while let Some(mut comment) = pending.pop() {
            pending.append(&mut comment.replies);
        }
    }
}

/// Iterator returned by [`CommentTree::iter`]
pub struct DepthFirst<'a> {
    stack: Vec<&'a Comment>,
}

impl<'a> Iterator for DepthFirst<'a> {
    type Item = &'a Comment;

    fn next(&mut self) -> Option<Self::Item> {
        let comment = self.stack.pop()?;
        self.stack.extend(comment.replies.iter().rev());
        Some(comment)
    }
}

// The helpers below walk the forest with explicit stacks; nesting depth is
// unbounded and must not be limited by the call stack.

/// Rewrite `depth`, `parent_id` and `root_comment_id` under `root`
fn normalize_replies(root: &mut Comment) {
    let root_id = root.id;
    let mut stack: Vec<&mut Comment> = vec![root];
    while let Some(parent) = stack.pop() {
        let parent_id = parent.id;
        let depth = parent.depth + 1;
        for reply in parent.replies.iter_mut() {
            reply.depth = depth;
            reply.parent_id = Some(parent_id);
            reply.root_comment_id = Some(root_id);
            stack.push(reply);
        }
    }
}

fn find_in_mut(nodes: &mut [Comment], id: EntityId) -> Option<&mut Comment> {
    let mut stack: Vec<&mut Comment> = nodes.iter_mut().rev().collect();
    while let Some(node) = stack.pop() {
        if node.id == id {
            return Some(node);
        }
        stack.extend(node.replies.iter_mut().rev());
    }
    None
}

fn remove_from(nodes: &mut Vec<Comment>, id: EntityId) -> Option<Comment> {
    let mut stack: Vec<&mut Vec<Comment>> = vec![nodes];
    while let Some(siblings) = stack.pop() {
        if let Some(index) = siblings.iter().position(|node| node.id == id) {
            return Some(siblings.remove(index));
        }
        stack.extend(siblings.iter_mut().rev().map(|node| &mut node.replies));
    }
    None
}

fn repoint(nodes: &mut [Comment], from: EntityId, to: EntityId) {
    let mut stack: Vec<&mut Comment> = nodes.iter_mut().collect();
    while let Some(node) = stack.pop() {
        if node.parent_id == Some(from) {
            node.parent_id = Some(to);
        }
        if node.root_comment_id == Some(from) {
            node.root_comment_id = Some(to);
        }
        stack.extend(node.replies.iter_mut());
    }
}

fn check_subtree(root: &Comment, seen: &mut HashSet<EntityId>) -> Result<(), TreeError> {
    let root_id = root.id;
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if !seen.insert(node.id) {
            return Err(TreeError::InvariantViolation {
                id: node.id,
                reason: "duplicate id".to_string(),
            });
        }
        for reply in &node.replies {
            let reason = if reply.depth != node.depth + 1 {
                Some(format!("depth {} under parent at depth {}", reply.depth, node.depth))
            } else if reply.parent_id != Some(node.id) {
                Some("parent id does not match enclosing comment".to_string())
            } else if reply.root_comment_id != Some(root_id) {
                Some("root id does not match thread root".to_string())
            } else {
                None
            };
            if let Some(reason) = reason {
                return Err(TreeError::InvariantViolation { id: reply.id, reason });
            }
        }
        stack.extend(node.replies.iter().rev());
    }
    Ok(())
}
