//! # Thread assembly
//!
//! Rebuilds the nested reply tree of a post from the flat rows the repo returns.

use std::collections::HashMap;

use serde::Serialize;
use uuid::Uuid;

use crate::models::{Reply, Vote};
use crate::votes::{aggregate, VoteSummary};

/// One reply with its score and its direct answers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplyNode {
    #[serde(flatten)]
    pub reply: Reply,
    pub votes: VoteSummary,
    pub children: Vec<ReplyNode>,
}

/// Groups `replies` into a forest keyed by `parent_id`.
///
/// Siblings come out in ascending `created_at`; the sort is stable, so equal
/// timestamps keep the order the rows arrived in. `votes` may hold the votes
/// of every reply on the post; each node picks its own by `reply_id`.
///
/// Traversal only descends from the roots and every reply has a single
/// parent, so rows whose parent is missing (or that sit on a cycle) are
/// never reached and the walk always terminates.
pub fn assemble(mut replies: Vec<Reply>, votes: &[Vote], viewer: Option<Uuid>) -> Vec<ReplyNode> {
    replies.sort_by_key(|r| r.created_at);

    let mut votes_by_reply: HashMap<Uuid, Vec<&Vote>> = HashMap::new();
    for vote in votes {
        if let Some(reply_id) = vote.target.reply_id() {
            votes_by_reply.entry(reply_id).or_default().push(vote);
        }
    }

    let mut by_parent: HashMap<Option<Uuid>, Vec<Reply>> = HashMap::new();
    for reply in replies {
        by_parent.entry(reply.parent_id).or_default().push(reply);
    }

    build_level(None, &mut by_parent, &votes_by_reply, viewer)
}

fn build_level(
    parent: Option<Uuid>,
    by_parent: &mut HashMap<Option<Uuid>, Vec<Reply>>,
    votes_by_reply: &HashMap<Uuid, Vec<&Vote>>,
    viewer: Option<Uuid>,
) -> Vec<ReplyNode> {
    let siblings = by_parent.remove(&parent).unwrap_or_default();
    siblings
        .into_iter()
        .map(|reply| {
            let votes = votes_by_reply
                .get(&reply.id)
                .map(|v| aggregate(v.iter().copied(), viewer))
                .unwrap_or_default();
            let children = build_level(Some(reply.id), by_parent, votes_by_reply, viewer);
            ReplyNode { reply, votes, children }
        })
        .collect()
}

/// Total number of replies in a forest.
pub fn count(forest: &[ReplyNode]) -> usize {
    forest.iter().map(|n| 1 + count(&n.children)).sum()
}
