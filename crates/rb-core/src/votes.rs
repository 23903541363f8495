//! # Vote aggregation and toggling
//!
//! Scores are never stored. They are recomputed from the vote rows on every read.

use serde::Serialize;
use uuid::Uuid;

use crate::models::{Vote, VoteKind};

/// Aggregated view of the votes on one post or reply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VoteSummary {
    pub upvotes: i64,
    pub downvotes: i64,
    pub score: i64,
    /// How the viewer voted, if they are logged in and have voted.
    pub user_vote: Option<VoteKind>,
}

/// Folds a set of votes into a [`VoteSummary`] as seen by `viewer`.
///
/// Total over any input and independent of the order of `votes`.
pub fn aggregate<'a, I>(votes: I, viewer: Option<Uuid>) -> VoteSummary
where
    I: IntoIterator<Item = &'a Vote>,
{
    let mut summary = VoteSummary::default();
    for vote in votes {
        match vote.kind {
            VoteKind::Up => summary.upvotes += 1,
            VoteKind::Down => summary.downvotes += 1,
        }
        if viewer == Some(vote.user_id) {
            summary.user_vote = Some(vote.kind);
        }
    }
    summary.score = summary.upvotes - summary.downvotes;
    summary
}

/// The single write needed to move a (user, target) pair to its next state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteChange {
    Create(VoteKind),
    /// Same type requested twice: un-vote.
    Remove,
    Switch(VoteKind),
}

impl VoteChange {
    /// State of the pair once the change is applied.
    pub fn resulting_state(&self) -> Option<VoteKind> {
        match self {
            VoteChange::Create(kind) | VoteChange::Switch(kind) => Some(*kind),
            VoteChange::Remove => None,
        }
    }
}

/// Transition of the `{none, up, down}` machine driven by `requested`.
pub fn toggle(current: Option<VoteKind>, requested: VoteKind) -> VoteChange {
    match current {
        None => VoteChange::Create(requested),
        Some(kind) if kind == requested => VoteChange::Remove,
        Some(_) => VoteChange::Switch(requested),
    }
}
