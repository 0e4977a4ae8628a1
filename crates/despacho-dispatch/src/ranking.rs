// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue member ranking.
//!
//! The total order over waiting drivers: fiorino-type vehicles precede
//! everything else (dispatch bias from the domain, intentionally stronger
//! than the score), then higher priority score, then earlier insertion
//! position. Blocklisting is not part of this order; the queue engine
//! partitions by it before ranking.

use std::cmp::Ordering;

use async_trait::async_trait;

use despacho_core::DespachoError;

/// Rank inputs resolved for one waiting chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankInputs {
    pub priority_score: u8,
    pub is_fiorino: bool,
    pub blocklisted: bool,
}

impl Default for RankInputs {
    /// A chat whose session or driver record cannot be resolved ranks last
    /// among its partition and is not treated as blocklisted.
    fn default() -> Self {
        Self {
            priority_score: 0,
            is_fiorino: false,
            blocklisted: false,
        }
    }
}

/// Resolves rank inputs for a chat from session and registry records.
///
/// Implemented by the session layer; the queue engine stays free of any
/// knowledge of how sessions are stored.
#[async_trait]
pub trait RankSource: Send + Sync {
    async fn rank_inputs(&self, chat_id: &str) -> Result<RankInputs, DespachoError>;
}

/// A queue member with its resolved rank.
#[derive(Debug, Clone)]
pub struct Member {
    pub chat_id: String,
    pub inputs: RankInputs,
    /// Position in the list before this sort; the fairness tie-break.
    pub original_index: usize,
}

/// The stable total order: fiorino first, score descending, index ascending.
pub fn cmp_members(a: &Member, b: &Member) -> Ordering {
    b.inputs
        .is_fiorino
        .cmp(&a.inputs.is_fiorino)
        .then(b.inputs.priority_score.cmp(&a.inputs.priority_score))
        .then(a.original_index.cmp(&b.original_index))
}

pub fn sort_members(members: &mut [Member]) {
    members.sort_by(cmp_members);
}
