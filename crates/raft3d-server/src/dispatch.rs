//! Turns validated client requests into log entries.

use raft3d_core::{ApplyResult, Command, Role};

use crate::error::ApiError;
use crate::state::AppState;

/// Refuse writes on a follower.
pub fn ensure_leader(state: &AppState) -> Result<(), ApiError> {
    match state.role.as_ref() {
        Role::Leader => Ok(()),
        Role::Follower(leader) => Err(ApiError::NotLeader(leader.endpoint.clone())),
    }
}

/// Propose `command` and wait for the local apply. Returns the log index.
///
/// Callers validate first; the state machine validates again at apply time
/// and a command that lost a race is reported with the same error.
pub fn submit(state: &AppState, command: Command) -> Result<u64, ApiError> {
    ensure_leader(state)?;

    let proposal = state.log.propose(&command)?;
    match proposal.result {
        ApplyResult::Applied => {
            tracing::info!(
                index = proposal.index,
                kind = command.kind(),
                id = command.record_id(),
                "Accepted command"
            );
            Ok(proposal.index)
        }
        ApplyResult::Discarded(e) => Err(e.into()),
        ApplyResult::Malformed(e) => Err(ApiError::Internal(e)),
        ApplyResult::Duplicate => Err(ApiError::Internal(format!(
            "log index {} was already applied",
            proposal.index
        ))),
    }
}
