//! Alliance state machine.
//!
//! Each unordered pair of players has at most one [`Alliance`] row:
//!
//! ```text
//! (none) --request--> Pending --accept--> Allied --break/expire--> (none)
//!                        |                  ^  |
//!                        +--reject--> (none) +-renew (final window only)
//! ```
//!
//! Breaking an alliance marks the breaker's betrayal time, which confuses
//! their units for a while.

use crate::components::{Alliance, AllianceStatus, PlayerId, PlayerPair};
use crate::config::SimConfig;
use crate::error::{GameError, Result};
use crate::state::GameState;

/// Validate the two sides of a diplomacy action.
fn check_parties(state: &GameState, actor: PlayerId, other: PlayerId) -> Result<PlayerPair> {
    if actor == other {
        return Err(GameError::CannotTargetSelf);
    }
    for id in [actor, other] {
        let player = state.players.get(id).ok_or(GameError::UnknownPlayer(id))?;
        if !player.is_active() {
            return Err(GameError::PlayerInactive(id));
        }
    }
    Ok(PlayerPair::new(actor, other))
}

/// Ask `other` for an alliance.
pub fn request(state: &mut GameState, actor: PlayerId, other: PlayerId) -> Result<()> {
    let pair = check_parties(state, actor, other)?;
    match state.alliances.get(pair).map(|a| a.status) {
        Some(AllianceStatus::Allied) => return Err(GameError::AlreadyAllied),
        Some(AllianceStatus::Pending) => return Err(GameError::RequestAlreadySent),
        None => {}
    }
    state.alliances.insert(Alliance {
        pair,
        status: AllianceStatus::Pending,
        requested_by: actor,
        expires_at: None,
    });
    tracing::debug!(from = %actor, to = %other, "Alliance requested");
    Ok(())
}

/// Accept a pending request sent by `other`.
pub fn accept(
    state: &mut GameState,
    config: &SimConfig,
    now: u64,
    actor: PlayerId,
    other: PlayerId,
) -> Result<()> {
    let pair = check_parties(state, actor, other)?;
    let alliance = state.alliances.get(pair).ok_or(GameError::NoPendingRequest)?;
    match alliance.status {
        AllianceStatus::Allied => return Err(GameError::AlreadyAllied),
        AllianceStatus::Pending if alliance.requested_by != other => {
            return Err(GameError::NoPendingRequest)
        }
        AllianceStatus::Pending => {}
    }
    if let Some(alliance) = state.alliances.get_mut(pair) {
        alliance.status = AllianceStatus::Allied;
        alliance.expires_at = Some(now + config.alliance_duration_ms);
    }
    tracing::info!(a = %actor, b = %other, "Alliance formed");
    Ok(())
}

/// Turn down a pending request sent by `other`.
pub fn reject(state: &mut GameState, actor: PlayerId, other: PlayerId) -> Result<()> {
    let pair = check_parties(state, actor, other)?;
    let pending_from_other = state
        .alliances
        .get(pair)
        .is_some_and(|a| a.status == AllianceStatus::Pending && a.requested_by == other);
    if !pending_from_other {
        return Err(GameError::NoPendingRequest);
    }
    state.alliances.remove(pair);
    Ok(())
}

/// Break an alliance in force. The actor becomes confused.
pub fn break_alliance(state: &mut GameState, now: u64, actor: PlayerId, other: PlayerId) -> Result<()> {
    let pair = check_parties(state, actor, other)?;
    if !state.are_allied(actor, other) {
        return Err(GameError::NotAllied);
    }
    state.alliances.remove(pair);
    if let Some(player) = state.players.get_mut(actor) {
        player.last_betrayal_time = Some(now);
    }
    tracing::info!(breaker = %actor, other = %other, "Alliance broken");
    Ok(())
}

/// Extend an alliance during its closing window.
pub fn renew(
    state: &mut GameState,
    config: &SimConfig,
    now: u64,
    actor: PlayerId,
    other: PlayerId,
) -> Result<()> {
    let pair = check_parties(state, actor, other)?;
    let alliance = state
        .alliances
        .get(pair)
        .filter(|a| a.status == AllianceStatus::Allied)
        .ok_or(GameError::NotAllied)?;
    let remaining = alliance.expires_at.map_or(0, |end| end.saturating_sub(now));
    if remaining > config.alliance_renew_window_ms {
        return Err(GameError::RenewWindowClosed);
    }
    if let Some(alliance) = state.alliances.get_mut(pair) {
        alliance.expires_at = Some(now + config.alliance_duration_ms);
    }
    tracing::debug!(a = %actor, b = %other, "Alliance renewed");
    Ok(())
}

/// Drop allied pairs whose term ran out. Returns the removed pairs.
pub fn expire_alliances(state: &mut GameState, now: u64) -> Vec<PlayerPair> {
    let expired: Vec<PlayerPair> = state
        .alliances
        .values()
        .filter(|a| a.status == AllianceStatus::Allied && a.expires_at.is_some_and(|end| now >= end))
        .map(|a| a.pair)
        .collect();
    for pair in &expired {
        state.alliances.remove(*pair);
        tracing::info!(a = %pair.first(), b = %pair.second(), "Alliance expired");
    }
    expired
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Game, GameId, GamePhase, GameStatus, Player, PlayerStatus};

    const P1: PlayerId = PlayerId(1);
    const P2: PlayerId = PlayerId(2);
    const P3: PlayerId = PlayerId(3);

    fn state() -> GameState {
        let mut state = GameState::new(Game {
            id: GameId(1),
            map_id: "t".into(),
            seed: 0,
            status: GameStatus::Active,
            phase: GamePhase::Simulation,
            phase_start: 0,
            phase_end: None,
            tick_count: 0,
            winner: None,
        });
        for id in [P1, P2, P3] {
            state.players.insert(Player::new(id, 0));
        }
        state
    }

    fn allied(state: &mut GameState, config: &SimConfig, now: u64) {
        request(state, P1, P2).unwrap();
        accept(state, config, now, P2, P1).unwrap();
    }

    #[test]
    fn test_request_accept_forms_alliance() {
        let mut state = state();
        let config = SimConfig::default();
        request(&mut state, P1, P2).unwrap();
        assert!(!state.are_allied(P1, P2));

        // The requester cannot accept their own request
        assert!(matches!(
            accept(&mut state, &config, 1_000, P1, P2),
            Err(GameError::NoPendingRequest)
        ));

        accept(&mut state, &config, 1_000, P2, P1).unwrap();
        assert!(state.are_allied(P1, P2));
        let alliance = state.alliance(P2, P1).unwrap();
        assert_eq!(alliance.expires_at, Some(1_000 + config.alliance_duration_ms));
    }

    #[test]
    fn test_duplicate_requests_rejected() {
        let mut state = state();
        let config = SimConfig::default();
        request(&mut state, P1, P2).unwrap();
        assert!(matches!(request(&mut state, P1, P2), Err(GameError::RequestAlreadySent)));
        assert!(matches!(request(&mut state, P2, P1), Err(GameError::RequestAlreadySent)));
        accept(&mut state, &config, 0, P2, P1).unwrap();
        assert!(matches!(request(&mut state, P1, P2), Err(GameError::AlreadyAllied)));
    }

    #[test]
    fn test_invalid_parties() {
        let mut state = state();
        assert!(matches!(request(&mut state, P1, P1), Err(GameError::CannotTargetSelf)));
        assert!(matches!(
            request(&mut state, P1, PlayerId(9)),
            Err(GameError::UnknownPlayer(PlayerId(9)))
        ));
        if let Some(p) = state.players.get_mut(P3) {
            p.status = PlayerStatus::Eliminated;
        }
        assert!(matches!(request(&mut state, P1, P3), Err(GameError::PlayerInactive(P3))));
    }

    #[test]
    fn test_reject_removes_request() {
        let mut state = state();
        request(&mut state, P1, P2).unwrap();
        assert!(matches!(reject(&mut state, P1, P2), Err(GameError::NoPendingRequest)));
        reject(&mut state, P2, P1).unwrap();
        assert!(state.alliance(P1, P2).is_none());
    }

    #[test]
    fn test_break_confuses_breaker() {
        let mut state = state();
        let config = SimConfig::default();
        assert!(matches!(break_alliance(&mut state, 0, P1, P2), Err(GameError::NotAllied)));

        allied(&mut state, &config, 0);
        break_alliance(&mut state, 5_000, P2, P1).unwrap();

        assert!(state.alliance(P1, P2).is_none());
        assert!(state.is_confused(P2, 5_000, config.betrayal_confusion_ms));
        assert!(!state.is_confused(P1, 5_000, config.betrayal_confusion_ms));
    }

    #[test]
    fn test_renew_only_in_final_window() {
        let mut state = state();
        let config = SimConfig::default();
        allied(&mut state, &config, 0);
        let end = config.alliance_duration_ms;

        let early = end - config.alliance_renew_window_ms - 1;
        assert!(matches!(
            renew(&mut state, &config, early, P1, P2),
            Err(GameError::RenewWindowClosed)
        ));

        let late = end - config.alliance_renew_window_ms;
        renew(&mut state, &config, late, P1, P2).unwrap();
        assert_eq!(
            state.alliance(P1, P2).unwrap().expires_at,
            Some(late + config.alliance_duration_ms)
        );
    }

    #[test]
    fn test_expiry_removes_only_lapsed_pairs() {
        let mut state = state();
        let config = SimConfig::default();
        allied(&mut state, &config, 0);
        request(&mut state, P1, P3).unwrap();

        assert!(expire_alliances(&mut state, config.alliance_duration_ms - 1).is_empty());
        let expired = expire_alliances(&mut state, config.alliance_duration_ms);
        assert_eq!(expired, vec![PlayerPair::new(P1, P2)]);
        // Pending requests never expire
        assert!(state.alliance(P1, P3).is_some());
    }
}
