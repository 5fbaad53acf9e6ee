//! The room readiness/countdown/game-promotion state machine (§4.6):
//!
//! ```text
//!             CREATED ──entry──► OPEN ◄─┐
//!                                  │    │countdown aborted
//!                      (all ready  ▼    │
//!                       & all teams COUNTDOWN
//!                       populated) │
//!                                  │+5s elapsed
//!                                  ▼
//!                               STARTED (is_open=false; game_start_time set)
//!                                  │
//!                                  ▼
//!                               RETIRED (is_open=false, is_retired=true)
//! ```

use crate::chat::ChatLog;
use crate::domain::{scope_string, GameSession, Room, ScopeLevel, Uid, NOT_SCHEDULED};
use crate::protocol::Outbound;
use crate::server::ProtocolError;
use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc::UnboundedSender;

/// A state change the caller must broadcast or act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    NoChange,
    CountdownStarted { start_time: i64, forced: bool },
    CountdownAborted,
}

/// In-memory runtime wrapping a persisted `Room`: rosters, teams, and ready
/// flags that don't need to survive a restart on their own (the persisted
/// `Room` carries the durable fields).
pub struct RoomRuntime {
    pub room: Room,
    pub clients: HashSet<Uid>,
    pub teams: Vec<Vec<Uid>>,
    pub players_ready: HashMap<Uid, bool>,
    pub game_name: Option<String>,
    pub empty_since: Option<i64>,
    pub chat: ChatLog,
    pub senders: HashMap<Uid, UnboundedSender<Outbound>>,
}

impl RoomRuntime {
    #[must_use]
    pub fn new(room: Room) -> Self {
        let teams = vec![Vec::new(); room.n_teams as usize];
        let chat = ChatLog::new(scope_string(ScopeLevel::Room, &room.name));
        Self {
            room,
            clients: HashSet::new(),
            teams,
            players_ready: HashMap::new(),
            game_name: None,
            empty_since: None,
            chat,
            senders: HashMap::new(),
        }
    }

    pub fn register_sender(&mut self, uid: &str, tx: UnboundedSender<Outbound>) {
        self.senders.insert(uid.to_string(), tx);
    }

    pub fn unregister_sender(&mut self, uid: &str) {
        self.senders.remove(uid);
    }

    /// Sends `outbound` to every registered connection in this room.
    pub fn broadcast(&self, outbound: &Outbound) {
        for tx in self.senders.values() {
            let _ = tx.send(outbound.clone());
        }
    }

    pub fn broadcast_except(&self, exclude_uid: &str, outbound: &Outbound) {
        for (uid, tx) in &self.senders {
            if uid != exclude_uid {
                let _ = tx.send(outbound.clone());
            }
        }
    }

    #[must_use]
    pub fn ready_count(&self) -> usize {
        self.players_ready.values().filter(|&&ready| ready).count()
    }

    fn team_of(&self, uid: &str) -> Option<u8> {
        self.teams
            .iter()
            .position(|team| team.iter().any(|m| m == uid))
            .map(|idx| idx as u8)
    }

    fn is_mod(&self, uid: &str) -> bool {
        self.room.admins.iter().any(|a| a == uid) || self.room.mods.iter().any(|m| m == uid)
    }

    /// Entry (§4.6 "Entry"): verifies the client isn't kicked, the room has
    /// capacity, and (if a game has started) the client belongs to it.
    pub fn join(&mut self, uid: &str) -> Result<(), ProtocolError> {
        if self.room.kicked_players.iter().any(|k| k == uid) {
            return Err(ProtocolError::Unauthorized(
                "You have been kicked from this room.".to_string(),
            ));
        }
        if self.game_name.is_some() && !self.clients.contains(uid) {
            return Err(ProtocolError::ScopeLogic(
                "The game has already started without you.".to_string(),
            ));
        }
        if self.clients.len() >= self.room.player_limit as usize && !self.clients.contains(uid) {
            return Err(ProtocolError::ScopeLogic("Room is full.".to_string()));
        }
        self.clients.insert(uid.to_string());
        self.players_ready.entry(uid.to_string()).or_insert(false);
        Ok(())
    }

    pub fn leave(&mut self, uid: &str, now: i64) {
        self.unregister_sender(uid);
        self.clients.remove(uid);
        self.players_ready.remove(uid);
        for team in &mut self.teams {
            team.retain(|m| m != uid);
        }
        if self.clients.is_empty() {
            self.empty_since.get_or_insert(now);
        }
    }

    /// `JOIN_TEAM {team_n}` (§4.6 "Team selection"). Clears the ready flag.
    /// If a force-started countdown is active, only mods may change teams.
    pub fn join_team(&mut self, uid: &str, team_n: u8, now: i64) -> Result<(), ProtocolError> {
        if self.room.has_active_countdown() && self.room.game_start_forced && !self.is_mod(uid) {
            return Err(ProtocolError::Unauthorized(
                "A moderator has force-started the countdown; teams are locked.".to_string(),
            ));
        }
        if team_n as usize >= self.teams.len() {
            return Err(ProtocolError::BadPayload("team_n out of range".to_string()));
        }
        for team in &mut self.teams {
            team.retain(|m| m != uid);
        }
        self.teams[team_n as usize].push(uid.to_string());
        self.players_ready.insert(uid.to_string(), false);
        self.try_abort_countdown(uid, now);
        Ok(())
    }

    fn all_teams_populated(&self) -> bool {
        self.teams.iter().all(|team| !team.is_empty())
    }

    /// `MARK_READY {ready}` (§4.6 "Readiness"/"Countdown condition"/"Abort").
    pub fn mark_ready(&mut self, uid: &str, ready: bool, now: i64, countdown_secs: u64) -> Result<RoomEvent, ProtocolError> {
        if self.team_of(uid).is_none() {
            return Err(ProtocolError::ScopeLogic(
                "Join a team before marking ready.".to_string(),
            ));
        }

        let was_ready = self.players_ready.get(uid).copied().unwrap_or(false);
        self.players_ready.insert(uid.to_string(), ready);

        if was_ready && !ready {
            if let Some(event) = self.try_abort_countdown(uid, now) {
                return Ok(event);
            }
            return Ok(RoomEvent::NoChange);
        }

        if ready && self.countdown_condition_met() {
            return Ok(self.start_countdown(now, false, countdown_secs));
        }

        Ok(RoomEvent::NoChange)
    }

    fn countdown_condition_met(&self) -> bool {
        self.ready_count() == self.clients.len()
            && !self.clients.is_empty()
            && self.all_teams_populated()
            && !self.room.has_active_countdown()
    }

    fn start_countdown(&mut self, now: i64, forced: bool, countdown_secs: u64) -> RoomEvent {
        self.room.game_start_time = now + countdown_secs as i64;
        self.room.is_open = false;
        self.room.game_start_forced = forced;
        RoomEvent::CountdownStarted {
            start_time: self.room.game_start_time,
            forced,
        }
    }

    /// Cancels an in-progress countdown on a ready→not-ready transition,
    /// unless it was force-started by a mod and the actor isn't a mod.
    fn try_abort_countdown(&mut self, actor: &str, now: i64) -> Option<RoomEvent> {
        if !self.room.has_active_countdown() || now >= self.room.game_start_time {
            return None;
        }
        if self.room.game_start_forced && !self.is_mod(actor) {
            return None;
        }
        self.room.game_start_time = NOT_SCHEDULED;
        self.room.is_open = true;
        self.room.game_start_forced = false;
        Some(RoomEvent::CountdownAborted)
    }

    /// `FORCE_START` (§4.6 "Force start"). Mod-only; always overrides any
    /// countdown already in progress rather than rejecting it.
    pub fn force_start(&mut self, actor: &str, now: i64, countdown_secs: u64) -> Result<RoomEvent, ProtocolError> {
        if !self.is_mod(actor) {
            return Err(ProtocolError::Unauthorized("Mod privileges required.".to_string()));
        }
        Ok(self.start_countdown(now, true, countdown_secs))
    }

    /// `JOIN_GAME_NOW` (§4.6 "Game promotion"). Constructs the `GameSession`
    /// on the first caller after the countdown elapses.
    pub fn join_game_now(&mut self, uid: &str, now: i64, game_name: String, grace_secs: u64) -> Result<JoinGameNowOutcome, ProtocolError> {
        if !self.room.has_active_countdown() {
            return Err(ProtocolError::ScopeLogic("No game is starting.".to_string()));
        }
        let time_left = self.room.game_start_time - now;
        if time_left > 0 {
            if time_left as u64 <= grace_secs.max(1) {
                return Ok(JoinGameNowOutcome::Wait(time_left as u64));
            }
            return Err(ProtocolError::ScopeLogic("Can't join the game early.".to_string()));
        }

        if let Some(existing) = &self.game_name {
            let _ = uid;
            let _ = existing;
            return Ok(JoinGameNowOutcome::Admit(None));
        }

        self.room.is_open = false;
        self.game_name = Some(game_name.clone());

        let mut players = Vec::new();
        let mut team_order: Vec<u8> = (0..self.teams.len() as u8).collect();
        shuffle(&mut team_order);
        for &team_idx in &team_order {
            players.extend(self.teams[team_idx as usize].iter().cloned());
        }

        Ok(JoinGameNowOutcome::Admit(Some(GameSession {
            name: game_name,
            room: self.room.name.clone(),
            lobby: self.room.lobby.clone(),
            players,
            teams: self.teams.clone(),
            team_order,
            map_list: self.room.map_list.clone(),
            admins: self.room.admins.clone(),
            mods: self.room.mods.clone(),
            creation_ts: now,
        })))
    }

    /// Empty ≥ 120s, or unconditionally past the 6h age sweep (§4.6 "Retirement").
    /// Callers must keep a room with a live game out of this check entirely
    /// (§4.6 "a room with a started game remains in memory until its game
    /// ends or cleanup") — see `ScopeRegistry::sweep_rooms`.
    #[must_use]
    pub fn eligible_for_retirement(&self, now: i64, empty_retirement_secs: u64, max_age_secs: u64) -> bool {
        if now - self.room.creation_ts >= max_age_secs as i64 {
            return true;
        }
        match self.empty_since {
            Some(since) if self.clients.is_empty() => now - since >= empty_retirement_secs as i64,
            _ => false,
        }
    }

    pub fn retire(&mut self) {
        self.room.is_open = false;
        self.room.is_retired = true;
    }

    /// Drops the pointer to a game that has no clients left and restarts the
    /// empty-retirement clock, so the room gets a fresh grace window instead
    /// of retiring immediately off a stale `empty_since` left over from when
    /// its players moved into the game.
    pub fn clear_finished_game(&mut self, now: i64) {
        self.game_name = None;
        if self.clients.is_empty() {
            self.empty_since = Some(now);
        }
    }
}

/// Outcome of a `JOIN_GAME_NOW` attempt (§4.6 "Game promotion").
pub enum JoinGameNowOutcome {
    /// Admitted now: `Some(session)` the first time the game is actually
    /// constructed, `None` for every later caller piggybacking on it.
    Admit(Option<GameSession>),
    /// Arrived during the grace window; caller should sleep this many
    /// whole seconds and call again.
    Wait(u64),
}

fn shuffle(items: &mut [u8]) {
    for i in (1..items.len()).rev() {
        let j = fastrand::usize(0..=i);
        items.swap(i, j);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_room(player_limit: u8, n_teams: u8) -> Room {
        Room {
            name: "Alpha##a1b2".to_string(),
            lobby: "Alpha".to_string(),
            is_public: true,
            is_open: true,
            is_retired: false,
            join_code: "ABCDEF".to_string(),
            player_limit,
            n_teams,
            maps_required: 1,
            min_secs: 30,
            max_secs: 60,
            max_difficulty: 2,
            map_list: vec!["track-1".to_string()],
            game_start_time: NOT_SCHEDULED,
            game_start_forced: false,
            game_opts: HashMap::new(),
            admins: Vec::new(),
            mods: Vec::new(),
            kicked_players: Vec::new(),
            creation_ts: 0,
        }
    }

    #[test]
    fn join_rejects_kicked_player() {
        let mut room = sample_room(2, 2);
        room.kicked_players.push("u1".to_string());
        let mut runtime = RoomRuntime::new(room);
        assert!(runtime.join("u1").is_err());
    }

    #[test]
    fn join_rejects_over_capacity() {
        let mut runtime = RoomRuntime::new(sample_room(1, 1));
        runtime.join("u1").unwrap();
        assert!(runtime.join("u2").is_err());
    }

    #[test]
    fn full_readiness_and_teams_starts_countdown() {
        let mut runtime = RoomRuntime::new(sample_room(2, 2));
        runtime.join("u1").unwrap();
        runtime.join("u2").unwrap();
        runtime.join_team("u1", 0, 0).unwrap();
        runtime.join_team("u2", 1, 0).unwrap();
        assert_eq!(runtime.mark_ready("u1", true, 0, 5).unwrap(), RoomEvent::NoChange);
        let event = runtime.mark_ready("u2", true, 0, 5).unwrap();
        assert!(matches!(event, RoomEvent::CountdownStarted { forced: false, .. }));
        assert!(runtime.room.has_active_countdown());
        assert!(!runtime.room.is_open);
    }

    #[test]
    fn ready_flip_before_start_aborts_unforced_countdown() {
        let mut runtime = RoomRuntime::new(sample_room(2, 2));
        runtime.join("u1").unwrap();
        runtime.join("u2").unwrap();
        runtime.join_team("u1", 0, 0).unwrap();
        runtime.join_team("u2", 1, 0).unwrap();
        runtime.mark_ready("u1", true, 0, 5).unwrap();
        runtime.mark_ready("u2", true, 0, 5).unwrap();
        assert!(runtime.room.has_active_countdown());

        let event = runtime.mark_ready("u1", false, 1, 5).unwrap();
        assert_eq!(event, RoomEvent::CountdownAborted);
        assert!(!runtime.room.has_active_countdown());
        assert!(runtime.room.is_open);
    }

    #[test]
    fn force_started_countdown_resists_non_mod_abort() {
        let mut room = sample_room(2, 2);
        room.mods.push("mod1".to_string());
        let mut runtime = RoomRuntime::new(room);
        runtime.join("mod1").unwrap();
        runtime.join("u2").unwrap();
        runtime.join_team("mod1", 0, 0).unwrap();
        runtime.join_team("u2", 1, 0).unwrap();

        runtime.force_start("mod1", 0, 5).unwrap();
        assert!(runtime.room.game_start_forced);

        runtime.mark_ready("u2", true, 0, 5).unwrap();
        let event = runtime.mark_ready("u2", false, 1, 5).unwrap();
        assert_eq!(event, RoomEvent::NoChange);
        assert!(runtime.room.has_active_countdown(), "force-started countdown must survive a non-mod abort attempt");
    }

    #[test]
    fn force_start_requires_mod() {
        let mut runtime = RoomRuntime::new(sample_room(2, 2));
        runtime.join("u1").unwrap();
        assert!(runtime.force_start("u1", 0, 5).is_err());
    }

    #[test]
    fn join_game_now_refuses_arrival_well_before_grace_window() {
        let mut runtime = RoomRuntime::new(sample_room(2, 2));
        runtime.join("u1").unwrap();
        runtime.join("u2").unwrap();
        runtime.join_team("u1", 0, 0).unwrap();
        runtime.join_team("u2", 1, 0).unwrap();
        runtime.mark_ready("u1", true, 0, 5).unwrap();
        runtime.mark_ready("u2", true, 0, 5).unwrap();
        let start = runtime.room.game_start_time;
        let result = runtime.join_game_now("u1", start - 2, "Alpha##a1b2##g1".to_string(), 1);
        assert!(result.is_err());
    }

    #[test]
    fn join_game_now_admits_after_wait_inside_grace_window() {
        let mut runtime = RoomRuntime::new(sample_room(2, 2));
        runtime.join("u1").unwrap();
        runtime.join("u2").unwrap();
        runtime.join_team("u1", 0, 0).unwrap();
        runtime.join_team("u2", 1, 0).unwrap();
        runtime.mark_ready("u1", true, 0, 5).unwrap();
        runtime.mark_ready("u2", true, 0, 5).unwrap();
        let start = runtime.room.game_start_time;

        let outcome = runtime
            .join_game_now("u1", start - 1, "Alpha##a1b2##g1".to_string(), 1)
            .unwrap();
        let wait_secs = match outcome {
            JoinGameNowOutcome::Wait(secs) => secs,
            JoinGameNowOutcome::Admit(_) => panic!("expected a grace-period wait"),
        };
        assert_eq!(wait_secs, 1);

        let outcome = runtime
            .join_game_now("u1", start - 1 + wait_secs as i64, "Alpha##a1b2##g1".to_string(), 1)
            .unwrap();
        assert!(matches!(outcome, JoinGameNowOutcome::Admit(Some(_))));
    }

    #[test]
    fn join_game_now_constructs_game_session_once() {
        let mut runtime = RoomRuntime::new(sample_room(2, 2));
        runtime.join("u1").unwrap();
        runtime.join("u2").unwrap();
        runtime.join_team("u1", 0, 0).unwrap();
        runtime.join_team("u2", 1, 0).unwrap();
        runtime.mark_ready("u1", true, 0, 5).unwrap();
        runtime.mark_ready("u2", true, 0, 5).unwrap();
        let start = runtime.room.game_start_time;

        let first = runtime
            .join_game_now("u1", start, "Alpha##a1b2##g1".to_string(), 1)
            .unwrap();
        let session = match first {
            JoinGameNowOutcome::Admit(Some(session)) => session,
            _ => panic!("first caller after start_time should construct the session"),
        };
        assert_eq!(session.players.len(), 2);
        assert_eq!(session.team_order.len(), 2);

        let second = runtime
            .join_game_now("u2", start, "Alpha##a1b2##g1".to_string(), 1)
            .unwrap();
        assert!(
            matches!(second, JoinGameNowOutcome::Admit(None)),
            "promotion only constructs the session once"
        );
    }

    #[test]
    fn force_start_overrides_an_active_countdown() {
        let mut room = sample_room(2, 2);
        room.mods.push("mod1".to_string());
        let mut runtime = RoomRuntime::new(room);
        runtime.join("mod1").unwrap();
        runtime.join("u2").unwrap();
        runtime.join_team("mod1", 0, 0).unwrap();
        runtime.join_team("u2", 1, 0).unwrap();

        runtime.mark_ready("mod1", true, 0, 5).unwrap();
        runtime.mark_ready("u2", true, 0, 5).unwrap();
        assert!(runtime.room.has_active_countdown());
        assert!(!runtime.room.game_start_forced);

        let event = runtime.force_start("mod1", 1, 5).unwrap();
        assert!(matches!(event, RoomEvent::CountdownStarted { forced: true, .. }));
        assert!(runtime.room.game_start_forced);
        assert_eq!(runtime.room.game_start_time, 6);
    }

    #[test]
    fn clear_finished_game_resets_the_empty_window() {
        let mut runtime = RoomRuntime::new(sample_room(2, 2));
        runtime.game_name = Some("Alpha##a1b2##g1".to_string());
        runtime.empty_since = Some(0);
        runtime.clear_finished_game(100);
        assert!(runtime.game_name.is_none());
        assert_eq!(runtime.empty_since, Some(100));
    }

    #[test]
    fn retirement_triggers_after_empty_window() {
        let runtime = RoomRuntime::new(sample_room(2, 2));
        assert!(!runtime.eligible_for_retirement(0, 120, 21600));
    }

    #[test]
    fn retirement_triggers_after_max_age_regardless_of_occupancy() {
        let mut runtime = RoomRuntime::new(sample_room(2, 2));
        runtime.join("u1").unwrap();
        assert!(runtime.eligible_for_retirement(21600, 120, 21600));
    }

    #[test]
    fn invariant_ready_count_matches_ready_clients() {
        let mut runtime = RoomRuntime::new(sample_room(3, 2));
        runtime.join("u1").unwrap();
        runtime.join("u2").unwrap();
        runtime.join("u3").unwrap();
        runtime.join_team("u1", 0, 0).unwrap();
        runtime.join_team("u2", 1, 0).unwrap();
        runtime.join_team("u3", 1, 0).unwrap();
        runtime.mark_ready("u1", true, 0, 5).unwrap();
        runtime.mark_ready("u2", true, 0, 5).unwrap();
        assert_eq!(runtime.ready_count(), 2);
    }

    #[test]
    fn invariant_user_belongs_to_at_most_one_team() {
        let mut runtime = RoomRuntime::new(sample_room(2, 2));
        runtime.join("u1").unwrap();
        runtime.join_team("u1", 0, 0).unwrap();
        runtime.join_team("u1", 1, 0).unwrap();
        let memberships: usize = runtime.teams.iter().filter(|t| t.contains(&"u1".to_string())).count();
        assert_eq!(memberships, 1);
    }
}
