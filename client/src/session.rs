//! Protocol side of a client session.
//!
//! `SessionCore` holds no socket. The network driver feeds it server messages
//! and ticks, and sends whatever it returns. This keeps the handshake and
//! change-detection logic testable without a relay.

use crate::reconciler::{ReconcileOutcome, Reconciler, ReconcilerConfig};
use log::{debug, info, warn};
use shared::{
    ChatMessage, ClientMessage, DamageEvent, MapId, MonsterId, MonsterState, PlayerId, PlayerState,
    PlayerUpdate, ServerMessage, Stance,
};
use std::collections::VecDeque;
use std::time::Duration;

pub const UPDATE_INTERVAL: Duration = Duration::from_millis(100);
/// Movement smaller than this on both axes is not worth an update.
pub const POSITION_EPSILON: f32 = 1.0;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub update_interval: Duration,
    pub position_epsilon: f32,
    pub reconciler: ReconcilerConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            update_interval: UPDATE_INTERVAL,
            position_epsilon: POSITION_EPSILON,
            reconciler: ReconcilerConfig::default(),
        }
    }
}

/// Things the embedding game may want to show
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Registered(PlayerId),
    Chat(ChatMessage),
    /// Damage another player dealt in the local map
    MonsterDamage(DamageEvent),
    MonsterUpdate(MonsterState),
    ServerError(String),
}

/// What was last sent, for change detection
#[derive(Debug, Clone, PartialEq)]
struct SentState {
    x: f32,
    y: f32,
    stance: Stance,
    frame: u32,
    flipped: bool,
    attacking: bool,
    map_id: MapId,
}

impl SentState {
    fn of(state: &PlayerState) -> Self {
        Self {
            x: state.x,
            y: state.y,
            stance: state.stance.clone(),
            frame: state.frame,
            flipped: state.flipped,
            attacking: state.attacking,
            map_id: state.map_id,
        }
    }

    fn differs_from(&self, state: &PlayerState, epsilon: f32) -> bool {
        let moved = (state.x - self.x).abs() > epsilon || (state.y - self.y).abs() > epsilon;
        moved
            || state.stance != self.stance
            || state.frame != self.frame
            || state.flipped != self.flipped
            || state.attacking != self.attacking
            || state.map_id != self.map_id
    }
}

pub struct SessionCore {
    config: SessionConfig,
    player_id: Option<PlayerId>,
    last_sent: Option<SentState>,
    reconciler: Reconciler,
    events: VecDeque<SessionEvent>,
}

impl SessionCore {
    pub fn new(config: SessionConfig) -> Self {
        let reconciler = Reconciler::new(config.reconciler.clone());
        Self {
            config,
            player_id: None,
            last_sent: None,
            reconciler,
            events: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn player_id(&self) -> Option<PlayerId> {
        self.player_id
    }

    pub fn is_registered(&self) -> bool {
        self.player_id.is_some()
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn reconciler_mut(&mut self) -> &mut Reconciler {
        &mut self.reconciler
    }

    /// A fresh socket is open. Everything learned over the old one is stale.
    pub fn on_open(&mut self) {
        self.player_id = None;
        self.last_sent = None;
        self.reconciler.reset();
    }

    /// Applies one server message and returns the replies to send.
    pub fn handle(&mut self, message: ServerMessage, local: &PlayerState) -> Vec<ClientMessage> {
        match message {
            ServerMessage::PlayerId(id) => return self.register(id, local),
            ServerMessage::PlayerJoined(player) => {
                if self.reconciler.apply_joined(&player) == ReconcileOutcome::Spawned {
                    info!("{} joined the map", player.name);
                }
            }
            ServerMessage::PlayerLeft(id) => {
                if self.reconciler.apply_left(&id) == ReconcileOutcome::Removed {
                    debug!("Player {} left the map", id);
                }
            }
            ServerMessage::PlayerUpdate(player) => {
                self.reconciler.apply_update(&player);
            }
            ServerMessage::PlayerList(players) => {
                self.reconciler.apply_roster(&players);
                debug!("Roster applied: {} remote player(s)", self.reconciler.len());
            }
            ServerMessage::ChatMessage(chat) => {
                if chat.map_id == local.map_id && Some(chat.player_id) != self.player_id {
                    self.events.push_back(SessionEvent::Chat(chat));
                }
            }
            ServerMessage::MonsterDamage(event) => {
                if event.map_id == local.map_id && Some(event.source_id) != self.player_id {
                    self.events.push_back(SessionEvent::MonsterDamage(event));
                }
            }
            ServerMessage::MonsterUpdate(monster) => {
                if monster.map_id == local.map_id {
                    self.events.push_back(SessionEvent::MonsterUpdate(monster));
                }
            }
            ServerMessage::Error(reason) => {
                warn!("Server error: {}", reason);
                self.events.push_back(SessionEvent::ServerError(reason));
            }
        }
        Vec::new()
    }

    /// Called every update interval. Returns an update only if the local
    /// player moved past the epsilon or a discrete field changed.
    pub fn tick(&mut self, local: &PlayerState) -> Option<ClientMessage> {
        self.player_id?;

        if self.reconciler.local_map() != Some(local.map_id) {
            self.reconciler.set_local_map(local.map_id);
        }

        let changed = match &self.last_sent {
            Some(last) => last.differs_from(local, self.config.position_epsilon),
            None => true,
        };
        if !changed {
            return None;
        }

        self.last_sent = Some(SentState::of(local));
        Some(ClientMessage::PlayerUpdate(PlayerUpdate::snapshot_of(local)))
    }

    pub fn send_chat(&self, text: &str, local: &PlayerState) -> Option<ClientMessage> {
        let player_id = self.player_id?;
        Some(ClientMessage::ChatMessage(ChatMessage {
            player_id,
            message: text.to_string(),
            map_id: local.map_id,
        }))
    }

    pub fn report_damage(
        &self,
        target: MonsterId,
        damage: u32,
        max_hp: Option<u32>,
        local: &PlayerState,
    ) -> Option<ClientMessage> {
        let source_id = self.player_id?;
        Some(ClientMessage::MonsterDamage(DamageEvent {
            source_id,
            target_id: target,
            damage,
            map_id: local.map_id,
            max_hp,
        }))
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        self.events.drain(..).collect()
    }

    fn register(&mut self, id: PlayerId, local: &PlayerState) -> Vec<ClientMessage> {
        info!("Assigned player id {}", id);
        self.player_id = Some(id);
        self.reconciler.set_local_player(id);
        self.reconciler.set_local_map(local.map_id);

        let mut info = local.clone();
        info.id = id;
        self.last_sent = Some(SentState::of(local));
        self.events.push_back(SessionEvent::Registered(id));

        vec![ClientMessage::PlayerInfo(info), ClientMessage::GetPlayerList]
    }
}

impl Default for SessionCore {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAP: MapId = MapId::new(100000000);

    fn local() -> PlayerState {
        PlayerState::new(PlayerId::default(), MAP).at(10.0, 20.0)
    }

    fn registered() -> (SessionCore, PlayerId) {
        let mut session = SessionCore::default();
        let id = PlayerId::generate();
        session.handle(ServerMessage::PlayerId(id), &local());
        session.drain_events();
        (session, id)
    }

    #[test]
    fn test_handshake_sends_info_then_roster_request() {
        let mut session = SessionCore::default();
        let id = PlayerId::generate();

        let replies = session.handle(ServerMessage::PlayerId(id), &local());

        match replies.as_slice() {
            [ClientMessage::PlayerInfo(info), ClientMessage::GetPlayerList] => {
                assert_eq!(info.id, id);
                assert_eq!(info.map_id, MAP);
            }
            other => panic!("Unexpected replies: {:?}", other),
        }
        assert_eq!(session.drain_events(), vec![SessionEvent::Registered(id)]);
        assert_eq!(session.reconciler().local_map(), Some(MAP));
    }

    #[test]
    fn test_nothing_is_sent_before_registration() {
        let mut session = SessionCore::default();

        assert!(session.tick(&local()).is_none());
        assert!(session.send_chat("hi", &local()).is_none());
        assert!(session.report_damage(1, 10, None, &local()).is_none());
    }

    #[test]
    fn test_tick_is_gated_on_change() {
        let (mut session, _) = registered();
        let mut me = local();

        assert!(session.tick(&me).is_none(), "nothing changed since player_info");

        me.x += 0.5;
        assert!(session.tick(&me).is_none());
        me.x += 0.7;
        assert!(matches!(session.tick(&me), Some(ClientMessage::PlayerUpdate(u)) if u.x == Some(me.x)));
        assert!(session.tick(&me).is_none());

        me.stance = Stance::Jump;
        assert!(session.tick(&me).is_some());

        me.flipped = true;
        assert!(session.tick(&me).is_some());

        me.attacking = true;
        assert!(session.tick(&me).is_some());
        assert!(session.tick(&me).is_none());
    }

    #[test]
    fn test_map_change_is_sent_and_clears_remotes() {
        let (mut session, _) = registered();
        let mut me = local();
        session.handle(
            ServerMessage::PlayerJoined(PlayerState::new(PlayerId::generate(), MAP)),
            &me,
        );
        assert_eq!(session.reconciler().len(), 1);

        me.map_id = MapId::new(2);
        match session.tick(&me) {
            Some(ClientMessage::PlayerUpdate(update)) => assert_eq!(update.map_id, Some(MapId::new(2))),
            other => panic!("Unexpected tick: {:?}", other),
        }
        assert!(session.reconciler().is_empty());
    }

    #[test]
    fn test_remote_messages_feed_reconciler() {
        let (mut session, _) = registered();
        let me = local();
        let peer = PlayerId::generate();

        session.handle(ServerMessage::PlayerList(vec![PlayerState::new(peer, MAP)]), &me);
        assert!(session.reconciler().get(&peer).is_some());

        session.handle(ServerMessage::PlayerUpdate(PlayerState::new(peer, MAP).at(30.0, 0.0)), &me);
        assert!(!session.reconciler().get(&peer).unwrap().is_at_rest());

        session.handle(ServerMessage::PlayerLeft(peer), &me);
        assert!(session.reconciler().is_empty());
    }

    #[test]
    fn test_events_skip_own_and_other_maps() {
        let (mut session, me_id) = registered();
        let me = local();
        let peer = PlayerId::generate();

        let chat = |player_id, map_id| ChatMessage {
            player_id,
            message: "hello".to_string(),
            map_id,
        };
        session.handle(ServerMessage::ChatMessage(chat(me_id, MAP)), &me);
        session.handle(ServerMessage::ChatMessage(chat(peer, MapId::new(9))), &me);
        session.handle(ServerMessage::ChatMessage(chat(peer, MAP)), &me);

        let damage = |source_id| DamageEvent {
            source_id,
            target_id: 3,
            damage: 10,
            map_id: MAP,
            max_hp: None,
        };
        session.handle(ServerMessage::MonsterDamage(damage(me_id)), &me);
        session.handle(ServerMessage::MonsterDamage(damage(peer)), &me);
        session.handle(ServerMessage::Error("nope".to_string()), &me);

        assert_eq!(
            session.drain_events(),
            vec![
                SessionEvent::Chat(chat(peer, MAP)),
                SessionEvent::MonsterDamage(damage(peer)),
                SessionEvent::ServerError("nope".to_string()),
            ]
        );
    }

    #[test]
    fn test_chat_and_damage_carry_identity() {
        let (session, id) = registered();
        let me = local();

        match session.send_chat("hey", &me) {
            Some(ClientMessage::ChatMessage(chat)) => {
                assert_eq!(chat.player_id, id);
                assert_eq!(chat.map_id, MAP);
            }
            other => panic!("Unexpected: {:?}", other),
        }
        match session.report_damage(5, 40, Some(200), &me) {
            Some(ClientMessage::MonsterDamage(event)) => {
                assert_eq!((event.source_id, event.target_id, event.damage), (id, 5, 40));
                assert_eq!(event.max_hp, Some(200));
            }
            other => panic!("Unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_reopen_forgets_previous_session() {
        let (mut session, _) = registered();
        session.handle(
            ServerMessage::PlayerJoined(PlayerState::new(PlayerId::generate(), MAP)),
            &local(),
        );

        session.on_open();

        assert!(!session.is_registered());
        assert!(session.reconciler().is_empty());
        assert!(session.tick(&local()).is_none());
    }
}
