use crate::constants::MAX_PLAYERS;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlayerState {
    pub position_x: f32,
    pub position_y: f32,
    pub damage: f32,
    pub stocks: u8,
    pub character: u16,
    pub action_state: u16,
    pub in_hitstun: bool,
    pub in_shieldstun: bool,
    pub offstage: bool,
}

/// Latest known state of the running match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GameState {
    pub players: [PlayerState; MAX_PLAYERS],
    pub active_player_count: u8,
    pub frame_count: u64,
    pub stage: u16,
    pub in_game: bool,
    pub paused: bool,
    pub game_timer: u32,
}

/// One parsed state-update frame. Only the frame counter is mandatory; everything the sender
/// left out stays `None` and leaves the current state untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    pub frame: u64,
    pub players: Option<Vec<PlayerState>>,
    pub active_players: Option<u8>,
    pub stage: Option<u16>,
    pub in_game: Option<bool>,
    pub paused: Option<bool>,
    pub timer: Option<u32>,
}

impl StateUpdate {
    pub fn frame(frame: u64) -> Self {
        Self { frame, ..Self::default() }
    }
}

impl GameState {
    /// Applies an update in place. Extra player entries beyond `MAX_PLAYERS` are ignored.
    pub fn apply(&mut self, update: &StateUpdate) {
        self.frame_count = update.frame;
        if let Some(players) = &update.players {
            for (slot, player) in self.players.iter_mut().zip(players.iter()) {
                *slot = *player;
            }
        }
        if let Some(n) = update.active_players {
            self.active_player_count = n.min(MAX_PLAYERS as u8);
        }
        if let Some(stage) = update.stage {
            self.stage = stage;
        }
        if let Some(in_game) = update.in_game {
            self.in_game = in_game;
        }
        if let Some(paused) = update.paused {
            self.paused = paused;
        }
        if let Some(timer) = update.timer {
            self.game_timer = timer;
        }
    }
}
