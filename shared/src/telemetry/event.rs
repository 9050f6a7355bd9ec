use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameEventKind {
    GameStart,
    GameEnd,
    StockLost,
    ComboStart,
    ComboEnd,
    Kill,
    Tech,
    Edgeguard,
    NeutralWin,
}

/// Discriminator substrings in match priority. More specific needles come first so that
/// "comboEnd" is not taken for a combo start.
const KIND_NEEDLES: &[(&str, GameEventKind)] = &[
    ("comboend", GameEventKind::ComboEnd),
    ("combo", GameEventKind::ComboStart),
    ("kill", GameEventKind::Kill),
    ("stock", GameEventKind::StockLost),
    ("gamestart", GameEventKind::GameStart),
    ("gameend", GameEventKind::GameEnd),
    ("edgeguard", GameEventKind::Edgeguard),
    ("neutral", GameEventKind::NeutralWin),
    ("tech", GameEventKind::Tech),
];

impl GameEventKind {
    /// Wire name written by the relay.
    pub fn as_str(&self) -> &'static str {
        match self {
            GameEventKind::GameStart => "gameStart",
            GameEventKind::GameEnd => "gameEnd",
            GameEventKind::StockLost => "stockLost",
            GameEventKind::ComboStart => "comboStart",
            GameEventKind::ComboEnd => "comboEnd",
            GameEventKind::Kill => "kill",
            GameEventKind::Tech => "tech",
            GameEventKind::Edgeguard => "edgeguard",
            GameEventKind::NeutralWin => "neutralWin",
        }
    }

    /// Classifies free text by substring inspection. Case, underscores, dashes and spaces are
    /// ignored, so `combo_end`, `Combo End` and `comboEnd` all match.
    pub fn classify(text: &str) -> Option<Self> {
        let folded: String = text
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .flat_map(char::to_lowercase)
            .collect();
        KIND_NEEDLES
            .iter()
            .find(|(needle, _)| folded.contains(needle))
            .map(|(_, kind)| *kind)
    }
}

impl fmt::Display for GameEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GameEvent {
    pub kind: GameEventKind,
    pub player_id: u8,
    /// Milliseconds, sender's clock.
    pub timestamp: u64,
    pub data: String,
}

impl GameEvent {
    pub fn new(kind: GameEventKind) -> Self {
        Self { kind, player_id: 0, timestamp: 0, data: String::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_by_substring() {
        assert_eq!(GameEventKind::classify("big combo!"), Some(GameEventKind::ComboStart));
        assert_eq!(GameEventKind::classify("COMBO_END"), Some(GameEventKind::ComboEnd));
        assert_eq!(GameEventKind::classify("player kill"), Some(GameEventKind::Kill));
        assert_eq!(GameEventKind::classify("stock lost"), Some(GameEventKind::StockLost));
        assert_eq!(GameEventKind::classify("Game-Start"), Some(GameEventKind::GameStart));
        assert_eq!(GameEventKind::classify("hello"), None);
    }

    #[test]
    fn wire_names_classify_to_themselves() {
        for (_, kind) in KIND_NEEDLES {
            assert_eq!(GameEventKind::classify(kind.as_str()), Some(*kind));
        }
    }
}
