use crate::constants::MAX_PLAYERS;
use crate::telemetry::{GameEvent, GameEventKind, PlayerState, StateUpdate};
use serde_json::{json, Map, Value};

/// One decoded module-to-controller frame.
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryFrame {
    State(StateUpdate),
    Event(GameEvent),
}

impl TelemetryFrame {
    /// Classifies a line. JSON objects are read field by field; anything else falls back to
    /// substring inspection. Returns `None` for lines that are neither shape.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(obj)) => Self::from_object(&obj, line),
            _ => Self::from_text(line),
        }
    }

    fn from_object(obj: &Map<String, Value>, raw: &str) -> Option<Self> {
        let kind = obj.get("type").and_then(Value::as_str).unwrap_or_default();
        if kind.eq_ignore_ascii_case("gameState") || (kind.is_empty() && obj.contains_key("frame")) {
            return Some(TelemetryFrame::State(state_from_object(obj)));
        }
        if kind.eq_ignore_ascii_case("event") {
            let discriminator = ["event", "kind", "name"]
                .iter()
                .find_map(|k| obj.get(*k).and_then(Value::as_str))
                .and_then(GameEventKind::classify)
                .or_else(|| GameEventKind::classify(raw))?;
            return Some(TelemetryFrame::Event(GameEvent {
                kind: discriminator,
                player_id: u64_field(obj, &["player", "playerId"]).unwrap_or(0).min(u8::MAX as u64) as u8,
                timestamp: u64_field(obj, &["timestamp"]).unwrap_or(0),
                data: obj.get("data").map(value_text).unwrap_or_default(),
            }));
        }
        None
    }

    fn from_text(line: &str) -> Option<Self> {
        let compact: String = line.chars().filter(|c| !c.is_whitespace()).collect();
        if compact.contains("\"type\":\"gameState\"") || compact.contains("\"frame\":") {
            let frame = number_after(&compact, "\"frame\":").unwrap_or(0);
            return Some(TelemetryFrame::State(StateUpdate::frame(frame)));
        }
        if compact.contains("\"type\":\"event\"") {
            let kind = GameEventKind::classify(line)?;
            return Some(TelemetryFrame::Event(GameEvent::new(kind)));
        }
        None
    }

    /// Serializes to a single line without the trailing delimiter.
    pub fn to_line(&self) -> String {
        let value = match self {
            TelemetryFrame::State(update) => {
                let mut obj = Map::new();
                obj.insert("type".into(), json!("gameState"));
                obj.insert("frame".into(), json!(update.frame));
                if let Some(players) = &update.players {
                    let list: Vec<Value> = players.iter().take(MAX_PLAYERS).map(player_to_value).collect();
                    obj.insert("players".into(), Value::Array(list));
                }
                if let Some(n) = update.active_players {
                    obj.insert("activePlayers".into(), json!(n));
                }
                if let Some(stage) = update.stage {
                    obj.insert("stage".into(), json!(stage));
                }
                if let Some(in_game) = update.in_game {
                    obj.insert("inGame".into(), json!(in_game));
                }
                if let Some(paused) = update.paused {
                    obj.insert("paused".into(), json!(paused));
                }
                if let Some(timer) = update.timer {
                    obj.insert("timer".into(), json!(timer));
                }
                Value::Object(obj)
            }
            TelemetryFrame::Event(event) => json!({
                "type": "event",
                "event": event.kind.as_str(),
                "player": event.player_id,
                "timestamp": event.timestamp,
                "data": event.data,
            }),
        };
        value.to_string()
    }
}

fn state_from_object(obj: &Map<String, Value>) -> StateUpdate {
    StateUpdate {
        frame: u64_field(obj, &["frame", "frameCount"]).unwrap_or(0),
        players: obj
            .get("players")
            .and_then(Value::as_array)
            .map(|list| list.iter().map(player_from_value).collect()),
        active_players: u64_field(obj, &["activePlayers", "activePlayerCount"]).map(|n| n.min(MAX_PLAYERS as u64) as u8),
        stage: u64_field(obj, &["stage"]).map(|n| n.min(u16::MAX as u64) as u16),
        in_game: bool_field(obj, &["inGame"]),
        paused: bool_field(obj, &["paused"]),
        timer: u64_field(obj, &["timer", "gameTimer"]).map(|n| n.min(u32::MAX as u64) as u32),
    }
}

fn player_from_value(value: &Value) -> PlayerState {
    let Some(obj) = value.as_object() else {
        return PlayerState::default();
    };
    PlayerState {
        position_x: f64_field(obj, &["x", "positionX"]).unwrap_or(0.0) as f32,
        position_y: f64_field(obj, &["y", "positionY"]).unwrap_or(0.0) as f32,
        damage: f64_field(obj, &["damage", "percent"]).unwrap_or(0.0) as f32,
        stocks: u64_field(obj, &["stocks"]).unwrap_or(0).min(u8::MAX as u64) as u8,
        character: u64_field(obj, &["character"]).unwrap_or(0).min(u16::MAX as u64) as u16,
        action_state: u64_field(obj, &["action", "actionState"]).unwrap_or(0).min(u16::MAX as u64) as u16,
        in_hitstun: bool_field(obj, &["hitstun", "inHitstun"]).unwrap_or(false),
        in_shieldstun: bool_field(obj, &["shieldstun", "inShieldstun"]).unwrap_or(false),
        offstage: bool_field(obj, &["offstage"]).unwrap_or(false),
    }
}

fn player_to_value(p: &PlayerState) -> Value {
    json!({
        "x": p.position_x,
        "y": p.position_y,
        "damage": p.damage,
        "stocks": p.stocks,
        "character": p.character,
        "action": p.action_state,
        "hitstun": p.in_hitstun,
        "shieldstun": p.in_shieldstun,
        "offstage": p.offstage,
    })
}

fn u64_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|k| {
        let v = obj.get(*k)?;
        v.as_u64().or_else(|| v.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
    })
}

fn f64_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| obj.get(*k)?.as_f64())
}

fn bool_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<bool> {
    keys.iter().find_map(|k| match obj.get(*k)? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        _ => None,
    })
}

fn value_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn number_after(haystack: &str, key: &str) -> Option<u64> {
    let start = haystack.find(key)? + key.len();
    let digits: String = haystack[start..].chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_state_frame() {
        let frame = TelemetryFrame::parse(r#"{"type":"gameState","frame":120}"#);
        assert_eq!(frame, Some(TelemetryFrame::State(StateUpdate::frame(120))));
    }

    #[test]
    fn state_frame_with_players_and_unknown_fields() {
        let line = r#"{"type":"gameState","frame":7,"stage":31,"inGame":true,"mystery":[1,2],
            "players":[{"x":1.5,"y":-2,"damage":37.0,"stocks":4,"hitstun":1},{"bogus":true}]}"#;
        let Some(TelemetryFrame::State(update)) = TelemetryFrame::parse(line) else {
            panic!("expected a state frame");
        };
        assert_eq!(update.frame, 7);
        assert_eq!(update.stage, Some(31));
        assert_eq!(update.in_game, Some(true));
        assert_eq!(update.paused, None);
        let players = update.players.expect("players present");
        assert_eq!(players.len(), 2);
        assert_eq!(players[0].position_x, 1.5);
        assert_eq!(players[0].stocks, 4);
        assert!(players[0].in_hitstun);
        assert_eq!(players[1], PlayerState::default());
    }

    #[test]
    fn wrongly_typed_frame_counts_as_zero() {
        let frame = TelemetryFrame::parse(r#"{"type":"gameState","frame":"soon"}"#);
        assert_eq!(frame, Some(TelemetryFrame::State(StateUpdate::frame(0))));
    }

    #[test]
    fn event_frame_by_discriminator() {
        let frame = TelemetryFrame::parse(r#"{"type":"event","event":"comboStart","player":2,"timestamp":99}"#);
        let Some(TelemetryFrame::Event(ev)) = frame else { panic!("expected event") };
        assert_eq!(ev.kind, GameEventKind::ComboStart);
        assert_eq!(ev.player_id, 2);
        assert_eq!(ev.timestamp, 99);
    }

    #[test]
    fn event_frame_by_raw_substring() {
        let frame = TelemetryFrame::parse(r#"{"type":"event","details":"player got a kill"}"#);
        assert!(matches!(frame, Some(TelemetryFrame::Event(GameEvent { kind: GameEventKind::Kill, .. }))));
    }

    #[test]
    fn non_json_falls_back_to_substrings() {
        let frame = TelemetryFrame::parse(r#"{"type": "gameState", "frame": 42, oops"#);
        assert_eq!(frame, Some(TelemetryFrame::State(StateUpdate::frame(42))));
        let frame = TelemetryFrame::parse(r#"{"type":"event" stock lost"#);
        assert!(matches!(frame, Some(TelemetryFrame::Event(GameEvent { kind: GameEventKind::StockLost, .. }))));
    }

    #[test]
    fn unrelated_lines_are_ignored() {
        assert_eq!(TelemetryFrame::parse(""), None);
        assert_eq!(TelemetryFrame::parse("hello"), None);
        assert_eq!(TelemetryFrame::parse(r#"{"type":"overlay","text":"x"}"#), None);
        assert_eq!(TelemetryFrame::parse(r#"{"type":"event","event":"unknown"}"#), None);
    }

    #[test]
    fn serialized_frames_parse_back() {
        let update = StateUpdate {
            frame: 3600,
            players: Some(vec![PlayerState { damage: 12.0, stocks: 2, ..PlayerState::default() }]),
            stage: Some(8),
            paused: Some(false),
            ..StateUpdate::default()
        };
        let state = TelemetryFrame::State(update);
        assert_eq!(TelemetryFrame::parse(&state.to_line()), Some(state));

        let event = TelemetryFrame::Event(GameEvent {
            kind: GameEventKind::Edgeguard,
            player_id: 1,
            timestamp: 10,
            data: "ledge".into(),
        });
        assert_eq!(TelemetryFrame::parse(&event.to_line()), Some(event));
    }
}
