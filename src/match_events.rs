use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Home,
    Away,
}

impl Side {
    fn index(self) -> usize {
        match self {
            Side::Home => 0,
            Side::Away => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Goal,
    /// Straight red or second yellow.
    SendingOff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchEvent {
    pub side: Side,
    pub kind: EventKind,
    pub minute: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EventTally {
    pub goals_home: u32,
    pub goals_away: u32,
    pub adjusted_home: f64,
    pub adjusted_away: f64,
}

const GOAL_VALUE: f64 = 1.05;
const LATE_LEAD_MINUTE: u32 = 70;
const MAN_ADVANTAGE_FACTOR: f64 = 0.8;

/// Replays goal and sending-off events in order and returns goals plus
/// adjusted goals per side.
///
/// Goals scored after the 70th minute by a side already in front count for
/// less the later they come; goals scored while the opponent is down to
/// fewer players are discounted by a fifth.
pub fn tally(events: &[MatchEvent]) -> EventTally {
    let mut goals = [0u32; 2];
    let mut sent_off = [0u32; 2];
    let mut adjusted = [0.0_f64; 2];

    for e in events {
        let us = e.side.index();
        let them = 1 - us;
        match e.kind {
            EventKind::Goal => {
                let mut value = if e.minute > LATE_LEAD_MINUTE && goals[us] > goals[them] {
                    0.5 + 0.025 * (90.0 - e.minute as f64)
                } else {
                    GOAL_VALUE
                };
                if sent_off[us] < sent_off[them] {
                    value *= MAN_ADVANTAGE_FACTOR;
                }
                goals[us] += 1;
                adjusted[us] += value;
            }
            EventKind::SendingOff => sent_off[us] += 1,
        }
    }

    EventTally {
        goals_home: goals[0],
        goals_away: goals[1],
        adjusted_home: adjusted[0],
        adjusted_away: adjusted[1],
    }
}
