use serde::{Deserialize, Serialize};

/// Opaque ID types for type safety
pub type RoomCode = String;
pub type ParticipantId = String;
pub type ItemId = String;

/// Number of seats around the table; a session starts with exactly this many participants
pub const TABLE_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Lobby,
    Day,
    OvertimeVote,
    OvertimeOutcome,
    Review,
    Night,
}

impl Phase {
    /// Phases during which the shared countdown runs
    pub fn has_countdown(&self) -> bool {
        matches!(self, Phase::Day | Phase::Night | Phase::Review)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewPhase {
    #[default]
    Idle,
    Discussion,
    Voting,
    Processing,
    Result,
    Reward,
    Elimination,
    Summary,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NightStep {
    #[default]
    Idle,
    Auditor,
    Accountant,
    Director,
    Antagonist,
    Results,
}

impl NightStep {
    /// The step that follows this one in the fixed wake order
    pub fn next(&self) -> NightStep {
        match self {
            NightStep::Idle => NightStep::Auditor,
            NightStep::Auditor => NightStep::Accountant,
            NightStep::Accountant => NightStep::Director,
            NightStep::Director => NightStep::Antagonist,
            NightStep::Antagonist | NightStep::Results => NightStep::Results,
        }
    }

    /// The role woken during this step, for single-role steps
    pub fn role(&self) -> Option<Role> {
        match self {
            NightStep::Auditor => Some(Role::Auditor),
            NightStep::Accountant => Some(Role::Accountant),
            NightStep::Director => Some(Role::OperationsDirector),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    OperationsDirector,
    Auditor,
    Accountant,
    DefaultRole,
    Antagonist,
    SafetyOfficer,
    Headhunter,
    Mole,
}

impl Role {
    pub fn sector(&self) -> Sector {
        match self {
            Role::Antagonist => Sector::It,
            Role::Accountant => Sector::Finance,
            Role::Headhunter => Sector::Hr,
            Role::SafetyOfficer => Sector::Operations,
            _ => Sector::Board,
        }
    }

    pub fn faction(&self) -> Faction {
        match self {
            Role::Antagonist | Role::SafetyOfficer | Role::Headhunter | Role::Mole => {
                Faction::Competition
            }
            _ => Faction::Board,
        }
    }

    /// Roles whose loss costs project progress while a SafetyOfficer is still around
    pub fn is_protected_staff(&self) -> bool {
        matches!(
            self,
            Role::Auditor | Role::Accountant | Role::OperationsDirector | Role::DefaultRole
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Sector {
    It,
    Hr,
    Finance,
    Operations,
    Board,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Faction {
    /// Cooperative majority
    Board,
    /// Antagonist minority
    Competition,
}

/// Fixed ring of seats, listed clockwise from the bottom
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum Seat {
    Bottom,
    BottomLeft,
    Left,
    TopLeft,
    Top,
    TopRight,
    Right,
    BottomRight,
}

impl Seat {
    pub const RING: [Seat; TABLE_SIZE] = [
        Seat::Bottom,
        Seat::BottomLeft,
        Seat::Left,
        Seat::TopLeft,
        Seat::Top,
        Seat::TopRight,
        Seat::Right,
        Seat::BottomRight,
    ];
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Winner {
    /// Project progress reached 100
    Board,
    /// Budget ran out
    Competition,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewVerdict {
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OvertimeOutcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub phase: Phase,
    pub round: u32,
    pub progress: u8,
    pub budget: u8,
    pub time_remaining: u32,
    pub winner: Option<Winner>,
    pub has_used_overtime: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            phase: Phase::Lobby,
            round: 1,
            progress: 0,
            budget: 100,
            time_remaining: 600,
            winner: None,
            has_used_overtime: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemKind {
    SickLeave,
    Nda,
    Audit,
    Bonus,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InventoryItem {
    pub id: ItemId,
    pub label: String,
    pub kind: ItemKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub label: String,
    pub completed: bool,
}

impl Default for Task {
    fn default() -> Self {
        Self {
            label: "Interrupt a digression".to_string(),
            completed: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Participant {
    pub id: ParticipantId,
    /// Secret used to resume a connection; never leaves the server
    #[serde(skip_serializing, default)]
    pub token: String,
    pub display_name: String,
    pub role: Role,
    pub sector: Sector,
    pub seat: Option<Seat>,
    pub is_eliminated: bool,
    pub is_coordinator: bool,
    pub is_bot: bool,
    #[serde(default)]
    pub inventory: Vec<InventoryItem>,
    #[serde(default)]
    pub task: Task,
}

impl Participant {
    /// `id` is drawn by the room so that a seeded room replays identically;
    /// the token stays a fresh secret.
    pub fn new(id: ParticipantId, display_name: String, is_coordinator: bool, is_bot: bool) -> Self {
        let role = Role::DefaultRole;
        Self {
            id,
            token: ulid::Ulid::new().to_string(),
            display_name,
            role,
            sector: role.sector(),
            seat: None,
            is_eliminated: false,
            is_coordinator,
            is_bot,
            inventory: Vec::new(),
            task: Task::default(),
        }
    }

    pub fn is_alive(&self) -> bool {
        !self.is_eliminated
    }

    pub fn assign(&mut self, role: Role, seat: Seat) {
        self.role = role;
        self.sector = role.sector();
        self.seat = Some(seat);
    }
}

/// Timings and tunables for one session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub day_seconds: u32,
    pub overtime_vote_seconds: u32,
    pub overtime_bonus_seconds: u32,
    pub overtime_budget_cost: u8,
    pub discussion_seconds: u32,
    pub review_processing_ms: u64,
    pub review_result_ms: u64,
    pub reward_display_ms: u64,
    pub elimination_processing_ms: u64,
    pub overtime_outcome_ms: u64,
    pub night_intro_ms: u64,
    pub night_kill_reveal_ms: u64,
    pub night_results_ms: u64,
    pub summary_seconds: u32,
    pub bot_min_delay_ms: u64,
    pub bot_max_delay_ms: u64,
    pub bot_yes_probability: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            day_seconds: 600,
            overtime_vote_seconds: 15,
            overtime_bonus_seconds: 180,
            overtime_budget_cost: 5,
            discussion_seconds: 180,
            review_processing_ms: 1000,
            review_result_ms: 1500,
            reward_display_ms: 3500,
            elimination_processing_ms: 2000,
            overtime_outcome_ms: 3000,
            night_intro_ms: 2000,
            night_kill_reveal_ms: 1500,
            night_results_ms: 2000,
            summary_seconds: 20,
            bot_min_delay_ms: 1500,
            bot_max_delay_ms: 4000,
            bot_yes_probability: 0.7,
        }
    }
}
