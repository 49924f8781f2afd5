//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::domain::{Assignment, MasteryStatus, MiniCourse, ScaffoldingTask};

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    /// Start (or restart) the micro-task countdown and stream its ticks.
    WatchCountdown {
        #[serde(rename = "assignmentId")]
        assignment_id: String,
    },
    StopCountdown {
        #[serde(rename = "assignmentId")]
        assignment_id: String,
    },
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Countdown {
        #[serde(rename = "assignmentId")]
        assignment_id: String,
        #[serde(rename = "remainingSeconds")]
        remaining_seconds: u32,
    },
    CountdownStopped {
        #[serde(rename = "assignmentId")]
        assignment_id: String,
    },
    Error {
        message: String,
    },
}

//
// HTTP request/response DTOs
//

/// Assignment plus the freshly computed freeze flag.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentOut {
    #[serde(flatten)]
    pub assignment: Assignment,
    pub academic_freeze: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MiniCourseOut {
    pub mini_course: MiniCourse,
    pub gate_open: bool,
}

#[derive(Deserialize)]
pub struct TurnIn {
    pub text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeOut {
    pub mastery_status: MasteryStatus,
    pub final_tension: f32,
    pub assignment: Assignment,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaffoldingOut {
    pub task: ScaffoldingTask,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountdownOut {
    pub remaining_seconds: u32,
}

#[derive(Serialize)]
pub struct ErrorOut {
    pub error: &'static str,
    pub message: String,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}
