pub mod error;
pub mod model;
pub mod registry;

pub use error::RoomError;
pub use model::{
    GamePhase, GameRound, LeftPlayer, Player, Room, RoomSettings, RoomSignals, RoomSummary,
    TurnFlag,
};
pub use registry::{JoinOutcome, LeaveOutcome, RoomRegistry};
