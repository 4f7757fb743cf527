// LLM module

pub mod gateway;
pub mod history;

pub use gateway::{AiGateway, EMPTY_RESPONSE_FALLBACK, GATEWAY_FAILURE_FALLBACK};
pub use history::{
    build_history, CoachingRole, CoachingTurn, ConverseRequest, DialogueRole, DialogueTurn,
    HistoryPolicy,
};
