// Состояние обмена (orchestrator FSM)

pub mod exchange;
