//! 核心编排层：错误类型、后台任务调度、策略规划、回合主控

pub mod error;
pub mod orchestrator;
pub mod planner;
pub mod scheduler;

pub use error::AgentError;
pub use orchestrator::{create_oracle_from_config, TurnOrchestrator};
pub use planner::{FocusPlan, StrategicPlanner};
pub use scheduler::{CollectingScheduler, NoopScheduler, TaskScheduler, TokioScheduler};
