//! 策略规划：目标状态机与战术焦点
//!
//! 每回合只推进当前聚焦的目标：对应字段已经有值则转 SUCCESS（预算清零、焦点清空），
//! 否则预算减一、归零转 FAILURE。焦点为空时让预言机在非终态目标里选新焦点，
//! 预言机不可用则按固定优先级兜底。终态目标永不再被聚焦。

use crate::oracle::GenerationOracle;
use crate::session::{Session, TargetKey, TargetPhase, TargetState};

/// 优先目标：全部到达终态即任务完成（phone/ifsc/email 不阻塞完成判定）
pub const PRIORITY_TARGETS: [TargetKey; 4] = [
    TargetKey::Upi,
    TargetKey::BankAccount,
    TargetKey::Url,
    TargetKey::Ip,
];

/// 新聚焦目标的尝试预算
const TARGET_BUDGET: u8 = 3;

/// 本回合的战术计划
#[derive(Debug, Clone)]
pub struct FocusPlan {
    pub focus: Option<TargetKey>,
    /// 提供给回复生成的目标指令；无焦点时退化为拖延话术
    pub instruction: String,
}

/// 策略规划器
#[derive(Default)]
pub struct StrategicPlanner;

impl StrategicPlanner {
    pub fn new() -> Self {
        Self
    }

    /// 推进状态机并决定本回合焦点。直接修改传入会话的 strategy；持久化由调用方负责。
    pub async fn update_and_get_focus(
        &self,
        session: &mut Session,
        oracle: &dyn GenerationOracle,
        incoming_text: &str,
        history_window: usize,
    ) -> FocusPlan {
        // 1. 推进当前焦点：成功 / 失败 / 继续
        if let Some(key) = session.strategy.focus {
            let succeeded = session.has_value_for(key);
            let target = session.strategy.targets.entry(key).or_default();

            if succeeded {
                target.phase = TargetPhase::Success;
                target.remaining_iterations = 0;
                session.strategy.focus = None;
                tracing::info!(focus = key.as_str(), "Target captured");
            } else {
                target.remaining_iterations = target.remaining_iterations.saturating_sub(1);
                if target.remaining_iterations == 0 {
                    target.phase = TargetPhase::Failure;
                    session.strategy.focus = None;
                    tracing::info!(focus = key.as_str(), "Target budget exhausted, giving up");
                } else {
                    target.phase = TargetPhase::Initialized;
                }
            }
        }

        // 2. 需要时选新焦点（同一回合内完成，避免空转一轮）
        if session.strategy.focus.is_none() {
            if let Some(key) = self
                .select_focus(session, oracle, incoming_text, history_window)
                .await
            {
                session.strategy.targets.insert(
                    key,
                    TargetState {
                        phase: TargetPhase::Initialized,
                        remaining_iterations: TARGET_BUDGET,
                    },
                );
                session.strategy.focus = Some(key);
            }
        }

        FocusPlan {
            focus: session.strategy.focus,
            instruction: Self::instruction_for(session.strategy.focus).to_string(),
        }
    }

    /// 在非终态目标中选择新焦点；预言机失败或给出非法答案时按固定优先级兜底
    async fn select_focus(
        &self,
        session: &Session,
        oracle: &dyn GenerationOracle,
        incoming_text: &str,
        history_window: usize,
    ) -> Option<TargetKey> {
        let candidates: Vec<TargetKey> = TargetKey::ALL
            .iter()
            .filter(|k| {
                session
                    .strategy
                    .targets
                    .get(k)
                    .map(|t| !t.phase.is_terminal())
                    .unwrap_or(true)
            })
            .copied()
            .collect();

        if candidates.is_empty() {
            return None;
        }

        match oracle
            .select_focus(
                session.recent_history(history_window),
                incoming_text,
                &candidates,
            )
            .await
        {
            Ok(key) if candidates.contains(&key) => Some(key),
            Ok(key) => {
                tracing::warn!(
                    chosen = key.as_str(),
                    "Oracle chose a terminal target, falling back to priority order"
                );
                Self::priority_fallback(&candidates)
            }
            Err(e) => {
                tracing::warn!("Focus oracle failed ({}), falling back to priority order", e);
                Self::priority_fallback(&candidates)
            }
        }
    }

    /// 固定优先级 upi → bank_account → url → ip 中第一个非终态目标
    fn priority_fallback(candidates: &[TargetKey]) -> Option<TargetKey> {
        PRIORITY_TARGETS
            .iter()
            .find(|k| candidates.contains(k))
            .copied()
            .or_else(|| candidates.first().copied())
    }

    /// 各焦点对应的生成指令
    fn instruction_for(focus: Option<TargetKey>) -> &'static str {
        match focus {
            Some(TargetKey::Upi) => {
                "OBJECTIVE: Ask for their UPI ID (e.g. GooglePay/PhonePe) so you can send money."
            }
            Some(TargetKey::BankAccount) => {
                "OBJECTIVE: Ask for their bank account number and IFSC code."
            }
            Some(TargetKey::Ifsc) => {
                "OBJECTIVE: Ask them to confirm or resend the IFSC code due to a bank validation issue."
            }
            Some(TargetKey::Phone) => {
                "OBJECTIVE: Ask for their phone/WhatsApp number to coordinate the payment."
            }
            Some(TargetKey::Url) => "OBJECTIVE: Ask for a payment link or QR code.",
            Some(TargetKey::Email) => {
                "OBJECTIVE: Ask for their email ID to send a payment receipt or confirmation."
            }
            Some(TargetKey::Ip) => {
                "OBJECTIVE: Send them the 'payment receipt' link and ask them to open it to verify."
            }
            None => "OBJECTIVE: Stall for time. Ask generic clarifying questions.",
        }
    }

    /// 任务完成判定：所有优先目标均到达终态
    pub fn is_mission_complete(session: &Session) -> bool {
        PRIORITY_TARGETS.iter().all(|k| {
            session
                .strategy
                .targets
                .get(k)
                .map(|t| t.phase.is_terminal())
                .unwrap_or(false)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::MockOracle;
    use crate::session::Session;

    fn scam_session() -> Session {
        let mut session = Session::new("s1", "persona".to_string());
        session.scam_confirmed = true;
        session
    }

    #[tokio::test]
    async fn test_focused_target_succeeds_when_value_present() {
        let mut session = scam_session();
        session.strategy.focus = Some(TargetKey::Upi);
        session.strategy.targets.insert(
            TargetKey::Upi,
            TargetState {
                phase: TargetPhase::Initialized,
                remaining_iterations: 2,
            },
        );
        session.extracted.upi.insert("scammer@okaxis".to_string());

        let oracle = MockOracle::new().with_focus(TargetKey::Url);
        let plan = StrategicPlanner::new()
            .update_and_get_focus(&mut session, &oracle, "here is my upi", 10)
            .await;

        let upi = &session.strategy.targets[&TargetKey::Upi];
        assert_eq!(upi.phase, TargetPhase::Success);
        assert_eq!(upi.remaining_iterations, 0);
        // 焦点已清空并在同一回合选出新目标
        assert_eq!(plan.focus, Some(TargetKey::Url));
        assert!(plan.instruction.contains("payment link"));
    }

    #[tokio::test]
    async fn test_budget_decrements_and_fails_at_zero() {
        let mut session = scam_session();
        session.strategy.focus = Some(TargetKey::BankAccount);
        session.strategy.targets.insert(
            TargetKey::BankAccount,
            TargetState {
                phase: TargetPhase::Initialized,
                remaining_iterations: 1,
            },
        );

        let oracle = MockOracle::new().with_focus(TargetKey::Phone);
        let plan = StrategicPlanner::new()
            .update_and_get_focus(&mut session, &oracle, "no", 10)
            .await;

        let bank = &session.strategy.targets[&TargetKey::BankAccount];
        assert_eq!(bank.phase, TargetPhase::Failure);
        assert_eq!(bank.remaining_iterations, 0);
        // 放弃后同回合内重新聚焦，新目标预算重置为 3
        assert_eq!(plan.focus, Some(TargetKey::Phone));
        assert_eq!(
            session.strategy.targets[&TargetKey::Phone].remaining_iterations,
            3
        );
    }

    #[tokio::test]
    async fn test_budget_never_negative_while_trying() {
        let mut session = scam_session();
        session.strategy.focus = Some(TargetKey::Url);
        session.strategy.targets.insert(
            TargetKey::Url,
            TargetState {
                phase: TargetPhase::Initialized,
                remaining_iterations: 3,
            },
        );

        let planner = StrategicPlanner::new();
        for expected in [2u8, 1] {
            let oracle = MockOracle::new();
            planner
                .update_and_get_focus(&mut session, &oracle, "no link", 10)
                .await;
            let url = &session.strategy.targets[&TargetKey::Url];
            assert_eq!(url.remaining_iterations, expected);
            assert_eq!(url.phase, TargetPhase::Initialized);
            assert_eq!(session.strategy.focus, Some(TargetKey::Url));
        }
    }

    #[tokio::test]
    async fn test_fallback_priority_when_oracle_fails() {
        let mut session = scam_session();
        // upi 已终态，兜底应跳到 bank_account
        session.strategy.targets.insert(
            TargetKey::Upi,
            TargetState {
                phase: TargetPhase::Success,
                remaining_iterations: 0,
            },
        );

        let oracle = MockOracle::failing();
        let plan = StrategicPlanner::new()
            .update_and_get_focus(&mut session, &oracle, "hello", 10)
            .await;

        assert_eq!(plan.focus, Some(TargetKey::BankAccount));
    }

    #[tokio::test]
    async fn test_terminal_target_never_refocused() {
        let mut session = scam_session();
        for key in TargetKey::ALL {
            session.strategy.targets.insert(
                key,
                TargetState {
                    phase: TargetPhase::Failure,
                    remaining_iterations: 0,
                },
            );
        }

        // 所有目标终态：无候选，焦点保持空，指令退化为拖延
        let oracle = MockOracle::new().with_focus(TargetKey::Upi);
        let plan = StrategicPlanner::new()
            .update_and_get_focus(&mut session, &oracle, "hi", 10)
            .await;

        assert!(plan.focus.is_none());
        assert!(plan.instruction.contains("Stall"));
    }

    #[tokio::test]
    async fn test_mission_complete_ignores_secondary_targets() {
        let mut session = scam_session();
        assert!(!StrategicPlanner::is_mission_complete(&session));

        for key in PRIORITY_TARGETS {
            session.strategy.targets.insert(
                key,
                TargetState {
                    phase: TargetPhase::Success,
                    remaining_iterations: 0,
                },
            );
        }
        // phone/ifsc/email 还未终态，但不阻塞完成
        assert!(StrategicPlanner::is_mission_complete(&session));
    }

    #[tokio::test]
    async fn test_phone_value_alone_does_not_complete_mission() {
        let mut session = scam_session();
        session.extracted.phone.insert("9876543210".to_string());
        assert!(!StrategicPlanner::is_mission_complete(&session));
    }
}
