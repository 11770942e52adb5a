//! 编排器：think-act 控制循环
//!
//! 单任务独占状态机、上下文栈与工作上下文，外部只能通过命令通道与
//! watch 快照交互。Idle 时从 intervention 特权口（可选再加一个 context
//! 订阅）取刺激开启周期；Acting / AwaitingResponse 期间并发监听可抢占
//! 层级，命中即协作取消在飞调用、保存现场、带着合并后的上下文转入新周期。
//! 坏信号与能力失败都不会终止循环，循环只因 Stop 或总线关闭而退出。

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::bus::{ContextSubscription, Signal, SignalBus, SignalKind};
use crate::capability::{
    CapabilityContext, CapabilityExecutor, CapabilityRegistry, CapabilityReply, SignalEmitter,
};
use crate::config::AppConfig;
use crate::core::context_stack::ContextStack;
use crate::core::deliberator::{stimulus_text, Decision, Deliberator, RuleDeliberator};
use crate::core::error::CoreError;
use crate::core::state::{Action, OrchestratorState, StateMachine, StateSnapshot};
use crate::core::working::WorkingContext;
use crate::metrics::Metrics;
use tokio_util::sync::CancellationToken;

/// 宿主发给控制循环的命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// 从 Error 状态恢复（或触发空栈回退）
    Recover,
    /// 停止循环
    Stop,
}

/// 一次能力调用的结局（循环内部用）
enum CycleOutcome {
    /// 周期结束，回 Idle
    Completed,
    /// 被可抢占信号打断，携带新刺激
    Preempted(Signal),
}

/// 思考阶段的结局
enum ThinkOutcome {
    Decided(Decision),
    Preempted(Option<Signal>),
    Failed(String),
}

pub struct Orchestrator {
    bus: Arc<SignalBus>,
    machine: StateMachine,
    stack: ContextStack,
    deliberator: Arc<dyn Deliberator>,
    executor: Arc<CapabilityExecutor>,
    metrics: Arc<Metrics>,
    cmd_rx: mpsc::Receiver<Command>,
    attention: Option<ContextSubscription>,
    /// Error 恢复时弹出的现场，并入下一个周期
    carry: Option<WorkingContext>,
}

impl Orchestrator {
    /// 控制循环主体；Off --Start--> Idle 后进入事件循环
    async fn run(mut self) {
        if self.machine.apply(Action::Start).is_err() {
            return;
        }
        tracing::info!("Orchestrator started");

        loop {
            let idle = self.machine.state() == OrchestratorState::Idle;
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(Command::Recover) => self.handle_recover(),
                        Some(Command::Stop) | None => break,
                    }
                }
                maybe = self.bus.consume_intervention(), if idle => {
                    match maybe {
                        Some(signal) => {
                            self.run_cycle(signal, Action::InterventionReceived).await;
                        }
                        None => break, // 总线关闭
                    }
                }
                maybe = next_attention(&mut self.attention), if idle => {
                    match maybe {
                        Some(signal) => {
                            self.run_cycle(signal, Action::SignalReceived).await;
                        }
                        None => break,
                    }
                }
            }
        }

        let _ = self.machine.apply(Action::Stop);
        tracing::info!("Orchestrator stopped");
    }

    /// 一个 think-act 周期；被抢占时在本函数内接着跑新周期，直到回 Idle 或进 Error
    async fn run_cycle(&mut self, signal: Signal, entry_action: Action) {
        let mut signal = signal;
        let mut action = entry_action;
        let mut working = WorkingContext::new();
        if let Some(carried) = self.carry.take() {
            working.merge_resumed(&carried);
        }

        loop {
            working.set_stimulus(stimulus_text(&signal));
            if self.machine.apply(action).is_err() {
                return;
            }

            // Thinking（与 Acting 一样可被抢占）
            let outcome = {
                let deliberation = self.deliberator.deliberate(&signal, &working);
                tokio::pin!(deliberation);
                tokio::select! {
                    result = &mut deliberation => match result {
                        Ok(d) => ThinkOutcome::Decided(d),
                        Err(reason) => ThinkOutcome::Failed(reason),
                    },
                    preempting = self.bus.consume_preemptive() => {
                        ThinkOutcome::Preempted(preempting)
                    }
                }
            };
            let decision = match outcome {
                ThinkOutcome::Decided(d) => d,
                ThinkOutcome::Failed(reason) => {
                    tracing::error!(error = %reason, "Deliberation failed");
                    let _ = self.machine.apply(Action::ErrorOccurred);
                    self.carry = Some(working);
                    return;
                }
                ThinkOutcome::Preempted(Some(preempting)) => {
                    working = self.begin_preempted_cycle(working);
                    signal = preempting;
                    action = Action::Recover;
                    continue;
                }
                ThinkOutcome::Preempted(None) => return, // 关闭中
            };
            if self.machine.apply(Action::ThinkComplete).is_err() {
                return;
            }

            // Acting（至多一次能力调用，带子取消令牌）；收尾转移由 act 负责
            match self.act(&signal, &decision, &mut working).await {
                CycleOutcome::Completed => return,
                CycleOutcome::Preempted(preempting) => {
                    working = self.begin_preempted_cycle(working);
                    signal = preempting;
                    action = Action::Recover;
                }
            }
        }
    }

    /// 抢占簿记：保存被打断的现场（状态 + 工作上下文）入栈，
    /// 随即弹出并并入新周期——恢复的周期知道被打断前的进展
    fn begin_preempted_cycle(&mut self, interrupted: WorkingContext) -> WorkingContext {
        Metrics::incr(&self.metrics.interruptions);
        let saved_state = self.machine.state();
        let _ = self.machine.apply(Action::InterventionReceived);
        self.stack.push(saved_state, interrupted);
        let mut next = WorkingContext::new();
        match self.stack.pop() {
            Ok(entry) => next.merge_resumed(&entry.saved_payload),
            Err(_) => Metrics::incr(&self.metrics.empty_stack_recoveries),
        }
        next
    }

    /// Acting 阶段：并发等待调用结果与可抢占信号
    async fn act(
        &mut self,
        signal: &Signal,
        decision: &Decision,
        working: &mut WorkingContext,
    ) -> CycleOutcome {
        let cancel = CancellationToken::new();
        // 刺激没带关联 ID 时铸一个，保证能力产出的信号可回溯到本周期
        let correlation_id = signal
            .metadata
            .correlation_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let ctx = CapabilityContext {
            cancel: cancel.clone(),
            emitter: SignalEmitter::new(Arc::clone(&self.bus)),
            correlation_id: Some(correlation_id),
        };
        let tier = signal.priority;

        let executor = Arc::clone(&self.executor);
        let name = decision.capability.clone();
        let input = decision.input.clone();
        let mut invocation =
            tokio::spawn(async move { executor.invoke(&name, input, tier, ctx).await });

        let reply = tokio::select! {
            joined = &mut invocation => match joined {
                Ok(result) => result,
                Err(e) => Err(CoreError::CapabilityFailed {
                    name: decision.capability.clone(),
                    reason: format!("invocation task failed: {e}"),
                }),
            },
            preempting = self.bus.consume_preemptive() => {
                // 协作取消，不等确认；迟到的结果随任务废弃
                cancel.cancel();
                return match preempting {
                    Some(p) => CycleOutcome::Preempted(p),
                    None => CycleOutcome::Completed, // 关闭中
                };
            }
        };

        match reply {
            Ok(CapabilityReply::Done(value)) => {
                working.add_observation(format!("{} -> {value}", decision.capability));
                let _ = self.machine.apply(Action::ActionComplete);
                CycleOutcome::Completed
            }
            Ok(CapabilityReply::Pending(response_rx)) => {
                // 外部长任务：Acting → AwaitingResponse，继续监听抢占
                if self.machine.apply(Action::ResponseReceived).is_err() {
                    return CycleOutcome::Completed;
                }
                tokio::select! {
                    response = response_rx => {
                        match response {
                            Ok(Ok(value)) => working.add_observation(
                                format!("{} -> {value}", decision.capability),
                            ),
                            Ok(Err(reason)) => working.add_observation(
                                format!("{} failed: {reason}", decision.capability),
                            ),
                            Err(_) => working.add_observation(
                                format!("{} response channel closed", decision.capability),
                            ),
                        }
                        let _ = self.machine.apply(Action::ResponseReceived);
                        // ResponseReceived 直达 Idle，周期在此闭合
                        CycleOutcome::Completed
                    }
                    preempting = self.bus.consume_preemptive() => {
                        cancel.cancel();
                        match preempting {
                            Some(p) => CycleOutcome::Preempted(p),
                            None => CycleOutcome::Completed,
                        }
                    }
                }
            }
            Err(e) => {
                // 能力失败隔离在本次调用内，记为观察后正常收尾
                working.add_observation(format!("{} failed: {e}", decision.capability));
                let _ = self.machine.apply(Action::ActionComplete);
                CycleOutcome::Completed
            }
        }
    }

    /// 宿主显式 Recover：弹栈（空则计数回退），Error → Idle
    fn handle_recover(&mut self) {
        match self.stack.pop() {
            Ok(entry) => self.carry = Some(entry.saved_payload),
            Err(_) => {
                Metrics::incr(&self.metrics.empty_stack_recoveries);
                tracing::info!("Recover with empty context stack, resuming fresh");
            }
        }
        let _ = self.machine.apply(Action::Recover);
    }
}

/// attention 订阅缺省时永不就绪
async fn next_attention(sub: &mut Option<ContextSubscription>) -> Option<Signal> {
    match sub {
        Some(s) => s.recv().await,
        None => std::future::pending().await,
    }
}

/// 编排器装配
pub struct OrchestratorBuilder {
    bus: Arc<SignalBus>,
    config: AppConfig,
    metrics: Arc<Metrics>,
    registry: CapabilityRegistry,
    deliberator: Arc<dyn Deliberator>,
    attention_kinds: Option<Vec<SignalKind>>,
}

impl OrchestratorBuilder {
    pub fn new(bus: Arc<SignalBus>, config: AppConfig, metrics: Arc<Metrics>) -> Self {
        Self {
            bus,
            config,
            metrics,
            registry: CapabilityRegistry::new(),
            deliberator: Arc::new(RuleDeliberator::new()),
            attention_kinds: None,
        }
    }

    pub fn register_capability(mut self, capability: impl crate::capability::Capability + 'static) -> Self {
        self.registry.register(capability);
        self
    }

    pub fn with_deliberator(mut self, deliberator: Arc<dyn Deliberator>) -> Self {
        self.deliberator = deliberator;
        self
    }

    /// 让循环在 Idle 时也响应这些 context 类型（缺省只响应 intervention）
    pub fn with_attention(mut self, kinds: Vec<SignalKind>) -> Self {
        self.attention_kinds = Some(kinds);
        self
    }

    pub fn spawn(self) -> OrchestratorHandle {
        let (machine, state_rx) = StateMachine::new(Arc::clone(&self.metrics));
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let attention = self
            .attention_kinds
            .map(|kinds| self.bus.subscribe_context(Some(kinds)));
        let executor = Arc::new(CapabilityExecutor::new(
            self.registry,
            &self.config.capabilities,
            Arc::clone(&self.metrics),
        ));
        let orchestrator = Orchestrator {
            bus: self.bus,
            machine,
            stack: ContextStack::new(
                self.config.orchestrator.context_stack_depth,
                Arc::clone(&self.metrics),
            ),
            deliberator: self.deliberator,
            executor,
            metrics: self.metrics,
            cmd_rx,
            attention,
            carry: None,
        };
        let join = tokio::spawn(orchestrator.run());
        OrchestratorHandle {
            cmd_tx,
            state_rx,
            join,
        }
    }
}

/// 宿主侧句柄：只读状态 + 命令口
pub struct OrchestratorHandle {
    cmd_tx: mpsc::Sender<Command>,
    state_rx: watch::Receiver<StateSnapshot>,
    join: JoinHandle<()>,
}

impl OrchestratorHandle {
    pub fn state(&self) -> OrchestratorState {
        self.state_rx.borrow().state
    }

    pub fn state_receiver(&self) -> watch::Receiver<StateSnapshot> {
        self.state_rx.clone()
    }

    /// 等待状态机到达指定状态（测试与宿主同步用）
    pub async fn wait_for(&mut self, state: OrchestratorState) {
        // borrow_and_update 避免错过当前值
        if self.state_rx.borrow_and_update().state == state {
            return;
        }
        while self.state_rx.changed().await.is_ok() {
            if self.state_rx.borrow_and_update().state == state {
                return;
            }
        }
    }

    pub async fn recover(&self) {
        let _ = self.cmd_tx.send(Command::Recover).await;
    }

    /// 请求停止并等待循环退出
    pub async fn stop(self) {
        let _ = self.cmd_tx.send(Command::Stop).await;
        let _ = self.join.await;
    }
}
