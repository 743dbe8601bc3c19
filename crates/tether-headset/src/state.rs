use std::fmt;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// 头显运行模式。
///
/// # 教案式说明
/// - **意图 (Why)**：描述头显当前能否承载媒体流，以及是否需要提示用户；
/// - **契约 (What)**：初始为 `Connecting`；`Connecting → Ready → Running` 为正常路径，
///   `PluggedIn` 与 `Dying` 可从任意模式进入；
/// - **风险 (Trade-offs)**：新增模式时需同步更新三个投递函数的匹配分支。
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HeadsetMode {
    /// 等待传输链路建立。
    #[default]
    Connecting,
    /// 链路已建立，尚无媒体流。
    Ready,
    /// 正在承载媒体流。
    Running,
    /// 已接入充电，业务暂停。
    PluggedIn,
    /// 电池管理请求关机，需提示用户插电。
    Dying,
}

impl HeadsetMode {
    /// 外部界面是否应展示“请插电”提示。
    pub fn requires_plug_in_warning(self) -> bool {
        matches!(self, HeadsetMode::Dying)
    }

    /// 链路是否处于可用状态。
    pub fn is_linked(self) -> bool {
        matches!(self, HeadsetMode::Ready | HeadsetMode::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HeadsetMode::Connecting => "CONNECTING",
            HeadsetMode::Ready => "READY",
            HeadsetMode::Running => "RUNNING",
            HeadsetMode::PluggedIn => "PLUGGED_IN",
            HeadsetMode::Dying => "DYING",
        }
    }
}

impl fmt::Display for HeadsetMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 电池管理系统上报的一条消息。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct BmsMessage {
    pub battery_level: i32,
    pub bms_is_plugged_in: bool,
    pub bms_wants_shutdown: bool,
}

/// 一次事件投递的结果。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TransitionOutcome {
    /// 模式是否发生变化；`false` 表示该事件在当前模式下为空操作。
    pub changed: bool,
    /// 投递后的模式。
    pub state: HeadsetMode,
}

/// 某一时刻的完整状态视图。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HeadsetSnapshot {
    pub mode: HeadsetMode,
    pub connected: bool,
    /// 最近一次 BMS 消息中的电量，尚未收到时为 `None`。
    pub battery_level: Option<i32>,
}

#[derive(Debug, Default)]
struct Inner {
    mode: HeadsetMode,
    connected: bool,
    battery_level: Option<i32>,
}

/// 头显状态机。
///
/// # 教案式说明
/// - **意图 (Why)**：电池事件与链路事件来自不同线程，状态机需保证每次迁移的原子性，同时允许界面、
///   传输层随时读取当前模式；
/// - **逻辑 (How)**：`parking_lot::RwLock` 保护内部状态；三个 `post_*` 函数在写锁内计算目标模式并落地；
/// - **契约 (What)**：
///   - 所有“模式 × 事件”组合均有定义，未建模组合返回 `changed == false`；
///   - 连接标志无论模式是否变化都会被记录；
///   - 模式变化以 INFO 记录，进入 `Dying` 额外以 WARN 提示插电。
#[derive(Debug, Default)]
pub struct HeadsetState {
    inner: RwLock<Inner>,
}

impl HeadsetState {
    /// 以 `Connecting`、未连接状态创建。
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> HeadsetMode {
        self.inner.read().mode
    }

    pub fn is_connected(&self) -> bool {
        self.inner.read().connected
    }

    pub fn snapshot(&self) -> HeadsetSnapshot {
        let inner = self.inner.read();
        HeadsetSnapshot {
            mode: inner.mode,
            connected: inner.connected,
            battery_level: inner.battery_level,
        }
    }

    /// 处理电池管理消息。
    ///
    /// - 插电优先：`bms_is_plugged_in` 为真时进入 `PluggedIn`，即使同时请求关机；
    /// - 否则请求关机时进入 `Dying`；
    /// - 两者皆否且此前处于 `PluggedIn`/`Dying` 时回到 `Connecting`，其余模式不变。
    pub fn post_bms_message(&self, message: &BmsMessage) -> TransitionOutcome {
        let mut inner = self.inner.write();
        inner.battery_level = Some(message.battery_level);
        let next = if message.bms_is_plugged_in {
            HeadsetMode::PluggedIn
        } else if message.bms_wants_shutdown {
            HeadsetMode::Dying
        } else if matches!(inner.mode, HeadsetMode::PluggedIn | HeadsetMode::Dying) {
            HeadsetMode::Connecting
        } else {
            inner.mode
        };
        apply(&mut inner, next, "bms")
    }

    /// 处理传输链路的连通性变化。
    ///
    /// - `Ready`/`Running` 下断开回到 `Connecting`；
    /// - `Connecting` 下链路由断开变为连通时进入 `Ready`；已连通时重复上报为空操作；
    /// - 连接标志总是被记录。
    pub fn post_tcp_connection(&self, connected: bool) -> TransitionOutcome {
        let mut inner = self.inner.write();
        let was_connected = std::mem::replace(&mut inner.connected, connected);
        let next = match (inner.mode, connected) {
            (HeadsetMode::Ready | HeadsetMode::Running, false) => HeadsetMode::Connecting,
            (HeadsetMode::Connecting, true) if !was_connected => HeadsetMode::Ready,
            (mode, _) => mode,
        };
        apply(&mut inner, next, "link")
    }

    /// 处理媒体流的开始与结束：`Ready` 下开始进入 `Running`，`Running` 下结束回到 `Ready`。
    pub fn post_stream_activity(&self, active: bool) -> TransitionOutcome {
        let mut inner = self.inner.write();
        let next = match (inner.mode, active) {
            (HeadsetMode::Ready, true) => HeadsetMode::Running,
            (HeadsetMode::Running, false) => HeadsetMode::Ready,
            (mode, _) => mode,
        };
        apply(&mut inner, next, "stream")
    }
}

fn apply(inner: &mut Inner, next: HeadsetMode, trigger: &'static str) -> TransitionOutcome {
    let previous = inner.mode;
    if previous == next {
        return TransitionOutcome {
            changed: false,
            state: next,
        };
    }
    inner.mode = next;
    info!(from = %previous, to = %next, trigger, "headset state changed");
    if next.requires_plug_in_warning() {
        warn!(battery_level = ?inner.battery_level, "battery management requested shutdown; plug in the headset");
    }
    TransitionOutcome {
        changed: true,
        state: next,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn bms(plugged_in: bool, wants_shutdown: bool) -> BmsMessage {
        BmsMessage {
            battery_level: 42,
            bms_is_plugged_in: plugged_in,
            bms_wants_shutdown: wants_shutdown,
        }
    }

    #[traced_test]
    #[test]
    fn connect_plug_unplug_walkthrough() {
        let state = HeadsetState::new();
        assert_eq!(state.state(), HeadsetMode::Connecting);

        let outcome = state.post_tcp_connection(true);
        assert_eq!(
            outcome,
            TransitionOutcome {
                changed: true,
                state: HeadsetMode::Ready
            }
        );

        let outcome = state.post_bms_message(&bms(true, false));
        assert!(outcome.changed);
        assert_eq!(outcome.state, HeadsetMode::PluggedIn);

        let outcome = state.post_bms_message(&bms(false, false));
        assert!(outcome.changed);
        assert_eq!(outcome.state, HeadsetMode::Connecting);

        assert!(logs_contain("headset state changed"));
        assert!(logs_contain("to=PLUGGED_IN"));
    }

    #[test]
    fn repeated_link_up_after_unplug_is_a_noop() {
        let state = HeadsetState::new();
        state.post_tcp_connection(true);
        state.post_bms_message(&bms(true, false));
        state.post_bms_message(&bms(false, false));
        assert_eq!(state.state(), HeadsetMode::Connecting);
        assert!(state.is_connected());

        let outcome = state.post_tcp_connection(true);
        assert_eq!(
            outcome,
            TransitionOutcome {
                changed: false,
                state: HeadsetMode::Connecting
            },
            "链路未曾断开，不视为重新连通"
        );

        assert!(!state.post_tcp_connection(false).changed);
        let outcome = state.post_tcp_connection(true);
        assert!(outcome.changed);
        assert_eq!(outcome.state, HeadsetMode::Ready);
    }

    #[test]
    fn plugged_in_takes_priority_over_shutdown() {
        let state = HeadsetState::new();
        let outcome = state.post_bms_message(&bms(true, true));
        assert_eq!(outcome.state, HeadsetMode::PluggedIn);
    }

    #[traced_test]
    #[test]
    fn shutdown_request_enters_dying_and_warns() {
        let state = HeadsetState::new();
        state.post_tcp_connection(true);
        let outcome = state.post_bms_message(&bms(false, true));
        assert_eq!(outcome.state, HeadsetMode::Dying);
        assert!(outcome.state.requires_plug_in_warning());
        assert!(logs_contain("plug in the headset"));

        let again = state.post_bms_message(&bms(false, true));
        assert!(!again.changed, "重复的关机请求为空操作");
    }

    #[test]
    fn link_drop_returns_linked_modes_to_connecting() {
        for streaming in [false, true] {
            let state = HeadsetState::new();
            state.post_tcp_connection(true);
            if streaming {
                assert_eq!(state.post_stream_activity(true).state, HeadsetMode::Running);
            }
            let outcome = state.post_tcp_connection(false);
            assert!(outcome.changed);
            assert_eq!(outcome.state, HeadsetMode::Connecting);
            assert!(!state.is_connected());
        }
    }

    #[test]
    fn link_events_in_power_modes_only_record_the_flag() {
        let state = HeadsetState::new();
        state.post_bms_message(&bms(true, false));
        let outcome = state.post_tcp_connection(true);
        assert!(!outcome.changed);
        assert_eq!(outcome.state, HeadsetMode::PluggedIn);
        assert!(state.is_connected());
    }

    #[test]
    fn neutral_bms_message_keeps_linked_modes() {
        let state = HeadsetState::new();
        state.post_tcp_connection(true);
        state.post_stream_activity(true);
        let outcome = state.post_bms_message(&bms(false, false));
        assert!(!outcome.changed);
        assert_eq!(outcome.state, HeadsetMode::Running);
        assert_eq!(state.snapshot().battery_level, Some(42));
    }

    #[test]
    fn stream_activity_toggles_between_ready_and_running() {
        let state = HeadsetState::new();
        assert!(!state.post_stream_activity(true).changed, "未连接时不进入 Running");
        state.post_tcp_connection(true);
        assert_eq!(state.post_stream_activity(true).state, HeadsetMode::Running);
        assert!(!state.post_stream_activity(true).changed);
        assert_eq!(state.post_stream_activity(false).state, HeadsetMode::Ready);
    }

    #[test]
    fn mode_names_match_wire_spelling() {
        assert_eq!(HeadsetMode::PluggedIn.to_string(), "PLUGGED_IN");
        assert_eq!(HeadsetMode::default(), HeadsetMode::Connecting);
        assert!(HeadsetMode::Running.is_linked());
        assert!(!HeadsetMode::Dying.is_linked());
    }
}
