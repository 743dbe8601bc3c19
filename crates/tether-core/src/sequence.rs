//! 16 位序号的回绕安全比较。
//!
//! # 模块定位（Why）
//! - UDP 不保证顺序，同一路媒体流的报文可能乱序、重复或迟到；消费端只能依靠发送方嵌入的
//!   16 位递增序号判断“新旧”；
//! - 序号在 65535 之后回绕到 0，朴素的 `<` 比较会把回绕后的新报文误判为旧报文。
//!
//! # 比较规则（How）
//! - 令 `d = b.wrapping_sub(a)`；当且仅当 `d != 0 && d < 32768` 时认为 `a` 在 `b` 之前；
//! - 即在模 2^16 的环上，`b` 位于 `a` 之后半圈以内。

/// 半圈距离：超过该距离视为“落后”而非“领先”。
const HALF_RANGE: u16 = 1 << 15;

/// 回绕安全的“严格早于”比较。
///
/// - `rolling_less_than(a, a)` 恒为 `false`；
/// - `rolling_less_than(65535, 0)` 为 `true`，即 0 被视为 65535 的后继。
#[inline]
pub const fn rolling_less_than(a: u16, b: u16) -> bool {
    let distance = b.wrapping_sub(a);
    distance != 0 && distance < HALF_RANGE
}

/// 一次序号检查的结论。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SequenceVerdict {
    /// 该流的第一个报文。
    First,
    /// 比上次接受的序号更新；`gap` 为中间被跳过的序号个数（0 表示连续）。
    Newer { gap: u16 },
    /// 与上次接受的序号相同。
    Duplicate,
    /// 比上次接受的序号更旧（迟到或乱序）。
    Stale,
}

impl SequenceVerdict {
    /// 报文是否应当交付给下游。
    pub fn is_accepted(self) -> bool {
        matches!(self, SequenceVerdict::First | SequenceVerdict::Newer { .. })
    }
}

/// 记录单条流最近一次接受的序号，过滤重复与过期报文。
///
/// # 教案式说明
/// - **意图 (Why)**：处理阶段在把负载交给解码器之前调用 [`observe`](Self::observe)，保证解码器只看到
///   单调前进的帧；
/// - **契约 (What)**：只有 `First`/`Newer` 会推进内部游标；`Duplicate`/`Stale` 不改变状态；
/// - **风险 (Trade-offs)**：跨越半圈以上的跳变会被判为 `Stale`，长时间断流后需调用 [`reset`](Self::reset)。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SequenceTracker {
    last: Option<u16>,
}

impl SequenceTracker {
    pub const fn new() -> Self {
        Self { last: None }
    }

    /// 最近一次被接受的序号。
    pub fn last(&self) -> Option<u16> {
        self.last
    }

    /// 检查并（在接受时）记录新序号。
    pub fn observe(&mut self, index: u16) -> SequenceVerdict {
        let Some(last) = self.last else {
            self.last = Some(index);
            return SequenceVerdict::First;
        };
        if index == last {
            SequenceVerdict::Duplicate
        } else if rolling_less_than(last, index) {
            self.last = Some(index);
            SequenceVerdict::Newer {
                gap: index.wrapping_sub(last).wrapping_sub(1),
            }
        } else {
            SequenceVerdict::Stale
        }
    }

    /// 丢弃历史，下一次 `observe` 将返回 `First`。
    pub fn reset(&mut self) {
        self.last = None;
    }
}
