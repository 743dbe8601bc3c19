//! 序号比较器的性质验证。
//!
//! # 测试目标（Why）
//! - `rolling_less_than` 决定报文是否被视为“新帧”，一旦违反反自反或反对称，去重逻辑会同时接受或同时丢弃
//!   一对报文，造成画面回跳；
//! - 以 proptest 在整个 `u16` 定义域上抽样，覆盖回绕点附近的所有组合。
//!
//! # 性质列表（What）
//! - 反自反：`a` 不早于自身；
//! - 反对称：`a < b` 与 `b < a` 不会同时成立；
//! - 后继：`a` 早于 `a + 1`（模 2^16）；
//! - `SequenceTracker` 只在接受时推进游标，且推进后的游标严格更新。

use proptest::prelude::*;
use tether_core::{SequenceTracker, SequenceVerdict, rolling_less_than};

proptest! {
    #[test]
    fn comparator_is_irreflexive(a in any::<u16>()) {
        prop_assert!(!rolling_less_than(a, a));
    }

    #[test]
    fn comparator_is_antisymmetric(a in any::<u16>(), b in any::<u16>()) {
        prop_assert!(!(rolling_less_than(a, b) && rolling_less_than(b, a)));
    }

    #[test]
    fn successor_is_always_newer(a in any::<u16>()) {
        prop_assert!(rolling_less_than(a, a.wrapping_add(1)));
        prop_assert!(!rolling_less_than(a.wrapping_add(1), a));
    }

    /// 除恰好相差半圈外，任意两个不同序号必有先后。
    #[test]
    fn distinct_values_are_ordered_unless_half_range(a in any::<u16>(), b in any::<u16>()) {
        prop_assume!(a != b && b.wrapping_sub(a) != 1 << 15);
        prop_assert!(rolling_less_than(a, b) ^ rolling_less_than(b, a));
    }

    #[test]
    fn tracker_only_moves_forward(indices in proptest::collection::vec(any::<u16>(), 1..64)) {
        let mut tracker = SequenceTracker::new();
        for index in indices {
            let before = tracker.last();
            let verdict = tracker.observe(index);
            match (before, verdict) {
                (None, SequenceVerdict::First) => prop_assert_eq!(tracker.last(), Some(index)),
                (Some(prev), SequenceVerdict::Newer { gap }) => {
                    prop_assert!(rolling_less_than(prev, index));
                    prop_assert_eq!(prev.wrapping_add(gap).wrapping_add(1), index);
                    prop_assert_eq!(tracker.last(), Some(index));
                }
                (Some(prev), SequenceVerdict::Duplicate) => {
                    prop_assert_eq!(prev, index);
                    prop_assert_eq!(tracker.last(), before);
                }
                (Some(prev), SequenceVerdict::Stale) => {
                    prop_assert!(!rolling_less_than(prev, index));
                    prop_assert_eq!(tracker.last(), before);
                }
                (before, verdict) => prop_assert!(false, "unexpected verdict {verdict:?} after {before:?}"),
            }
        }
    }
}
