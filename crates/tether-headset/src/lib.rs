//! `tether-headset` 维护单个头显连接的运行状态。
//!
//! # 模块定位（Why）
//! - 头显的行为同时受电池管理（BMS）消息与传输链路状态影响：插电时暂停业务，电量告急时提示用户插电，
//!   链路断开时回到等待连接；
//! - 把这些规则收敛到一个全函数的状态机中，任何“状态 × 事件”组合都有确定结果，未建模的组合为空操作。
//!
//! # 设计概要（How）
//! - [`HeadsetState`] 以读写锁保护当前模式与连接标志：读取并发，每次投递事件独占；
//! - 每个投递函数返回 [`TransitionOutcome`]，调用方据 `changed` 决定是否刷新界面或上报；
//! - 状态变化统一以 INFO 级别记录。

mod state;

pub use state::{BmsMessage, HeadsetMode, HeadsetSnapshot, HeadsetState, TransitionOutcome};
