//! 全局订阅器只能安装一次；该测试独占一个测试二进制，避免与其他测试争用全局状态。

use tether_core::{TetherError, observability};

#[test]
fn second_install_is_rejected() {
    observability::install_subscriber().expect("首次安装应成功");
    tracing::info!(target: "tether_core", "subscriber installed");

    let err = observability::install_subscriber().expect_err("重复安装应失败");
    assert!(matches!(err, TetherError::Observability { .. }));
    assert_eq!(err.code(), "tether.observability.install_failed");
}
