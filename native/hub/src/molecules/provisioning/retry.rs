// 固定间隔重试
// 冷启动的路由器网络栈需要一段时间才能稳定，安装软件包后的校验按此策略重试

use std::future::Future;
use std::time::Duration;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    // 软件包安装后的校验：5 次，每次间隔 10 秒
    pub const fn package_verify() -> Self {
        Self::new(5, Duration::from_secs(10))
    }

    pub const fn ssh_ready() -> Self {
        Self::new(12, Duration::from_secs(5))
    }

    // 只执行一次
    pub const fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    // op 收到从 1 开始的尝试序号；全部失败时返回最后一次的错误
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        log::info!("{} 在第 {} 次尝试成功", what, attempt);
                    }
                    return Ok(value);
                }
                Err(e) if attempt < attempts => {
                    log::warn!(
                        "{} 第 {}/{} 次失败：{}，{:?} 后重试",
                        what,
                        attempt,
                        attempts,
                        e,
                        self.delay
                    );
                    if !self.delay.is_zero() {
                        tokio::time::sleep(self.delay).await;
                    }
                    attempt += 1;
                }
                Err(e) => {
                    log::error!("{} 在 {} 次尝试后仍然失败：{}", what, attempts, e);
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VRouterError;

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let policy = RetryPolicy::new(5, Duration::ZERO);
        let mut calls = 0;
        let result = policy
            .run("测试", |attempt| {
                calls += 1;
                async move {
                    if attempt < 3 {
                        Err(VRouterError::validation("暂时失败"))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_returns_last_error_after_exhaustion() {
        let policy = RetryPolicy::new(4, Duration::ZERO);
        let mut calls = 0;
        let result: Result<()> = policy
            .run("测试", |attempt| {
                calls += 1;
                async move { Err(VRouterError::PackagesNotInstalled(vec![attempt.to_string()])) }
            })
            .await;

        assert_eq!(calls, 4);
        match result {
            Err(VRouterError::PackagesNotInstalled(missing)) => assert_eq!(missing, vec!["4"]),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_fixed_delay_between_attempts() {
        let policy = RetryPolicy::package_verify();
        let start = tokio::time::Instant::now();
        let _: Result<()> = policy
            .run("测试", |_| async { Err(VRouterError::validation("失败")) })
            .await;
        // 5 次尝试之间共 4 次等待
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(40));
        assert!(elapsed < Duration::from_secs(41));
    }

    #[test]
    fn test_default_package_policy() {
        assert_eq!(
            RetryPolicy::package_verify(),
            RetryPolicy::new(5, Duration::from_secs(10))
        );
    }
}
