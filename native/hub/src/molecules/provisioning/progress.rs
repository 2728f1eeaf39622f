// 部署进度事件：协调器产生，CLI / 日志等任意消费方订阅

use std::fmt;
use tokio::sync::mpsc;

use super::step::ApplyStage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub stage: ApplyStage,
    pub message: String,
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.stage, self.message)
    }
}

// 发送端；没有订阅者时只写日志
#[derive(Debug, Clone, Default)]
pub struct ProgressReporter {
    sender: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl ProgressReporter {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender: Some(sender),
            },
            receiver,
        )
    }

    pub fn report(&self, stage: ApplyStage, message: impl Into<String>) {
        let event = ProgressEvent {
            stage,
            message: message.into(),
        };
        log::info!("{}", event);
        if let Some(sender) = &self.sender
            && sender.send(event).is_err()
        {
            log::debug!("进度订阅端已关闭");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_reach_subscriber_in_order() {
        let (reporter, mut receiver) = ProgressReporter::channel();
        reporter.report(ApplyStage::GeneratingArtifacts, "编译");
        reporter.report(ApplyStage::PushingConfigs, "推送");
        drop(reporter);

        let mut stages = Vec::new();
        while let Some(event) = receiver.recv().await {
            stages.push(event.stage);
        }
        assert_eq!(
            stages,
            vec![ApplyStage::GeneratingArtifacts, ApplyStage::PushingConfigs]
        );
    }

    #[test]
    fn test_closed_receiver_is_ignored() {
        let (reporter, receiver) = ProgressReporter::channel();
        drop(receiver);
        reporter.report(ApplyStage::RestartingDnsmasq, "重启 dnsmasq");
        ProgressReporter::default().report(ApplyStage::PushingConfigs, "无订阅者");
    }
}
